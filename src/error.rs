use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Search syntax invalid near '{fragment}': {reason}")]
    InvalidSyntax { fragment: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Query timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type SearchResult<T> = Result<T, SearchError>;

impl SearchError {
    /// Builds an [`SearchError::InvalidSyntax`] carrying the offending fragment.
    pub fn syntax(fragment: impl Into<String>, reason: impl Into<String>) -> Self {
        SearchError::InvalidSyntax {
            fragment: fragment.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SearchError::InvalidArgument("cursor must not be negative".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid argument: cursor must not be negative"
        );

        let err = SearchError::syntax("Titel", "unknown property");
        assert_eq!(
            err.to_string(),
            "Search syntax invalid near 'Titel': unknown property"
        );

        let err = SearchError::Configuration("missing resource type 'Book'".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: missing resource type 'Book'"
        );

        let err = SearchError::Store("connection refused".to_string());
        assert_eq!(err.to_string(), "Store error: connection refused");
    }

    #[test]
    fn test_search_result_type() {
        let ok: SearchResult<u32> = Ok(7);
        assert_eq!(ok.unwrap(), 7);

        let err: SearchResult<u32> = Err(SearchError::Cancelled);
        assert!(err.is_err());
    }
}
