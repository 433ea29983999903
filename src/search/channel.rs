//! Execution-channel and authorization collaborator contracts.
//!
//! The core never talks to a store directly: it hands a parameterized
//! statement to an [`ExecutionChannel`] and receives identifier/score rows
//! back. Cancellation and timeout travel with every call in a
//! [`QueryControl`], so a long-running store call can be abandoned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::catalog::ResourceId;
use crate::error::{SearchError, SearchResult};
use crate::lql::{ParameterizedStatement, SqlFragment};

/// Cooperative cancellation flag, cloneable across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-call execution constraints threaded from the search request down to
/// the channel.
#[derive(Debug, Clone, Default)]
pub struct QueryControl {
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

impl QueryControl {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// Fails with [`SearchError::Cancelled`] or [`SearchError::Timeout`]
    /// once the call should stop. Channels check this before a statement
    /// and between rows.
    pub fn check(&self, started: Instant) -> SearchResult<()> {
        if self.cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        if let Some(timeout) = self.timeout {
            if started.elapsed() >= timeout {
                return Err(SearchError::Timeout(timeout));
            }
        }
        Ok(())
    }
}

/// One identifier/score row streamed back from the store. `weight` is
/// present only for scored (full-text) statements.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub id: ResourceId,
    pub weight: Option<f64>,
}

/// The query-execution collaborator. Implementations own transport,
/// dialect quirks, and store-level errors; the core neither retries nor
/// swallows what they return.
pub trait ExecutionChannel: Send + Sync {
    /// Executes a statement selecting `id` (and optionally `weight`) rows.
    fn fetch_rows(
        &self,
        statement: &ParameterizedStatement,
        control: &QueryControl,
    ) -> SearchResult<Vec<MatchRow>>;

    /// Executes a single-value counting statement.
    fn fetch_count(
        &self,
        statement: &ParameterizedStatement,
        control: &QueryControl,
    ) -> SearchResult<u64>;

    /// Executes a single-value scalar statement (e.g. a MAX); `None` when
    /// the aggregate has no input rows.
    fn fetch_scalar(
        &self,
        statement: &ParameterizedStatement,
        control: &QueryControl,
    ) -> SearchResult<Option<f64>>;
}

/// Access-control collaborator: renders the set of identifiers a security
/// token may see as a SQL fragment selecting a single `id` column.
pub trait AuthorizationProvider: Send + Sync {
    fn authorized_identifiers(&self, token: &str) -> SearchResult<SqlFragment>;
}
