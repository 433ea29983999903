//! Call-level search services: request validation, the parse → compile →
//! execute pipeline, pagination, and percentage ranking.

pub mod channel;
pub mod paging;
#[cfg(feature = "sqlite-channel")]
pub mod sqlite;

pub use channel::{
    AuthorizationProvider, CancelToken, ExecutionChannel, MatchRow, QueryControl,
};
pub use paging::{PageWindow, ResolvedSort};

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{ResourceId, ResourceTypeDescriptor, TokenCatalog};
use crate::error::{SearchError, SearchResult};
use crate::lql::lexer::RESOURCE_TYPE_TOKEN;
use crate::lql::{self, Clause, Compiler};

/// Requested result ordering, by logical property name.
#[derive(Debug, Clone)]
pub struct SortOrder {
    pub property: String,
    pub ascending: bool,
}

/// A search invocation: paging window, optional ordering, security
/// context, and execution constraints.
///
/// The cursor is an offset into the ordered result; a negative cursor is a
/// caller error, while `max_results == 0` means "no results, not an
/// error". When `security_aware` is set a token must be present.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub max_results: u32,
    pub cursor: i64,
    pub sort: Option<SortOrder>,
    pub security_token: Option<String>,
    pub security_aware: bool,
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            max_results: 50,
            cursor: 0,
            sort: None,
            security_token: None,
            security_aware: false,
            timeout: None,
            cancel: CancelToken::new(),
        }
    }
}

/// Boolean-search outcome: one page of identifiers plus the unpaged total.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatches {
    pub identifiers: Vec<ResourceId>,
    pub total: u64,
}

impl SearchMatches {
    fn empty() -> Self {
        Self {
            identifiers: Vec::new(),
            total: 0,
        }
    }
}

/// One scored full-text match: identifier plus percentage score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHit {
    pub id: ResourceId,
    pub score: f64,
}

/// Content-search outcome: one descending-score page plus the unpaged
/// total. Scores are percentages in `[0, 100]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatches {
    pub hits: Vec<ScoredHit>,
    pub total: u64,
}

impl ScoredMatches {
    fn empty() -> Self {
        Self {
            hits: Vec::new(),
            total: 0,
        }
    }
}

/// The search service: owns the catalog handle, the execution channel, and
/// the optional authorization collaborator. Parse and compile are pure;
/// the channel call is the only operation that may block.
pub struct SearchEngine {
    catalog: Arc<TokenCatalog>,
    channel: Box<dyn ExecutionChannel>,
    authorization: Option<Box<dyn AuthorizationProvider>>,
}

impl SearchEngine {
    pub fn new<C>(catalog: Arc<TokenCatalog>, channel: C) -> Self
    where
        C: ExecutionChannel + 'static,
    {
        Self {
            catalog,
            channel: Box::new(channel),
            authorization: None,
        }
    }

    pub fn with_authorization<P>(mut self, provider: P) -> Self
    where
        P: AuthorizationProvider + 'static,
    {
        self.authorization = Some(Box::new(provider));
        self
    }

    pub fn catalog(&self) -> &Arc<TokenCatalog> {
        &self.catalog
    }

    /// Boolean search over a full query-language expression. Returns one
    /// page of identifiers in the requested order plus the unpaged total.
    pub fn search(&self, text: &str, request: &SearchRequest) -> SearchResult<SearchMatches> {
        validate_request(request)?;
        if text.trim().is_empty() {
            return Err(SearchError::InvalidArgument(
                "query text must not be empty".to_string(),
            ));
        }
        if request.max_results == 0 {
            return Ok(SearchMatches::empty());
        }

        let (ast, effective) = lql::parse(text, &self.catalog)?;
        let compiler = Compiler::new(&self.catalog);
        let clause = compiler.compile(&ast, &effective)?;
        let clause = self.apply_authorization(clause, request)?;
        let sort = self.resolve_sort(request, &effective)?;

        let control = control_of(request);
        let total = self
            .channel
            .fetch_count(&paging::count_statement(&clause), &control)?;
        let statement = paging::page_statement(&clause, sort.as_ref(), window_of(request));
        let rows = self.channel.fetch_rows(&statement, &control)?;
        let identifiers: Vec<ResourceId> = rows.into_iter().map(|row| row.id).collect();

        tracing::info!(
            total,
            returned = identifiers.len(),
            effective_type = %effective.name,
            "search completed"
        );
        Ok(SearchMatches { identifiers, total })
    }

    /// Structured search over (property, value) pairs scoped to a resource
    /// type. Rendered into the text form and delegated to [`Self::search`];
    /// an empty pair list is no results, not an error.
    pub fn search_properties(
        &self,
        pairs: &[(&str, &str)],
        resource_type: &str,
        request: &SearchRequest,
    ) -> SearchResult<SearchMatches> {
        validate_request(request)?;
        if pairs.is_empty() {
            return Ok(SearchMatches::empty());
        }
        self.search(&render_pairs(pairs, resource_type), request)
    }

    /// Full-text content search over the catalog's searchable columns,
    /// scoped to the default resource type. Each hit carries a percentage
    /// score; pages are ordered by descending score.
    pub fn search_content(
        &self,
        text: &str,
        request: &SearchRequest,
    ) -> SearchResult<ScoredMatches> {
        validate_request(request)?;
        if text.trim().is_empty() {
            return Err(SearchError::InvalidArgument(
                "search text must not be empty".to_string(),
            ));
        }
        if request.max_results == 0 {
            return Ok(ScoredMatches::empty());
        }

        let effective = self.catalog.default_type();
        let compiler = Compiler::new(&self.catalog);
        let clause = compiler.compile_content(text.trim(), &effective)?;
        let clause = self.apply_authorization(clause, request)?;

        let control = control_of(request);
        let total = self
            .channel
            .fetch_count(&paging::count_statement(&clause), &control)?;
        let max_weight = self
            .channel
            .fetch_scalar(&paging::max_weight_statement(&clause), &control)?;
        let Some(max_weight) = max_weight else {
            return Ok(ScoredMatches { hits: Vec::new(), total });
        };

        let statement = paging::scored_page_statement(&clause, window_of(request));
        let rows = self.channel.fetch_rows(&statement, &control)?;
        let hits: Vec<ScoredHit> = rows
            .into_iter()
            .map(|row| ScoredHit {
                id: row.id,
                score: paging::percentage(row.weight.unwrap_or(0.0), max_weight),
            })
            .collect();

        tracing::info!(total, returned = hits.len(), "content search completed");
        Ok(ScoredMatches { hits, total })
    }

    fn apply_authorization(
        &self,
        clause: Clause,
        request: &SearchRequest,
    ) -> SearchResult<Clause> {
        let Some(token) = &request.security_token else {
            return Ok(clause);
        };
        let provider = self.authorization.as_ref().ok_or_else(|| {
            SearchError::Configuration(
                "a security token was supplied but no authorization provider is configured"
                    .to_string(),
            )
        })?;
        let fragment = provider.authorized_identifiers(token)?;
        Ok(clause.restrict(&fragment))
    }

    fn resolve_sort(
        &self,
        request: &SearchRequest,
        effective: &ResourceTypeDescriptor,
    ) -> SearchResult<Option<ResolvedSort>> {
        let Some(sort) = &request.sort else {
            return Ok(None);
        };
        let property = self
            .catalog
            .property(effective, &sort.property)
            .ok_or_else(|| {
                SearchError::syntax(
                    sort.property.clone(),
                    format!(
                        "unknown sort property for resource type '{}'",
                        effective.name
                    ),
                )
            })?;
        Ok(Some(ResolvedSort {
            column: property.column.clone(),
            ascending: sort.ascending,
        }))
    }
}

/// Argument validation happens before any parsing or execution.
fn validate_request(request: &SearchRequest) -> SearchResult<()> {
    if request.cursor < 0 {
        return Err(SearchError::InvalidArgument(format!(
            "cursor must not be negative (got {})",
            request.cursor
        )));
    }
    if request.security_aware && request.security_token.is_none() {
        return Err(SearchError::InvalidArgument(
            "security-aware search requires an authenticated token".to_string(),
        ));
    }
    Ok(())
}

fn control_of(request: &SearchRequest) -> QueryControl {
    QueryControl {
        timeout: request.timeout,
        cancel: request.cancel.clone(),
    }
}

fn window_of(request: &SearchRequest) -> PageWindow {
    PageWindow {
        limit: request.max_results,
        offset: request.cursor,
    }
}

/// Renders the pair-list form into query text:
/// `prop1:'val1' prop2:'val2' ... resourcetype:'Type'`.
fn render_pairs(pairs: &[(&str, &str)], resource_type: &str) -> String {
    let mut parts: Vec<String> = pairs
        .iter()
        .map(|(name, value)| format!("{}:'{}'", name, escape_literal(value)))
        .collect();
    parts.push(format!(
        "{}:'{}'",
        RESOURCE_TYPE_TOKEN,
        escape_literal(resource_type)
    ));
    parts.join(" ")
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
