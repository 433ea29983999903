//! lattice - query language compiler and search services for a
//! graph-shaped resource repository.
//!
//! Callers express filters in a small query language ("find Books where
//! Title contains X and Author is Y"); the crate compiles them into
//! parameterized relational statements over a triple-like store (resources,
//! typed relationships, named predicates), honoring type hierarchies,
//! security filtering, and two ranking regimes: exact/boolean match and
//! full-text relevance percentage.
//!
//! # Main Components
//!
//! - **Catalog**: resolves logical property/predicate names to physical
//!   descriptors, loaded once from schema-validated JSON configuration
//! - **LQL**: lexer, balance validator, recursive-descent parser, and the
//!   AST-to-statement compiler built on identifier-set algebra
//! - **Search**: request validation, pagination, percentage ranking, and
//!   the execution-channel/authorization collaborator traits
//!
//! # Example
//!
//! ```rust
//! use lattice::catalog::TokenCatalog;
//! use lattice::lql::{parse, Compiler};
//!
//! let catalog = TokenCatalog::from_value(&serde_json::json!({
//!     "id": "example",
//!     "defaultResourceType": "Resource",
//!     "resourceTypes": [
//!         { "name": "Resource", "id": "0d9f6a27-8f21-4d7b-9c0e-0b6b2b6f2f11" },
//!         { "name": "Book", "id": "f3a1c2d4-5e6f-4a0b-8c1d-2e3f4a5b6c7d", "parent": "Resource" }
//!     ],
//!     "properties": [
//!         { "name": "Title", "resourceType": "Resource", "column": "title",
//!           "dataType": "string", "searchable": true }
//!     ],
//!     "implicitProperties": ["Title"]
//! })).unwrap();
//!
//! let (ast, effective) = parse("Title:'graphs' resourcetype:Book", &catalog).unwrap();
//! assert_eq!(effective.name, "Book");
//!
//! let clause = Compiler::new(&catalog).compile(&ast, &effective).unwrap();
//! assert!(clause.sql().starts_with("SELECT"));
//! ```

pub mod catalog;
pub mod error;
pub mod lql;
pub mod search;

pub use catalog::{DataType, ParamValue, ResourceId, TokenCatalog};
pub use error::{SearchError, SearchResult};
pub use lql::{parse, AstNode, Clause, Compiler, ParameterizedStatement, SqlFragment};
pub use search::{
    AuthorizationProvider, CancelToken, ExecutionChannel, MatchRow, QueryControl, ScoredHit,
    ScoredMatches, SearchEngine, SearchMatches, SearchRequest, SortOrder,
};
