//! AST-to-statement emission.
//!
//! Every AST node compiles to a [`Clause`]: a `SELECT` that always denotes a
//! set of matching resource identifiers. Boolean composition is set algebra
//! over those sets (`INTERSECT`/`UNION`/`EXCEPT`) rather than an inlined
//! WHERE expression, because a relationship traversal changes the frame of
//! reference: a nested subtree matches resources reached *through* the
//! predicate, not the outer resource itself.
//!
//! The emitted dialect is SQLite: positional `?` placeholders, FTS5 `MATCH`
//! for searchable columns, `LIKE ... ESCAPE` as the pattern fallback. All
//! literal values are parameter-bound; identifier names (columns, tables)
//! come only from validated catalog entries.

use crate::catalog::{
    self, DataType, ParamValue, PredicateDescriptor, PropertyDescriptor,
    ResourceTypeDescriptor, TokenCatalog, TraversalDirection,
};
use crate::error::{SearchError, SearchResult};
use super::ast::{AstNode, Comparison};

/// Resource table: one row per resource, `id` primary key, `resource_type`
/// holding the type identifier, plus the catalog-declared property columns.
pub const RESOURCES_TABLE: &str = "resources";
/// Relationship table: `(subject_id, object_id, predicate_id)` triples.
pub const RELATIONSHIPS_TABLE: &str = "relationships";
/// FTS5 index over the searchable columns, rowid-joined to the resources.
pub const FTS_TABLE: &str = "resources_fts";
/// Column of `resources` holding the resource type identifier.
pub const TYPE_COLUMN: &str = "resource_type";

/// A relational statement with its positionally bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterizedStatement {
    pub sql: String,
    pub params: Vec<ParamValue>,
}

/// A SQL fragment selecting a single identifier column named `id`, used by
/// authorization providers to restrict results to visible identifiers.
#[derive(Debug, Clone)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<ParamValue>,
}

/// A compiled identifier set: a `SELECT` producing an `id` column (plus a
/// `weight` column for scored full-text clauses).
#[derive(Debug, Clone)]
pub struct Clause {
    sql: String,
    params: Vec<ParamValue>,
    scored: bool,
}

impl Clause {
    fn plain(sql: String, params: Vec<ParamValue>) -> Self {
        Self {
            sql,
            params,
            scored: false,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[ParamValue] {
        &self.params
    }

    pub fn is_scored(&self) -> bool {
        self.scored
    }

    /// Set intersection of two identifier sets.
    pub fn intersect(self, other: Clause) -> Clause {
        self.compose("INTERSECT", other)
    }

    /// Set union of two identifier sets.
    pub fn union(self, other: Clause) -> Clause {
        self.compose("UNION", other)
    }

    /// Set difference: identifiers in `self` but not in `other`.
    pub fn except(self, other: Clause) -> Clause {
        self.compose("EXCEPT", other)
    }

    fn compose(self, operator: &str, other: Clause) -> Clause {
        let sql = format!(
            "SELECT id FROM ({}) {} SELECT id FROM ({})",
            self.sql, operator, other.sql
        );
        let mut params = self.params;
        params.extend(other.params);
        Clause {
            sql,
            params,
            scored: false,
        }
    }

    /// Restricts the set to identifiers also selected by an authorization
    /// fragment. Preserves the weight column of scored clauses.
    pub fn restrict(self, fragment: &SqlFragment) -> Clause {
        let columns = if self.scored { "id, weight" } else { "id" };
        let sql = format!(
            "SELECT {} FROM ({}) WHERE id IN ({})",
            columns, self.sql, fragment.sql
        );
        let mut params = self.params;
        params.extend(fragment.params.iter().cloned());
        Clause {
            sql,
            params,
            scored: self.scored,
        }
    }

    /// The bare statement selecting this identifier set, unordered.
    pub fn into_statement(self) -> ParameterizedStatement {
        ParameterizedStatement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Escapes `LIKE` metacharacters so a literal value matches itself only.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Renders an FTS5 match expression for one column, as a quoted phrase with
/// doubled inner quotes, optionally with a prefix star.
fn fts_match_expr(column: &str, value: &str, prefix: bool) -> String {
    let phrase = value.replace('"', "\"\"");
    if prefix {
        format!("{column} : \"{phrase}\"*")
    } else {
        format!("{column} : \"{phrase}\"")
    }
}

/// Renders an FTS5 match expression over every indexed column.
fn fts_content_expr(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

pub struct Compiler<'a> {
    catalog: &'a TokenCatalog,
}

impl<'a> Compiler<'a> {
    pub fn new(catalog: &'a TokenCatalog) -> Self {
        Self { catalog }
    }

    /// Compiles an AST into the identifier set it denotes, scoped to the
    /// effective resource type. Deterministic: the same AST and catalog
    /// always produce the same statement text and parameter order.
    pub fn compile(
        &self,
        ast: &AstNode,
        scope: &ResourceTypeDescriptor,
    ) -> SearchResult<Clause> {
        let clause = self.clause(ast, scope)?;
        tracing::debug!(sql = %clause.sql, "compiled query");
        Ok(clause)
    }

    fn clause(&self, ast: &AstNode, scope: &ResourceTypeDescriptor) -> SearchResult<Clause> {
        match ast {
            AstNode::And(left, right) => {
                Ok(self.clause(left, scope)?.intersect(self.clause(right, scope)?))
            }
            AstNode::Or(left, right) => {
                Ok(self.clause(left, scope)?.union(self.clause(right, scope)?))
            }
            AstNode::Not(operand) => {
                Ok(self.all_of_type(scope).except(self.clause(operand, scope)?))
            }
            AstNode::AllResources => Ok(self.all_of_type(scope)),
            AstNode::Predicate {
                property,
                operator,
                value,
            } => self.predicate_clause(scope, property, *operator, value),
            AstNode::Traversal { predicate, nested } => {
                let target = self
                    .catalog
                    .resource_type(predicate.target_type())
                    .ok_or_else(|| {
                        SearchError::Configuration(format!(
                            "predicate '{}' targets unregistered type '{}'",
                            predicate.name,
                            predicate.target_type()
                        ))
                    })?;
                let nested_clause = self.clause(nested, &target)?;
                Ok(self.traversal_clause(scope, predicate, nested_clause))
            }
        }
    }

    /// Every resource whose type is the scope type or a non-excluded
    /// subtype of it.
    fn all_of_type(&self, scope: &ResourceTypeDescriptor) -> Clause {
        let (filter, params) = self.type_filter(scope);
        Clause::plain(
            format!("SELECT r.id AS id FROM {RESOURCES_TABLE} r WHERE {filter}"),
            params,
        )
    }

    /// Hierarchy expansion: the scope type plus its registered subtypes,
    /// minus excluded types. When exclusion removes every candidate the
    /// sentinel identifier keeps the statement valid but unmatchable.
    fn type_filter(&self, scope: &ResourceTypeDescriptor) -> (String, Vec<ParamValue>) {
        let mut ids = self.catalog.expand_hierarchy(scope);
        if ids.is_empty() {
            ids.push(catalog::sentinel_type_id());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let params = ids.into_iter().map(ParamValue::Guid).collect();
        (
            format!("r.{TYPE_COLUMN} IN ({placeholders})"),
            params,
        )
    }

    fn predicate_clause(
        &self,
        scope: &ResourceTypeDescriptor,
        property: &PropertyDescriptor,
        operator: Comparison,
        value: &str,
    ) -> SearchResult<Clause> {
        self.ensure_supported(property, operator)?;
        let (type_filter, mut params) = self.type_filter(scope);
        let criterion = self.criterion(property, operator, value, &mut params)?;
        Ok(Clause::plain(
            format!(
                "SELECT r.id AS id FROM {RESOURCES_TABLE} r WHERE {type_filter} AND {criterion}"
            ),
            params,
        ))
    }

    fn ensure_supported(
        &self,
        property: &PropertyDescriptor,
        operator: Comparison,
    ) -> SearchResult<()> {
        let supported = if operator.is_word() {
            property.data_type == DataType::String
        } else if operator.is_ordering() {
            !matches!(property.data_type, DataType::Boolean | DataType::Guid)
        } else {
            true
        };
        if supported {
            Ok(())
        } else {
            Err(SearchError::syntax(
                property.name.clone(),
                format!(
                    "operator '{}' is not supported for {} properties",
                    operator.symbol(),
                    property.data_type.name()
                ),
            ))
        }
    }

    /// Emits the comparison criterion for one predicate leaf, appending its
    /// bound parameters in emission order.
    fn criterion(
        &self,
        property: &PropertyDescriptor,
        operator: Comparison,
        value: &str,
        params: &mut Vec<ParamValue>,
    ) -> SearchResult<String> {
        let column = &property.column;

        if operator.is_word() {
            let prefix = operator == Comparison::WordStartsWith;
            if property.searchable {
                params.push(ParamValue::Text(fts_match_expr(column, value, prefix)));
                return Ok(format!(
                    "r.id IN (SELECT rowid FROM {FTS_TABLE} WHERE {FTS_TABLE} MATCH ?)"
                ));
            }
            // Pattern fallback approximates word semantics by containment.
            params.push(ParamValue::Text(format!("%{}%", escape_like(value))));
            return Ok(format!("r.{column} LIKE ? ESCAPE '\\'"));
        }

        let parsed = property.data_type.parse_value(value)?;

        if property.data_type == DataType::DateTime
            && matches!(operator, Comparison::Equal | Comparison::NotEqual)
        {
            // Date equality widens to a half-open day interval to absorb
            // time-of-day components.
            let ParamValue::DateTime(moment) = parsed else {
                unreachable!("datetime parse yields datetime values");
            };
            let (start, end) = catalog::day_interval(moment);
            params.push(ParamValue::DateTime(start));
            params.push(ParamValue::DateTime(end));
            return Ok(if operator == Comparison::Equal {
                format!("(r.{column} >= ? AND r.{column} < ?)")
            } else {
                format!("(r.{column} < ? OR r.{column} >= ?)")
            });
        }

        params.push(parsed);
        Ok(format!("r.{column} {} ?", sql_symbol(operator)))
    }

    /// A traversal joins the resource table to the relationship table,
    /// filtered by predicate identity and direction, intersected with the
    /// identifier set of the nested subtree.
    fn traversal_clause(
        &self,
        scope: &ResourceTypeDescriptor,
        predicate: &PredicateDescriptor,
        nested: Clause,
    ) -> Clause {
        let (near, far) = match predicate.direction {
            TraversalDirection::SubjectToObject => ("t.subject_id", "t.object_id"),
            TraversalDirection::ObjectToSubject => ("t.object_id", "t.subject_id"),
        };
        let (type_filter, mut params) = self.type_filter(scope);
        params.push(ParamValue::Guid(predicate.id));
        params.extend(nested.params);
        Clause::plain(
            format!(
                "SELECT DISTINCT r.id AS id FROM {RESOURCES_TABLE} r \
                 JOIN {RELATIONSHIPS_TABLE} t ON {near} = r.id \
                 WHERE {type_filter} AND t.predicate_id = ? AND {far} IN (SELECT id FROM ({}))",
                nested.sql
            ),
            params,
        )
    }

    /// Compiles a full-text content search over every searchable column,
    /// scoped to the effective type. Each match carries a raw weight for
    /// percentage ranking.
    pub fn compile_content(
        &self,
        text: &str,
        scope: &ResourceTypeDescriptor,
    ) -> SearchResult<Clause> {
        if self.catalog.searchable_columns().is_empty() {
            return Err(SearchError::Configuration(
                "no searchable properties configured for content search".to_string(),
            ));
        }
        let (type_filter, type_params) = self.type_filter(scope);
        let mut params = vec![ParamValue::Text(fts_content_expr(text))];
        params.extend(type_params);
        let sql = format!(
            "SELECT r.id AS id, f.weight AS weight FROM {RESOURCES_TABLE} r \
             JOIN (SELECT rowid AS match_id, -bm25({FTS_TABLE}) AS weight \
             FROM {FTS_TABLE} WHERE {FTS_TABLE} MATCH ?) f ON f.match_id = r.id \
             WHERE {type_filter}"
        );
        tracing::debug!(sql = %sql, "compiled content search");
        Ok(Clause {
            sql,
            params,
            scored: true,
        })
    }
}

fn sql_symbol(operator: Comparison) -> &'static str {
    match operator {
        Comparison::Equal => "=",
        Comparison::NotEqual => "<>",
        Comparison::LessThan => "<",
        Comparison::LessThanOrEqual => "<=",
        Comparison::GreaterThan => ">",
        Comparison::GreaterThanOrEqual => ">=",
        Comparison::WordEqual | Comparison::WordStartsWith => {
            unreachable!("word operators render as containment criteria")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lql::parse;
    use serde_json::json;

    fn catalog() -> TokenCatalog {
        TokenCatalog::from_value(&json!({
            "id": "compiler-tests",
            "defaultResourceType": "Resource",
            "resourceTypes": [
                { "name": "Resource", "id": "11111111-1111-1111-1111-111111111111" },
                { "name": "Work", "id": "22222222-2222-2222-2222-222222222222", "parent": "Resource" },
                { "name": "Book", "id": "33333333-3333-3333-3333-333333333333", "parent": "Work" },
                { "name": "Person", "id": "44444444-4444-4444-4444-444444444444", "parent": "Resource" },
                { "name": "Contact", "id": "55555555-5555-5555-5555-555555555555", "parent": "Person" }
            ],
            "excludedResourceTypes": ["Contact"],
            "properties": [
                { "name": "Title", "resourceType": "Resource", "column": "title", "dataType": "string", "searchable": true },
                { "name": "Author", "resourceType": "Work", "column": "author", "dataType": "string" },
                { "name": "DateAdded", "resourceType": "Resource", "column": "date_added", "dataType": "datetime" },
                { "name": "Pages", "resourceType": "Book", "column": "pages", "dataType": "int32" },
                { "name": "Archived", "resourceType": "Resource", "column": "archived", "dataType": "boolean" },
                { "name": "Name", "resourceType": "Person", "column": "name", "dataType": "string" }
            ],
            "predicates": [
                {
                    "name": "AuthoredBy",
                    "id": "66666666-6666-6666-6666-666666666666",
                    "subjectType": "Work",
                    "objectType": "Person",
                    "direction": "subjectToObject"
                }
            ],
            "implicitProperties": ["Title"]
        }))
        .unwrap()
    }

    fn compile(text: &str) -> Clause {
        let catalog = catalog();
        let (ast, effective) = parse(text, &catalog).unwrap();
        Compiler::new(&catalog).compile(&ast, &effective).unwrap()
    }

    #[test]
    fn test_searchable_word_predicate_uses_fts() {
        let clause = compile("Title:'zentity' resourcetype:Book");
        assert!(clause.sql().contains("resources_fts MATCH ?"));
        assert_eq!(
            clause.params().last().unwrap(),
            &ParamValue::Text("title : \"zentity\"".to_string())
        );
    }

    #[test]
    fn test_prefix_match_appends_star() {
        let clause = compile("Title:zen* resourcetype:Book");
        assert_eq!(
            clause.params().last().unwrap(),
            &ParamValue::Text("title : \"zen\"*".to_string())
        );
    }

    #[test]
    fn test_plain_column_falls_back_to_like() {
        let clause = compile("Author:'50% _done_' resourcetype:Work");
        assert!(clause.sql().contains("r.author LIKE ? ESCAPE '\\'"));
        assert_eq!(
            clause.params().last().unwrap(),
            &ParamValue::Text("%50\\% \\_done\\_%".to_string())
        );
    }

    #[test]
    fn test_and_compiles_to_intersect() {
        let clause = compile("Title:a AND Author:b resourcetype:Work");
        assert!(clause.sql().contains("INTERSECT"));
    }

    #[test]
    fn test_or_compiles_to_union() {
        let clause = compile("Title:a OR Title:b");
        assert!(clause.sql().contains("UNION"));
    }

    #[test]
    fn test_not_compiles_to_except_from_all_of_type() {
        let clause = compile("NOT Title:a");
        assert!(clause.sql().starts_with("SELECT id FROM (SELECT r.id AS id"));
        assert!(clause.sql().contains("EXCEPT"));
    }

    #[test]
    fn test_hierarchy_expansion_binds_type_ids() {
        let clause = compile("Title:'x'");
        // Resource expands to Resource, Work, Book, Person; Contact excluded.
        let guid_params = clause
            .params()
            .iter()
            .filter(|p| matches!(p, ParamValue::Guid(_)))
            .count();
        assert_eq!(guid_params, 4);
    }

    #[test]
    fn test_exclusion_of_whole_hierarchy_emits_sentinel() {
        let catalog = TokenCatalog::from_value(&json!({
            "id": "sentinel-test",
            "defaultResourceType": "Ghost",
            "resourceTypes": [
                { "name": "Ghost", "id": "77777777-7777-7777-7777-777777777777" }
            ],
            "excludedResourceTypes": ["Ghost"],
            "properties": [
                { "name": "Title", "resourceType": "Ghost", "column": "title", "dataType": "string" }
            ]
        }))
        .unwrap();
        let (ast, effective) = parse("Title:'x'", &catalog).unwrap();
        let clause = Compiler::new(&catalog).compile(&ast, &effective).unwrap();
        assert!(clause
            .params()
            .contains(&ParamValue::Guid(catalog::sentinel_type_id())));
    }

    #[test]
    fn test_date_equality_widens_to_day_interval() {
        let clause = compile("DateAdded=2024-01-15");
        assert!(clause.sql().contains(">= ? AND r.date_added < ?"));
        let dates: Vec<_> = clause
            .params()
            .iter()
            .filter_map(|p| match p {
                ParamValue::DateTime(dt) => Some(dt.format("%Y-%m-%d").to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(dates, vec!["2024-01-15", "2024-01-16"]);
    }

    #[test]
    fn test_date_ordering_binds_exact_moment() {
        let clause = compile("DateAdded>=2024-01-15");
        assert!(clause.sql().contains("r.date_added >= ?"));
    }

    #[test]
    fn test_invalid_literal_is_syntax_error() {
        let catalog = catalog();
        let (ast, effective) = parse("Pages>ten resourcetype:Book", &catalog).unwrap();
        let err = Compiler::new(&catalog).compile(&ast, &effective).unwrap_err();
        match err {
            SearchError::InvalidSyntax { fragment, .. } => assert_eq!(fragment, "ten"),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_operator_for_data_type() {
        let catalog = catalog();
        let (ast, effective) = parse("Archived>true", &catalog).unwrap();
        assert!(Compiler::new(&catalog).compile(&ast, &effective).is_err());

        let (ast, effective) = parse("Pages:'10' resourcetype:Book", &catalog).unwrap();
        assert!(Compiler::new(&catalog).compile(&ast, &effective).is_err());
    }

    #[test]
    fn test_traversal_joins_relationships() {
        let clause = compile("AuthoredBy.(Name:'Smith') resourcetype:Book");
        assert!(clause.sql().contains("JOIN relationships t ON t.subject_id = r.id"));
        assert!(clause.sql().contains("t.predicate_id = ?"));
        assert!(clause.sql().contains("t.object_id IN (SELECT id FROM ("));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let first = compile("Title:a AND (Author:b OR NOT Pages>3) resourcetype:Book");
        let second = compile("Title:a AND (Author:b OR NOT Pages>3) resourcetype:Book");
        assert_eq!(first.sql(), second.sql());
        assert_eq!(first.params(), second.params());
    }

    #[test]
    fn test_restrict_wraps_with_authorization_fragment() {
        let clause = compile("Title:'x'").restrict(&SqlFragment {
            sql: "SELECT resource_id AS id FROM grants WHERE token = ?".to_string(),
            params: vec![ParamValue::Text("tkn".to_string())],
        });
        assert!(clause.sql().contains("WHERE id IN (SELECT resource_id AS id FROM grants"));
        assert_eq!(
            clause.params().last().unwrap(),
            &ParamValue::Text("tkn".to_string())
        );
    }

    #[test]
    fn test_content_search_is_scored() {
        let catalog = catalog();
        let scope = catalog.default_type();
        let clause = Compiler::new(&catalog)
            .compile_content("database systems", &scope)
            .unwrap();
        assert!(clause.is_scored());
        assert!(clause.sql().contains("-bm25(resources_fts)"));
        assert_eq!(
            clause.params().first().unwrap(),
            &ParamValue::Text("\"database systems\"".to_string())
        );
    }
}
