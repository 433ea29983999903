//! Query language integration tests: balance validation, parsing, and
//! statement emission over a shared catalog fixture.

use lattice::catalog::{ParamValue, TokenCatalog};
use lattice::lql::{lexer, parse, Compiler};
use lattice::SearchError;
use serde_json::json;

fn catalog() -> TokenCatalog {
    TokenCatalog::from_value(&json!({
        "id": "lql-tests",
        "defaultResourceType": "Resource",
        "resourceTypes": [
            { "name": "Resource", "id": "11111111-1111-1111-1111-111111111111" },
            { "name": "Work", "id": "22222222-2222-2222-2222-222222222222", "parent": "Resource" },
            { "name": "Book", "id": "33333333-3333-3333-3333-333333333333", "parent": "Work" },
            { "name": "Person", "id": "44444444-4444-4444-4444-444444444444", "parent": "Resource" }
        ],
        "properties": [
            { "name": "Title", "resourceType": "Resource", "column": "title", "dataType": "string", "searchable": true },
            { "name": "Author", "resourceType": "Work", "column": "author", "dataType": "string" },
            { "name": "DateAdded", "resourceType": "Resource", "column": "date_added", "dataType": "datetime" },
            { "name": "Pages", "resourceType": "Book", "column": "pages", "dataType": "int32" },
            { "name": "Doi", "resourceType": "Work", "column": "doi", "dataType": "guid" },
            { "name": "Name", "resourceType": "Person", "column": "name", "dataType": "string" }
        ],
        "predicates": [
            {
                "name": "AuthoredBy",
                "id": "66666666-6666-6666-6666-666666666666",
                "subjectType": "Work",
                "objectType": "Person",
                "direction": "subjectToObject"
            },
            {
                "name": "Cites",
                "id": "88888888-8888-8888-8888-888888888888",
                "subjectType": "Work",
                "objectType": "Work",
                "direction": "subjectToObject"
            }
        ],
        "excludedPredicates": ["Cites"],
        "implicitProperties": ["Title"]
    }))
    .unwrap()
}

// ==================== Balance Validator ====================

#[test]
fn test_validator_accepts_exactly_balanced_strings() {
    let balanced = [
        "",
        "Title:'x'",
        "(Title:'x')",
        "((a) AND (b OR (c)))",
        "Title:'unbalanced ( inside literal'",
        "Title:\"also ) fine\"",
    ];
    for text in balanced {
        assert!(lexer::validate_balance(text).is_ok(), "rejected: {text}");
    }

    let unbalanced = ["(", ")", "(()", "())", ")(", "(a AND b", "a) OR (b"];
    for text in unbalanced {
        assert!(lexer::validate_balance(text).is_err(), "accepted: {text}");
    }
}

#[test]
fn test_syntax_error_reported_before_any_compilation() {
    // Example scenario: missing close paren fails in the validator.
    let err = parse("(Title:'x' AND resourcetype:Book", &catalog()).unwrap_err();
    assert!(matches!(err, SearchError::InvalidSyntax { .. }));
}

// ==================== Effective Resource Type ====================

#[test]
fn test_resource_type_token_is_metadata_not_filter() {
    let catalog = catalog();

    let (ast, effective) = parse("resourcetype:Book", &catalog).unwrap();
    assert_eq!(effective.name, "Book");
    assert!(ast.is_all());

    // Position does not matter and the token never shows up in the SQL as
    // a property comparison; the type reaches the statement as hierarchy
    // expansion parameters.
    let (ast, effective) = parse("resourcetype:Book Pages>100", &catalog).unwrap();
    assert_eq!(effective.name, "Book");
    let clause = Compiler::new(&catalog).compile(&ast, &effective).unwrap();
    assert!(!clause.sql().to_lowercase().contains("resourcetype"));
}

#[test]
fn test_default_resource_type_applies_without_token() {
    let (_, effective) = parse("Title:'x'", &catalog()).unwrap();
    assert_eq!(effective.name, "Resource");
}

#[test]
fn test_quoted_resource_type_supports_dotted_full_names() {
    let catalog = TokenCatalog::from_value(&json!({
        "id": "dotted",
        "defaultResourceType": "Repository.Resource",
        "resourceTypes": [
            { "name": "Repository.Resource", "id": "11111111-1111-1111-1111-111111111111" },
            { "name": "Repository.Book", "id": "22222222-2222-2222-2222-222222222222", "parent": "Repository.Resource" }
        ],
        "properties": [
            { "name": "Title", "resourceType": "Repository.Resource", "column": "title", "dataType": "string" }
        ]
    }))
    .unwrap();

    let (_, effective) = parse("resourcetype:'Repository.Book'", &catalog).unwrap();
    assert_eq!(effective.name, "Repository.Book");
}

// ==================== Compilation ====================

#[test]
fn test_comparison_operator_matrix() {
    let catalog = catalog();
    let compiler = Compiler::new(&catalog);
    let cases = [
        ("Pages=100 resourcetype:Book", "r.pages = ?"),
        ("Pages!=100 resourcetype:Book", "r.pages <> ?"),
        ("Pages<100 resourcetype:Book", "r.pages < ?"),
        ("Pages<=100 resourcetype:Book", "r.pages <= ?"),
        ("Pages>100 resourcetype:Book", "r.pages > ?"),
        ("Pages>=100 resourcetype:Book", "r.pages >= ?"),
    ];
    for (text, expected) in cases {
        let (ast, effective) = parse(text, &catalog).unwrap();
        let clause = compiler.compile(&ast, &effective).unwrap();
        assert!(
            clause.sql().contains(expected),
            "{text} missing {expected}: {}",
            clause.sql()
        );
        assert!(clause.params().contains(&ParamValue::Integer(100)));
    }
}

#[test]
fn test_guid_literal_is_validated_and_bound() {
    let catalog = catalog();
    let compiler = Compiler::new(&catalog);

    let (ast, effective) = parse(
        "Doi=99999999-9999-9999-9999-999999999999 resourcetype:Work",
        &catalog,
    )
    .unwrap();
    let clause = compiler.compile(&ast, &effective).unwrap();
    assert!(clause.sql().contains("r.doi = ?"));

    let (ast, effective) = parse("Doi=not-a-guid resourcetype:Work", &catalog).unwrap();
    let err = compiler.compile(&ast, &effective).unwrap_err();
    assert!(matches!(err, SearchError::InvalidSyntax { .. }));
}

#[test]
fn test_excluded_predicate_cannot_be_traversed() {
    let err = parse("Cites.(Title:'x') resourcetype:Book", &catalog()).unwrap_err();
    match err {
        SearchError::InvalidSyntax { fragment, .. } => assert_eq!(fragment, "Cites"),
        other => panic!("expected syntax error, got {other:?}"),
    }
}

#[test]
fn test_parameter_order_follows_statement_text() {
    let catalog = catalog();
    let (ast, effective) = parse(
        "Author:'Smith' AND Pages>100 resourcetype:Book",
        &catalog,
    )
    .unwrap();
    let clause = Compiler::new(&catalog).compile(&ast, &effective).unwrap();

    // Depth-first, left-to-right: the left leaf's parameters (type ids,
    // then the LIKE pattern) precede the right leaf's.
    let texts: Vec<&ParamValue> = clause
        .params()
        .iter()
        .filter(|p| matches!(p, ParamValue::Text(_) | ParamValue::Integer(_)))
        .collect();
    assert_eq!(
        texts,
        vec![
            &ParamValue::Text("%Smith%".to_string()),
            &ParamValue::Integer(100)
        ]
    );
}

#[test]
fn test_emission_is_deterministic_across_calls() {
    let catalog = catalog();
    let compiler = Compiler::new(&catalog);
    let text = "(Title:a OR NOT Author:b) AND AuthoredBy.(Name:'x') resourcetype:Book";

    let (ast, effective) = parse(text, &catalog).unwrap();
    let first = compiler.compile(&ast, &effective).unwrap();
    let (ast, effective) = parse(text, &catalog).unwrap();
    let second = compiler.compile(&ast, &effective).unwrap();

    assert_eq!(first.sql(), second.sql());
    assert_eq!(first.params(), second.params());
}
