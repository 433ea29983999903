//! Catalog configuration loading and validation.
//!
//! The token catalog is described by an external JSON document listing the
//! descriptor tables (resource types, scalar properties, predicates) together
//! with the exclusion lists and the implicit search properties. The document
//! is validated against an embedded JSON Schema before deserialization, so a
//! malformed deployment fails fast instead of falling back to defaults.

use jsonschema::validator_for;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{SearchError, SearchResult};
use super::{PredicateDescriptor, PropertyDescriptor, ResourceTypeDescriptor};

const CATALOG_SCHEMA: &str = include_str!("catalog.schema.json");

/// Deserialized catalog configuration, prior to referential checks.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogConfig {
    pub id: String,
    pub default_resource_type: String,
    pub resource_types: Vec<ResourceTypeDescriptor>,
    #[serde(default)]
    pub excluded_resource_types: Vec<String>,
    pub properties: Vec<PropertyDescriptor>,
    #[serde(default)]
    pub predicates: Vec<PredicateDescriptor>,
    #[serde(default)]
    pub excluded_predicates: Vec<String>,
    #[serde(default)]
    pub implicit_properties: Vec<String>,
}

/// Validates a configuration document against the embedded schema.
///
/// All violations are collected and reported together, with their instance
/// paths, so a deployment problem can be fixed in one pass.
pub fn validate_document(document: &Value) -> SearchResult<()> {
    let schema: Value = serde_json::from_str(CATALOG_SCHEMA)
        .map_err(|e| SearchError::Configuration(format!("embedded catalog schema unreadable: {e}")))?;
    let validator = validator_for(&schema)
        .map_err(|e| SearchError::Configuration(format!("invalid catalog schema: {e}")))?;

    let violations: Vec<String> = validator
        .iter_errors(document)
        .map(|error| format!("{}: {}", error.instance_path(), error))
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SearchError::Configuration(format!(
            "catalog configuration failed schema validation: {}",
            violations.join("; ")
        )))
    }
}

/// Validates and deserializes a configuration document.
pub fn parse_document(document: &Value) -> SearchResult<CatalogConfig> {
    validate_document(document)?;
    serde_json::from_value(document.clone()).map_err(|e| {
        SearchError::Configuration(format!("catalog configuration malformed: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_config() -> Value {
        json!({
            "id": "unit",
            "defaultResourceType": "Resource",
            "resourceTypes": [
                { "name": "Resource", "id": "8f8030c0-9ecd-4f9f-ae5f-7a02f17b5bc5" }
            ],
            "properties": [
                {
                    "name": "Title",
                    "resourceType": "Resource",
                    "column": "title",
                    "dataType": "string",
                    "searchable": true
                }
            ]
        })
    }

    #[test]
    fn test_minimal_config_validates() {
        assert!(validate_document(&minimal_config()).is_ok());
        let config = parse_document(&minimal_config()).unwrap();
        assert_eq!(config.id, "unit");
        assert_eq!(config.resource_types.len(), 1);
        assert_eq!(config.properties[0].column, "title");
    }

    #[test]
    fn test_missing_required_section_is_rejected() {
        let mut doc = minimal_config();
        doc.as_object_mut().unwrap().remove("properties");

        let err = validate_document(&doc).unwrap_err();
        assert!(matches!(err, SearchError::Configuration(_)));
    }

    #[test]
    fn test_bad_uuid_is_rejected() {
        let mut doc = minimal_config();
        doc["resourceTypes"][0]["id"] = json!("not-a-uuid");

        assert!(validate_document(&doc).is_err());
    }

    #[test]
    fn test_bad_column_identifier_is_rejected() {
        let mut doc = minimal_config();
        doc["properties"][0]["column"] = json!("title; DROP TABLE resources");

        assert!(validate_document(&doc).is_err());
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        let mut doc = minimal_config();
        doc.as_object_mut()
            .unwrap()
            .insert("extraSection".to_string(), json!([]));

        assert!(validate_document(&doc).is_err());
    }

    #[test]
    fn test_unknown_data_type_is_rejected() {
        let mut doc = minimal_config();
        doc["properties"][0]["dataType"] = json!("varchar");

        assert!(validate_document(&doc).is_err());
    }
}
