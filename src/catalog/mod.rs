//! Token catalog: the resolver mapping logical names used in query text to
//! physical descriptors.
//!
//! The catalog is built once from schema-validated JSON configuration, is
//! immutable afterwards, and is safe to share across threads behind an
//! [`Arc`]. A process-wide registry caches catalogs by configuration id so
//! repeated lookups never re-read configuration.

pub mod config;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SearchError, SearchResult};

pub use config::CatalogConfig;

/// Stable identifier of a resource in the repository.
pub type ResourceId = i64;

/// Declared data type of a scalar property.
///
/// A closed enumeration: each variant carries its own parse/validate rule in
/// [`DataType::parse_value`], so literal validation is a match dispatch
/// rather than a runtime type lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    DateTime,
    Guid,
    Boolean,
    Int32,
    Int64,
    Decimal,
}

/// A literal value validated against a property's declared data type,
/// ready to be bound as a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Guid(Uuid),
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::DateTime => "datetime",
            DataType::Guid => "guid",
            DataType::Boolean => "boolean",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Decimal => "decimal",
        }
    }

    /// Parses and validates a raw literal for this data type.
    ///
    /// Failures are query-syntax errors carrying the offending literal, so
    /// the caller can correct the query before anything reaches the store.
    pub fn parse_value(self, raw: &str) -> SearchResult<ParamValue> {
        let invalid = || SearchError::syntax(raw, format!("not a valid {} literal", self.name()));

        match self {
            DataType::String => Ok(ParamValue::Text(raw.to_string())),
            DataType::DateTime => parse_datetime(raw)
                .map(ParamValue::DateTime)
                .ok_or_else(invalid),
            DataType::Guid => Uuid::parse_str(raw).map(ParamValue::Guid).map_err(|_| invalid()),
            DataType::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(ParamValue::Boolean(true)),
                "false" | "0" => Ok(ParamValue::Boolean(false)),
                _ => Err(invalid()),
            },
            DataType::Int32 => raw
                .parse::<i32>()
                .map(|n| ParamValue::Integer(n as i64))
                .map_err(|_| invalid()),
            DataType::Int64 => raw
                .parse::<i64>()
                .map(ParamValue::Integer)
                .map_err(|_| invalid()),
            DataType::Decimal => match raw.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(ParamValue::Real(n)),
                _ => Err(invalid()),
            },
        }
    }
}

/// Accepted date-time literal shapes, most specific first. A bare date means
/// midnight; equality widening back to the full day happens at compile time.
pub(crate) fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Widens a date-time to the half-open day interval `[day, day + 1)`.
pub(crate) fn day_interval(value: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    let start = value.date().and_hms_opt(0, 0, 0).expect("midnight is valid");
    (start, start + Duration::days(1))
}

/// A registered resource type: full name, stable identifier, and optional
/// parent in the single-inheritance chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTypeDescriptor {
    pub name: String,
    pub id: Uuid,
    #[serde(default)]
    pub parent: Option<String>,
}

/// A scalar property of a resource type, resolvable by logical name for the
/// declaring type and all of its subtypes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    pub resource_type: String,
    pub column: String,
    pub data_type: DataType,
    /// Whether the column participates in full-text search. Word operators
    /// on searchable columns compile to text-search containment; other
    /// columns fall back to escaped pattern matching.
    #[serde(default)]
    pub searchable: bool,
}

/// Traversal direction of a predicate from the outer resource's point of
/// view: whether the outer resource is the subject or the object end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TraversalDirection {
    SubjectToObject,
    ObjectToSubject,
}

/// A named, directed relationship type connecting two resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredicateDescriptor {
    pub name: String,
    pub id: Uuid,
    pub subject_type: String,
    pub object_type: String,
    pub direction: TraversalDirection,
}

impl PredicateDescriptor {
    /// Resource type of the outer end of the traversal.
    pub fn anchor_type(&self) -> &str {
        match self.direction {
            TraversalDirection::SubjectToObject => &self.subject_type,
            TraversalDirection::ObjectToSubject => &self.object_type,
        }
    }

    /// Resource type reached through the traversal; names inside the nested
    /// subtree resolve against this type.
    pub fn target_type(&self) -> &str {
        match self.direction {
            TraversalDirection::SubjectToObject => &self.object_type,
            TraversalDirection::ObjectToSubject => &self.subject_type,
        }
    }
}

/// Sentinel type identifier used when exclusion removes every candidate
/// type: the compiled statement stays valid but can never match a row.
pub fn sentinel_type_id() -> Uuid {
    Uuid::nil()
}

/// The resolver mapping logical property and predicate names to physical
/// descriptors, scoped by resource type. Immutable once built.
#[derive(Debug)]
pub struct TokenCatalog {
    id: String,
    default_type: String,
    types: HashMap<String, Arc<ResourceTypeDescriptor>>,
    children: HashMap<String, Vec<String>>,
    excluded_types: HashSet<String>,
    properties: HashMap<(String, String), Arc<PropertyDescriptor>>,
    predicates: HashMap<String, Arc<PredicateDescriptor>>,
    excluded_predicates: HashSet<String>,
    implicit_properties: Vec<String>,
}

impl TokenCatalog {
    /// Builds a catalog from a configuration document, running schema
    /// validation and referential checks. Any violation is a configuration
    /// error; there is no fallback to defaults.
    pub fn from_value(document: &serde_json::Value) -> SearchResult<Self> {
        let config = config::parse_document(document)?;
        Self::from_config(config)
    }

    /// Reads, validates, and builds a catalog from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> SearchResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let document: serde_json::Value = serde_json::from_str(&text)?;
        Self::from_value(&document)
    }

    pub fn from_config(config: CatalogConfig) -> SearchResult<Self> {
        let mut types = HashMap::new();
        for descriptor in config.resource_types {
            let key = descriptor.name.to_lowercase();
            if types.insert(key, Arc::new(descriptor)).is_some() {
                return Err(SearchError::Configuration(
                    "duplicate resource type name".to_string(),
                ));
            }
        }

        // Parent references must exist and the chain must terminate.
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for descriptor in types.values() {
            if let Some(parent) = &descriptor.parent {
                let parent_key = parent.to_lowercase();
                if !types.contains_key(&parent_key) {
                    return Err(SearchError::Configuration(format!(
                        "resource type '{}' names unknown parent '{}'",
                        descriptor.name, parent
                    )));
                }
                children
                    .entry(parent_key)
                    .or_default()
                    .push(descriptor.name.to_lowercase());
            }
        }
        for descriptor in types.values() {
            let mut steps = 0;
            let mut cursor = descriptor.parent.clone();
            while let Some(parent) = cursor {
                steps += 1;
                if steps > types.len() {
                    return Err(SearchError::Configuration(format!(
                        "inheritance cycle through resource type '{}'",
                        descriptor.name
                    )));
                }
                cursor = types[&parent.to_lowercase()].parent.clone();
            }
        }
        // Deterministic expansion order regardless of configuration order.
        for siblings in children.values_mut() {
            siblings.sort();
        }

        let default_key = config.default_resource_type.to_lowercase();
        if !types.contains_key(&default_key) {
            return Err(SearchError::Configuration(format!(
                "default resource type '{}' is not registered",
                config.default_resource_type
            )));
        }

        let mut excluded_types = HashSet::new();
        for name in &config.excluded_resource_types {
            let key = name.to_lowercase();
            if !types.contains_key(&key) {
                return Err(SearchError::Configuration(format!(
                    "excluded resource type '{}' is not registered",
                    name
                )));
            }
            excluded_types.insert(key);
        }

        let mut properties = HashMap::new();
        for descriptor in config.properties {
            let scope_key = descriptor.resource_type.to_lowercase();
            if !types.contains_key(&scope_key) {
                return Err(SearchError::Configuration(format!(
                    "property '{}' names unknown resource type '{}'",
                    descriptor.name, descriptor.resource_type
                )));
            }
            let name_key = descriptor.name.to_lowercase();
            if name_key == crate::lql::lexer::RESOURCE_TYPE_TOKEN {
                return Err(SearchError::Configuration(format!(
                    "property name '{}' collides with the reserved pseudo-property",
                    descriptor.name
                )));
            }
            if properties
                .insert((scope_key, name_key), Arc::new(descriptor))
                .is_some()
            {
                return Err(SearchError::Configuration(
                    "duplicate property name within a resource type".to_string(),
                ));
            }
        }

        let mut predicates = HashMap::new();
        for descriptor in config.predicates {
            for endpoint in [&descriptor.subject_type, &descriptor.object_type] {
                if !types.contains_key(&endpoint.to_lowercase()) {
                    return Err(SearchError::Configuration(format!(
                        "predicate '{}' names unknown resource type '{}'",
                        descriptor.name, endpoint
                    )));
                }
            }
            let key = descriptor.name.to_lowercase();
            if predicates.insert(key, Arc::new(descriptor)).is_some() {
                return Err(SearchError::Configuration(
                    "duplicate predicate name".to_string(),
                ));
            }
        }

        let mut excluded_predicates = HashSet::new();
        for name in &config.excluded_predicates {
            let key = name.to_lowercase();
            if !predicates.contains_key(&key) {
                return Err(SearchError::Configuration(format!(
                    "excluded predicate '{}' is not registered",
                    name
                )));
            }
            excluded_predicates.insert(key);
        }

        for name in &config.implicit_properties {
            let key = name.to_lowercase();
            if !properties.keys().any(|(_, prop)| prop == &key) {
                return Err(SearchError::Configuration(format!(
                    "implicit property '{}' is not registered on any resource type",
                    name
                )));
            }
        }

        Ok(Self {
            id: config.id,
            default_type: default_key,
            types,
            children,
            excluded_types,
            properties,
            predicates,
            excluded_predicates,
            implicit_properties: config.implicit_properties,
        })
    }

    pub fn configuration_id(&self) -> &str {
        &self.id
    }

    pub fn default_type(&self) -> Arc<ResourceTypeDescriptor> {
        self.types[&self.default_type].clone()
    }

    /// Looks up a resource type by name, case-insensitively.
    pub fn resource_type(&self, name: &str) -> Option<Arc<ResourceTypeDescriptor>> {
        self.types.get(&name.to_lowercase()).cloned()
    }

    /// Resolves a property name for a scope type, walking the ancestor chain
    /// so subtypes see inherited properties.
    pub fn property(
        &self,
        scope: &ResourceTypeDescriptor,
        name: &str,
    ) -> Option<Arc<PropertyDescriptor>> {
        let name_key = name.to_lowercase();
        let mut cursor = Some(scope.name.to_lowercase());
        while let Some(type_key) = cursor {
            if let Some(descriptor) = self.properties.get(&(type_key.clone(), name_key.clone())) {
                return Some(descriptor.clone());
            }
            cursor = self
                .types
                .get(&type_key)
                .and_then(|t| t.parent.as_ref().map(|p| p.to_lowercase()));
        }
        None
    }

    /// Resolves a predicate name. Excluded predicates resolve as unknown,
    /// so callers cannot traverse them.
    pub fn predicate(&self, name: &str) -> Option<Arc<PredicateDescriptor>> {
        let key = name.to_lowercase();
        if self.excluded_predicates.contains(&key) {
            return None;
        }
        self.predicates.get(&key).cloned()
    }

    /// True when `descendant` equals `ancestor` or inherits from it.
    pub fn is_descendant(&self, descendant: &str, ancestor: &str) -> bool {
        let ancestor_key = ancestor.to_lowercase();
        let mut cursor = Some(descendant.to_lowercase());
        while let Some(type_key) = cursor {
            if type_key == ancestor_key {
                return true;
            }
            cursor = self
                .types
                .get(&type_key)
                .and_then(|t| t.parent.as_ref().map(|p| p.to_lowercase()));
        }
        false
    }

    /// Expands a scope type into the identifiers of every matching type:
    /// the type itself plus all registered subtypes, skipping excluded
    /// types. An excluded type's subtypes remain reachable downward.
    pub fn expand_hierarchy(&self, scope: &ResourceTypeDescriptor) -> Vec<Uuid> {
        let mut ids = Vec::new();
        let mut queue = vec![scope.name.to_lowercase()];
        while let Some(type_key) = queue.pop() {
            if !self.excluded_types.contains(&type_key) {
                if let Some(descriptor) = self.types.get(&type_key) {
                    ids.push(descriptor.id);
                }
            }
            if let Some(subtypes) = self.children.get(&type_key) {
                queue.extend(subtypes.iter().cloned());
            }
        }
        ids
    }

    /// Implicit properties visible from a scope type, used when a query
    /// term names no property.
    pub fn implicit_properties(
        &self,
        scope: &ResourceTypeDescriptor,
    ) -> Vec<Arc<PropertyDescriptor>> {
        self.implicit_properties
            .iter()
            .filter_map(|name| self.property(scope, name))
            .collect()
    }

    /// All distinct searchable columns, in deterministic order. These are
    /// the columns full-text content search matches against.
    pub fn searchable_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .properties
            .values()
            .filter(|p| p.searchable)
            .map(|p| p.column.clone())
            .collect();
        columns.sort();
        columns.dedup();
        columns
    }
}

static REGISTRY: Lazy<RwLock<HashMap<String, Arc<TokenCatalog>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Installs a catalog in the process-wide registry, replacing any catalog
/// with the same configuration id, and returns the shared handle.
pub fn install(catalog: TokenCatalog) -> Arc<TokenCatalog> {
    let shared = Arc::new(catalog);
    REGISTRY
        .write()
        .insert(shared.configuration_id().to_string(), shared.clone());
    shared
}

/// Looks up a previously installed catalog by configuration id.
pub fn installed(configuration_id: &str) -> Option<Arc<TokenCatalog>> {
    REGISTRY.read().get(configuration_id).cloned()
}
