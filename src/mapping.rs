//! Field to predicate resolution.
//!
//! A logical field of an entity type is stored under one or more predicates.
//! [`FieldMappingResolver`] is the lookup the host system provides, and
//! [`FieldMappingCache`] memoizes its answers for one compile pass.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::{ConditionError, ConditionResult};

/// Resolves a field of an entity type to its candidate predicates.
///
/// Predicates are returned in their final query form (`<http://...>` or a
/// prefixed name). Implementations must be deterministic for a given
/// `(entity_type, field)` pair, and fail with
/// [`ConditionError::UnknownFieldMapping`] when the field is not mapped.
pub trait FieldMappingResolver {
    fn resolve(&self, entity_type: &str, field: &str) -> ConditionResult<BTreeSet<String>>;
}

/// An in-memory mapping table keyed by entity type and field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticMappings {
    entity_types: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl StaticMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, P>(&mut self, entity_type: &str, field: &str, predicates: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.entity_types
            .entry(entity_type.to_string())
            .or_default()
            .entry(field.to_string())
            .or_default()
            .extend(predicates.into_iter().map(Into::into));
    }

    pub fn with<I, P>(mut self, entity_type: &str, field: &str, predicates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.insert(entity_type, field, predicates);
        self
    }
}

impl FieldMappingResolver for StaticMappings {
    fn resolve(&self, entity_type: &str, field: &str) -> ConditionResult<BTreeSet<String>> {
        self.entity_types
            .get(entity_type)
            .and_then(|fields| fields.get(field))
            .filter(|predicates| !predicates.is_empty())
            .cloned()
            .ok_or_else(|| ConditionError::UnknownFieldMapping {
                entity_type: entity_type.to_string(),
                field: field.to_string(),
            })
    }
}

// =============================================================================
// PER-COMPILE CACHE
// =============================================================================

/// The frozen mapping of one field within a compile pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldMapping {
    /// The id key: the field is the subject itself.
    Subject,
    /// A single predicate, used directly in triple patterns.
    Predicate(String),
    /// Several candidate predicates, bound through a predicate variable that
    /// an auxiliary `VALUES` clause restricts to `candidates`.
    PredicateVariable {
        variable: String,
        candidates: Vec<String>,
    },
}

impl FieldMapping {
    /// The predicate position to use when binding the field, if any.
    pub fn predicate(&self) -> Option<&str> {
        match self {
            FieldMapping::Subject => None,
            FieldMapping::Predicate(predicate) => Some(predicate),
            FieldMapping::PredicateVariable { variable, .. } => Some(variable),
        }
    }
}

/// Memo of field mappings for a single compile pass.
///
/// The resolver is consulted at most once per field, so a field never mixes
/// the single and multiple forms within one pass.
///
/// Each group owns its own cache, nested groups included. A multi-predicate
/// field used in a parent and in a nested group therefore gets an auxiliary
/// `VALUES` clause in each, so every union branch restricts its own
/// predicate variable.
#[derive(Clone, Debug, Default)]
pub struct FieldMappingCache {
    mappings: HashMap<String, FieldMapping>,
}

impl FieldMappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&FieldMapping> {
        self.mappings.get(field)
    }

    /// Returns the mapping of `field`, computing it with `resolve` on first
    /// use. The flag is `true` when the mapping was created by this call.
    pub fn get_or_try_insert<F>(&mut self, field: &str, resolve: F) -> ConditionResult<(&FieldMapping, bool)>
    where
        F: FnOnce() -> ConditionResult<FieldMapping>,
    {
        match self.mappings.entry(field.to_string()) {
            Entry::Occupied(entry) => Ok((&*entry.into_mut(), false)),
            Entry::Vacant(entry) => {
                let mapping = resolve()?;
                trace!("Mapped field '{}' to {:?}", field, mapping);
                Ok((&*entry.insert(mapping), true))
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldMapping)> {
        self.mappings.iter().map(|(field, mapping)| (field.as_str(), mapping))
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mappings() -> StaticMappings {
        StaticMappings::new()
            .with("node", "title", ["<http://example.com/title>"])
            .with("node", "body", ["<http://example.com/b>", "<http://example.com/a>"])
    }

    #[test]
    fn test_static_mappings_resolve_single() {
        let predicates = mappings().resolve("node", "title").unwrap();
        assert_eq!(predicates.len(), 1);
        assert!(predicates.contains("<http://example.com/title>"));
    }

    #[test]
    fn test_static_mappings_candidates_are_ordered() {
        let predicates: Vec<String> = mappings().resolve("node", "body").unwrap().into_iter().collect();
        assert_eq!(predicates, vec!["<http://example.com/a>", "<http://example.com/b>"]);
    }

    #[test]
    fn test_static_mappings_unknown_field() {
        let err = mappings().resolve("node", "missing").unwrap_err();
        assert_eq!(
            err,
            ConditionError::UnknownFieldMapping {
                entity_type: "node".to_string(),
                field: "missing".to_string()
            }
        );
        assert!(mappings().resolve("user", "title").is_err());
    }

    #[test]
    fn test_static_mappings_empty_set_is_unknown() {
        let table = StaticMappings::new().with("node", "ghost", Vec::<String>::new());
        assert!(matches!(
            table.resolve("node", "ghost"),
            Err(ConditionError::UnknownFieldMapping { .. })
        ));
    }

    #[test]
    fn test_static_mappings_deserialize() {
        let json = r#"{"node": {"title": ["<http://example.com/title>"]}}"#;
        let table: StaticMappings = serde_json::from_str(json).unwrap();
        assert_eq!(table, StaticMappings::new().with("node", "title", ["<http://example.com/title>"]));
    }

    #[test]
    fn test_cache_resolves_once() {
        let mut cache = FieldMappingCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            let (mapping, _) = cache
                .get_or_try_insert("title", || {
                    calls += 1;
                    Ok(FieldMapping::Predicate("<http://example.com/title>".to_string()))
                })
                .unwrap();
            assert_eq!(mapping.predicate(), Some("<http://example.com/title>"));
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_reports_first_insert_only() {
        let mut cache = FieldMappingCache::new();
        let (_, first) = cache.get_or_try_insert("id", || Ok(FieldMapping::Subject)).unwrap();
        let (_, second) = cache.get_or_try_insert("id", || Ok(FieldMapping::Subject)).unwrap();
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn test_cache_does_not_store_failures() {
        let mut cache = FieldMappingCache::new();
        let result = cache.get_or_try_insert("body", || {
            Err(ConditionError::UnknownFieldMapping {
                entity_type: "node".to_string(),
                field: "body".to_string(),
            })
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
