//! Shared fixtures for unit tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use spargebra::SparqlParser;

use crate::compile::CompileContext;
use crate::condition::EntityKeys;
use crate::error::ConditionResult;
use crate::mapping::{FieldMappingResolver, StaticMappings};

pub const ENTITY_TYPE: &str = "node";
pub const RDF_TYPE: &str = "<http://www.w3.org/1999/02/22-rdf-syntax-ns#type>";
pub const TITLE: &str = "<http://example.com/title>";
pub const LABEL: &str = "<http://www.w3.org/2000/01/rdf-schema#label>";
pub const STATUS: &str = "<http://example.com/status>";
pub const BODY_A: &str = "<http://example.com/body>";
pub const BODY_B: &str = "<http://example.com/description>";

/// Entity keys `id` / `type` / `label`.
pub fn keys() -> EntityKeys {
    EntityKeys::new("id", "type").with_label("label")
}

/// `title`, `label`, `status` and `created` have one predicate, `body` has two.
pub fn mappings() -> StaticMappings {
    StaticMappings::new()
        .with(ENTITY_TYPE, "title", [TITLE])
        .with(ENTITY_TYPE, "label", [LABEL])
        .with(ENTITY_TYPE, "status", [STATUS])
        .with(ENTITY_TYPE, "created", ["<http://example.com/created>"])
        .with(ENTITY_TYPE, "body", [BODY_A, BODY_B])
}

/// Wraps another resolver and counts lookups per field.
pub struct CountingResolver<R> {
    inner: R,
    pub calls: RefCell<BTreeMap<String, usize>>,
}

impl<R> CountingResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            calls: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn calls_for(&self, field: &str) -> usize {
        self.calls.borrow().get(field).copied().unwrap_or(0)
    }
}

impl<R: FieldMappingResolver> FieldMappingResolver for CountingResolver<R> {
    fn resolve(&self, entity_type: &str, field: &str) -> ConditionResult<BTreeSet<String>> {
        *self.calls.borrow_mut().entry(field.to_string()).or_default() += 1;
        self.inner.resolve(entity_type, field)
    }
}

pub fn context(resolver: &dyn FieldMappingResolver) -> CompileContext<'_> {
    CompileContext::new(ENTITY_TYPE, resolver)
}

/// Asserts that `fragment` is a valid group graph pattern body.
pub fn assert_valid_sparql(fragment: &str) {
    let query = format!("SELECT * WHERE {{ {fragment} }}");
    if let Err(e) = SparqlParser::new().parse_query(&query) {
        panic!("Generated fragment is not valid SPARQL: {e}\n{query}");
    }
}
