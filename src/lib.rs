//! SPARQL Condition Compiler - Library
//!
//! Builds nested AND/OR condition trees over the fields of an entity type and
//! compiles them into SPARQL `WHERE` fragments: triple patterns, `VALUES`
//! clauses and `FILTER` expressions. Fields are resolved to predicates through
//! a host-provided [`FieldMappingResolver`].
//!
//! ```no_run
//! use sparql_condition::{CompileContext, ConditionGroup, EntityKeys, Operator, StaticMappings};
//!
//! let mappings = StaticMappings::new().with("node", "title", ["<http://example.com/title>"]);
//! let mut group = ConditionGroup::and(EntityKeys::new("id", "type"));
//! group.condition("type", "<http://example.com/Page>")?;
//! group.add_condition("title", Some("intro".into()), Operator::Like, None)?;
//! group.compile(&CompileContext::new("node", &mappings))?;
//! println!("{}", group.render()?);
//! # Ok::<(), sparql_condition::ConditionError>(())
//! ```
//!
//! The library compiles to WebAssembly, exposing `compile_conditions` to JavaScript.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::wasm_bindgen;

pub mod compile;
pub mod condition;
pub mod error;
pub mod escape;
pub mod mapping;
pub mod operator;
mod render;
pub mod request;

#[cfg(test)]
mod test_support;

pub use compile::{CompileContext, CompileOptions, RDF_TYPE};
pub use condition::{ConditionEntry, ConditionGroup, ConditionValue, EntityKeys, GroupPhase, Leaf};
pub use error::{ConditionError, ConditionResult};
pub use escape::{RawValues, TermValueEscaper, ValueEscaper};
pub use mapping::{FieldMapping, FieldMappingResolver, StaticMappings};
pub use operator::{Conjunction, Operator};
pub use request::{CompileFailure, CompileOutput, CompileRequest, compile_request, compile_request_json};

// =============================================================================
// WASM BINDINGS
// =============================================================================

/// Compiles a JSON [`CompileRequest`] and returns the JSON [`CompileOutput`],
/// or `{"error": "..."}`.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn compile_conditions(request: &str) -> String {
    let failure = |error: String| serde_json::to_string(&CompileFailure { error }).unwrap_or_default();
    match compile_request_json(request) {
        Ok(output) => serde_json::to_string(&output).unwrap_or_else(|e| failure(e.to_string())),
        Err(e) => failure(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::assert_valid_sparql;

    // ==========================================================================
    // SNAPSHOT TESTS - Verify rendered fragments match expected output
    // ==========================================================================

    fn normalize_whitespace(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Run a snapshot test: compile `request.json`, compare against `expected.rq`
    fn run_snapshot_test(test_name: &str) -> String {
        let fixture_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(test_name);

        let request_path = fixture_dir.join("request.json");
        let expected_path = fixture_dir.join("expected.rq");

        let request = std::fs::read_to_string(&request_path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", request_path.display(), e));
        let expected = std::fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", expected_path.display(), e));

        let result = compile_request_json(&request);
        assert!(result.is_ok(), "Request should compile: {:?}", result.as_ref().err());
        let fragment = result.unwrap().fragment;

        if normalize_whitespace(&expected) != normalize_whitespace(&fragment) {
            eprintln!("\n=== SNAPSHOT MISMATCH for {} ===", test_name);
            eprintln!("\n--- Expected ---\n{}", expected);
            eprintln!("\n--- Actual ---\n{}", fragment);
            eprintln!("\n--- End ---\n");
            panic!("Rendered fragment does not match expected output for test '{}'", test_name);
        }
        fragment
    }

    #[test]
    fn snapshot_bundle_and_like() {
        run_snapshot_test("bundle_and_like");
    }

    #[test]
    fn snapshot_or_status() {
        let fragment = run_snapshot_test("or_status");
        assert_valid_sparql(&fragment);
    }

    #[test]
    fn snapshot_multi_predicate() {
        let fragment = run_snapshot_test("multi_predicate");
        assert_valid_sparql(&fragment);
    }

    #[test]
    fn snapshot_key_values() {
        let fragment = run_snapshot_test("key_values");
        assert_valid_sparql(&fragment);
    }

    #[test]
    fn snapshot_nested_groups() {
        let fragment = run_snapshot_test("nested_groups");
        assert_valid_sparql(&fragment);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a .\n  b \n"), "a . b");
    }
}
