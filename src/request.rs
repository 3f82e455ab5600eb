//! JSON compile requests.
//!
//! A [`CompileRequest`] carries everything needed to produce one fragment
//! without host callbacks: the entity type and its keys, a static
//! field-to-predicate table, the value escaping mode and the condition tree.
//! This is the input format of the CLI and the WASM binding.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::compile::{CompileContext, CompileOptions};
use crate::condition::{ConditionEntry, ConditionGroup, ConditionValue, EntityKeys};
use crate::error::{ConditionError, ConditionResult};
use crate::escape::{RawValues, TermValueEscaper, ValueEscaper};
use crate::mapping::{FieldMapping, StaticMappings};
use crate::operator::{Conjunction, Operator};

// =============================================================================
// REQUEST TYPES
// =============================================================================

#[derive(Clone, Debug, Deserialize)]
pub struct CompileRequest {
    pub entity_type: String,
    pub keys: EntityKeys,
    #[serde(default)]
    pub options: CompileOptions,
    /// Field name to candidate predicates, for `entity_type`.
    #[serde(default)]
    pub mappings: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub escaping: ValueEscaping,
    #[serde(default)]
    pub conditions: GroupRequest,
}

/// How `=` values and `VALUES` members are inlined.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ValueEscaping {
    /// Values are already in query form.
    #[default]
    Raw,
    /// Values are serialized as RDF terms, see [`TermValueEscaper`].
    Terms {
        #[serde(default)]
        reference_fields: Vec<String>,
    },
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GroupRequest {
    #[serde(default)]
    pub conjunction: Conjunction,
    #[serde(default)]
    pub entries: Vec<EntryRequest>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum EntryRequest {
    Group {
        group: GroupRequest,
    },
    Leaf {
        field: String,
        #[serde(default)]
        value: Option<ConditionValue>,
        /// Defaults to `=`.
        #[serde(default)]
        operator: Option<String>,
        #[serde(default)]
        language: Option<String>,
    },
}

/// Result of a compile request, serializable to JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompileOutput {
    pub fragment: String,
    pub entity_type: String,
    /// Predicates each referenced field resolved to. The id key maps to an
    /// empty list.
    pub field_mappings: BTreeMap<String, Vec<String>>,
}

/// Error result
#[derive(Clone, Debug, Serialize)]
pub struct CompileFailure {
    pub error: String,
}

// =============================================================================
// BUILDING
// =============================================================================

/// Builds a condition group from its JSON description.
pub fn build_group(description: &GroupRequest, keys: &EntityKeys) -> ConditionResult<ConditionGroup> {
    let mut group = ConditionGroup::new(description.conjunction, keys.clone());
    for entry in &description.entries {
        match entry {
            EntryRequest::Group { group: nested } => {
                group.add_group(build_group(nested, keys)?)?;
            }
            EntryRequest::Leaf {
                field,
                value,
                operator,
                language,
            } => {
                let operator = match operator {
                    Some(operator) => operator.parse::<Operator>()?,
                    None => Operator::Equal,
                };
                group.add_condition(field, value.clone(), operator, language.as_deref())?;
            }
        }
    }
    Ok(group)
}

fn collect_mappings(group: &ConditionGroup, out: &mut BTreeMap<String, Vec<String>>) {
    if let Some(compiled) = group.compiled() {
        for (field, mapping) in compiled.mappings.iter() {
            let predicates = match mapping {
                FieldMapping::Subject => Vec::new(),
                FieldMapping::Predicate(predicate) => vec![predicate.clone()],
                FieldMapping::PredicateVariable { candidates, .. } => candidates.clone(),
            };
            out.entry(field.to_string()).or_insert(predicates);
        }
    }
    for entry in group.entries() {
        if let ConditionEntry::Nested(nested) = entry {
            collect_mappings(nested, out);
        }
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Compiles and renders the condition tree of `request`.
pub fn compile_request(request: &CompileRequest) -> ConditionResult<CompileOutput> {
    let mut resolver = StaticMappings::new();
    for (field, predicates) in &request.mappings {
        resolver.insert(&request.entity_type, field, predicates.iter().cloned());
    }

    let terms;
    let escaper: &dyn ValueEscaper = match &request.escaping {
        ValueEscaping::Raw => &RawValues,
        ValueEscaping::Terms { reference_fields } => {
            terms = TermValueEscaper::new(reference_fields.iter().cloned());
            &terms
        }
    };

    let ctx = CompileContext::new(&request.entity_type, &resolver)
        .with_escaper(escaper)
        .with_options(request.options.clone());

    let mut group = build_group(&request.conditions, &request.keys)?;
    debug!(
        "Built {} group with {} entries from request",
        group.conjunction(),
        group.len()
    );
    group.compile(&ctx)?;
    let fragment = group.render()?;

    let mut field_mappings = BTreeMap::new();
    collect_mappings(&group, &mut field_mappings);

    Ok(CompileOutput {
        fragment,
        entity_type: request.entity_type.clone(),
        field_mappings,
    })
}

/// Parses a JSON compile request and compiles it.
pub fn compile_request_json(json: &str) -> ConditionResult<CompileOutput> {
    let request: CompileRequest =
        serde_json::from_str(json).map_err(|e| ConditionError::InvalidRequest(e.to_string()))?;
    compile_request(&request)
}
