//! The compile pass.
//!
//! Walks one group, resolves every field to its predicate form and turns
//! each leaf into a [`CompiledCondition`] that the renderer can print without
//! further lookups. All failures (unknown mappings, list values on scalar
//! operators, invalid variable names) surface here, before any text is
//! produced.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use spargebra::term::Variable;

use crate::condition::{ConditionEntry, ConditionValue, EntityKeys, FieldKind, Leaf};
use crate::error::{ConditionError, ConditionResult};
use crate::escape::{RawValues, ValueEscaper, escape_regex_literal};
use crate::mapping::{FieldMapping, FieldMappingCache, FieldMappingResolver};
use crate::operator::{Conjunction, Operator};

pub const RDF_TYPE: &str = "<http://www.w3.org/1999/02/22-rdf-syntax-ns#type>";

// =============================================================================
// OPTIONS AND CONTEXT
// =============================================================================

/// Query-wide naming used by the compiler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Name of the variable that stands for the entity, without the `?`.
    pub subject_variable: String,
    /// The predicate linking an entity to its bundle.
    pub type_predicate: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            subject_variable: "entity".to_string(),
            type_predicate: RDF_TYPE.to_string(),
        }
    }
}

/// Everything a compile pass needs besides the conditions themselves.
pub struct CompileContext<'a> {
    entity_type: &'a str,
    resolver: &'a dyn FieldMappingResolver,
    escaper: &'a dyn ValueEscaper,
    options: CompileOptions,
}

impl<'a> CompileContext<'a> {
    pub fn new(entity_type: &'a str, resolver: &'a dyn FieldMappingResolver) -> Self {
        Self {
            entity_type,
            resolver,
            escaper: &RawValues,
            options: CompileOptions::default(),
        }
    }

    pub fn with_escaper(mut self, escaper: &'a dyn ValueEscaper) -> Self {
        self.escaper = escaper;
        self
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn entity_type(&self) -> &str {
        self.entity_type
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }
}

// =============================================================================
// COMPILED FORM
// =============================================================================

/// A triple pattern whose positions are already in query form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// `VALUES ?variable { member ... }`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValuesClause {
    pub variable: String,
    pub members: Vec<String>,
}

impl fmt::Display for ValuesClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let delimiter = Operator::In.rule().delimiter.unwrap_or(" ");
        write!(f, "VALUES {} {{ {} }}", self.variable, self.members.join(delimiter))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterOperand {
    Scalar(String),
    /// A list operand, written as `(a, b)` with the operator's delimiter.
    List {
        values: Vec<String>,
        delimiter: &'static str,
    },
}

/// One classified condition.
///
/// `binding` is the `subject predicate ?field` triple a condition needs
/// before it can refer to `?field`; it is `None` on the id key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompiledCondition {
    /// Index of a nested group in the owning group's entries.
    Nested(usize),
    /// An `=` condition inlined as a triple.
    Triple(Triple),
    Values {
        binding: Option<Triple>,
        clause: ValuesClause,
    },
    Exists {
        binding: Option<Triple>,
        operator: Operator,
        variable: String,
    },
    Like {
        binding: Option<Triple>,
        operator: Operator,
        variable: String,
        pattern: String,
    },
    /// Collected into the group's single `FILTER` clause.
    Filter {
        binding: Option<Triple>,
        variable: String,
        operator: Operator,
        operand: FilterOperand,
    },
}

#[derive(Clone, Debug)]
pub struct CompiledGroup {
    pub default_bundle: Option<Triple>,
    /// Key `IN` conditions, then auxiliary predicate sets.
    pub values: Vec<CompiledCondition>,
    pub conditions: Vec<CompiledCondition>,
    pub mappings: FieldMappingCache,
}

// =============================================================================
// COMPILE PASS
// =============================================================================

pub(crate) fn variable(name: &str) -> ConditionResult<String> {
    let name = name.trim_start_matches('?');
    Variable::new(name)
        .map(|v| v.to_string())
        .map_err(|e| ConditionError::InvalidVariable {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

fn resolve_mapping(field: &str, kind: FieldKind, ctx: &CompileContext<'_>) -> ConditionResult<FieldMapping> {
    match kind {
        FieldKind::Id => Ok(FieldMapping::Subject),
        FieldKind::Bundle => Ok(FieldMapping::Predicate(ctx.options.type_predicate.clone())),
        FieldKind::Label | FieldKind::Other => {
            let candidates: Vec<String> = ctx.resolver.resolve(ctx.entity_type, field)?.into_iter().collect();
            match candidates.as_slice() {
                [] => Err(ConditionError::UnknownFieldMapping {
                    entity_type: ctx.entity_type.to_string(),
                    field: field.to_string(),
                }),
                [predicate] => Ok(FieldMapping::Predicate(predicate.clone())),
                _ => Ok(FieldMapping::PredicateVariable {
                    variable: variable(&format!("{field}_predicate"))?,
                    candidates,
                }),
            }
        }
    }
}

fn scalar_value(leaf: &Leaf) -> ConditionResult<&str> {
    match &leaf.value {
        Some(ConditionValue::Single(value)) => Ok(value),
        Some(ConditionValue::List(_)) => Err(ConditionError::UnsupportedArrayValue {
            field: leaf.field.clone(),
            operator: leaf.operator,
        }),
        None => Err(ConditionError::MissingRequiredValue {
            field: leaf.field.clone(),
            operator: leaf.operator,
        }),
    }
}

fn escaped_members(leaf: &Leaf, ctx: &CompileContext<'_>) -> ConditionResult<Vec<String>> {
    let values = match &leaf.value {
        Some(value) => value.clone().into_list(),
        None => {
            return Err(ConditionError::MissingRequiredValue {
                field: leaf.field.clone(),
                operator: leaf.operator,
            });
        }
    };
    values
        .iter()
        .map(|value| ctx.escaper.escape(&leaf.field, value, leaf.language.as_deref()))
        .collect()
}

/// Filter operand of `leaf`. Key sets are escaped like their `IN`
/// counterparts; other operands are inlined as given.
fn filter_operand(leaf: &Leaf, kind: FieldKind, ctx: &CompileContext<'_>) -> ConditionResult<FilterOperand> {
    match &leaf.value {
        Some(ConditionValue::Single(value)) => Ok(FilterOperand::Scalar(value.clone())),
        Some(ConditionValue::List(values)) => {
            let delimiter = leaf
                .operator
                .rule()
                .delimiter
                .ok_or_else(|| ConditionError::UnsupportedArrayValue {
                    field: leaf.field.clone(),
                    operator: leaf.operator,
                })?;
            let values = match kind {
                FieldKind::Id | FieldKind::Bundle => escaped_members(leaf, ctx)?,
                FieldKind::Label | FieldKind::Other => values.clone(),
            };
            Ok(FilterOperand::List { values, delimiter })
        }
        None => Err(ConditionError::MissingRequiredValue {
            field: leaf.field.clone(),
            operator: leaf.operator,
        }),
    }
}

/// Where a compiled leaf is rendered.
enum Placement {
    Values,
    Conditions,
}

struct GroupCompiler<'c, 'a> {
    keys: &'c EntityKeys,
    ctx: &'c CompileContext<'a>,
    subject: String,
    mappings: FieldMappingCache,
    auxiliary: Vec<CompiledCondition>,
}

impl GroupCompiler<'_, '_> {
    fn field_mapping(&mut self, field: &str, kind: FieldKind) -> ConditionResult<FieldMapping> {
        let ctx = self.ctx;
        let (mapping, inserted) = self
            .mappings
            .get_or_try_insert(field, || resolve_mapping(field, kind, ctx))?;
        if inserted {
            if let FieldMapping::PredicateVariable { variable, candidates } = mapping {
                self.auxiliary.push(CompiledCondition::Values {
                    binding: None,
                    clause: ValuesClause {
                        variable: variable.clone(),
                        members: candidates.clone(),
                    },
                });
            }
        }
        Ok(mapping.clone())
    }

    /// The variable standing for `leaf`'s field, and the triple binding it.
    fn bind(&self, leaf: &Leaf, mapping: &FieldMapping) -> ConditionResult<(String, Option<Triple>)> {
        let Some(predicate) = mapping.predicate() else {
            return Ok((self.subject.clone(), None));
        };
        let field_variable = variable(&leaf.field)?;
        let binding = Triple {
            subject: self.subject.clone(),
            predicate: predicate.to_string(),
            object: field_variable.clone(),
        };
        Ok((field_variable, Some(binding)))
    }

    fn compile_leaf(&mut self, leaf: &Leaf) -> ConditionResult<(Placement, CompiledCondition)> {
        let kind = self.keys.kind(&leaf.field);
        let mapping = self.field_mapping(&leaf.field, kind)?;

        let compiled = match leaf.operator {
            Operator::Equal => {
                // `=` on the id key is rewritten to `IN` when it is added.
                let Some(predicate) = mapping.predicate() else {
                    return Err(ConditionError::UnsupportedOperatorForKey {
                        field: leaf.field.clone(),
                        operator: leaf.operator,
                    });
                };
                let value = scalar_value(leaf)?;
                CompiledCondition::Triple(Triple {
                    subject: self.subject.clone(),
                    predicate: predicate.to_string(),
                    object: self.ctx.escaper.escape(&leaf.field, value, leaf.language.as_deref())?,
                })
            }
            Operator::In => {
                let (field_variable, binding) = self.bind(leaf, &mapping)?;
                let clause = ValuesClause {
                    variable: field_variable,
                    members: escaped_members(leaf, self.ctx)?,
                };
                let placement = match kind {
                    FieldKind::Id | FieldKind::Bundle => Placement::Values,
                    FieldKind::Label | FieldKind::Other => Placement::Conditions,
                };
                return Ok((placement, CompiledCondition::Values { binding, clause }));
            }
            Operator::Exists | Operator::NotExists => {
                let (field_variable, binding) = self.bind(leaf, &mapping)?;
                CompiledCondition::Exists {
                    binding,
                    operator: leaf.operator,
                    variable: field_variable,
                }
            }
            Operator::Like | Operator::NotLike => {
                let (field_variable, binding) = self.bind(leaf, &mapping)?;
                CompiledCondition::Like {
                    binding,
                    operator: leaf.operator,
                    variable: field_variable,
                    pattern: escape_regex_literal(scalar_value(leaf)?),
                }
            }
            Operator::NotIn
            | Operator::NotEqual
            | Operator::Less
            | Operator::Greater
            | Operator::LessOrEqual
            | Operator::GreaterOrEqual => {
                let (field_variable, binding) = self.bind(leaf, &mapping)?;
                CompiledCondition::Filter {
                    binding,
                    variable: field_variable,
                    operator: leaf.operator,
                    operand: filter_operand(leaf, kind, self.ctx)?,
                }
            }
        };
        Ok((Placement::Conditions, compiled))
    }
}

/// Compiles `entries`, compiling nested groups in place.
pub(crate) fn compile_group(
    conjunction: Conjunction,
    keys: &EntityKeys,
    needs_default_bundle: bool,
    entries: &mut [ConditionEntry],
    ctx: &CompileContext<'_>,
) -> ConditionResult<CompiledGroup> {
    debug!(
        "Compiling {} condition group with {} entries for entity type '{}'",
        conjunction,
        entries.len(),
        ctx.entity_type
    );
    let mut compiler = GroupCompiler {
        keys,
        ctx,
        subject: variable(&ctx.options.subject_variable)?,
        mappings: FieldMappingCache::new(),
        auxiliary: Vec::new(),
    };

    let mut values = Vec::new();
    let mut conditions = Vec::new();
    for (index, entry) in entries.iter_mut().enumerate() {
        match entry {
            ConditionEntry::Nested(group) => {
                group.compile(ctx)?;
                conditions.push(CompiledCondition::Nested(index));
            }
            ConditionEntry::Leaf(leaf) => match compiler.compile_leaf(leaf)? {
                (Placement::Values, compiled) => values.push(compiled),
                (Placement::Conditions, compiled) => conditions.push(compiled),
            },
        }
    }

    let default_bundle = if needs_default_bundle {
        Some(Triple {
            subject: compiler.subject.clone(),
            predicate: ctx.options.type_predicate.clone(),
            object: variable(&keys.bundle)?,
        })
    } else {
        None
    };

    values.append(&mut compiler.auxiliary);
    Ok(CompiledGroup {
        default_bundle,
        values,
        conditions,
        mappings: compiler.mappings,
    })
}
