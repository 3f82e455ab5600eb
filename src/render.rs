//! Fragment rendering.
//!
//! Turns a compiled group into text: triple patterns, `VALUES` clauses and
//! one `FILTER` clause, joined according to the group's conjunction.

use crate::compile::{CompiledCondition, CompiledGroup, FilterOperand, Triple};
use crate::condition::ConditionEntry;
use crate::error::{ConditionError, ConditionResult};
use crate::operator::{Conjunction, ConjunctionRule, Operator};

/// Ordered, de-duplicated fragments of one group.
struct Fragments {
    rule: ConjunctionRule,
    items: Vec<String>,
}

impl Fragments {
    fn new(conjunction: Conjunction) -> Self {
        Self {
            rule: conjunction.rule(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        let wrapped = format!("{}{}{}", self.rule.prefix, fragment, self.rule.suffix);
        if !self.items.contains(&wrapped) {
            self.items.push(wrapped);
        }
    }

    fn push_binding(&mut self, binding: Option<&Triple>) {
        if let Some(binding) = binding {
            self.push(&binding.to_string());
        }
    }

    fn join(self) -> String {
        self.items.join(self.rule.delimiter)
    }
}

fn render_filter(variable: &str, operator: Operator, operand: &FilterOperand) -> String {
    let rule = operator.rule();
    let operand = match operand {
        FilterOperand::Scalar(value) => value.clone(),
        FilterOperand::List { values, delimiter } => format!("({})", values.join(*delimiter)),
    };
    format!("{}{} {} {}{}", rule.prefix, variable, operator, operand, rule.suffix)
}

/// Combines filter expressions into one `FILTER` clause joined by `&&`.
fn render_filters(expressions: &[String]) -> String {
    let combined = match expressions {
        [single] => single.clone(),
        _ => format!("({})", expressions.join(") && (")),
    };
    format!("FILTER ({combined})")
}

pub(crate) fn render_group(
    conjunction: Conjunction,
    compiled: &CompiledGroup,
    entries: &mut [ConditionEntry],
) -> ConditionResult<String> {
    let mut fragments = Fragments::new(conjunction);
    let mut filters = Vec::new();

    fragments.push_binding(compiled.default_bundle.as_ref());

    for condition in compiled.values.iter().chain(&compiled.conditions) {
        match condition {
            CompiledCondition::Nested(index) => match entries.get_mut(*index) {
                Some(ConditionEntry::Nested(group)) => fragments.push(&group.render()?),
                Some(ConditionEntry::Leaf(_)) | None => return Err(ConditionError::NotCompiled),
            },
            CompiledCondition::Triple(triple) => fragments.push(&triple.to_string()),
            CompiledCondition::Values { binding, clause } => {
                fragments.push_binding(binding.as_ref());
                fragments.push(&clause.to_string());
            }
            CompiledCondition::Exists {
                binding,
                operator,
                variable,
            } => {
                let rule = operator.rule();
                fragments.push_binding(binding.as_ref());
                fragments.push(&format!("{}{}{}", rule.prefix, variable, rule.suffix));
            }
            CompiledCondition::Like {
                binding,
                operator,
                variable,
                pattern,
            } => {
                let rule = operator.rule();
                fragments.push_binding(binding.as_ref());
                fragments.push(&format!("{}{}, \"{}\"{}", rule.prefix, variable, pattern, rule.suffix));
            }
            CompiledCondition::Filter {
                binding,
                variable,
                operator,
                operand,
            } => {
                fragments.push_binding(binding.as_ref());
                filters.push(render_filter(variable, *operator, operand));
            }
        }
    }

    if !filters.is_empty() {
        fragments.push(&render_filters(&filters));
    }

    Ok(fragments.join())
}
