//! Value escaping for inlined condition values.
//!
//! The compiler never decides on its own whether a value is a resource or a
//! literal. It hands `=` values and `VALUES` members to a [`ValueEscaper`],
//! which returns the text to inline.

use std::collections::BTreeSet;

use oxsdatatypes::{Decimal, Integer};
use spargebra::term::{Literal, NamedNode};

use crate::error::{ConditionError, ConditionResult};

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// Turns a raw condition value into its final query form.
pub trait ValueEscaper {
    fn escape(&self, field: &str, value: &str, language: Option<&str>) -> ConditionResult<String>;
}

/// Inlines values unchanged. Callers pass values already in query form.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawValues;

impl ValueEscaper for RawValues {
    fn escape(&self, _field: &str, value: &str, _language: Option<&str>) -> ConditionResult<String> {
        Ok(value.to_string())
    }
}

/// Serializes values as RDF terms.
///
/// Values of reference fields become IRIs. Other values become typed
/// literals when they parse as an `xsd:integer`, `xsd:decimal` or
/// `xsd:boolean`, and plain (or language-tagged) string literals otherwise.
#[derive(Clone, Debug, Default)]
pub struct TermValueEscaper {
    reference_fields: BTreeSet<String>,
}

impl TermValueEscaper {
    pub fn new<I, S>(reference_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reference_fields: reference_fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_reference(&self, field: &str) -> bool {
        self.reference_fields.contains(field)
    }
}

fn xsd(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{XSD}{local}"))
}

fn typed_literal(value: &str) -> Option<Literal> {
    if value.parse::<Integer>().is_ok() {
        Some(Literal::new_typed_literal(value, xsd("integer")))
    } else if value.parse::<Decimal>().is_ok() {
        Some(Literal::new_typed_literal(value, xsd("decimal")))
    } else if matches!(value, "true" | "false") {
        Some(Literal::new_typed_literal(value, xsd("boolean")))
    } else {
        None
    }
}

impl ValueEscaper for TermValueEscaper {
    fn escape(&self, field: &str, value: &str, language: Option<&str>) -> ConditionResult<String> {
        if self.is_reference(field) {
            let iri = value.trim_start_matches('<').trim_end_matches('>');
            return NamedNode::new(iri)
                .map(|node| node.to_string())
                .map_err(|e| ConditionError::InvalidValue {
                    field: field.to_string(),
                    reason: e.to_string(),
                });
        }

        let literal = match language {
            Some(language) => Literal::new_language_tagged_literal(value, language).map_err(|e| {
                ConditionError::InvalidValue {
                    field: field.to_string(),
                    reason: e.to_string(),
                }
            })?,
            None => typed_literal(value).unwrap_or_else(|| Literal::new_simple_literal(value)),
        };
        Ok(literal.to_string())
    }
}

/// Escapes a value for embedding in a double-quoted regex literal.
///
/// Backslashes and both quote characters get a leading backslash. Line
/// breaks and tabs become `\n`, `\r` and `\t`.
pub fn escape_regex_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' | '"' | '\'' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}
