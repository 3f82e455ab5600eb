//! Error types for condition building, compiling and rendering.

use thiserror::Error;

use crate::operator::Operator;

/// Errors raised while building, compiling or rendering a condition group.
///
/// Every variant is fatal to the call that produced it: no partial fragment
/// is ever returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("A value is required for the '{operator}' condition on field '{field}'")]
    MissingRequiredValue { field: String, operator: Operator },

    #[error(
        "Only '=', '!=', 'IN', 'NOT IN' operators are allowed for the key field '{field}', got '{operator}'"
    )]
    UnsupportedOperatorForKey { field: String, operator: Operator },

    #[error("No predicate mapping for field '{field}' of entity type '{entity_type}'")]
    UnknownFieldMapping { entity_type: String, field: String },

    #[error("An array value is not supported for the '{operator}' operator on field '{field}'")]
    UnsupportedArrayValue { field: String, operator: Operator },

    #[error("The condition group must be compiled before it is rendered")]
    NotCompiled,

    #[error("The condition group is already compiled and no longer accepts conditions")]
    AlreadyCompiled,

    #[error("'{name}' is not a valid SPARQL variable name: {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid compile request: {0}")]
    InvalidRequest(String),
}

pub type ConditionResult<T> = std::result::Result<T, ConditionError>;
