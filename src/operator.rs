//! Condition operators and conjunctions, with their fixed rendering rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConditionError;

// =============================================================================
// OPERATORS
// =============================================================================

/// A comparison, membership, pattern or existence operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
    #[serde(rename = "EXISTS")]
    Exists,
    #[serde(rename = "NOT EXISTS")]
    NotExists,
}

/// How an operator is written into a fragment.
///
/// `delimiter` is `None` for operators that cannot take a list operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperatorRule {
    pub prefix: &'static str,
    pub suffix: &'static str,
    pub delimiter: Option<&'static str>,
    pub uses_value: bool,
}

const PLAIN: OperatorRule = OperatorRule {
    prefix: "",
    suffix: "",
    delimiter: None,
    uses_value: true,
};

impl Operator {
    pub const ALL: [Operator; 12] = [
        Operator::Equal,
        Operator::NotEqual,
        Operator::Less,
        Operator::Greater,
        Operator::LessOrEqual,
        Operator::GreaterOrEqual,
        Operator::In,
        Operator::NotIn,
        Operator::Like,
        Operator::NotLike,
        Operator::Exists,
        Operator::NotExists,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::LessOrEqual => "<=",
            Operator::GreaterOrEqual => ">=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Exists => "EXISTS",
            Operator::NotExists => "NOT EXISTS",
        }
    }

    pub const fn rule(self) -> OperatorRule {
        match self {
            Operator::In => OperatorRule {
                delimiter: Some(" "),
                ..PLAIN
            },
            Operator::NotIn => OperatorRule {
                delimiter: Some(", "),
                ..PLAIN
            },
            Operator::Like => OperatorRule {
                prefix: "regex(",
                suffix: ")",
                ..PLAIN
            },
            Operator::NotLike => OperatorRule {
                prefix: "!regex(",
                suffix: ")",
                ..PLAIN
            },
            Operator::Exists => OperatorRule {
                prefix: "EXISTS { ",
                suffix: " }",
                delimiter: None,
                uses_value: false,
            },
            Operator::NotExists => OperatorRule {
                prefix: "NOT EXISTS { ",
                suffix: " }",
                delimiter: None,
                uses_value: false,
            },
            Operator::Equal
            | Operator::NotEqual
            | Operator::Less
            | Operator::Greater
            | Operator::LessOrEqual
            | Operator::GreaterOrEqual => PLAIN,
        }
    }

    pub const fn uses_value(self) -> bool {
        self.rule().uses_value
    }

    /// Operators accepted on the id and bundle keys.
    pub const fn is_key_operator(self) -> bool {
        matches!(
            self,
            Operator::Equal | Operator::NotEqual | Operator::In | Operator::NotIn
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| ConditionError::UnknownOperator(s.to_string()))
    }
}

// =============================================================================
// CONJUNCTIONS
// =============================================================================

/// How the fragments of one group are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conjunction {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConjunctionRule {
    pub delimiter: &'static str,
    pub prefix: &'static str,
    pub suffix: &'static str,
}

impl Conjunction {
    pub const fn rule(self) -> ConjunctionRule {
        match self {
            Conjunction::And => ConjunctionRule {
                delimiter: " . ",
                prefix: "",
                suffix: "",
            },
            Conjunction::Or => ConjunctionRule {
                delimiter: " UNION ",
                prefix: "{ ",
                suffix: " }",
            },
        }
    }
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conjunction::And => f.write_str("AND"),
            Conjunction::Or => f.write_str("OR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parse_roundtrips_all() {
        for op in Operator::ALL {
            assert_eq!(op.as_str().parse::<Operator>(), Ok(op));
        }
    }

    #[test]
    fn test_operator_parse_is_lenient_on_case_and_spacing() {
        assert_eq!("not  in".parse::<Operator>(), Ok(Operator::NotIn));
        assert_eq!(" like ".parse::<Operator>(), Ok(Operator::Like));
        assert_eq!(
            "CONTAINS".parse::<Operator>(),
            Err(ConditionError::UnknownOperator("CONTAINS".to_string()))
        );
    }

    #[test]
    fn test_only_membership_operators_have_delimiters() {
        let with_delimiter: Vec<Operator> = Operator::ALL
            .into_iter()
            .filter(|op| op.rule().delimiter.is_some())
            .collect();
        assert_eq!(with_delimiter, vec![Operator::In, Operator::NotIn]);
    }

    #[test]
    fn test_exists_operators_take_no_value() {
        assert!(!Operator::Exists.uses_value());
        assert!(!Operator::NotExists.uses_value());
        assert!(Operator::Like.uses_value());
    }

    #[test]
    fn test_operator_serde_uses_symbols() {
        let json = serde_json::to_string(&Operator::NotIn).unwrap();
        assert_eq!(json, "\"NOT IN\"");
        let op: Operator = serde_json::from_str("\"<=\"").unwrap();
        assert_eq!(op, Operator::LessOrEqual);
    }

    #[test]
    fn test_conjunction_rules() {
        assert_eq!(Conjunction::And.rule().delimiter, " . ");
        assert_eq!(Conjunction::Or.rule().delimiter, " UNION ");
        assert_eq!(Conjunction::Or.rule().prefix, "{ ");
    }
}
