//! Structured predicate AST for step gating conditions.
//!
//! Conditions are data, never code. A workflow author writes either the
//! tagged structure directly or a short expression string; `weave-core`
//! parses expression strings into [`Condition`] when the workflow is
//! validated and evaluates the tree against execution state.

use serde::{Deserialize, Serialize};

use crate::path::ValuePath;

/// A boolean predicate over `context`, `results` and `previousStep`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Constant outcome.
    Literal(bool),
    /// Truthiness of the value at a path.
    Field(ValuePath),
    /// Binary comparison of two operands.
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    /// All sub-conditions hold. An empty list is true.
    And(Vec<Condition>),
    /// Any sub-condition holds. An empty list is false.
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// Array membership, substring, or object key test.
    Contains { haystack: Operand, needle: Operand },
    /// The path resolves to a present, non-null value.
    Exists(ValuePath),
}

/// A value-producing term inside a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Field(ValuePath),
    Literal(serde_json::Value),
    /// Length of a string, array or object.
    Length(Box<Operand>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A condition as authored in a workflow definition.
///
/// Deserializes from either an expression string (`"context.score > 0.5"`)
/// or a structured [`Condition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepCondition {
    Expression(String),
    Predicate(Condition),
}

impl From<Condition> for StepCondition {
    fn from(condition: Condition) -> Self {
        StepCondition::Predicate(condition)
    }
}

impl From<&str> for StepCondition {
    fn from(expression: &str) -> Self {
        StepCondition::Expression(expression.to_string())
    }
}
