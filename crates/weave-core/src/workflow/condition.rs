//! Condition expressions: JEXL source lowered into the [`Condition`] AST.
//!
//! Expression strings are parsed with `jexl-parser` when a workflow is
//! compiled, then lowered into a [`Condition`]; evaluation walks that tree
//! against an [`EvalScope`]. Nothing is ever handed to a JEXL evaluator, so
//! there is no code execution surface. Constructs the AST cannot express
//! (arithmetic, ternaries, object literals, filters) are rejected at load.
//!
//! Supported forms:
//!
//! ```text
//! context.score >= 0.8 && results.fetch.items|length > 0
//! 'urgent' in context.tags || previousStep.status == "ok"
//! results['fetch-page'].body|contains('error')
//! context.user|exists|not
//! ```
//!
//! Paths start with `context`, `results` or `previousStep`; any other first
//! identifier is a context key. Transforms: `length` (alias `len`),
//! `contains(needle)`, `exists` and `not`.

use std::cmp::Ordering;

use jexl_parser::Parser;
use jexl_parser::ast::{Expression, OpCode};
use serde_json::Value;
use thiserror::Error;
use weave_types::condition::{CompareOp, Condition, Operand, StepCondition};
use weave_types::path::{PathError, ValuePath};

use super::reference::EvalScope;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionParseError {
    #[error("empty expression")]
    Empty,

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("{0} is not supported in conditions")]
    Unsupported(String),

    #[error("unknown transform '{0}'")]
    UnknownTransform(String),

    #[error("transform '{name}' takes {expected} argument(s)")]
    TransformArity { name: String, expected: usize },

    #[error("invalid number '{0}'")]
    InvalidNumber(f64),

    #[error("a condition cannot be used as a value")]
    ConditionAsValue,

    #[error(transparent)]
    Path(#[from] PathError),
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

/// A lowered subexpression: either a value or a predicate.
enum Term {
    Operand(Operand),
    Condition(Condition),
}

fn lower(expr: Expression) -> Result<Term, ConditionParseError> {
    match expr {
        Expression::Number(n) => Ok(Term::Operand(Operand::Literal(number(n)?))),
        Expression::String(s) => Ok(Term::Operand(Operand::Literal(Value::String(s)))),
        Expression::Boolean(b) => Ok(Term::Operand(Operand::Literal(Value::Bool(b)))),
        Expression::Null => Ok(Term::Operand(Operand::Literal(Value::Null))),
        Expression::Array(items) => {
            let values = items
                .into_iter()
                .map(|item| match lower(*item)? {
                    Term::Operand(Operand::Literal(value)) => Ok(value),
                    _ => Err(ConditionParseError::Unsupported("non-literal array element".into())),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Term::Operand(Operand::Literal(Value::Array(values))))
        }
        path @ (Expression::Identifier(_)
        | Expression::DotOperation { .. }
        | Expression::IndexOperation { .. }) => Ok(Term::Operand(Operand::Field(field_path(path)?))),
        Expression::BinaryOperation {
            operation,
            left,
            right,
        } => lower_binary(operation, *left, *right),
        Expression::Transform {
            name,
            subject,
            args,
        } => lower_transform(name, *subject, args.unwrap_or_default()),
        other => Err(ConditionParseError::Unsupported(format!("{other:?}"))),
    }
}

fn lower_binary(op: OpCode, left: Expression, right: Expression) -> Result<Term, ConditionParseError> {
    let compare = match op {
        OpCode::And | OpCode::Or => {
            let is_and = matches!(op, OpCode::And);
            let left = into_condition(lower(left)?);
            let right = into_condition(lower(right)?);
            return Ok(Term::Condition(join(is_and, left, right)));
        }
        OpCode::In => {
            let needle = into_operand(lower(left)?)?;
            let haystack = into_operand(lower(right)?)?;
            return Ok(Term::Condition(Condition::Contains { haystack, needle }));
        }
        OpCode::Equal => CompareOp::Eq,
        OpCode::NotEqual => CompareOp::Ne,
        OpCode::Less => CompareOp::Lt,
        OpCode::LessEqual => CompareOp::Le,
        OpCode::Greater => CompareOp::Gt,
        OpCode::GreaterEqual => CompareOp::Ge,
        other => return Err(ConditionParseError::Unsupported(format!("operator {other:?}"))),
    };

    Ok(Term::Condition(Condition::Compare {
        left: into_operand(lower(left)?)?,
        op: compare,
        right: into_operand(lower(right)?)?,
    }))
}

/// Chains of the same connective collapse into one `And`/`Or` node.
fn join(is_and: bool, left: Condition, right: Condition) -> Condition {
    let mut parts = Vec::new();
    for side in [left, right] {
        match side {
            Condition::And(inner) if is_and => parts.extend(inner),
            Condition::Or(inner) if !is_and => parts.extend(inner),
            other => parts.push(other),
        }
    }
    if is_and {
        Condition::And(parts)
    } else {
        Condition::Or(parts)
    }
}

enum Transform {
    Length,
    Exists,
    Not,
    Contains,
}

fn lower_transform(
    name: String,
    subject: Expression,
    mut args: Vec<Box<Expression>>,
) -> Result<Term, ConditionParseError> {
    let (transform, expected) = match name.as_str() {
        "length" | "len" => (Transform::Length, 0),
        "exists" => (Transform::Exists, 0),
        "not" => (Transform::Not, 0),
        "contains" => (Transform::Contains, 1),
        _ => return Err(ConditionParseError::UnknownTransform(name.clone())),
    };
    if args.len() != expected {
        return Err(ConditionParseError::TransformArity { name, expected });
    }

    Ok(match transform {
        Transform::Length => Term::Operand(Operand::Length(Box::new(into_operand(lower(subject)?)?))),
        Transform::Exists => Term::Condition(Condition::Exists(field_path(subject)?)),
        Transform::Not => Term::Condition(Condition::Not(Box::new(into_condition(lower(subject)?)))),
        Transform::Contains => {
            let haystack = into_operand(lower(subject)?)?;
            let needle = match args.pop() {
                Some(arg) => into_operand(lower(*arg)?)?,
                None => return Err(ConditionParseError::TransformArity { name, expected }),
            };
            Term::Condition(Condition::Contains { haystack, needle })
        }
    })
}

/// Flatten identifier, `.key` and `['key']` chains into a [`ValuePath`].
fn field_path(expr: Expression) -> Result<ValuePath, ConditionParseError> {
    let mut keys = Vec::new();
    collect_keys(expr, &mut keys)?;
    Ok(ValuePath::from_segments(keys)?)
}

fn collect_keys(expr: Expression, keys: &mut Vec<String>) -> Result<(), ConditionParseError> {
    match expr {
        Expression::Identifier(name) => keys.push(name),
        Expression::DotOperation { subject, ident } => {
            collect_keys(*subject, keys)?;
            keys.push(ident);
        }
        Expression::IndexOperation { subject, index } => {
            collect_keys(*subject, keys)?;
            match *index {
                Expression::String(key) => keys.push(key),
                Expression::Number(n) if n >= 0.0 && n.fract() == 0.0 => keys.push((n as u64).to_string()),
                _ => return Err(ConditionParseError::Unsupported("computed index".into())),
            }
        }
        _ => return Err(ConditionParseError::Unsupported("path on a non-field value".into())),
    }
    Ok(())
}

fn number(n: f64) -> Result<Value, ConditionParseError> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Ok(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or(ConditionParseError::InvalidNumber(n))
}

fn into_operand(term: Term) -> Result<Operand, ConditionParseError> {
    match term {
        Term::Operand(op) => Ok(op),
        Term::Condition(_) => Err(ConditionParseError::ConditionAsValue),
    }
}

fn into_condition(term: Term) -> Condition {
    match term {
        Term::Condition(c) => c,
        Term::Operand(Operand::Field(path)) => Condition::Field(path),
        Term::Operand(Operand::Literal(value)) => Condition::Literal(is_truthy(&value)),
        Term::Operand(length @ Operand::Length(_)) => Condition::Compare {
            left: length,
            op: CompareOp::Gt,
            right: Operand::Literal(Value::from(0)),
        },
    }
}

/// Parse an expression string into a [`Condition`].
pub fn parse_condition(expression: &str) -> Result<Condition, ConditionParseError> {
    if expression.trim().is_empty() {
        return Err(ConditionParseError::Empty);
    }
    let ast = Parser::parse(expression).map_err(|e| ConditionParseError::Syntax(e.to_string()))?;
    Ok(into_condition(lower(ast)?))
}

/// Turn an authored condition into its AST.
pub fn compile_condition(condition: &StepCondition) -> Result<Condition, ConditionParseError> {
    match condition {
        StepCondition::Expression(expr) => parse_condition(expr),
        StepCondition::Predicate(c) => Ok(c.clone()),
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Evaluate a condition. Anything that cannot be evaluated (ordering across
/// incompatible types, length of a scalar, membership in a number) makes the
/// whole condition false.
pub fn evaluate(condition: &Condition, scope: &EvalScope<'_>) -> bool {
    eval(condition, scope).unwrap_or(false)
}

/// Parse and evaluate in one go; parse failures evaluate to false.
pub fn evaluate_expression(expression: &str, scope: &EvalScope<'_>) -> bool {
    match parse_condition(expression) {
        Ok(condition) => evaluate(&condition, scope),
        Err(e) => {
            tracing::debug!(expression, error = %e, "condition failed to parse");
            false
        }
    }
}

fn eval(condition: &Condition, scope: &EvalScope<'_>) -> Option<bool> {
    match condition {
        Condition::Literal(b) => Some(*b),
        Condition::Field(path) => Some(scope.lookup(path).is_some_and(|v| is_truthy(&v))),
        Condition::Compare { left, op, right } => {
            let left = operand_value(left, scope)?;
            let right = operand_value(right, scope)?;
            compare(&left, *op, &right)
        }
        Condition::And(parts) => {
            for part in parts {
                if !eval(part, scope)? {
                    return Some(false);
                }
            }
            Some(true)
        }
        Condition::Or(parts) => {
            for part in parts {
                if eval(part, scope)? {
                    return Some(true);
                }
            }
            Some(false)
        }
        Condition::Not(inner) => eval(inner, scope).map(|b| !b),
        Condition::Contains { haystack, needle } => {
            let haystack = operand_value(haystack, scope)?;
            let needle = operand_value(needle, scope)?;
            contains(&haystack, &needle)
        }
        Condition::Exists(path) => Some(scope.lookup(path).is_some_and(|v| !v.is_null())),
    }
}

fn operand_value(operand: &Operand, scope: &EvalScope<'_>) -> Option<Value> {
    match operand {
        Operand::Field(path) => Some(scope.resolve(path)),
        Operand::Literal(value) => Some(value.clone()),
        Operand::Length(inner) => {
            let len = match operand_value(inner, scope)? {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => return None,
            };
            Some(Value::from(len))
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Option<bool> {
    match op {
        CompareOp::Eq => Some(values_equal(left, right)),
        CompareOp::Ne => Some(!values_equal(left, right)),
        CompareOp::Lt => ordering(left, right).map(|o| o == Ordering::Less),
        CompareOp::Le => ordering(left, right).map(|o| o != Ordering::Greater),
        CompareOp::Gt => ordering(left, right).map(|o| o == Ordering::Greater),
        CompareOp::Ge => ordering(left, right).map(|o| o != Ordering::Less),
    }
}

/// Numbers numerically, strings lexicographically; anything else is
/// unordered.
fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match (haystack, needle) {
        (Value::Array(items), _) => Some(items.iter().any(|item| values_equal(item, needle))),
        (Value::String(text), Value::String(part)) => Some(text.contains(part.as_str())),
        (Value::Object(map), Value::String(key)) => Some(map.contains_key(key)),
        _ => None,
    }
}

/// Truthiness: `null`, `false`, zero, and empty strings or collections are
/// false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use std::collections::HashMap;

    struct Fixture {
        context: Map<String, Value>,
        results: HashMap<String, Value>,
        previous: Option<Value>,
    }

    impl Fixture {
        fn new(context: Value) -> Self {
            Self {
                context: context.as_object().cloned().unwrap(),
                results: HashMap::new(),
                previous: None,
            }
        }

        fn with_result(mut self, step: &str, value: Value) -> Self {
            self.results.insert(step.to_string(), value.clone());
            self.previous = Some(value);
            self
        }

        fn check(&self, expr: &str) -> bool {
            let scope = EvalScope {
                context: &self.context,
                results: &self.results,
                previous_step: self.previous.as_ref(),
            };
            let condition = parse_condition(expr).unwrap_or_else(|e| panic!("{expr}: {e}"));
            evaluate(&condition, &scope)
        }

        fn check_condition(&self, condition: &Condition) -> bool {
            let scope = EvalScope {
                context: &self.context,
                results: &self.results,
                previous_step: self.previous.as_ref(),
            };
            evaluate(condition, &scope)
        }
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    #[test]
    fn parses_comparison() {
        let cond = parse_condition("context.score >= 0.8").unwrap();
        assert_eq!(
            cond,
            Condition::Compare {
                left: Operand::Field(ValuePath::context(&["score"])),
                op: CompareOp::Ge,
                right: Operand::Literal(json!(0.8)),
            }
        );
    }

    #[test]
    fn connectives_flatten() {
        let cond = parse_condition("a || (b && c) || d").unwrap();
        let Condition::Or(parts) = cond else {
            panic!("expected or");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[1], Condition::And(ref inner) if inner.len() == 2));
    }

    #[test]
    fn parses_membership_and_transforms() {
        assert!(matches!(
            parse_condition("context.user|exists|not").unwrap(),
            Condition::Not(ref inner) if matches!(**inner, Condition::Exists(_))
        ));
        assert!(matches!(
            parse_condition("'x' in context.tags").unwrap(),
            Condition::Contains { .. }
        ));
        assert!(matches!(
            parse_condition("results.a.text|contains('err')").unwrap(),
            Condition::Contains { .. }
        ));
        assert!(matches!(
            parse_condition("context.items|length").unwrap(),
            Condition::Compare { op: CompareOp::Gt, .. }
        ));
    }

    #[test]
    fn index_access_builds_path() {
        let cond = parse_condition("results['fetch-page'].status == 'ok'").unwrap();
        let Condition::Compare { left: Operand::Field(path), .. } = cond else {
            panic!("expected comparison on a field");
        };
        assert_eq!(path.root, weave_types::path::PathRoot::Results);
        assert_eq!(path.segments, vec!["fetch-page", "status"]);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(parse_condition("   "), Err(ConditionParseError::Empty));
        assert!(matches!(parse_condition("a >"), Err(ConditionParseError::Syntax(_))));
        assert!(matches!(parse_condition("'open"), Err(ConditionParseError::Syntax(_))));
        assert!(matches!(parse_condition("(a == 1"), Err(ConditionParseError::Syntax(_))));
        assert!(matches!(
            parse_condition("x|shell('rm')"),
            Err(ConditionParseError::UnknownTransform(_))
        ));
        assert!(matches!(
            parse_condition("x|length(2)"),
            Err(ConditionParseError::TransformArity { expected: 0, .. })
        ));
        assert!(matches!(
            parse_condition("x|exists == true"),
            Err(ConditionParseError::ConditionAsValue)
        ));
    }

    #[test]
    fn inexpressible_constructs_are_rejected() {
        assert!(matches!(
            parse_condition("count + 1 > 2"),
            Err(ConditionParseError::Unsupported(_))
        ));
        assert!(matches!(
            parse_condition("ready ? a : b"),
            Err(ConditionParseError::Unsupported(_))
        ));
        assert!(matches!(
            parse_condition("tier in [context.a]"),
            Err(ConditionParseError::Unsupported(_))
        ));
    }

    #[test]
    fn compile_passes_structured_through() {
        let structured = StepCondition::Predicate(Condition::Literal(true));
        assert_eq!(compile_condition(&structured).unwrap(), Condition::Literal(true));
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    #[test]
    fn field_truthiness() {
        let f = Fixture::new(json!({"ready": true, "empty": [], "zero": 0, "name": "x"}));
        assert!(f.check("context.ready"));
        assert!(f.check("name"));
        assert!(!f.check("empty"));
        assert!(!f.check("zero"));
        assert!(!f.check("missing"));
    }

    #[test]
    fn comparisons() {
        let f = Fixture::new(json!({"score": 0.9, "count": 3, "tier": "gold"}));
        assert!(f.check("score > 0.5"));
        assert!(f.check("count == 3.0"));
        assert!(f.check("count != 4"));
        assert!(f.check("count <= 3 && count >= 3"));
        assert!(f.check("tier == \"gold\""));
        assert!(f.check("tier < 'silver'"));
        assert!(!f.check("tier == 'silver'"));
    }

    #[test]
    fn incompatible_ordering_is_false_even_negated() {
        let f = Fixture::new(json!({"tier": "gold"}));
        assert!(!f.check("tier > 3"));
        let negated = Condition::Not(Box::new(parse_condition("tier > 3").unwrap()));
        assert!(!f.check_condition(&negated));
        assert!(!f.check("missing < 1"));
    }

    #[test]
    fn short_circuit_skips_failing_branch() {
        let f = Fixture::new(json!({"ok": true, "tier": "gold"}));
        assert!(f.check("ok || tier > 3"));
        assert!(!f.check("ok|not && tier > 3"));
    }

    #[test]
    fn membership_and_length() {
        let f = Fixture::new(json!({"tags": ["a", "b"], "text": "hello world", "meta": {"k": 1}}));
        assert!(f.check("'a' in tags"));
        assert!(!f.check("'z' in tags"));
        assert!(f.check("text|contains('world')"));
        assert!(f.check("'b' in ['a', 'b']"));
        assert!(f.check("'k' in meta"));
        assert!(f.check("tags|length == 2"));
        assert!(f.check("text|len > 5"));
        assert!(!f.check("meta.k|length > 0"));
    }

    #[test]
    fn null_equality() {
        let f = Fixture::new(json!({"maybe": null}));
        assert!(f.check("maybe == null"));
        assert!(f.check("missing == null"));
        assert!(!f.check("maybe|exists"));
    }

    #[test]
    fn results_and_previous_step() {
        let f = Fixture::new(json!({})).with_result("fetch", json!({"items": [1, 2, 3], "status": "ok"}));
        assert!(f.check("results.fetch.items|length == 3"));
        assert!(f.check("previousStep.status == 'ok'"));
        assert!(f.check("results.fetch|exists"));
        assert!(f.check("results['fetch'].status == 'ok'"));
    }

    #[test]
    fn evaluate_expression_treats_parse_error_as_false() {
        let context = Map::new();
        let results = HashMap::new();
        let scope = EvalScope {
            context: &context,
            results: &results,
            previous_step: None,
        };
        assert!(!evaluate_expression("import os", &scope));
        assert!(evaluate_expression("true", &scope));
    }

    #[test]
    fn is_truthy_matches_expectations() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!([0])));
        assert!(is_truthy(&json!(-1)));
    }
}
