//! `$`-reference resolution against execution state.
//!
//! Input mappings are parsed into [`InputBinding`]s when the workflow is
//! compiled. At run time each reference is walked through the
//! [`EvalScope`]; a missing key or a non-object intermediate resolves to
//! `null`, never to an error.

use std::collections::HashMap;

use serde_json::{Map, Value};
use weave_types::execution::WorkflowExecution;
use weave_types::path::{PathError, PathRoot, ValuePath};

// ---------------------------------------------------------------------------
// EvalScope
// ---------------------------------------------------------------------------

/// Read-only view of the namespaces references and conditions can see.
#[derive(Debug, Clone, Copy)]
pub struct EvalScope<'a> {
    pub context: &'a Map<String, Value>,
    pub results: &'a HashMap<String, Value>,
    pub previous_step: Option<&'a Value>,
}

impl<'a> EvalScope<'a> {
    pub fn from_execution(execution: &'a WorkflowExecution) -> Self {
        Self {
            context: &execution.context,
            results: &execution.step_results,
            previous_step: execution.previous_step_result(),
        }
    }

    /// Look up a path. `None` when any key along the way is missing or an
    /// intermediate value is not an object.
    pub fn lookup(&self, path: &ValuePath) -> Option<Value> {
        let Some((first, rest)) = path.segments.split_first() else {
            return Some(self.root_value(path.root));
        };

        let start = match path.root {
            PathRoot::Context => self.context.get(first),
            PathRoot::Results => self.results.get(first),
            PathRoot::PreviousStep => self
                .previous_step
                .and_then(Value::as_object)
                .and_then(|m| m.get(first)),
        }?;

        rest.iter()
            .try_fold(start, |current, segment| current.as_object()?.get(segment))
            .cloned()
    }

    /// Resolve a path, mapping anything unresolvable to `null`.
    pub fn resolve(&self, path: &ValuePath) -> Value {
        self.lookup(path).unwrap_or(Value::Null)
    }

    fn root_value(&self, root: PathRoot) -> Value {
        match root {
            PathRoot::Context => Value::Object(self.context.clone()),
            PathRoot::Results => Value::Object(
                self.results
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            PathRoot::PreviousStep => self.previous_step.cloned().unwrap_or(Value::Null),
        }
    }
}

// ---------------------------------------------------------------------------
// InputBinding
// ---------------------------------------------------------------------------

/// One entry of a step's input mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum InputBinding {
    /// Passed through unchanged.
    Literal(Value),
    /// Resolved against the scope at dispatch time.
    Reference(ValuePath),
}

impl InputBinding {
    /// Strings starting with `$` are references; everything else is literal.
    pub fn parse(value: &Value) -> Result<Self, PathError> {
        match value {
            Value::String(raw) => match ValuePath::parse_reference(raw) {
                Some(path) => Ok(InputBinding::Reference(path?)),
                None => Ok(InputBinding::Literal(value.clone())),
            },
            other => Ok(InputBinding::Literal(other.clone())),
        }
    }

    pub fn resolve(&self, scope: &EvalScope<'_>) -> Value {
        match self {
            InputBinding::Literal(value) => value.clone(),
            InputBinding::Reference(path) => scope.resolve(path),
        }
    }
}

/// Build concrete tool input from compiled bindings.
pub fn resolve_inputs(bindings: &[(String, InputBinding)], scope: &EvalScope<'_>) -> Map<String, Value> {
    bindings
        .iter()
        .map(|(key, binding)| (key.clone(), binding.resolve(scope)))
        .collect()
}

/// Resolve a raw input mapping without compiling it first.
///
/// Malformed references resolve to `null` here; compiled workflows reject
/// them during validation instead.
pub fn resolve_mapping(mapping: &HashMap<String, Value>, scope: &EvalScope<'_>) -> Map<String, Value> {
    mapping
        .iter()
        .map(|(key, value)| {
            let resolved = InputBinding::parse(value)
                .map(|binding| binding.resolve(scope))
                .unwrap_or(Value::Null);
            (key.clone(), resolved)
        })
        .collect()
}
