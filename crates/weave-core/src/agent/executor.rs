//! ToolExecutor trait definition.
//!
//! The single contract between the engine and an agent: run a named tool
//! with a JSON input and return a JSON result. Agents report expected
//! failures by returning a result object carrying an `"error"` field rather
//! than an `Err`; the step runner treats both as a failed attempt.

use std::future::Future;

use serde_json::Value;

/// Error raised by a tool executor for unexpected failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolCallError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),
}

/// An agent exposing named tool operations.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Wrap an
/// implementation in [`super::BoxToolExecutor`] to store it behind dynamic
/// dispatch.
pub trait ToolExecutor: Send + Sync {
    fn execute_tool(
        &self,
        tool: &str,
        input: Value,
    ) -> impl Future<Output = Result<Value, ToolCallError>> + Send;
}

/// Extract the agent-reported error from a tool result, if any.
///
/// A result signals failure when it is an object with a non-null `"error"`
/// field.
pub fn reported_error(result: &Value) -> Option<String> {
    match result.get("error") {
        None | Some(Value::Null) => None,
        Some(Value::String(message)) => Some(message.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Adapts an async closure `(tool, input) -> Result<Value, ToolCallError>`
/// into a [`ToolExecutor`].
pub struct FnToolExecutor<F> {
    func: F,
}

impl<F, Fut> FnToolExecutor<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolCallError>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> ToolExecutor for FnToolExecutor<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolCallError>> + Send,
{
    fn execute_tool(
        &self,
        tool: &str,
        input: Value,
    ) -> impl Future<Output = Result<Value, ToolCallError>> + Send {
        (self.func)(tool.to_string(), input)
    }
}
