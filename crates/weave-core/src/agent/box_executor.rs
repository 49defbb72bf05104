//! BoxToolExecutor -- object-safe dynamic dispatch wrapper for ToolExecutor.
//!
//! 1. Define an object-safe `ToolExecutorDyn` trait with boxed futures
//! 2. Blanket-impl `ToolExecutorDyn` for all `T: ToolExecutor`
//! 3. `BoxToolExecutor` wraps `Box<dyn ToolExecutorDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::executor::{ToolCallError, ToolExecutor};

/// Object-safe version of [`ToolExecutor`] with boxed futures.
pub trait ToolExecutorDyn: Send + Sync {
    fn execute_tool_boxed<'a>(
        &'a self,
        tool: &'a str,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolCallError>> + Send + 'a>>;
}

impl<T: ToolExecutor> ToolExecutorDyn for T {
    fn execute_tool_boxed<'a>(
        &'a self,
        tool: &'a str,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolCallError>> + Send + 'a>> {
        Box::pin(self.execute_tool(tool, input))
    }
}

/// Type-erased tool executor, one per registered agent.
///
/// Since `ToolExecutor` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxToolExecutor` exposes the same method and delegates to the
/// inner `ToolExecutorDyn` trait object.
pub struct BoxToolExecutor {
    inner: Box<dyn ToolExecutorDyn>,
}

impl BoxToolExecutor {
    pub fn new<T: ToolExecutor + 'static>(executor: T) -> Self {
        Self {
            inner: Box::new(executor),
        }
    }

    pub async fn execute_tool(&self, tool: &str, input: Value) -> Result<Value, ToolCallError> {
        self.inner.execute_tool_boxed(tool, input).await
    }
}

impl std::fmt::Debug for BoxToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxToolExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    impl ToolExecutor for Upper {
        async fn execute_tool(&self, tool: &str, input: Value) -> Result<Value, ToolCallError> {
            match tool {
                "upper" => {
                    let text = input["text"].as_str().unwrap_or_default();
                    Ok(json!({ "text": text.to_uppercase() }))
                }
                other => Err(ToolCallError::UnknownTool(other.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn box_executor_delegates() {
        let boxed = BoxToolExecutor::new(Upper);
        let out = boxed.execute_tool("upper", json!({"text": "hi"})).await.unwrap();
        assert_eq!(out, json!({"text": "HI"}));
    }

    #[tokio::test]
    async fn box_executor_propagates_errors() {
        let boxed = BoxToolExecutor::new(Upper);
        let err = boxed.execute_tool("lower", json!({})).await.unwrap_err();
        assert_eq!(err, ToolCallError::UnknownTool("lower".into()));
    }
}
