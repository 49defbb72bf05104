//! Built-in agents available to every workflow run from the CLI.
//!
//! `builtin` exposes small data tools useful for wiring and trying out
//! pipelines without external services:
//!
//! | tool    | behavior |
//! |---------|----------|
//! | `echo`  | returns its input unchanged |
//! | `merge` | shallow-merges every object-valued input into one object |
//! | `sleep` | waits `ms` milliseconds, then echoes its input |
//! | `fail`  | reports `message` through the `"error"` field |

use std::time::Duration;

use serde_json::{Map, Value, json};
use weave_core::agent::{AgentRegistry, ToolCallError, ToolExecutor};

pub const BUILTIN_AGENT: &str = "builtin";

pub fn register_all(registry: &AgentRegistry) {
    registry.register(BUILTIN_AGENT, BuiltinAgent);
}

pub struct BuiltinAgent;

impl ToolExecutor for BuiltinAgent {
    async fn execute_tool(&self, tool: &str, input: Value) -> Result<Value, ToolCallError> {
        match tool {
            "echo" => Ok(input),
            "merge" => merge(input),
            "sleep" => {
                let ms = input.get("ms").and_then(Value::as_u64).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(input)
            }
            "fail" => {
                let message = input
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("failed on request");
                Ok(json!({ "error": message }))
            }
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }
}

fn merge(input: Value) -> Result<Value, ToolCallError> {
    let Value::Object(fields) = input else {
        return Err(ToolCallError::InvalidInput(
            "merge expects an object input".to_string(),
        ));
    };

    // Later objects win on conflicting keys.
    let mut merged = Map::new();
    for (_, value) in fields {
        if let Value::Object(inner) = value {
            merged.extend(inner);
        }
    }
    Ok(Value::Object(merged))
}
