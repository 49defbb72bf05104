//! Agent registry for runtime tool-executor lookup.
//!
//! The registry is built once at startup and handed to the orchestrator;
//! there is no process-wide instance.

use std::sync::Arc;

use dashmap::DashMap;

use super::box_executor::BoxToolExecutor;
use super::executor::ToolExecutor;

/// Resolves an agent id to its tool executor.
pub trait AgentResolver: Send + Sync {
    fn resolve(&self, agent_id: &str) -> Option<Arc<BoxToolExecutor>>;
}

/// Registry of agents indexed by id.
///
/// Backed by a `DashMap` so agents can be registered while executions are
/// in flight.
pub struct AgentRegistry {
    agents: DashMap<String, Arc<BoxToolExecutor>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
        }
    }

    /// Register an agent under the given id.
    ///
    /// If an agent with this id already exists, it is replaced.
    pub fn register<T: ToolExecutor + 'static>(&self, agent_id: impl Into<String>, executor: T) {
        self.agents
            .insert(agent_id.into(), Arc::new(BoxToolExecutor::new(executor)));
    }

    /// Remove an agent. Returns `true` if it was registered.
    pub fn unregister(&self, agent_id: &str) -> bool {
        self.agents.remove(agent_id).is_some()
    }

    /// All registered agent ids, sorted.
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentResolver for AgentRegistry {
    fn resolve(&self, agent_id: &str) -> Option<Arc<BoxToolExecutor>> {
        self.agents.get(agent_id).map(|e| Arc::clone(e.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{FnToolExecutor, ToolCallError};
    use serde_json::{Value, json};

    fn echo() -> FnToolExecutor<impl Fn(String, Value) -> std::future::Ready<Result<Value, ToolCallError>>> {
        FnToolExecutor::new(|_tool: String, input: Value| std::future::ready(Ok(input)))
    }

    #[tokio::test]
    async fn registered_agent_resolves() {
        let registry = AgentRegistry::new();
        registry.register("echo", echo());

        let exec = registry.resolve("echo").expect("registered");
        let out = exec.execute_tool("any", json!({"a": 1})).await.unwrap();
        assert_eq!(out, json!({"a": 1}));
    }

    #[test]
    fn unknown_agent_resolves_to_none() {
        let registry = AgentRegistry::new();
        assert!(registry.resolve("ghost").is_none());
    }

    #[test]
    fn register_replaces_and_unregister_removes() {
        let registry = AgentRegistry::new();
        registry.register("b", echo());
        registry.register("a", echo());
        registry.register("a", echo());
        assert_eq!(registry.list_ids(), vec!["a", "b"]);

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert_eq!(registry.list_ids(), vec!["b"]);
    }
}
