//! In-memory `ExecutionStore`.
//!
//! Used by tests and by embedders that do not need state to survive a
//! restart. Clones share the same underlying maps.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;
use weave_types::error::RepositoryError;
use weave_types::execution::{StepTransition, WorkflowExecution};

use super::execution::ExecutionStore;

#[derive(Clone, Default)]
pub struct InMemoryExecutionStore {
    transitions: Arc<DashMap<Uuid, Vec<StepTransition>>>,
    executions: Arc<DashMap<Uuid, WorkflowExecution>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionStore for InMemoryExecutionStore {
    async fn append_transition(&self, transition: &StepTransition) -> Result<(), RepositoryError> {
        self.transitions
            .entry(transition.execution_id)
            .or_default()
            .push(transition.clone());
        Ok(())
    }

    async fn list_transitions(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<StepTransition>, RepositoryError> {
        Ok(self
            .transitions
            .get(execution_id)
            .map(|entries| entries.value().clone())
            .unwrap_or_default())
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        self.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn load_execution(
        &self,
        execution_id: &Uuid,
    ) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self.executions.get(execution_id).map(|e| e.value().clone()))
    }

    async fn list_executions(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut found: Vec<WorkflowExecution> = self
            .executions
            .iter()
            .filter(|e| match organization_id {
                Some(org) => e.organization_id.as_deref() == Some(org),
                None => true,
            })
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Map;
    use weave_types::execution::StepStatus;

    fn transition(execution_id: Uuid, step_id: &str, status: StepStatus) -> StepTransition {
        StepTransition {
            execution_id,
            step_id: step_id.to_string(),
            status,
            attempt: 1,
            output: None,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn transitions_keep_append_order() {
        let store = InMemoryExecutionStore::new();
        let id = Uuid::now_v7();

        store.append_transition(&transition(id, "a", StepStatus::Running)).await.unwrap();
        store.append_transition(&transition(id, "a", StepStatus::Completed)).await.unwrap();
        store.append_transition(&transition(id, "b", StepStatus::Running)).await.unwrap();

        let log = store.list_transitions(&id).await.unwrap();
        let steps: Vec<(&str, StepStatus)> =
            log.iter().map(|t| (t.step_id.as_str(), t.status)).collect();
        assert_eq!(
            steps,
            vec![
                ("a", StepStatus::Running),
                ("a", StepStatus::Completed),
                ("b", StepStatus::Running),
            ]
        );
        assert!(store.list_transitions(&Uuid::now_v7()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_load_and_scope_by_organization() {
        let store = InMemoryExecutionStore::new();

        let mut acme = WorkflowExecution::new("wf", Map::new());
        acme.organization_id = Some("acme".into());
        let mut globex = WorkflowExecution::new("wf", Map::new());
        globex.organization_id = Some("globex".into());

        store.save_execution(&acme).await.unwrap();
        store.save_execution(&globex).await.unwrap();

        let loaded = store.load_execution(&acme.id).await.unwrap().unwrap();
        assert_eq!(loaded, acme);

        let scoped = store.list_executions(Some("acme")).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, acme.id);

        assert_eq!(store.list_executions(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = InMemoryExecutionStore::new();
        let clone = store.clone();
        let exec = WorkflowExecution::new("wf", Map::new());

        clone.save_execution(&exec).await.unwrap();
        assert!(store.load_execution(&exec.id).await.unwrap().is_some());
    }
}
