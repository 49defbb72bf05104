//! SQLite execution store implementation.
//!
//! Implements `ExecutionStore` from `weave-core` using sqlx with split
//! read/write pools. Executions are stored as JSON snapshots keyed by id,
//! with a few scalar columns pulled out for filtering. Step transitions are
//! an append-only table ordered by its autoincrement key.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;
use weave_core::repository::execution::ExecutionStore;
use weave_types::error::RepositoryError;
use weave_types::execution::{StepStatus, StepTransition, WorkflowExecution};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ExecutionStore`.
#[derive(Clone)]
pub struct SqliteExecutionStore {
    pool: DatabasePool,
}

impl SqliteExecutionStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct ExecutionRow {
    snapshot: String,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            snapshot: row.try_get("snapshot")?,
        })
    }

    fn into_execution(self) -> Result<WorkflowExecution, RepositoryError> {
        serde_json::from_str(&self.snapshot)
            .map_err(|e| RepositoryError::Serialization(format!("invalid execution snapshot: {e}")))
    }
}

struct TransitionRow {
    execution_id: String,
    step_id: String,
    status: String,
    attempt: i64,
    output: Option<String>,
    error: Option<String>,
    recorded_at: String,
}

impl TransitionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            execution_id: row.try_get("execution_id")?,
            step_id: row.try_get("step_id")?,
            status: row.try_get("status")?,
            attempt: row.try_get("attempt")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    fn into_transition(self) -> Result<StepTransition, RepositoryError> {
        let execution_id = parse_uuid(&self.execution_id)?;
        let status: StepStatus = self
            .status
            .parse()
            .map_err(RepositoryError::Query)?;

        let output = self
            .output
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid step output JSON: {e}")))
            })
            .transpose()?;

        Ok(StepTransition {
            execution_id,
            step_id: self.step_id,
            status,
            attempt: u32::try_from(self.attempt).unwrap_or(0),
            output,
            error: self.error,
            recorded_at: parse_datetime(&self.recorded_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// ExecutionStore impl
// ---------------------------------------------------------------------------

impl ExecutionStore for SqliteExecutionStore {
    async fn append_transition(&self, transition: &StepTransition) -> Result<(), RepositoryError> {
        let output = transition
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO step_transitions
               (execution_id, step_id, status, attempt, output, error, recorded_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(transition.execution_id.to_string())
        .bind(&transition.step_id)
        .bind(transition.status.as_str())
        .bind(i64::from(transition.attempt))
        .bind(&output)
        .bind(&transition.error)
        .bind(format_datetime(&transition.recorded_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_transitions(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<StepTransition>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT execution_id, step_id, status, attempt, output, error, recorded_at FROM step_transitions WHERE execution_id = ? ORDER BY id ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut transitions = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = TransitionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            transitions.push(r.into_transition()?);
        }
        Ok(transitions)
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let snapshot = serde_json::to_string(execution)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        let now = format_datetime(&Utc::now());

        sqlx::query(
            r#"INSERT INTO workflow_executions
               (id, workflow_id, status, organization_id, initiated_by, snapshot, started_at, completed_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 snapshot = excluded.snapshot,
                 completed_at = excluded.completed_at,
                 updated_at = excluded.updated_at"#,
        )
        .bind(execution.id.to_string())
        .bind(&execution.workflow_id)
        .bind(execution.status.as_str())
        .bind(&execution.organization_id)
        .bind(&execution.initiated_by)
        .bind(&snapshot)
        .bind(format_datetime(&execution.started_at))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn load_execution(
        &self,
        execution_id: &Uuid,
    ) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query("SELECT snapshot FROM workflow_executions WHERE id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        // UUIDv7 ids sort by creation time, so `id` breaks started_at ties.
        let rows = match organization_id {
            Some(org) => {
                sqlx::query(
                    "SELECT snapshot FROM workflow_executions WHERE organization_id = ? ORDER BY started_at DESC, id DESC",
                )
                .bind(org)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT snapshot FROM workflow_executions ORDER BY started_at DESC, id DESC",
                )
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut executions = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ExecutionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            executions.push(r.into_execution()?);
        }
        Ok(executions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use weave_types::execution::{ExecutionStatus, StepFailure};

    async fn test_store() -> (tempfile::TempDir, SqliteExecutionStore) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteExecutionStore::new(pool))
    }

    fn sample_execution(org: Option<&str>) -> WorkflowExecution {
        let mut context = Map::new();
        context.insert("ticket".to_string(), json!({"id": 42, "body": "printer on fire"}));
        let mut exec = WorkflowExecution::new("triage", context);
        exec.organization_id = org.map(str::to_string);
        exec.initiated_by = Some("alice".to_string());
        exec
    }

    fn transition(execution_id: Uuid, step_id: &str, status: StepStatus, attempt: u32) -> StepTransition {
        StepTransition {
            execution_id,
            step_id: step_id.to_string(),
            status,
            attempt,
            output: None,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_save_and_load_execution() {
        let (_dir, store) = test_store().await;
        let mut exec = sample_execution(Some("acme"));
        exec.transition(ExecutionStatus::Running);
        exec.step_results.insert("classify".to_string(), json!({"label": "hardware"}));
        exec.completed_steps.push("classify".to_string());
        exec.set_step_status("classify", StepStatus::Completed);

        store.save_execution(&exec).await.unwrap();

        let loaded = store.load_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded, exec);
    }

    #[tokio::test]
    async fn test_save_execution_upserts() {
        let (_dir, store) = test_store().await;
        let mut exec = sample_execution(None);
        store.save_execution(&exec).await.unwrap();

        exec.transition(ExecutionStatus::Running);
        exec.transition(ExecutionStatus::Failed);
        exec.failed_steps.insert(
            "route".to_string(),
            StepFailure {
                error: "router offline".to_string(),
                failed_at: Utc::now(),
            },
        );
        exec.error = Some("step 'route' failed: router offline".to_string());
        store.save_execution(&exec).await.unwrap();

        let loaded = store.load_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Failed);
        assert!(loaded.completed_at.is_some());
        assert_eq!(loaded.failed_steps["route"].error, "router offline");
        assert_eq!(store.list_executions(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_execution() {
        let (_dir, store) = test_store().await;
        assert!(store.load_execution(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_executions_by_organization() {
        let (_dir, store) = test_store().await;
        let first = sample_execution(Some("acme"));
        let second = sample_execution(Some("globex"));
        let third = sample_execution(Some("acme"));
        for exec in [&first, &second, &third] {
            store.save_execution(exec).await.unwrap();
        }

        let acme = store.list_executions(Some("acme")).await.unwrap();
        let ids: Vec<Uuid> = acme.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![third.id, first.id]);

        assert_eq!(store.list_executions(None).await.unwrap().len(), 3);
        assert!(store.list_executions(Some("initech")).await.unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_transitions_keep_append_order() {
        let (_dir, store) = test_store().await;
        let id = Uuid::now_v7();
        let other = Uuid::now_v7();

        store
            .append_transition(&transition(id, "fetch", StepStatus::Running, 1))
            .await
            .unwrap();
        store
            .append_transition(&transition(other, "fetch", StepStatus::Running, 1))
            .await
            .unwrap();
        store
            .append_transition(&StepTransition {
                error: Some("connection reset".to_string()),
                ..transition(id, "fetch", StepStatus::Failed, 1)
            })
            .await
            .unwrap();
        store
            .append_transition(&StepTransition {
                output: Some(json!({"items": [1, 2, 3]})),
                ..transition(id, "fetch", StepStatus::Completed, 2)
            })
            .await
            .unwrap();

        let log = store.list_transitions(&id).await.unwrap();
        let statuses: Vec<StepStatus> = log.iter().map(|t| t.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Running, StepStatus::Failed, StepStatus::Completed]
        );
        assert_eq!(log[1].error.as_deref(), Some("connection reset"));
        assert_eq!(log[2].attempt, 2);
        assert_eq!(log[2].output, Some(json!({"items": [1, 2, 3]})));
        assert_eq!(store.list_transitions(&other).await.unwrap().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Orchestrator round trip
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_orchestrator_state_survives_restart() {
        use std::sync::Arc;
        use weave_core::agent::{AgentRegistry, FnToolExecutor, ToolCallError};
        use weave_core::workflow::{Orchestrator, RunRequest};
        use weave_types::config::EngineConfig;
        use weave_types::workflow::Workflow;

        fn registry() -> Arc<AgentRegistry> {
            let registry = AgentRegistry::new();
            registry.register(
                "echo",
                FnToolExecutor::new(|_tool, input| async move { Ok::<_, ToolCallError>(input) }),
            );
            Arc::new(registry)
        }

        let (_dir, store) = test_store().await;
        let workflow: Workflow = serde_json::from_value(json!({
            "id": "digest",
            "name": "Digest",
            "steps": [
                {"id": "fetch", "name": "Fetch", "agent": "echo", "tool": "get",
                 "input_mapping": {"topic": "$context.topic"}, "next_steps": ["summarize"]},
                {"id": "summarize", "name": "Summarize", "agent": "echo", "tool": "sum",
                 "input_mapping": {"items": "$results.fetch"}}
            ]
        }))
        .unwrap();

        let first = Orchestrator::new(store.clone(), registry(), EngineConfig::default());
        let mut context = Map::new();
        context.insert("topic".to_string(), json!("rust"));
        let request = RunRequest {
            organization_id: Some("acme".to_string()),
            ..RunRequest::with_context(context)
        };
        let done = first.run_workflow(workflow, request).await.unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        drop(first);

        let second = Orchestrator::new(store, registry(), EngineConfig::default());
        let restored = second.get_execution(done.id).await.unwrap();
        assert_eq!(restored, done);
        assert_eq!(restored.context["echo_sum_result"], json!({"items": {"topic": "rust"}}));

        let log = second.step_log(done.id).await.unwrap();
        let completed: Vec<&str> = log
            .iter()
            .filter(|t| t.status == StepStatus::Completed)
            .map(|t| t.step_id.as_str())
            .collect();
        assert_eq!(completed, vec!["fetch", "summarize"]);

        let listed = second.list_executions(Some("acme")).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_list_transitions_empty() {
        let (_dir, store) = test_store().await;
        assert!(store.list_transitions(&Uuid::now_v7()).await.unwrap().is_empty());
    }
}
