//! Application state wiring the engine to its concrete adapters.
//!
//! The orchestrator is generic over its execution store; `AppState` pins it
//! to SQLite and registers the built-in agents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use weave_core::agent::AgentRegistry;
use weave_core::workflow::Orchestrator;
use weave_infra::config::{config_path, load_engine_config};
use weave_infra::sqlite::execution::SqliteExecutionStore;
use weave_infra::sqlite::pool::{DatabasePool, default_data_dir, default_database_url};

use crate::builtin;

pub type ConcreteOrchestrator = Orchestrator<SqliteExecutionStore>;

pub struct AppState {
    pub orchestrator: ConcreteOrchestrator,
}

impl AppState {
    /// Load config, open the database and wire the orchestrator.
    ///
    /// `config` and `db_url` override the files under the data directory.
    pub async fn init(config: Option<&Path>, db_url: Option<&str>) -> anyhow::Result<Self> {
        let data_dir = PathBuf::from(default_data_dir());
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = match config {
            Some(path) => load_engine_config(path).await,
            None => load_engine_config(&config_path(&data_dir)).await,
        };

        let db_url = db_url.map(str::to_string).unwrap_or_else(default_database_url);
        let pool = DatabasePool::new(&db_url).await?;
        tracing::debug!(data_dir = %data_dir.display(), "application state ready");

        let registry = AgentRegistry::new();
        builtin::register_all(&registry);

        let orchestrator =
            Orchestrator::new(SqliteExecutionStore::new(pool), Arc::new(registry), config);

        Ok(Self { orchestrator })
    }
}
