//! SQLite connection pools for the execution store.
//!
//! Journal appends and snapshot upserts all go through one writer
//! connection, so SQLite never sees two writers racing for the lock. Status,
//! log and list queries use a separate read-only pool and keep working while
//! a run is writing, thanks to WAL.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const READER_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct DatabasePool {
    /// Read-only connections for queries.
    pub reader: SqlitePool,
    /// The single connection that owns every write.
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Connect, apply migrations, then open the readers.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = connect_options(database_url)?;

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;
        sqlx::migrate!("../../migrations").run(&writer).await?;

        // Readers open after migrating: a read-only connection cannot create
        // the file or the tables.
        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(options.read_only(true))
            .await?;

        tracing::debug!(url = database_url, "execution database ready");
        Ok(Self { reader, writer })
    }
}

fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT))
}

/// `weave.db` inside [`default_data_dir`].
pub fn default_database_url() -> String {
    format!("sqlite://{}/weave.db?mode=rwc", default_data_dir())
}

/// `WEAVE_DATA_DIR`, else `$HOME/.weave`. Holds the database and `weave.toml`.
pub fn default_data_dir() -> String {
    match std::env::var("WEAVE_DATA_DIR") {
        Ok(dir) => dir,
        Err(_) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            format!("{home}/.weave")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_in(dir: &tempfile::TempDir, file: &str) -> String {
        format!("sqlite://{}?mode=rwc", dir.path().join(file).display())
    }

    #[tokio::test]
    async fn migrations_create_execution_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&url_in(&dir, "weave.db")).await.unwrap();

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('workflow_executions', 'step_transitions') ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        assert_eq!(names, vec!["step_transitions", "workflow_executions"]);
    }

    #[tokio::test]
    async fn writer_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&url_in(&dir, "wal.db")).await.unwrap();

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn reader_refuses_writes() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&url_in(&dir, "ro.db")).await.unwrap();

        let insert = "INSERT INTO step_transitions (execution_id, step_id, status, recorded_at) VALUES ('x', 's', 'running', 'now')";
        assert!(sqlx::query(insert).execute(&pool.reader).await.is_err());
        assert!(sqlx::query(insert).execute(&pool.writer).await.is_ok());
    }

    #[tokio::test]
    async fn reopening_an_existing_database_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let url = url_in(&dir, "again.db");

        drop(DatabasePool::new(&url).await.unwrap());
        assert!(DatabasePool::new(&url).await.is_ok());
    }

    #[test]
    fn default_url_points_at_weave_db() {
        let url = default_database_url();
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("/weave.db"));
    }
}
