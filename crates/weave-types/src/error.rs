use thiserror::Error;

/// Errors surfaced by execution storage backends.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("serialization error: {0}")]
    Serialization(String),
}
