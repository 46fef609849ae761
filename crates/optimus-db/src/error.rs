//! Database-specific error types and conversions.

use optimus_core::error::OptimusError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Stored row is invalid: {0}")]
    Decode(String),

    #[error("Record not found: {entity} {id}")]
    NotFound { entity: String, id: String },

    #[error("Record already exists: {entity} {id}")]
    AlreadyExists { entity: String, id: String },
}

impl From<DbError> for OptimusError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => {
                OptimusError::not_found(entity, format!("no record for {id}"))
            }
            DbError::AlreadyExists { entity, id } => {
                OptimusError::already_exists(entity, format!("record for {id} already exists"))
            }
            other => OptimusError::internal_with("database", "database operation failed", other),
        }
    }
}

/// Maps a failed statement to [`DbError::AlreadyExists`] when it was
/// rejected by a unique index.
pub(crate) fn classify_statement_error(
    err: surrealdb::Error,
    entity: &str,
    id: &str,
) -> DbError {
    let message = err.to_string();
    if message.contains("already contains") || message.contains("already exists") {
        DbError::AlreadyExists {
            entity: entity.into(),
            id: id.into(),
        }
    } else {
        DbError::Query(message)
    }
}
