//! Domain errors for the world state scheduling engine.
//!
//! These cover genuinely exceptional conditions (storage failures, corrupt
//! rows, broken input invariants). Expected scheduling outcomes such as a
//! time conflict are never errors; they travel as
//! [`UpdateFailure`](crate::domain::models::UpdateFailure) values.

use thiserror::Error;

/// Domain-level errors that can occur in the scheduling engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Scheduled item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid scheduled item {item_id}: {reason}")]
    InvalidItem { item_id: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("Learning hook failed: {0}")]
    LearningHookFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
