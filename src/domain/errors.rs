//! Domain errors for the Vigil monitoring core.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the Vigil system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Target not found: {0}")]
    TargetNotFound(Uuid),

    #[error("Invalid target address: {0}")]
    InvalidAddress(String),

    #[error("Duplicate target: owner {owner_id} already monitors {address}")]
    DuplicateTarget { owner_id: Uuid, address: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Alert dispatch failed via {channel}: {reason}")]
    AlertDispatch { channel: String, reason: String },

    #[error("Retention sweep failed: {0}")]
    Sweeper(String),

    #[error("Probe rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
