use thiserror::Error;

use crate::EventId;
use crate::record::DispatchStatus;

/// Errors that can occur when interacting with the outbox store.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The requested outbox record does not exist.
    #[error("Outbox record not found: {0}")]
    RecordNotFound(EventId),

    /// An illegal dispatch-status transition was requested.
    /// Sent and Failed are terminal.
    #[error("Invalid status transition for record {id}: {from} -> {to}")]
    InvalidTransition {
        id: EventId,
        from: DispatchStatus,
        to: DispatchStatus,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
