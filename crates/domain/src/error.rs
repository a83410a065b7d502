//! Domain error types.

use outbox::OutboxError;
use thiserror::Error;

use crate::catalog::ProductError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A domain event kind has no registered mapping. This is a
    /// configuration error: an unmapped event would be silently dropped,
    /// breaking the at-least-once delivery guarantee.
    #[error("No integration-event mapping registered for domain event kind '{kind}'")]
    UnmappedEventKind { kind: String },

    /// An error occurred in the outbox store.
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// An error occurred in the product aggregate.
    #[error("Product error: {0}")]
    Product(#[from] ProductError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
