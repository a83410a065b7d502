use thiserror::Error;

/// Errors that can occur while relaying outbox records.
///
/// Broker publish failures are not errors at this level; they are routed
/// back into the store as retry or failure transitions. Only store access
/// itself can fail a drain.
#[derive(Debug, Error)]
pub enum PublisherError {
    /// The outbox store failed.
    #[error("Outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),
}

/// Result type for publisher operations.
pub type Result<T> = std::result::Result<T, PublisherError>;
