use thiserror::Error;

/// Errors that can occur during idempotency handling.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// The supplied key is malformed.
    #[error("Invalid idempotency key: {0}")]
    InvalidKey(String),

    /// The key was seen before with a different request payload. The
    /// stored response must not be served for a different request.
    #[error("Idempotency key reused with a different request payload")]
    Conflict,

    /// The backing store failed.
    #[error("Idempotency store error: {0}")]
    Store(String),
}

/// Result type for idempotency operations.
pub type Result<T> = std::result::Result<T, IdempotencyError>;
