use thiserror::Error;

/// Errors that can occur while consuming integration events.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// A handler failed to apply an event. The delivery is nacked so the
    /// broker redelivers it.
    #[error("Handler for '{event_type}' failed: {reason}")]
    Handler { event_type: String, reason: String },

    /// The event payload does not match the shape the handler expects.
    #[error("Malformed '{event_type}' payload: {source}")]
    MalformedPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The consumed-events store failed.
    #[error("Consumed store error: {0}")]
    Store(String),
}

/// Result type for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;
