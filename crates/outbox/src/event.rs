use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EventId;

/// The wire-level fact derived from one or more domain events.
///
/// An integration event is what crosses service boundaries. Its `event_id`
/// is unique per logical occurrence: retransmission of the same occurrence
/// reuses the same id, which is what makes consumer-side deduplication work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEvent {
    /// Globally unique identifier, generated at construction. Deduplication key.
    pub event_id: EventId,

    /// Event-type discriminator (e.g., "ProductCreated"). Consumers
    /// deserialize the payload by this tag.
    pub event_type: String,

    /// When the underlying fact occurred, UTC.
    pub occurred_on: DateTime<Utc>,

    /// Event-specific payload as JSON.
    pub payload: serde_json::Value,
}

impl IntegrationEvent {
    /// Creates a new integration event builder.
    pub fn builder() -> IntegrationEventBuilder {
        IntegrationEventBuilder::default()
    }

    /// Creates an event with a fresh id, occurring now.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            occurred_on: Utc::now(),
            payload,
        }
    }
}

/// Builder for constructing integration events.
#[derive(Debug, Default)]
pub struct IntegrationEventBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    occurred_on: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
}

impl IntegrationEventBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the event-type discriminator.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the occurrence timestamp. If not set, the current time is used.
    pub fn occurred_on(mut self, occurred_on: DateTime<Utc>) -> Self {
        self.occurred_on = Some(occurred_on);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the integration event.
    ///
    /// # Panics
    ///
    /// Panics if `event_type` or `payload` are not set.
    pub fn build(self) -> IntegrationEvent {
        IntegrationEvent {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type.expect("event_type is required"),
            occurred_on: self.occurred_on.unwrap_or_else(Utc::now),
            payload: self.payload.expect("payload is required"),
        }
    }

    /// Tries to build the event, returning None if required fields are missing.
    pub fn try_build(self) -> Option<IntegrationEvent> {
        Some(IntegrationEvent {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type?,
            occurred_on: self.occurred_on.unwrap_or_else(Utc::now),
            payload: self.payload?,
        })
    }
}
