use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use outbox::{BrokerMessage, IntegrationEvent};

use crate::{ConsumedStore, ConsumerError, Result};

/// A handler applying integration events to a consumer's local state.
///
/// Handlers must be safe to call with an event they have effectively seen
/// before: the dispatcher filters duplicates by event id, but a crash after
/// the handler's effect and before the consumption record is written will
/// replay the event.
#[async_trait]
pub trait IntegrationEventHandler: Send + Sync {
    /// The event type discriminators this handler subscribes to.
    fn event_types(&self) -> &'static [&'static str];

    /// Applies one event.
    async fn handle(&self, event: &IntegrationEvent) -> Result<()>;
}

/// How a delivery was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler applied the event and consumption was recorded.
    Applied,
    /// The event id was already consumed by this group; skipped.
    Duplicate,
    /// No handler is registered for the event type; acknowledged and
    /// dropped so unknown event kinds never wedge the queue.
    Unhandled,
}

/// Routes deliveries to handlers by event type, deduplicating by event id.
pub struct EventDispatcher<C: ConsumedStore> {
    group: String,
    consumed: C,
    handlers: HashMap<&'static str, Arc<dyn IntegrationEventHandler>>,
}

impl<C: ConsumedStore> EventDispatcher<C> {
    /// Creates a dispatcher for a consumer group.
    pub fn new(group: impl Into<String>, consumed: C) -> Self {
        Self {
            group: group.into(),
            consumed,
            handlers: HashMap::new(),
        }
    }

    /// The consumer group this dispatcher serves.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Registers a handler under every event type it subscribes to.
    /// A later registration for the same type replaces the earlier one.
    pub fn register(&mut self, handler: Arc<dyn IntegrationEventHandler>) {
        for event_type in handler.event_types() {
            self.handlers.insert(event_type, handler.clone());
        }
    }

    /// Returns whether a handler is registered for an event type.
    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Dispatches one delivery.
    ///
    /// Duplicates and unregistered event types resolve successfully (the
    /// delivery should be acked either way); a handler failure propagates
    /// so the caller nacks for redelivery, without a consumption record.
    #[tracing::instrument(skip(self, message), fields(group = %self.group, event_id = %message.event_id, event_type = %message.event_type))]
    pub async fn dispatch(&self, message: &BrokerMessage) -> Result<DispatchOutcome> {
        if self
            .consumed
            .is_consumed(&self.group, message.event_id)
            .await?
        {
            tracing::debug!("skipping already-consumed event");
            metrics::counter!("consumer_duplicates_skipped").increment(1);
            return Ok(DispatchOutcome::Duplicate);
        }

        let Some(handler) = self.handlers.get(message.event_type.as_str()) else {
            tracing::warn!("no handler registered, dropping event");
            return Ok(DispatchOutcome::Unhandled);
        };

        let event = message.to_event();
        handler.handle(&event).await?;
        self.consumed
            .mark_consumed(&self.group, message.event_id)
            .await?;

        metrics::counter!("consumer_events_applied").increment(1);
        Ok(DispatchOutcome::Applied)
    }
}

/// Convenience for handlers deserializing their typed payload.
pub(crate) fn decode_payload<T: serde::de::DeserializeOwned>(
    event: &IntegrationEvent,
) -> Result<T> {
    serde_json::from_value(event.payload.clone()).map_err(|source| {
        ConsumerError::MalformedPayload {
            event_type: event.event_type.clone(),
            source,
        }
    })
}
