use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{EventId, IntegrationEvent, OutboxRecord};

/// The message handed to the broker for one integration event.
///
/// Serialized as JSON; consumers deserialize the payload by the
/// `event_type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub event_id: EventId,
    pub event_type: String,
    pub occurred_on: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl BrokerMessage {
    /// Builds the message for an outbox record, reusing the record's id.
    pub fn from_record(record: &OutboxRecord) -> Self {
        Self {
            event_id: record.id,
            event_type: record.event_type.clone(),
            occurred_on: record.occurred_on,
            payload: record.payload.clone(),
        }
    }

    /// Reconstructs the integration event carried by this message.
    pub fn to_event(&self) -> IntegrationEvent {
        IntegrationEvent {
            event_id: self.event_id,
            event_type: self.event_type.clone(),
            occurred_on: self.occurred_on,
            payload: self.payload.clone(),
        }
    }
}

impl From<&IntegrationEvent> for BrokerMessage {
    fn from(event: &IntegrationEvent) -> Self {
        Self {
            event_id: event.event_id,
            event_type: event.event_type.clone(),
            occurred_on: event.occurred_on,
            payload: event.payload.clone(),
        }
    }
}

/// Errors returned by a broker publish.
///
/// The publisher classifies these: transient errors and timeouts are
/// retried with backoff; permanent errors move the record to `Failed`
/// immediately.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// Broker unavailable, network failure. Retryable.
    #[error("transient broker failure: {0}")]
    Transient(String),

    /// Publish exceeded its bounded timeout. Retryable.
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    /// The payload cannot be serialized or is rejected by the broker
    /// schema. Not retryable.
    #[error("permanent publish failure: {0}")]
    Permanent(String),
}

impl PublishError {
    /// Returns whether the publisher should retry after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PublishError::Permanent(_))
    }
}

/// Client contract for the message broker collaborator.
///
/// The broker is assumed to provide at-least-once delivery with
/// redelivery-on-nack; this crate only specifies the publish side.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Publishes one message.
    async fn publish(&self, message: BrokerMessage) -> std::result::Result<(), PublishError>;
}

/// One delivery of a message to a consumer group.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: BrokerMessage,
    /// 1 for the first delivery, incremented on each redelivery.
    pub attempt: u32,
}

#[derive(Default)]
struct GroupQueue {
    pending: VecDeque<Delivery>,
    dead_letter: Vec<BrokerMessage>,
}

struct BrokerInner {
    groups: HashMap<String, GroupQueue>,
    published: Vec<BrokerMessage>,
    injected_failures: VecDeque<PublishError>,
    redelivery_ceiling: u32,
}

/// In-memory broker with at-least-once semantics.
///
/// Every published message fans out to all subscribed consumer groups.
/// Nacked deliveries are requeued with an incremented attempt count until
/// the redelivery ceiling, then routed to the group's dead-letter queue.
/// Failures can be injected to exercise the publisher's retry paths.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<RwLock<BrokerInner>>,
}

impl InMemoryBroker {
    /// Creates a broker with the default redelivery ceiling (5).
    pub fn new() -> Self {
        Self::with_redelivery_ceiling(5)
    }

    /// Creates a broker with a custom redelivery ceiling.
    pub fn with_redelivery_ceiling(ceiling: u32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BrokerInner {
                groups: HashMap::new(),
                published: Vec::new(),
                injected_failures: VecDeque::new(),
                redelivery_ceiling: ceiling,
            })),
        }
    }

    /// Registers a consumer group. Messages published after subscription
    /// are delivered to it; subscribing twice is a no-op.
    pub async fn subscribe(&self, group: &str) {
        let mut inner = self.inner.write().await;
        inner.groups.entry(group.to_string()).or_default();
    }

    /// Takes the next delivery for a group, if any.
    pub async fn next_delivery(&self, group: &str) -> Option<Delivery> {
        let mut inner = self.inner.write().await;
        inner.groups.get_mut(group)?.pending.pop_front()
    }

    /// Acknowledges a delivery. The message will not be redelivered.
    pub async fn ack(&self, _group: &str, _delivery: &Delivery) {
        // Delivery was removed from the queue on `next_delivery`; an ack
        // simply declines to requeue it.
    }

    /// Negatively acknowledges a delivery, requeueing it for redelivery.
    ///
    /// Once the redelivery ceiling is exceeded the message is routed to
    /// the group's dead-letter queue instead.
    pub async fn nack(&self, group: &str, delivery: Delivery) {
        let mut inner = self.inner.write().await;
        let ceiling = inner.redelivery_ceiling;
        if let Some(queue) = inner.groups.get_mut(group) {
            if delivery.attempt >= ceiling {
                tracing::warn!(
                    event_id = %delivery.message.event_id,
                    attempts = delivery.attempt,
                    "message dead-lettered"
                );
                queue.dead_letter.push(delivery.message);
            } else {
                queue.pending.push_back(Delivery {
                    message: delivery.message,
                    attempt: delivery.attempt + 1,
                });
            }
        }
    }

    /// Requeues a copy of a message for a group, simulating the broker's
    /// at-least-once redelivery of an already-delivered message.
    pub async fn inject_duplicate(&self, group: &str, message: BrokerMessage) {
        let mut inner = self.inner.write().await;
        if let Some(queue) = inner.groups.get_mut(group) {
            queue.pending.push_back(Delivery {
                message,
                attempt: 1,
            });
        }
    }

    /// Makes the next publish call fail with the given error.
    pub async fn fail_next_publish(&self, error: PublishError) {
        self.inner.write().await.injected_failures.push_back(error);
    }

    /// Returns all successfully published messages, in publish order.
    pub async fn published(&self) -> Vec<BrokerMessage> {
        self.inner.read().await.published.clone()
    }

    /// Returns a group's dead-lettered messages.
    pub async fn dead_letters(&self, group: &str) -> Vec<BrokerMessage> {
        self.inner
            .read()
            .await
            .groups
            .get(group)
            .map(|q| q.dead_letter.clone())
            .unwrap_or_default()
    }

    /// Returns the number of deliveries waiting for a group.
    pub async fn pending_count(&self, group: &str) -> usize {
        self.inner
            .read()
            .await
            .groups
            .get(group)
            .map(|q| q.pending.len())
            .unwrap_or(0)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn publish(&self, message: BrokerMessage) -> std::result::Result<(), PublishError> {
        let mut inner = self.inner.write().await;

        if let Some(error) = inner.injected_failures.pop_front() {
            return Err(error);
        }

        inner.published.push(message.clone());
        for queue in inner.groups.values_mut() {
            queue.pending.push_back(Delivery {
                message: message.clone(),
                attempt: 1,
            });
        }
        metrics::counter!("broker_messages_published").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_message(event_type: &str) -> BrokerMessage {
        BrokerMessage::from(&IntegrationEvent::new(
            event_type,
            serde_json::json!({"test": true}),
        ))
    }

    #[tokio::test]
    async fn publish_fans_out_to_all_groups() {
        let broker = InMemoryBroker::new();
        broker.subscribe("catalog").await;
        broker.subscribe("search").await;

        broker.publish(test_message("ProductCreated")).await.unwrap();

        assert_eq!(broker.pending_count("catalog").await, 1);
        assert_eq!(broker.pending_count("search").await, 1);
    }

    #[tokio::test]
    async fn nack_redelivers_with_incremented_attempt() {
        let broker = InMemoryBroker::new();
        broker.subscribe("catalog").await;
        broker.publish(test_message("ProductCreated")).await.unwrap();

        let first = broker.next_delivery("catalog").await.unwrap();
        assert_eq!(first.attempt, 1);
        broker.nack("catalog", first).await;

        let second = broker.next_delivery("catalog").await.unwrap();
        assert_eq!(second.attempt, 2);
    }

    #[tokio::test]
    async fn repeated_nacks_dead_letter_the_message() {
        let broker = InMemoryBroker::with_redelivery_ceiling(2);
        broker.subscribe("catalog").await;
        broker.publish(test_message("ProductCreated")).await.unwrap();

        let first = broker.next_delivery("catalog").await.unwrap();
        broker.nack("catalog", first).await;
        let second = broker.next_delivery("catalog").await.unwrap();
        assert_eq!(second.attempt, 2);
        broker.nack("catalog", second).await;

        assert!(broker.next_delivery("catalog").await.is_none());
        assert_eq!(broker.dead_letters("catalog").await.len(), 1);
    }

    #[tokio::test]
    async fn injected_failure_is_consumed_once() {
        let broker = InMemoryBroker::new();
        broker.subscribe("catalog").await;
        broker
            .fail_next_publish(PublishError::Transient("broker down".into()))
            .await;

        let err = broker.publish(test_message("A")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(broker.published().await.is_empty());

        broker.publish(test_message("A")).await.unwrap();
        assert_eq!(broker.published().await.len(), 1);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retryable() {
        let err = PublishError::Permanent("bad schema".into());
        assert!(!err.is_retryable());
        assert!(PublishError::Timeout(Duration::from_secs(5)).is_retryable());
    }

    #[tokio::test]
    async fn ack_prevents_redelivery() {
        let broker = InMemoryBroker::new();
        broker.subscribe("catalog").await;
        broker.publish(test_message("A")).await.unwrap();

        let delivery = broker.next_delivery("catalog").await.unwrap();
        broker.ack("catalog", &delivery).await;

        assert!(broker.next_delivery("catalog").await.is_none());
    }
}
