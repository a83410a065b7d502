use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::EventId;
use tokio::sync::RwLock;

use crate::Result;

/// Per-consumer-group record of already-applied event ids.
///
/// Deduplication is scoped to the group: two groups consuming the same
/// event each apply it once. The record must be written only after the
/// handler's effect is durable, so a crash in between causes a redelivery
/// and a retry, never a lost event.
#[async_trait]
pub trait ConsumedStore: Send + Sync {
    /// Returns whether the group has already applied this event.
    async fn is_consumed(&self, group: &str, event_id: EventId) -> Result<bool>;

    /// Records the event as applied by the group. Idempotent.
    async fn mark_consumed(&self, group: &str, event_id: EventId) -> Result<()>;
}

/// In-memory consumed-events store.
#[derive(Clone, Default)]
pub struct InMemoryConsumedStore {
    consumed: Arc<RwLock<HashSet<(String, EventId)>>>,
}

impl InMemoryConsumedStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of consumption records across all groups.
    pub async fn record_count(&self) -> usize {
        self.consumed.read().await.len()
    }
}

#[async_trait]
impl ConsumedStore for InMemoryConsumedStore {
    async fn is_consumed(&self, group: &str, event_id: EventId) -> Result<bool> {
        Ok(self
            .consumed
            .read()
            .await
            .contains(&(group.to_string(), event_id)))
    }

    async fn mark_consumed(&self, group: &str, event_id: EventId) -> Result<()> {
        self.consumed
            .write()
            .await
            .insert((group.to_string(), event_id));
        Ok(())
    }
}
