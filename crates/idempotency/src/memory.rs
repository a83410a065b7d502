use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{IdempotencyKey, Result, StoredResponse, store::IdempotencyStore};

struct Entry {
    response: StoredResponse,
    expires_at: DateTime<Utc>,
}

/// In-memory idempotency store with TTL expiry.
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryIdempotencyStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes all expired entries.
    pub async fn purge_expired(&self) {
        let now = Utc::now();
        self.entries.write().await.retain(|_, e| e.expires_at > now);
    }

    /// Returns the number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Returns true if the store holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<StoredResponse>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key.as_str())
            .filter(|e| e.expires_at > Utc::now())
            .map(|e| e.response.clone()))
    }

    async fn put(
        &self,
        key: &IdempotencyKey,
        response: StoredResponse,
        ttl: Duration,
    ) -> Result<()> {
        let now = Utc::now();
        let expires_at =
            now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));
        let mut entries = self.entries.write().await;
        // Writes double as the sweep so expired entries don't accumulate.
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(key.as_str().to_string(), Entry { response, expires_at });
        Ok(())
    }
}
