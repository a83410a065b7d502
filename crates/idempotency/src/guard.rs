use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{IdempotencyError, IdempotencyKey, Result, StoredResponse, store::IdempotencyStore};

/// Default retention for stored responses: 24 hours.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Exclusive right to execute the request for a key. Held for the duration
/// of the handler; concurrent requests with the same key wait on it.
pub struct InFlightPermit {
    key: IdempotencyKey,
    fingerprint: String,
    _lock: OwnedMutexGuard<()>,
}

impl InFlightPermit {
    /// The key this permit covers.
    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }
}

/// Outcome of checking a request against the idempotency store.
pub enum GuardDecision {
    /// The same request was completed before; serve the stored response
    /// without executing the handler.
    Replay(StoredResponse),

    /// First time this request is seen; execute the handler while holding
    /// the permit, then call `complete`.
    Execute(InFlightPermit),
}

/// Request de-duplication guard.
///
/// Serializes concurrent requests per key so that two simultaneous retries
/// cannot both execute the handler: the first acquires the in-flight lock,
/// runs, and stores its response; the second acquires the lock afterwards
/// and finds the stored response.
pub struct IdempotencyGuard<S: IdempotencyStore> {
    store: S,
    retention: Duration,
    in_flight: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl<S: IdempotencyStore> IdempotencyGuard<S> {
    /// Creates a guard with the default retention period.
    pub fn new(store: S) -> Self {
        Self::with_retention(store, DEFAULT_RETENTION)
    }

    /// Creates a guard with an explicit retention period.
    pub fn with_retention(store: S, retention: Duration) -> Self {
        Self {
            store,
            retention,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Checks a request against the store.
    ///
    /// Returns `Replay` when the key was completed before with the same
    /// fingerprint, `Execute` when the request must run, and
    /// `Err(Conflict)` when the key was used with a different payload.
    #[tracing::instrument(skip(self, fingerprint), fields(key = %key))]
    pub async fn begin(
        &self,
        key: &IdempotencyKey,
        fingerprint: impl Into<String>,
    ) -> Result<GuardDecision> {
        let fingerprint = fingerprint.into();
        let lock = self.key_lock(key).await;
        let permit_lock = lock.lock_owned().await;

        match self.store.get(key).await? {
            Some(stored) if stored.fingerprint == fingerprint => {
                tracing::debug!(key = %key, "replaying stored response");
                metrics::counter!("idempotency_replays_total").increment(1);
                drop(permit_lock);
                self.evict_key_lock(key).await;
                Ok(GuardDecision::Replay(stored))
            }
            Some(_) => {
                tracing::warn!(key = %key, "idempotency key reused with different payload");
                metrics::counter!("idempotency_conflicts_total").increment(1);
                drop(permit_lock);
                self.evict_key_lock(key).await;
                Err(IdempotencyError::Conflict)
            }
            None => Ok(GuardDecision::Execute(InFlightPermit {
                key: key.clone(),
                fingerprint,
                _lock: permit_lock,
            })),
        }
    }

    /// Records the handler's response under the permit's key, then releases
    /// the permit so waiting retries observe the stored response.
    pub async fn complete(
        &self,
        permit: InFlightPermit,
        status: u16,
        body: serde_json::Value,
    ) -> Result<()> {
        let response = StoredResponse {
            fingerprint: permit.fingerprint.clone(),
            status,
            body,
        };
        self.store.put(&permit.key, response, self.retention).await?;
        let key = permit.key.clone();
        drop(permit);
        self.evict_key_lock(&key).await;
        Ok(())
    }

    /// Runs `handler` at most once per (key, fingerprint), replaying the
    /// stored response on retries.
    pub async fn execute<F, Fut, E>(
        &self,
        key: &IdempotencyKey,
        fingerprint: impl Into<String>,
        handler: F,
    ) -> Result<StoredResponse>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<(u16, serde_json::Value), E>>,
        E: std::fmt::Display,
    {
        let fingerprint = fingerprint.into();
        match self.begin(key, fingerprint.clone()).await? {
            GuardDecision::Replay(stored) => Ok(stored),
            GuardDecision::Execute(permit) => {
                let (status, body) = handler()
                    .await
                    .map_err(|e| IdempotencyError::Store(e.to_string()))?;
                let response = StoredResponse {
                    fingerprint,
                    status,
                    body: body.clone(),
                };
                self.complete(permit, status, body).await?;
                Ok(response)
            }
        }
    }

    async fn key_lock(&self, key: &IdempotencyKey) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        // Sweep entries abandoned by permits that were dropped without
        // `complete` (e.g. the handler errored).
        in_flight.retain(|_, lock| Arc::strong_count(lock) > 1);
        in_flight
            .entry(key.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the per-key lock entry once nothing holds or waits on it,
    /// so the in-flight map does not grow with every distinct key.
    async fn evict_key_lock(&self, key: &IdempotencyKey) {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(entry) = in_flight.get(key.as_str()) {
            // Waiters hold their own clone of the Arc; a count of one
            // means the map's entry is the last reference.
            if Arc::strong_count(entry) == 1 {
                in_flight.remove(key.as_str());
            }
        }
    }

    #[cfg(test)]
    async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}
