use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    DispatchStatus, EventId, OutboxError, OutboxRecord, Result, RetryPolicy,
    store::{OutboxStore, OutboxTransaction, TransactionalOutbox},
};

/// In-memory outbox store.
///
/// Provides the same contract as the PostgreSQL implementation, including
/// staged transactions and claim-with-visibility-timeout fetch semantics.
/// Used in tests and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryOutbox {
    records: Arc<RwLock<HashMap<EventId, OutboxRecord>>>,
    next_seq: Arc<AtomicI64>,
    policy: RetryPolicy,
}

impl InMemoryOutbox {
    /// Creates a new empty store with the default retry policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with a custom retry policy.
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            next_seq: Arc::new(AtomicI64::new(0)),
            policy,
        }
    }

    /// Returns the total number of records stored, regardless of status.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutbox {
    async fn append(&self, records: Vec<OutboxRecord>) -> Result<()> {
        let mut store = self.records.write().await;
        for mut record in records {
            record.seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
            store.insert(record.id, record);
        }
        Ok(())
    }

    async fn fetch_pending(
        &self,
        batch_size: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<OutboxRecord>> {
        let now = Utc::now();
        let mut store = self.records.write().await;

        let mut claimable: Vec<EventId> = store
            .values()
            .filter(|r| r.is_claimable(now, visibility_timeout))
            .map(|r| r.id)
            .collect();
        // seq breaks ties between records sharing a created_at timestamp.
        claimable.sort_by_key(|id| (store[id].created_at, store[id].seq));
        claimable.truncate(batch_size);

        let mut claimed = Vec::with_capacity(claimable.len());
        for id in claimable {
            // Claim under the same write lock, so no other worker can
            // observe the record unclaimed.
            if let Some(record) = store.get_mut(&id) {
                record.claimed_at = Some(now);
                claimed.push(record.clone());
            }
        }

        Ok(claimed)
    }

    async fn mark_sent(&self, id: EventId) -> Result<()> {
        let mut store = self.records.write().await;
        let record = store.get_mut(&id).ok_or(OutboxError::RecordNotFound(id))?;

        match record.status {
            DispatchStatus::Pending => {
                record.status = DispatchStatus::Sent;
                record.claimed_at = None;
                record.last_error = None;
                metrics::counter!("outbox_records_sent").increment(1);
                Ok(())
            }
            // Redundant confirmation after a redundant publish is harmless.
            DispatchStatus::Sent => Ok(()),
            DispatchStatus::Failed => Err(OutboxError::InvalidTransition {
                id,
                from: DispatchStatus::Failed,
                to: DispatchStatus::Sent,
            }),
        }
    }

    async fn mark_failed(&self, id: EventId, reason: &str) -> Result<()> {
        let mut store = self.records.write().await;
        let record = store.get_mut(&id).ok_or(OutboxError::RecordNotFound(id))?;

        match record.status {
            DispatchStatus::Pending => {
                record.attempts += 1;
                record.last_error = Some(reason.to_string());
                record.claimed_at = None;
                if record.attempts >= self.policy.max_attempts {
                    record.status = DispatchStatus::Failed;
                    tracing::error!(
                        event_id = %id,
                        attempts = record.attempts,
                        reason,
                        "outbox record exhausted retries"
                    );
                    metrics::counter!("outbox_records_failed").increment(1);
                } else {
                    let backoff = self.policy.backoff(record.attempts);
                    record.next_attempt_at = Utc::now()
                        + chrono::Duration::from_std(backoff)
                            .unwrap_or_else(|_| chrono::Duration::seconds(0));
                    metrics::counter!("outbox_dispatch_retries").increment(1);
                }
                Ok(())
            }
            DispatchStatus::Failed => Ok(()),
            DispatchStatus::Sent => Err(OutboxError::InvalidTransition {
                id,
                from: DispatchStatus::Sent,
                to: DispatchStatus::Failed,
            }),
        }
    }

    async fn mark_permanently_failed(&self, id: EventId, reason: &str) -> Result<()> {
        let mut store = self.records.write().await;
        let record = store.get_mut(&id).ok_or(OutboxError::RecordNotFound(id))?;

        match record.status {
            DispatchStatus::Pending => {
                record.attempts += 1;
                record.status = DispatchStatus::Failed;
                record.last_error = Some(reason.to_string());
                record.claimed_at = None;
                tracing::error!(event_id = %id, reason, "outbox record permanently failed");
                metrics::counter!("outbox_records_failed").increment(1);
                Ok(())
            }
            DispatchStatus::Failed => Ok(()),
            DispatchStatus::Sent => Err(OutboxError::InvalidTransition {
                id,
                from: DispatchStatus::Sent,
                to: DispatchStatus::Failed,
            }),
        }
    }

    async fn get(&self, id: EventId) -> Result<Option<OutboxRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }
}

/// Transaction over the in-memory store.
///
/// Appends are staged locally and become visible only on commit. Dropping
/// the transaction without committing discards them.
pub struct InMemoryOutboxTransaction {
    records: Arc<RwLock<HashMap<EventId, OutboxRecord>>>,
    next_seq: Arc<AtomicI64>,
    staged: Vec<OutboxRecord>,
}

#[async_trait]
impl OutboxTransaction for InMemoryOutboxTransaction {
    async fn append(&mut self, records: Vec<OutboxRecord>) -> Result<()> {
        self.staged.extend(records);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let mut store = self.records.write().await;
        for mut record in self.staged {
            record.seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
            store.insert(record.id, record);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        // Staged records are simply dropped.
        Ok(())
    }
}

#[async_trait]
impl TransactionalOutbox for InMemoryOutbox {
    type Tx = InMemoryOutboxTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(InMemoryOutboxTransaction {
            records: Arc::clone(&self.records),
            next_seq: Arc::clone(&self.next_seq),
            staged: Vec::new(),
        })
    }
}
