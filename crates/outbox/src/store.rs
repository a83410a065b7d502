use std::time::Duration;

use async_trait::async_trait;

use crate::{EventId, OutboxRecord, Result};

/// Core trait for outbox store implementations.
///
/// The store is shared between the transactional write path and the
/// asynchronous publish path, so all status transitions must be atomic
/// compare-and-set operations. All implementations must be thread-safe.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends records outside of any caller-owned transaction.
    ///
    /// Command handlers should prefer the transactional seam
    /// ([`TransactionalOutbox::begin`]) so the append commits or rolls back
    /// together with the business state change. This method exists for
    /// replay tooling and tests.
    async fn append(&self, records: Vec<OutboxRecord>) -> Result<()>;

    /// Claims and returns up to `batch_size` dispatchable records, ordered
    /// by creation time ascending.
    ///
    /// A record is dispatchable when it is `Pending`, its backoff delay has
    /// elapsed, and it is unclaimed or its claim is older than
    /// `visibility_timeout`. Claiming is atomic: two concurrent workers
    /// never receive the same record inside the visibility window. Records
    /// claimed by a worker that crashes become reclaimable once the window
    /// elapses.
    async fn fetch_pending(
        &self,
        batch_size: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<OutboxRecord>>;

    /// Transitions a record `Pending -> Sent` on confirmed broker
    /// acknowledgment. Idempotent for records already `Sent`.
    async fn mark_sent(&self, id: EventId) -> Result<()>;

    /// Records a failed dispatch attempt.
    ///
    /// Increments the attempt count, releases the claim, and schedules the
    /// next attempt per the store's retry policy. Once the attempt count
    /// reaches the retry ceiling the record transitions to `Failed` and is
    /// no longer returned by `fetch_pending`.
    async fn mark_failed(&self, id: EventId, reason: &str) -> Result<()>;

    /// Transitions a record directly to `Failed` for non-retryable errors
    /// (payload cannot be serialized or reconstructed).
    async fn mark_permanently_failed(&self, id: EventId, reason: &str) -> Result<()>;

    /// Retrieves a record by id, for inspection and replay tooling.
    async fn get(&self, id: EventId) -> Result<Option<OutboxRecord>>;
}

/// A store transaction staging outbox appends.
///
/// Appends become visible to `fetch_pending` only after `commit`; a rolled
/// back (or dropped) transaction leaves no trace. Backends that hold real
/// database transactions co-commit the outbox rows with any business writes
/// made through the same transaction.
#[async_trait]
pub trait OutboxTransaction: Send {
    /// Appends records within this transaction.
    async fn append(&mut self, records: Vec<OutboxRecord>) -> Result<()>;

    /// Commits the transaction, making staged records durable and visible.
    async fn commit(self) -> Result<()>;

    /// Rolls the transaction back, discarding staged records.
    async fn rollback(self) -> Result<()>;
}

/// Extension of [`OutboxStore`] for backends that expose a transactional
/// boundary, used by command handlers to eliminate the dual-write problem:
/// the aggregate's state change and its outbox rows commit or fail together.
#[async_trait]
pub trait TransactionalOutbox: OutboxStore {
    type Tx: OutboxTransaction;

    /// Begins a transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}
