use std::sync::Arc;
use std::time::Duration;

use outbox::{BrokerClient, BrokerMessage, OutboxRecord, OutboxStore, PublishError};
use tokio::sync::watch;

use crate::Result;

/// Tuning knobs for the publish loop.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Records claimed per drain pass.
    pub batch_size: usize,
    /// How long a claim hides a record from other workers.
    pub visibility_timeout: Duration,
    /// Sleep between drain passes when the outbox is empty.
    pub poll_interval: Duration,
    /// Bound on a single broker publish call.
    pub publish_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            visibility_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            publish_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Records acknowledged by the broker and marked `Sent`.
    pub published: usize,
    /// Records that failed transiently and were rescheduled.
    pub retried: usize,
    /// Records parked as `Failed` (permanent error or retry ceiling).
    pub failed: usize,
}

impl DrainReport {
    /// Total records processed in the pass.
    pub fn total(&self) -> usize {
        self.published + self.retried + self.failed
    }
}

/// Relay worker moving records from the outbox to the broker.
///
/// Multiple publishers may run against the same store; the store's claim
/// semantics guarantee each record is dispatched by one worker at a time.
pub struct Publisher<S, B> {
    store: Arc<S>,
    broker: Arc<B>,
    config: PublisherConfig,
}

impl<S, B> Publisher<S, B>
where
    S: OutboxStore,
    B: BrokerClient,
{
    /// Creates a publisher with default configuration.
    pub fn new(store: Arc<S>, broker: Arc<B>) -> Self {
        Self::with_config(store, broker, PublisherConfig::default())
    }

    /// Creates a publisher with explicit configuration.
    pub fn with_config(store: Arc<S>, broker: Arc<B>, config: PublisherConfig) -> Self {
        Self {
            store,
            broker,
            config,
        }
    }

    /// Claims one batch and dispatches every record in it.
    ///
    /// Records are independent: one record's publish failure never blocks
    /// the rest of the batch. Only store access errors abort the pass.
    #[tracing::instrument(skip(self))]
    pub async fn drain_once(&self) -> Result<DrainReport> {
        let batch = self
            .store
            .fetch_pending(self.config.batch_size, self.config.visibility_timeout)
            .await?;

        let mut report = DrainReport::default();
        for record in batch {
            self.dispatch(record, &mut report).await?;
        }

        if report.total() > 0 {
            tracing::debug!(
                published = report.published,
                retried = report.retried,
                failed = report.failed,
                "drained outbox batch"
            );
        }
        Ok(report)
    }

    /// Runs the polling loop until the shutdown signal flips to `true`.
    ///
    /// Drains back-to-back while records keep coming, then falls back to
    /// the poll interval once the outbox is empty.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "outbox publisher started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.drain_once().await {
                Ok(report) if report.total() > 0 => continue,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "outbox drain failed");
                    metrics::counter!("outbox_drain_errors").increment(1);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!("outbox publisher stopped");
    }

    async fn dispatch(&self, record: OutboxRecord, report: &mut DrainReport) -> Result<()> {
        let message = BrokerMessage::from_record(&record);
        let result = match tokio::time::timeout(
            self.config.publish_timeout,
            self.broker.publish(message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(self.config.publish_timeout)),
        };

        match result {
            Ok(()) => {
                self.store.mark_sent(record.id).await?;
                metrics::counter!("outbox_records_published").increment(1);
                report.published += 1;
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    event_id = %record.id,
                    event_type = %record.event_type,
                    attempts = record.attempts,
                    error = %e,
                    "publish failed, rescheduling"
                );
                self.store.mark_failed(record.id, &e.to_string()).await?;
                metrics::counter!("outbox_records_retried").increment(1);
                report.retried += 1;
            }
            Err(e) => {
                tracing::error!(
                    event_id = %record.id,
                    event_type = %record.event_type,
                    error = %e,
                    "permanent publish failure"
                );
                self.store
                    .mark_permanently_failed(record.id, &e.to_string())
                    .await?;
                metrics::counter!("outbox_records_failed").increment(1);
                report.failed += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use outbox::{DispatchStatus, InMemoryBroker, InMemoryOutbox, IntegrationEvent, RetryPolicy};

    use super::*;

    fn record(event_type: &str) -> OutboxRecord {
        OutboxRecord::from_event(&IntegrationEvent::new(
            event_type,
            serde_json::json!({"ok": true}),
        ))
    }

    fn publisher(
        store: &InMemoryOutbox,
        broker: &InMemoryBroker,
    ) -> Publisher<InMemoryOutbox, InMemoryBroker> {
        Publisher::new(Arc::new(store.clone()), Arc::new(broker.clone()))
    }

    #[tokio::test]
    async fn drains_pending_records_to_broker() {
        let store = InMemoryOutbox::new();
        let broker = InMemoryBroker::new();
        let rec = record("ProductCreated");
        let id = rec.id;
        store.append(vec![rec, record("PriceChanged")]).await.unwrap();

        let report = publisher(&store, &broker).drain_once().await.unwrap();

        assert_eq!(report.published, 2);
        assert_eq!(broker.published().await.len(), 2);
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, DispatchStatus::Sent);
    }

    #[tokio::test]
    async fn published_message_reuses_the_record_event_id() {
        let store = InMemoryOutbox::new();
        let broker = InMemoryBroker::new();
        let rec = record("ProductCreated");
        let id = rec.id;
        store.append(vec![rec]).await.unwrap();

        publisher(&store, &broker).drain_once().await.unwrap();

        assert_eq!(broker.published().await[0].event_id, id);
    }

    #[tokio::test]
    async fn transient_failure_reschedules_the_record() {
        let store = InMemoryOutbox::new();
        let broker = InMemoryBroker::new();
        let rec = record("ProductCreated");
        let id = rec.id;
        store.append(vec![rec]).await.unwrap();
        broker
            .fail_next_publish(PublishError::Transient("broker down".into()))
            .await;

        let report = publisher(&store, &broker).drain_once().await.unwrap();

        assert_eq!(report.retried, 1);
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, DispatchStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.as_deref().unwrap().contains("broker down"));
    }

    #[tokio::test]
    async fn permanent_failure_parks_the_record() {
        let store = InMemoryOutbox::new();
        let broker = InMemoryBroker::new();
        let rec = record("ProductCreated");
        let id = rec.id;
        store.append(vec![rec]).await.unwrap();
        broker
            .fail_next_publish(PublishError::Permanent("schema rejected".into()))
            .await;

        let report = publisher(&store, &broker).drain_once().await.unwrap();

        assert_eq!(report.failed, 1);
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, DispatchStatus::Failed);
        assert!(broker.published().await.is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_park_the_record() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        let store = InMemoryOutbox::with_policy(policy);
        let broker = InMemoryBroker::new();
        let rec = record("ProductCreated");
        let id = rec.id;
        store.append(vec![rec]).await.unwrap();

        let publisher = publisher(&store, &broker);
        for _ in 0..2 {
            broker
                .fail_next_publish(PublishError::Transient("unreachable".into()))
                .await;
            publisher.drain_once().await.unwrap();
        }

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, DispatchStatus::Failed);
        assert_eq!(stored.attempts, 2);

        // Parked records are no longer claimed.
        let report = publisher.drain_once().await.unwrap();
        assert_eq!(report.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_publish_times_out_and_is_retried() {
        struct StalledBroker;

        #[async_trait]
        impl BrokerClient for StalledBroker {
            async fn publish(
                &self,
                _message: BrokerMessage,
            ) -> std::result::Result<(), PublishError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }

        let store = InMemoryOutbox::new();
        let rec = record("ProductCreated");
        let id = rec.id;
        store.append(vec![rec]).await.unwrap();

        let publisher = Publisher::new(Arc::new(store.clone()), Arc::new(StalledBroker));
        let report = publisher.drain_once().await.unwrap();

        assert_eq!(report.retried, 1);
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, DispatchStatus::Pending);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn one_bad_record_does_not_block_the_batch() {
        let store = InMemoryOutbox::new();
        let broker = InMemoryBroker::new();
        store
            .append(vec![record("A"), record("B"), record("C")])
            .await
            .unwrap();
        broker
            .fail_next_publish(PublishError::Transient("flaky".into()))
            .await;

        let report = publisher(&store, &broker).drain_once().await.unwrap();

        assert_eq!(report.retried, 1);
        assert_eq!(report.published, 2);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let store = InMemoryOutbox::new();
        let broker = InMemoryBroker::new();
        store.append(vec![record("ProductCreated")]).await.unwrap();

        let publisher = Arc::new(publisher(&store, &broker));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn({
            let publisher = publisher.clone();
            async move { publisher.run(rx).await }
        });

        // Give the loop a chance to drain, then signal shutdown.
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(broker.published().await.len(), 1);
    }
}
