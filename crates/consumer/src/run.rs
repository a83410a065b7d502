use std::time::Duration;

use outbox::InMemoryBroker;
use tokio::sync::watch;

use crate::{ConsumedStore, EventDispatcher};

/// Tuning knobs for the consume loop.
#[derive(Debug, Clone)]
pub struct ConsumeLoopConfig {
    /// Sleep between polls when the group's queue is empty.
    pub poll_interval: Duration,
}

impl Default for ConsumeLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Pulls deliveries for one consumer group and feeds them through the
/// dispatcher, acking applied and skipped deliveries and nacking failures
/// so the broker redelivers them (and eventually dead-letters repeat
/// offenders).
pub struct ConsumeLoop<C: ConsumedStore> {
    broker: InMemoryBroker,
    dispatcher: EventDispatcher<C>,
    config: ConsumeLoopConfig,
}

impl<C: ConsumedStore> ConsumeLoop<C> {
    /// Creates a loop with default configuration.
    ///
    /// Subscribes the dispatcher's group immediately so messages published
    /// before the first poll are queued rather than dropped.
    pub async fn new(broker: InMemoryBroker, dispatcher: EventDispatcher<C>) -> Self {
        Self::with_config(broker, dispatcher, ConsumeLoopConfig::default()).await
    }

    /// Creates a loop with explicit configuration.
    pub async fn with_config(
        broker: InMemoryBroker,
        dispatcher: EventDispatcher<C>,
        config: ConsumeLoopConfig,
    ) -> Self {
        broker.subscribe(dispatcher.group()).await;
        Self {
            broker,
            dispatcher,
            config,
        }
    }

    /// Processes every delivery currently queued for the group. Returns
    /// the number of deliveries processed.
    pub async fn drain_once(&self) -> usize {
        let group = self.dispatcher.group().to_string();

        let mut processed = 0;
        while let Some(delivery) = self.broker.next_delivery(&group).await {
            match self.dispatcher.dispatch(&delivery.message).await {
                Ok(_) => self.broker.ack(&group, &delivery).await,
                Err(e) => {
                    tracing::warn!(
                        group = %group,
                        event_id = %delivery.message.event_id,
                        attempt = delivery.attempt,
                        error = %e,
                        "delivery failed, nacking"
                    );
                    metrics::counter!("consumer_deliveries_nacked").increment(1);
                    self.broker.nack(&group, delivery).await;
                }
            }
            processed += 1;
        }
        processed
    }

    /// Runs the polling loop until the shutdown signal flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let group = self.dispatcher.group().to_string();
        tracing::info!(group = %group, "consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.drain_once().await > 0 {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!(group = %group, "consumer stopped");
    }
}
