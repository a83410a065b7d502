//! Transactional outbox for integration events.
//!
//! The outbox is the single point of coordination between the transactional
//! command path and the asynchronous publish path: integration events are
//! appended in the same transaction as the business state change, then
//! drained by a publisher and handed to the broker with at-least-once
//! semantics.

pub mod broker;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use broker::{BrokerClient, BrokerMessage, Delivery, InMemoryBroker, PublishError};
pub use common::{AggregateId, EventId};
pub use error::{OutboxError, Result};
pub use event::{IntegrationEvent, IntegrationEventBuilder};
pub use memory::InMemoryOutbox;
pub use postgres::PostgresOutbox;
pub use record::{DispatchStatus, OutboxRecord, RetryPolicy};
pub use store::{OutboxStore, OutboxTransaction, TransactionalOutbox};
