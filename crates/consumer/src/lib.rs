//! Idempotent consumption of integration events.
//!
//! The broker delivers at-least-once, so every consumer group records the
//! event ids it has already applied and skips redeliveries. The dispatcher
//! routes each delivery to the handler registered for its event type;
//! successful handling and the consumption record are the consumer's
//! responsibility, acking and redelivery are the broker's.

mod dispatcher;
mod error;
mod product_cache;
mod run;
mod store;

pub use dispatcher::{DispatchOutcome, EventDispatcher, IntegrationEventHandler};
pub use error::{ConsumerError, Result};
pub use product_cache::{CachedProduct, ProductCacheConsumer};
pub use run::{ConsumeLoop, ConsumeLoopConfig};
pub use store::{ConsumedStore, InMemoryConsumedStore};
