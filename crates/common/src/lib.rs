//! Shared identifier types used across the outbox pipeline crates.

mod types;

pub use types::{AggregateId, EventId};
