//! Background relay from the outbox to the message broker.
//!
//! The publisher polls the outbox for dispatchable records, publishes each
//! to the broker with a bounded timeout, and reports the outcome back to
//! the store: acknowledged publishes become `Sent`, retryable failures are
//! rescheduled with backoff, and permanent failures are parked as `Failed`
//! for operator attention. Delivery is at-least-once; a crash between
//! broker ack and `mark_sent` re-publishes the same record with the same
//! event id, which downstream consumers deduplicate.

mod error;
mod relay;

pub use error::{PublisherError, Result};
pub use relay::{DrainReport, Publisher, PublisherConfig};
