//! Idempotency-key de-duplication for inbound commands.
//!
//! A client retrying a state-changing request (e.g., order creation after a
//! network timeout) sends the same `Idempotency-Key`; the guard returns the
//! stored response instead of re-executing the handler, so retries never
//! produce duplicate side effects. Reuse of a key with a different payload
//! is a conflict, not a replay.

pub mod error;
pub mod guard;
pub mod key;
pub mod memory;
pub mod store;

pub use error::{IdempotencyError, Result};
pub use guard::{GuardDecision, IdempotencyGuard, InFlightPermit};
pub use key::IdempotencyKey;
pub use memory::InMemoryIdempotencyStore;
pub use store::{IdempotencyStore, StoredResponse, fingerprint};
