use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{IdempotencyKey, Result};

/// The stored outcome of a previously executed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Fingerprint of the request that produced this response. A replay is
    /// only served when the retried request's fingerprint matches.
    pub fingerprint: String,

    /// HTTP status of the original response.
    pub status: u16,

    /// Body of the original response.
    pub body: serde_json::Value,
}

/// Computes the request fingerprint from the canonical request body.
///
/// `serde_json::Value::to_string` is deterministic for a given value
/// (object keys keep insertion order from deserialization of the same
/// body), which is sufficient to distinguish "same request retried" from
/// "different request with a reused key".
pub fn fingerprint(body: &serde_json::Value) -> String {
    body.to_string()
}

/// Durable key-value store contract for idempotency records.
///
/// Records expire after the retention period passed to `put`; `get` must
/// never return an expired record.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Looks up the stored response for a key, honoring expiry.
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<StoredResponse>>;

    /// Stores a response under a key with the given retention period.
    async fn put(&self, key: &IdempotencyKey, response: StoredResponse, ttl: Duration)
    -> Result<()>;
}
