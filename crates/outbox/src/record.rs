use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventId, IntegrationEvent};

/// Dispatch status of an outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    /// Awaiting dispatch (or awaiting a retry).
    Pending,
    /// Confirmed by the broker. Terminal.
    Sent,
    /// Exceeded the retry ceiling or hit a permanent error. Terminal,
    /// operator-visible; never deleted automatically.
    Failed,
}

impl DispatchStatus {
    /// Returns the status as the string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Pending => "pending",
            DispatchStatus::Sent => "sent",
            DispatchStatus::Failed => "failed",
        }
    }

    /// Parses a status from its stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DispatchStatus::Pending),
            "sent" => Some(DispatchStatus::Sent),
            "failed" => Some(DispatchStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Retry policy applied by the store when a dispatch attempt fails.
///
/// Backoff is exponential in the attempt count and capped at `max_delay`.
/// Once `max_attempts` is reached the record transitions to `Failed` and is
/// left for operator intervention.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before the next attempt, given the number of
    /// attempts already made (>= 1).
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

/// A persisted integration event awaiting dispatch.
///
/// Created in the same transaction as the owning aggregate's state change,
/// drained by the publisher, and retained after dispatch for audit/replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// Record identifier, equal to the integration event's id.
    pub id: EventId,

    /// Event-type discriminator for polymorphic deserialization.
    pub event_type: String,

    /// Serialized event payload.
    pub payload: serde_json::Value,

    /// When the underlying fact occurred.
    pub occurred_on: DateTime<Utc>,

    /// When the record was written. Dispatch order follows this.
    pub created_at: DateTime<Utc>,

    /// Store-assigned append sequence. Breaks dispatch-order ties between
    /// records whose `created_at` timestamps are equal, e.g. a batch
    /// appended in one transaction. Zero until the store assigns it.
    pub seq: i64,

    /// Current dispatch status.
    pub status: DispatchStatus,

    /// Number of dispatch attempts made so far.
    pub attempts: u32,

    /// Earliest time the record becomes eligible for (re)dispatch.
    pub next_attempt_at: DateTime<Utc>,

    /// When the record was last claimed by a publisher worker, if ever.
    pub claimed_at: Option<DateTime<Utc>>,

    /// Reason for the most recent failure, if any.
    pub last_error: Option<String>,
}

impl OutboxRecord {
    /// Creates a pending record from an integration event.
    pub fn from_event(event: &IntegrationEvent) -> Self {
        let now = Utc::now();
        Self {
            id: event.event_id,
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            occurred_on: event.occurred_on,
            created_at: now,
            seq: 0,
            status: DispatchStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            claimed_at: None,
            last_error: None,
        }
    }

    /// Reconstructs the integration event carried by this record.
    ///
    /// The original `event_id` is reused, never re-minted: retransmission
    /// of the same occurrence must carry the same id.
    pub fn to_event(&self) -> IntegrationEvent {
        IntegrationEvent {
            event_id: self.id,
            event_type: self.event_type.clone(),
            occurred_on: self.occurred_on,
            payload: self.payload.clone(),
        }
    }

    /// Returns whether the record can be claimed for dispatch at `now`.
    ///
    /// A record is claimable when it is pending, its backoff delay has
    /// elapsed, and any previous claim has outlived the visibility timeout.
    pub fn is_claimable(&self, now: DateTime<Utc>, visibility_timeout: Duration) -> bool {
        if self.status != DispatchStatus::Pending || self.next_attempt_at > now {
            return false;
        }
        match self.claimed_at {
            None => true,
            Some(claimed) => {
                let elapsed = now.signed_duration_since(claimed);
                elapsed.to_std().map(|e| e >= visibility_timeout).unwrap_or(false)
            }
        }
    }
}

impl From<IntegrationEvent> for OutboxRecord {
    fn from(event: IntegrationEvent) -> Self {
        Self::from_event(&event)
    }
}
