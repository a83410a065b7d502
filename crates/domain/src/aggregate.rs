//! Core aggregate and domain event traits.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened inside an aggregate's
/// transaction boundary. They are immutable, named in past tense, and owned
/// exclusively by the aggregate that raised them until mapped.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event kind discriminator.
    ///
    /// This is the key the [`crate::EventMapper`] routes on.
    fn event_type(&self) -> &'static str;
}

/// A domain event together with its occurrence timestamp.
///
/// The timestamp is assigned when the event is recorded and is immutable
/// afterwards; it propagates to the integration event's `occurred_on`.
#[derive(Debug, Clone)]
pub struct RecordedEvent<E> {
    pub event: E,
    pub occurred_on: DateTime<Utc>,
}

/// Ordered buffer of uncommitted domain events.
///
/// Pure in-memory bookkeeping with no I/O. The buffer is drained only by
/// [`PendingEvents::pull`]; callers are responsible for flushing the pulled
/// events to the outbox within the aggregate's transaction.
#[derive(Debug, Clone)]
pub struct PendingEvents<E> {
    events: Vec<RecordedEvent<E>>,
}

// Manual impl: a derived Default would require `E: Default`, which the
// event enums do not provide.
impl<E> Default for PendingEvents<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> PendingEvents<E> {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Appends an event, stamping its occurrence timestamp.
    pub fn record(&mut self, event: E) {
        self.events.push(RecordedEvent {
            event,
            occurred_on: Utc::now(),
        });
    }

    /// Returns the full ordered sequence and atomically clears the buffer.
    ///
    /// Read-once: a second call before new events are recorded returns
    /// an empty vector.
    pub fn pull(&mut self) -> Vec<RecordedEvent<E>> {
        std::mem::take(&mut self.events)
    }

    /// Returns the number of buffered events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no events are buffered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Trait for aggregate roots.
///
/// An aggregate is a consistency boundary that owns state and accumulates
/// domain events during a business operation. An aggregate must never
/// report success to its caller while holding unflushed events: the caller
/// pulls them and writes the mapped outbox records in the same transaction
/// as the aggregate's own state change.
pub trait AggregateRoot {
    /// The type of events this aggregate raises.
    type Event: DomainEvent;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the pending-event buffer.
    fn pending(&self) -> &PendingEvents<Self::Event>;

    /// Returns the pending-event buffer mutably.
    fn pending_mut(&mut self) -> &mut PendingEvents<Self::Event>;

    /// Appends an event to the aggregate's pending sequence.
    fn record(&mut self, event: Self::Event) {
        self.pending_mut().record(event);
    }

    /// Returns the ordered pending sequence and atomically clears it.
    fn pull_events(&mut self) -> Vec<RecordedEvent<Self::Event>> {
        self.pending_mut().pull()
    }

    /// Returns true if the aggregate holds unflushed events.
    fn has_pending_events(&self) -> bool {
        !self.pending().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TestEvent {
        Created { id: String },
        Updated { value: i32 },
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Created { .. } => "TestCreated",
                TestEvent::Updated { .. } => "TestUpdated",
            }
        }
    }

    #[derive(Debug, Default)]
    struct TestAggregate {
        id: Option<AggregateId>,
        pending: PendingEvents<TestEvent>,
    }

    impl AggregateRoot for TestAggregate {
        type Event = TestEvent;

        fn aggregate_type() -> &'static str {
            "TestAggregate"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn pending(&self) -> &PendingEvents<TestEvent> {
            &self.pending
        }

        fn pending_mut(&mut self) -> &mut PendingEvents<TestEvent> {
            &mut self.pending
        }
    }

    #[test]
    fn pull_returns_events_in_recording_order() {
        let mut aggregate = TestAggregate::default();
        aggregate.record(TestEvent::Created { id: "a".into() });
        aggregate.record(TestEvent::Updated { value: 1 });
        aggregate.record(TestEvent::Updated { value: 2 });

        let pulled = aggregate.pull_events();
        assert_eq!(pulled.len(), 3);
        assert_eq!(pulled[0].event.event_type(), "TestCreated");
        assert_eq!(pulled[1].event.event_type(), "TestUpdated");
        assert_eq!(pulled[2].event.event_type(), "TestUpdated");
    }

    #[test]
    fn buffer_defaults_to_empty_without_a_default_event_type() {
        // TestEvent deliberately has no Default impl.
        let pending: PendingEvents<TestEvent> = PendingEvents::default();
        assert!(pending.is_empty());
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn second_pull_returns_empty() {
        let mut aggregate = TestAggregate::default();
        aggregate.record(TestEvent::Created { id: "a".into() });

        assert_eq!(aggregate.pull_events().len(), 1);
        assert!(aggregate.pull_events().is_empty());
        assert!(!aggregate.has_pending_events());
    }

    #[test]
    fn recording_after_pull_starts_a_fresh_sequence() {
        let mut aggregate = TestAggregate::default();
        aggregate.record(TestEvent::Updated { value: 1 });
        aggregate.pull_events();

        aggregate.record(TestEvent::Updated { value: 2 });
        let pulled = aggregate.pull_events();
        assert_eq!(pulled.len(), 1);
    }

    #[test]
    fn recorded_events_carry_occurrence_timestamps() {
        let mut pending = PendingEvents::new();
        let before = Utc::now();
        pending.record(TestEvent::Created { id: "a".into() });
        let after = Utc::now();

        let pulled = pending.pull();
        assert!(pulled[0].occurred_on >= before);
        assert!(pulled[0].occurred_on <= after);
    }
}
