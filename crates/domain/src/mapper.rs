//! Translation from domain events to integration events.

use std::collections::HashMap;

use outbox::IntegrationEvent;

use crate::DomainError;
use crate::aggregate::{DomainEvent, RecordedEvent};

type PayloadFn<E> = Box<dyn Fn(&E) -> Result<serde_json::Value, serde_json::Error> + Send + Sync>;

struct Route<E> {
    integration_type: &'static str,
    payload_fn: PayloadFn<E>,
}

/// Maps batches of domain events to batches of integration events.
///
/// The mapper is a discriminator-keyed lookup table: each registered domain
/// event kind has exactly one translation. Payload content is deterministic
/// for identical input; the `event_id` is freshly minted per invocation
/// (mapping happens once per committed transaction, because pending events
/// are read-once), and `occurred_on` is propagated from the recorded
/// domain event.
///
/// An unregistered kind fails with [`DomainError::UnmappedEventKind`] —
/// never a silent drop.
pub struct EventMapper<E: DomainEvent> {
    routes: HashMap<&'static str, Route<E>>,
}

impl<E: DomainEvent> EventMapper<E> {
    /// Creates an empty mapper.
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Registers the translation for one domain event kind.
    ///
    /// `kind` is the domain event's discriminator, `integration_type` the
    /// resulting integration event's discriminator, and `payload_fn` builds
    /// the wire payload from the domain event.
    pub fn register<F>(&mut self, kind: &'static str, integration_type: &'static str, payload_fn: F)
    where
        F: Fn(&E) -> Result<serde_json::Value, serde_json::Error> + Send + Sync + 'static,
    {
        self.routes.insert(
            kind,
            Route {
                integration_type,
                payload_fn: Box::new(payload_fn),
            },
        );
    }

    /// Returns whether a kind has a registered translation.
    pub fn is_registered(&self, kind: &str) -> bool {
        self.routes.contains_key(kind)
    }

    /// Verifies at startup that every listed kind is registered.
    pub fn require_all(&self, kinds: &[&'static str]) -> Result<(), DomainError> {
        for kind in kinds {
            if !self.is_registered(kind) {
                return Err(DomainError::UnmappedEventKind {
                    kind: (*kind).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Maps an ordered batch of recorded domain events.
    ///
    /// Output order follows input order; an empty input maps to an empty
    /// output.
    pub fn map(&self, events: &[RecordedEvent<E>]) -> Result<Vec<IntegrationEvent>, DomainError> {
        let mut mapped = Vec::with_capacity(events.len());

        for recorded in events {
            let kind = recorded.event.event_type();
            let route = self
                .routes
                .get(kind)
                .ok_or_else(|| DomainError::UnmappedEventKind {
                    kind: kind.to_string(),
                })?;

            let payload = (route.payload_fn)(&recorded.event)?;
            mapped.push(
                IntegrationEvent::builder()
                    .event_type(route.integration_type)
                    .occurred_on(recorded.occurred_on)
                    .payload_raw(payload)
                    .build(),
            );
        }

        Ok(mapped)
    }
}

impl<E: DomainEvent> Default for EventMapper<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TestEvent {
        Created { name: String },
        Renamed { name: String },
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Created { .. } => "TestCreated",
                TestEvent::Renamed { .. } => "TestRenamed",
            }
        }
    }

    fn recorded(event: TestEvent) -> RecordedEvent<TestEvent> {
        RecordedEvent {
            event,
            occurred_on: Utc::now(),
        }
    }

    fn test_mapper() -> EventMapper<TestEvent> {
        let mut mapper = EventMapper::new();
        mapper.register("TestCreated", "TestCreated", |e| serde_json::to_value(e));
        mapper.register("TestRenamed", "TestRenamed", |e| serde_json::to_value(e));
        mapper
    }

    #[test]
    fn maps_events_in_order() {
        let mapper = test_mapper();
        let events = vec![
            recorded(TestEvent::Created { name: "a".into() }),
            recorded(TestEvent::Renamed { name: "b".into() }),
        ];

        let mapped = mapper.map(&events).unwrap();
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].event_type, "TestCreated");
        assert_eq!(mapped[1].event_type, "TestRenamed");
    }

    #[test]
    fn empty_input_maps_to_empty_output() {
        let mapper = test_mapper();
        assert!(mapper.map(&[]).unwrap().is_empty());
    }

    #[test]
    fn payload_is_deterministic_but_event_id_is_fresh() {
        let mapper = test_mapper();
        let events = vec![recorded(TestEvent::Created { name: "a".into() })];

        let first = mapper.map(&events).unwrap();
        let second = mapper.map(&events).unwrap();

        assert_eq!(first[0].payload, second[0].payload);
        assert_eq!(first[0].occurred_on, second[0].occurred_on);
        assert_ne!(first[0].event_id, second[0].event_id);
    }

    #[test]
    fn occurred_on_propagates_from_recorded_event() {
        let mapper = test_mapper();
        let when = Utc::now() - chrono::Duration::hours(1);
        let events = vec![RecordedEvent {
            event: TestEvent::Created { name: "a".into() },
            occurred_on: when,
        }];

        let mapped = mapper.map(&events).unwrap();
        assert_eq!(mapped[0].occurred_on, when);
    }

    #[test]
    fn unmapped_kind_is_an_error_not_a_drop() {
        let mut mapper = EventMapper::new();
        mapper.register("TestCreated", "TestCreated", |e: &TestEvent| {
            serde_json::to_value(e)
        });

        let events = vec![
            recorded(TestEvent::Created { name: "a".into() }),
            recorded(TestEvent::Renamed { name: "b".into() }),
        ];

        let result = mapper.map(&events);
        assert!(matches!(
            result,
            Err(DomainError::UnmappedEventKind { kind }) if kind == "TestRenamed"
        ));
    }

    #[test]
    fn require_all_flags_missing_registration() {
        let mapper = test_mapper();
        assert!(mapper.require_all(&["TestCreated", "TestRenamed"]).is_ok());
        assert!(
            mapper
                .require_all(&["TestCreated", "TestDeleted"])
                .is_err()
        );
    }
}
