//! Domain layer for the outbox pipeline.
//!
//! This crate provides the core domain abstractions:
//! - AggregateRoot trait with record/pull event accumulation
//! - DomainEvent trait for domain events
//! - EventMapper translating domain events into integration events
//! - Catalog sample domain exercising the transactional write path

pub mod aggregate;
pub mod catalog;
pub mod error;
pub mod mapper;

pub use aggregate::{AggregateRoot, DomainEvent, PendingEvents, RecordedEvent};
pub use catalog::{
    CatalogService, ChangePrice, CreateProduct, DiscontinueProduct, Money, Product, ProductError,
    ProductEvent, catalog_event_mapper,
};
pub use error::DomainError;
pub use mapper::EventMapper;
