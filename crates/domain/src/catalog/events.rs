//! Catalog domain events and their integration-event mapping.

use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::mapper::EventMapper;

use super::Money;

/// Events that can occur on a product aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProductEvent {
    /// Product was added to the catalog.
    ProductCreated(ProductCreatedData),

    /// Product price was changed.
    PriceChanged(PriceChangedData),

    /// Product was discontinued.
    ProductDiscontinued(ProductDiscontinuedData),
}

impl DomainEvent for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "ProductCreated",
            ProductEvent::PriceChanged(_) => "PriceChanged",
            ProductEvent::ProductDiscontinued(_) => "ProductDiscontinued",
        }
    }
}

impl ProductEvent {
    /// Every kind a product aggregate can emit, for startup mapper checks.
    pub const ALL_KINDS: &'static [&'static str] =
        &["ProductCreated", "PriceChanged", "ProductDiscontinued"];
}

/// Data for ProductCreated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCreatedData {
    /// The unique product ID.
    pub product_id: AggregateId,

    /// Product display name.
    pub name: String,

    /// Initial price.
    pub price: Money,
}

/// Data for PriceChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChangedData {
    /// The product whose price changed.
    pub product_id: AggregateId,

    /// Price before the change.
    pub old_price: Money,

    /// Price after the change.
    pub new_price: Money,
}

/// Data for ProductDiscontinued event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDiscontinuedData {
    /// The product that was discontinued.
    pub product_id: AggregateId,
}

/// Builds the mapper covering the full catalog event kinds.
///
/// Integration-event discriminators mirror the domain kinds; payloads are
/// the serialized event data. Total over [`ProductEvent::ALL_KINDS`] by
/// construction, which `require_all` asserts at wiring time.
pub fn catalog_event_mapper() -> EventMapper<ProductEvent> {
    let mut mapper = EventMapper::new();

    mapper.register("ProductCreated", "ProductCreated", |event| {
        match event {
            ProductEvent::ProductCreated(data) => serde_json::to_value(data),
            // Routing is keyed by discriminator, so this arm is unreachable.
            other => serde_json::to_value(other),
        }
    });
    mapper.register("PriceChanged", "PriceChanged", |event| match event {
        ProductEvent::PriceChanged(data) => serde_json::to_value(data),
        other => serde_json::to_value(other),
    });
    mapper.register(
        "ProductDiscontinued",
        "ProductDiscontinued",
        |event| match event {
            ProductEvent::ProductDiscontinued(data) => serde_json::to_value(data),
            other => serde_json::to_value(other),
        },
    );

    mapper
}
