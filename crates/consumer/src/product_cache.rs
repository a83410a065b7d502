use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    Money, ProductEvent,
    catalog::{PriceChangedData, ProductCreatedData, ProductDiscontinuedData},
};
use outbox::IntegrationEvent;
use tokio::sync::RwLock;

use crate::dispatcher::decode_payload;
use crate::{IntegrationEventHandler, Result};

/// Denormalized product entry kept by downstream services (pricing pages,
/// search indexers) that must not query the catalog service directly.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedProduct {
    pub product_id: AggregateId,
    pub name: String,
    pub price: Money,
    pub active: bool,
}

/// Sample consumer maintaining a local product cache from catalog events.
#[derive(Clone, Default)]
pub struct ProductCacheConsumer {
    products: Arc<RwLock<HashMap<AggregateId, CachedProduct>>>,
}

impl ProductCacheConsumer {
    /// Creates an empty cache consumer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a cached product.
    pub async fn get(&self, product_id: AggregateId) -> Option<CachedProduct> {
        self.products.read().await.get(&product_id).cloned()
    }

    /// Returns the number of cached products, discontinued ones included.
    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }

    /// Returns true when nothing has been cached yet.
    pub async fn is_empty(&self) -> bool {
        self.products.read().await.is_empty()
    }
}

#[async_trait]
impl IntegrationEventHandler for ProductCacheConsumer {
    fn event_types(&self) -> &'static [&'static str] {
        ProductEvent::ALL_KINDS
    }

    async fn handle(&self, event: &IntegrationEvent) -> Result<()> {
        let mut products = self.products.write().await;
        match event.event_type.as_str() {
            "ProductCreated" => {
                let data: ProductCreatedData = decode_payload(event)?;
                products.insert(
                    data.product_id,
                    CachedProduct {
                        product_id: data.product_id,
                        name: data.name,
                        price: data.price,
                        active: true,
                    },
                );
            }
            "PriceChanged" => {
                let data: PriceChangedData = decode_payload(event)?;
                if let Some(product) = products.get_mut(&data.product_id) {
                    product.price = data.new_price;
                }
            }
            "ProductDiscontinued" => {
                let data: ProductDiscontinuedData = decode_payload(event)?;
                if let Some(product) = products.get_mut(&data.product_id) {
                    product.active = false;
                }
            }
            // Registration is keyed by ALL_KINDS, so nothing else arrives.
            other => {
                tracing::warn!(event_type = %other, "unexpected event type in product cache");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(product_id: AggregateId, name: &str, cents: i64) -> IntegrationEvent {
        IntegrationEvent::new(
            "ProductCreated",
            serde_json::to_value(ProductCreatedData {
                product_id,
                name: name.into(),
                price: Money::from_cents(cents),
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn builds_cache_from_catalog_events() {
        let cache = ProductCacheConsumer::new();
        let product_id = AggregateId::new();

        cache
            .handle(&created(product_id, "Desk Lamp", 2999))
            .await
            .unwrap();
        cache
            .handle(&IntegrationEvent::new(
                "PriceChanged",
                serde_json::to_value(PriceChangedData {
                    product_id,
                    old_price: Money::from_cents(2999),
                    new_price: Money::from_cents(2499),
                })
                .unwrap(),
            ))
            .await
            .unwrap();

        let cached = cache.get(product_id).await.unwrap();
        assert_eq!(cached.name, "Desk Lamp");
        assert_eq!(cached.price, Money::from_cents(2499));
        assert!(cached.active);
    }

    #[tokio::test]
    async fn discontinuation_deactivates_cached_product() {
        let cache = ProductCacheConsumer::new();
        let product_id = AggregateId::new();

        cache
            .handle(&created(product_id, "Desk Lamp", 2999))
            .await
            .unwrap();
        cache
            .handle(&IntegrationEvent::new(
                "ProductDiscontinued",
                serde_json::to_value(ProductDiscontinuedData { product_id }).unwrap(),
            ))
            .await
            .unwrap();

        assert!(!cache.get(product_id).await.unwrap().active);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let cache = ProductCacheConsumer::new();
        let event = IntegrationEvent::new("ProductCreated", serde_json::json!({"nope": true}));

        assert!(cache.handle(&event).await.is_err());
    }
}
