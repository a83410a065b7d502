//! Catalog command service: the transactional write path.

use std::collections::HashMap;
use std::sync::Arc;

use common::AggregateId;
use outbox::{OutboxRecord, OutboxTransaction, TransactionalOutbox};
use tokio::sync::RwLock;

use crate::aggregate::AggregateRoot;
use crate::error::DomainError;
use crate::mapper::EventMapper;

use super::{
    ChangePrice, CreateProduct, DiscontinueProduct, Product,
    events::{ProductEvent, catalog_event_mapper},
};

/// Service executing catalog commands.
///
/// Each command mutates the product aggregate, pulls its recorded domain
/// events, maps them to integration events, and appends the outbox records
/// through one store transaction. The product repository here is an
/// in-memory stand-in for the external CRUD persistence; deployments on the
/// PostgreSQL store co-commit business rows through the same transaction.
pub struct CatalogService<S: TransactionalOutbox> {
    outbox: S,
    mapper: EventMapper<ProductEvent>,
    products: Arc<RwLock<HashMap<AggregateId, Product>>>,
}

impl<S: TransactionalOutbox> CatalogService<S> {
    /// Creates a catalog service over the given outbox store.
    ///
    /// Fails if the event mapper does not cover every kind the product
    /// aggregate can emit — an unmapped kind is a configuration error
    /// surfaced at wiring time, not at the first affected command.
    pub fn new(outbox: S) -> Result<Self, DomainError> {
        let mapper = catalog_event_mapper();
        mapper.require_all(ProductEvent::ALL_KINDS)?;

        Ok(Self {
            outbox,
            mapper,
            products: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Adds a new product to the catalog.
    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id))]
    pub async fn create_product(&self, cmd: CreateProduct) -> Result<Product, DomainError> {
        let mut product = Product::default();
        product.create(cmd.product_id, cmd.name, cmd.price)?;
        self.persist(product).await
    }

    /// Changes a product's price.
    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id))]
    pub async fn change_price(&self, cmd: ChangePrice) -> Result<Product, DomainError> {
        let mut product = self.load(cmd.product_id).await?;
        product.change_price(cmd.new_price)?;
        self.persist(product).await
    }

    /// Discontinues a product.
    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id))]
    pub async fn discontinue(&self, cmd: DiscontinueProduct) -> Result<Product, DomainError> {
        let mut product = self.load(cmd.product_id).await?;
        product.discontinue()?;
        self.persist(product).await
    }

    /// Retrieves a product by id.
    pub async fn get_product(&self, product_id: AggregateId) -> Option<Product> {
        self.products.read().await.get(&product_id).cloned()
    }

    async fn load(&self, product_id: AggregateId) -> Result<Product, DomainError> {
        self.products
            .read()
            .await
            .get(&product_id)
            .cloned()
            .ok_or_else(|| DomainError::AggregateNotFound {
                aggregate_type: Product::aggregate_type(),
                aggregate_id: product_id.to_string(),
            })
    }

    /// Flushes the aggregate's pending events and saves its state.
    ///
    /// The mapped outbox records and the state change commit together; if
    /// anything fails before commit the transaction rolls back and the
    /// repository is left untouched, so no event can be recorded without
    /// its state change or vice versa.
    async fn persist(&self, mut product: Product) -> Result<Product, DomainError> {
        let product_id = product.id().ok_or_else(|| DomainError::AggregateNotFound {
            aggregate_type: Product::aggregate_type(),
            aggregate_id: "unassigned".to_string(),
        })?;

        let events = product.pull_events();
        if events.is_empty() {
            return Ok(product);
        }

        let integration_events = self.mapper.map(&events)?;
        let records: Vec<OutboxRecord> = integration_events
            .iter()
            .map(OutboxRecord::from_event)
            .collect();
        let appended = records.len();

        let mut tx = self.outbox.begin().await?;
        tx.append(records).await?;
        tx.commit().await?;

        self.products.write().await.insert(product_id, product.clone());

        metrics::counter!("outbox_records_appended").increment(appended as u64);
        tracing::debug!(%product_id, events = appended, "catalog command committed");

        Ok(product)
    }
}
