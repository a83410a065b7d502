//! Product aggregate implementation.

use common::AggregateId;

use crate::aggregate::{AggregateRoot, PendingEvents};

use super::{
    Money, ProductError,
    events::{PriceChangedData, ProductCreatedData, ProductDiscontinuedData, ProductEvent},
};

/// Product aggregate root.
///
/// Command methods validate against current state, mutate it, and record
/// the corresponding domain event in one step; the recorded events stay
/// pending until the owning service pulls and flushes them.
#[derive(Debug, Clone, Default)]
pub struct Product {
    /// Unique product identifier.
    id: Option<AggregateId>,

    /// Product display name.
    name: String,

    /// Current price.
    price: Money,

    /// False once the product has been discontinued.
    active: bool,

    /// Uncommitted domain events.
    pending: PendingEvents<ProductEvent>,
}

impl AggregateRoot for Product {
    type Event = ProductEvent;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn pending(&self) -> &PendingEvents<ProductEvent> {
        &self.pending
    }

    fn pending_mut(&mut self) -> &mut PendingEvents<ProductEvent> {
        &mut self.pending
    }
}

// Query methods
impl Product {
    /// Returns the product name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current price.
    pub fn price(&self) -> Money {
        self.price
    }

    /// Returns true if the product has not been discontinued.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

// Command methods (mutate state and record events)
impl Product {
    /// Creates the product in the catalog.
    pub fn create(
        &mut self,
        product_id: AggregateId,
        name: impl Into<String>,
        price: Money,
    ) -> Result<(), ProductError> {
        if self.id.is_some() {
            return Err(ProductError::AlreadyCreated);
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProductError::NameRequired);
        }
        if !price.is_positive() {
            return Err(ProductError::InvalidPrice {
                price: price.cents(),
            });
        }

        self.id = Some(product_id);
        self.name = name.clone();
        self.price = price;
        self.active = true;
        self.record(ProductEvent::ProductCreated(ProductCreatedData {
            product_id,
            name,
            price,
        }));
        Ok(())
    }

    /// Changes the product's price.
    pub fn change_price(&mut self, new_price: Money) -> Result<(), ProductError> {
        let product_id = self.id.ok_or(ProductError::NotCreated)?;
        if !self.active {
            return Err(ProductError::Discontinued);
        }
        if !new_price.is_positive() {
            return Err(ProductError::InvalidPrice {
                price: new_price.cents(),
            });
        }
        if new_price == self.price {
            // No state change, no event.
            return Ok(());
        }

        let old_price = self.price;
        self.price = new_price;
        self.record(ProductEvent::PriceChanged(PriceChangedData {
            product_id,
            old_price,
            new_price,
        }));
        Ok(())
    }

    /// Removes the product from sale.
    pub fn discontinue(&mut self) -> Result<(), ProductError> {
        let product_id = self.id.ok_or(ProductError::NotCreated)?;
        if !self.active {
            return Err(ProductError::Discontinued);
        }

        self.active = false;
        self.record(ProductEvent::ProductDiscontinued(ProductDiscontinuedData {
            product_id,
        }));
        Ok(())
    }
}
