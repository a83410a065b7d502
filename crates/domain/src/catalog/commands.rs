//! Catalog commands.

use common::AggregateId;

use super::Money;

/// Command to add a new product to the catalog.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    /// The product ID to create.
    pub product_id: AggregateId,

    /// Product display name.
    pub name: String,

    /// Initial price.
    pub price: Money,
}

impl CreateProduct {
    /// Creates a new CreateProduct command with a generated product ID.
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Self {
            product_id: AggregateId::new(),
            name: name.into(),
            price,
        }
    }

    /// Creates a CreateProduct command targeting a specific product ID.
    pub fn with_id(product_id: AggregateId, name: impl Into<String>, price: Money) -> Self {
        Self {
            product_id,
            name: name.into(),
            price,
        }
    }
}

/// Command to change a product's price.
#[derive(Debug, Clone)]
pub struct ChangePrice {
    /// The product to reprice.
    pub product_id: AggregateId,

    /// The new price.
    pub new_price: Money,
}

impl ChangePrice {
    /// Creates a new ChangePrice command.
    pub fn new(product_id: AggregateId, new_price: Money) -> Self {
        Self {
            product_id,
            new_price,
        }
    }
}

/// Command to discontinue a product.
#[derive(Debug, Clone)]
pub struct DiscontinueProduct {
    /// The product to discontinue.
    pub product_id: AggregateId,
}

impl DiscontinueProduct {
    /// Creates a new DiscontinueProduct command.
    pub fn new(product_id: AggregateId) -> Self {
        Self { product_id }
    }
}
