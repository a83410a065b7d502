//! Catalog sample domain: the Product aggregate and its command service.

mod commands;
mod events;
mod product;
mod service;
mod value_objects;

pub use commands::{ChangePrice, CreateProduct, DiscontinueProduct};
pub use events::{
    PriceChangedData, ProductCreatedData, ProductDiscontinuedData, ProductEvent,
    catalog_event_mapper,
};
pub use product::Product;
pub use service::CatalogService;
pub use value_objects::Money;

use thiserror::Error;

/// Errors that can occur during product operations.
#[derive(Debug, Error)]
pub enum ProductError {
    /// Product name must not be empty.
    #[error("Product name is required")]
    NameRequired,

    /// Invalid price.
    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: i64 },

    /// Product is already created.
    #[error("Product already created")]
    AlreadyCreated,

    /// The product has not been created yet.
    #[error("Product does not exist")]
    NotCreated,

    /// Operation not allowed on a discontinued product.
    #[error("Product is discontinued")]
    Discontinued,
}
