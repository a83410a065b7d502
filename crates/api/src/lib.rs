//! HTTP API server for the catalog service and its outbox pipeline.
//!
//! Exposes product commands behind idempotency keys, read endpoints for
//! both the write-side state and the downstream consumer cache, and an
//! outbox inspection endpoint, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use consumer::{ConsumeLoop, EventDispatcher, InMemoryConsumedStore, ProductCacheConsumer};
use domain::CatalogService;
use idempotency::{IdempotencyGuard, InMemoryIdempotencyStore};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::{InMemoryBroker, InMemoryOutbox, TransactionalOutbox};
use publisher::{Publisher, PublisherConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::products::AppState;

/// Consumer group name for the in-process product cache.
pub const PRODUCT_CACHE_GROUP: &str = "product-cache";

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: TransactionalOutbox + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", post(routes::products::create::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route(
            "/products/{id}/price",
            post(routes::products::change_price::<S>),
        )
        .route(
            "/products/{id}/discontinue",
            post(routes::products::discontinue::<S>),
        )
        .route("/products/{id}/cached", get(routes::products::cached::<S>))
        .route("/outbox/{id}", get(routes::products::outbox_record::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state over in-memory backends, plus the
/// publisher and consume loop the caller is expected to spawn.
pub async fn create_default_state(
    publisher_config: PublisherConfig,
) -> (
    Arc<AppState<InMemoryOutbox>>,
    Publisher<InMemoryOutbox, InMemoryBroker>,
    ConsumeLoop<InMemoryConsumedStore>,
) {
    let outbox = InMemoryOutbox::new();
    let broker = InMemoryBroker::new();

    // The catalog mapper is total over the product event kinds; a gap is
    // a wiring error worth failing startup for.
    let catalog = CatalogService::new(outbox.clone()).expect("catalog event mapper incomplete");
    let guard = IdempotencyGuard::new(InMemoryIdempotencyStore::new());

    let product_cache = ProductCacheConsumer::new();
    let mut dispatcher = EventDispatcher::new(PRODUCT_CACHE_GROUP, InMemoryConsumedStore::new());
    dispatcher.register(Arc::new(product_cache.clone()));
    // Subscribes the consumer group up front so records relayed before the
    // loop's first poll are queued for it.
    let consume_loop = ConsumeLoop::new(broker.clone(), dispatcher).await;

    let publisher = Publisher::with_config(
        Arc::new(outbox.clone()),
        Arc::new(broker.clone()),
        publisher_config,
    );

    let state = Arc::new(AppState {
        catalog,
        guard,
        outbox,
        broker,
        product_cache,
    });

    (state, publisher, consume_loop)
}
