//! Catalog endpoints: product commands behind idempotency keys, product
//! queries, and outbox record inspection.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use common::{AggregateId, EventId};
use consumer::ProductCacheConsumer;
use domain::{AggregateRoot, CatalogService, Money, Product, catalog};
use idempotency::{
    GuardDecision, IdempotencyGuard, IdempotencyKey, InMemoryIdempotencyStore, fingerprint,
};
use outbox::{InMemoryBroker, TransactionalOutbox};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Shared application state accessible from all handlers.
pub struct AppState<S: TransactionalOutbox> {
    pub catalog: CatalogService<S>,
    pub guard: IdempotencyGuard<InMemoryIdempotencyStore>,
    pub outbox: S,
    pub broker: InMemoryBroker,
    pub product_cache: ProductCacheConsumer,
}

// -- Request types --

#[derive(Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price_cents: i64,
}

#[derive(Serialize, Deserialize)]
pub struct ChangePriceRequest {
    pub new_price_cents: i64,
}

// -- Response types --

#[derive(Serialize, Deserialize)]
pub struct ProductResponse {
    pub product_id: AggregateId,
    pub name: String,
    pub price_cents: i64,
    pub active: bool,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            // Serialized products always carry an id; `Product::default`
            // never leaves the service.
            product_id: product.id().unwrap_or_default(),
            name: product.name().to_string(),
            price_cents: product.price().cents(),
            active: product.is_active(),
        }
    }
}

#[derive(Serialize)]
pub struct OutboxRecordResponse {
    pub event_id: EventId,
    pub event_type: String,
    pub status: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

// -- Handlers --

/// Extracts the idempotency key from the request headers, or generates a
/// one-shot key when the client did not send one.
fn idempotency_key(headers: &HeaderMap) -> Result<IdempotencyKey, ApiError> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => {
            let raw = value.to_str().map_err(|_| {
                ApiError::BadRequest("Idempotency-Key header is not valid UTF-8".into())
            })?;
            Ok(IdempotencyKey::new(raw)?)
        }
        None => Ok(IdempotencyKey::generate()),
    }
}

fn replay_response(status: u16, body: serde_json::Value) -> Result<Response, ApiError> {
    let status = StatusCode::from_u16(status)
        .map_err(|_| ApiError::Internal(format!("stored invalid status code {status}")))?;
    Ok((status, Json(body)).into_response())
}

/// POST /products — adds a product to the catalog.
///
/// Retries carrying the same `Idempotency-Key` receive the stored response
/// of the first execution; a reused key with a different payload is
/// rejected with 422.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: TransactionalOutbox>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateProductRequest>,
) -> Result<Response, ApiError> {
    let key = idempotency_key(&headers)?;
    let body = serde_json::to_value(&req)
        .map_err(|e| ApiError::Internal(format!("request serialization failed: {e}")))?;

    let permit = match state.guard.begin(&key, fingerprint(&body)).await? {
        GuardDecision::Replay(stored) => return replay_response(stored.status, stored.body),
        GuardDecision::Execute(permit) => permit,
    };

    let cmd = catalog::CreateProduct::new(req.name, Money::from_cents(req.price_cents));
    let product = state.catalog.create_product(cmd).await?;

    let response = serde_json::to_value(ProductResponse::from(&product))
        .map_err(|e| ApiError::Internal(format!("response serialization failed: {e}")))?;
    state
        .guard
        .complete(permit, StatusCode::CREATED.as_u16(), response.clone())
        .await?;

    replay_response(StatusCode::CREATED.as_u16(), response)
}

/// POST /products/{id}/price — changes a product's price.
#[tracing::instrument(skip(state, headers, req))]
pub async fn change_price<S: TransactionalOutbox>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<AggregateId>,
    headers: HeaderMap,
    Json(req): Json<ChangePriceRequest>,
) -> Result<Response, ApiError> {
    let key = idempotency_key(&headers)?;
    let body = serde_json::to_value(&req)
        .map_err(|e| ApiError::Internal(format!("request serialization failed: {e}")))?;
    // Scope the fingerprint to the product so the same body against a
    // different product never replays.
    let fp = format!("{product_id}:{}", fingerprint(&body));

    let permit = match state.guard.begin(&key, fp).await? {
        GuardDecision::Replay(stored) => return replay_response(stored.status, stored.body),
        GuardDecision::Execute(permit) => permit,
    };

    let cmd = catalog::ChangePrice::new(product_id, Money::from_cents(req.new_price_cents));
    let product = state.catalog.change_price(cmd).await?;

    let response = serde_json::to_value(ProductResponse::from(&product))
        .map_err(|e| ApiError::Internal(format!("response serialization failed: {e}")))?;
    state
        .guard
        .complete(permit, StatusCode::OK.as_u16(), response.clone())
        .await?;

    replay_response(StatusCode::OK.as_u16(), response)
}

/// POST /products/{id}/discontinue — removes a product from sale.
///
/// Discontinuing twice is a domain error, so a retry after a lost response
/// must replay the stored result rather than re-execute.
#[tracing::instrument(skip(state, headers))]
pub async fn discontinue<S: TransactionalOutbox>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<AggregateId>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let key = idempotency_key(&headers)?;
    let fp = format!("{product_id}:discontinue");

    let permit = match state.guard.begin(&key, fp).await? {
        GuardDecision::Replay(stored) => return replay_response(stored.status, stored.body),
        GuardDecision::Execute(permit) => permit,
    };

    let cmd = catalog::DiscontinueProduct::new(product_id);
    let product = state.catalog.discontinue(cmd).await?;

    let response = serde_json::to_value(ProductResponse::from(&product))
        .map_err(|e| ApiError::Internal(format!("response serialization failed: {e}")))?;
    state
        .guard
        .complete(permit, StatusCode::OK.as_u16(), response.clone())
        .await?;

    replay_response(StatusCode::OK.as_u16(), response)
}

/// GET /products/{id} — returns the product's current write-side state.
pub async fn get<S: TransactionalOutbox>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<AggregateId>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .catalog
        .get_product(product_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Product {product_id} not found")))?;
    Ok(Json(ProductResponse::from(&product)))
}

/// GET /products/{id}/cached — returns the downstream cache's view of the
/// product, as built from consumed integration events.
pub async fn cached<S: TransactionalOutbox>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<AggregateId>,
) -> Result<Json<ProductResponse>, ApiError> {
    let cached = state
        .product_cache
        .get(product_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Product {product_id} not in cache")))?;
    Ok(Json(ProductResponse {
        product_id: cached.product_id,
        name: cached.name,
        price_cents: cached.price.cents(),
        active: cached.active,
    }))
}

/// GET /outbox/{id} — inspects an outbox record's dispatch state, for
/// operators chasing stuck or failed events.
pub async fn outbox_record<S: TransactionalOutbox>(
    State(state): State<Arc<AppState<S>>>,
    Path(event_id): Path<EventId>,
) -> Result<Json<OutboxRecordResponse>, ApiError> {
    let record = state
        .outbox
        .get(event_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Outbox record {event_id} not found")))?;

    Ok(Json(OutboxRecordResponse {
        event_id: record.id,
        event_type: record.event_type,
        status: record.status.to_string(),
        attempts: record.attempts,
        last_error: record.last_error,
    }))
}
