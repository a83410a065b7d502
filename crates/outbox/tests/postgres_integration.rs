//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p outbox --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use outbox::{
    DispatchStatus, IntegrationEvent, OutboxError, OutboxRecord, OutboxStore, OutboxTransaction,
    PostgresOutbox, RetryPolicy, TransactionalOutbox,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_outbox_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresOutbox {
    get_test_store_with_policy(RetryPolicy::default()).await
}

async fn get_test_store_with_policy(policy: RetryPolicy) -> PostgresOutbox {
    let info = get_container_info().await;

    // Create a fresh pool for each test to avoid connection issues
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    // Clear tables for test isolation
    sqlx::query("TRUNCATE TABLE outbox")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOutbox::with_policy(pool, policy)
}

fn test_record(event_type: &str) -> OutboxRecord {
    OutboxRecord::from_event(&IntegrationEvent::new(
        event_type,
        serde_json::json!({"test": true}),
    ))
}

/// Zero delays so retried records are immediately claimable.
fn immediate_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn append_and_fetch_pending() {
    let store = get_test_store().await;
    let record = test_record("ProductCreated");
    let id = record.id;

    store.append(vec![record]).await.unwrap();

    let batch = store
        .fetch_pending(10, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, id);
    assert_eq!(batch[0].status, DispatchStatus::Pending);
}

#[tokio::test]
async fn fetch_orders_by_creation_time() {
    let store = get_test_store().await;
    for i in 0..3 {
        store.append(vec![test_record(&format!("Event{i}"))]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let batch = store
        .fetch_pending(10, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(batch.len(), 3);
    assert!(batch.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn batch_with_equal_timestamps_keeps_insert_order() {
    let store = get_test_store().await;
    let stamp = chrono::Utc::now();
    let batch: Vec<OutboxRecord> = (0..5)
        .map(|_| {
            let mut record = test_record("ProductCreated");
            record.created_at = stamp;
            record
        })
        .collect();
    let ids: Vec<_> = batch.iter().map(|r| r.id).collect();

    store.append(batch).await.unwrap();

    // Identical created_at across the batch; the sequence column keeps
    // dispatch order deterministic.
    let fetched = store
        .fetch_pending(10, Duration::from_secs(30))
        .await
        .unwrap();
    let fetched_ids: Vec<_> = fetched.iter().map(|r| r.id).collect();
    assert_eq!(fetched_ids, ids);
}

#[tokio::test]
async fn claimed_records_are_invisible_inside_the_window() {
    let store = get_test_store().await;
    store.append(vec![test_record("ProductCreated")]).await.unwrap();

    let first = store
        .fetch_pending(10, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    // Same window: the claim hides the record from a second worker.
    let second = store
        .fetch_pending(10, Duration::from_secs(30))
        .await
        .unwrap();
    assert!(second.is_empty());

    // Expired window: the record becomes reclaimable.
    let reclaimed = store.fetch_pending(10, Duration::ZERO).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
}

#[tokio::test]
async fn concurrent_workers_never_claim_the_same_record() {
    let store = get_test_store().await;
    store
        .append((0..10).map(|i| test_record(&format!("Event{i}"))).collect())
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        store.fetch_pending(10, Duration::from_secs(30)),
        store.fetch_pending(10, Duration::from_secs(30)),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a.len() + b.len(), 10);
    for record in &a {
        assert!(!b.iter().any(|r| r.id == record.id));
    }
}

#[tokio::test]
async fn mark_sent_transitions_and_is_idempotent() {
    let store = get_test_store().await;
    let record = test_record("ProductCreated");
    let id = record.id;
    store.append(vec![record]).await.unwrap();

    store.mark_sent(id).await.unwrap();
    store.mark_sent(id).await.unwrap();

    let stored = store.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, DispatchStatus::Sent);
    assert!(
        store
            .fetch_pending(10, Duration::from_secs(30))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn mark_failed_schedules_a_retry() {
    let store = get_test_store().await;
    let record = test_record("ProductCreated");
    let id = record.id;
    store.append(vec![record]).await.unwrap();

    store.mark_failed(id, "broker unreachable").await.unwrap();

    let stored = store.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, DispatchStatus::Pending);
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.last_error.as_deref(), Some("broker unreachable"));
    assert!(stored.next_attempt_at > stored.created_at);

    // Backoff has not elapsed, so the record is not yet claimable.
    assert!(
        store
            .fetch_pending(10, Duration::from_secs(30))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn retry_ceiling_parks_the_record() {
    let store = get_test_store_with_policy(immediate_retry(2)).await;
    let record = test_record("ProductCreated");
    let id = record.id;
    store.append(vec![record]).await.unwrap();

    store.mark_failed(id, "attempt 1").await.unwrap();
    store.mark_failed(id, "attempt 2").await.unwrap();

    let stored = store.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, DispatchStatus::Failed);
    assert_eq!(stored.attempts, 2);
    assert!(
        store
            .fetch_pending(10, Duration::ZERO)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn failed_record_cannot_become_sent() {
    let store = get_test_store().await;
    let record = test_record("ProductCreated");
    let id = record.id;
    store.append(vec![record]).await.unwrap();

    store
        .mark_permanently_failed(id, "payload rejected")
        .await
        .unwrap();

    let err = store.mark_sent(id).await.unwrap_err();
    assert!(matches!(err, OutboxError::InvalidTransition { .. }));
}

#[tokio::test]
async fn transaction_commit_makes_records_visible() {
    let store = get_test_store().await;
    let record = test_record("ProductCreated");
    let id = record.id;

    let mut tx = store.begin().await.unwrap();
    tx.append(vec![record]).await.unwrap();

    // Not visible before commit.
    assert!(store.get(id).await.unwrap().is_none());

    tx.commit().await.unwrap();
    assert!(store.get(id).await.unwrap().is_some());
}

#[tokio::test]
async fn transaction_rollback_discards_records() {
    let store = get_test_store().await;
    let record = test_record("ProductCreated");
    let id = record.id;

    let mut tx = store.begin().await.unwrap();
    tx.append(vec![record]).await.unwrap();
    tx.rollback().await.unwrap();

    assert!(store.get(id).await.unwrap().is_none());
}

#[tokio::test]
async fn business_rows_co_commit_with_outbox_records() {
    let store = get_test_store().await;
    let record = test_record("ProductCreated");
    let id = record.id;

    sqlx::query("CREATE TABLE IF NOT EXISTS co_commit_probe (id UUID PRIMARY KEY)")
        .execute(store.pool())
        .await
        .unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.append(vec![record]).await.unwrap();
    sqlx::query("INSERT INTO co_commit_probe (id) VALUES ($1)")
        .bind(id.as_uuid())
        .execute(&mut **tx.tx_mut())
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    // Rollback took the business row down with the outbox record.
    let probes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM co_commit_probe")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(probes, 0);
    assert!(store.get(id).await.unwrap().is_none());
}

#[tokio::test]
async fn round_trips_payload_and_timestamps() {
    let store = get_test_store().await;
    let event = IntegrationEvent::new(
        "PriceChanged",
        serde_json::json!({"product_id": "abc", "new_price": {"cents": 2499}}),
    );
    let record = OutboxRecord::from_event(&event);
    let id = record.id;
    store.append(vec![record.clone()]).await.unwrap();

    let stored = store.get(id).await.unwrap().unwrap();
    assert_eq!(stored.payload, record.payload);
    assert_eq!(stored.event_type, "PriceChanged");
    // Postgres timestamps are microsecond precision.
    assert!(
        (stored.occurred_on - record.occurred_on).num_microseconds().unwrap().abs() < 2
    );
}
