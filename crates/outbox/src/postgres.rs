use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    DispatchStatus, EventId, OutboxError, OutboxRecord, Result, RetryPolicy,
    store::{OutboxStore, OutboxTransaction, TransactionalOutbox},
};

/// PostgreSQL-backed outbox store.
///
/// Claims use `FOR UPDATE SKIP LOCKED`, so multiple publisher workers can
/// fetch concurrently without ever dispatching the same record twice inside
/// the visibility window.
#[derive(Clone)]
pub struct PostgresOutbox {
    pool: PgPool,
    policy: RetryPolicy,
}

impl PostgresOutbox {
    /// Creates a new PostgreSQL outbox store with the default retry policy.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            policy: RetryPolicy::default(),
        }
    }

    /// Creates a store with a custom retry policy.
    pub fn with_policy(pool: PgPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<OutboxRecord> {
        let status_str: String = row.try_get("status")?;
        let status = DispatchStatus::parse(&status_str).ok_or_else(|| {
            OutboxError::Serialization(serde_json::Error::io(std::io::Error::other(format!(
                "unknown dispatch status: {status_str}"
            ))))
        })?;

        Ok(OutboxRecord {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            occurred_on: row.try_get("occurred_on")?,
            created_at: row.try_get("created_at")?,
            seq: row.try_get("seq")?,
            status,
            attempts: row.try_get::<i32, _>("attempts")? as u32,
            next_attempt_at: row.try_get("next_attempt_at")?,
            claimed_at: row.try_get("claimed_at")?,
            last_error: row.try_get("last_error")?,
        })
    }

    async fn insert_records(
        tx: &mut Transaction<'static, Postgres>,
        records: &[OutboxRecord],
    ) -> Result<()> {
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO outbox
                    (id, event_type, payload, occurred_on, created_at, status,
                     attempts, next_attempt_at, claimed_at, last_error)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(record.id.as_uuid())
            .bind(&record.event_type)
            .bind(&record.payload)
            .bind(record.occurred_on)
            .bind(record.created_at)
            .bind(record.status.as_str())
            .bind(record.attempts as i32)
            .bind(record.next_attempt_at)
            .bind(record.claimed_at)
            .bind(&record.last_error)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PostgresOutbox {
    async fn append(&self, records: Vec<OutboxRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_records(&mut tx, &records).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_pending(
        &self,
        batch_size: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<OutboxRecord>> {
        let rows = sqlx::query(
            r#"
            UPDATE outbox
            SET claimed_at = now()
            WHERE id IN (
                SELECT id FROM outbox
                WHERE status = 'pending'
                  AND next_attempt_at <= now()
                  AND (claimed_at IS NULL
                       OR claimed_at <= now() - make_interval(secs => $2))
                ORDER BY created_at ASC, seq ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(batch_size as i64)
        .bind(visibility_timeout.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        let mut records = rows
            .into_iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>>>()?;
        // RETURNING does not guarantee row order.
        records.sort_by_key(|r| (r.created_at, r.seq));
        Ok(records)
    }

    async fn mark_sent(&self, id: EventId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM outbox WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        match status.as_deref().map(DispatchStatus::parse) {
            None => return Err(OutboxError::RecordNotFound(id)),
            Some(Some(DispatchStatus::Sent)) => {
                tx.commit().await?;
                return Ok(());
            }
            Some(Some(DispatchStatus::Failed)) => {
                return Err(OutboxError::InvalidTransition {
                    id,
                    from: DispatchStatus::Failed,
                    to: DispatchStatus::Sent,
                });
            }
            Some(Some(DispatchStatus::Pending)) => {}
            Some(None) => return Err(OutboxError::RecordNotFound(id)),
        }

        sqlx::query(
            "UPDATE outbox SET status = 'sent', claimed_at = NULL, last_error = NULL WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        metrics::counter!("outbox_records_sent").increment(1);
        Ok(())
    }

    async fn mark_failed(&self, id: EventId, reason: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status, attempts FROM outbox WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(OutboxError::RecordNotFound(id))?;

        let status_str: String = row.try_get("status")?;
        let attempts = row.try_get::<i32, _>("attempts")? as u32;

        match DispatchStatus::parse(&status_str) {
            Some(DispatchStatus::Pending) => {}
            Some(DispatchStatus::Failed) => {
                tx.commit().await?;
                return Ok(());
            }
            _ => {
                return Err(OutboxError::InvalidTransition {
                    id,
                    from: DispatchStatus::Sent,
                    to: DispatchStatus::Failed,
                });
            }
        }

        let new_attempts = attempts + 1;
        if new_attempts >= self.policy.max_attempts {
            sqlx::query(
                r#"
                UPDATE outbox
                SET status = 'failed', attempts = $2, last_error = $3, claimed_at = NULL
                WHERE id = $1
                "#,
            )
            .bind(id.as_uuid())
            .bind(new_attempts as i32)
            .bind(reason)
            .execute(&mut *tx)
            .await?;
            tracing::error!(event_id = %id, attempts = new_attempts, reason, "outbox record exhausted retries");
            metrics::counter!("outbox_records_failed").increment(1);
        } else {
            let next_attempt_at: DateTime<Utc> = Utc::now()
                + chrono::Duration::from_std(self.policy.backoff(new_attempts))
                    .unwrap_or_else(|_| chrono::Duration::seconds(0));
            sqlx::query(
                r#"
                UPDATE outbox
                SET attempts = $2, last_error = $3, claimed_at = NULL, next_attempt_at = $4
                WHERE id = $1
                "#,
            )
            .bind(id.as_uuid())
            .bind(new_attempts as i32)
            .bind(reason)
            .bind(next_attempt_at)
            .execute(&mut *tx)
            .await?;
            metrics::counter!("outbox_dispatch_retries").increment(1);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_permanently_failed(&self, id: EventId, reason: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'failed', attempts = attempts + 1, last_error = $2, claimed_at = NULL
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let existing = self.get(id).await?;
            return match existing {
                None => Err(OutboxError::RecordNotFound(id)),
                Some(r) if r.status == DispatchStatus::Failed => Ok(()),
                Some(r) => Err(OutboxError::InvalidTransition {
                    id,
                    from: r.status,
                    to: DispatchStatus::Failed,
                }),
            };
        }

        tracing::error!(event_id = %id, reason, "outbox record permanently failed");
        metrics::counter!("outbox_records_failed").increment(1);
        Ok(())
    }

    async fn get(&self, id: EventId) -> Result<Option<OutboxRecord>> {
        let row = sqlx::query("SELECT * FROM outbox WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_record).transpose()
    }
}

/// Transaction over the PostgreSQL store.
///
/// Wraps a real database transaction. Business-state writes made through
/// [`PostgresOutboxTransaction::tx_mut`] commit atomically with the staged
/// outbox rows, which is the property that eliminates the dual-write
/// problem.
pub struct PostgresOutboxTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresOutboxTransaction {
    /// Returns the underlying database transaction so callers can co-commit
    /// business-state writes with the outbox rows.
    pub fn tx_mut(&mut self) -> &mut Transaction<'static, Postgres> {
        &mut self.tx
    }
}

#[async_trait]
impl OutboxTransaction for PostgresOutboxTransaction {
    async fn append(&mut self, records: Vec<OutboxRecord>) -> Result<()> {
        PostgresOutbox::insert_records(&mut self.tx, &records).await
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionalOutbox for PostgresOutbox {
    type Tx = PostgresOutboxTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(PostgresOutboxTransaction { tx })
    }
}
