use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use common::{IdempotencyKey, OrderId};

use crate::error::{Result, StoreError};
use crate::outbox::{OutboxCommand, OutboxEntry};
use crate::record::OrderRecord;
use crate::store::StateStore;
use crate::version::Version;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    order_id UUID PRIMARY KEY,
    version BIGINT NOT NULL,
    state JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS outbox (
    order_id UUID NOT NULL,
    sequence BIGINT NOT NULL,
    message_id UUID NOT NULL,
    topic TEXT NOT NULL,
    idempotency_key TEXT NOT NULL,
    payload JSONB NOT NULL,
    published BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (order_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_outbox_unpublished
    ON outbox (order_id, sequence) WHERE NOT published;
"#;

/// PostgreSQL-backed state store implementation.
///
/// Record and outbox writes share one transaction, which is what makes
/// "decided" and "announced" inseparable across crashes.
#[derive(Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    /// Creates a new PostgreSQL state store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the orders and outbox tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<OrderRecord> {
        Ok(OrderRecord {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            version: Version::new(row.try_get("version")?),
            state: row.try_get("state")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_entry(row: PgRow) -> Result<OutboxEntry> {
        Ok(OutboxEntry {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            sequence: row.try_get("sequence")?,
            command: OutboxCommand {
                message_id: row.try_get("message_id")?,
                topic: row.try_get("topic")?,
                idempotency_key: IdempotencyKey::from(row.try_get::<String, _>("idempotency_key")?),
                payload: row.try_get("payload")?,
            },
            published: row.try_get("published")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn load(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(
            "SELECT order_id, version, state, updated_at FROM orders WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn save(
        &self,
        record: OrderRecord,
        expected_version: Version,
        commands: Vec<OutboxCommand>,
    ) -> Result<Version> {
        let order_id = record.order_id;
        let new_version = expected_version.next();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let written = if expected_version == Version::initial() {
            sqlx::query(
                r#"
                INSERT INTO orders (order_id, version, state, updated_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (order_id) DO NOTHING
                "#,
            )
            .bind(order_id.as_uuid())
            .bind(new_version.as_i64())
            .bind(&record.state)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE orders
                SET version = $2, state = $3, updated_at = $4
                WHERE order_id = $1 AND version = $5
                "#,
            )
            .bind(order_id.as_uuid())
            .bind(new_version.as_i64())
            .bind(&record.state)
            .bind(now)
            .bind(expected_version.as_i64())
            .execute(&mut *tx)
            .await?
            .rows_affected()
        };

        if written == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM orders WHERE order_id = $1")
                    .bind(order_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(StoreError::Conflict {
                order_id,
                expected: expected_version,
                actual: Version::new(actual.unwrap_or(0)),
            });
        }

        let last_sequence: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM outbox WHERE order_id = $1")
                .bind(order_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;

        let mut sequence = last_sequence.unwrap_or(0);
        for command in &commands {
            sequence += 1;
            sqlx::query(
                r#"
                INSERT INTO outbox
                    (order_id, sequence, message_id, topic, idempotency_key, payload, published, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
                "#,
            )
            .bind(order_id.as_uuid())
            .bind(sequence)
            .bind(command.message_id)
            .bind(&command.topic)
            .bind(command.idempotency_key.as_str())
            .bind(&command.payload)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(new_version)
    }

    async fn unpublished_entries(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, sequence, message_id, topic, idempotency_key, payload, published, created_at
            FROM outbox
            WHERE NOT published
            ORDER BY order_id, sequence
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn mark_published(&self, order_id: OrderId, sequence: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE outbox SET published = TRUE WHERE order_id = $1 AND sequence = $2",
        )
        .bind(order_id.as_uuid())
        .bind(sequence)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::EntryNotFound { order_id, sequence });
        }
        Ok(())
    }

    async fn outbox_for_order(&self, order_id: OrderId) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, sequence, message_id, topic, idempotency_key, payload, published, created_at
            FROM outbox
            WHERE order_id = $1
            ORDER BY sequence
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }
}
