use async_trait::async_trait;
use gigflow_order::models::{Order, OrderFilter, OrderStatus};
use gigflow_order::store::{OrderStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

/// Durable `OrderStore` backed by Postgres. Each order aggregate is stored
/// as one JSONB document so milestones, payments and the timeline
/// round-trip losslessly; denormalized columns support listing and the
/// version column backs the compare-and-swap update.
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "PENDING",
        OrderStatus::InProgress => "IN_PROGRESS",
        OrderStatus::Review => "REVIEW",
        OrderStatus::Revision => "REVISION",
        OrderStatus::Completed => "COMPLETED",
        OrderStatus::Cancelled => "CANCELLED",
        OrderStatus::Paused => "PAUSED",
    }
}

fn encode(order: &Order) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(order).map_err(|e| StoreError::Io(e.to_string()))
}

fn decode(doc: serde_json::Value) -> Result<Order, StoreError> {
    serde_json::from_value(doc).map_err(|e| StoreError::Io(e.to_string()))
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT doc FROM orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;

        row.map(|(doc,)| decode(doc)).transpose()
    }

    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        let doc = encode(order)?;
        sqlx::query(
            r#"
            INSERT INTO orders (id, client_id, worker_id, status, version, doc, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id)
        .bind(&order.client_id)
        .bind(order.worker_id.as_deref())
        .bind(status_label(order.status))
        .bind(order.version)
        .bind(&doc)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::AlreadyExists(order.id)
            }
            _ => StoreError::Io(e.to_string()),
        })?;
        Ok(())
    }

    async fn update(&self, order: &Order, expected_version: i64) -> Result<(), StoreError> {
        let doc = encode(order)?;
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET doc = $2, status = $3, worker_id = $4, version = $5, updated_at = $6
            WHERE id = $1 AND version = $7
            "#,
        )
        .bind(order.id)
        .bind(&doc)
        .bind(status_label(order.status))
        .bind(order.worker_id.as_deref())
        .bind(order.version)
        .bind(order.updated_at)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Io(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Either the row moved on or it never existed.
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM orders WHERE id = $1")
                    .bind(order.id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StoreError::Io(e.to_string()))?;
            return Err(match exists {
                Some(_) => StoreError::VersionConflict(order.id),
                None => StoreError::NotFound(order.id),
            });
        }
        Ok(())
    }

    async fn query(
        &self,
        filter: &OrderFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT doc FROM orders
            WHERE ($1::text IS NULL OR client_id = $1)
              AND ($2::text IS NULL OR worker_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY updated_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.client_id.as_deref())
        .bind(filter.worker_id.as_deref())
        .bind(filter.status.map(status_label))
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Io(e.to_string()))?;

        rows.into_iter().map(|(doc,)| decode(doc)).collect()
    }
}
