use crate::models::{Order, OrderFilter};
use async_trait::async_trait;
use gigflow_core::EngineError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(Uuid),

    #[error("version conflict on order {0}")]
    VersionConflict(Uuid),

    #[error("order {0} already exists")]
    AlreadyExists(Uuid),

    #[error("storage failure: {0}")]
    Io(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => EngineError::NotFound(format!("order {}", id)),
            StoreError::VersionConflict(id) => {
                EngineError::ConcurrentModification(format!("order {}", id))
            }
            StoreError::AlreadyExists(id) => {
                EngineError::Validation(format!("order {} already exists", id))
            }
            StoreError::Io(msg) => EngineError::Persistence(msg),
        }
    }
}

/// Persistence port for orders. The store is the sole durable state; every
/// engine operation is one conditional read-modify-write against it.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn create(&self, order: &Order) -> Result<(), StoreError>;

    /// Conditional write: succeeds only if the stored version still equals
    /// `expected_version`. The order passed in already carries the bumped
    /// version.
    async fn update(&self, order: &Order, expected_version: i64) -> Result<(), StoreError>;

    /// Finite, restartable listing ordered by most-recent activity.
    async fn query(
        &self,
        filter: &OrderFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, StoreError>;
}

/// In-memory store used by tests and local runs. Implements the same
/// compare-and-swap contract as the durable adapter.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::AlreadyExists(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update(&self, order: &Order, expected_version: i64) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let current = orders
            .get(&order.id)
            .ok_or(StoreError::NotFound(order.id))?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn query(
        &self,
        filter: &OrderFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        let mut matched: Vec<Order> = orders
            .values()
            .filter(|o| {
                filter
                    .client_id
                    .as_ref()
                    .map_or(true, |c| &o.client_id == c)
                    && filter
                        .worker_id
                        .as_ref()
                        .map_or(true, |w| o.worker_id.as_ref() == Some(w))
                    && filter.status.map_or(true, |s| o.status == s)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matched
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}
