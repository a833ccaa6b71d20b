use async_trait::async_trait;
use gigflow_shared::pii::Masked;
use serde::{Deserialize, Serialize};

/// Display fields denormalized onto an order at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Masked<String>,
    pub avatar: Option<String>,
}

/// Read-only identity lookup, used only to denormalize display fields when
/// an order is created. A failed lookup is tolerated: the order is created
/// without display names.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn get_user(
        &self,
        user_id: &str,
    ) -> Result<Option<UserProfile>, Box<dyn std::error::Error + Send + Sync>>;
}
