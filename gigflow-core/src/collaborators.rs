use async_trait::async_trait;
use uuid::Uuid;

/// Conversation service consumed for order-scoped messaging.
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Return the conversation for these participants, creating it if absent.
    async fn get_or_create(
        &self,
        participant_ids: &[String],
        title: &str,
        kind: &str,
        metadata: serde_json::Value,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>>;

    async fn post_message(
        &self,
        conversation_id: Uuid,
        sender_id: &str,
        content: &str,
        kind: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Notification delivery, consumed fire-and-forget after a state change
/// commits.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        kind: &str,
        action_ref: Option<&str>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
