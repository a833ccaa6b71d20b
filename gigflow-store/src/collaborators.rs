use async_trait::async_trait;
use gigflow_core::collaborators::{ConversationService, NotificationService};
use gigflow_core::identity::{IdentityLookup, UserProfile};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// In-process conversation service for local runs and tests. Conversations
/// are keyed by their (sorted) participant set, so repeated get_or_create
/// calls are stable.
#[derive(Default)]
pub struct InProcessConversations {
    conversations: Mutex<HashMap<Vec<String>, Uuid>>,
    messages: Mutex<Vec<(Uuid, String, String)>>,
}

impl InProcessConversations {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages_for(&self, conversation_id: Uuid) -> Vec<String> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|(id, _, _)| *id == conversation_id)
            .map(|(_, _, content)| content.clone())
            .collect()
    }
}

#[async_trait]
impl ConversationService for InProcessConversations {
    async fn get_or_create(
        &self,
        participant_ids: &[String],
        _title: &str,
        _kind: &str,
        _metadata: serde_json::Value,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
        let mut key: Vec<String> = participant_ids.to_vec();
        key.sort();
        let mut conversations = self.conversations.lock().await;
        Ok(*conversations.entry(key).or_insert_with(Uuid::new_v4))
    }

    async fn post_message(
        &self,
        conversation_id: Uuid,
        sender_id: &str,
        content: &str,
        _kind: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.messages.lock().await.push((
            conversation_id,
            sender_id.to_string(),
            content.to_string(),
        ));
        Ok(())
    }
}

/// Notification sink that writes to the structured log instead of a real
/// delivery channel. Bodies can contain display names, so only the kind and
/// title are logged.
#[derive(Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationService for TracingNotifier {
    async fn notify(
        &self,
        user_id: &str,
        title: &str,
        _body: &str,
        kind: &str,
        action_ref: Option<&str>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(user_id, kind, title, action_ref = ?action_ref, "notification dispatched");
        Ok(())
    }
}

/// Identity lookup backed by a static directory, for local runs where the
/// real identity provider is absent.
#[derive(Default)]
pub struct DirectoryIdentity {
    users: HashMap<String, String>,
}

impl DirectoryIdentity {
    pub fn with_users<I: IntoIterator<Item = (String, String)>>(users: I) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

#[async_trait]
impl IdentityLookup for DirectoryIdentity {
    async fn get_user(
        &self,
        user_id: &str,
    ) -> Result<Option<UserProfile>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.users.get(user_id).map(|name| UserProfile {
            name: name.clone().into(),
            avatar: None,
        }))
    }
}
