use crate::engine::OrderEngine;
use gigflow_core::collaborators::{ConversationService, NotificationService};
use gigflow_core::{EngineError, EngineResult};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

const MAX_DELIVERY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// A side effect requested by a committed state transition. Intents are
/// enqueued after the atomic write succeeds and delivered best-effort; a
/// delivery failure never rolls back the order mutation.
#[derive(Debug, Clone)]
pub enum SideEffect {
    EnsureConversation {
        order_id: Uuid,
        participants: Vec<String>,
        title: String,
    },
    PostToConversation {
        order_id: Uuid,
        sender_id: String,
        content: String,
    },
    Notify {
        user_id: String,
        title: String,
        body: String,
        kind: String,
        action_ref: Option<String>,
    },
    ReleasePayment {
        order_id: Uuid,
        payment_id: Uuid,
    },
}

/// Sending half of the outbox, held by the engine. Enqueueing never fails
/// the caller; a closed channel is logged and the intent dropped.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<SideEffect>,
}

impl Outbox {
    pub fn channel() -> (Outbox, mpsc::UnboundedReceiver<SideEffect>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, effect: SideEffect) {
        if self.tx.send(effect).is_err() {
            warn!("outbox receiver closed; side effect dropped");
        }
    }
}

/// Delivers queued side effects independently of the transitions that
/// produced them, with bounded retries. Payment release runs as its own
/// atomic commit through the engine; the conversation id is patched onto
/// the order once the conversation exists.
pub struct OutboxDispatcher {
    rx: mpsc::UnboundedReceiver<SideEffect>,
    engine: Arc<OrderEngine>,
    conversations: Arc<dyn ConversationService>,
    notifications: Arc<dyn NotificationService>,
}

impl OutboxDispatcher {
    pub fn new(
        rx: mpsc::UnboundedReceiver<SideEffect>,
        engine: Arc<OrderEngine>,
        conversations: Arc<dyn ConversationService>,
        notifications: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            rx,
            engine,
            conversations,
            notifications,
        }
    }

    /// Long-running delivery loop; ends when the engine side is dropped.
    pub async fn run(mut self) {
        while let Some(effect) = self.rx.recv().await {
            self.deliver(effect).await;
        }
    }

    /// Deliver everything currently queued. Used by tests and by callers
    /// that need deterministic settlement.
    pub async fn drain(&mut self) {
        while let Ok(effect) = self.rx.try_recv() {
            self.deliver(effect).await;
        }
    }

    async fn deliver(&self, effect: SideEffect) {
        for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
            match self.deliver_once(&effect).await {
                Ok(()) => return,
                Err(err) if attempt < MAX_DELIVERY_ATTEMPTS => {
                    warn!(attempt, error = %err, "side effect delivery failed; retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(err) => {
                    warn!(error = %err, ?effect, "side effect delivery abandoned");
                }
            }
        }
    }

    async fn deliver_once(&self, effect: &SideEffect) -> EngineResult<()> {
        match effect {
            SideEffect::EnsureConversation {
                order_id,
                participants,
                title,
            } => {
                let conversation_id = self
                    .conversations
                    .get_or_create(
                        participants,
                        title,
                        "order",
                        json!({ "order_id": order_id.to_string() }),
                    )
                    .await
                    .map_err(|e| EngineError::Dependency(e.to_string()))?;
                self.engine
                    .attach_conversation(*order_id, conversation_id)
                    .await?;
                Ok(())
            }
            SideEffect::PostToConversation {
                order_id,
                sender_id,
                content,
            } => {
                let order = self.engine.get_order(*order_id).await?;
                let conversation_id = order.conversation_id.ok_or_else(|| {
                    EngineError::Dependency(format!(
                        "order {} has no conversation yet",
                        order_id
                    ))
                })?;
                self.conversations
                    .post_message(conversation_id, sender_id, content, "system")
                    .await
                    .map_err(|e| EngineError::Dependency(e.to_string()))
            }
            SideEffect::Notify {
                user_id,
                title,
                body,
                kind,
                action_ref,
            } => self
                .notifications
                .notify(user_id, title, body, kind, action_ref.as_deref())
                .await
                .map_err(|e| EngineError::Dependency(e.to_string())),
            SideEffect::ReleasePayment {
                order_id,
                payment_id,
            } => {
                self.engine.release_payment(*order_id, *payment_id).await?;
                Ok(())
            }
        }
    }
}
