use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who performed a state-changing action on an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Client,
    Worker,
    System,
}

/// Kind of audit event recorded on an order's timeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    Created,
    StatusChanged,
    MilestoneCompleted,
    MilestoneApproved,
    MilestoneRejected,
    PaymentReleased,
    PaymentRefunded,
}

/// One immutable entry in an order's audit timeline.
///
/// Created once, never mutated or deleted. The `data` payload carries the
/// identifiers (milestone id, payment id, amounts) needed to replay the
/// stream during dispute review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub event_type: TimelineEventKind,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub data: serde_json::Value,
}

impl TimelineEvent {
    pub fn new(
        event_type: TimelineEventKind,
        title: impl Into<String>,
        description: impl Into<String>,
        actor_id: impl Into<String>,
        actor_role: ActorRole,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            title: title.into(),
            description: description.into(),
            timestamp: Utc::now(),
            actor_id: actor_id.into(),
            actor_role,
            data,
        }
    }
}
