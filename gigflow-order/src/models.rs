use chrono::{DateTime, Utc};
use gigflow_shared::models::events::TimelineEvent;
use gigflow_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Review,
    Revision,
    Completed,
    Cancelled,
    Paused,
}

impl OrderStatus {
    /// The single transition table for the order lifecycle. Every status
    /// change, whether requested by a caller or triggered by a milestone
    /// mutation, is checked here; anything not listed is rejected.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Review)
                | (InProgress, Revision)
                | (InProgress, Paused)
                | (InProgress, Cancelled)
                | (Review, Completed)
                | (Review, Revision)
                | (Revision, InProgress)
                | (Paused, InProgress)
                | (Paused, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// Kind of worker fulfilling the order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    AiSpecialist,
    #[default]
    Freelancer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    Disputed,
}

/// Escrow position of a payment. `Held` is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    Held,
    Released,
    Disputed,
}

/// A file or artifact attached when a milestone is delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deliverable {
    pub name: String,
    pub locator: String,
    pub kind: String,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: String,
}

/// One deliverable unit of an order.
///
/// Approval and rejection are mutually exclusive: a milestone may cycle
/// completed -> rejected -> pending -> completed repeatedly, but never holds
/// an approval and an open rejection at the same time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: MilestoneStatus,
    pub amount: i64,
    pub percentage: Option<u8>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deliverables: Vec<Deliverable>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub feedback: Option<String>,
    pub rating: Option<u8>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Milestone {
    pub fn new(title: impl Into<String>, description: impl Into<String>, amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            status: MilestoneStatus::Pending,
            amount,
            percentage: None,
            due_date: None,
            completed_at: None,
            deliverables: Vec::new(),
            approved_by: None,
            approved_at: None,
            feedback: None,
            rating: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: Utc::now(),
        }
    }

    /// Still awaiting delivery (or re-delivery after a rejection).
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            MilestoneStatus::Pending | MilestoneStatus::InProgress
        )
    }

    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }
}

/// One monetary movement tied to the order or to a specific milestone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub escrow_status: EscrowStatus,
    pub platform_fee: i64,
    pub worker_receives: i64,
    pub processor_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Settled one way or the other; no escrow remains outstanding.
    pub fn is_settled(&self) -> bool {
        self.escrow_status == EscrowStatus::Released
            || matches!(
                self.status,
                PaymentStatus::Refunded | PaymentStatus::Failed
            )
    }
}

/// One paid engagement between a client and a worker. The order exclusively
/// owns its milestones, payments and timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    /// Entity version for optimistic concurrency; incremented on every
    /// committed write.
    pub version: i64,
    pub kind: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub skills: Vec<String>,
    pub client_id: String,
    pub client_name: Option<Masked<String>>,
    pub worker_id: Option<String>,
    pub worker_name: Option<Masked<String>>,
    pub worker_type: WorkerType,
    pub total_amount: i64,
    pub currency: String,
    pub fee_rate_bps: u32,
    pub status: OrderStatus,
    /// Derived: round(100 x completed milestones / total milestones).
    pub progress: u8,
    pub milestones: Vec<Milestone>,
    pub payments: Vec<Payment>,
    pub timeline: Vec<TimelineEvent>,
    pub conversation_id: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn milestone(&self, id: Uuid) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.id == id)
    }

    pub fn milestone_mut(&mut self, id: Uuid) -> Option<&mut Milestone> {
        self.milestones.iter_mut().find(|m| m.id == id)
    }

    pub fn payment(&self, id: Uuid) -> Option<&Payment> {
        self.payments.iter().find(|p| p.id == id)
    }

    pub fn payment_mut(&mut self, id: Uuid) -> Option<&mut Payment> {
        self.payments.iter_mut().find(|p| p.id == id)
    }

    pub fn payment_for_milestone(&self, milestone_id: Uuid) -> Option<&Payment> {
        self.payments
            .iter()
            .find(|p| p.milestone_id == Some(milestone_id))
    }

    pub fn completed_milestones(&self) -> usize {
        self.milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Completed)
            .count()
    }

    pub fn all_milestones_completed(&self) -> bool {
        !self.milestones.is_empty()
            && self
                .milestones
                .iter()
                .all(|m| m.status == MilestoneStatus::Completed)
    }

    pub fn all_milestones_approved(&self) -> bool {
        !self.milestones.is_empty() && self.milestones.iter().all(|m| m.is_approved())
    }

    pub fn all_escrow_settled(&self) -> bool {
        self.payments.iter().all(|p| p.is_settled())
    }

    /// Recompute the derived progress field; never set it directly.
    pub fn recompute_progress(&mut self) {
        let total = self.milestones.len();
        if total == 0 {
            self.progress = 0;
            return;
        }
        let completed = self.completed_milestones();
        self.progress = ((100 * completed + total / 2) / total) as u8;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Input specification for creating an order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub kind: String,
    pub title: String,
    pub description: String,
    pub client_id: String,
    pub worker_id: Option<String>,
    #[serde(default)]
    pub worker_type: WorkerType,
    pub total_amount: i64,
    pub currency: String,
    pub category: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub milestones: Option<Vec<MilestoneSpec>>,
    pub metadata: Option<serde_json::Value>,
}

/// Caller-supplied milestone plan; amounts and percentages are reconciled
/// against the order total at creation.
#[derive(Debug, Clone, Deserialize)]
pub struct MilestoneSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: Option<i64>,
    pub percentage: Option<u8>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Whitelisted patch for `update_order`. Fields outside this struct cannot
/// be changed through the generic update path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub deadline: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

/// Store-level listing filter; the engine derives it from the caller's role.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub client_id: Option<String>,
    pub worker_id: Option<String>,
    pub status: Option<OrderStatus>,
}
