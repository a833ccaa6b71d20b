use crate::ledger;
use crate::milestones::{self, ApproveOutcome, DeliverableSpec};
use crate::models::{CreateOrder, Order, OrderFilter, OrderPatch, OrderStatus};
use crate::outbox::{Outbox, SideEffect};
use crate::store::{OrderStore, StoreError};
use crate::timeline;
use chrono::Utc;
use gigflow_core::identity::IdentityLookup;
use gigflow_core::{EngineError, EngineResult};
use gigflow_shared::models::events::{ActorRole, TimelineEventKind};
use gigflow_shared::pii::Masked;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Business policy injected from configuration.
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    pub platform_fee_bps: u32,
    pub supported_currencies: Vec<String>,
    pub default_list_limit: i64,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            platform_fee_bps: 1_000,
            supported_currencies: vec!["USD".into(), "EUR".into(), "GBP".into()],
            default_list_limit: 50,
        }
    }
}

/// Result of one state-transition closure: either a set of side effects to
/// enqueue once the write commits, or a no-op that returns the loaded state
/// without writing.
enum Commit {
    Apply(Vec<SideEffect>),
    Noop,
}

/// Orchestrates the order lifecycle. Every public operation is one atomic
/// read-modify-write against the store: load the order with its version,
/// mutate, write back conditioned on the version, retry on conflict.
/// Side effects are enqueued on the outbox only after the write commits.
pub struct OrderEngine {
    store: Arc<dyn OrderStore>,
    identity: Arc<dyn IdentityLookup>,
    outbox: Outbox,
    policy: EnginePolicy,
}

impl OrderEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        identity: Arc<dyn IdentityLookup>,
        outbox: Outbox,
        policy: EnginePolicy,
    ) -> Self {
        Self {
            store,
            identity,
            outbox,
            policy,
        }
    }

    pub async fn create_order(&self, spec: CreateOrder) -> EngineResult<Order> {
        if spec.total_amount <= 0 {
            return Err(EngineError::Validation(
                "total amount must be positive".into(),
            ));
        }
        if spec.title.trim().is_empty() {
            return Err(EngineError::Validation("a title is required".into()));
        }
        if !self.policy.supported_currencies.contains(&spec.currency) {
            return Err(EngineError::Validation(format!(
                "currency {} is not supported",
                spec.currency
            )));
        }

        let milestones = milestones::plan(spec.milestones.as_deref(), spec.total_amount)?;
        let client_name = self.display_name(&spec.client_id).await;
        let worker_name = match spec.worker_id.as_deref() {
            Some(worker) => self.display_name(worker).await,
            None => None,
        };

        let now = Utc::now();
        let mut order = Order {
            id: Uuid::new_v4(),
            version: 1,
            kind: spec.kind,
            title: spec.title,
            description: spec.description,
            category: spec.category,
            skills: spec.skills,
            client_id: spec.client_id.clone(),
            client_name,
            worker_id: spec.worker_id.clone(),
            worker_name,
            worker_type: spec.worker_type,
            total_amount: spec.total_amount,
            currency: spec.currency,
            fee_rate_bps: self.policy.platform_fee_bps,
            status: OrderStatus::Pending,
            progress: 0,
            milestones,
            payments: Vec::new(),
            timeline: Vec::new(),
            conversation_id: None,
            deadline: spec.deadline,
            metadata: spec.metadata.unwrap_or_else(|| json!({})),
            created_at: now,
            updated_at: now,
        };

        // Fund escrow per milestone; together the payments cover the total.
        let funded: Vec<(Uuid, i64)> = order
            .milestones
            .iter()
            .filter(|m| m.amount > 0)
            .map(|m| (m.id, m.amount))
            .collect();
        for (milestone_id, amount) in funded {
            ledger::open_escrow(&mut order, amount, Some(milestone_id));
        }

        let description = format!(
            "Escrow of {} {} funded across {} milestones",
            order.total_amount,
            order.currency,
            order.milestones.len()
        );
        let data = json!({
            "total_amount": order.total_amount,
            "currency": order.currency,
            "milestones": order.milestones.len(),
        });
        timeline::record(
            &mut order,
            TimelineEventKind::Created,
            "Order created",
            description,
            &spec.client_id,
            ActorRole::Client,
            data,
        );

        self.store.create(&order).await.map_err(EngineError::from)?;

        let mut participants = vec![order.client_id.clone()];
        if let Some(worker) = &order.worker_id {
            participants.push(worker.clone());
        }
        self.outbox.send(SideEffect::EnsureConversation {
            order_id: order.id,
            participants,
            title: order.title.clone(),
        });
        self.outbox.send(SideEffect::PostToConversation {
            order_id: order.id,
            sender_id: "system".into(),
            content: format!("Order \"{}\" was created and escrow funded.", order.title),
        });
        if let Some(worker) = &order.worker_id {
            self.outbox.send(SideEffect::Notify {
                user_id: worker.clone(),
                title: "New order assigned".into(),
                body: format!("You were assigned to \"{}\".", order.title),
                kind: "order_created".into(),
                action_ref: Some(order.id.to_string()),
            });
        }

        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> EngineResult<Order> {
        self.load(order_id).await
    }

    /// Orders visible to `user_id` in the given role, most recent activity
    /// first. Finite and restartable via limit/offset.
    pub async fn list_orders(
        &self,
        user_id: &str,
        role: ActorRole,
        status: Option<OrderStatus>,
        limit: Option<i64>,
        offset: i64,
    ) -> EngineResult<Vec<Order>> {
        let mut filter = OrderFilter {
            status,
            ..Default::default()
        };
        match role {
            ActorRole::Client => filter.client_id = Some(user_id.to_string()),
            ActorRole::Worker => filter.worker_id = Some(user_id.to_string()),
            ActorRole::System => {}
        }
        self.store
            .query(
                &filter,
                limit.unwrap_or(self.policy.default_list_limit),
                offset,
            )
            .await
            .map_err(EngineError::from)
    }

    /// Generic whitelisted patch. Status changes go through the transition
    /// table; an illegal transition leaves the stored order untouched.
    pub async fn update_order(
        &self,
        order_id: Uuid,
        patch: OrderPatch,
        actor_id: &str,
        actor_role: ActorRole,
    ) -> EngineResult<Order> {
        self.commit(order_id, |order| {
            let mut effects = Vec::new();
            let mut changed = false;

            if let Some(next) = patch.status {
                if next != order.status {
                    if !order.status.can_transition_to(next) {
                        return Err(EngineError::invalid_transition(order.status, next));
                    }
                    if next == OrderStatus::Completed
                        && !(order.progress == 100
                            && order.all_milestones_approved()
                            && order.all_escrow_settled())
                    {
                        return Err(EngineError::invalid_transition(order.status, next));
                    }
                    let from = order.status;
                    order.status = next;
                    changed = true;
                    timeline::record(
                        order,
                        TimelineEventKind::StatusChanged,
                        "Status changed",
                        format!("{:?} -> {:?}", from, next),
                        actor_id,
                        actor_role,
                        json!({ "from": from, "to": next }),
                    );
                    if let Some(counterparty) = counterparty_of(order, actor_id) {
                        effects.push(SideEffect::Notify {
                            user_id: counterparty,
                            title: "Order status changed".into(),
                            body: format!(
                                "\"{}\" moved from {:?} to {:?}.",
                                order.title, from, next
                            ),
                            kind: "status_changed".into(),
                            action_ref: Some(order.id.to_string()),
                        });
                    }
                }
            }
            if let Some(deadline) = patch.deadline {
                order.deadline = Some(deadline);
                changed = true;
            }
            if let Some(metadata) = patch.metadata.clone() {
                order.metadata = metadata;
                changed = true;
            }

            if changed {
                Ok(Commit::Apply(effects))
            } else {
                Ok(Commit::Noop)
            }
        })
        .await
    }

    pub async fn complete_milestone(
        &self,
        order_id: Uuid,
        milestone_id: Uuid,
        actor_id: &str,
        deliverables: Vec<DeliverableSpec>,
    ) -> EngineResult<Order> {
        self.commit(order_id, |order| {
            let outcome = milestones::complete(order, milestone_id, actor_id, &deliverables)?;
            let mut effects = vec![SideEffect::Notify {
                user_id: order.client_id.clone(),
                title: "Milestone delivered".into(),
                body: format!(
                    "\"{}\" is ready for your review on \"{}\".",
                    outcome.milestone_title, order.title
                ),
                kind: "milestone_completed".into(),
                action_ref: Some(order.id.to_string()),
            }];
            if outcome.entered_review {
                effects.push(SideEffect::PostToConversation {
                    order_id: order.id,
                    sender_id: "system".into(),
                    content: "All milestones delivered; the order is in review.".into(),
                });
            }
            Ok(Commit::Apply(effects))
        })
        .await
    }

    pub async fn approve_milestone(
        &self,
        order_id: Uuid,
        milestone_id: Uuid,
        actor_id: &str,
        feedback: Option<String>,
        rating: Option<u8>,
    ) -> EngineResult<Order> {
        self.commit(order_id, |order| {
            match milestones::approve(
                order,
                milestone_id,
                actor_id,
                feedback.clone(),
                rating,
            )? {
                ApproveOutcome::AlreadyApproved => Ok(Commit::Noop),
                ApproveOutcome::Approved {
                    milestone_title,
                    payment_id,
                    amount,
                } => {
                    let mut effects = Vec::new();
                    if let Some(payment_id) = payment_id {
                        effects.push(SideEffect::ReleasePayment {
                            order_id: order.id,
                            payment_id,
                        });
                    }
                    if let Some(worker) = order.worker_id.clone() {
                        effects.push(SideEffect::Notify {
                            user_id: worker,
                            title: "Milestone approved".into(),
                            body: format!(
                                "\"{}\" was approved; {} {} is being released.",
                                milestone_title, amount, order.currency
                            ),
                            kind: "milestone_approved".into(),
                            action_ref: Some(order.id.to_string()),
                        });
                    }
                    Ok(Commit::Apply(effects))
                }
            }
        })
        .await
    }

    pub async fn reject_milestone(
        &self,
        order_id: Uuid,
        milestone_id: Uuid,
        actor_id: &str,
        reason: &str,
    ) -> EngineResult<Order> {
        self.commit(order_id, |order| {
            let outcome = milestones::reject(order, milestone_id, actor_id, reason)?;
            let mut effects = Vec::new();
            if let Some(worker) = order.worker_id.clone() {
                effects.push(SideEffect::Notify {
                    user_id: worker,
                    title: "Milestone rejected".into(),
                    body: format!(
                        "\"{}\" was sent back for rework: {}",
                        outcome.milestone_title, outcome.reason
                    ),
                    kind: "milestone_rejected".into(),
                    action_ref: Some(order.id.to_string()),
                });
            }
            Ok(Commit::Apply(effects))
        })
        .await
    }

    /// Asynchronous settlement step for an escrow payment, normally driven
    /// by the outbox dispatcher after an approval. Idempotent.
    pub async fn release_payment(&self, order_id: Uuid, payment_id: Uuid) -> EngineResult<Order> {
        self.commit(order_id, |order| {
            match ledger::release(order, payment_id)? {
                ledger::ReleaseOutcome::AlreadyReleased => Ok(Commit::Noop),
                ledger::ReleaseOutcome::Released {
                    completed_order, ..
                } => {
                    let mut effects = Vec::new();
                    if completed_order {
                        effects.push(SideEffect::Notify {
                            user_id: order.client_id.clone(),
                            title: "Order completed".into(),
                            body: format!("\"{}\" is complete.", order.title),
                            kind: "order_completed".into(),
                            action_ref: Some(order.id.to_string()),
                        });
                    }
                    Ok(Commit::Apply(effects))
                }
            }
        })
        .await
    }

    /// Compensating action for funds still held in escrow.
    pub async fn refund_payment(
        &self,
        order_id: Uuid,
        payment_id: Uuid,
        amount: Option<i64>,
    ) -> EngineResult<Order> {
        self.commit(order_id, |order| {
            ledger::refund(order, payment_id, amount)?;
            Ok(Commit::Apply(vec![SideEffect::Notify {
                user_id: order.client_id.clone(),
                title: "Escrow refunded".into(),
                body: format!("A refund was issued on \"{}\".", order.title),
                kind: "payment_refunded".into(),
                action_ref: Some(order.id.to_string()),
            }]))
        })
        .await
    }

    /// Link the conversation created for this order. Set once; later calls
    /// are no-ops so the reference stays immutable.
    pub async fn attach_conversation(
        &self,
        order_id: Uuid,
        conversation_id: Uuid,
    ) -> EngineResult<Order> {
        self.commit(order_id, |order| {
            if order.conversation_id.is_some() {
                return Ok(Commit::Noop);
            }
            order.conversation_id = Some(conversation_id);
            Ok(Commit::Apply(Vec::new()))
        })
        .await
    }

    async fn load(&self, order_id: Uuid) -> EngineResult<Order> {
        self.store
            .get(order_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(format!("order {}", order_id)))
    }

    /// The atomic read-modify-write loop. The closure either produces the
    /// side effects to enqueue after the conditional write lands, or
    /// declares the operation a no-op (returning the loaded state without
    /// writing). Version conflicts retry the whole cycle.
    async fn commit<F>(&self, order_id: Uuid, mutate: F) -> EngineResult<Order>
    where
        F: Fn(&mut Order) -> EngineResult<Commit>,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut order = self.load(order_id).await?;
            let expected = order.version;

            match mutate(&mut order)? {
                Commit::Noop => return Ok(order),
                Commit::Apply(effects) => {
                    order.version = expected + 1;
                    order.touch();
                    match self.store.update(&order, expected).await {
                        Ok(()) => {
                            for effect in effects {
                                self.outbox.send(effect);
                            }
                            return Ok(order);
                        }
                        Err(StoreError::VersionConflict(_)) if attempt < MAX_COMMIT_ATTEMPTS => {
                            continue;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }
        Err(EngineError::ConcurrentModification(format!(
            "order {}",
            order_id
        )))
    }

    async fn display_name(&self, user_id: &str) -> Option<Masked<String>> {
        match self.identity.get_user(user_id).await {
            Ok(profile) => profile.map(|p| p.name),
            Err(err) => {
                warn!(user_id, error = %err, "identity lookup failed; display name omitted");
                None
            }
        }
    }
}

fn counterparty_of(order: &Order, actor_id: &str) -> Option<String> {
    if actor_id == order.client_id {
        order.worker_id.clone()
    } else {
        Some(order.client_id.clone())
    }
}
