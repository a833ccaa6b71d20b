use crate::ledger;
use crate::models::{
    Deliverable, Milestone, MilestoneSpec, MilestoneStatus, Order, OrderStatus,
};
use crate::timeline;
use chrono::Utc;
use gigflow_core::money;
use gigflow_core::{EngineError, EngineResult};
use gigflow_shared::models::events::{ActorRole, TimelineEventKind};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Deliverable as submitted by the worker; upload metadata is stamped by
/// the server when the milestone completes.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliverableSpec {
    pub name: String,
    pub locator: String,
    pub kind: String,
}

/// Build the milestone plan for a new order. Without explicit specs the
/// default three-stage split applies (kickoff 0%, execution 70%, delivery
/// 30%). Explicit specs carry either amounts (must sum exactly to the
/// total) or percentages (must sum to 100, last absorbs the rounding
/// residual).
pub fn plan(specs: Option<&[MilestoneSpec]>, total_amount: i64) -> EngineResult<Vec<Milestone>> {
    let specs = match specs {
        None => return Ok(default_plan(total_amount)),
        Some([]) => {
            return Err(EngineError::Validation(
                "milestone list may not be empty".into(),
            ))
        }
        Some(specs) => specs,
    };

    let all_amounts = specs.iter().all(|s| s.amount.is_some());
    let all_percentages = specs.iter().all(|s| s.percentage.is_some());

    let amounts: Vec<i64> = if all_amounts {
        let amounts: Vec<i64> = specs.iter().map(|s| s.amount.unwrap()).collect();
        if amounts.iter().any(|&a| a < 0) {
            return Err(EngineError::Validation(
                "milestone amounts must not be negative".into(),
            ));
        }
        if amounts.iter().sum::<i64>() != total_amount {
            return Err(EngineError::Validation(format!(
                "milestone amounts sum to {}, expected {}",
                amounts.iter().sum::<i64>(),
                total_amount
            )));
        }
        amounts
    } else if all_percentages {
        let shares: Vec<u32> = specs
            .iter()
            .map(|s| s.percentage.unwrap() as u32 * 100)
            .collect();
        money::allocate(total_amount, &shares).ok_or_else(|| {
            EngineError::Validation("milestone percentages must sum to 100".into())
        })?
    } else {
        return Err(EngineError::Validation(
            "milestones must all carry amounts or all carry percentages".into(),
        ));
    };

    Ok(specs
        .iter()
        .zip(amounts)
        .map(|(spec, amount)| {
            let mut milestone = Milestone::new(spec.title.clone(), spec.description.clone(), amount);
            milestone.percentage = spec.percentage;
            milestone.due_date = spec.due_date;
            milestone
        })
        .collect())
}

fn default_plan(total_amount: i64) -> Vec<Milestone> {
    let amounts = money::allocate(total_amount, &money::DEFAULT_SPLIT_BPS)
        .expect("default split shares sum to 100%");
    let stages = [
        ("Kickoff", "Scope agreed and work scheduled"),
        ("Execution", "Main body of work delivered"),
        ("Delivery", "Final handover and acceptance"),
    ];
    stages
        .iter()
        .zip(amounts)
        .zip([0u8, 70, 30])
        .map(|(((title, description), amount), pct)| {
            let mut milestone = Milestone::new(*title, *description, amount);
            milestone.percentage = Some(pct);
            milestone
        })
        .collect()
}

#[derive(Debug)]
pub struct CompleteOutcome {
    pub milestone_title: String,
    pub entered_review: bool,
}

/// Mark a milestone delivered: attach deliverables with server-assigned
/// timestamps, clear any open rejection, recompute progress, and advance the
/// order (revision/pending/paused resume work; the last delivery enters
/// review).
pub fn complete(
    order: &mut Order,
    milestone_id: Uuid,
    actor_id: &str,
    deliverables: &[DeliverableSpec],
) -> EngineResult<CompleteOutcome> {
    if order.status.is_terminal() {
        return Err(EngineError::invalid_transition(
            order.status,
            MilestoneStatus::Completed,
        ));
    }

    let now = Utc::now();
    let milestone = order
        .milestone_mut(milestone_id)
        .ok_or_else(|| EngineError::NotFound(format!("milestone {}", milestone_id)))?;
    if !milestone.is_open() {
        return Err(EngineError::invalid_transition(
            milestone.status,
            MilestoneStatus::Completed,
        ));
    }

    milestone.status = MilestoneStatus::Completed;
    milestone.completed_at = Some(now);
    // The resubmission addresses the rejection; approval and rejection are
    // never held at the same time.
    milestone.rejected_at = None;
    milestone.rejection_reason = None;
    for d in deliverables {
        milestone.deliverables.push(Deliverable {
            name: d.name.clone(),
            locator: d.locator.clone(),
            kind: d.kind.clone(),
            uploaded_at: now,
            uploaded_by: actor_id.to_string(),
        });
    }
    let milestone_title = milestone.title.clone();

    order.recompute_progress();

    // Delivery from revision (or before a formal start) counts as work in
    // progress; the last outstanding delivery sends the order to review.
    if matches!(
        order.status,
        OrderStatus::Revision | OrderStatus::Pending | OrderStatus::Paused
    ) {
        order.status = OrderStatus::InProgress;
    }
    let entered_review = if order.all_milestones_completed() {
        order.status = OrderStatus::Review;
        true
    } else {
        false
    };

    let data = json!({
        "milestone_id": milestone_id.to_string(),
        "deliverables": deliverables.len(),
        "order_status": order.status,
    });
    timeline::record(
        order,
        TimelineEventKind::MilestoneCompleted,
        "Milestone completed",
        format!("\"{}\" was delivered", milestone_title),
        actor_id,
        ActorRole::Worker,
        data,
    );

    Ok(CompleteOutcome {
        milestone_title,
        entered_review,
    })
}

#[derive(Debug)]
pub enum ApproveOutcome {
    Approved {
        milestone_title: String,
        /// Held payment moved to processing, to be released asynchronously.
        payment_id: Option<Uuid>,
        amount: i64,
    },
    /// Approval already stamped; state unchanged.
    AlreadyApproved,
}

/// Client sign-off on a completed milestone. Stamps the approval, moves the
/// linked escrow payment to processing and reports it for asynchronous
/// release. Re-approval is a no-op.
pub fn approve(
    order: &mut Order,
    milestone_id: Uuid,
    actor_id: &str,
    feedback: Option<String>,
    rating: Option<u8>,
) -> EngineResult<ApproveOutcome> {
    if order.status == OrderStatus::Cancelled {
        return Err(EngineError::invalid_transition(
            order.status,
            MilestoneStatus::Completed,
        ));
    }

    let client_id = order.client_id.clone();
    let now = Utc::now();
    let milestone = order
        .milestone_mut(milestone_id)
        .ok_or_else(|| EngineError::NotFound(format!("milestone {}", milestone_id)))?;

    if milestone.is_approved() {
        return Ok(ApproveOutcome::AlreadyApproved);
    }
    if actor_id != client_id {
        return Err(EngineError::Validation(
            "only the client may approve a milestone".into(),
        ));
    }
    if milestone.status != MilestoneStatus::Completed {
        return Err(EngineError::invalid_transition(
            milestone.status,
            MilestoneStatus::Completed,
        ));
    }

    milestone.approved_by = Some(actor_id.to_string());
    milestone.approved_at = Some(now);
    milestone.feedback = feedback;
    milestone.rating = rating;
    milestone.rejected_at = None;
    milestone.rejection_reason = None;
    let milestone_title = milestone.title.clone();

    let payment = order
        .payment_for_milestone(milestone_id)
        .map(|p| (p.id, p.amount));
    let (payment_id, amount) = match payment {
        Some((id, amount)) => {
            ledger::begin_release(order, id)?;
            (Some(id), amount)
        }
        None => (None, 0),
    };

    timeline::record(
        order,
        TimelineEventKind::MilestoneApproved,
        "Milestone approved",
        format!("\"{}\" was accepted by the client", milestone_title),
        actor_id,
        ActorRole::Client,
        json!({
            "milestone_id": milestone_id.to_string(),
            "payment_id": payment_id.map(|p| p.to_string()),
            "amount": amount,
        }),
    );

    Ok(ApproveOutcome::Approved {
        milestone_title,
        payment_id,
        amount,
    })
}

#[derive(Debug)]
pub struct RejectOutcome {
    pub milestone_title: String,
    pub reason: String,
}

/// Send a completed milestone back for rework: milestone returns to pending
/// with the rejection recorded, and the order enters revision.
pub fn reject(
    order: &mut Order,
    milestone_id: Uuid,
    actor_id: &str,
    reason: &str,
) -> EngineResult<RejectOutcome> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(EngineError::Validation(
            "a rejection reason is required".into(),
        ));
    }
    if order.status.is_terminal() {
        return Err(EngineError::invalid_transition(
            order.status,
            OrderStatus::Revision,
        ));
    }

    let now = Utc::now();
    let milestone = order
        .milestone_mut(milestone_id)
        .ok_or_else(|| EngineError::NotFound(format!("milestone {}", milestone_id)))?;
    if milestone.status != MilestoneStatus::Completed || milestone.is_approved() {
        return Err(EngineError::invalid_transition(
            milestone.status,
            MilestoneStatus::Pending,
        ));
    }

    milestone.status = MilestoneStatus::Pending;
    milestone.completed_at = None;
    milestone.rejected_at = Some(now);
    milestone.rejection_reason = Some(reason.to_string());
    let milestone_title = milestone.title.clone();

    order.recompute_progress();
    if !order.status.can_transition_to(OrderStatus::Revision) {
        return Err(EngineError::invalid_transition(
            order.status,
            OrderStatus::Revision,
        ));
    }
    order.status = OrderStatus::Revision;

    timeline::record(
        order,
        TimelineEventKind::MilestoneRejected,
        "Milestone rejected",
        format!("\"{}\" was sent back for rework", milestone_title),
        actor_id,
        ActorRole::Client,
        json!({
            "milestone_id": milestone_id.to_string(),
            "reason": reason,
        }),
    );

    Ok(RejectOutcome {
        milestone_title,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkerType;

    fn order_with_plan(total: i64, specs: Option<Vec<MilestoneSpec>>) -> Order {
        let milestones = plan(specs.as_deref(), total).unwrap();
        let mut order = Order {
            id: Uuid::new_v4(),
            version: 1,
            kind: "project".into(),
            title: "Brand refresh".into(),
            description: String::new(),
            category: None,
            skills: vec![],
            client_id: "client-1".into(),
            client_name: None,
            worker_id: Some("worker-1".into()),
            worker_name: None,
            worker_type: WorkerType::Freelancer,
            total_amount: total,
            currency: "USD".into(),
            fee_rate_bps: 1_000,
            status: OrderStatus::Pending,
            progress: 0,
            milestones,
            payments: vec![],
            timeline: vec![],
            conversation_id: None,
            deadline: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let funded: Vec<(Uuid, i64)> = order
            .milestones
            .iter()
            .filter(|m| m.amount > 0)
            .map(|m| (m.id, m.amount))
            .collect();
        for (mid, amount) in funded {
            ledger::open_escrow(&mut order, amount, Some(mid));
        }
        order
    }

    #[test]
    fn default_plan_sums_to_total() {
        let order = order_with_plan(1_000, None);
        assert_eq!(order.milestones.len(), 3);
        let amounts: Vec<i64> = order.milestones.iter().map(|m| m.amount).collect();
        assert_eq!(amounts, vec![0, 700, 300]);
    }

    #[test]
    fn explicit_amounts_must_reconcile() {
        let specs = vec![
            MilestoneSpec {
                title: "Draft".into(),
                description: String::new(),
                amount: Some(400),
                percentage: None,
                due_date: None,
            },
            MilestoneSpec {
                title: "Final".into(),
                description: String::new(),
                amount: Some(500),
                percentage: None,
                due_date: None,
            },
        ];
        let err = plan(Some(&specs), 1_000).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn percentage_plan_absorbs_residual_in_last() {
        let specs = vec![
            MilestoneSpec {
                title: "A".into(),
                description: String::new(),
                amount: None,
                percentage: Some(33),
                due_date: None,
            },
            MilestoneSpec {
                title: "B".into(),
                description: String::new(),
                amount: None,
                percentage: Some(33),
                due_date: None,
            },
            MilestoneSpec {
                title: "C".into(),
                description: String::new(),
                amount: None,
                percentage: Some(34),
                due_date: None,
            },
        ];
        let milestones = plan(Some(&specs), 1_000).unwrap();
        let total: i64 = milestones.iter().map(|m| m.amount).sum();
        assert_eq!(total, 1_000);
    }

    #[test]
    fn complete_then_reject_then_complete_again() {
        let mut order = order_with_plan(1_000, None);
        let m2 = order.milestones[1].id;

        complete(&mut order, m2, "worker-1", &[]).unwrap();
        assert_eq!(order.progress, 33);
        assert_eq!(order.status, OrderStatus::InProgress);

        reject(&mut order, m2, "client-1", "needs edits").unwrap();
        assert_eq!(order.status, OrderStatus::Revision);
        assert_eq!(order.progress, 0);
        let milestone = order.milestone(m2).unwrap();
        assert_eq!(milestone.status, MilestoneStatus::Pending);
        assert_eq!(milestone.rejection_reason.as_deref(), Some("needs edits"));

        complete(&mut order, m2, "worker-1", &[]).unwrap();
        let milestone = order.milestone(m2).unwrap();
        assert!(milestone.rejection_reason.is_none());
        assert_eq!(order.status, OrderStatus::InProgress);
    }

    #[test]
    fn reject_requires_reason() {
        let mut order = order_with_plan(1_000, None);
        let m2 = order.milestones[1].id;
        complete(&mut order, m2, "worker-1", &[]).unwrap();
        let err = reject(&mut order, m2, "client-1", "  ").unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn approve_is_client_only_and_idempotent() {
        let mut order = order_with_plan(1_000, None);
        let m2 = order.milestones[1].id;
        complete(&mut order, m2, "worker-1", &[]).unwrap();

        let err = approve(&mut order, m2, "worker-1", None, None).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let first = approve(&mut order, m2, "client-1", None, Some(5)).unwrap();
        let payment_id = match first {
            ApproveOutcome::Approved { payment_id, amount, .. } => {
                assert_eq!(amount, 700);
                payment_id.unwrap()
            }
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(
            order.payment(payment_id).unwrap().status,
            crate::models::PaymentStatus::Processing
        );
        let events = order.timeline.len();

        let second = approve(&mut order, m2, "client-1", None, None).unwrap();
        assert!(matches!(second, ApproveOutcome::AlreadyApproved));
        assert_eq!(order.timeline.len(), events);
    }

    #[test]
    fn last_delivery_enters_review() {
        let mut order = order_with_plan(1_000, None);
        let ids: Vec<Uuid> = order.milestones.iter().map(|m| m.id).collect();
        for (i, id) in ids.iter().enumerate() {
            let outcome = complete(&mut order, *id, "worker-1", &[]).unwrap();
            assert_eq!(outcome.entered_review, i == ids.len() - 1);
        }
        assert_eq!(order.status, OrderStatus::Review);
        assert_eq!(order.progress, 100);
    }

    #[test]
    fn approved_milestone_cannot_be_rejected() {
        let mut order = order_with_plan(1_000, None);
        let m2 = order.milestones[1].id;
        complete(&mut order, m2, "worker-1", &[]).unwrap();
        approve(&mut order, m2, "client-1", None, None).unwrap();
        let err = reject(&mut order, m2, "client-1", "too late").unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }
}
