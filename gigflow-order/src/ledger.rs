use crate::models::{EscrowStatus, Order, OrderStatus, Payment, PaymentStatus};
use crate::timeline;
use chrono::Utc;
use gigflow_core::money;
use gigflow_core::{EngineError, EngineResult};
use gigflow_shared::models::events::{ActorRole, TimelineEventKind};
use serde_json::json;
use uuid::Uuid;

/// Open a held escrow payment on the order. The platform fee is computed
/// up front (round half-up, residual to the fee) so `platform_fee +
/// worker_receives == amount` exactly.
pub fn open_escrow(order: &mut Order, amount: i64, milestone_id: Option<Uuid>) -> Uuid {
    let (fee, payout) = money::fee_decomposition(amount, order.fee_rate_bps);
    let payment = Payment {
        id: Uuid::new_v4(),
        milestone_id,
        amount,
        currency: order.currency.clone(),
        status: PaymentStatus::Pending,
        escrow_status: EscrowStatus::Held,
        platform_fee: fee,
        worker_receives: payout,
        processor_ref: None,
        created_at: Utc::now(),
        released_at: None,
        refunded_at: None,
    };
    let id = payment.id;
    order.payments.push(payment);
    id
}

/// Move a held payment to `Processing`. Called inside the approval commit;
/// the actual release settles asynchronously.
pub fn begin_release(order: &mut Order, payment_id: Uuid) -> EngineResult<()> {
    let payment = order
        .payment_mut(payment_id)
        .ok_or_else(|| EngineError::NotFound(format!("payment {}", payment_id)))?;
    if payment.escrow_status != EscrowStatus::Held {
        return Err(EngineError::invalid_transition(
            payment.escrow_status,
            EscrowStatus::Released,
        ));
    }
    payment.status = PaymentStatus::Processing;
    Ok(())
}

#[derive(Debug)]
pub enum ReleaseOutcome {
    Released {
        amount: i64,
        worker_receives: i64,
        completed_order: bool,
    },
    /// The payment already reached its terminal escrow state; nothing
    /// changed and no event was appended.
    AlreadyReleased,
}

/// Settle a held payment: status completed, escrow released. Idempotent on
/// an already-released payment. When this was the last outstanding payment
/// of a fully-approved order in review, the order completes.
pub fn release(order: &mut Order, payment_id: Uuid) -> EngineResult<ReleaseOutcome> {
    // A cancelled order admits no further escrow movement toward the
    // worker; held funds leave through refund_payment instead.
    if order.status == OrderStatus::Cancelled {
        return Err(EngineError::invalid_transition(
            order.status,
            EscrowStatus::Released,
        ));
    }

    let payment = order
        .payment_mut(payment_id)
        .ok_or_else(|| EngineError::NotFound(format!("payment {}", payment_id)))?;

    match payment.escrow_status {
        EscrowStatus::Released => return Ok(ReleaseOutcome::AlreadyReleased),
        EscrowStatus::Disputed => {
            return Err(EngineError::invalid_transition(
                EscrowStatus::Disputed,
                EscrowStatus::Released,
            ))
        }
        EscrowStatus::Held => {}
    }

    payment.status = PaymentStatus::Completed;
    payment.escrow_status = EscrowStatus::Released;
    payment.released_at = Some(Utc::now());
    let amount = payment.amount;
    let worker_receives = payment.worker_receives;
    let milestone_id = payment.milestone_id;
    let payment_id = payment.id;

    timeline::record(
        order,
        TimelineEventKind::PaymentReleased,
        "Payment released",
        "Escrow released to the worker",
        "system",
        ActorRole::System,
        json!({
            "payment_id": payment_id.to_string(),
            "milestone_id": milestone_id.map(|m| m.to_string()),
            "amount": amount,
            "worker_receives": worker_receives,
        }),
    );

    let completed_order = maybe_complete(order);
    Ok(ReleaseOutcome::Released {
        amount,
        worker_receives,
        completed_order,
    })
}

/// Refund a payment still held in escrow. A partial refund shrinks the
/// payment and recomputes the fee decomposition on the remainder; a full
/// refund marks the payment refunded.
pub fn refund(order: &mut Order, payment_id: Uuid, amount: Option<i64>) -> EngineResult<()> {
    let fee_rate_bps = order.fee_rate_bps;
    let payment = order
        .payment_mut(payment_id)
        .ok_or_else(|| EngineError::NotFound(format!("payment {}", payment_id)))?;

    if payment.escrow_status != EscrowStatus::Held {
        return Err(EngineError::invalid_transition(
            payment.escrow_status,
            PaymentStatus::Refunded,
        ));
    }

    let refund_amount = amount.unwrap_or(payment.amount);
    if refund_amount <= 0 || refund_amount > payment.amount {
        return Err(EngineError::Validation(format!(
            "refund amount {} out of range for payment of {}",
            refund_amount, payment.amount
        )));
    }

    let remaining = payment.amount - refund_amount;
    payment.amount = remaining;
    let (fee, payout) = money::fee_decomposition(remaining, fee_rate_bps);
    payment.platform_fee = fee;
    payment.worker_receives = payout;
    payment.refunded_at = Some(Utc::now());
    if remaining == 0 {
        payment.status = PaymentStatus::Refunded;
    }
    let payment_id = payment.id;

    timeline::record(
        order,
        TimelineEventKind::PaymentRefunded,
        "Payment refunded",
        "Escrowed funds returned to the client",
        "system",
        ActorRole::System,
        json!({
            "payment_id": payment_id.to_string(),
            "refund_amount": refund_amount,
            "remaining": remaining,
        }),
    );
    Ok(())
}

/// Review -> Completed once every milestone is approved and no escrow is
/// outstanding.
fn maybe_complete(order: &mut Order) -> bool {
    if order.status != OrderStatus::Review
        || !order.all_milestones_approved()
        || !order.all_escrow_settled()
    {
        return false;
    }
    order.status = OrderStatus::Completed;
    timeline::record(
        order,
        TimelineEventKind::StatusChanged,
        "Order completed",
        "All milestones approved and all payments settled",
        "system",
        ActorRole::System,
        json!({ "from": "REVIEW", "to": "COMPLETED" }),
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MilestoneStatus, OrderStatus, WorkerType};
    use crate::models::{Milestone, Order};

    fn order_with_escrow(amount: i64) -> (Order, Uuid) {
        let mut order = Order {
            id: Uuid::new_v4(),
            version: 1,
            kind: "project".into(),
            title: "Site build".into(),
            description: String::new(),
            category: None,
            skills: vec![],
            client_id: "client-1".into(),
            client_name: None,
            worker_id: Some("worker-1".into()),
            worker_name: None,
            worker_type: WorkerType::Freelancer,
            total_amount: amount,
            currency: "USD".into(),
            fee_rate_bps: 1_000,
            status: OrderStatus::InProgress,
            progress: 0,
            milestones: vec![Milestone::new("Delivery", "", amount)],
            payments: vec![],
            timeline: vec![],
            conversation_id: None,
            deadline: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let milestone_id = order.milestones[0].id;
        let payment_id = open_escrow(&mut order, amount, Some(milestone_id));
        (order, payment_id)
    }

    #[test]
    fn escrow_decomposition_sums_to_amount() {
        let (order, payment_id) = order_with_escrow(1_005);
        let payment = order.payment(payment_id).unwrap();
        assert_eq!(payment.platform_fee + payment.worker_receives, 1_005);
        assert_eq!(payment.escrow_status, EscrowStatus::Held);
    }

    #[test]
    fn release_is_idempotent() {
        let (mut order, payment_id) = order_with_escrow(700);
        let first = release(&mut order, payment_id).unwrap();
        assert!(matches!(first, ReleaseOutcome::Released { .. }));
        let receives_after_first = order.payment(payment_id).unwrap().worker_receives;
        let events_after_first = order.timeline.len();

        let second = release(&mut order, payment_id).unwrap();
        assert!(matches!(second, ReleaseOutcome::AlreadyReleased));
        let payment = order.payment(payment_id).unwrap();
        assert_eq!(payment.worker_receives, receives_after_first);
        assert_eq!(order.timeline.len(), events_after_first);
    }

    #[test]
    fn refund_after_release_is_rejected() {
        let (mut order, payment_id) = order_with_escrow(700);
        release(&mut order, payment_id).unwrap();
        let err = refund(&mut order, payment_id, None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn partial_refund_recomputes_decomposition() {
        let (mut order, payment_id) = order_with_escrow(1_000);
        refund(&mut order, payment_id, Some(400)).unwrap();
        let payment = order.payment(payment_id).unwrap();
        assert_eq!(payment.amount, 600);
        assert_eq!(payment.platform_fee + payment.worker_receives, 600);
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn full_refund_marks_payment_refunded() {
        let (mut order, payment_id) = order_with_escrow(1_000);
        refund(&mut order, payment_id, None).unwrap();
        let payment = order.payment(payment_id).unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(payment.worker_receives, 0);
    }

    #[test]
    fn cancelled_orders_refuse_release_but_allow_refund() {
        let (mut order, payment_id) = order_with_escrow(700);
        order.status = OrderStatus::Cancelled;

        let err = release(&mut order, payment_id).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        refund(&mut order, payment_id, None).unwrap();
        assert_eq!(
            order.payment(payment_id).unwrap().status,
            PaymentStatus::Refunded
        );
    }

    #[test]
    fn release_completes_fully_approved_order() {
        let (mut order, payment_id) = order_with_escrow(700);
        order.status = OrderStatus::Review;
        order.milestones[0].status = MilestoneStatus::Completed;
        order.milestones[0].approved_by = Some("client-1".into());
        order.milestones[0].approved_at = Some(Utc::now());

        match release(&mut order, payment_id).unwrap() {
            ReleaseOutcome::Released {
                completed_order, ..
            } => assert!(completed_order),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(order.status, OrderStatus::Completed);
    }
}
