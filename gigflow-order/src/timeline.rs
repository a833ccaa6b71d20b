use crate::models::Order;
use gigflow_shared::models::events::{ActorRole, TimelineEvent, TimelineEventKind};
use std::collections::HashSet;
use uuid::Uuid;

/// Append an event to the order's timeline. The append happens inside the
/// order's atomic commit, so it only ever fails with the commit itself.
pub fn record(
    order: &mut Order,
    kind: TimelineEventKind,
    title: impl Into<String>,
    description: impl Into<String>,
    actor_id: impl Into<String>,
    actor_role: ActorRole,
    data: serde_json::Value,
) {
    order.timeline.push(TimelineEvent::new(
        kind,
        title,
        description,
        actor_id,
        actor_role,
        data,
    ));
}

/// State recomputed from the event stream alone.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Replay {
    pub completed_milestones: HashSet<Uuid>,
    pub approved_milestones: HashSet<Uuid>,
    pub released_payments: HashSet<Uuid>,
    pub progress: u8,
}

/// Rebuild milestone progress from the timeline. The timeline is the source
/// of truth for "who did what when"; dispute review and tests replay it to
/// cross-check the stored aggregate.
pub fn replay(events: &[TimelineEvent], total_milestones: usize) -> Replay {
    let mut state = Replay::default();

    for event in events {
        let milestone_id = event
            .data
            .get("milestone_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        let payment_id = event
            .data
            .get("payment_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        match event.event_type {
            TimelineEventKind::MilestoneCompleted => {
                if let Some(id) = milestone_id {
                    state.completed_milestones.insert(id);
                }
            }
            TimelineEventKind::MilestoneRejected => {
                if let Some(id) = milestone_id {
                    state.completed_milestones.remove(&id);
                }
            }
            TimelineEventKind::MilestoneApproved => {
                if let Some(id) = milestone_id {
                    state.approved_milestones.insert(id);
                }
            }
            TimelineEventKind::PaymentReleased => {
                if let Some(id) = payment_id {
                    state.released_payments.insert(id);
                }
            }
            _ => {}
        }
    }

    if total_milestones > 0 {
        state.progress = ((100 * state.completed_milestones.len() + total_milestones / 2)
            / total_milestones) as u8;
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: TimelineEventKind, data: serde_json::Value) -> TimelineEvent {
        TimelineEvent::new(kind, "t", "d", "actor", ActorRole::System, data)
    }

    #[test]
    fn replay_tracks_rejection_reopening() {
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        let events = vec![
            event(TimelineEventKind::Created, json!({})),
            event(
                TimelineEventKind::MilestoneCompleted,
                json!({ "milestone_id": m1.to_string() }),
            ),
            event(
                TimelineEventKind::MilestoneCompleted,
                json!({ "milestone_id": m2.to_string() }),
            ),
            event(
                TimelineEventKind::MilestoneRejected,
                json!({ "milestone_id": m2.to_string(), "reason": "needs edits" }),
            ),
        ];

        let state = replay(&events, 3);
        assert_eq!(state.completed_milestones.len(), 1);
        assert!(state.completed_milestones.contains(&m1));
        assert_eq!(state.progress, 33);
    }

    #[test]
    fn replay_of_empty_timeline_is_zero() {
        let state = replay(&[], 3);
        assert_eq!(state.progress, 0);
        assert!(state.completed_milestones.is_empty());
    }
}
