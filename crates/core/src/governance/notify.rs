//! Notification dispatch.
//!
//! Delivery transports live outside the engine. The engine only hands events
//! to a [`Notifier`] after a transition commits.

use serde::Serialize;

use steerco_shared::types::{ApprovalChainId, ChangeRequestId, ProjectId, UserId};

use crate::governance::error::GovernanceError;
use crate::governance::types::DecisionOutcome;

/// Events sent to interested users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A change was submitted; the chain's approvers should act.
    ApprovalRequested {
        /// Change request.
        change_id: ChangeRequestId,
        /// Project.
        project_id: ProjectId,
        /// Chain that was attached.
        chain_id: ApprovalChainId,
        /// Approvers to notify.
        recipients: Vec<UserId>,
    },
    /// A decision was recorded.
    DecisionRecorded {
        /// Change request.
        change_id: ChangeRequestId,
        /// Project.
        project_id: ProjectId,
        /// Recorded outcome.
        outcome: DecisionOutcome,
        /// Change creator.
        recipient: UserId,
    },
    /// The owner requested changes.
    ChangesRequested {
        /// Change request.
        change_id: ChangeRequestId,
        /// Project.
        project_id: ProjectId,
        /// Change creator.
        recipient: UserId,
        /// Owner's note.
        note: Option<String>,
    },
}

impl NotificationEvent {
    /// Event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApprovalRequested { .. } => "approval_requested",
            Self::DecisionRecorded { .. } => "decision_recorded",
            Self::ChangesRequested { .. } => "changes_requested",
        }
    }

    /// Change the event is about.
    #[must_use]
    pub fn change_id(&self) -> ChangeRequestId {
        match self {
            Self::ApprovalRequested { change_id, .. }
            | Self::DecisionRecorded { change_id, .. }
            | Self::ChangesRequested { change_id, .. } => *change_id,
        }
    }
}

/// Hands notifications to a delivery mechanism.
pub trait Notifier: Send + Sync {
    /// Dispatches one event.
    fn notify(
        &self,
        event: NotificationEvent,
    ) -> impl std::future::Future<Output = Result<(), GovernanceError>> + Send;
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, event: NotificationEvent) -> Result<(), GovernanceError> {
        tracing::info!(
            event = event.name(),
            change_id = %event.change_id(),
            "Governance notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_accepts_events() {
        let event = NotificationEvent::DecisionRecorded {
            change_id: ChangeRequestId::new(),
            project_id: ProjectId::new(),
            outcome: DecisionOutcome::Approved,
            recipient: UserId::new(),
        };
        assert_eq!(event.name(), "decision_recorded");
        assert!(LogNotifier.notify(event).await.is_ok());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = NotificationEvent::ChangesRequested {
            change_id: ChangeRequestId::new(),
            project_id: ProjectId::new(),
            recipient: UserId::new(),
            note: Some("more detail".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "changes_requested");
        assert_eq!(json["note"], "more detail");
    }
}
