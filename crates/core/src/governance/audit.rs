//! Best-effort audit and timeline recording.
//!
//! Audit runs after the governance write has committed. Failures are logged
//! and returned as warnings; they never fail the operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use steerco_shared::types::{ChangeRequestId, ProjectId, UserId};

use crate::governance::error::GovernanceError;
use crate::governance::outcome::{Warning, WarningKind};
use crate::governance::types::{Actor, ProjectRole};

/// Governance event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceEvent {
    /// Change created.
    ChangeCreated,
    /// Plain fields edited.
    FieldsEdited,
    /// Delivery lane moved.
    LaneMoved,
    /// Submitted for approval.
    Submitted,
    /// Approved.
    Approved,
    /// Rejected.
    Rejected,
    /// Sent back for rework by an approver.
    Rework,
    /// Sent back for rework by the owner.
    ChangesRequested,
    /// Change deleted.
    ChangeDeleted,
}

impl GovernanceEvent {
    /// Returns the string representation of the event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChangeCreated => "change_created",
            Self::FieldsEdited => "fields_edited",
            Self::LaneMoved => "lane_moved",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Rework => "rework",
            Self::ChangesRequested => "changes_requested",
            Self::ChangeDeleted => "change_deleted",
        }
    }
}

impl fmt::Display for GovernanceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Project.
    pub project_id: ProjectId,
    /// Change request.
    pub change_id: ChangeRequestId,
    /// Acting user.
    pub actor_id: UserId,
    /// Acting role.
    pub actor_role: ProjectRole,
    /// Event type.
    pub event_type: GovernanceEvent,
    /// Value before the transition.
    pub from_value: Option<String>,
    /// Value after the transition.
    pub to_value: Option<String>,
    /// Free-text note (rationale, comment).
    pub note: Option<String>,
    /// Extra context.
    pub payload: Value,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

/// User-facing timeline row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Project.
    pub project_id: ProjectId,
    /// Change request.
    pub change_id: ChangeRequestId,
    /// Event type.
    pub event_type: GovernanceEvent,
    /// Status before.
    pub from_status: Option<String>,
    /// Status after.
    pub to_status: Option<String>,
    /// Acting user.
    pub actor_id: UserId,
    /// Acting role.
    pub actor_role: ProjectRole,
    /// Comment shown on the timeline.
    pub comment: Option<String>,
    /// Extra context.
    pub payload: Value,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

/// Destination of audit and timeline events.
pub trait AuditSink: Send + Sync {
    /// Appends an audit event.
    fn append_audit(
        &self,
        event: AuditEvent,
    ) -> impl std::future::Future<Output = Result<(), GovernanceError>> + Send;

    /// Appends a timeline event.
    fn append_timeline(
        &self,
        event: TimelineEvent,
    ) -> impl std::future::Future<Output = Result<(), GovernanceError>> + Send;
}

/// What happened in one committed transition.
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    /// Project.
    pub project_id: ProjectId,
    /// Change request.
    pub change_id: ChangeRequestId,
    /// Who did it.
    pub actor: Actor,
    /// Event type.
    pub event: GovernanceEvent,
    /// Value before.
    pub from: Option<String>,
    /// Value after.
    pub to: Option<String>,
    /// Note or comment.
    pub note: Option<String>,
    /// Extra context.
    pub payload: Value,
}

impl TransitionRecord {
    /// Creates a record with no from/to values, note or payload.
    #[must_use]
    pub fn new(
        project_id: ProjectId,
        change_id: ChangeRequestId,
        actor: Actor,
        event: GovernanceEvent,
    ) -> Self {
        Self {
            project_id,
            change_id,
            actor,
            event,
            from: None,
            to: None,
            note: None,
            payload: Value::Object(serde_json::Map::new()),
        }
    }

    /// Sets the before/after values.
    #[must_use]
    pub fn values(mut self, from: impl ToString, to: impl ToString) -> Self {
        self.from = Some(from.to_string());
        self.to = Some(to.to_string());
        self
    }

    /// Sets the note.
    #[must_use]
    pub fn note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Writes one audit event and one timeline event per transition.
pub struct AuditLog<'a, A> {
    sink: &'a A,
    enabled: bool,
}

impl<'a, A: AuditSink> AuditLog<'a, A> {
    /// Creates an audit log over a sink.
    pub fn new(sink: &'a A, enabled: bool) -> Self {
        Self { sink, enabled }
    }

    /// Records a committed transition. Never fails.
    pub async fn record(&self, record: &TransitionRecord) -> Vec<Warning> {
        if !self.enabled {
            return Vec::new();
        }

        let now = Utc::now();
        let mut warnings = Vec::new();

        let audit = AuditEvent {
            project_id: record.project_id,
            change_id: record.change_id,
            actor_id: record.actor.user_id,
            actor_role: record.actor.role,
            event_type: record.event,
            from_value: record.from.clone(),
            to_value: record.to.clone(),
            note: record.note.clone(),
            payload: record.payload.clone(),
            created_at: now,
        };
        if let Err(e) = self.sink.append_audit(audit).await {
            tracing::warn!(
                change_id = %record.change_id,
                event = %record.event,
                error = %e,
                "Failed to write audit event"
            );
            warnings.push(Warning::new(WarningKind::Audit, e.to_string()));
        }

        let timeline = TimelineEvent {
            project_id: record.project_id,
            change_id: record.change_id,
            event_type: record.event,
            from_status: record.from.clone(),
            to_status: record.to.clone(),
            actor_id: record.actor.user_id,
            actor_role: record.actor.role,
            comment: record.note.clone(),
            payload: record.payload.clone(),
            created_at: now,
        };
        if let Err(e) = self.sink.append_timeline(timeline).await {
            tracing::warn!(
                change_id = %record.change_id,
                event = %record.event,
                error = %e,
                "Failed to write timeline event"
            );
            warnings.push(Warning::new(WarningKind::Timeline, e.to_string()));
        }

        warnings
    }
}
