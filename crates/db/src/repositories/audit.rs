//! Audit and timeline repository.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use steerco_core::governance::audit::{AuditEvent, AuditSink, TimelineEvent};
use steerco_core::governance::error::GovernanceError;
use steerco_shared::types::ChangeRequestId;

use crate::entities::{change_request_audit_events, change_request_timeline};

use super::db_err;

/// Append-only store of governance events.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    db: DatabaseConnection,
}

impl AuditRepository {
    /// Creates a new audit repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Audit rows of a change, oldest first.
    pub async fn audit_trail(
        &self,
        change_id: ChangeRequestId,
    ) -> Result<Vec<change_request_audit_events::Model>, GovernanceError> {
        change_request_audit_events::Entity::find()
            .filter(change_request_audit_events::Column::ChangeId.eq(change_id.into_inner()))
            .order_by_asc(change_request_audit_events::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)
    }

    /// Timeline rows of a change, oldest first.
    pub async fn timeline(
        &self,
        change_id: ChangeRequestId,
    ) -> Result<Vec<change_request_timeline::Model>, GovernanceError> {
        change_request_timeline::Entity::find()
            .filter(change_request_timeline::Column::ChangeId.eq(change_id.into_inner()))
            .order_by_asc(change_request_timeline::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)
    }
}

impl AuditSink for AuditRepository {
    async fn append_audit(&self, event: AuditEvent) -> Result<(), GovernanceError> {
        change_request_audit_events::ActiveModel {
            id: Set(Uuid::now_v7()),
            project_id: Set(event.project_id.into_inner()),
            change_id: Set(event.change_id.into_inner()),
            actor_id: Set(event.actor_id.into_inner()),
            actor_role: Set(event.actor_role.as_str().to_string()),
            event_type: Set(event.event_type.as_str().to_string()),
            from_value: Set(event.from_value),
            to_value: Set(event.to_value),
            note: Set(event.note),
            payload: Set(event.payload),
            created_at: Set(event.created_at.into()),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn append_timeline(&self, event: TimelineEvent) -> Result<(), GovernanceError> {
        change_request_timeline::ActiveModel {
            id: Set(Uuid::now_v7()),
            project_id: Set(event.project_id.into_inner()),
            change_id: Set(event.change_id.into_inner()),
            event_type: Set(event.event_type.as_str().to_string()),
            from_status: Set(event.from_status),
            to_status: Set(event.to_status),
            actor_id: Set(event.actor_id.into_inner()),
            actor_role: Set(event.actor_role.as_str().to_string()),
            comment: Set(event.comment),
            payload: Set(event.payload),
            created_at: Set(event.created_at.into()),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
