//! Approver and approver-group repositories.
//!
//! [`ApprovalGroupRepository`] expands groups through the canonical
//! group → approver → user shape. [`LegacyGroupMembershipAdapter`] reads the
//! older direct group → user table and is only consulted as a fallback.

use std::collections::BTreeSet;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
};
use uuid::Uuid;

use steerco_core::governance::error::GovernanceError;
use steerco_core::governance::groups::GroupExpander;
use steerco_shared::types::{ApprovalGroupId, OrganizationId, UserId};

use crate::entities::{approval_group_members, approval_group_users, approval_groups, approvers};

use super::db_err;

/// Repository for approvers, groups and canonical memberships.
#[derive(Debug, Clone)]
pub struct ApprovalGroupRepository {
    db: DatabaseConnection,
}

impl ApprovalGroupRepository {
    /// Creates a new approval group repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Registers a user as an active approver; returns the approver ID.
    pub async fn create_approver(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<Uuid, GovernanceError> {
        let row = approvers::ActiveModel {
            id: Set(Uuid::now_v7()),
            organization_id: Set(organization_id.into_inner()),
            user_id: Set(user_id.into_inner()),
            is_active: Set(true),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;
        Ok(row.id)
    }

    /// Creates a group.
    pub async fn create_group(
        &self,
        organization_id: OrganizationId,
        name: &str,
    ) -> Result<ApprovalGroupId, GovernanceError> {
        let row = approval_groups::ActiveModel {
            id: Set(Uuid::now_v7()),
            organization_id: Set(organization_id.into_inner()),
            name: Set(name.to_string()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;
        Ok(row.id.into())
    }

    /// Adds an active canonical membership.
    pub async fn add_member(
        &self,
        group_id: ApprovalGroupId,
        approver_id: Uuid,
    ) -> Result<(), GovernanceError> {
        approval_group_members::ActiveModel {
            group_id: Set(group_id.into_inner()),
            approver_id: Set(approver_id),
            is_active: Set(true),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

impl GroupExpander for ApprovalGroupRepository {
    async fn expand(&self, group_id: ApprovalGroupId) -> Result<BTreeSet<UserId>, GovernanceError> {
        let approver_ids: Vec<Uuid> = approval_group_members::Entity::find()
            .select_only()
            .column(approval_group_members::Column::ApproverId)
            .filter(approval_group_members::Column::GroupId.eq(group_id.into_inner()))
            .filter(approval_group_members::Column::IsActive.eq(true))
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(db_err)?;
        if approver_ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        let users: Vec<Uuid> = approvers::Entity::find()
            .select_only()
            .column(approvers::Column::UserId)
            .filter(approvers::Column::Id.is_in(approver_ids))
            .filter(approvers::Column::IsActive.eq(true))
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(db_err)?;
        Ok(users.into_iter().map(UserId::from).collect())
    }
}

/// Reads direct group → user memberships.
#[derive(Debug, Clone)]
pub struct LegacyGroupMembershipAdapter {
    db: DatabaseConnection,
}

impl LegacyGroupMembershipAdapter {
    /// Creates a new adapter.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Adds an active legacy membership.
    pub async fn add_user(
        &self,
        group_id: ApprovalGroupId,
        user_id: UserId,
    ) -> Result<(), GovernanceError> {
        approval_group_users::ActiveModel {
            group_id: Set(group_id.into_inner()),
            user_id: Set(user_id.into_inner()),
            is_active: Set(true),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

impl GroupExpander for LegacyGroupMembershipAdapter {
    async fn expand(&self, group_id: ApprovalGroupId) -> Result<BTreeSet<UserId>, GovernanceError> {
        let users: Vec<Uuid> = approval_group_users::Entity::find()
            .select_only()
            .column(approval_group_users::Column::UserId)
            .filter(approval_group_users::Column::GroupId.eq(group_id.into_inner()))
            .filter(approval_group_users::Column::IsActive.eq(true))
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(db_err)?;
        Ok(users.into_iter().map(UserId::from).collect())
    }
}
