//! Approval rule repository.
//!
//! Rules are read by the chain builder through [`RuleRepository`]; the
//! write side exists for seeding and administration.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use steerco_core::governance::error::GovernanceError;
use steerco_core::governance::rules::{ApprovalRule, ApproverRef, RuleRepository};
use steerco_shared::types::OrganizationId;

use crate::entities::approval_rules::{self, ActiveModel, Entity as ApprovalRuleEntity, Model};

use super::db_err;

fn to_domain(model: Model) -> Result<ApprovalRule, GovernanceError> {
    let approver = match (model.approver_user_id, model.approval_group_id) {
        (Some(user), None) => ApproverRef::User(user.into()),
        (None, Some(group)) => ApproverRef::Group(group.into()),
        _ => {
            return Err(GovernanceError::Database(format!(
                "approval rule {} must name exactly one approver",
                model.id
            )));
        }
    };
    Ok(ApprovalRule {
        id: model.id.into(),
        organization_id: model.organization_id.into(),
        step: model.step,
        approval_role: model.approval_role,
        approver,
        min_amount: model.min_amount,
        max_amount: model.max_amount,
        artifact_type: model.artifact_type,
        is_active: model.is_active,
    })
}

/// Repository for approval rule operations.
#[derive(Debug, Clone)]
pub struct ApprovalRuleRepository {
    db: DatabaseConnection,
}

impl ApprovalRuleRepository {
    /// Creates a new approval rule repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Stores a rule.
    pub async fn create_rule(&self, rule: &ApprovalRule) -> Result<ApprovalRule, GovernanceError> {
        let (approver_user_id, approval_group_id) = match rule.approver {
            ApproverRef::User(user) => (Some(user.into_inner()), None),
            ApproverRef::Group(group) => (None, Some(group.into_inner())),
        };
        let now = Utc::now();
        let row = ActiveModel {
            id: Set(rule.id.into_inner()),
            organization_id: Set(rule.organization_id.into_inner()),
            step: Set(rule.step),
            approval_role: Set(rule.approval_role.clone()),
            approver_user_id: Set(approver_user_id),
            approval_group_id: Set(approval_group_id),
            min_amount: Set(rule.min_amount),
            max_amount: Set(rule.max_amount),
            artifact_type: Set(rule.artifact_type.clone()),
            is_active: Set(rule.is_active),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;

        to_domain(row)
    }
}

impl RuleRepository for ApprovalRuleRepository {
    async fn active_rules(
        &self,
        organization_id: OrganizationId,
        artifact_type: &str,
    ) -> Result<Vec<ApprovalRule>, GovernanceError> {
        ApprovalRuleEntity::find()
            .filter(approval_rules::Column::OrganizationId.eq(organization_id.into_inner()))
            .filter(approval_rules::Column::ArtifactType.eq(artifact_type))
            .filter(approval_rules::Column::IsActive.eq(true))
            .order_by_asc(approval_rules::Column::Step)
            .order_by_asc(approval_rules::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(to_domain)
            .collect()
    }
}
