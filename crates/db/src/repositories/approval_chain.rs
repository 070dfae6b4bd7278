//! Approval chain repository.
//!
//! The partial unique index `uq_approval_chains_active_artifact` enforces at
//! most one active chain per artifact; a violation on insert is reported as
//! [`ChainInsert::AlreadyActive`] so the builder can adopt the winner.

use std::collections::HashSet;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use steerco_core::governance::chain::{
    APPROVER_TYPE_USER, ApprovalChain, ApprovalStep, Approver, ChainInsert, ChainStore,
    NewApprovalChain, PlannedStep,
};
use steerco_core::governance::error::GovernanceError;
use steerco_core::governance::types::{ChainStatus, StepStatus};
use steerco_shared::types::{ApprovalChainId, ApprovalStepId};

use crate::entities::{
    approval_chains, approval_step_approvers, approval_steps,
    sea_orm_active_enums::{ApprovalChainStatus, ApprovalStepStatus},
};

use super::db_err;

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn chain_to_domain(model: approval_chains::Model) -> ApprovalChain {
    ApprovalChain {
        id: model.id.into(),
        organization_id: model.organization_id.into(),
        artifact_id: model.artifact_id,
        project_id: model.project_id.into(),
        artifact_type: model.artifact_type,
        amount: model.amount,
        status: model.status.into(),
        created_by: model.created_by.into(),
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn step_to_domain(model: approval_steps::Model) -> ApprovalStep {
    ApprovalStep {
        id: model.id.into(),
        chain_id: model.chain_id.into(),
        step_order: model.step_order,
        name: model.name,
        quorum_mode: model.quorum_mode.into(),
        min_approvals: model.min_approvals,
        max_rejections: model.max_rejections,
        status: model.status.into(),
    }
}

fn approver_to_domain(model: approval_step_approvers::Model) -> Approver {
    Approver {
        id: model.id,
        step_id: model.step_id.into(),
        approver_type: model.approver_type,
        approver_ref: model.approver_ref.into(),
        required: model.required,
        active: model.active,
    }
}

/// Repository for approval chains, steps and step approvers.
#[derive(Debug, Clone)]
pub struct ApprovalChainRepository {
    db: DatabaseConnection,
}

impl ApprovalChainRepository {
    /// Creates a new approval chain repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// All chains of an artifact, oldest first.
    pub async fn history(&self, artifact_id: Uuid) -> Result<Vec<ApprovalChain>, GovernanceError> {
        let rows = approval_chains::Entity::find()
            .filter(approval_chains::Column::ArtifactId.eq(artifact_id))
            .order_by_asc(approval_chains::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(chain_to_domain).collect())
    }

    async fn write_steps(
        txn: &DatabaseTransaction,
        chain_id: ApprovalChainId,
        steps: &[PlannedStep],
    ) -> Result<Vec<ApprovalStep>, DbErr> {
        let now = Utc::now();
        let mut inserted = Vec::with_capacity(steps.len());

        for planned in steps {
            let step = approval_steps::ActiveModel {
                id: Set(Uuid::now_v7()),
                chain_id: Set(chain_id.into_inner()),
                step_order: Set(planned.step_order),
                name: Set(planned.name.clone()),
                quorum_mode: Set(planned.quorum_mode.into()),
                min_approvals: Set(planned.min_approvals),
                max_rejections: Set(planned.max_rejections),
                status: Set(ApprovalStepStatus::from(StepStatus::Pending)),
                created_at: Set(now.into()),
            }
            .insert(txn)
            .await?;

            let mut seen = HashSet::new();
            for user_id in planned.approvers.iter().filter(|u| seen.insert(**u)) {
                approval_step_approvers::ActiveModel {
                    id: Set(Uuid::now_v7()),
                    step_id: Set(step.id),
                    approver_type: Set(APPROVER_TYPE_USER.to_string()),
                    approver_ref: Set(user_id.into_inner()),
                    required: Set(true),
                    active: Set(true),
                    created_at: Set(now.into()),
                }
                .insert(txn)
                .await?;
            }

            inserted.push(step_to_domain(step));
        }
        Ok(inserted)
    }
}

impl ChainStore for ApprovalChainRepository {
    async fn supersede_active(&self, artifact_id: Uuid) -> Result<u64, GovernanceError> {
        let result = approval_chains::Entity::update_many()
            .set(approval_chains::ActiveModel {
                status: Set(ApprovalChainStatus::Superseded),
                ..Default::default()
            })
            .filter(approval_chains::Column::ArtifactId.eq(artifact_id))
            .filter(approval_chains::Column::Status.eq(ApprovalChainStatus::Active))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    async fn insert_active(&self, chain: NewApprovalChain) -> Result<ChainInsert, GovernanceError> {
        let row = approval_chains::ActiveModel {
            id: Set(Uuid::now_v7()),
            organization_id: Set(chain.organization_id.into_inner()),
            artifact_id: Set(chain.artifact_id),
            project_id: Set(chain.project_id.into_inner()),
            artifact_type: Set(chain.artifact_type),
            amount: Set(chain.amount),
            status: Set(ApprovalChainStatus::from(ChainStatus::Active)),
            created_by: Set(chain.created_by.into_inner()),
            created_at: Set(Utc::now().into()),
        };

        match row.insert(&self.db).await {
            Ok(model) => Ok(ChainInsert::Created(chain_to_domain(model))),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(artifact_id = %chain.artifact_id, "Active approval chain already exists");
                Ok(ChainInsert::AlreadyActive)
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn find_active(&self, artifact_id: Uuid) -> Result<Option<ApprovalChain>, GovernanceError> {
        let row = approval_chains::Entity::find()
            .filter(approval_chains::Column::ArtifactId.eq(artifact_id))
            .filter(approval_chains::Column::Status.eq(ApprovalChainStatus::Active))
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(row.map(chain_to_domain))
    }

    async fn list_steps(
        &self,
        chain_id: ApprovalChainId,
    ) -> Result<Vec<ApprovalStep>, GovernanceError> {
        let rows = approval_steps::Entity::find()
            .filter(approval_steps::Column::ChainId.eq(chain_id.into_inner()))
            .order_by_asc(approval_steps::Column::StepOrder)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(step_to_domain).collect())
    }

    async fn insert_steps(
        &self,
        chain_id: ApprovalChainId,
        steps: &[PlannedStep],
    ) -> Result<Vec<ApprovalStep>, GovernanceError> {
        let existing = self.list_steps(chain_id).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let txn = self.db.begin().await.map_err(db_err)?;
        match Self::write_steps(&txn, chain_id, steps).await {
            Ok(inserted) => {
                txn.commit().await.map_err(db_err)?;
                Ok(inserted)
            }
            Err(e) if is_unique_violation(&e) => {
                txn.rollback().await.map_err(db_err)?;
                tracing::debug!(chain_id = %chain_id, "Steps were written concurrently");
                self.list_steps(chain_id).await
            }
            Err(e) => {
                txn.rollback().await.map_err(db_err)?;
                Err(db_err(e))
            }
        }
    }

    async fn list_approvers(
        &self,
        step_ids: &[ApprovalStepId],
    ) -> Result<Vec<Approver>, GovernanceError> {
        if step_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = approval_step_approvers::Entity::find()
            .filter(
                approval_step_approvers::Column::StepId
                    .is_in(step_ids.iter().map(|id| id.into_inner())),
            )
            .order_by_asc(approval_step_approvers::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(approver_to_domain).collect())
    }
}
