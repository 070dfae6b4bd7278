//! Change request repository.
//!
//! Implements the [`ChangeStore`] port with compare-and-swap writes on
//! `updated_at`, and [`ScoreRecalculator`] as a column-only update that is
//! conditioned on the version token but leaves it alone.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use steerco_core::governance::change::ChangeRequest;
use steerco_core::governance::error::GovernanceError;
use steerco_core::governance::guard::{CasOutcome, ChangeStore, DeleteOutcome};
use steerco_core::governance::scoring::{ScoreRecalculator, impact_score};
use steerco_core::governance::types::{DecisionStatus, Lane, ProjectRole};
use steerco_shared::types::ChangeRequestId;

use crate::entities::change_requests::{self, ActiveModel, Entity as ChangeRequestEntity, Model};

use super::db_err;

/// Converts a stored row into the domain type.
#[must_use]
pub fn to_domain(model: Model) -> ChangeRequest {
    ChangeRequest {
        id: model.id.into(),
        organization_id: model.organization_id.into(),
        project_id: model.project_id.into(),
        title: model.title,
        description: model.description,
        impact_analysis: model.impact_analysis,
        decision_status: DecisionStatus::from(model.decision_status),
        delivery_status: Lane::from(model.delivery_status),
        decision_rationale: model.decision_rationale,
        decision_by: model.decision_by.map(Into::into),
        decision_at: model.decision_at.map(|at| at.with_timezone(&Utc)),
        decision_role: model.decision_role.as_deref().and_then(ProjectRole::parse),
        approval_chain_id: model.approval_chain_id.map(Into::into),
        impact_score: model.impact_score,
        created_by: model.created_by.into(),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

/// Every column of `change` as a settable active model.
fn to_active(change: &ChangeRequest) -> ActiveModel {
    ActiveModel {
        id: Set(change.id.into_inner()),
        organization_id: Set(change.organization_id.into_inner()),
        project_id: Set(change.project_id.into_inner()),
        title: Set(change.title.clone()),
        description: Set(change.description.clone()),
        impact_analysis: Set(change.impact_analysis.clone()),
        decision_status: Set(change.decision_status.into()),
        delivery_status: Set(change.delivery_status.into()),
        decision_rationale: Set(change.decision_rationale.clone()),
        decision_by: Set(change.decision_by.map(Into::into)),
        decision_at: Set(change.decision_at.map(Into::into)),
        decision_role: Set(change.decision_role.map(|r| r.as_str().to_string())),
        approval_chain_id: Set(change.approval_chain_id.map(Into::into)),
        impact_score: Set(change.impact_score),
        created_by: Set(change.created_by.into_inner()),
        created_at: Set(change.created_at.into()),
        updated_at: Set(change.updated_at.into()),
    }
}

/// Repository for change requests.
#[derive(Debug, Clone)]
pub struct ChangeRequestRepository {
    db: DatabaseConnection,
}

impl ChangeRequestRepository {
    /// Creates a new change request repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn current_version(
        &self,
        id: ChangeRequestId,
    ) -> Result<Option<DateTime<Utc>>, GovernanceError> {
        Ok(ChangeRequestEntity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(|row| row.updated_at.with_timezone(&Utc)))
    }
}

impl ChangeStore for ChangeRequestRepository {
    async fn get(&self, id: ChangeRequestId) -> Result<Option<ChangeRequest>, GovernanceError> {
        let row = ChangeRequestEntity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(row.map(to_domain))
    }

    async fn insert(&self, change: ChangeRequest) -> Result<ChangeRequest, GovernanceError> {
        let row = to_active(&change).insert(&self.db).await.map_err(db_err)?;
        Ok(to_domain(row))
    }

    async fn compare_and_swap(
        &self,
        expected: DateTime<Utc>,
        next: ChangeRequest,
    ) -> Result<CasOutcome, GovernanceError> {
        let mut active = to_active(&next);
        active.id = sea_orm::ActiveValue::NotSet;
        active.organization_id = sea_orm::ActiveValue::NotSet;
        active.created_by = sea_orm::ActiveValue::NotSet;
        active.created_at = sea_orm::ActiveValue::NotSet;

        let result = ChangeRequestEntity::update_many()
            .set(active)
            .filter(change_requests::Column::Id.eq(next.id.into_inner()))
            .filter(change_requests::Column::UpdatedAt.eq(expected))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 1 {
            return Ok(CasOutcome::Applied(next));
        }
        tracing::debug!(change_id = %next.id, "Conditional update matched no row");
        Ok(CasOutcome::Stale(self.current_version(next.id).await?))
    }

    async fn delete_if_version(
        &self,
        id: ChangeRequestId,
        expected: DateTime<Utc>,
    ) -> Result<DeleteOutcome, GovernanceError> {
        let result = ChangeRequestEntity::delete_many()
            .filter(change_requests::Column::Id.eq(id.into_inner()))
            .filter(change_requests::Column::UpdatedAt.eq(expected))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 1 {
            return Ok(DeleteOutcome::Deleted);
        }
        Ok(DeleteOutcome::Stale(self.current_version(id).await?))
    }
}

impl ScoreRecalculator for ChangeRequestRepository {
    async fn recompute(&self, change: &ChangeRequest) -> Result<Option<Decimal>, GovernanceError> {
        let score = impact_score(change);
        let result = ChangeRequestEntity::update_many()
            .col_expr(change_requests::Column::ImpactScore, Expr::value(score))
            .filter(change_requests::Column::Id.eq(change.id.into_inner()))
            .filter(change_requests::Column::UpdatedAt.eq(change.updated_at))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 1 {
            Ok(Some(score))
        } else {
            tracing::debug!(change_id = %change.id, "Score write matched no row at this version");
            Ok(None)
        }
    }
}
