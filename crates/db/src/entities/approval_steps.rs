//! `SeaORM` Entity for approval_steps table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{ApprovalStepStatus, QuorumMode};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_steps")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub chain_id: Uuid,
    pub step_order: i32,
    pub name: String,
    pub quorum_mode: QuorumMode,
    pub min_approvals: i32,
    pub max_rejections: i32,
    pub status: ApprovalStepStatus,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::approval_chains::Entity",
        from = "Column::ChainId",
        to = "super::approval_chains::Column::Id"
    )]
    ApprovalChains,
    #[sea_orm(has_many = "super::approval_step_approvers::Entity")]
    ApprovalStepApprovers,
}

impl Related<super::approval_chains::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalChains.def()
    }
}

impl Related<super::approval_step_approvers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalStepApprovers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
