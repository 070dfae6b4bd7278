//! `SeaORM` Entity for approval_group_members table (group → approver).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_group_members")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub group_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub approver_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::approval_groups::Entity",
        from = "Column::GroupId",
        to = "super::approval_groups::Column::Id"
    )]
    ApprovalGroups,
    #[sea_orm(
        belongs_to = "super::approvers::Entity",
        from = "Column::ApproverId",
        to = "super::approvers::Column::Id"
    )]
    Approvers,
}

impl Related<super::approval_groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalGroups.def()
    }
}

impl Related<super::approvers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Approvers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
