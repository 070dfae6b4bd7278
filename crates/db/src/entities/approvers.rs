//! `SeaORM` Entity for approvers table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "approvers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::approval_group_members::Entity")]
    ApprovalGroupMembers,
}

impl Related<super::approval_group_members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalGroupMembers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
