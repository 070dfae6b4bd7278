//! `SeaORM` Entity for approval_groups table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_groups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::approval_group_members::Entity")]
    ApprovalGroupMembers,
    #[sea_orm(has_many = "super::approval_group_users::Entity")]
    ApprovalGroupUsers,
}

impl Related<super::approval_group_members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalGroupMembers.def()
    }
}

impl Related<super::approval_group_users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalGroupUsers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
