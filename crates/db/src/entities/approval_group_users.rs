//! `SeaORM` Entity for the legacy approval_group_users table (group → user).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_group_users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub group_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,
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
}

impl Related<super::approval_groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalGroups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
