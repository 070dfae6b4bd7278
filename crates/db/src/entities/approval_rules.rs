//! `SeaORM` Entity for approval_rules table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub step: i32,
    pub approval_role: String,
    pub approver_user_id: Option<Uuid>,
    pub approval_group_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub min_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub max_amount: Option<Decimal>,
    pub artifact_type: String,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::approval_groups::Entity",
        from = "Column::ApprovalGroupId",
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
