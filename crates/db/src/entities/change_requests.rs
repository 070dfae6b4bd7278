//! `SeaORM` Entity for change_requests table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{DecisionStatus, DeliveryStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "change_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub impact_analysis: Json,
    pub decision_status: DecisionStatus,
    pub delivery_status: DeliveryStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub decision_rationale: Option<String>,
    pub decision_by: Option<Uuid>,
    pub decision_at: Option<DateTimeWithTimeZone>,
    pub decision_role: Option<String>,
    pub approval_chain_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((7, 2)))", nullable)]
    pub impact_score: Option<Decimal>,
    pub created_by: Uuid,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
