//! `SeaORM` active enums mirroring the PostgreSQL enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use steerco_core::governance::types::{
    ChainStatus as DomainChainStatus, DecisionStatus as DomainDecisionStatus, Lane,
    QuorumMode as DomainQuorumMode, StepStatus as DomainStepStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "decision_status")]
pub enum DecisionStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "submitted")]
    Submitted,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "rework")]
    Rework,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "delivery_status")]
pub enum DeliveryStatus {
    #[sea_orm(string_value = "intake")]
    Intake,
    #[sea_orm(string_value = "analysis")]
    Analysis,
    #[sea_orm(string_value = "review")]
    Review,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "implemented")]
    Implemented,
    #[sea_orm(string_value = "closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "approval_chain_status")]
pub enum ApprovalChainStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "superseded")]
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "approval_step_status")]
pub enum ApprovalStepStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "quorum_mode")]
pub enum QuorumMode {
    #[sea_orm(string_value = "all")]
    All,
    #[sea_orm(string_value = "any")]
    Any,
}

/// Maps each listed variant one-to-one between a database enum and its
/// domain counterpart, in both directions.
macro_rules! mirror_enum {
    ($db:ident <=> $domain:ident { $($variant:ident),+ $(,)? }) => {
        impl From<$db> for $domain {
            fn from(value: $db) -> Self {
                match value {
                    $($db::$variant => Self::$variant,)+
                }
            }
        }

        impl From<$domain> for $db {
            fn from(value: $domain) -> Self {
                match value {
                    $($domain::$variant => Self::$variant,)+
                }
            }
        }
    };
}

mirror_enum!(DecisionStatus <=> DomainDecisionStatus {
    Draft, Submitted, Approved, Rejected, Rework
});
mirror_enum!(DeliveryStatus <=> Lane {
    Intake, Analysis, Review, InProgress, Implemented, Closed
});
mirror_enum!(ApprovalChainStatus <=> DomainChainStatus { Active, Superseded });
mirror_enum!(ApprovalStepStatus <=> DomainStepStatus { Pending, Approved, Rejected });
mirror_enum!(QuorumMode <=> DomainQuorumMode { All, Any });
