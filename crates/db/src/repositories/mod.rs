//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.
//! Each one implements a governance port from `steerco-core`.

pub mod approval_chain;
pub mod approval_group;
pub mod approval_rule;
pub mod audit;
pub mod change_request;

pub use approval_chain::ApprovalChainRepository;
pub use approval_group::{ApprovalGroupRepository, LegacyGroupMembershipAdapter};
pub use approval_rule::ApprovalRuleRepository;
pub use audit::AuditRepository;
pub use change_request::ChangeRequestRepository;

use sea_orm::DbErr;
use steerco_core::governance::error::GovernanceError;

/// Maps a database error into the engine's internal error.
pub(crate) fn db_err(err: DbErr) -> GovernanceError {
    GovernanceError::Database(err.to_string())
}
