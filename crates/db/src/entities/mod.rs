//! `SeaORM` entity definitions for the governance schema.

pub mod prelude;

pub mod approval_chains;
pub mod approval_group_members;
pub mod approval_group_users;
pub mod approval_groups;
pub mod approval_rules;
pub mod approval_step_approvers;
pub mod approval_steps;
pub mod approvers;
pub mod change_request_audit_events;
pub mod change_request_timeline;
pub mod change_requests;
pub mod sea_orm_active_enums;
