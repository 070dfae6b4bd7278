//! Entity re-exports.

pub use super::approval_chains::Entity as ApprovalChains;
pub use super::approval_group_members::Entity as ApprovalGroupMembers;
pub use super::approval_group_users::Entity as ApprovalGroupUsers;
pub use super::approval_groups::Entity as ApprovalGroups;
pub use super::approval_rules::Entity as ApprovalRules;
pub use super::approval_step_approvers::Entity as ApprovalStepApprovers;
pub use super::approval_steps::Entity as ApprovalSteps;
pub use super::approvers::Entity as Approvers;
pub use super::change_request_audit_events::Entity as ChangeRequestAuditEvents;
pub use super::change_request_timeline::Entity as ChangeRequestTimeline;
pub use super::change_requests::Entity as ChangeRequests;
