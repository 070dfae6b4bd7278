//! Amount-banded approval rules.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use steerco_shared::types::{ApprovalGroupId, ApprovalRuleId, OrganizationId, UserId};

use crate::governance::error::GovernanceError;

/// Who a rule names as approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ApproverRef {
    /// A single user.
    User(UserId),
    /// A group, expanded at build time.
    Group(ApprovalGroupId),
}

/// An organization-owned approval rule.
///
/// A rule applies when the amount lies in the closed band
/// `[min_amount, max_amount]`; an absent maximum means unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRule {
    /// Rule ID.
    pub id: ApprovalRuleId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Step number the rule contributes to.
    pub step: i32,
    /// Role label, used as the step's display name.
    pub approval_role: String,
    /// Approver reference.
    pub approver: ApproverRef,
    /// Inclusive lower bound.
    pub min_amount: Decimal,
    /// Inclusive upper bound, if any.
    pub max_amount: Option<Decimal>,
    /// Artifact type token as stored (canonical or alias).
    pub artifact_type: String,
    /// Inactive rules are ignored.
    pub is_active: bool,
}

impl ApprovalRule {
    /// Returns true if the rule's band contains `amount`.
    #[must_use]
    pub fn covers(&self, amount: Decimal) -> bool {
        amount >= self.min_amount && self.max_amount.is_none_or(|max| amount <= max)
    }
}

/// Read access to approval rules.
///
/// Implemented by the db crate; rules are never written by the engine.
pub trait RuleRepository: Send + Sync {
    /// Active rules of an organization for one artifact-type token.
    fn active_rules(
        &self,
        organization_id: OrganizationId,
        artifact_type: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ApprovalRule>, GovernanceError>> + Send;
}
