//! Approver-group expansion.
//!
//! The canonical membership shape is group → approver → user. Organizations
//! migrated from older setups may still hold direct group → user rows; those
//! are read through a separate expander and composed with
//! [`FallbackGroupExpander`].

use std::collections::BTreeSet;
use std::sync::Arc;

use steerco_shared::types::{ApprovalGroupId, UserId};

use crate::governance::error::GovernanceError;

/// Resolves a group into its active users.
///
/// An empty set is a valid answer; the chain builder decides what to do
/// with groups that resolve to nobody.
pub trait GroupExpander: Send + Sync {
    /// Active users of a group.
    fn expand(
        &self,
        group_id: ApprovalGroupId,
    ) -> impl std::future::Future<Output = Result<BTreeSet<UserId>, GovernanceError>> + Send;
}

impl<T: GroupExpander> GroupExpander for Arc<T> {
    fn expand(
        &self,
        group_id: ApprovalGroupId,
    ) -> impl std::future::Future<Output = Result<BTreeSet<UserId>, GovernanceError>> + Send {
        self.as_ref().expand(group_id)
    }
}

/// Canonical expander with an optional legacy fallback.
///
/// The primary set wins when non-empty; otherwise the legacy set (if a
/// legacy expander is configured) is returned.
#[derive(Debug, Clone)]
pub struct FallbackGroupExpander<P, L> {
    primary: P,
    legacy: Option<L>,
}

impl<P: GroupExpander, L: GroupExpander> FallbackGroupExpander<P, L> {
    /// Creates an expander; pass `None` to ignore legacy memberships.
    #[must_use]
    pub fn new(primary: P, legacy: Option<L>) -> Self {
        Self { primary, legacy }
    }
}

impl<P: GroupExpander, L: GroupExpander> GroupExpander for FallbackGroupExpander<P, L> {
    async fn expand(&self, group_id: ApprovalGroupId) -> Result<BTreeSet<UserId>, GovernanceError> {
        let users = self.primary.expand(group_id).await?;
        if !users.is_empty() {
            return Ok(users);
        }

        match &self.legacy {
            Some(legacy) => {
                let users = legacy.expand(group_id).await?;
                if !users.is_empty() {
                    tracing::debug!(
                        group_id = %group_id,
                        members = users.len(),
                        "Group resolved through legacy membership"
                    );
                }
                Ok(users)
            }
            None => Ok(BTreeSet::new()),
        }
    }
}
