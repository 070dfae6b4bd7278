//! Optimistic concurrency for change-request writes.
//!
//! The version token is `updated_at`, truncated to microseconds so it
//! survives a round trip through PostgreSQL `timestamptz`. Every write is a
//! compare-and-swap on the token loaded at the start of the operation.

use chrono::{DateTime, Duration, SubsecRound, Utc};

use steerco_shared::types::{ChangeRequestId, OrganizationId};

use crate::governance::change::ChangeRequest;
use crate::governance::error::GovernanceError;

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The row matched the expected token and was written.
    Applied(ChangeRequest),
    /// The token did not match; carries the current token if the row exists.
    Stale(Option<DateTime<Utc>>),
}

/// Result of a conditional delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The row was deleted.
    Deleted,
    /// The token did not match; carries the current token if the row exists.
    Stale(Option<DateTime<Utc>>),
}

/// Persistence of change requests.
pub trait ChangeStore: Send + Sync {
    /// Loads a change by ID.
    fn get(
        &self,
        id: ChangeRequestId,
    ) -> impl std::future::Future<Output = Result<Option<ChangeRequest>, GovernanceError>> + Send;

    /// Inserts a new change.
    fn insert(
        &self,
        change: ChangeRequest,
    ) -> impl std::future::Future<Output = Result<ChangeRequest, GovernanceError>> + Send;

    /// Replaces the row with `next` if its token still equals `expected`.
    fn compare_and_swap(
        &self,
        expected: DateTime<Utc>,
        next: ChangeRequest,
    ) -> impl std::future::Future<Output = Result<CasOutcome, GovernanceError>> + Send;

    /// Deletes the row if its token still equals `expected`.
    fn delete_if_version(
        &self,
        id: ChangeRequestId,
        expected: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<DeleteOutcome, GovernanceError>> + Send;
}

/// Truncates a timestamp to microsecond precision.
#[must_use]
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Next token for a row: now, or one microsecond past the previous token if
/// the clock has not moved beyond it.
#[must_use]
pub fn next_version(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate_to_micros(now);
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Compare-and-swap wrapper around a [`ChangeStore`].
pub struct ConcurrencyGuard<'a, S> {
    store: &'a S,
}

impl<'a, S: ChangeStore> ConcurrencyGuard<'a, S> {
    /// Creates a guard over a store.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Loads a change visible to `organization_id`.
    ///
    /// Changes of other organizations are reported as not found.
    pub async fn load(
        &self,
        id: ChangeRequestId,
        organization_id: OrganizationId,
    ) -> Result<ChangeRequest, GovernanceError> {
        match self.store.get(id).await? {
            Some(change) if change.organization_id == organization_id => Ok(change),
            _ => Err(GovernanceError::ChangeNotFound(id)),
        }
    }

    /// Fails with a version conflict if the caller's token is stale.
    pub fn check(
        &self,
        expected: Option<DateTime<Utc>>,
        current: &ChangeRequest,
    ) -> Result<(), GovernanceError> {
        match expected {
            Some(expected) if truncate_to_micros(expected) != current.updated_at => {
                Err(GovernanceError::VersionConflict {
                    expected,
                    current: current.updated_at,
                })
            }
            _ => Ok(()),
        }
    }

    /// Applies `mutate` to a copy of `current` and writes it conditioned on
    /// `current`'s token.
    ///
    /// # Errors
    ///
    /// `VersionConflict` if the caller's token is stale or another writer
    /// committed first (carrying the post-write token); `ChangeNotFound` if
    /// the row was deleted meanwhile.
    pub async fn commit(
        &self,
        expected: Option<DateTime<Utc>>,
        current: &ChangeRequest,
        mutate: impl FnOnce(&mut ChangeRequest),
    ) -> Result<ChangeRequest, GovernanceError> {
        self.check(expected, current)?;

        let mut next = current.clone();
        mutate(&mut next);
        next.id = current.id;
        next.organization_id = current.organization_id;
        next.updated_at = next_version(current.updated_at, Utc::now());

        match self.store.compare_and_swap(current.updated_at, next).await? {
            CasOutcome::Applied(change) => Ok(change),
            CasOutcome::Stale(Some(latest)) => {
                tracing::debug!(change_id = %current.id, "Lost compare-and-swap race");
                Err(GovernanceError::VersionConflict {
                    expected: expected.unwrap_or(current.updated_at),
                    current: latest,
                })
            }
            CasOutcome::Stale(None) => Err(GovernanceError::ChangeNotFound(current.id)),
        }
    }

    /// Deletes `current` conditioned on its token.
    pub async fn delete(
        &self,
        expected: Option<DateTime<Utc>>,
        current: &ChangeRequest,
    ) -> Result<(), GovernanceError> {
        self.check(expected, current)?;

        match self
            .store
            .delete_if_version(current.id, current.updated_at)
            .await?
        {
            DeleteOutcome::Deleted => Ok(()),
            DeleteOutcome::Stale(Some(latest)) => Err(GovernanceError::VersionConflict {
                expected: expected.unwrap_or(current.updated_at),
                current: latest,
            }),
            DeleteOutcome::Stale(None) => Err(GovernanceError::ChangeNotFound(current.id)),
        }
    }
}
