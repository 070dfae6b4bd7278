//! Closed vocabularies of the governance engine.
//!
//! Every external string (API payloads, stored columns, legacy rows) is
//! converted into one of these enums at the boundary. Business logic never
//! compares raw strings.

use serde::{Deserialize, Serialize};
use std::fmt;

use steerco_shared::types::{OrganizationId, UserId};

/// Normalizes a token: trims, lowercases and folds `-` and spaces into `_`.
fn fold(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Decision axis of a change request.
///
/// Valid movements:
/// - Draft / Rework → Submitted (submit)
/// - Submitted → Approved | Rejected | Rework (decide)
/// - Submitted → Rework (request changes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    /// Not yet submitted.
    Draft,
    /// Waiting on the approval chain; lane is locked.
    Submitted,
    /// Approved for delivery.
    Approved,
    /// Rejected; terminal.
    Rejected,
    /// Sent back for rework; may be resubmitted.
    Rework,
}

impl DecisionStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Rework => "rework",
        }
    }

    /// Parses a status strictly (case-insensitive, trimmed).
    pub fn parse(s: &str) -> Option<Self> {
        match fold(s).as_str() {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "rework" => Some(Self::Rework),
            _ => None,
        }
    }

    /// Lenient conversion for stored values: empty or unknown means draft.
    #[must_use]
    pub fn normalize(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Draft)
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery lane of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Captured, not yet analysed.
    Intake,
    /// Being analysed; the only lane a change can be submitted from.
    Analysis,
    /// Under review by the approval chain.
    Review,
    /// Approved and being delivered.
    InProgress,
    /// Delivered.
    Implemented,
    /// Closed out.
    Closed,
}

impl Lane {
    /// Lanes an approved change walks through, in order.
    pub const DELIVERY_ORDER: [Self; 4] = [
        Self::Review,
        Self::InProgress,
        Self::Implemented,
        Self::Closed,
    ];

    /// All lanes.
    pub const ALL: [Self; 6] = [
        Self::Intake,
        Self::Analysis,
        Self::Review,
        Self::InProgress,
        Self::Implemented,
        Self::Closed,
    ];

    /// Returns the string representation of the lane.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Analysis => "analysis",
            Self::Review => "review",
            Self::InProgress => "in_progress",
            Self::Implemented => "implemented",
            Self::Closed => "closed",
        }
    }

    /// Parses a lane, accepting `in-progress`, `in progress` and `inprogress`.
    pub fn parse(s: &str) -> Option<Self> {
        match fold(s).as_str() {
            "intake" => Some(Self::Intake),
            "analysis" => Some(Self::Analysis),
            "review" => Some(Self::Review),
            "in_progress" | "inprogress" => Some(Self::InProgress),
            "implemented" => Some(Self::Implemented),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Position in [`Lane::DELIVERY_ORDER`], if the lane is a delivery lane.
    #[must_use]
    pub fn delivery_index(&self) -> Option<usize> {
        Self::DELIVERY_ORDER.iter().position(|l| l == self)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome a reviewer can record on a submitted change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    /// Approve; the change moves to `in_progress`.
    Approved,
    /// Reject; the change returns to `analysis` and is terminal.
    Rejected,
    /// Send back for rework; the change returns to `analysis`.
    Rework,
}

impl DecisionOutcome {
    /// Returns the string representation of the outcome.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.decision().as_str()
    }

    /// Parses an outcome (`approve`/`approved`, `reject`/`rejected`, `rework`).
    pub fn parse(s: &str) -> Option<Self> {
        match fold(s).as_str() {
            "approve" | "approved" => Some(Self::Approved),
            "reject" | "rejected" => Some(Self::Rejected),
            "rework" => Some(Self::Rework),
            _ => None,
        }
    }

    /// Decision status recorded for this outcome.
    #[must_use]
    pub fn decision(&self) -> DecisionStatus {
        match self {
            Self::Approved => DecisionStatus::Approved,
            Self::Rejected => DecisionStatus::Rejected,
            Self::Rework => DecisionStatus::Rework,
        }
    }

    /// Lane the change lands in after this outcome.
    #[must_use]
    pub fn target_lane(&self) -> Lane {
        match self {
            Self::Approved => Lane::InProgress,
            Self::Rejected | Self::Rework => Lane::Analysis,
        }
    }
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of governed artifact an approval rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// Change request.
    Change,
    /// RAID log item.
    Raid,
    /// Project deliverable.
    Deliverable,
}

impl ArtifactType {
    /// Canonical token.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Raid => "raid",
            Self::Deliverable => "deliverable",
        }
    }

    /// Historical spellings still found in rule tables.
    #[must_use]
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Change => &["change_request"],
            Self::Raid => &["raid_item"],
            Self::Deliverable => &["artifact"],
        }
    }

    /// Keys to try when loading rules: canonical first, then aliases.
    #[must_use]
    pub fn lookup_keys(&self) -> Vec<&'static str> {
        std::iter::once(self.as_str())
            .chain(self.aliases().iter().copied())
            .collect()
    }

    /// Parses a canonical token or a known alias.
    pub fn parse(s: &str) -> Option<Self> {
        let folded = fold(s);
        [Self::Change, Self::Raid, Self::Deliverable]
            .into_iter()
            .find(|t| t.as_str() == folded || t.aliases().contains(&folded.as_str()))
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller's role on the project.
///
/// Roles are ordered from lowest to highest privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    /// Read-only access.
    Viewer = 0,
    /// Can create, edit, move and submit changes.
    Contributor = 1,
    /// Can record decisions on changes they are listed on.
    Approver = 2,
    /// Full governance authority.
    Owner = 3,
}

impl ProjectRole {
    /// Parses a role; `admin` maps to owner and `editor` to contributor.
    pub fn parse(s: &str) -> Option<Self> {
        match fold(s).as_str() {
            "viewer" => Some(Self::Viewer),
            "contributor" | "editor" => Some(Self::Contributor),
            "approver" => Some(Self::Approver),
            "owner" | "admin" => Some(Self::Owner),
            _ => None,
        }
    }

    /// Returns the string representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Contributor => "contributor",
            Self::Approver => "approver",
            Self::Owner => "owner",
        }
    }
}

impl fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a materialized approval chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    /// The chain currently governing the artifact.
    Active,
    /// Replaced by a newer chain.
    Superseded,
}

impl ChainStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Superseded => "superseded",
        }
    }

    /// Parses a chain status.
    pub fn parse(s: &str) -> Option<Self> {
        match fold(s).as_str() {
            "active" => Some(Self::Active),
            "superseded" => Some(Self::Superseded),
            _ => None,
        }
    }
}

/// Status of one approval step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Awaiting votes.
    Pending,
    /// Quorum reached.
    Approved,
    /// Rejection threshold reached.
    Rejected,
}

impl StepStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parses a step status.
    pub fn parse(s: &str) -> Option<Self> {
        match fold(s).as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// How many approvers of a step must approve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuorumMode {
    /// Every approver must approve.
    All,
    /// `min_approvals` approvals suffice.
    Any,
}

impl QuorumMode {
    /// Returns the string representation of the mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
        }
    }

    /// Parses a quorum mode.
    pub fn parse(s: &str) -> Option<Self> {
        match fold(s).as_str() {
            "all" => Some(Self::All),
            "any" => Some(Self::Any),
            _ => None,
        }
    }
}

/// The authenticated caller of a governance operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Acting user.
    pub user_id: UserId,
    /// Organization the caller is working in.
    pub organization_id: OrganizationId,
    /// Role on the project.
    pub role: ProjectRole,
}

impl Actor {
    /// Creates an actor.
    #[must_use]
    pub const fn new(user_id: UserId, organization_id: OrganizationId, role: ProjectRole) -> Self {
        Self {
            user_id,
            organization_id,
            role,
        }
    }
}
