//! Governance error types.
//!
//! Every failure of the engine is one variant of [`GovernanceError`], and every
//! variant belongs to exactly one [`ErrorCategory`] so the HTTP layer can map
//! it to a stable status code.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

use steerco_shared::AppError;
use steerco_shared::types::{ChangeRequestId, UserId};

use crate::governance::types::{DecisionStatus, Lane, ProjectRole};

/// Broad failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input, missing or unknown values.
    Validation,
    /// Actor lacks role or membership.
    Authorization,
    /// Change request does not exist in the caller's organization.
    NotFound,
    /// Illegal transition for the current state.
    Conflict,
    /// Stale version token.
    Concurrency,
    /// Organization setup cannot produce a usable approval chain.
    Configuration,
    /// Storage or other unexpected failure.
    Internal,
}

/// Errors that can occur during governance operations.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// A decision was recorded without a rationale.
    #[error("A rationale is required to record a decision")]
    RationaleRequired,

    /// A field carried a value of the wrong shape.
    #[error("Invalid value for field {field}: {reason}")]
    InvalidField {
        /// Offending field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A value did not belong to its closed vocabulary.
    #[error("Unknown {kind} value '{value}'")]
    UnknownValue {
        /// Vocabulary name (lane, outcome, ...).
        kind: &'static str,
        /// Rejected input.
        value: String,
    },

    /// Patch named system-maintained fields.
    #[error("Fields are read-only: {}", fields.join(", "))]
    ReadOnlyFields {
        /// Offending fields.
        fields: Vec<String>,
    },

    /// Patch named fields that do not exist.
    #[error("Unknown fields: {}", fields.join(", "))]
    UnknownFields {
        /// Offending fields.
        fields: Vec<String>,
    },

    /// Governance configuration could not be turned into chain defaults.
    #[error("Invalid governance configuration: {0}")]
    InvalidConfig(String),

    /// Actor's role is below the required one.
    #[error("Role {role} cannot perform this action; {required} required")]
    NotAuthorized {
        /// Actor's role.
        role: ProjectRole,
        /// Minimum role for the action.
        required: ProjectRole,
    },

    /// Actor is not an approver on the active chain.
    #[error("User {user_id} is not an approver on the active approval chain")]
    NotAnApprover {
        /// Acting user.
        user_id: UserId,
    },

    /// Change request not found.
    #[error("Change request {0} not found")]
    ChangeNotFound(ChangeRequestId),

    /// Change is not in the lane the operation requires.
    #[error("Change must be in lane {expected} but is in {actual} (decision {decision})")]
    LaneMismatch {
        /// Required lane.
        expected: Lane,
        /// Current lane.
        actual: Lane,
        /// Current decision.
        decision: DecisionStatus,
    },

    /// Decision operations require a submitted change.
    #[error("Change is not submitted (decision {decision}, lane {lane})")]
    NotSubmitted {
        /// Current decision.
        decision: DecisionStatus,
        /// Current lane.
        lane: Lane,
    },

    /// A decision has already been recorded.
    #[error("Change has already been decided ({decision})")]
    AlreadyDecided {
        /// Current decision.
        decision: DecisionStatus,
    },

    /// The lane move is not allowed for the current decision.
    #[error("Cannot move from {from} to {to} while decision is {decision}")]
    IllegalLaneMove {
        /// Current decision.
        decision: DecisionStatus,
        /// Current lane.
        from: Lane,
        /// Requested lane.
        to: Lane,
    },

    /// Submitted changes cannot be edited or moved.
    #[error("Change is locked while submitted for approval (lane {lane})")]
    LockedWhileSubmitted {
        /// Current lane.
        lane: Lane,
    },

    /// Patch tried to write governance fields.
    #[error("Governance fields can only change through governance actions: {}", fields.join(", "))]
    GovernanceFieldsProtected {
        /// Offending fields.
        fields: Vec<String>,
    },

    /// Only draft changes in intake or analysis can be deleted.
    #[error("Change cannot be deleted (decision {decision}, lane {lane})")]
    NotDeletable {
        /// Current decision.
        decision: DecisionStatus,
        /// Current lane.
        lane: Lane,
    },

    /// Supplied version token is stale.
    #[error("Version conflict: expected {expected}, current {current}")]
    VersionConflict {
        /// Token the caller supplied.
        expected: DateTime<Utc>,
        /// Token currently persisted.
        current: DateTime<Utc>,
    },

    /// Organization has no active rules for the artifact type or its aliases.
    #[error("No active approval rules configured for artifact type {artifact_type}")]
    NoApprovalRules {
        /// Canonical artifact type.
        artifact_type: String,
    },

    /// Rules exist but none covers the amount.
    #[error("No approval rule for artifact type {artifact_type} covers amount {amount}")]
    NoMatchingRules {
        /// Resolved artifact type.
        artifact_type: String,
        /// Change amount.
        amount: Decimal,
    },

    /// Matching rules produced no linkable users.
    #[error(
        "Approval rules for {artifact_type} at amount {amount} resolve to no approvers; check group memberships and approver accounts"
    )]
    NoApprovers {
        /// Resolved artifact type.
        artifact_type: String,
        /// Change amount.
        amount: Decimal,
    },

    /// One step resolved to nobody.
    #[error("Approval step {step} ({name}) resolves to no approvers")]
    StepWithoutApprovers {
        /// Step order.
        step: i32,
        /// Step name.
        name: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl GovernanceError {
    /// Returns the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RationaleRequired
            | Self::InvalidField { .. }
            | Self::UnknownValue { .. }
            | Self::ReadOnlyFields { .. }
            | Self::UnknownFields { .. }
            | Self::InvalidConfig(_) => ErrorCategory::Validation,

            Self::NotAuthorized { .. } | Self::NotAnApprover { .. } => {
                ErrorCategory::Authorization
            }

            Self::ChangeNotFound(_) => ErrorCategory::NotFound,

            Self::LaneMismatch { .. }
            | Self::NotSubmitted { .. }
            | Self::AlreadyDecided { .. }
            | Self::IllegalLaneMove { .. }
            | Self::LockedWhileSubmitted { .. }
            | Self::GovernanceFieldsProtected { .. }
            | Self::NotDeletable { .. } => ErrorCategory::Conflict,

            Self::VersionConflict { .. } => ErrorCategory::Concurrency,

            Self::NoApprovalRules { .. }
            | Self::NoMatchingRules { .. }
            | Self::NoApprovers { .. }
            | Self::StepWithoutApprovers { .. } => ErrorCategory::Configuration,

            Self::Database(_) => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Validation => 400,
            ErrorCategory::Authorization => 403,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Conflict | ErrorCategory::Concurrency => 409,
            ErrorCategory::Configuration => 422,
            ErrorCategory::Internal => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RationaleRequired => "RATIONALE_REQUIRED",
            Self::InvalidField { .. } => "INVALID_FIELD",
            Self::UnknownValue { .. } => "UNKNOWN_VALUE",
            Self::ReadOnlyFields { .. } => "READ_ONLY_FIELDS",
            Self::UnknownFields { .. } => "UNKNOWN_FIELDS",
            Self::InvalidConfig(_) => "INVALID_GOVERNANCE_CONFIG",
            Self::NotAuthorized { .. } => "INSUFFICIENT_ROLE",
            Self::NotAnApprover { .. } => "NOT_AN_APPROVER",
            Self::ChangeNotFound(_) => "CHANGE_NOT_FOUND",
            Self::LaneMismatch { .. } => "LANE_MISMATCH",
            Self::NotSubmitted { .. } => "NOT_SUBMITTED",
            Self::AlreadyDecided { .. } => "ALREADY_DECIDED",
            Self::IllegalLaneMove { .. } => "ILLEGAL_LANE_MOVE",
            Self::LockedWhileSubmitted { .. } => "LOCKED_WHILE_SUBMITTED",
            Self::GovernanceFieldsProtected { .. } => "GOVERNANCE_FIELDS_PROTECTED",
            Self::NotDeletable { .. } => "NOT_DELETABLE",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::NoApprovalRules { .. } => "NO_APPROVAL_RULES",
            Self::NoMatchingRules { .. } => "NO_MATCHING_APPROVAL_RULES",
            Self::NoApprovers { .. } => "NO_APPROVERS",
            Self::StepWithoutApprovers { .. } => "STEP_WITHOUT_APPROVERS",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Structured context for the caller: current state for conflicts,
    /// both tokens for version conflicts, setup details for configuration errors.
    #[must_use]
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::InvalidField { field, .. } => json!({ "field": field }),
            Self::UnknownValue { kind, value } => json!({ "kind": kind, "value": value }),
            Self::ReadOnlyFields { fields }
            | Self::UnknownFields { fields }
            | Self::GovernanceFieldsProtected { fields } => json!({ "fields": fields }),
            Self::NotAuthorized { role, required } => {
                json!({ "role": role, "required_role": required })
            }
            Self::NotAnApprover { user_id } => json!({ "user_id": user_id }),
            Self::ChangeNotFound(id) => json!({ "change_id": id }),
            Self::LaneMismatch {
                expected,
                actual,
                decision,
            } => json!({
                "expected_lane": expected,
                "decision_status": decision,
                "delivery_status": actual,
            }),
            Self::NotSubmitted { decision, lane } | Self::NotDeletable { decision, lane } => {
                json!({ "decision_status": decision, "delivery_status": lane })
            }
            Self::AlreadyDecided { decision } => json!({ "decision_status": decision }),
            Self::IllegalLaneMove { decision, from, to } => json!({
                "decision_status": decision,
                "delivery_status": from,
                "requested_lane": to,
            }),
            Self::LockedWhileSubmitted { lane } => json!({
                "decision_status": DecisionStatus::Submitted,
                "delivery_status": lane,
            }),
            Self::VersionConflict { expected, current } => json!({
                "expected_version": expected.to_rfc3339(),
                "current_version": current.to_rfc3339(),
            }),
            Self::NoApprovalRules { artifact_type } => json!({ "artifact_type": artifact_type }),
            Self::NoMatchingRules {
                artifact_type,
                amount,
            }
            | Self::NoApprovers {
                artifact_type,
                amount,
            } => json!({ "artifact_type": artifact_type, "amount": amount.to_string() }),
            Self::StepWithoutApprovers { step, name } => json!({ "step": step, "name": name }),
            Self::RationaleRequired | Self::InvalidConfig(_) | Self::Database(_) => json!({}),
        }
    }
}

impl From<GovernanceError> for AppError {
    fn from(err: GovernanceError) -> Self {
        let message = err.to_string();
        match err.category() {
            ErrorCategory::Validation => Self::Validation(message),
            ErrorCategory::Authorization => Self::Forbidden(message),
            ErrorCategory::NotFound => Self::NotFound(message),
            ErrorCategory::Conflict | ErrorCategory::Concurrency => Self::Conflict(message),
            ErrorCategory::Configuration => Self::Configuration(message),
            ErrorCategory::Internal => Self::Database(message),
        }
    }
}
