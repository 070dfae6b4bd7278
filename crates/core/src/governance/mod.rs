//! Change request governance.
//!
//! This module implements the decision lifecycle of change requests:
//! - Decision statuses, delivery lanes and the lane-move rule
//! - Approval rules, group expansion and approval chain construction
//! - Optimistic concurrency on the `updated_at` token
//! - The decision engine (submit, decide, request changes, lane moves, edits)
//! - Best-effort audit, scoring and notification side effects
//!
//! Persistence and delivery sit behind port traits. [`memory`] provides an
//! in-memory implementation of every port.

pub mod audit;
pub mod chain;
pub mod change;
pub mod engine;
pub mod error;
pub mod groups;
pub mod guard;
pub mod memory;
pub mod notify;
pub mod outcome;
pub mod rules;
pub mod scoring;
pub mod transition;
pub mod types;

#[cfg(test)]
mod chain_props;
#[cfg(test)]
mod engine_tests;
#[cfg(test)]
mod transition_props;

pub use audit::{AuditEvent, AuditLog, AuditSink, GovernanceEvent, TimelineEvent, TransitionRecord};
pub use chain::{
    ApprovalChain, ApprovalChainBuilder, ApprovalStep, Approver, BuiltChain, ChainDefaults,
    ChainInsert, ChainPlan, ChainRequest, ChainStore, ChainView, NewApprovalChain, PlannedStep,
    StepView,
};
pub use change::{ChangeEdit, ChangeRequest, NewChangeRequest, amount_from_impact};
pub use engine::{DecisionEngine, GovernancePorts};
pub use error::{ErrorCategory, GovernanceError};
pub use groups::{FallbackGroupExpander, GroupExpander};
pub use guard::{CasOutcome, ChangeStore, ConcurrencyGuard, DeleteOutcome, next_version, truncate_to_micros};
pub use memory::{InMemoryGovernance, InMemoryPorts, in_memory_engine};
pub use notify::{LogNotifier, NotificationEvent, Notifier};
pub use outcome::{Outcome, Warning, WarningKind};
pub use rules::{ApprovalRule, ApproverRef, RuleRepository};
pub use scoring::{ScoreRecalculator, impact_score};
pub use transition::TransitionValidator;
pub use types::{
    Actor, ArtifactType, ChainStatus, DecisionOutcome, DecisionStatus, Lane, ProjectRole,
    QuorumMode, StepStatus,
};
