//! Approval chain construction.
//!
//! A chain is built in two phases. Resolution (rule lookup, band filtering,
//! group expansion, de-duplication, emptiness checks) touches no storage
//! writes, so configuration errors leave nothing behind. Materialization then
//! supersedes the previous active chain, inserts the new one, and adopts a
//! concurrently created chain instead of failing when the store reports that
//! an active chain already exists.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use steerco_shared::GovernanceConfig;
use steerco_shared::types::{
    ApprovalChainId, ApprovalGroupId, ApprovalRuleId, ApprovalStepId, OrganizationId, ProjectId,
    UserId,
};

use crate::governance::error::GovernanceError;
use crate::governance::groups::GroupExpander;
use crate::governance::outcome::{Outcome, Warning, WarningKind};
use crate::governance::rules::{ApprovalRule, ApproverRef, RuleRepository};
use crate::governance::types::{ArtifactType, ChainStatus, QuorumMode, StepStatus};

/// Approver type written on every approver row.
pub const APPROVER_TYPE_USER: &str = "user";

/// How often materialization retries when the active chain it collided with
/// disappears before it can be adopted.
const MAX_CREATE_ATTEMPTS: usize = 3;

/// A materialized approval chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalChain {
    /// Chain ID.
    pub id: ApprovalChainId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Governed artifact (the change request ID for changes).
    pub artifact_id: Uuid,
    /// Project of the artifact.
    pub project_id: ProjectId,
    /// Artifact type the rules were resolved under.
    pub artifact_type: String,
    /// Amount the chain was built for.
    pub amount: Decimal,
    /// Active or superseded.
    pub status: ChainStatus,
    /// Who triggered the build.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// One ordered step of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    /// Step ID.
    pub id: ApprovalStepId,
    /// Parent chain.
    pub chain_id: ApprovalChainId,
    /// Position, strictly increasing from 1.
    pub step_order: i32,
    /// Display name.
    pub name: String,
    /// Quorum mode.
    pub quorum_mode: QuorumMode,
    /// Approvals needed.
    pub min_approvals: i32,
    /// Rejections that fail the step.
    pub max_rejections: i32,
    /// Current status.
    pub status: StepStatus,
}

/// An approver attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    /// Row ID.
    pub id: Uuid,
    /// Parent step.
    pub step_id: ApprovalStepId,
    /// Always [`APPROVER_TYPE_USER`].
    pub approver_type: String,
    /// Approving user.
    pub approver_ref: UserId,
    /// Whether the approval is required.
    pub required: bool,
    /// Whether the approver still counts.
    pub active: bool,
}

/// Input for inserting a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApprovalChain {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Governed artifact.
    pub artifact_id: Uuid,
    /// Project of the artifact.
    pub project_id: ProjectId,
    /// Resolved artifact type.
    pub artifact_type: String,
    /// Amount.
    pub amount: Decimal,
    /// Who triggered the build.
    pub created_by: UserId,
}

/// Result of inserting an active chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainInsert {
    /// The chain was inserted.
    Created(ApprovalChain),
    /// Another active chain exists for the artifact.
    AlreadyActive,
}

/// Storage of chains, steps and approvers.
///
/// Implementations must enforce at most one active chain per artifact and
/// report a violation as [`ChainInsert::AlreadyActive`].
pub trait ChainStore: Send + Sync {
    /// Marks the artifact's active chain superseded; returns rows affected.
    fn supersede_active(
        &self,
        artifact_id: Uuid,
    ) -> impl std::future::Future<Output = Result<u64, GovernanceError>> + Send;

    /// Inserts a chain with status active.
    fn insert_active(
        &self,
        chain: NewApprovalChain,
    ) -> impl std::future::Future<Output = Result<ChainInsert, GovernanceError>> + Send;

    /// The artifact's active chain, if any.
    fn find_active(
        &self,
        artifact_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ApprovalChain>, GovernanceError>> + Send;

    /// Steps of a chain ordered by `step_order`.
    fn list_steps(
        &self,
        chain_id: ApprovalChainId,
    ) -> impl std::future::Future<Output = Result<Vec<ApprovalStep>, GovernanceError>> + Send;

    /// Inserts steps with their approvers atomically.
    ///
    /// If the chain already received steps concurrently, returns those instead.
    fn insert_steps(
        &self,
        chain_id: ApprovalChainId,
        steps: &[PlannedStep],
    ) -> impl std::future::Future<Output = Result<Vec<ApprovalStep>, GovernanceError>> + Send;

    /// Approvers of the given steps.
    fn list_approvers(
        &self,
        step_ids: &[ApprovalStepId],
    ) -> impl std::future::Future<Output = Result<Vec<Approver>, GovernanceError>> + Send;
}

/// Quorum settings stamped on new steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainDefaults {
    /// Quorum mode.
    pub quorum_mode: QuorumMode,
    /// Approvals needed in `Any` mode.
    pub min_approvals: i32,
    /// Rejections that fail a step.
    pub max_rejections: i32,
}

impl Default for ChainDefaults {
    fn default() -> Self {
        Self {
            quorum_mode: QuorumMode::Any,
            min_approvals: 1,
            max_rejections: 1,
        }
    }
}

impl ChainDefaults {
    /// Builds defaults from configuration.
    pub fn from_config(config: &GovernanceConfig) -> Result<Self, GovernanceError> {
        let quorum_mode = QuorumMode::parse(&config.quorum_mode).ok_or_else(|| {
            GovernanceError::InvalidConfig(format!(
                "unknown quorum mode '{}'",
                config.quorum_mode
            ))
        })?;
        if config.min_approvals < 1 {
            return Err(GovernanceError::InvalidConfig(
                "min_approvals must be at least 1".to_string(),
            ));
        }
        if config.max_rejections < 1 {
            return Err(GovernanceError::InvalidConfig(
                "max_rejections must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            quorum_mode,
            min_approvals: config.min_approvals,
            max_rejections: config.max_rejections,
        })
    }
}

/// A step resolved from rules, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    /// Position in the chain, from 1.
    pub step_order: i32,
    /// Rule step number it came from.
    pub rule_step: i32,
    /// Display name.
    pub name: String,
    /// Quorum mode.
    pub quorum_mode: QuorumMode,
    /// Approvals needed.
    pub min_approvals: i32,
    /// Rejections that fail the step.
    pub max_rejections: i32,
    /// De-duplicated approvers, in rule order.
    pub approvers: Vec<UserId>,
}

/// Resolution result: what a build would create.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainPlan {
    /// Artifact-type token the rules were found under.
    pub resolved_type: String,
    /// Amount used for banding.
    pub amount: Decimal,
    /// Rules that matched the amount.
    pub rule_ids: Vec<ApprovalRuleId>,
    /// Steps in order.
    pub steps: Vec<PlannedStep>,
}

impl ChainPlan {
    /// Distinct approvers across all steps, in step order.
    #[must_use]
    pub fn approvers(&self) -> Vec<UserId> {
        distinct(self.steps.iter().flat_map(|s| s.approvers.iter().copied()))
    }
}

/// Input of a build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainRequest {
    /// Organization whose rules apply.
    pub organization_id: OrganizationId,
    /// Governed artifact.
    pub artifact_id: Uuid,
    /// Project of the artifact.
    pub project_id: ProjectId,
    /// Who triggers the build.
    pub actor_id: UserId,
    /// Amount for banding.
    pub amount: Decimal,
    /// Artifact type.
    pub artifact_type: ArtifactType,
}

/// Result of a build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltChain {
    /// Active chain.
    pub chain_id: ApprovalChainId,
    /// Its steps in order.
    pub step_ids: Vec<ApprovalStepId>,
    /// Artifact-type token the rules were found under.
    pub resolved_type: String,
    /// True if a concurrently created chain was adopted.
    pub reused: bool,
    /// Distinct approvers across the chain.
    pub approvers: Vec<UserId>,
}

/// A step with its approvers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    /// Step.
    #[serde(flatten)]
    pub step: ApprovalStep,
    /// Approvers.
    pub approvers: Vec<Approver>,
}

/// An active chain with steps and approvers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainView {
    /// Chain.
    pub chain: ApprovalChain,
    /// Steps in order.
    pub steps: Vec<StepView>,
}

impl ChainView {
    /// Returns true if `user` is an active approver on any step.
    #[must_use]
    pub fn has_active_approver(&self, user: UserId) -> bool {
        self.steps
            .iter()
            .flat_map(|s| &s.approvers)
            .any(|a| a.active && a.approver_ref == user)
    }
}

fn distinct(users: impl Iterator<Item = UserId>) -> Vec<UserId> {
    let mut seen = HashSet::new();
    users.filter(|u| seen.insert(*u)).collect()
}

/// Groups matching rules into ordered steps and attaches de-duplicated approvers.
///
/// Steps are ordered by rule step number and renumbered from 1. Each step's
/// name is the first rule's role label, or `Step {n}` when blank.
#[must_use]
pub fn assemble_steps(
    rules: &[ApprovalRule],
    expansions: &HashMap<ApprovalGroupId, BTreeSet<UserId>>,
    defaults: &ChainDefaults,
) -> Vec<PlannedStep> {
    let mut by_step: BTreeMap<i32, Vec<&ApprovalRule>> = BTreeMap::new();
    for rule in rules {
        by_step.entry(rule.step).or_default().push(rule);
    }

    by_step
        .into_iter()
        .zip(1..)
        .map(|((rule_step, step_rules), step_order)| {
            let name = step_rules
                .first()
                .map(|r| r.approval_role.trim())
                .filter(|label| !label.is_empty())
                .map_or_else(|| format!("Step {step_order}"), str::to_string);

            let approvers = distinct(step_rules.iter().flat_map(|rule| match rule.approver {
                ApproverRef::User(user) => vec![user],
                ApproverRef::Group(group) => expansions
                    .get(&group)
                    .map(|users| users.iter().copied().collect())
                    .unwrap_or_default(),
            }));

            let min_approvals = match defaults.quorum_mode {
                QuorumMode::Any => defaults.min_approvals,
                QuorumMode::All => i32::try_from(approvers.len()).unwrap_or(i32::MAX),
            };

            PlannedStep {
                step_order,
                rule_step,
                name,
                quorum_mode: defaults.quorum_mode,
                min_approvals,
                max_rejections: defaults.max_rejections,
                approvers,
            }
        })
        .collect()
}

/// Builds approval chains from organization rules.
pub struct ApprovalChainBuilder<'a, R, G, C> {
    rules: &'a R,
    groups: &'a G,
    chains: &'a C,
    defaults: ChainDefaults,
}

impl<'a, R, G, C> ApprovalChainBuilder<'a, R, G, C>
where
    R: RuleRepository,
    G: GroupExpander,
    C: ChainStore,
{
    /// Creates a builder over the given ports.
    pub fn new(rules: &'a R, groups: &'a G, chains: &'a C, defaults: ChainDefaults) -> Self {
        Self {
            rules,
            groups,
            chains,
            defaults,
        }
    }

    /// Resolves the chain a build would create, without writing anything.
    ///
    /// # Errors
    ///
    /// Configuration errors when no rule applies or the rules resolve to
    /// nobody; storage errors from the ports.
    pub async fn preview(&self, request: &ChainRequest) -> Result<ChainPlan, GovernanceError> {
        let mut resolved = None;
        for key in request.artifact_type.lookup_keys() {
            let rules: Vec<ApprovalRule> = self
                .rules
                .active_rules(request.organization_id, key)
                .await?
                .into_iter()
                .filter(|r| r.is_active)
                .collect();
            if !rules.is_empty() {
                resolved = Some((key, rules));
                break;
            }
        }

        let Some((resolved_type, rules)) = resolved else {
            return Err(GovernanceError::NoApprovalRules {
                artifact_type: request.artifact_type.as_str().to_string(),
            });
        };

        let matching: Vec<ApprovalRule> = rules
            .into_iter()
            .filter(|r| r.covers(request.amount))
            .collect();
        if matching.is_empty() {
            return Err(GovernanceError::NoMatchingRules {
                artifact_type: resolved_type.to_string(),
                amount: request.amount,
            });
        }

        let group_ids: BTreeSet<ApprovalGroupId> = matching
            .iter()
            .filter_map(|r| match r.approver {
                ApproverRef::Group(group) => Some(group),
                ApproverRef::User(_) => None,
            })
            .collect();

        let mut expansions = HashMap::new();
        for group_id in group_ids {
            let users = self.groups.expand(group_id).await?;
            if users.is_empty() {
                tracing::debug!(group_id = %group_id, "Approver group has no active members");
            }
            expansions.insert(group_id, users);
        }

        let steps = assemble_steps(&matching, &expansions, &self.defaults);

        if steps.iter().all(|s| s.approvers.is_empty()) {
            return Err(GovernanceError::NoApprovers {
                artifact_type: resolved_type.to_string(),
                amount: request.amount,
            });
        }
        if let Some(empty) = steps.iter().find(|s| s.approvers.is_empty()) {
            return Err(GovernanceError::StepWithoutApprovers {
                step: empty.step_order,
                name: empty.name.clone(),
            });
        }

        Ok(ChainPlan {
            resolved_type: resolved_type.to_string(),
            amount: request.amount,
            rule_ids: matching.iter().map(|r| r.id).collect(),
            steps,
        })
    }

    /// Builds and persists the active chain for an artifact.
    ///
    /// Supersession of the previous chain is best-effort and reported as a
    /// warning. If another caller created the active chain first, that chain
    /// is adopted; steps are only inserted when it has none.
    pub async fn build(
        &self,
        request: &ChainRequest,
    ) -> Result<Outcome<BuiltChain>, GovernanceError> {
        let plan = self.preview(request).await?;
        let mut warnings = Vec::new();

        match self.chains.supersede_active(request.artifact_id).await {
            Ok(0) => {}
            Ok(count) => {
                tracing::debug!(artifact_id = %request.artifact_id, count, "Superseded active approval chain");
            }
            Err(e) => {
                tracing::warn!(
                    artifact_id = %request.artifact_id,
                    error = %e,
                    "Failed to supersede active approval chain"
                );
                warnings.push(Warning::new(WarningKind::Supersede, e.to_string()));
            }
        }

        let new_chain = NewApprovalChain {
            organization_id: request.organization_id,
            artifact_id: request.artifact_id,
            project_id: request.project_id,
            artifact_type: plan.resolved_type.clone(),
            amount: request.amount,
            created_by: request.actor_id,
        };

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let (chain_id, reused) = match self.chains.insert_active(new_chain.clone()).await? {
                ChainInsert::Created(chain) => (chain.id, false),
                ChainInsert::AlreadyActive => {
                    let Some(existing) = self.chains.find_active(request.artifact_id).await? else {
                        tracing::debug!(
                            artifact_id = %request.artifact_id,
                            attempt,
                            "Active approval chain vanished before it could be adopted"
                        );
                        continue;
                    };
                    tracing::info!(
                        artifact_id = %request.artifact_id,
                        chain_id = %existing.id,
                        "Reusing concurrently created approval chain"
                    );

                    let steps = self.chains.list_steps(existing.id).await?;
                    if !steps.is_empty() {
                        let step_ids: Vec<ApprovalStepId> = steps.iter().map(|s| s.id).collect();
                        let approvers = self.chains.list_approvers(&step_ids).await?;
                        let mut outcome = Outcome::new(BuiltChain {
                            chain_id: existing.id,
                            step_ids,
                            resolved_type: existing.artifact_type,
                            reused: true,
                            approvers: distinct(
                                approvers
                                    .iter()
                                    .filter(|a| a.active)
                                    .map(|a| a.approver_ref),
                            ),
                        });
                        outcome.extend(warnings);
                        return Ok(outcome);
                    }
                    (existing.id, true)
                }
            };

            let steps = self.chains.insert_steps(chain_id, &plan.steps).await?;
            tracing::info!(
                artifact_id = %request.artifact_id,
                chain_id = %chain_id,
                steps = steps.len(),
                reused,
                "Approval chain materialized"
            );

            let mut outcome = Outcome::new(BuiltChain {
                chain_id,
                step_ids: steps.iter().map(|s| s.id).collect(),
                resolved_type: plan.resolved_type.clone(),
                reused,
                approvers: plan.approvers(),
            });
            outcome.extend(warnings);
            return Ok(outcome);
        }

        Err(GovernanceError::Database(format!(
            "could not settle an active approval chain for artifact {}",
            request.artifact_id
        )))
    }

    /// The artifact's active chain with steps and approvers.
    pub async fn active_view(&self, artifact_id: Uuid) -> Result<Option<ChainView>, GovernanceError> {
        let Some(chain) = self.chains.find_active(artifact_id).await? else {
            return Ok(None);
        };
        let steps = self.chains.list_steps(chain.id).await?;
        let step_ids: Vec<ApprovalStepId> = steps.iter().map(|s| s.id).collect();
        let mut approvers = self.chains.list_approvers(&step_ids).await?;

        let steps = steps
            .into_iter()
            .map(|step| {
                let (mine, rest): (Vec<Approver>, Vec<Approver>) =
                    approvers.drain(..).partition(|a| a.step_id == step.id);
                approvers = rest;
                StepView {
                    step,
                    approvers: mine,
                }
            })
            .collect();

        Ok(Some(ChainView { chain, steps }))
    }
}
