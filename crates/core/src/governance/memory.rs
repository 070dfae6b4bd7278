//! In-memory implementation of every governance port.
//!
//! Used by the engine's scenario tests, the HTTP tests and embedders that do
//! not need persistence. It honours the same invariants as the database
//! ports: at most one active chain per artifact, unique step order per chain,
//! unique `(step, approver)` pairs, compare-and-swap on `updated_at`.
//! Fault switches simulate unavailable side-effect sinks.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use steerco_shared::GovernanceConfig;
use steerco_shared::types::{
    ApprovalChainId, ApprovalGroupId, ApprovalStepId, ChangeRequestId, OrganizationId, UserId,
};

use crate::governance::audit::{AuditEvent, AuditSink, TimelineEvent};
use crate::governance::chain::{
    APPROVER_TYPE_USER, ApprovalChain, ApprovalStep, Approver, ChainInsert, ChainStore,
    NewApprovalChain, PlannedStep,
};
use crate::governance::change::ChangeRequest;
use crate::governance::engine::{DecisionEngine, GovernancePorts};
use crate::governance::error::GovernanceError;
use crate::governance::groups::{FallbackGroupExpander, GroupExpander};
use crate::governance::guard::{CasOutcome, ChangeStore, DeleteOutcome};
use crate::governance::notify::{NotificationEvent, Notifier};
use crate::governance::rules::{ApprovalRule, RuleRepository};
use crate::governance::scoring::{ScoreRecalculator, impact_score};
use crate::governance::types::{ChainStatus, StepStatus};

#[derive(Default)]
struct State {
    changes: HashMap<ChangeRequestId, ChangeRequest>,
    rules: Vec<ApprovalRule>,
    approvers: HashMap<Uuid, (UserId, bool)>,
    group_members: HashMap<ApprovalGroupId, Vec<(Uuid, bool)>>,
    legacy_group_users: HashMap<ApprovalGroupId, Vec<(UserId, bool)>>,
    chains: Vec<ApprovalChain>,
    steps: Vec<ApprovalStep>,
    step_approvers: Vec<Approver>,
    audit: Vec<AuditEvent>,
    timeline: Vec<TimelineEvent>,
    notifications: Vec<NotificationEvent>,
}

/// In-memory governance store.
#[derive(Default)]
pub struct InMemoryGovernance {
    state: Mutex<State>,
    audit_down: AtomicBool,
    scoring_down: AtomicBool,
    notifications_down: AtomicBool,
    supersede_failing: AtomicBool,
    supersede_skipped: AtomicBool,
}

impl InMemoryGovernance {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an approval rule.
    pub fn add_rule(&self, rule: ApprovalRule) {
        self.state().rules.push(rule);
    }

    /// Registers an active approver identity for a user; returns its ID.
    pub fn add_approver(&self, user_id: UserId) -> Uuid {
        let approver_id = Uuid::now_v7();
        self.state().approvers.insert(approver_id, (user_id, true));
        approver_id
    }

    /// Activates or deactivates an approver identity.
    pub fn set_approver_active(&self, approver_id: Uuid, active: bool) {
        if let Some(entry) = self.state().approvers.get_mut(&approver_id) {
            entry.1 = active;
        }
    }

    /// Adds an active canonical membership (group → approver).
    pub fn add_group_member(&self, group_id: ApprovalGroupId, approver_id: Uuid) {
        self.state()
            .group_members
            .entry(group_id)
            .or_default()
            .push((approver_id, true));
    }

    /// Adds an active legacy membership (group → user).
    pub fn add_legacy_group_user(&self, group_id: ApprovalGroupId, user_id: UserId) {
        self.state()
            .legacy_group_users
            .entry(group_id)
            .or_default()
            .push((user_id, true));
    }

    /// Inserts or replaces a change as-is.
    pub fn put_change(&self, change: ChangeRequest) {
        self.state().changes.insert(change.id, change);
    }

    /// Current state of a change.
    #[must_use]
    pub fn change(&self, id: ChangeRequestId) -> Option<ChangeRequest> {
        self.state().changes.get(&id).cloned()
    }

    /// All chains of an artifact, oldest first.
    #[must_use]
    pub fn chains_for(&self, artifact_id: Uuid) -> Vec<ApprovalChain> {
        self.state()
            .chains
            .iter()
            .filter(|c| c.artifact_id == artifact_id)
            .cloned()
            .collect()
    }

    /// Steps of a chain, ordered.
    #[must_use]
    pub fn steps_of(&self, chain_id: ApprovalChainId) -> Vec<ApprovalStep> {
        let mut steps: Vec<ApprovalStep> = self
            .state()
            .steps
            .iter()
            .filter(|s| s.chain_id == chain_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_order);
        steps
    }

    /// Approvers of a step.
    #[must_use]
    pub fn approvers_of(&self, step_id: ApprovalStepId) -> Vec<Approver> {
        self.state()
            .step_approvers
            .iter()
            .filter(|a| a.step_id == step_id)
            .cloned()
            .collect()
    }

    /// Total chain, step and approver rows.
    #[must_use]
    pub fn row_counts(&self) -> (usize, usize, usize) {
        let state = self.state();
        (
            state.chains.len(),
            state.steps.len(),
            state.step_approvers.len(),
        )
    }

    /// Recorded audit events.
    #[must_use]
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.state().audit.clone()
    }

    /// Recorded timeline events.
    #[must_use]
    pub fn timeline_events(&self) -> Vec<TimelineEvent> {
        self.state().timeline.clone()
    }

    /// Dispatched notifications.
    #[must_use]
    pub fn notifications(&self) -> Vec<NotificationEvent> {
        self.state().notifications.clone()
    }

    /// Makes both audit sinks fail.
    pub fn set_audit_available(&self, available: bool) {
        self.audit_down.store(!available, Ordering::SeqCst);
    }

    /// Makes score recomputation fail.
    pub fn set_scoring_available(&self, available: bool) {
        self.scoring_down.store(!available, Ordering::SeqCst);
    }

    /// Makes notification dispatch fail.
    pub fn set_notifications_available(&self, available: bool) {
        self.notifications_down.store(!available, Ordering::SeqCst);
    }

    /// Makes supersession fail.
    pub fn set_supersede_failing(&self, failing: bool) {
        self.supersede_failing.store(failing, Ordering::SeqCst);
    }

    /// Makes supersession a silent no-op, as when a concurrent submit
    /// creates its chain right after this caller superseded.
    pub fn set_supersede_skipped(&self, skipped: bool) {
        self.supersede_skipped.store(skipped, Ordering::SeqCst);
    }

    /// Inserts an active chain directly, bypassing the builder.
    pub fn insert_chain_row(&self, chain: NewApprovalChain) -> ApprovalChain {
        let row = chain_row(chain);
        self.state().chains.push(row.clone());
        row
    }

    fn canonical_members(&self, group_id: ApprovalGroupId) -> BTreeSet<UserId> {
        let state = self.state();
        state
            .group_members
            .get(&group_id)
            .into_iter()
            .flatten()
            .filter(|(_, active)| *active)
            .filter_map(|(approver_id, _)| state.approvers.get(approver_id))
            .filter(|(_, active)| *active)
            .map(|(user_id, _)| *user_id)
            .collect()
    }

    fn legacy_members(&self, group_id: ApprovalGroupId) -> BTreeSet<UserId> {
        self.state()
            .legacy_group_users
            .get(&group_id)
            .into_iter()
            .flatten()
            .filter(|(_, active)| *active)
            .map(|(user_id, _)| *user_id)
            .collect()
    }
}

fn chain_row(chain: NewApprovalChain) -> ApprovalChain {
    ApprovalChain {
        id: ApprovalChainId::new(),
        organization_id: chain.organization_id,
        artifact_id: chain.artifact_id,
        project_id: chain.project_id,
        artifact_type: chain.artifact_type,
        amount: chain.amount,
        status: ChainStatus::Active,
        created_by: chain.created_by,
        created_at: Utc::now(),
    }
}

fn unavailable(what: &str) -> GovernanceError {
    GovernanceError::Database(format!("{what} unavailable"))
}

impl ChangeStore for InMemoryGovernance {
    async fn get(&self, id: ChangeRequestId) -> Result<Option<ChangeRequest>, GovernanceError> {
        Ok(self.change(id))
    }

    async fn insert(&self, change: ChangeRequest) -> Result<ChangeRequest, GovernanceError> {
        let mut state = self.state();
        if state.changes.contains_key(&change.id) {
            return Err(GovernanceError::Database(format!(
                "duplicate change request {}",
                change.id
            )));
        }
        state.changes.insert(change.id, change.clone());
        Ok(change)
    }

    async fn compare_and_swap(
        &self,
        expected: DateTime<Utc>,
        next: ChangeRequest,
    ) -> Result<CasOutcome, GovernanceError> {
        let mut state = self.state();
        match state.changes.get_mut(&next.id) {
            None => Ok(CasOutcome::Stale(None)),
            Some(row) if row.updated_at != expected => Ok(CasOutcome::Stale(Some(row.updated_at))),
            Some(row) => {
                *row = next.clone();
                Ok(CasOutcome::Applied(next))
            }
        }
    }

    async fn delete_if_version(
        &self,
        id: ChangeRequestId,
        expected: DateTime<Utc>,
    ) -> Result<DeleteOutcome, GovernanceError> {
        let mut state = self.state();
        match state.changes.get(&id).map(|row| row.updated_at) {
            None => Ok(DeleteOutcome::Stale(None)),
            Some(current) if current != expected => Ok(DeleteOutcome::Stale(Some(current))),
            Some(_) => {
                state.changes.remove(&id);
                Ok(DeleteOutcome::Deleted)
            }
        }
    }
}

impl RuleRepository for InMemoryGovernance {
    async fn active_rules(
        &self,
        organization_id: OrganizationId,
        artifact_type: &str,
    ) -> Result<Vec<ApprovalRule>, GovernanceError> {
        Ok(self
            .state()
            .rules
            .iter()
            .filter(|r| {
                r.is_active && r.organization_id == organization_id && r.artifact_type == artifact_type
            })
            .cloned()
            .collect())
    }
}

impl ChainStore for InMemoryGovernance {
    async fn supersede_active(&self, artifact_id: Uuid) -> Result<u64, GovernanceError> {
        if self.supersede_failing.load(Ordering::SeqCst) {
            return Err(unavailable("chain supersession"));
        }
        if self.supersede_skipped.load(Ordering::SeqCst) {
            return Ok(0);
        }
        let mut count = 0;
        for chain in self
            .state()
            .chains
            .iter_mut()
            .filter(|c| c.artifact_id == artifact_id && c.status == ChainStatus::Active)
        {
            chain.status = ChainStatus::Superseded;
            count += 1;
        }
        Ok(count)
    }

    async fn insert_active(&self, chain: NewApprovalChain) -> Result<ChainInsert, GovernanceError> {
        let mut state = self.state();
        let conflict = state
            .chains
            .iter()
            .any(|c| c.artifact_id == chain.artifact_id && c.status == ChainStatus::Active);
        if conflict {
            return Ok(ChainInsert::AlreadyActive);
        }
        let row = chain_row(chain);
        state.chains.push(row.clone());
        Ok(ChainInsert::Created(row))
    }

    async fn find_active(&self, artifact_id: Uuid) -> Result<Option<ApprovalChain>, GovernanceError> {
        Ok(self
            .state()
            .chains
            .iter()
            .find(|c| c.artifact_id == artifact_id && c.status == ChainStatus::Active)
            .cloned())
    }

    async fn list_steps(
        &self,
        chain_id: ApprovalChainId,
    ) -> Result<Vec<ApprovalStep>, GovernanceError> {
        Ok(self.steps_of(chain_id))
    }

    async fn insert_steps(
        &self,
        chain_id: ApprovalChainId,
        steps: &[PlannedStep],
    ) -> Result<Vec<ApprovalStep>, GovernanceError> {
        let mut state = self.state();
        if !state.chains.iter().any(|c| c.id == chain_id) {
            return Err(GovernanceError::Database(format!(
                "approval chain {chain_id} does not exist"
            )));
        }
        if state.steps.iter().any(|s| s.chain_id == chain_id) {
            drop(state);
            return Ok(self.steps_of(chain_id));
        }

        let mut inserted = Vec::with_capacity(steps.len());
        for planned in steps {
            let step = ApprovalStep {
                id: ApprovalStepId::new(),
                chain_id,
                step_order: planned.step_order,
                name: planned.name.clone(),
                quorum_mode: planned.quorum_mode,
                min_approvals: planned.min_approvals,
                max_rejections: planned.max_rejections,
                status: StepStatus::Pending,
            };
            for user_id in &planned.approvers {
                let duplicate = state
                    .step_approvers
                    .iter()
                    .any(|a| a.step_id == step.id && a.approver_ref == *user_id);
                if duplicate {
                    continue;
                }
                state.step_approvers.push(Approver {
                    id: Uuid::now_v7(),
                    step_id: step.id,
                    approver_type: APPROVER_TYPE_USER.to_string(),
                    approver_ref: *user_id,
                    required: true,
                    active: true,
                });
            }
            state.steps.push(step.clone());
            inserted.push(step);
        }
        Ok(inserted)
    }

    async fn list_approvers(
        &self,
        step_ids: &[ApprovalStepId],
    ) -> Result<Vec<Approver>, GovernanceError> {
        Ok(self
            .state()
            .step_approvers
            .iter()
            .filter(|a| step_ids.contains(&a.step_id))
            .cloned()
            .collect())
    }
}

impl AuditSink for InMemoryGovernance {
    async fn append_audit(&self, event: AuditEvent) -> Result<(), GovernanceError> {
        if self.audit_down.load(Ordering::SeqCst) {
            return Err(unavailable("audit log"));
        }
        self.state().audit.push(event);
        Ok(())
    }

    async fn append_timeline(&self, event: TimelineEvent) -> Result<(), GovernanceError> {
        if self.audit_down.load(Ordering::SeqCst) {
            return Err(unavailable("timeline"));
        }
        self.state().timeline.push(event);
        Ok(())
    }
}

impl ScoreRecalculator for InMemoryGovernance {
    async fn recompute(&self, change: &ChangeRequest) -> Result<Option<Decimal>, GovernanceError> {
        if self.scoring_down.load(Ordering::SeqCst) {
            return Err(unavailable("scoring"));
        }
        let score = impact_score(change);
        match self.state().changes.get_mut(&change.id) {
            Some(row) if row.updated_at == change.updated_at => {
                row.impact_score = Some(score);
                Ok(Some(score))
            }
            _ => Ok(None),
        }
    }
}

impl Notifier for InMemoryGovernance {
    async fn notify(&self, event: NotificationEvent) -> Result<(), GovernanceError> {
        if self.notifications_down.load(Ordering::SeqCst) {
            return Err(unavailable("notifications"));
        }
        self.state().notifications.push(event);
        Ok(())
    }
}

/// Canonical group → approver → user view of the store.
pub struct InMemoryGroups(Arc<InMemoryGovernance>);

impl GroupExpander for InMemoryGroups {
    async fn expand(&self, group_id: ApprovalGroupId) -> Result<BTreeSet<UserId>, GovernanceError> {
        Ok(self.0.canonical_members(group_id))
    }
}

/// Legacy group → user view of the store.
pub struct InMemoryLegacyGroups(Arc<InMemoryGovernance>);

impl GroupExpander for InMemoryLegacyGroups {
    async fn expand(&self, group_id: ApprovalGroupId) -> Result<BTreeSet<UserId>, GovernanceError> {
        Ok(self.0.legacy_members(group_id))
    }
}

/// Port bundle over one [`InMemoryGovernance`].
pub struct InMemoryPorts {
    store: Arc<InMemoryGovernance>,
    groups: FallbackGroupExpander<InMemoryGroups, InMemoryLegacyGroups>,
}

impl InMemoryPorts {
    /// Creates the bundle; `legacy_membership` enables the legacy fallback.
    #[must_use]
    pub fn new(store: Arc<InMemoryGovernance>, legacy_membership: bool) -> Self {
        let legacy = legacy_membership.then(|| InMemoryLegacyGroups(Arc::clone(&store)));
        Self {
            groups: FallbackGroupExpander::new(InMemoryGroups(Arc::clone(&store)), legacy),
            store,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<InMemoryGovernance> {
        &self.store
    }
}

impl GovernancePorts for InMemoryPorts {
    type Changes = InMemoryGovernance;
    type Rules = InMemoryGovernance;
    type Groups = FallbackGroupExpander<InMemoryGroups, InMemoryLegacyGroups>;
    type Chains = InMemoryGovernance;
    type Audit = InMemoryGovernance;
    type Scores = InMemoryGovernance;
    type Notify = InMemoryGovernance;

    fn changes(&self) -> &Self::Changes {
        &self.store
    }
    fn rules(&self) -> &Self::Rules {
        &self.store
    }
    fn groups(&self) -> &Self::Groups {
        &self.groups
    }
    fn chains(&self) -> &Self::Chains {
        &self.store
    }
    fn audit(&self) -> &Self::Audit {
        &self.store
    }
    fn scores(&self) -> &Self::Scores {
        &self.store
    }
    fn notifier(&self) -> &Self::Notify {
        &self.store
    }
}

/// Builds an engine over an in-memory store.
pub fn in_memory_engine(
    store: Arc<InMemoryGovernance>,
    config: &GovernanceConfig,
) -> Result<DecisionEngine<InMemoryPorts>, GovernanceError> {
    let ports = InMemoryPorts::new(store, config.legacy_group_membership);
    DecisionEngine::from_config(Arc::new(ports), config)
}
