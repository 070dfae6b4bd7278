//! Decision engine: orchestrates governance operations on change requests.
//!
//! Every operation follows the same shape: validate input, load the change,
//! authorize, check governance preconditions, commit through the
//! [`ConcurrencyGuard`], then run best-effort side effects (audit, scoring,
//! notifications) whose failures become warnings on the [`Outcome`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use steerco_shared::GovernanceConfig;
use steerco_shared::types::ChangeRequestId;

use crate::governance::audit::{AuditLog, AuditSink, GovernanceEvent, TransitionRecord};
use crate::governance::chain::{
    ApprovalChainBuilder, ChainDefaults, ChainPlan, ChainRequest, ChainStore, ChainView,
};
use crate::governance::change::{ChangeEdit, ChangeRequest, NewChangeRequest};
use crate::governance::error::GovernanceError;
use crate::governance::groups::GroupExpander;
use crate::governance::guard::{ChangeStore, ConcurrencyGuard, truncate_to_micros};
use crate::governance::notify::{NotificationEvent, Notifier};
use crate::governance::outcome::{Outcome, Warning, WarningKind};
use crate::governance::rules::RuleRepository;
use crate::governance::scoring::ScoreRecalculator;
use crate::governance::transition::TransitionValidator;
use crate::governance::types::{
    Actor, ArtifactType, DecisionOutcome, DecisionStatus, Lane, ProjectRole,
};

/// The set of external collaborators the engine runs against.
pub trait GovernancePorts: Send + Sync + 'static {
    /// Change-request persistence.
    type Changes: ChangeStore;
    /// Approval-rule source.
    type Rules: RuleRepository;
    /// Group expansion.
    type Groups: GroupExpander;
    /// Chain persistence.
    type Chains: ChainStore;
    /// Audit destination.
    type Audit: AuditSink;
    /// Score persistence.
    type Scores: ScoreRecalculator;
    /// Notification dispatch.
    type Notify: Notifier;

    /// Change-request persistence.
    fn changes(&self) -> &Self::Changes;
    /// Approval-rule source.
    fn rules(&self) -> &Self::Rules;
    /// Group expansion.
    fn groups(&self) -> &Self::Groups;
    /// Chain persistence.
    fn chains(&self) -> &Self::Chains;
    /// Audit destination.
    fn audit(&self) -> &Self::Audit;
    /// Score persistence.
    fn scores(&self) -> &Self::Scores;
    /// Notification dispatch.
    fn notifier(&self) -> &Self::Notify;
}

/// Re-point attempts after losing a concurrent submit.
const MAX_REPOINT_ATTEMPTS: usize = 5;

fn require_role(actor: &Actor, required: ProjectRole) -> Result<(), GovernanceError> {
    if actor.role >= required {
        Ok(())
    } else {
        Err(GovernanceError::NotAuthorized {
            role: actor.role,
            required,
        })
    }
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Orchestrates submit, decide, request-changes, lane moves and plain edits.
pub struct DecisionEngine<P> {
    ports: Arc<P>,
    defaults: ChainDefaults,
    audit_enabled: bool,
}

impl<P: GovernancePorts> DecisionEngine<P> {
    /// Creates an engine with auditing enabled.
    #[must_use]
    pub fn new(ports: Arc<P>, defaults: ChainDefaults) -> Self {
        Self {
            ports,
            defaults,
            audit_enabled: true,
        }
    }

    /// Creates an engine from governance configuration.
    pub fn from_config(ports: Arc<P>, config: &GovernanceConfig) -> Result<Self, GovernanceError> {
        Ok(Self::new(ports, ChainDefaults::from_config(config)?).with_audit(config.audit_enabled))
    }

    /// Enables or disables both audit sinks.
    #[must_use]
    pub fn with_audit(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }

    /// The ports this engine runs against.
    pub fn ports(&self) -> &P {
        &self.ports
    }

    fn guard(&self) -> ConcurrencyGuard<'_, P::Changes> {
        ConcurrencyGuard::new(self.ports.changes())
    }

    fn builder(&self) -> ApprovalChainBuilder<'_, P::Rules, P::Groups, P::Chains> {
        ApprovalChainBuilder::new(
            self.ports.rules(),
            self.ports.groups(),
            self.ports.chains(),
            self.defaults,
        )
    }

    fn audit_log(&self) -> AuditLog<'_, P::Audit> {
        AuditLog::new(self.ports.audit(), self.audit_enabled)
    }

    fn chain_request(actor: &Actor, change: &ChangeRequest) -> ChainRequest {
        ChainRequest {
            organization_id: change.organization_id,
            artifact_id: change.id.into_inner(),
            project_id: change.project_id,
            actor_id: actor.user_id,
            amount: change.amount(),
            artifact_type: ArtifactType::Change,
        }
    }

    async fn rescore(&self, change: &mut ChangeRequest) -> Option<Warning> {
        match self.ports.scores().recompute(change).await {
            Ok(Some(score)) => {
                change.impact_score = Some(score);
                None
            }
            Ok(None) => {
                tracing::debug!(change_id = %change.id, "Dropped impact score of a superseded snapshot");
                None
            }
            Err(e) => {
                tracing::warn!(change_id = %change.id, error = %e, "Failed to recompute impact score");
                Some(Warning::new(WarningKind::Scoring, e.to_string()))
            }
        }
    }

    async fn dispatch(&self, event: NotificationEvent) -> Option<Warning> {
        let name = event.name();
        let change_id = event.change_id();
        match self.ports.notifier().notify(event).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(change_id = %change_id, event = name, error = %e, "Failed to dispatch notification");
                Some(Warning::new(WarningKind::Notification, e.to_string()))
            }
        }
    }

    /// Creates a change request in `(draft, intake)`.
    pub async fn create(
        &self,
        actor: &Actor,
        input: NewChangeRequest,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        require_role(actor, ProjectRole::Contributor)?;
        let (title, impact_analysis) = input.validate()?;

        let now = truncate_to_micros(Utc::now());
        let change = ChangeRequest {
            id: ChangeRequestId::new(),
            organization_id: actor.organization_id,
            project_id: input.project_id,
            title,
            description: non_blank(input.description.as_deref()),
            impact_analysis,
            decision_status: DecisionStatus::Draft,
            delivery_status: Lane::Intake,
            decision_rationale: None,
            decision_by: None,
            decision_at: None,
            decision_role: None,
            approval_chain_id: None,
            impact_score: None,
            created_by: actor.user_id,
            created_at: now,
            updated_at: now,
        };

        let change = self.ports.changes().insert(change).await?;
        tracing::info!(change_id = %change.id, project_id = %change.project_id, "Change request created");

        let record = TransitionRecord {
            to: Some(DecisionStatus::Draft.to_string()),
            ..TransitionRecord::new(
                change.project_id,
                change.id,
                *actor,
                GovernanceEvent::ChangeCreated,
            )
        }
        .payload(json!({ "title": change.title, "delivery_status": change.delivery_status }));

        let mut outcome = Outcome::new(change);
        outcome.extend(self.audit_log().record(&record).await);
        Ok(outcome)
    }

    /// Loads a change visible to the actor.
    pub async fn get(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
    ) -> Result<ChangeRequest, GovernanceError> {
        let change = self.guard().load(id, actor.organization_id).await?;
        require_role(actor, ProjectRole::Viewer)?;
        Ok(change)
    }

    /// Submits a change for approval.
    ///
    /// Legal from `draft`/`rework` in `analysis`. Builds (or adopts) the
    /// active approval chain, then moves the change to `(submitted, review)`.
    /// Submitting an already submitted change is a no-op success.
    pub async fn submit(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        let guard = self.guard();
        let change = guard.load(id, actor.organization_id).await?;
        require_role(actor, ProjectRole::Contributor)?;

        match change.decision_status {
            DecisionStatus::Submitted => {
                tracing::debug!(change_id = %id, "Change already submitted");
                return Ok(Outcome::new(change));
            }
            DecisionStatus::Approved | DecisionStatus::Rejected => {
                return Err(GovernanceError::AlreadyDecided {
                    decision: change.decision_status,
                });
            }
            DecisionStatus::Draft | DecisionStatus::Rework => {}
        }
        if change.delivery_status != Lane::Analysis {
            return Err(GovernanceError::LaneMismatch {
                expected: Lane::Analysis,
                actual: change.delivery_status,
                decision: change.decision_status,
            });
        }
        guard.check(expected, &change)?;

        let request = Self::chain_request(actor, &change);
        let built = self.builder().build(&request).await?;
        let mut outcome = Outcome::new(());
        outcome.extend(built.warnings);
        let built = built.committed;

        let previous = change.decision_status;
        let committed = guard
            .commit(expected, &change, |c| {
                c.decision_status = DecisionStatus::Submitted;
                c.delivery_status = Lane::Review;
                c.clear_decision();
                c.approval_chain_id = Some(built.chain_id);
            })
            .await;
        let mut committed = match committed {
            Ok(committed) => committed,
            Err(conflict @ GovernanceError::VersionConflict { .. }) if expected.is_none() => {
                return self.adopt_concurrent_submit(actor, id, conflict, outcome).await;
            }
            Err(e) => return Err(e),
        };
        tracing::info!(
            change_id = %id,
            chain_id = %built.chain_id,
            reused = built.reused,
            "Change request submitted"
        );

        let record = TransitionRecord::new(
            committed.project_id,
            committed.id,
            *actor,
            GovernanceEvent::Submitted,
        )
        .values(previous, DecisionStatus::Submitted)
        .payload(json!({
            "chain_id": built.chain_id,
            "reused_chain": built.reused,
            "step_count": built.step_ids.len(),
            "resolved_type": built.resolved_type,
            "amount": request.amount.to_string(),
            "from_lane": Lane::Analysis,
            "to_lane": Lane::Review,
        }));
        outcome.extend(self.audit_log().record(&record).await);
        outcome.extend(self.rescore(&mut committed).await);
        outcome.extend(
            self.dispatch(NotificationEvent::ApprovalRequested {
                change_id: committed.id,
                project_id: committed.project_id,
                chain_id: built.chain_id,
                recipients: built.approvers.clone(),
            })
            .await,
        );

        Ok(outcome.map(|()| committed))
    }

    /// Settles a submit that lost the compare-and-swap to another writer.
    ///
    /// If the other writer submitted the change, this is the idempotent
    /// success; the stored chain reference is re-pointed at the active chain
    /// when the winner recorded one that has since been superseded.
    async fn adopt_concurrent_submit(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        conflict: GovernanceError,
        mut outcome: Outcome<()>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        let guard = self.guard();
        let mut latest = guard.load(id, actor.organization_id).await?;
        if latest.decision_status != DecisionStatus::Submitted {
            return Err(conflict);
        }
        tracing::info!(change_id = %id, "Adopting concurrent submit");

        for _ in 0..MAX_REPOINT_ATTEMPTS {
            let Some(active) = self.ports.chains().find_active(id.into_inner()).await? else {
                break;
            };
            if latest.approval_chain_id == Some(active.id) {
                break;
            }
            match guard
                .commit(None, &latest, |c| c.approval_chain_id = Some(active.id))
                .await
            {
                Ok(repointed) => {
                    tracing::info!(change_id = %id, chain_id = %active.id, "Re-pointed change at active approval chain");
                    latest = repointed;
                    outcome.extend(self.rescore(&mut latest).await);
                    break;
                }
                Err(GovernanceError::VersionConflict { .. }) => {
                    latest = guard.load(id, actor.organization_id).await?;
                    if latest.decision_status != DecisionStatus::Submitted {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outcome.map(|()| latest))
    }

    /// Records a decision on a submitted change.
    ///
    /// Legal from `(submitted, review)`. Requesting rework on a change that
    /// is already in rework is a no-op success; any other re-decision is a
    /// conflict.
    pub async fn decide(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        decision: DecisionOutcome,
        rationale: &str,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        let rationale = non_blank(Some(rationale)).ok_or(GovernanceError::RationaleRequired)?;

        let guard = self.guard();
        let change = guard.load(id, actor.organization_id).await?;
        require_role(actor, ProjectRole::Approver)?;

        if decision == DecisionOutcome::Rework && change.decision_status == DecisionStatus::Rework {
            tracing::debug!(change_id = %id, "Change already in rework");
            return Ok(Outcome::new(change));
        }
        Self::ensure_reviewable(&change)?;

        if actor.role != ProjectRole::Owner {
            let listed = self
                .builder()
                .active_view(change.id.into_inner())
                .await?
                .is_some_and(|view| view.has_active_approver(actor.user_id));
            if !listed {
                return Err(GovernanceError::NotAnApprover {
                    user_id: actor.user_id,
                });
            }
        }

        let decided_at = Utc::now();
        let mut committed = guard
            .commit(expected, &change, |c| {
                c.decision_status = decision.decision();
                c.delivery_status = decision.target_lane();
                c.decision_rationale = Some(rationale.clone());
                c.decision_by = Some(actor.user_id);
                c.decision_at = Some(decided_at);
                c.decision_role = Some(actor.role);
            })
            .await?;
        tracing::info!(change_id = %id, decision = %decision, "Decision recorded");

        let event = match decision {
            DecisionOutcome::Approved => GovernanceEvent::Approved,
            DecisionOutcome::Rejected => GovernanceEvent::Rejected,
            DecisionOutcome::Rework => GovernanceEvent::Rework,
        };
        let record = TransitionRecord::new(committed.project_id, committed.id, *actor, event)
            .values(DecisionStatus::Submitted, decision.decision())
            .note(Some(rationale))
            .payload(json!({
                "from_lane": Lane::Review,
                "to_lane": decision.target_lane(),
            }));

        let mut outcome = Outcome::new(());
        outcome.extend(self.audit_log().record(&record).await);
        if decision != DecisionOutcome::Rework {
            outcome.extend(self.rescore(&mut committed).await);
        }
        outcome.extend(
            self.dispatch(NotificationEvent::DecisionRecorded {
                change_id: committed.id,
                project_id: committed.project_id,
                outcome: decision,
                recipient: committed.created_by,
            })
            .await,
        );

        Ok(outcome.map(|()| committed))
    }

    /// Owner sends a submitted change back for rework.
    ///
    /// Same preconditions as [`decide`](Self::decide); a change already in
    /// rework is returned unchanged.
    pub async fn request_changes(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        note: Option<String>,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        let guard = self.guard();
        let change = guard.load(id, actor.organization_id).await?;
        require_role(actor, ProjectRole::Owner)?;

        if change.decision_status == DecisionStatus::Rework {
            tracing::debug!(change_id = %id, "Change already in rework");
            return Ok(Outcome::new(change));
        }
        Self::ensure_reviewable(&change)?;

        let note = non_blank(note.as_deref());
        let requested_at = Utc::now();
        let committed = guard
            .commit(expected, &change, |c| {
                c.decision_status = DecisionStatus::Rework;
                c.delivery_status = Lane::Analysis;
                c.decision_rationale.clone_from(&note);
                c.decision_by = Some(actor.user_id);
                c.decision_at = Some(requested_at);
                c.decision_role = Some(actor.role);
            })
            .await?;
        tracing::info!(change_id = %id, "Changes requested");

        let record = TransitionRecord::new(
            committed.project_id,
            committed.id,
            *actor,
            GovernanceEvent::ChangesRequested,
        )
        .values(DecisionStatus::Submitted, DecisionStatus::Rework)
        .note(note.clone())
        .payload(json!({ "from_lane": Lane::Review, "to_lane": Lane::Analysis }));

        let mut outcome = Outcome::new(());
        outcome.extend(self.audit_log().record(&record).await);
        outcome.extend(
            self.dispatch(NotificationEvent::ChangesRequested {
                change_id: committed.id,
                project_id: committed.project_id,
                recipient: committed.created_by,
                note,
            })
            .await,
        );

        Ok(outcome.map(|()| committed))
    }

    /// Moves a change to another delivery lane.
    ///
    /// `None` or the current lane is a no-op.
    pub async fn move_lane(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        to: Option<Lane>,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        let guard = self.guard();
        let change = guard.load(id, actor.organization_id).await?;
        require_role(actor, ProjectRole::Contributor)?;

        let from = change.delivery_status;
        let Some(to) = to.filter(|lane| *lane != from) else {
            return Ok(Outcome::new(change));
        };
        TransitionValidator::check_lane_move(change.decision_status, from, to)?;

        let committed = guard
            .commit(expected, &change, |c| c.delivery_status = to)
            .await?;
        tracing::info!(change_id = %id, from = %from, to = %to, "Lane moved");

        let record = TransitionRecord::new(
            committed.project_id,
            committed.id,
            *actor,
            GovernanceEvent::LaneMoved,
        )
        .values(from, to)
        .payload(json!({ "decision_status": committed.decision_status }));

        let mut outcome = Outcome::new(committed);
        outcome.extend(self.audit_log().record(&record).await);
        Ok(outcome)
    }

    /// Applies a plain edit.
    ///
    /// Only `title`, `description` and `impact_analysis` are editable, and
    /// only while the change is not submitted. An empty patch is a no-op.
    pub async fn edit_fields(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        patch: &Map<String, Value>,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        let edit = ChangeEdit::from_patch(patch)?;

        let guard = self.guard();
        let change = guard.load(id, actor.organization_id).await?;
        require_role(actor, ProjectRole::Contributor)?;

        if edit.is_empty() {
            return Ok(Outcome::new(change));
        }
        if change.decision_status == DecisionStatus::Submitted {
            return Err(GovernanceError::LockedWhileSubmitted {
                lane: change.delivery_status,
            });
        }

        let committed = guard
            .commit(expected, &change, |c| edit.apply(c))
            .await?;
        tracing::info!(change_id = %id, fields = ?edit.field_names(), "Change fields edited");

        let record = TransitionRecord::new(
            committed.project_id,
            committed.id,
            *actor,
            GovernanceEvent::FieldsEdited,
        )
        .payload(json!({ "fields": edit.field_names() }));

        let mut outcome = Outcome::new(committed);
        outcome.extend(self.audit_log().record(&record).await);
        Ok(outcome)
    }

    /// Deletes a draft change in `intake` or `analysis`.
    pub async fn delete(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequestId>, GovernanceError> {
        let guard = self.guard();
        let change = guard.load(id, actor.organization_id).await?;
        require_role(actor, ProjectRole::Contributor)?;

        let deletable = change.decision_status == DecisionStatus::Draft
            && matches!(change.delivery_status, Lane::Intake | Lane::Analysis);
        if !deletable {
            return Err(GovernanceError::NotDeletable {
                decision: change.decision_status,
                lane: change.delivery_status,
            });
        }

        guard.delete(expected, &change).await?;
        tracing::info!(change_id = %id, "Change request deleted");

        let record = TransitionRecord::new(
            change.project_id,
            change.id,
            *actor,
            GovernanceEvent::ChangeDeleted,
        )
        .payload(json!({ "title": change.title, "delivery_status": change.delivery_status }));

        let mut outcome = Outcome::new(id);
        outcome.extend(self.audit_log().record(&record).await);
        Ok(outcome)
    }

    /// The change's active approval chain with steps and approvers.
    pub async fn active_chain(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
    ) -> Result<Option<ChainView>, GovernanceError> {
        let change = self.get(actor, id).await?;
        self.builder().active_view(change.id.into_inner()).await
    }

    /// The chain a submit would build right now, without writing anything.
    pub async fn preview_chain(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
    ) -> Result<ChainPlan, GovernanceError> {
        let change = self.get(actor, id).await?;
        self.builder()
            .preview(&Self::chain_request(actor, &change))
            .await
    }

    fn ensure_reviewable(change: &ChangeRequest) -> Result<(), GovernanceError> {
        match change.decision_status {
            DecisionStatus::Submitted => {}
            DecisionStatus::Approved | DecisionStatus::Rejected | DecisionStatus::Rework => {
                return Err(GovernanceError::AlreadyDecided {
                    decision: change.decision_status,
                });
            }
            DecisionStatus::Draft => {
                return Err(GovernanceError::NotSubmitted {
                    decision: change.decision_status,
                    lane: change.delivery_status,
                });
            }
        }
        if change.delivery_status != Lane::Review {
            return Err(GovernanceError::LaneMismatch {
                expected: Lane::Review,
                actual: change.delivery_status,
                decision: change.decision_status,
            });
        }
        Ok(())
    }
}
