//! Scenario tests for the decision engine over in-memory ports.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Map, Value, json};

use steerco_shared::GovernanceConfig;
use steerco_shared::types::{
    ApprovalGroupId, ApprovalRuleId, ChangeRequestId, OrganizationId, ProjectId, UserId,
};

use crate::governance::audit::GovernanceEvent;
use crate::governance::chain::{ApprovalChainBuilder, ChainDefaults, ChainRequest, NewApprovalChain};
use crate::governance::change::{ChangeRequest, NewChangeRequest};
use crate::governance::engine::{DecisionEngine, GovernancePorts};
use crate::governance::error::{ErrorCategory, GovernanceError};
use crate::governance::guard::{CasOutcome, ChangeStore, ConcurrencyGuard, DeleteOutcome};
use crate::governance::memory::{InMemoryGovernance, InMemoryPorts, in_memory_engine};
use crate::governance::notify::NotificationEvent;
use crate::governance::outcome::WarningKind;
use crate::governance::scoring::ScoreRecalculator;
use crate::governance::rules::{ApprovalRule, ApproverRef};
use crate::governance::types::{
    Actor, ArtifactType, ChainStatus, DecisionOutcome, DecisionStatus, Lane, ProjectRole,
};

struct Fixture {
    store: Arc<InMemoryGovernance>,
    engine: DecisionEngine<InMemoryPorts>,
    org: OrganizationId,
    project: ProjectId,
    owner: Actor,
    contributor: Actor,
    approver: Actor,
    group_approver: Actor,
    viewer: Actor,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(&GovernanceConfig::default())
    }

    fn with_config(config: &GovernanceConfig) -> Self {
        let store = Arc::new(InMemoryGovernance::new());
        let engine = in_memory_engine(Arc::clone(&store), config).unwrap();
        let org = OrganizationId::new();
        let actor = |role| Actor::new(UserId::new(), org, role);
        Self {
            engine,
            store,
            org,
            project: ProjectId::new(),
            owner: actor(ProjectRole::Owner),
            contributor: actor(ProjectRole::Contributor),
            approver: actor(ProjectRole::Approver),
            group_approver: actor(ProjectRole::Approver),
            viewer: actor(ProjectRole::Viewer),
        }
    }

    fn rule(
        &self,
        step: i32,
        role: &str,
        approver: ApproverRef,
        min: Decimal,
        max: Option<Decimal>,
    ) -> ApprovalRule {
        ApprovalRule {
            id: ApprovalRuleId::new(),
            organization_id: self.org,
            step,
            approval_role: role.to_string(),
            approver,
            min_amount: min,
            max_amount: max,
            artifact_type: "change".to_string(),
            is_active: true,
        }
    }

    /// Two bands: `[0, 10000]` names the approver directly at step 1,
    /// `[5000, ∞)` names a group holding the group approver (and the direct
    /// approver again) at step 2.
    fn seed_two_band_rules(&self) -> ApprovalGroupId {
        let group = ApprovalGroupId::new();
        for user in [self.group_approver.user_id, self.approver.user_id] {
            let approver_id = self.store.add_approver(user);
            self.store.add_group_member(group, approver_id);
        }
        self.store.add_rule(self.rule(
            1,
            "PMO Lead",
            ApproverRef::User(self.approver.user_id),
            dec!(0),
            Some(dec!(10000)),
        ));
        self.store
            .add_rule(self.rule(2, "Finance", ApproverRef::Group(group), dec!(5000), None));
        group
    }

    async fn create(&self, amount: i64) -> ChangeRequest {
        self.engine
            .create(
                &self.contributor,
                NewChangeRequest {
                    project_id: self.project,
                    title: "Replace message broker".to_string(),
                    description: Some("Move to managed service".to_string()),
                    impact_analysis: Some(json!({ "amount": amount, "risk_level": "medium" })),
                },
            )
            .await
            .unwrap()
            .committed
    }

    async fn create_in_analysis(&self, amount: i64) -> ChangeRequest {
        let change = self.create(amount).await;
        self.engine
            .move_lane(&self.contributor, change.id, Some(Lane::Analysis), None)
            .await
            .unwrap()
            .committed
    }

    async fn submitted(&self, amount: i64) -> ChangeRequest {
        let change = self.create_in_analysis(amount).await;
        self.engine
            .submit(&self.contributor, change.id, None)
            .await
            .unwrap()
            .committed
    }

    fn active_chains(&self, id: ChangeRequestId) -> usize {
        self.store
            .chains_for(id.into_inner())
            .iter()
            .filter(|c| c.status == ChainStatus::Active)
            .count()
    }
}

fn patch(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("patch must be an object"),
    }
}

// =========================================================================
// Happy path and lane locking
// =========================================================================

#[tokio::test]
async fn test_happy_path_builds_two_step_chain() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();

    let change = fx.create(5000).await;
    assert_eq!(change.decision_status, DecisionStatus::Draft);
    assert_eq!(change.delivery_status, Lane::Intake);

    let moved = fx
        .engine
        .move_lane(&fx.contributor, change.id, Some(Lane::Analysis), Some(change.updated_at))
        .await
        .unwrap();
    assert!(moved.is_clean());
    assert!(moved.committed.updated_at > change.updated_at);

    let outcome = fx
        .engine
        .submit(&fx.contributor, change.id, Some(moved.committed.updated_at))
        .await
        .unwrap();
    assert!(outcome.is_clean());
    let submitted = outcome.committed;
    assert_eq!(submitted.decision_status, DecisionStatus::Submitted);
    assert_eq!(submitted.delivery_status, Lane::Review);
    assert!(submitted.impact_score.is_some());

    let chain_id = submitted.approval_chain_id.unwrap();
    let steps = fx.store.steps_of(chain_id);
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].name, "PMO Lead");
    assert_eq!(steps[1].name, "Finance");
    for step in &steps {
        assert!(!fx.store.approvers_of(step.id).is_empty());
    }
    assert_eq!(fx.store.approvers_of(steps[1].id).len(), 2);

    let events: Vec<GovernanceEvent> = fx
        .store
        .audit_events()
        .iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        events,
        vec![
            GovernanceEvent::ChangeCreated,
            GovernanceEvent::LaneMoved,
            GovernanceEvent::Submitted
        ]
    );
    assert_eq!(fx.store.timeline_events().len(), 3);

    let notifications = fx.store.notifications();
    let NotificationEvent::ApprovalRequested { recipients, .. } = &notifications[0] else {
        panic!("expected approval request, got {notifications:?}");
    };
    assert!(recipients.contains(&fx.approver.user_id));
    assert!(recipients.contains(&fx.group_approver.user_id));
    assert_eq!(recipients.len(), 2);
}

#[tokio::test]
async fn test_submit_from_intake_is_rejected() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.create(5000).await;

    let err = fx
        .engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GovernanceError::LaneMismatch {
            expected: Lane::Analysis,
            actual: Lane::Intake,
            ..
        }
    ));
    assert_eq!(err.status_code(), 409);
    assert!(fx.store.chains_for(change.id.into_inner()).is_empty());
}

#[tokio::test]
async fn test_submitted_change_is_locked() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;

    let err = fx
        .engine
        .move_lane(&fx.owner, change.id, Some(Lane::Analysis), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::LockedWhileSubmitted { .. }));

    let err = fx
        .engine
        .edit_fields(&fx.contributor, change.id, &patch(json!({ "title": "x" })), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::LockedWhileSubmitted { .. }));
}

#[tokio::test]
async fn test_submit_is_idempotent() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let first = fx.submitted(5000).await;
    let events_before = fx.store.audit_events().len();

    let second = fx
        .engine
        .submit(&fx.contributor, first.id, None)
        .await
        .unwrap();

    assert_eq!(second.committed, fx.store.change(first.id).unwrap());
    assert_eq!(second.committed.updated_at, first.updated_at);
    assert_eq!(fx.store.chains_for(first.id.into_inner()).len(), 1);
    assert_eq!(fx.store.audit_events().len(), events_before);
}

// =========================================================================
// Decisions
// =========================================================================

#[tokio::test]
async fn test_approve_then_redecide_conflicts() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;

    let approved = fx
        .engine
        .decide(&fx.approver, change.id, DecisionOutcome::Approved, "looks good", None)
        .await
        .unwrap()
        .committed;
    assert_eq!(approved.decision_status, DecisionStatus::Approved);
    assert_eq!(approved.delivery_status, Lane::InProgress);
    assert_eq!(approved.decision_rationale.as_deref(), Some("looks good"));
    assert_eq!(approved.decision_by, Some(fx.approver.user_id));
    assert_eq!(approved.decision_role, Some(ProjectRole::Approver));

    let err = fx
        .engine
        .decide(&fx.approver, change.id, DecisionOutcome::Rejected, "changed my mind", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::AlreadyDecided {
            decision: DecisionStatus::Approved
        }
    ));
    assert_eq!(err.details()["decision_status"], "approved");

    let notifications = fx.store.notifications();
    assert!(matches!(
        notifications.last(),
        Some(NotificationEvent::DecisionRecorded { recipient, outcome: DecisionOutcome::Approved, .. })
            if *recipient == fx.contributor.user_id
    ));
}

#[tokio::test]
async fn test_reject_is_terminal() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;

    let rejected = fx
        .engine
        .decide(&fx.group_approver, change.id, DecisionOutcome::Rejected, "too risky", None)
        .await
        .unwrap()
        .committed;
    assert_eq!(rejected.decision_status, DecisionStatus::Rejected);
    assert_eq!(rejected.delivery_status, Lane::Analysis);

    let err = fx
        .engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyDecided { .. }));

    let err = fx
        .engine
        .move_lane(&fx.contributor, change.id, Some(Lane::Intake), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::IllegalLaneMove { .. }));
}

#[tokio::test]
async fn test_decide_requires_rationale_before_anything_else() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;

    let err = fx
        .engine
        .decide(&fx.approver, change.id, DecisionOutcome::Approved, "   ", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::RationaleRequired));
    assert_eq!(err.status_code(), 400);
    assert_eq!(fx.store.change(change.id).unwrap(), change);
}

#[tokio::test]
async fn test_decide_on_draft_is_not_submitted() {
    let fx = Fixture::new();
    let change = fx.create_in_analysis(100).await;

    let err = fx
        .engine
        .decide(&fx.owner, change.id, DecisionOutcome::Approved, "ok", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::NotSubmitted { .. }));
}

#[tokio::test]
async fn test_decide_authorization() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;

    let err = fx
        .engine
        .decide(&fx.contributor, change.id, DecisionOutcome::Approved, "ok", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::NotAuthorized { .. }));

    let stranger = Actor::new(UserId::new(), fx.org, ProjectRole::Approver);
    let err = fx
        .engine
        .decide(&stranger, change.id, DecisionOutcome::Approved, "ok", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::NotAnApprover { .. }));
    assert_eq!(err.category(), ErrorCategory::Authorization);

    let outcome = fx
        .engine
        .decide(&fx.owner, change.id, DecisionOutcome::Approved, "owner override", None)
        .await
        .unwrap();
    assert_eq!(outcome.committed.decision_role, Some(ProjectRole::Owner));
}

#[tokio::test]
async fn test_rework_decision_is_idempotent() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;

    let first = fx
        .engine
        .decide(&fx.approver, change.id, DecisionOutcome::Rework, "add rollback plan", None)
        .await
        .unwrap()
        .committed;
    assert_eq!(first.decision_status, DecisionStatus::Rework);
    assert_eq!(first.delivery_status, Lane::Analysis);
    let events = fx.store.audit_events().len();

    let again = fx
        .engine
        .decide(&fx.approver, change.id, DecisionOutcome::Rework, "still missing", None)
        .await
        .unwrap();
    assert_eq!(again.committed.updated_at, first.updated_at);
    assert_eq!(fx.store.audit_events().len(), events);

    let err = fx
        .engine
        .decide(&fx.approver, change.id, DecisionOutcome::Approved, "fine", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyDecided { .. }));
}

// =========================================================================
// Request changes / rework loop
// =========================================================================

#[tokio::test]
async fn test_rework_loop_rebuilds_chain() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;
    let first_chain = change.approval_chain_id.unwrap();

    let reworked = fx
        .engine
        .request_changes(&fx.owner, change.id, Some("needs more detail".to_string()), None)
        .await
        .unwrap()
        .committed;
    assert_eq!(reworked.decision_status, DecisionStatus::Rework);
    assert_eq!(reworked.delivery_status, Lane::Analysis);
    assert_eq!(reworked.decision_rationale.as_deref(), Some("needs more detail"));

    let resubmitted = fx
        .engine
        .submit(&fx.contributor, change.id, Some(reworked.updated_at))
        .await
        .unwrap()
        .committed;
    assert_eq!(resubmitted.decision_status, DecisionStatus::Submitted);
    assert_eq!(resubmitted.delivery_status, Lane::Review);
    assert!(resubmitted.decision_rationale.is_none());
    assert!(resubmitted.decision_by.is_none());

    let second_chain = resubmitted.approval_chain_id.unwrap();
    assert_ne!(first_chain, second_chain);
    assert_eq!(fx.active_chains(change.id), 1);

    let chains = fx.store.chains_for(change.id.into_inner());
    assert_eq!(chains.len(), 2);
    assert_eq!(chains[0].status, ChainStatus::Superseded);
    assert_eq!(chains[1].id, second_chain);
}

#[tokio::test]
async fn test_request_changes_is_owner_only_and_idempotent() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;

    let err = fx
        .engine
        .request_changes(&fx.approver, change.id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::NotAuthorized {
            required: ProjectRole::Owner,
            ..
        }
    ));

    let first = fx
        .engine
        .request_changes(&fx.owner, change.id, None, None)
        .await
        .unwrap()
        .committed;
    let events = fx.store.audit_events().len();

    let second = fx
        .engine
        .request_changes(&fx.owner, change.id, Some("again".to_string()), None)
        .await
        .unwrap()
        .committed;
    assert_eq!(second, first);
    assert_eq!(fx.store.audit_events().len(), events);
    assert!(matches!(
        fx.store.notifications().last(),
        Some(NotificationEvent::ChangesRequested { .. })
    ));
}

#[tokio::test]
async fn test_request_changes_on_approved_conflicts() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;
    fx.engine
        .decide(&fx.owner, change.id, DecisionOutcome::Approved, "ship it", None)
        .await
        .unwrap();

    let err = fx
        .engine
        .request_changes(&fx.owner, change.id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyDecided { .. }));
}

// =========================================================================
// Chain configuration errors
// =========================================================================

#[tokio::test]
async fn test_zero_approvers_leaves_no_rows() {
    let fx = Fixture::new();
    let empty_group = ApprovalGroupId::new();
    fx.store.add_rule(fx.rule(
        1,
        "CAB",
        ApproverRef::Group(empty_group),
        dec!(0),
        None,
    ));
    let change = fx.create_in_analysis(5000).await;

    let err = fx
        .engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, GovernanceError::NoApprovers { .. }));
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert_eq!(err.status_code(), 422);
    assert_eq!(fx.store.row_counts(), (0, 0, 0));
    let stored = fx.store.change(change.id).unwrap();
    assert_eq!(stored.decision_status, DecisionStatus::Draft);
    assert_eq!(stored.delivery_status, Lane::Analysis);
}

#[tokio::test]
async fn test_step_without_approvers_is_configuration_error() {
    let fx = Fixture::new();
    fx.store.add_rule(fx.rule(
        1,
        "PMO",
        ApproverRef::User(fx.approver.user_id),
        dec!(0),
        None,
    ));
    fx.store.add_rule(fx.rule(
        2,
        "Board",
        ApproverRef::Group(ApprovalGroupId::new()),
        dec!(0),
        None,
    ));
    let change = fx.create_in_analysis(10).await;

    let err = fx
        .engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::StepWithoutApprovers { step: 2, ref name } if name == "Board"
    ));
    assert_eq!(fx.store.row_counts(), (0, 0, 0));
}

#[tokio::test]
async fn test_no_rules_and_no_matching_band() {
    let fx = Fixture::new();
    let change = fx.create_in_analysis(5000).await;

    let err = fx
        .engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::NoApprovalRules { .. }));

    fx.store.add_rule(fx.rule(
        1,
        "PMO",
        ApproverRef::User(fx.approver.user_id),
        dec!(0),
        Some(dec!(1000)),
    ));
    let err = fx
        .engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::NoMatchingRules { amount, .. } if amount == dec!(5000)
    ));
}

#[tokio::test]
async fn test_alias_artifact_type_resolves() {
    let fx = Fixture::new();
    let mut legacy_rule = fx.rule(
        1,
        "PMO",
        ApproverRef::User(fx.approver.user_id),
        dec!(0),
        None,
    );
    legacy_rule.artifact_type = "change_request".to_string();
    fx.store.add_rule(legacy_rule);
    let change = fx.create_in_analysis(5000).await;

    let plan = fx
        .engine
        .preview_chain(&fx.viewer, change.id)
        .await
        .unwrap();
    assert_eq!(plan.resolved_type, "change_request");
    assert_eq!(fx.store.row_counts(), (0, 0, 0));

    let submitted = fx
        .engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap()
        .committed;
    let chain = &fx.store.chains_for(submitted.id.into_inner())[0];
    assert_eq!(chain.artifact_type, "change_request");
}

#[tokio::test]
async fn test_legacy_membership_fallback() {
    let group = ApprovalGroupId::new();
    let legacy_user = UserId::new();

    for enabled in [true, false] {
        let fx = Fixture::with_config(&GovernanceConfig {
            legacy_group_membership: enabled,
            ..GovernanceConfig::default()
        });
        fx.store.add_legacy_group_user(group, legacy_user);
        fx.store
            .add_rule(fx.rule(1, "CAB", ApproverRef::Group(group), dec!(0), None));
        let change = fx.create_in_analysis(100).await;

        let result = fx.engine.submit(&fx.contributor, change.id, None).await;
        if enabled {
            let chain = fx
                .engine
                .active_chain(&fx.viewer, change.id)
                .await
                .unwrap()
                .unwrap();
            assert!(result.is_ok());
            assert!(chain.has_active_approver(legacy_user));
        } else {
            assert!(matches!(result, Err(GovernanceError::NoApprovers { .. })));
        }
    }
}

#[tokio::test]
async fn test_inactive_canonical_approver_is_ignored() {
    let fx = Fixture::new();
    let group = ApprovalGroupId::new();
    let approver_id = fx.store.add_approver(fx.group_approver.user_id);
    fx.store.add_group_member(group, approver_id);
    fx.store.set_approver_active(approver_id, false);
    fx.store
        .add_rule(fx.rule(1, "CAB", ApproverRef::Group(group), dec!(0), None));
    let change = fx.create_in_analysis(100).await;

    let err = fx
        .engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::NoApprovers { .. }));
}

// =========================================================================
// Chain races
// =========================================================================

#[tokio::test]
async fn test_submit_adopts_concurrently_created_chain() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.create_in_analysis(5000).await;

    let winner = fx.store.insert_chain_row(NewApprovalChain {
        organization_id: fx.org,
        artifact_id: change.id.into_inner(),
        project_id: fx.project,
        artifact_type: "change".to_string(),
        amount: dec!(5000),
        created_by: fx.owner.user_id,
    });
    fx.store.set_supersede_skipped(true);

    let submitted = fx
        .engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap()
        .committed;

    assert_eq!(submitted.approval_chain_id, Some(winner.id));
    assert_eq!(fx.active_chains(change.id), 1);
    assert_eq!(fx.store.steps_of(winner.id).len(), 2);
}

#[tokio::test]
async fn test_reused_chain_with_steps_is_not_duplicated() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let submitted = fx.submitted(5000).await;
    let counts = fx.store.row_counts();

    fx.store.set_supersede_skipped(true);
    let ports = fx.engine.ports();
    let builder = ApprovalChainBuilder::new(
        ports.rules(),
        ports.groups(),
        ports.chains(),
        ChainDefaults::default(),
    );
    let rebuilt = builder
        .build(&ChainRequest {
            organization_id: fx.org,
            artifact_id: submitted.id.into_inner(),
            project_id: fx.project,
            actor_id: fx.contributor.user_id,
            amount: dec!(5000),
            artifact_type: ArtifactType::Change,
        })
        .await
        .unwrap()
        .committed;

    assert!(rebuilt.reused);
    assert_eq!(Some(rebuilt.chain_id), submitted.approval_chain_id);
    assert_eq!(rebuilt.step_ids.len(), 2);
    assert_eq!(fx.store.row_counts(), counts);
    assert_eq!(rebuilt.approvers.len(), 2);
}

#[tokio::test]
async fn test_failed_supersede_is_a_warning() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;
    let first_chain = change.approval_chain_id;
    fx.engine
        .request_changes(&fx.owner, change.id, None, None)
        .await
        .unwrap();

    fx.store.set_supersede_failing(true);
    let outcome = fx
        .engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap();

    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::Supersede));
    assert_eq!(outcome.committed.approval_chain_id, first_chain);
    assert_eq!(fx.active_chains(change.id), 1);
}

// =========================================================================
// Best-effort side effects
// =========================================================================

#[tokio::test]
async fn test_transition_commits_when_audit_is_down() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.create_in_analysis(5000).await;
    fx.store.set_audit_available(false);

    let outcome = fx
        .engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap();

    assert_eq!(outcome.committed.decision_status, DecisionStatus::Submitted);
    let kinds: Vec<WarningKind> = outcome.warnings.iter().map(|w| w.kind).collect();
    assert_eq!(kinds, vec![WarningKind::Audit, WarningKind::Timeline]);
    assert_eq!(
        fx.store.change(change.id).unwrap().decision_status,
        DecisionStatus::Submitted
    );
}

#[tokio::test]
async fn test_scoring_and_notification_failures_are_warnings() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;
    fx.store.set_scoring_available(false);
    fx.store.set_notifications_available(false);

    let outcome = fx
        .engine
        .decide(&fx.approver, change.id, DecisionOutcome::Approved, "ok", None)
        .await
        .unwrap();

    assert_eq!(outcome.committed.decision_status, DecisionStatus::Approved);
    let kinds: Vec<WarningKind> = outcome.warnings.iter().map(|w| w.kind).collect();
    assert_eq!(kinds, vec![WarningKind::Scoring, WarningKind::Notification]);
}

#[tokio::test]
async fn test_score_update_keeps_version_token() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let submitted = fx.submitted(5000).await;

    let stored = fx.store.change(submitted.id).unwrap();
    assert_eq!(stored.impact_score, Some(dec!(20)));
    assert_eq!(stored.updated_at, submitted.updated_at);
}

#[tokio::test]
async fn test_audit_disabled_writes_nothing() {
    let fx = Fixture::with_config(&GovernanceConfig {
        audit_enabled: false,
        ..GovernanceConfig::default()
    });
    fx.seed_two_band_rules();
    fx.store.set_audit_available(false);

    let outcome = fx
        .engine
        .submit(&fx.contributor, fx.create_in_analysis(5000).await.id, None)
        .await
        .unwrap();

    assert!(outcome.is_clean());
    assert!(fx.store.audit_events().is_empty());
    assert!(fx.store.timeline_events().is_empty());
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test]
async fn test_same_expected_version_only_one_writer_wins() {
    let fx = Fixture::new();
    let change = fx.create(100).await;
    let token = change.updated_at;

    let first = fx
        .engine
        .move_lane(&fx.contributor, change.id, Some(Lane::Analysis), Some(token))
        .await
        .unwrap()
        .committed;

    let err = fx
        .engine
        .edit_fields(
            &fx.owner,
            change.id,
            &patch(json!({ "title": "Competing edit" })),
            Some(token),
        )
        .await
        .unwrap_err();

    match err {
        GovernanceError::VersionConflict { expected, current } => {
            assert_eq!(expected, token);
            assert_eq!(current, first.updated_at);
        }
        other => panic!("expected version conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_compare_and_swap_race_reports_post_write_token() {
    let fx = Fixture::new();
    let change = fx.create(100).await;
    let guard = ConcurrencyGuard::new(fx.store.as_ref());

    let seen_by_a = guard.load(change.id, fx.org).await.unwrap();
    let seen_by_b = guard.load(change.id, fx.org).await.unwrap();

    let written = guard
        .commit(None, &seen_by_a, |c| c.title = "A".to_string())
        .await
        .unwrap();
    let err = guard
        .commit(None, &seen_by_b, |c| c.title = "B".to_string())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GovernanceError::VersionConflict { current, .. } if current == written.updated_at
    ));
    assert_eq!(fx.store.change(change.id).unwrap().title, "A");
}

/// Change store whose first two submit writes wait for each other at the
/// compare-and-swap.
struct HeldAtSwap {
    store: Arc<InMemoryGovernance>,
    barrier: tokio::sync::Barrier,
    held: AtomicUsize,
}

impl ChangeStore for HeldAtSwap {
    async fn get(&self, id: ChangeRequestId) -> Result<Option<ChangeRequest>, GovernanceError> {
        ChangeStore::get(self.store.as_ref(), id).await
    }

    async fn insert(&self, change: ChangeRequest) -> Result<ChangeRequest, GovernanceError> {
        ChangeStore::insert(self.store.as_ref(), change).await
    }

    async fn compare_and_swap(
        &self,
        expected: DateTime<Utc>,
        next: ChangeRequest,
    ) -> Result<CasOutcome, GovernanceError> {
        if next.decision_status == DecisionStatus::Submitted
            && self.held.fetch_add(1, Ordering::SeqCst) < 2
        {
            self.barrier.wait().await;
        }
        ChangeStore::compare_and_swap(self.store.as_ref(), expected, next).await
    }

    async fn delete_if_version(
        &self,
        id: ChangeRequestId,
        expected: DateTime<Utc>,
    ) -> Result<DeleteOutcome, GovernanceError> {
        ChangeStore::delete_if_version(self.store.as_ref(), id, expected).await
    }
}

struct RacingPorts {
    inner: InMemoryPorts,
    changes: HeldAtSwap,
}

impl GovernancePorts for RacingPorts {
    type Changes = HeldAtSwap;
    type Rules = <InMemoryPorts as GovernancePorts>::Rules;
    type Groups = <InMemoryPorts as GovernancePorts>::Groups;
    type Chains = <InMemoryPorts as GovernancePorts>::Chains;
    type Audit = <InMemoryPorts as GovernancePorts>::Audit;
    type Scores = <InMemoryPorts as GovernancePorts>::Scores;
    type Notify = <InMemoryPorts as GovernancePorts>::Notify;

    fn changes(&self) -> &Self::Changes {
        &self.changes
    }
    fn rules(&self) -> &Self::Rules {
        self.inner.rules()
    }
    fn groups(&self) -> &Self::Groups {
        self.inner.groups()
    }
    fn chains(&self) -> &Self::Chains {
        self.inner.chains()
    }
    fn audit(&self) -> &Self::Audit {
        self.inner.audit()
    }
    fn scores(&self) -> &Self::Scores {
        self.inner.scores()
    }
    fn notifier(&self) -> &Self::Notify {
        self.inner.notifier()
    }
}

fn racing_engine(fx: &Fixture) -> DecisionEngine<RacingPorts> {
    let ports = RacingPorts {
        inner: InMemoryPorts::new(Arc::clone(&fx.store), true),
        changes: HeldAtSwap {
            store: Arc::clone(&fx.store),
            barrier: tokio::sync::Barrier::new(2),
            held: AtomicUsize::new(0),
        },
    };
    DecisionEngine::from_config(Arc::new(ports), &GovernanceConfig::default()).unwrap()
}

#[tokio::test]
async fn test_concurrent_submits_both_succeed_on_the_active_chain() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.create_in_analysis(5000).await;

    let engine = racing_engine(&fx);

    let (a, b) = tokio::join!(
        engine.submit(&fx.contributor, change.id, None),
        engine.submit(&fx.owner, change.id, None),
    );
    let a = a.unwrap().committed;
    let b = b.unwrap().committed;

    let chains = fx.store.chains_for(change.id.into_inner());
    let active: Vec<_> = chains
        .iter()
        .filter(|c| c.status == ChainStatus::Active)
        .collect();
    assert_eq!(active.len(), 1);

    let stored = fx.store.change(change.id).unwrap();
    assert_eq!(stored.decision_status, DecisionStatus::Submitted);
    assert_eq!(stored.delivery_status, Lane::Review);
    assert_eq!(stored.approval_chain_id, Some(active[0].id));
    for submitted in [a, b] {
        assert_eq!(submitted.decision_status, DecisionStatus::Submitted);
    }

    let submits = fx
        .store
        .audit_events()
        .iter()
        .filter(|e| e.event_type == GovernanceEvent::Submitted)
        .count();
    assert_eq!(submits, 1);
}

#[tokio::test]
async fn test_concurrent_submit_with_token_reports_conflict() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.create_in_analysis(5000).await;
    let engine = racing_engine(&fx);

    let token = Some(change.updated_at);
    let (a, b) = tokio::join!(
        engine.submit(&fx.contributor, change.id, token),
        engine.submit(&fx.owner, change.id, token),
    );

    let conflicts = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(GovernanceError::VersionConflict { .. })))
        .count();
    assert_eq!(conflicts, 1);
    assert!(a.is_ok() || b.is_ok());
}

#[tokio::test]
async fn test_stale_score_is_dropped() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.create_in_analysis(5000).await;

    let mut snapshot = change.clone();
    snapshot.impact_analysis = json!({ "amount": 2_000_000, "risk_level": "critical" });
    fx.engine
        .edit_fields(&fx.contributor, change.id, &patch(json!({ "title": "Newer" })), None)
        .await
        .unwrap();

    let stored = fx.store.recompute(&snapshot).await.unwrap();
    assert_eq!(stored, None);
    assert_eq!(fx.store.change(change.id).unwrap().impact_score, None);

    let current = fx.store.change(change.id).unwrap();
    assert_eq!(fx.store.recompute(&current).await.unwrap(), Some(dec!(20)));
}

#[tokio::test]
async fn test_stale_token_on_submit_builds_nothing() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.create(5000).await;
    let stale = change.updated_at;
    fx.engine
        .move_lane(&fx.contributor, change.id, Some(Lane::Analysis), None)
        .await
        .unwrap();

    let err = fx
        .engine
        .submit(&fx.contributor, change.id, Some(stale))
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Concurrency);
    assert_eq!(fx.store.row_counts(), (0, 0, 0));
}

// =========================================================================
// Plain edits, lanes, deletion, tenancy
// =========================================================================

#[tokio::test]
async fn test_edit_fields() {
    let fx = Fixture::new();
    let change = fx.create(100).await;

    let err = fx
        .engine
        .edit_fields(
            &fx.contributor,
            change.id,
            &patch(json!({ "decision_status": "approved" })),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::GovernanceFieldsProtected { .. }));
    assert_eq!(err.status_code(), 409);

    let err = fx
        .engine
        .edit_fields(&fx.contributor, change.id, &patch(json!({ "created_by": "x" })), None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    let edited = fx
        .engine
        .edit_fields(
            &fx.contributor,
            change.id,
            &patch(json!({ "title": "Renamed", "impact_analysis": { "cost": "25,000" } })),
            Some(change.updated_at),
        )
        .await
        .unwrap()
        .committed;
    assert_eq!(edited.title, "Renamed");
    assert_eq!(edited.amount(), dec!(25000));

    let events = fx.store.audit_events().len();
    let unchanged = fx
        .engine
        .edit_fields(&fx.contributor, change.id, &Map::new(), None)
        .await
        .unwrap()
        .committed;
    assert_eq!(unchanged, edited);
    assert_eq!(fx.store.audit_events().len(), events);
}

#[tokio::test]
async fn test_approved_change_walks_delivery_lanes() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.submitted(5000).await;
    fx.engine
        .decide(&fx.approver, change.id, DecisionOutcome::Approved, "go", None)
        .await
        .unwrap();

    let err = fx
        .engine
        .move_lane(&fx.contributor, change.id, Some(Lane::Closed), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::IllegalLaneMove { .. }));

    for lane in [Lane::Implemented, Lane::Closed, Lane::Implemented] {
        let moved = fx
            .engine
            .move_lane(&fx.contributor, change.id, Some(lane), None)
            .await
            .unwrap()
            .committed;
        assert_eq!(moved.delivery_status, lane);
    }

    let noop = fx
        .engine
        .move_lane(&fx.contributor, change.id, None, None)
        .await
        .unwrap();
    assert_eq!(noop.committed.delivery_status, Lane::Implemented);
}

#[tokio::test]
async fn test_delete_only_from_draft_early_lanes() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();

    let draft = fx.create(100).await;
    let outcome = fx
        .engine
        .delete(&fx.contributor, draft.id, Some(draft.updated_at))
        .await
        .unwrap();
    assert_eq!(outcome.committed, draft.id);
    assert!(fx.store.change(draft.id).is_none());
    assert_eq!(
        fx.store.audit_events().last().map(|e| e.event_type),
        Some(GovernanceEvent::ChangeDeleted)
    );

    let submitted = fx.submitted(5000).await;
    let err = fx
        .engine
        .delete(&fx.owner, submitted.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::NotDeletable { .. }));
}

#[tokio::test]
async fn test_role_and_tenancy_checks() {
    let fx = Fixture::new();
    let change = fx.create(100).await;

    let err = fx
        .engine
        .move_lane(&fx.viewer, change.id, Some(Lane::Analysis), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::NotAuthorized { .. }));
    assert!(fx.engine.get(&fx.viewer, change.id).await.is_ok());

    let outsider = Actor::new(UserId::new(), OrganizationId::new(), ProjectRole::Owner);
    let err = fx.engine.get(&outsider, change.id).await.unwrap_err();
    assert!(matches!(err, GovernanceError::ChangeNotFound(_)));
    assert_eq!(err.status_code(), 404);

    let err = fx
        .engine
        .create(
            &fx.viewer,
            NewChangeRequest {
                project_id: fx.project,
                title: "Nope".to_string(),
                description: None,
                impact_analysis: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::NotAuthorized { .. }));
}

#[tokio::test]
async fn test_active_chain_view() {
    let fx = Fixture::new();
    fx.seed_two_band_rules();
    let change = fx.create_in_analysis(5000).await;
    assert!(fx.engine.active_chain(&fx.viewer, change.id).await.unwrap().is_none());

    fx.engine
        .submit(&fx.contributor, change.id, None)
        .await
        .unwrap();
    let view = fx
        .engine
        .active_chain(&fx.viewer, change.id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(view.steps.len(), 2);
    assert_eq!(view.steps[0].step.step_order, 1);
    assert_eq!(view.steps[1].step.step_order, 2);
    assert_eq!(view.steps[0].approvers.len(), 1);
    assert!(view.has_active_approver(fx.group_approver.user_id));
}
