//! PostgreSQL-backed governance ports.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use steerco_core::governance::engine::{DecisionEngine, GovernancePorts};
use steerco_core::governance::error::GovernanceError;
use steerco_core::governance::groups::FallbackGroupExpander;
use steerco_core::governance::notify::LogNotifier;
use steerco_shared::GovernanceConfig;

use crate::repositories::{
    ApprovalChainRepository, ApprovalGroupRepository, ApprovalRuleRepository, AuditRepository,
    ChangeRequestRepository, LegacyGroupMembershipAdapter,
};

/// Group expansion as wired for PostgreSQL.
pub type PgGroupExpander = FallbackGroupExpander<ApprovalGroupRepository, LegacyGroupMembershipAdapter>;

/// Every governance port over one connection pool.
#[derive(Debug, Clone)]
pub struct PgGovernance {
    changes: ChangeRequestRepository,
    rules: ApprovalRuleRepository,
    groups: PgGroupExpander,
    chains: ApprovalChainRepository,
    audit: AuditRepository,
    notifier: LogNotifier,
}

impl PgGovernance {
    /// Creates the port bundle; `legacy_membership` enables the legacy
    /// group → user fallback.
    #[must_use]
    pub fn new(db: DatabaseConnection, legacy_membership: bool) -> Self {
        let legacy = legacy_membership.then(|| LegacyGroupMembershipAdapter::new(db.clone()));
        Self {
            changes: ChangeRequestRepository::new(db.clone()),
            rules: ApprovalRuleRepository::new(db.clone()),
            groups: FallbackGroupExpander::new(ApprovalGroupRepository::new(db.clone()), legacy),
            chains: ApprovalChainRepository::new(db.clone()),
            audit: AuditRepository::new(db),
            notifier: LogNotifier,
        }
    }
}

impl GovernancePorts for PgGovernance {
    type Changes = ChangeRequestRepository;
    type Rules = ApprovalRuleRepository;
    type Groups = PgGroupExpander;
    type Chains = ApprovalChainRepository;
    type Audit = AuditRepository;
    type Scores = ChangeRequestRepository;
    type Notify = LogNotifier;

    fn changes(&self) -> &Self::Changes {
        &self.changes
    }
    fn rules(&self) -> &Self::Rules {
        &self.rules
    }
    fn groups(&self) -> &Self::Groups {
        &self.groups
    }
    fn chains(&self) -> &Self::Chains {
        &self.chains
    }
    fn audit(&self) -> &Self::Audit {
        &self.audit
    }
    fn scores(&self) -> &Self::Scores {
        &self.changes
    }
    fn notifier(&self) -> &Self::Notify {
        &self.notifier
    }
}

/// Builds a decision engine over PostgreSQL.
pub fn governance_engine(
    db: DatabaseConnection,
    config: &GovernanceConfig,
) -> Result<DecisionEngine<PgGovernance>, GovernanceError> {
    let ports = PgGovernance::new(db, config.legacy_group_membership);
    DecisionEngine::from_config(Arc::new(ports), config)
}
