//! Property-based tests for rule banding and step assembly.
//!
//! - Rule bands are closed on both ends
//! - Assembled steps are numbered 1..=n in rule-step order
//! - No approver appears twice within a step

use std::collections::{BTreeSet, HashMap, HashSet};

use proptest::prelude::*;
use rust_decimal::Decimal;
use steerco_shared::types::{ApprovalGroupId, ApprovalRuleId, OrganizationId, UserId};

use super::chain::{ChainDefaults, assemble_steps};
use super::rules::{ApprovalRule, ApproverRef};
use super::types::QuorumMode;

/// Strategy to generate non-negative amounts (0.00 to 1,000,000.00).
fn amount() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn rule(step: i32, approver: ApproverRef, min: Decimal, max: Option<Decimal>) -> ApprovalRule {
    ApprovalRule {
        id: ApprovalRuleId::new(),
        organization_id: OrganizationId::new(),
        step,
        approval_role: String::new(),
        approver,
        min_amount: min,
        max_amount: max,
        artifact_type: "change".to_string(),
        is_active: true,
    }
}

/// A small pool of users and groups drawn from by index so that
/// duplicates across rules are common.
struct Pool {
    users: Vec<UserId>,
    groups: Vec<ApprovalGroupId>,
    expansions: HashMap<ApprovalGroupId, BTreeSet<UserId>>,
}

impl Pool {
    fn new(memberships: &[Vec<usize>]) -> Self {
        let users: Vec<UserId> = (0..6).map(|_| UserId::new()).collect();
        let groups: Vec<ApprovalGroupId> = memberships.iter().map(|_| ApprovalGroupId::new()).collect();
        let expansions = groups
            .iter()
            .zip(memberships)
            .map(|(group, members)| (*group, members.iter().map(|i| users[*i]).collect()))
            .collect();
        Self {
            users,
            groups,
            expansions,
        }
    }

    fn approver(&self, pick: (bool, usize)) -> ApproverRef {
        let (is_group, index) = pick;
        if is_group && !self.groups.is_empty() {
            ApproverRef::Group(self.groups[index % self.groups.len()])
        } else {
            ApproverRef::User(self.users[index % self.users.len()])
        }
    }
}

fn memberships() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0usize..6, 0..4), 0..3)
}

fn rule_specs() -> impl Strategy<Value = Vec<(i32, (bool, usize))>> {
    prop::collection::vec((1i32..5, (any::<bool>(), 0usize..10)), 1..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_band_is_closed(min in amount(), width in amount(), probe in amount()) {
        let max = min + width;
        let bounded = rule(1, ApproverRef::User(UserId::new()), min, Some(max));
        let open = rule(1, ApproverRef::User(UserId::new()), min, None);

        prop_assert!(bounded.covers(min));
        prop_assert!(bounded.covers(max));
        prop_assert_eq!(bounded.covers(probe), probe >= min && probe <= max);
        prop_assert_eq!(open.covers(probe), probe >= min);
    }

    #[test]
    fn prop_steps_are_renumbered_in_rule_order(
        members in memberships(),
        specs in rule_specs(),
    ) {
        let pool = Pool::new(&members);
        let rules: Vec<ApprovalRule> = specs
            .iter()
            .map(|(step, pick)| rule(*step, pool.approver(*pick), Decimal::ZERO, None))
            .collect();

        let steps = assemble_steps(&rules, &pool.expansions, &ChainDefaults::default());

        let distinct_rule_steps: BTreeSet<i32> = specs.iter().map(|(s, _)| *s).collect();
        prop_assert_eq!(steps.len(), distinct_rule_steps.len());
        for (index, (step, rule_step)) in steps.iter().zip(&distinct_rule_steps).enumerate() {
            prop_assert_eq!(step.step_order, i32::try_from(index).unwrap() + 1);
            prop_assert_eq!(step.rule_step, *rule_step);
            prop_assert_eq!(&step.name, &format!("Step {}", step.step_order));
        }
    }

    #[test]
    fn prop_no_duplicate_approvers_within_a_step(
        members in memberships(),
        specs in rule_specs(),
        all_quorum in any::<bool>(),
    ) {
        let pool = Pool::new(&members);
        let rules: Vec<ApprovalRule> = specs
            .iter()
            .map(|(step, pick)| rule(*step, pool.approver(*pick), Decimal::ZERO, None))
            .collect();
        let defaults = ChainDefaults {
            quorum_mode: if all_quorum { QuorumMode::All } else { QuorumMode::Any },
            ..ChainDefaults::default()
        };

        for step in assemble_steps(&rules, &pool.expansions, &defaults) {
            let unique: HashSet<UserId> = step.approvers.iter().copied().collect();
            prop_assert_eq!(unique.len(), step.approvers.len());
            if all_quorum {
                prop_assert_eq!(step.min_approvals, i32::try_from(step.approvers.len()).unwrap());
            } else {
                prop_assert_eq!(step.min_approvals, 1);
            }
        }
    }
}
