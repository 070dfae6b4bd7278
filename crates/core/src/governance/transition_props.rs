//! Property-based tests for the lane-move rule.
//!
//! - The rule is total: every combination yields an answer
//! - No-op moves are always legal
//! - Submitted and rejected changes never move
//! - Draft and rework changes never leave intake/analysis

use proptest::prelude::*;

use super::error::GovernanceError;
use super::transition::TransitionValidator;
use super::types::{DecisionStatus, Lane};

fn arb_decision() -> impl Strategy<Value = DecisionStatus> {
    prop_oneof![
        Just(DecisionStatus::Draft),
        Just(DecisionStatus::Submitted),
        Just(DecisionStatus::Approved),
        Just(DecisionStatus::Rejected),
        Just(DecisionStatus::Rework),
    ]
}

fn arb_lane() -> impl Strategy<Value = Lane> {
    proptest::sample::select(Lane::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_noop_moves_are_legal(decision in arb_decision(), lane in arb_lane()) {
        prop_assert!(TransitionValidator::can_move_lane(decision, lane, None));
        prop_assert!(TransitionValidator::can_move_lane(decision, lane, Some(lane)));
    }

    #[test]
    fn prop_rule_is_deterministic(
        decision in arb_decision(),
        from in arb_lane(),
        to in arb_lane(),
    ) {
        let first = TransitionValidator::can_move_lane(decision, from, Some(to));
        let second = TransitionValidator::can_move_lane(decision, from, Some(to));
        prop_assert_eq!(first, second);
        prop_assert_eq!(
            TransitionValidator::check_lane_move(decision, from, to).is_ok(),
            first
        );
    }

    #[test]
    fn prop_locked_decisions_never_move(
        decision in prop_oneof![Just(DecisionStatus::Submitted), Just(DecisionStatus::Rejected)],
        from in arb_lane(),
        to in arb_lane(),
    ) {
        prop_assume!(from != to);
        prop_assert!(!TransitionValidator::can_move_lane(decision, from, Some(to)));

        let err = TransitionValidator::check_lane_move(decision, from, to).unwrap_err();
        match decision {
            DecisionStatus::Submitted => {
                prop_assert!(matches!(err, GovernanceError::LockedWhileSubmitted { .. }), "unexpected error: {:?}", err);
            }
            _ => {
                prop_assert!(matches!(err, GovernanceError::IllegalLaneMove { .. }), "unexpected error: {:?}", err);
            }
        }
    }

    #[test]
    fn prop_undecided_changes_stay_early(
        decision in prop_oneof![Just(DecisionStatus::Draft), Just(DecisionStatus::Rework)],
        from in arb_lane(),
        to in arb_lane(),
    ) {
        prop_assume!(from != to);
        let early = |lane: Lane| matches!(lane, Lane::Intake | Lane::Analysis);
        let legal = TransitionValidator::can_move_lane(decision, from, Some(to));
        prop_assert_eq!(legal, early(from) && early(to));
    }

    #[test]
    fn prop_approved_moves_are_symmetric_in_delivery(
        from in proptest::sample::select(Lane::DELIVERY_ORDER.to_vec()),
        to in proptest::sample::select(Lane::DELIVERY_ORDER.to_vec()),
    ) {
        prop_assert_eq!(
            TransitionValidator::can_move_lane(DecisionStatus::Approved, from, Some(to)),
            TransitionValidator::can_move_lane(DecisionStatus::Approved, to, Some(from))
        );
    }

    #[test]
    fn prop_raw_decision_matches_typed(
        decision in arb_decision(),
        from in arb_lane(),
        to in arb_lane(),
    ) {
        prop_assert_eq!(
            TransitionValidator::can_move_lane_raw(decision.as_str(), from, Some(to)),
            TransitionValidator::can_move_lane(decision, from, Some(to))
        );
        prop_assert_eq!(
            TransitionValidator::can_move_lane_raw("", from, Some(to)),
            TransitionValidator::can_move_lane(DecisionStatus::Draft, from, Some(to))
        );
    }
}
