//! Delivery-lane legality.
//!
//! [`TransitionValidator`] is the only place that decides whether a lane move
//! is allowed. Nothing moves a lane without consulting it.

use crate::governance::error::GovernanceError;
use crate::governance::types::{DecisionStatus, Lane};

/// Stateless validator for lane moves.
pub struct TransitionValidator;

impl TransitionValidator {
    /// Returns true if moving from `from` to `to` is legal for `decision`.
    ///
    /// - No-op moves (`to` absent or equal to `from`) are always legal.
    /// - Submitted changes cannot move.
    /// - Draft and rework changes move only between intake and analysis.
    /// - Approved changes may be promoted from analysis to review, then move
    ///   one step at a time along review → in_progress → implemented → closed.
    /// - Rejected changes cannot move.
    #[must_use]
    pub fn can_move_lane(decision: DecisionStatus, from: Lane, to: Option<Lane>) -> bool {
        let Some(to) = to else {
            return true;
        };
        if from == to {
            return true;
        }

        match decision {
            DecisionStatus::Submitted | DecisionStatus::Rejected => false,
            DecisionStatus::Draft | DecisionStatus::Rework => matches!(
                (from, to),
                (Lane::Intake, Lane::Analysis) | (Lane::Analysis, Lane::Intake)
            ),
            DecisionStatus::Approved => {
                if from == Lane::Analysis && to == Lane::Review {
                    return true;
                }
                match (from.delivery_index(), to.delivery_index()) {
                    (Some(a), Some(b)) => a.abs_diff(b) == 1,
                    _ => false,
                }
            }
        }
    }

    /// Same as [`can_move_lane`](Self::can_move_lane) for a stored decision
    /// string; empty or unknown values are treated as draft.
    #[must_use]
    pub fn can_move_lane_raw(decision: &str, from: Lane, to: Option<Lane>) -> bool {
        Self::can_move_lane(DecisionStatus::normalize(decision), from, to)
    }

    /// Checks a move, returning the conflict that explains a refusal.
    pub fn check_lane_move(
        decision: DecisionStatus,
        from: Lane,
        to: Lane,
    ) -> Result<(), GovernanceError> {
        if Self::can_move_lane(decision, from, Some(to)) {
            return Ok(());
        }
        if decision == DecisionStatus::Submitted {
            return Err(GovernanceError::LockedWhileSubmitted { lane: from });
        }
        Err(GovernanceError::IllegalLaneMove { decision, from, to })
    }
}
