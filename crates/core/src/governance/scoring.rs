//! Derived impact score.
//!
//! The score is recomputed after submit and decide. It is a derived field:
//! persisting it does not advance the concurrency token, and a failure never
//! rolls back the transition that triggered it.

use rust_decimal::Decimal;
use serde_json::Value;

use crate::governance::change::ChangeRequest;
use crate::governance::error::GovernanceError;

/// Upper bound of the score.
pub const MAX_SCORE: i64 = 100;

/// Schedule slip counts at most this many points.
const MAX_SCHEDULE_POINTS: i64 = 30;

/// Recomputes and persists a change's impact score.
pub trait ScoreRecalculator: Send + Sync {
    /// Stores `impact_score(change)` if the row still carries `change`'s
    /// version token; returns the stored score, or `None` if the row has
    /// moved on and the score was dropped.
    fn recompute(
        &self,
        change: &ChangeRequest,
    ) -> impl std::future::Future<Output = Result<Option<Decimal>, GovernanceError>> + Send;
}

fn amount_points(amount: Decimal) -> i64 {
    if amount >= Decimal::from(1_000_000) {
        50
    } else if amount >= Decimal::from(100_000) {
        40
    } else if amount >= Decimal::from(10_000) {
        25
    } else if amount > Decimal::ZERO {
        10
    } else {
        0
    }
}

fn schedule_points(impact: &Value) -> i64 {
    let days = match impact.get("schedule_impact_days") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    days.unwrap_or(0).clamp(0, MAX_SCHEDULE_POINTS)
}

fn risk_points(impact: &Value) -> i64 {
    let level = impact
        .get("risk_level")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase());
    match level.as_deref() {
        Some("low") => 5,
        Some("medium") => 10,
        Some("high") => 15,
        Some("critical") => 20,
        _ => 0,
    }
}

/// Computes the impact score of a change.
///
/// Amount points (0, 10, 25, 40, 50 at 0, >0, ≥10 000, ≥100 000, ≥1 000 000),
/// plus schedule slip in days (at most 30), plus risk points
/// (low 5, medium 10, high 15, critical 20), capped at 100.
#[must_use]
pub fn impact_score(change: &ChangeRequest) -> Decimal {
    let impact = &change.impact_analysis;
    let total = amount_points(change.amount()) + schedule_points(impact) + risk_points(impact);
    Decimal::from(total.min(MAX_SCORE))
}
