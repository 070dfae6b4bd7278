//! Results of mutating operations.
//!
//! The committed value reports the primary transition precisely. Side effects
//! that are allowed to fail (audit, scoring, notifications, supersession)
//! attach as [`Warning`]s instead of failing the operation.

use serde::Serialize;

/// Which best-effort side effect failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningKind {
    /// Structured audit event was not written.
    Audit,
    /// Timeline event was not written.
    Timeline,
    /// Impact score was not recomputed.
    Scoring,
    /// Notification was not dispatched.
    Notification,
    /// Previous active chain could not be superseded.
    Supersede,
}

/// A best-effort failure attached to a committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    /// Failed side effect.
    pub kind: WarningKind,
    /// Human-readable cause.
    pub message: String,
}

impl Warning {
    /// Creates a warning.
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A committed result plus any best-effort warnings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    /// Value as committed.
    pub committed: T,
    /// Side effects that failed.
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    /// Wraps a committed value with no warnings.
    pub fn new(committed: T) -> Self {
        Self {
            committed,
            warnings: Vec::new(),
        }
    }

    /// Adds a warning.
    pub fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Adds several warnings.
    pub fn extend(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        self.warnings.extend(warnings);
    }

    /// Returns true if every side effect succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Maps the committed value, keeping warnings.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            committed: f(self.committed),
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_collects_warnings() {
        let mut outcome = Outcome::new(7);
        assert!(outcome.is_clean());

        outcome.warn(Warning::new(WarningKind::Audit, "sink down"));
        outcome.extend([Warning::new(WarningKind::Scoring, "timeout")]);

        let mapped = outcome.map(|n| n * 2);
        assert_eq!(mapped.committed, 14);
        assert_eq!(mapped.warnings.len(), 2);
        assert_eq!(mapped.warnings[1].kind, WarningKind::Scoring);
    }
}
