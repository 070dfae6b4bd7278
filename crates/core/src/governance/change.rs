//! The governed change request and its plain-edit path.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use steerco_shared::types::{
    ApprovalChainId, ChangeRequestId, OrganizationId, ProjectId, UserId,
};

use crate::governance::error::GovernanceError;
use crate::governance::types::{DecisionStatus, Lane, ProjectRole};

/// Keys of `impact_analysis` consulted for the change amount, in priority order.
pub const AMOUNT_KEYS: [&str; 4] = ["amount", "cost", "estimated_cost", "budget_impact"];

/// Fields only governance operations may write.
pub const GOVERNANCE_FIELDS: [&str; 16] = [
    "decision_status",
    "delivery_status",
    "decision_rationale",
    "decision_by",
    "decision_at",
    "decision_role",
    "approval_chain_id",
    "status",
    "lane",
    "decisionStatus",
    "deliveryStatus",
    "decisionRationale",
    "decisionBy",
    "decisionAt",
    "decisionRole",
    "approvalChainId",
];

/// System-maintained fields.
pub const READ_ONLY_FIELDS: [&str; 13] = [
    "id",
    "project_id",
    "organization_id",
    "created_by",
    "created_at",
    "updated_at",
    "impact_score",
    "projectId",
    "organizationId",
    "createdBy",
    "createdAt",
    "updatedAt",
    "impactScore",
];

/// Fields the plain-edit path accepts.
pub const EDITABLE_FIELDS: [&str; 3] = ["title", "description", "impact_analysis"];

/// A change request under governance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Change request ID.
    pub id: ChangeRequestId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Project the change belongs to.
    pub project_id: ProjectId,
    /// Short title.
    pub title: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Impact-analysis payload; the amount is derived from it.
    pub impact_analysis: Value,
    /// Decision axis.
    pub decision_status: DecisionStatus,
    /// Delivery axis.
    pub delivery_status: Lane,
    /// Rationale of the last decision.
    pub decision_rationale: Option<String>,
    /// Who recorded the last decision.
    pub decision_by: Option<UserId>,
    /// When the last decision was recorded.
    pub decision_at: Option<DateTime<Utc>>,
    /// Role under which the last decision was recorded.
    pub decision_role: Option<ProjectRole>,
    /// Weak reference to the chain attached at the last submit.
    pub approval_chain_id: Option<ApprovalChainId>,
    /// Derived impact score.
    pub impact_score: Option<Decimal>,
    /// Creator.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Concurrency token.
    pub updated_at: DateTime<Utc>,
}

impl ChangeRequest {
    /// Amount used for approval-rule banding.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        amount_from_impact(&self.impact_analysis)
    }

    /// Clears the metadata of a previous decision.
    pub fn clear_decision(&mut self) {
        self.decision_rationale = None;
        self.decision_by = None;
        self.decision_at = None;
        self.decision_role = None;
    }
}

/// Input for creating a change request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewChangeRequest {
    /// Project the change belongs to.
    pub project_id: ProjectId,
    /// Short title.
    pub title: String,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Impact-analysis payload (JSON object).
    #[serde(default)]
    pub impact_analysis: Option<Value>,
}

impl NewChangeRequest {
    /// Validates the input, returning the normalized title and impact payload.
    pub fn validate(&self) -> Result<(String, Value), GovernanceError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(GovernanceError::InvalidField {
                field: "title".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        let impact = impact_object("impact_analysis", self.impact_analysis.clone())?;
        Ok((title.to_string(), impact))
    }
}

/// A validated plain edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeEdit {
    /// New title.
    pub title: Option<String>,
    /// New description; `Some(None)` clears it.
    pub description: Option<Option<String>>,
    /// Replacement impact-analysis payload.
    pub impact_analysis: Option<Value>,
}

impl ChangeEdit {
    /// Parses a raw patch object.
    ///
    /// Governance fields are rejected as a conflict; read-only and unknown
    /// fields as validation errors.
    pub fn from_patch(patch: &Map<String, Value>) -> Result<Self, GovernanceError> {
        let protected = collect_keys(patch, |k| GOVERNANCE_FIELDS.contains(&k));
        if !protected.is_empty() {
            return Err(GovernanceError::GovernanceFieldsProtected { fields: protected });
        }

        let read_only = collect_keys(patch, |k| READ_ONLY_FIELDS.contains(&k));
        if !read_only.is_empty() {
            return Err(GovernanceError::ReadOnlyFields { fields: read_only });
        }

        let unknown = collect_keys(patch, |k| !EDITABLE_FIELDS.contains(&k));
        if !unknown.is_empty() {
            return Err(GovernanceError::UnknownFields { fields: unknown });
        }

        let mut edit = Self::default();

        if let Some(value) = patch.get("title") {
            let title = value.as_str().map(str::trim).unwrap_or_default();
            if title.is_empty() {
                return Err(GovernanceError::InvalidField {
                    field: "title".to_string(),
                    reason: "must be a non-empty string".to_string(),
                });
            }
            edit.title = Some(title.to_string());
        }

        if let Some(value) = patch.get("description") {
            edit.description = match value {
                Value::Null => Some(None),
                Value::String(s) => Some(Some(s.clone())),
                _ => {
                    return Err(GovernanceError::InvalidField {
                        field: "description".to_string(),
                        reason: "must be a string or null".to_string(),
                    });
                }
            };
        }

        if let Some(value) = patch.get("impact_analysis") {
            edit.impact_analysis = Some(impact_object("impact_analysis", Some(value.clone()))?);
        }

        Ok(edit)
    }

    /// Returns true if the edit changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.impact_analysis.is_none()
    }

    /// Names of the fields this edit touches.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.title.is_some() {
            names.push("title");
        }
        if self.description.is_some() {
            names.push("description");
        }
        if self.impact_analysis.is_some() {
            names.push("impact_analysis");
        }
        names
    }

    /// Applies the edit to a change.
    pub fn apply(&self, change: &mut ChangeRequest) {
        if let Some(title) = &self.title {
            change.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            change.description.clone_from(description);
        }
        if let Some(impact) = &self.impact_analysis {
            change.impact_analysis = impact.clone();
        }
    }
}

fn collect_keys(patch: &Map<String, Value>, pred: impl Fn(&str) -> bool) -> Vec<String> {
    let mut keys: Vec<String> = patch.keys().filter(|k| pred(k)).cloned().collect();
    keys.sort();
    keys
}

fn impact_object(field: &str, value: Option<Value>) -> Result<Value, GovernanceError> {
    match value {
        None | Some(Value::Null) => Ok(Value::Object(Map::new())),
        Some(v @ Value::Object(_)) => {
            check_amount_range(&v)?;
            Ok(v)
        }
        Some(_) => Err(GovernanceError::InvalidField {
            field: field.to_string(),
            reason: "must be a JSON object".to_string(),
        }),
    }
}

enum RawAmount {
    Parsed(Decimal),
    OutOfRange { negative: bool },
    Unparseable,
}

fn first_amount(impact: &Value) -> Option<(&'static str, &Value)> {
    AMOUNT_KEYS
        .iter()
        .find_map(|key| impact.get(*key).filter(|v| !v.is_null()).map(|v| (*key, v)))
}

fn parse_amount(raw: &Value) -> RawAmount {
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s
            .chars()
            .filter(|c| *c != ',' && *c != '_' && !c.is_whitespace())
            .collect(),
        _ => return RawAmount::Unparseable,
    };

    if let Some(amount) = parse_decimal(&text) {
        return RawAmount::Parsed(amount);
    }
    // Numeric but too large for a decimal.
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() && value.abs() >= 1.0 => RawAmount::OutOfRange {
            negative: value.is_sign_negative(),
        },
        _ => RawAmount::Unparseable,
    }
}

fn check_amount_range(impact: &Value) -> Result<(), GovernanceError> {
    match first_amount(impact) {
        Some((key, raw)) if matches!(parse_amount(raw), RawAmount::OutOfRange { .. }) => {
            Err(GovernanceError::InvalidField {
                field: format!("impact_analysis.{key}"),
                reason: "exceeds the supported amount range".to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Derives the change amount from an impact-analysis payload.
///
/// The first present key of [`AMOUNT_KEYS`] wins. Numbers and numeric strings
/// (thousands separators allowed) are accepted; anything else, and negative
/// values, count as zero. Positive amounts too large for a decimal saturate
/// at [`Decimal::MAX`].
#[must_use]
pub fn amount_from_impact(impact: &Value) -> Decimal {
    let Some((_, raw)) = first_amount(impact) else {
        return Decimal::ZERO;
    };

    match parse_amount(raw) {
        RawAmount::Parsed(amount) if amount > Decimal::ZERO => amount,
        RawAmount::OutOfRange { negative: false } => Decimal::MAX,
        _ => Decimal::ZERO,
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("patch must be an object"),
        }
    }

    #[test]
    fn test_amount_prefers_first_present_key() {
        let impact = json!({ "cost": 200, "amount": 150, "budget_impact": 999 });
        assert_eq!(amount_from_impact(&impact), dec!(150));

        let impact = json!({ "estimated_cost": "12,500.50" });
        assert_eq!(amount_from_impact(&impact), dec!(12500.50));
    }

    #[test]
    fn test_amount_defaults_to_zero() {
        assert_eq!(amount_from_impact(&json!({})), Decimal::ZERO);
        assert_eq!(amount_from_impact(&json!({ "amount": "n/a" })), Decimal::ZERO);
        assert_eq!(amount_from_impact(&json!({ "amount": -40 })), Decimal::ZERO);
        assert_eq!(amount_from_impact(&json!({ "amount": true })), Decimal::ZERO);
        assert_eq!(amount_from_impact(&Value::Null), Decimal::ZERO);
    }

    #[test]
    fn test_amount_skips_null_keys() {
        let impact = json!({ "amount": null, "cost": "5000" });
        assert_eq!(amount_from_impact(&impact), dec!(5000));
    }

    #[test]
    fn test_amount_accepts_scientific_numbers() {
        let impact = json!({ "amount": 1.5e6 });
        assert_eq!(amount_from_impact(&impact), dec!(1500000));
    }

    #[test]
    fn test_oversized_amount_saturates_instead_of_zeroing() {
        assert_eq!(amount_from_impact(&json!({ "amount": 1e30 })), Decimal::MAX);
        let impact = json!({ "amount": "900000000000000000000000000000" });
        assert_eq!(amount_from_impact(&impact), Decimal::MAX);
        assert_eq!(amount_from_impact(&json!({ "cost": -1e30 })), Decimal::ZERO);
    }

    #[test]
    fn test_create_rejects_oversized_amount() {
        let input = NewChangeRequest {
            project_id: ProjectId::new(),
            title: "Replace core banking".to_string(),
            description: None,
            impact_analysis: Some(json!({ "amount": 1e30 })),
        };
        let err = input.validate().unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::InvalidField { ref field, .. } if field == "impact_analysis.amount"
        ));
    }

    #[test]
    fn test_edit_rejects_oversized_amount() {
        let err = ChangeEdit::from_patch(&patch(json!({
            "impact_analysis": { "estimated_cost": "900,000,000,000,000,000,000,000,000,000" }
        })))
        .unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::InvalidField { ref field, .. } if field == "impact_analysis.estimated_cost"
        ));

        let edit = ChangeEdit::from_patch(&patch(json!({
            "impact_analysis": { "amount": "1,000,000" }
        })))
        .unwrap();
        assert!(edit.impact_analysis.is_some());
    }

    #[test]
    fn test_edit_rejects_governance_fields_first() {
        let err = ChangeEdit::from_patch(&patch(json!({
            "title": "ok",
            "lane": "review",
            "id": "x",
            "decisionStatus": "approved"
        })))
        .unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::GovernanceFieldsProtected { ref fields }
                if fields == &vec!["decisionStatus".to_string(), "lane".to_string()]
        ));
    }

    #[test]
    fn test_edit_rejects_read_only_and_unknown() {
        let err = ChangeEdit::from_patch(&patch(json!({ "updated_at": "x" }))).unwrap_err();
        assert!(matches!(err, GovernanceError::ReadOnlyFields { .. }));

        let err = ChangeEdit::from_patch(&patch(json!({ "priority": 1 }))).unwrap_err();
        assert!(matches!(err, GovernanceError::UnknownFields { .. }));
    }

    #[test]
    fn test_edit_parses_fields() {
        let edit = ChangeEdit::from_patch(&patch(json!({
            "title": "  New title ",
            "description": null,
            "impact_analysis": { "amount": 10 }
        })))
        .unwrap();
        assert_eq!(edit.title.as_deref(), Some("New title"));
        assert_eq!(edit.description, Some(None));
        assert_eq!(edit.field_names(), vec!["title", "description", "impact_analysis"]);

        let err = ChangeEdit::from_patch(&patch(json!({ "impact_analysis": [1] }))).unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidField { .. }));
    }

    #[test]
    fn test_empty_patch_is_empty_edit() {
        let edit = ChangeEdit::from_patch(&Map::new()).unwrap();
        assert!(edit.is_empty());
    }

    #[test]
    fn test_new_change_requires_title() {
        let input = NewChangeRequest {
            project_id: ProjectId::new(),
            title: "   ".to_string(),
            description: None,
            impact_analysis: None,
        };
        assert!(matches!(
            input.validate(),
            Err(GovernanceError::InvalidField { .. })
        ));
    }
}
