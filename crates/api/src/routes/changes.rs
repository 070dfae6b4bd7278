//! Change request governance routes.
//!
//! Mutating endpoints accept an optimistic-concurrency token either as the
//! `expected_version` field or as an `If-Match` header (RFC 3339); the field
//! wins. Responses carry the committed change under `data`, best-effort
//! side-effect failures under `warnings`, and the new token as `ETag`.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::{AppState, error::ApiError, middleware::AuthUser};
use steerco_core::governance::{
    ChangeRequest, DecisionOutcome, GovernanceError, Lane, NewChangeRequest, Outcome,
};
use steerco_shared::AppError;
use steerco_shared::types::{ChangeRequestId, ProjectId};

/// Creates the change request routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects/{project_id}/changes", post(create_change))
        .route(
            "/changes/{change_id}",
            get(get_change).patch(edit_change).delete(delete_change),
        )
        .route("/changes/{change_id}/submit", post(submit_change))
        .route("/changes/{change_id}/decision", post(decide_change))
        .route("/changes/{change_id}/request-changes", post(request_changes))
        .route("/changes/{change_id}/lane", post(move_lane))
        .route("/changes/{change_id}/approval-chain", get(approval_chain))
        .route("/changes/{change_id}/approval-preview", get(approval_preview))
}

// ============================================================================
// Request Types
// ============================================================================

/// Request body for creating a change request.
#[derive(Debug, Deserialize)]
pub struct CreateChangeRequest {
    /// Short title.
    #[serde(default)]
    pub title: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Impact-analysis object.
    pub impact_analysis: Option<Value>,
}

/// Request body for a plain edit.
#[derive(Debug, Deserialize)]
pub struct EditChangeRequest {
    /// Fields to change.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Version the caller last saw.
    pub expected_version: Option<DateTime<Utc>>,
}

/// Body or query carrying only a version token.
#[derive(Debug, Default, Deserialize)]
pub struct VersionParams {
    /// Version the caller last saw.
    pub expected_version: Option<DateTime<Utc>>,
}

/// Request body for recording a decision.
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    /// `approved`, `rejected` or `rework`.
    pub outcome: String,
    /// Why the decision was taken.
    #[serde(default)]
    pub rationale: String,
    /// Version the caller last saw.
    pub expected_version: Option<DateTime<Utc>>,
}

/// Request body for sending a change back for rework.
#[derive(Debug, Default, Deserialize)]
pub struct RequestChangesRequest {
    /// Comment for the submitter.
    pub note: Option<String>,
    /// Version the caller last saw.
    pub expected_version: Option<DateTime<Utc>>,
}

/// Request body for a lane move.
#[derive(Debug, Deserialize)]
pub struct MoveLaneRequest {
    /// Target lane; absent means no move.
    pub to: Option<String>,
    /// Version the caller last saw.
    pub expected_version: Option<DateTime<Utc>>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Formats a version token the way `If-Match` accepts it back.
pub fn version_tag(version: DateTime<Utc>) -> String {
    version.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Resolves the expected version from the body field or the `If-Match` header.
fn expected_version(
    field: Option<DateTime<Utc>>,
    headers: &HeaderMap,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    if field.is_some() {
        return Ok(field);
    }
    let Some(raw) = headers.get(header::IF_MATCH) else {
        return Ok(None);
    };
    let value = raw
        .to_str()
        .map_err(|_| AppError::Validation("If-Match header is not valid text".to_string()))?;
    let token = value.trim().trim_start_matches("W/").trim_matches('"');
    DateTime::parse_from_rfc3339(token)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|_| {
            AppError::Validation(format!("If-Match must be an RFC 3339 timestamp, got '{value}'"))
                .into()
        })
}

/// Parses an optional JSON body; an empty body yields the default.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid request body: {e}")).into())
}

fn change_response(status: StatusCode, outcome: Outcome<ChangeRequest>) -> Response {
    let etag = format!("\"{}\"", version_tag(outcome.committed.updated_at));
    (
        status,
        [(header::ETAG, etag)],
        Json(json!({
            "data": outcome.committed,
            "warnings": outcome.warnings,
        })),
    )
        .into_response()
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/projects/{project_id}/changes` - Create a change request.
async fn create_change(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<CreateChangeRequest>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let input = NewChangeRequest {
        project_id: ProjectId::from_uuid(project_id),
        title: payload.title,
        description: payload.description,
        impact_analysis: payload.impact_analysis,
    };
    let outcome = state.governance.create(&actor, input).await?;
    Ok(change_response(StatusCode::CREATED, outcome))
}

/// GET `/changes/{change_id}` - Get a change request.
async fn get_change(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(change_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let change = state
        .governance
        .get(&actor, ChangeRequestId::from_uuid(change_id))
        .await?;
    Ok(change_response(StatusCode::OK, Outcome::new(change)))
}

/// PATCH `/changes/{change_id}` - Edit title, description or impact analysis.
async fn edit_change(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(change_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<EditChangeRequest>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let expected = expected_version(payload.expected_version, &headers)?;
    let outcome = state
        .governance
        .edit_fields(
            &actor,
            ChangeRequestId::from_uuid(change_id),
            &payload.fields,
            expected,
        )
        .await?;
    Ok(change_response(StatusCode::OK, outcome))
}

/// DELETE `/changes/{change_id}` - Delete a draft change.
async fn delete_change(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(change_id): Path<Uuid>,
    headers: HeaderMap,
    Query(params): Query<VersionParams>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let expected = expected_version(params.expected_version, &headers)?;
    let outcome = state
        .governance
        .delete(&actor, ChangeRequestId::from_uuid(change_id), expected)
        .await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "data": { "id": outcome.committed },
            "warnings": outcome.warnings,
        })),
    )
        .into_response())
}

/// POST `/changes/{change_id}/submit` - Submit for approval.
async fn submit_change(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(change_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let params: VersionParams = optional_body(&body)?;
    let expected = expected_version(params.expected_version, &headers)?;
    let outcome = state
        .governance
        .submit(&actor, ChangeRequestId::from_uuid(change_id), expected)
        .await?;
    Ok(change_response(StatusCode::OK, outcome))
}

/// POST `/changes/{change_id}/decision` - Approve, reject or request rework.
async fn decide_change(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(change_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<DecisionRequest>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let decision =
        DecisionOutcome::parse(&payload.outcome).ok_or_else(|| GovernanceError::UnknownValue {
            kind: "outcome",
            value: payload.outcome.clone(),
        })?;
    let expected = expected_version(payload.expected_version, &headers)?;
    let outcome = state
        .governance
        .decide(
            &actor,
            ChangeRequestId::from_uuid(change_id),
            decision,
            &payload.rationale,
            expected,
        )
        .await?;
    Ok(change_response(StatusCode::OK, outcome))
}

/// POST `/changes/{change_id}/request-changes` - Owner sends back for rework.
async fn request_changes(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(change_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let payload: RequestChangesRequest = optional_body(&body)?;
    let expected = expected_version(payload.expected_version, &headers)?;
    let outcome = state
        .governance
        .request_changes(
            &actor,
            ChangeRequestId::from_uuid(change_id),
            payload.note,
            expected,
        )
        .await?;
    Ok(change_response(StatusCode::OK, outcome))
}

/// POST `/changes/{change_id}/lane` - Move to another delivery lane.
async fn move_lane(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(change_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<MoveLaneRequest>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let to = match payload.to.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(Lane::parse(raw).ok_or_else(|| GovernanceError::UnknownValue {
            kind: "lane",
            value: raw.to_string(),
        })?),
    };
    let expected = expected_version(payload.expected_version, &headers)?;
    let outcome = state
        .governance
        .move_lane(&actor, ChangeRequestId::from_uuid(change_id), to, expected)
        .await?;
    Ok(change_response(StatusCode::OK, outcome))
}

/// GET `/changes/{change_id}/approval-chain` - Active chain with steps and approvers.
async fn approval_chain(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(change_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let view = state
        .governance
        .active_chain(&actor, ChangeRequestId::from_uuid(change_id))
        .await?;
    Ok((StatusCode::OK, Json(json!({ "data": view }))).into_response())
}

/// GET `/changes/{change_id}/approval-preview` - Chain a submit would build.
async fn approval_preview(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(change_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let plan = state
        .governance
        .preview_chain(&actor, ChangeRequestId::from_uuid(change_id))
        .await?;
    Ok((StatusCode::OK, Json(json!({ "data": plan }))).into_response())
}
