//! Error responses.
//!
//! Every failure is rendered as `{ "error", "message", "details" }` with the
//! status code of its category.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use steerco_core::governance::GovernanceError;
use steerco_shared::AppError;

/// Failure of an HTTP handler.
#[derive(Debug)]
pub enum ApiError {
    /// The engine refused or failed the operation.
    Governance(GovernanceError),
    /// Request-level failure outside the engine.
    App(AppError),
}

impl From<GovernanceError> for ApiError {
    fn from(err: GovernanceError) -> Self {
        Self::Governance(err)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

fn status_from(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Governance(e) => {
                let status = status_from(e.status_code());
                if status.is_server_error() {
                    error!(error = %e, "Governance operation failed");
                    (status, e.error_code(), "An error occurred".to_string(), json!({}))
                } else {
                    (status, e.error_code(), e.to_string(), e.details())
                }
            }
            Self::App(e) => {
                let status = status_from(e.status_code());
                if status.is_server_error() {
                    error!(error = %e, "Request failed");
                    (status, e.error_code(), "An error occurred".to_string(), json!({}))
                } else {
                    (status, e.error_code(), e.to_string(), json!({}))
                }
            }
        };

        (
            status,
            Json(json!({
                "error": code,
                "message": message,
                "details": details,
            })),
        )
            .into_response()
    }
}
