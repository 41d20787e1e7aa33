//! API Routes Module
//!
//! Route handlers organized by domain:
//! - health: Health check
//! - claim: Fixed token grant
//! - pix: PIX deposits and provider webhook
//! - withdraw: Burn-then-payout withdrawals
//! - positions: Position valuation and portfolio statistics
//!
//! Every handler returns `AppError` on failure, rendered here as
//! `{ error, code, details? }`.

pub mod claim;
pub mod health;
pub mod pix;
pub mod positions;
pub mod withdraw;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::common::error::AppError;

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = match &self {
            AppError::Config(missing) => ErrorResponse {
                error: "Server misconfigured".to_string(),
                code: self.error_code(),
                details: Some(serde_json::json!({ "reason": missing })),
            },
            AppError::Upstream {
                message, details, ..
            } => ErrorResponse {
                error: message.clone(),
                code: self.error_code(),
                details: details.clone(),
            },
            AppError::ConfirmationTimeout { queue_id } => ErrorResponse {
                error: self.to_string(),
                code: self.error_code(),
                details: Some(serde_json::json!({ "queueId": queue_id })),
            },
            other => ErrorResponse {
                error: other.to_string(),
                code: other.error_code(),
                details: None,
            },
        };

        if status.is_server_error() {
            tracing::error!(target: "megabolsa::api", code = body.code, error = %body.error, "request failed");
        }

        (status, Json(body)).into_response()
    }
}

/// Unwrap an optional service or answer "Server misconfigured"
pub(crate) fn require<T>(service: &Option<Arc<T>>, section: &str) -> Result<Arc<T>, AppError> {
    service
        .clone()
        .ok_or_else(|| AppError::config(format!("{} is not configured", section)))
}
