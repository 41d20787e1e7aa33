use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::api::server::SharedAppState;
use crate::common::error::AppError;
use crate::types::withdrawal::{WithdrawalRecord, WithdrawalStatus};
use crate::withdrawal::WithdrawalInput;

use super::require;

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Re-poll the burn of a withdrawal still awaiting confirmation
    #[serde(default)]
    pub refresh: bool,
}

fn withdrawal_response(record: WithdrawalRecord) -> (StatusCode, Json<serde_json::Value>) {
    match record.status {
        WithdrawalStatus::PayoutPending => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": "Burn confirmed; PIX payout queued",
                "withdrawalId": record.id,
                "amount": record.amount.to_string(),
                "userAddress": record.user_address,
                "pixKey": record.pix_key,
                "burnQueueId": record.burn_queue_id,
                "status": record.status,
            })),
        ),
        WithdrawalStatus::AwaitingBurnConfirmation => (
            StatusCode::REQUEST_TIMEOUT,
            Json(serde_json::json!({
                "success": false,
                "error": "Burn not mined within the timeout period",
                "code": "CONFIRMATION_TIMEOUT",
                "withdrawal": record,
            })),
        ),
        WithdrawalStatus::BurnFailed => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({
                "success": false,
                "error": record.error.clone().unwrap_or_else(|| "Burn failed".to_string()),
                "code": "UPSTREAM_ERROR",
                "withdrawal": record,
            })),
        ),
    }
}

/// POST /withdraw
///
/// Payout is queued only after the burn is observed as mined.
pub async fn handle_withdraw(
    State(state): State<SharedAppState>,
    Json(input): Json<WithdrawalInput>,
) -> Result<impl IntoResponse, AppError> {
    let withdrawals = require(&state.withdrawals, "token engine")?;
    let record = withdrawals.process(input).await?;
    Ok(withdrawal_response(record))
}

/// GET /withdraw/:id
pub async fn handle_withdrawal_status(
    State(state): State<SharedAppState>,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, AppError> {
    let withdrawals = require(&state.withdrawals, "token engine")?;
    let record = if query.refresh {
        withdrawals.recheck(&id).await?
    } else {
        withdrawals.get(&id).await?
    };
    Ok(Json(record))
}
