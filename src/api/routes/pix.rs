use axum::{
    body::Bytes,
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::server::SharedAppState;
use crate::common::error::AppError;
use crate::common::logging::log_security_event;
use crate::payments::CreateIntentInput;

use super::require;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    /// String or number
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub recipient_address: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQuery {
    pub preference_id: Option<String>,
    pub payment_id: Option<String>,
}

fn amount_text(amount: &Value) -> String {
    match amount {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// POST /pix/create-payment
pub async fn handle_create_payment(
    State(state): State<SharedAppState>,
    Json(body): Json<CreatePaymentBody>,
) -> Result<impl IntoResponse, AppError> {
    let intents = require(&state.intents, "payment provider")?;

    let created = intents
        .create_intent(CreateIntentInput {
            amount: amount_text(&body.amount),
            recipient_address: body.recipient_address,
            request_id: body.request_id,
        })
        .await?;

    Ok(Json(created))
}

/// GET /pix/create-payment?preferenceId=
///
/// Polling fallback for deployments the provider cannot call back.
pub async fn handle_query_payment(
    State(state): State<SharedAppState>,
    Query(query): Query<PaymentQuery>,
) -> Result<impl IntoResponse, AppError> {
    let intents = require(&state.intents, "payment provider")?;

    let id = query
        .preference_id
        .or(query.payment_id)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("preferenceId is required"))?;

    Ok(Json(intents.query_intent(&id).await?))
}

/// POST /pix/webhook
///
/// 2xx acknowledges; 5xx asks the provider to redeliver.
pub async fn handle_webhook(
    State(state): State<SharedAppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let reconciler = require(&state.reconciler, "payment webhook")?;

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        log_security_event(
            "webhook_invalid_payload",
            serde_json::json!({ "error": e.to_string(), "bytes": body.len() }),
            None,
        );
        AppError::validation("invalid JSON payload")
    })?;

    tracing::info!(
        target: "megabolsa::deposit",
        kind = ?payload.get("type").or_else(|| payload.get("topic")),
        action = ?payload.get("action"),
        "webhook received"
    );

    let ack = reconciler.handle_notification(&payload).await?;
    Ok(Json(ack.body()))
}

/// GET /pix/webhook
pub async fn handle_webhook_liveness() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Webhook endpoint is active",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
