use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use crate::api::server::SharedAppState;
use crate::common::error::AppError;

use super::require;

#[derive(Debug, Deserialize)]
pub struct ClaimTokenRequest {
    #[serde(default)]
    pub address: String,
}

/// POST /claimToken
///
/// Mints the fixed grant to `address` and waits for the transaction.
/// 408 when it is not mined within the poll ceiling.
pub async fn handle_claim_token(
    State(state): State<SharedAppState>,
    Json(req): Json<ClaimTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let gateway = require(&state.gateway, "token engine")?;

    let address = req.address.trim();
    if address.is_empty() {
        return Err(AppError::validation("address is required"));
    }

    let transfer = gateway.mint(address, state.claim_amount, true).await?;
    match transfer.is_mined {
        Some(false) => Err(AppError::ConfirmationTimeout {
            queue_id: transfer.queue_id,
        }),
        _ => Ok(Json(serde_json::json!({
            "message": "Tokens claimed successfully",
            "queueId": transfer.queue_id,
            "amount": state.claim_amount.to_string(),
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{router, send};
    use crate::engine::client::{EngineError, MockTokenEngine};
    use crate::types::engine::{TransactionStatus, TxState};
    use axum::http::StatusCode;
    use serde_json::json;

    fn status(state: TxState) -> TransactionStatus {
        TransactionStatus {
            queue_id: "q-claim".to_string(),
            state,
            transaction_hash: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_claim_mined() {
        let mut engine = MockTokenEngine::new();
        engine
            .expect_mint_to()
            .withf(|req| req.to_address == "0xABC" && req.amount == 100)
            .times(1)
            .returning(|_| Ok("q-claim".to_string()));
        engine
            .expect_transaction_status()
            .returning(|_| Ok(status(TxState::Mined)));

        let (app, _) = router(Some(engine), None);
        let (code, body) = send(app, "POST", "/claimToken", Some(json!({"address": "0xABC"}))).await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["queueId"], "q-claim");
    }

    #[tokio::test]
    async fn test_claim_unconfirmed_is_408() {
        let mut engine = MockTokenEngine::new();
        engine
            .expect_mint_to()
            .returning(|_| Ok("q-claim".to_string()));
        engine
            .expect_transaction_status()
            .times(2)
            .returning(|_| Ok(status(TxState::Pending)));

        let (app, _) = router(Some(engine), None);
        let (code, body) = send(app, "POST", "/claimToken", Some(json!({"address": "0xABC"}))).await;

        assert_eq!(code, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["code"], "CONFIRMATION_TIMEOUT");
        assert_eq!(body["details"]["queueId"], "q-claim");
    }

    #[tokio::test]
    async fn test_claim_engine_error_body_is_passed_through() {
        let mut engine = MockTokenEngine::new();
        engine.expect_mint_to().returning(|_| {
            Err(EngineError::Api {
                status: 400,
                body: "{\"error\":\"invalid toAddress\"}".to_string(),
            })
        });

        let (app, _) = router(Some(engine), None);
        let (code, body) = send(app, "POST", "/claimToken", Some(json!({"address": "nope"}))).await;

        assert_eq!(code, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("invalid toAddress"));
    }

    #[tokio::test]
    async fn test_claim_without_engine_is_misconfigured() {
        let (app, _) = router(None, None);
        let (code, body) = send(app, "POST", "/claimToken", Some(json!({"address": "0xABC"}))).await;

        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Server misconfigured");
    }

    #[tokio::test]
    async fn test_claim_requires_address() {
        let (app, _) = router(Some(MockTokenEngine::new()), None);
        let (code, _) = send(app, "POST", "/claimToken", Some(json!({"address": " "}))).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }
}
