use axum::{response::IntoResponse, Json};
use serde::Deserialize;

use crate::common::error::AppError;
use crate::settlement::{evaluate, Portfolio, Position};
use crate::types::market::{Market, SharesBalance};

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub market: Market,
    #[serde(default)]
    pub shares: SharesBalance,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioRequest {
    pub positions: Vec<Position>,
}

/// Upper bound on positions per portfolio request
pub const MAX_PORTFOLIO_POSITIONS: usize = 1_000;

/// POST /positions/evaluate
pub async fn handle_evaluate(Json(req): Json<EvaluateRequest>) -> impl IntoResponse {
    Json(evaluate(&req.market, &req.shares))
}

/// POST /positions/portfolio
pub async fn handle_portfolio(
    Json(req): Json<PortfolioRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.positions.len() > MAX_PORTFOLIO_POSITIONS {
        return Err(AppError::validation(format!(
            "at most {} positions per request",
            MAX_PORTFOLIO_POSITIONS
        )));
    }
    Ok(Json(Portfolio::aggregate(&req.positions).summary()))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{router, send};
    use axum::http::StatusCode;
    use serde_json::json;

    fn market(outcome: u8, resolved: bool) -> serde_json::Value {
        json!({
            "question": "Selic acima de 10%?",
            "optionA": "Sim",
            "optionB": "Não",
            "endTime": 1760000000,
            "outcome": outcome,
            "totalOptionAShares": "700",
            "totalOptionBShares": "300",
            "resolved": resolved
        })
    }

    #[tokio::test]
    async fn test_evaluate_winner() {
        let (app, _) = router(None, None);
        let (code, body) = send(
            app,
            "POST",
            "/positions/evaluate",
            Some(json!({
                "market": market(1, true),
                "shares": {"optionAShares": "70", "optionBShares": "0"}
            })),
        )
        .await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["winningsBaseUnits"], "100");
        assert_eq!(body["isWinner"], true);
        assert_eq!(body["probabilities"]["optionABps"], 7000);
    }

    #[tokio::test]
    async fn test_evaluate_loser() {
        let (app, _) = router(None, None);
        let (code, body) = send(
            app,
            "POST",
            "/positions/evaluate",
            Some(json!({
                "market": market(1, true),
                "shares": {"optionAShares": "0", "optionBShares": "50"}
            })),
        )
        .await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["winningsBaseUnits"], "0");
        assert_eq!(body["isWinner"], false);
    }

    #[tokio::test]
    async fn test_portfolio() {
        let (app, _) = router(None, None);
        let (code, body) = send(
            app,
            "POST",
            "/positions/portfolio",
            Some(json!({
                "positions": [
                    {"market": market(1, true), "shares": {"optionAShares": "70", "optionBShares": "0"}},
                    {"market": market(0, false), "shares": {"optionAShares": "0", "optionBShares": "30"}}
                ]
            })),
        )
        .await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["resolvedMarkets"], 1);
        assert_eq!(body["activeMarkets"], 1);
        assert_eq!(body["wonMarkets"], 1);
        assert_eq!(body["totalInvestedBaseUnits"], "100");
    }
}
