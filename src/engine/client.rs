//! Token Engine HTTP Client
//!
//! Talks to a thirdweb Engine instance: ERC20 `mint-to`, ERC20 `transfer`
//! (burn to the null address) and `transaction/status/{queueId}`.
//! All calls carry the bearer secret; contract writes also name the
//! signing wallet in `x-backend-wallet-address`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::common::config::{EngineConfig, HttpConfig};
use crate::common::http::{build_client, send_with_retry};
use crate::types::engine::{BurnRequest, MintRequest, TransactionStatus, TxState, BURN_ADDRESS};

/// Token engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx; `body` is the raw engine response text
    #[error("engine returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid engine response: {0}")]
    InvalidResponse(String),

    /// Rejected locally; nothing was sent
    #[error("invalid queue id: {0:?}")]
    InvalidQueueId(String),

    #[error("invalid engine URL: {0}")]
    InvalidUrl(String),
}

impl EngineError {
    /// Whether the engine certainly did not queue the write
    ///
    /// A 2xx with an unreadable body, or a timeout after sending, may
    /// still have queued it.
    pub fn is_rejection(&self) -> bool {
        match self {
            EngineError::Api { .. }
            | EngineError::InvalidQueueId(_)
            | EngineError::InvalidUrl(_) => true,
            EngineError::Http(e) => e.is_connect() || e.is_builder(),
            EngineError::InvalidResponse(_) => false,
        }
    }
}

/// Engine queue ids are UUIDs; anything outside `[A-Za-z0-9_-]` is refused
pub fn is_valid_queue_id(queue_id: &str) -> bool {
    !queue_id.is_empty()
        && queue_id.len() <= 128
        && queue_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Operations the gateway needs from the engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenEngine: Send + Sync {
    /// Submit a mint signed by the operator wallet; returns the queue id
    async fn mint_to(&self, request: &MintRequest) -> Result<String, EngineError>;

    /// Submit a transfer of the user's tokens to the null address
    async fn burn(&self, request: &BurnRequest) -> Result<String, EngineError>;

    /// Current state of a queued transaction
    async fn transaction_status(&self, queue_id: &str) -> Result<TransactionStatus, EngineError>;
}

#[derive(Debug, Deserialize)]
struct QueuedResponse {
    result: QueuedResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueuedResult {
    queue_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    result: StatusResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResult {
    status: String,
    transaction_hash: Option<String>,
    error_message: Option<String>,
}

/// thirdweb Engine client
#[derive(Debug, Clone)]
pub struct ThirdwebEngineClient {
    client: Client,
    http: HttpConfig,
    config: EngineConfig,
}

impl ThirdwebEngineClient {
    pub fn new(config: EngineConfig, http: HttpConfig) -> Result<Self, EngineError> {
        Ok(Self {
            client: build_client(&http)?,
            http,
            config,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn contract_url(&self, action: &str) -> String {
        format!(
            "{}/contract/{}/{}/erc20/{}",
            self.config.base_url, self.config.chain_id, self.config.token_address, action
        )
    }

    fn status_url(&self, queue_id: &str) -> Result<url::Url, EngineError> {
        if !is_valid_queue_id(queue_id) {
            return Err(EngineError::InvalidQueueId(queue_id.to_string()));
        }

        let invalid = || EngineError::InvalidUrl(self.config.base_url.clone());
        let mut url = url::Url::parse(&self.config.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["transaction", "status", queue_id]);
        Ok(url)
    }

    /// POST a contract write and extract the queue id
    ///
    /// Never retried on timeout: the engine may already have queued it.
    async fn submit(
        &self,
        url: &str,
        signer: &str,
        to_address: &str,
        amount: u64,
    ) -> Result<String, EngineError> {
        let body = json!({
            "toAddress": to_address,
            "amount": amount.to_string(),
        });

        let resp = send_with_retry(&self.http, false, || {
            self.client
                .post(url)
                .bearer_auth(&self.config.secret_key)
                .header("x-backend-wallet-address", signer)
                .json(&body)
        })
        .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let queued: QueuedResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;
        Ok(queued.result.queue_id)
    }
}

#[async_trait]
impl TokenEngine for ThirdwebEngineClient {
    async fn mint_to(&self, request: &MintRequest) -> Result<String, EngineError> {
        let url = self.contract_url("mint-to");
        self.submit(
            &url,
            &self.config.operator_address,
            &request.to_address,
            request.amount,
        )
        .await
    }

    async fn burn(&self, request: &BurnRequest) -> Result<String, EngineError> {
        let url = self.contract_url("transfer");
        self.submit(&url, &request.from_address, BURN_ADDRESS, request.amount)
            .await
    }

    async fn transaction_status(&self, queue_id: &str) -> Result<TransactionStatus, EngineError> {
        let url = self.status_url(queue_id)?;

        let resp = send_with_retry(&self.http, true, || {
            self.client.get(url.clone()).bearer_auth(&self.config.secret_key)
        })
        .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: StatusResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;

        Ok(TransactionStatus {
            queue_id: queue_id.to_string(),
            state: TxState::from_engine(&parsed.result.status),
            transaction_hash: parsed.result.transaction_hash,
            error_message: parsed.result.error_message,
        })
    }
}
