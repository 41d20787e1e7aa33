//! Token Mint/Burn Gateway
//!
//! Submits mint-to and burn instructions through the engine and, when
//! asked, blocks on the confirmation poller before returning. Mints are
//! signed by the operator wallet; burns name the user's wallet as signer.

use std::sync::Arc;

use crate::common::config::PollerConfig;
use crate::common::logging::log_mint_event;
use crate::types::engine::{BurnRequest, MintRequest, TokenTransfer};

use super::client::{EngineError, TokenEngine};
use super::poller::{ConfirmationPoller, PollError};

/// Gateway errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Submitted, then reported failed while waiting
    #[error(transparent)]
    Poll(#[from] PollError),
}

impl GatewayError {
    /// Whether the transfer certainly did not happen and may be resubmitted
    pub fn is_rejection(&self) -> bool {
        match self {
            GatewayError::Engine(e) => e.is_rejection(),
            GatewayError::Poll(PollError::TransactionFailed { .. }) => true,
        }
    }
}

/// Mint/burn front door used by the claim, webhook and withdrawal flows
#[derive(Clone)]
pub struct TokenGateway {
    engine: Arc<dyn TokenEngine>,
    poller: ConfirmationPoller,
}

impl TokenGateway {
    pub fn new(engine: Arc<dyn TokenEngine>, poller_config: PollerConfig) -> Self {
        let poller = ConfirmationPoller::new(engine.clone(), poller_config);
        Self { engine, poller }
    }

    /// Shared poller, for callers holding a queue id from elsewhere
    pub fn poller(&self) -> &ConfirmationPoller {
        &self.poller
    }

    /// Mint whole tokens to `address`
    pub async fn mint(
        &self,
        address: &str,
        amount: u64,
        wait_for_confirmation: bool,
    ) -> Result<TokenTransfer, GatewayError> {
        let request = MintRequest {
            to_address: address.to_string(),
            amount,
            wait_for_confirmation,
        };
        let amount_str = amount.to_string();

        let queue_id = match self.engine.mint_to(&request).await {
            Ok(id) => id,
            Err(e) => {
                log_mint_event("mint_failed", address, &amount_str, None, Some(&e.to_string()));
                return Err(e.into());
            }
        };
        log_mint_event("mint_submitted", address, &amount_str, Some(&queue_id), None);

        self.finish(queue_id, wait_for_confirmation, address, &amount_str)
            .await
    }

    /// Burn whole tokens from `from_address` (transfer to the null address)
    pub async fn burn(
        &self,
        from_address: &str,
        amount: u64,
        wait_for_confirmation: bool,
    ) -> Result<TokenTransfer, GatewayError> {
        let request = BurnRequest {
            from_address: from_address.to_string(),
            amount,
            wait_for_confirmation,
        };
        let amount_str = amount.to_string();

        let queue_id = match self.engine.burn(&request).await {
            Ok(id) => id,
            Err(e) => {
                log_mint_event("burn_failed", from_address, &amount_str, None, Some(&e.to_string()));
                return Err(e.into());
            }
        };
        log_mint_event("burn_submitted", from_address, &amount_str, Some(&queue_id), None);

        self.finish(queue_id, wait_for_confirmation, from_address, &amount_str)
            .await
    }

    async fn finish(
        &self,
        queue_id: String,
        wait_for_confirmation: bool,
        address: &str,
        amount: &str,
    ) -> Result<TokenTransfer, GatewayError> {
        if !wait_for_confirmation {
            return Ok(TokenTransfer {
                queue_id,
                is_mined: None,
            });
        }

        match self.poller.await_confirmation(&queue_id).await {
            Ok(is_mined) => {
                if !is_mined {
                    tracing::warn!(
                        target: "megabolsa::mint",
                        queue_id = %queue_id,
                        "transaction not mined within the poll ceiling"
                    );
                }
                Ok(TokenTransfer {
                    queue_id,
                    is_mined: Some(is_mined),
                })
            }
            Err(e) => {
                log_mint_event(
                    "transaction_failed",
                    address,
                    amount,
                    Some(&queue_id),
                    Some(&e.to_string()),
                );
                Err(e.into())
            }
        }
    }
}
