//! Withdrawal Service
//!
//! Burn-confirm-then-payout: the server submits the burn from the user's
//! wallet, confirms it through the poller, and only then queues the PIX
//! payout. Nothing is paid out for a burn that was not observed as mined,
//! and a burn queue id backs at most one withdrawal.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::common::logging::log_withdrawal_event;
use crate::engine::TokenGateway;
use crate::storage::{StorageError, WithdrawalStore};
use crate::types::units::{min_deposit_brl, parse_brl, tokens_from_brl};
use crate::types::withdrawal::{WithdrawalRecord, WithdrawalStatus};

/// Withdrawal errors
#[derive(Debug, thiserror::Error)]
pub enum WithdrawalError {
    #[error("{0}")]
    Validation(String),

    #[error("withdrawal not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Withdrawal request as received from the client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WithdrawalInput {
    pub amount: String,
    pub user_address: String,
    pub pix_key: String,
    /// Refused when present; burns are submitted by the server
    pub burn_queue_id: Option<String>,
}

/// Validated withdrawal parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedWithdrawal {
    pub amount: Decimal,
    pub token_amount: u64,
    pub user_address: String,
    pub pix_key: String,
}

/// Check a withdrawal request before any engine call
pub fn validate(input: &WithdrawalInput) -> Result<ValidatedWithdrawal, WithdrawalError> {
    let user_address = input.user_address.trim();
    let pix_key = input.pix_key.trim();
    if input.amount.trim().is_empty() || user_address.is_empty() {
        return Err(WithdrawalError::Validation(
            "amount, userAddress and pixKey are required".to_string(),
        ));
    }
    if pix_key.is_empty() {
        return Err(WithdrawalError::Validation("PIX key is required".to_string()));
    }
    if input.burn_queue_id.is_some() {
        return Err(WithdrawalError::Validation(
            "burnQueueId is not accepted; the burn is submitted by the server".to_string(),
        ));
    }

    let amount = parse_brl(&input.amount)
        .ok_or_else(|| WithdrawalError::Validation(format!("invalid amount: {:?}", input.amount)))?;
    if amount < min_deposit_brl() {
        return Err(WithdrawalError::Validation(
            "minimum amount is R$ 0.01".to_string(),
        ));
    }

    let token_amount = tokens_from_brl(amount)
        .filter(|t| *t >= 1)
        .ok_or_else(|| {
            WithdrawalError::Validation("amount must cover at least one whole token".to_string())
        })?;

    Ok(ValidatedWithdrawal {
        amount,
        token_amount,
        user_address: user_address.to_string(),
        pix_key: pix_key.to_string(),
    })
}

/// Processes withdrawals
pub struct WithdrawalService {
    gateway: Arc<TokenGateway>,
    store: Arc<dyn WithdrawalStore>,
}

impl WithdrawalService {
    pub fn new(gateway: Arc<TokenGateway>, store: Arc<dyn WithdrawalStore>) -> Self {
        Self { gateway, store }
    }

    /// Burn, confirm, then queue the payout
    ///
    /// Burn outcomes are reported through the record status, not as
    /// errors: `payout_pending` when mined, `awaiting_burn_confirmation`
    /// when the poll ceiling was hit, `burn_failed` when the engine
    /// rejected or failed the burn.
    pub async fn process(&self, input: WithdrawalInput) -> Result<WithdrawalRecord, WithdrawalError> {
        let request = validate(&input)?;

        let mut record = WithdrawalRecord::new(
            request.user_address.clone(),
            request.pix_key.clone(),
            request.amount,
            request.token_amount,
        );
        self.store.insert_withdrawal(&record).await?;

        tracing::info!(
            target: "megabolsa::withdrawal",
            withdrawal_id = %record.id,
            amount = %record.amount,
            user_address = %record.user_address,
            "starting withdrawal"
        );

        let confirmed = match self
            .gateway
            .burn(&record.user_address, record.token_amount, true)
            .await
        {
            Ok(transfer) => {
                record.set_burn_queue_id(transfer.queue_id);
                Ok(transfer.is_mined.unwrap_or(false))
            }
            Err(e) => Err(e.to_string()),
        };

        match confirmed {
            Ok(true) => {
                record.mark_payout_pending();
                log_withdrawal_event(
                    "payout_queued",
                    &record.id,
                    record.token_amount,
                    &record.user_address,
                    true,
                    None,
                );
            }
            Ok(false) => {
                log_withdrawal_event(
                    "burn_unconfirmed",
                    &record.id,
                    record.token_amount,
                    &record.user_address,
                    false,
                    Some("burn not mined within the timeout period"),
                );
            }
            Err(error) => {
                log_withdrawal_event(
                    "burn_failed",
                    &record.id,
                    record.token_amount,
                    &record.user_address,
                    false,
                    Some(&error),
                );
                record.mark_burn_failed(error);
            }
        }

        self.store.update_withdrawal(&record).await?;
        Ok(record)
    }

    /// Look up a withdrawal
    pub async fn get(&self, id: &str) -> Result<WithdrawalRecord, WithdrawalError> {
        self.store
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| WithdrawalError::NotFound(id.to_string()))
    }

    /// Re-check the burn of a withdrawal still awaiting confirmation
    pub async fn recheck(&self, id: &str) -> Result<WithdrawalRecord, WithdrawalError> {
        let mut record = self.get(id).await?;
        if record.status != WithdrawalStatus::AwaitingBurnConfirmation {
            return Ok(record);
        }
        let queue_id = match record.burn_queue_id.clone() {
            Some(q) => q,
            None => return Ok(record),
        };

        match self.gateway.poller().await_confirmation(&queue_id).await {
            Ok(true) => record.mark_payout_pending(),
            Ok(false) => return Ok(record),
            Err(e) => record.mark_burn_failed(e.to_string()),
        }
        self.store.update_withdrawal(&record).await?;
        Ok(record)
    }
}
