//! Withdrawal Types
//!
//! A withdrawal burns credit tokens and, once the burn is mined, queues a
//! PIX payout:
//! awaiting_burn_confirmation → payout_pending | burn_failed

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::payment::now_secs;

/// Status of a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Burn submitted (or referenced), not yet observed as mined
    AwaitingBurnConfirmation,
    /// Engine reported the burn as failed
    BurnFailed,
    /// Burn mined; PIX payout queued
    PayoutPending,
}

impl Default for WithdrawalStatus {
    fn default() -> Self {
        Self::AwaitingBurnConfirmation
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingBurnConfirmation => "awaiting_burn_confirmation",
            Self::BurnFailed => "burn_failed",
            Self::PayoutPending => "payout_pending",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_burn_confirmation" => Ok(Self::AwaitingBurnConfirmation),
            "burn_failed" => Ok(Self::BurnFailed),
            "payout_pending" => Ok(Self::PayoutPending),
            _ => Err(format!("unknown withdrawal status: {}", s)),
        }
    }
}

/// A withdrawal request and its burn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRecord {
    pub id: String,
    pub user_address: String,
    pub pix_key: String,
    /// Requested amount in BRL
    pub amount: Decimal,
    /// Whole tokens burned: floor(amount)
    pub token_amount: u64,
    pub status: WithdrawalStatus,
    pub burn_queue_id: Option<String>,
    pub error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl WithdrawalRecord {
    pub fn new(user_address: String, pix_key: String, amount: Decimal, token_amount: u64) -> Self {
        let now = now_secs();
        Self {
            id: format!("wd_{}", uuid::Uuid::new_v4().simple()),
            user_address,
            pix_key,
            amount,
            token_amount,
            status: WithdrawalStatus::AwaitingBurnConfirmation,
            burn_queue_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_burn_queue_id(&mut self, queue_id: String) {
        self.burn_queue_id = Some(queue_id);
        self.touch();
    }

    pub fn mark_payout_pending(&mut self) {
        self.status = WithdrawalStatus::PayoutPending;
        self.error = None;
        self.touch();
    }

    pub fn mark_burn_failed(&mut self, error: String) {
        self.status = WithdrawalStatus::BurnFailed;
        self.error = Some(error);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = now_secs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdrawal_lifecycle() {
        let mut record = WithdrawalRecord::new(
            "0xabc".to_string(),
            "user@pix.com".to_string(),
            Decimal::new(2550, 2),
            25,
        );
        assert!(record.id.starts_with("wd_"));
        assert_eq!(record.status, WithdrawalStatus::AwaitingBurnConfirmation);

        record.set_burn_queue_id("q-9".to_string());
        record.mark_payout_pending();
        assert_eq!(record.status, WithdrawalStatus::PayoutPending);
        assert_eq!(record.burn_queue_id.as_deref(), Some("q-9"));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(
            WithdrawalStatus::AwaitingBurnConfirmation.to_string(),
            "awaiting_burn_confirmation"
        );
        assert_eq!(
            "burn_failed".parse::<WithdrawalStatus>().unwrap(),
            WithdrawalStatus::BurnFailed
        );
    }
}
