//! Token Engine Types
//!
//! Mint and burn instructions submitted to the token engine, and the
//! transaction status it reports back for a queue id.

use serde::{Deserialize, Serialize};

/// Null address that receives burned tokens
pub const BURN_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Mint whole tokens to an address, signed by the operator wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub to_address: String,
    /// Whole tokens, no decimals
    pub amount: u64,
    pub wait_for_confirmation: bool,
}

/// Burn whole tokens from a user wallet (transfer to [`BURN_ADDRESS`])
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRequest {
    /// Wallet that signs the transfer
    pub from_address: String,
    pub amount: u64,
    pub wait_for_confirmation: bool,
}

/// State of a queued engine transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Pending,
    Mined,
    Failed,
}

impl TxState {
    /// Map an engine status string
    ///
    /// "queued", "sent" and unknown values are still pending.
    pub fn from_engine(status: &str) -> Self {
        match status {
            "mined" => Self::Mined,
            "errored" | "cancelled" | "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Mined => "mined",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Transaction status for a queue id; transient, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    pub queue_id: String,
    pub state: TxState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Result of a mint or burn submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub queue_id: String,
    /// `None` when the caller did not wait for confirmation
    pub is_mined: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_status_mapping() {
        assert_eq!(TxState::from_engine("mined"), TxState::Mined);
        assert_eq!(TxState::from_engine("errored"), TxState::Failed);
        assert_eq!(TxState::from_engine("cancelled"), TxState::Failed);
        assert_eq!(TxState::from_engine("queued"), TxState::Pending);
        assert_eq!(TxState::from_engine("sent"), TxState::Pending);
    }

    #[test]
    fn test_transfer_serializes_null_when_not_waited() {
        let transfer = TokenTransfer {
            queue_id: "q-1".to_string(),
            is_mined: None,
        };
        let json = serde_json::to_value(&transfer).unwrap();
        assert_eq!(json["queueId"], "q-1");
        assert!(json["isMined"].is_null());
    }
}
