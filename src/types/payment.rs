//! Payment Types
//!
//! Fiat payment intents and the mint records that make minting exactly-once
//! per approved payment:
//! pending → approved | rejected (terminal)
//! and for the mint: minting → submitted (terminal) | failed → minting (retry)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current UNIX time in seconds
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ============================================================================
// Payment Intent
// ============================================================================

/// Status of a fiat payment intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Waiting for the payer
    Pending,
    /// Paid; tokens are owed
    Approved,
    /// Rejected, cancelled or refunded by the provider
    Rejected,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl PaymentStatus {
    /// Map a provider status string
    ///
    /// Anything the provider may still move forward (in_process, authorized,
    /// in_mediation, unknown values) stays pending.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "approved" => Self::Approved,
            "rejected" | "cancelled" | "refunded" | "charged_back" => Self::Rejected,
            _ => Self::Pending,
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("unknown payment status: {}", s)),
        }
    }
}

/// A PIX payment intent created with the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Provider-assigned payment id
    pub id: String,
    /// Deposit amount in BRL
    pub amount_brl: Decimal,
    /// Wallet that receives the minted tokens
    pub recipient_address: String,
    pub status: PaymentStatus,
    /// Callback URL handed to the provider, if any
    pub notification_url: Option<String>,
    /// Key sent as X-Idempotency-Key
    pub idempotency_key: String,
    /// PIX copy-and-paste code
    pub qr_code: Option<String>,
    /// Rendered QR image (base64 PNG)
    pub qr_code_base64: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PaymentIntent {
    pub fn new(
        id: String,
        amount_brl: Decimal,
        recipient_address: String,
        idempotency_key: String,
    ) -> Self {
        let now = now_secs();
        Self {
            id,
            amount_brl,
            recipient_address,
            status: PaymentStatus::Pending,
            notification_url: None,
            idempotency_key,
            qr_code: None,
            qr_code_base64: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a status observed from the provider
    ///
    /// Returns `false` and leaves the intent untouched once it is terminal.
    pub fn apply_status(&mut self, status: PaymentStatus) -> bool {
        if self.status.is_terminal() || self.status == status {
            return false;
        }
        self.status = status;
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.updated_at = now_secs();
    }
}

// ============================================================================
// Mint Record
// ============================================================================

/// Mint progress for one approved payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintStatus {
    /// Claimed by a worker, engine call in progress
    Minting,
    /// Engine accepted the mint and returned a queue id
    Submitted,
    /// Engine call failed; may be claimed again
    Failed,
    /// Engine call may have queued the mint; held until an operator checks
    Unknown,
}

impl std::fmt::Display for MintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Minting => "minting",
            Self::Submitted => "submitted",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for MintStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minting" => Ok(Self::Minting),
            "submitted" => Ok(Self::Submitted),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("unknown mint status: {}", s)),
        }
    }
}

/// Durable payment id → mint mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    /// Provider payment id (primary key)
    pub payment_id: String,
    pub recipient_address: String,
    /// Whole tokens
    pub token_amount: u64,
    pub status: MintStatus,
    /// Engine queue id once submitted
    pub queue_id: Option<String>,
    /// Last engine error
    pub error: Option<String>,
    /// Number of claims, including the first
    pub attempts: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

impl MintRecord {
    /// Fresh claim in `Minting`
    pub fn new(payment_id: String, recipient_address: String, token_amount: u64) -> Self {
        let now = now_secs();
        Self {
            payment_id,
            recipient_address,
            token_amount,
            status: MintStatus::Minting,
            queue_id: None,
            error: None,
            attempts: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-claim after a failure
    pub fn mark_retry(&mut self) {
        self.status = MintStatus::Minting;
        self.error = None;
        self.attempts += 1;
        self.touch();
    }

    pub fn mark_submitted(&mut self, queue_id: String) {
        self.status = MintStatus::Submitted;
        self.queue_id = Some(queue_id);
        self.error = None;
        self.touch();
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = MintStatus::Failed;
        self.error = Some(error);
        self.touch();
    }

    /// Outcome unknown; never re-claimed automatically
    pub fn mark_unknown(&mut self, error: String) {
        self.status = MintStatus::Unknown;
        self.error = Some(error);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = now_secs();
    }
}

/// Outcome of an atomic mint claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintClaim {
    /// Caller owns the mint and must submit it
    Claimed(MintRecord),
    /// Another delivery is submitting right now, or the outcome of an
    /// earlier submission is unknown
    InFlight(MintRecord),
    /// Already submitted; carries the queue id
    AlreadyMinted(MintRecord),
}

impl MintClaim {
    pub fn record(&self) -> &MintRecord {
        match self {
            Self::Claimed(r) | Self::InFlight(r) | Self::AlreadyMinted(r) => r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_status_mapping() {
        assert_eq!(PaymentStatus::from_provider("approved"), PaymentStatus::Approved);
        assert_eq!(PaymentStatus::from_provider("cancelled"), PaymentStatus::Rejected);
        assert_eq!(PaymentStatus::from_provider("charged_back"), PaymentStatus::Rejected);
        assert_eq!(PaymentStatus::from_provider("in_process"), PaymentStatus::Pending);
        assert_eq!(PaymentStatus::from_provider("whatever"), PaymentStatus::Pending);
    }

    #[test]
    fn test_terminal_status_is_immutable() {
        let mut intent = PaymentIntent::new(
            "p1".to_string(),
            Decimal::new(1000, 2),
            "0xabc".to_string(),
            "key".to_string(),
        );

        assert!(!intent.apply_status(PaymentStatus::Pending));
        assert!(intent.apply_status(PaymentStatus::Approved));
        assert!(!intent.apply_status(PaymentStatus::Rejected));
        assert!(!intent.apply_status(PaymentStatus::Pending));
        assert_eq!(intent.status, PaymentStatus::Approved);
    }

    #[test]
    fn test_mint_record_lifecycle() {
        let mut record = MintRecord::new("p1".to_string(), "0xabc".to_string(), 10);
        assert_eq!(record.status, MintStatus::Minting);
        assert_eq!(record.attempts, 1);

        record.mark_failed("engine down".to_string());
        assert_eq!(record.status, MintStatus::Failed);

        record.mark_retry();
        assert_eq!(record.attempts, 2);
        assert!(record.error.is_none());

        record.mark_submitted("q-1".to_string());
        assert_eq!(record.status, MintStatus::Submitted);
        assert_eq!(record.queue_id.as_deref(), Some("q-1"));
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [PaymentStatus::Pending, PaymentStatus::Approved, PaymentStatus::Rejected] {
            assert_eq!(status.to_string().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("minted".parse::<MintStatus>().is_err());
    }
}
