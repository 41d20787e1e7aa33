//! Storage Trait Definitions
//!
//! Defines abstract storage interfaces for payment intents, mint records
//! and withdrawals. Implementations can use SQLite (production) or
//! in-memory (testing, local development).

use async_trait::async_trait;
use thiserror::Error;

use crate::types::payment::{MintClaim, MintRecord, PaymentIntent, PaymentStatus};
use crate::types::withdrawal::WithdrawalRecord;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Payment intent and mint record storage
///
/// Implementations:
/// - `SqliteStore` - Production storage with SQLite
/// - `MemoryStore` - In-memory storage for testing
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new payment intent
    async fn insert_intent(&self, intent: &PaymentIntent) -> StorageResult<()>;

    /// Get an intent by provider payment id
    async fn get_intent(&self, id: &str) -> StorageResult<Option<PaymentIntent>>;

    /// Get the intent created under an idempotency key
    async fn get_intent_by_key(&self, key: &str) -> StorageResult<Option<PaymentIntent>>;

    /// Apply a provider status to a stored intent
    ///
    /// Terminal statuses are never overwritten; the stored intent is
    /// returned either way.
    async fn update_intent_status(
        &self,
        id: &str,
        status: PaymentStatus,
    ) -> StorageResult<PaymentIntent>;

    /// Atomically claim the mint for a payment
    ///
    /// Creates a `Minting` record when none exists, re-claims a `Failed`
    /// one, and otherwise reports the existing record without change.
    /// `Unknown` records report as in flight.
    async fn claim_mint(
        &self,
        payment_id: &str,
        recipient_address: &str,
        token_amount: u64,
    ) -> StorageResult<MintClaim>;

    /// Record the engine queue id for a claimed mint
    async fn complete_mint(&self, payment_id: &str, queue_id: &str) -> StorageResult<MintRecord>;

    /// Release a claimed mint after the engine definitely rejected it
    async fn fail_mint(&self, payment_id: &str, error: &str) -> StorageResult<MintRecord>;

    /// Hold a claimed mint whose engine outcome is unknown
    ///
    /// A held mint is never re-claimed, so a redelivery cannot mint twice.
    async fn hold_mint(&self, payment_id: &str, error: &str) -> StorageResult<MintRecord>;

    /// Get the mint record for a payment
    async fn get_mint(&self, payment_id: &str) -> StorageResult<Option<MintRecord>>;
}

/// Withdrawal storage
#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Insert a new withdrawal
    async fn insert_withdrawal(&self, record: &WithdrawalRecord) -> StorageResult<()>;

    /// Update an existing withdrawal
    async fn update_withdrawal(&self, record: &WithdrawalRecord) -> StorageResult<()>;

    /// Get a withdrawal by id
    async fn get_withdrawal(&self, id: &str) -> StorageResult<Option<WithdrawalRecord>>;

    /// All withdrawals of a wallet, newest first
    async fn list_withdrawals(&self, user_address: &str) -> StorageResult<Vec<WithdrawalRecord>>;
}

/// Decide a mint claim from the current record
///
/// Shared by every `PaymentStore` so the claim rules stay identical. The
/// caller persists the record only for `MintClaim::Claimed`, inside the
/// same critical section that read `existing`.
pub(crate) fn resolve_claim(
    existing: Option<MintRecord>,
    payment_id: &str,
    recipient_address: &str,
    token_amount: u64,
) -> MintClaim {
    use crate::types::payment::MintStatus;

    match existing {
        None => MintClaim::Claimed(MintRecord::new(
            payment_id.to_string(),
            recipient_address.to_string(),
            token_amount,
        )),
        Some(mut record) => match record.status {
            MintStatus::Failed => {
                record.mark_retry();
                MintClaim::Claimed(record)
            }
            MintStatus::Minting | MintStatus::Unknown => MintClaim::InFlight(record),
            MintStatus::Submitted => MintClaim::AlreadyMinted(record),
        },
    }
}
