//! In-Memory Storage Implementations
//!
//! Provides in-memory storage for testing and development.
//! Data is lost when the service restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{resolve_claim, PaymentStore, StorageError, StorageResult, WithdrawalStore};
use crate::types::payment::{MintClaim, MintRecord, PaymentIntent, PaymentStatus};
use crate::types::withdrawal::WithdrawalRecord;

/// In-memory store for intents, mints and withdrawals
///
/// Thread-safe storage for all record kinds.
/// Uses Arc<RwLock<>> for concurrent access.
#[derive(Clone, Default)]
pub struct MemoryStore {
    /// Intents indexed by payment ID
    intents: Arc<RwLock<HashMap<String, PaymentIntent>>>,
    /// Index: idempotency key -> payment ID
    by_key: Arc<RwLock<HashMap<String, String>>>,
    /// Mint records indexed by payment ID
    mints: Arc<RwLock<HashMap<String, MintRecord>>>,
    withdrawals: Arc<RwLock<HashMap<String, WithdrawalRecord>>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    async fn update_mint<F>(&self, payment_id: &str, apply: F) -> StorageResult<MintRecord>
    where
        F: FnOnce(&mut MintRecord),
    {
        let mut mints = self.mints.write().await;
        let record = mints
            .get_mut(payment_id)
            .ok_or_else(|| StorageError::NotFound(format!("mint for payment {}", payment_id)))?;
        apply(record);
        Ok(record.clone())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_intent(&self, intent: &PaymentIntent) -> StorageResult<()> {
        let mut intents = self.intents.write().await;
        let mut by_key = self.by_key.write().await;

        if intents.contains_key(&intent.id) {
            return Err(StorageError::Duplicate(format!("payment: {}", intent.id)));
        }
        if by_key.contains_key(&intent.idempotency_key) {
            return Err(StorageError::Duplicate(format!(
                "idempotency key: {}",
                intent.idempotency_key
            )));
        }

        by_key.insert(intent.idempotency_key.clone(), intent.id.clone());
        intents.insert(intent.id.clone(), intent.clone());
        Ok(())
    }

    async fn get_intent(&self, id: &str) -> StorageResult<Option<PaymentIntent>> {
        let intents = self.intents.read().await;
        Ok(intents.get(id).cloned())
    }

    async fn get_intent_by_key(&self, key: &str) -> StorageResult<Option<PaymentIntent>> {
        let by_key = self.by_key.read().await;
        let id = match by_key.get(key) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        drop(by_key);

        self.get_intent(&id).await
    }

    async fn update_intent_status(
        &self,
        id: &str,
        status: PaymentStatus,
    ) -> StorageResult<PaymentIntent> {
        let mut intents = self.intents.write().await;
        let intent = intents
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        intent.apply_status(status);
        Ok(intent.clone())
    }

    async fn claim_mint(
        &self,
        payment_id: &str,
        recipient_address: &str,
        token_amount: u64,
    ) -> StorageResult<MintClaim> {
        // Held across read and write so concurrent claims serialize
        let mut mints = self.mints.write().await;

        let claim = resolve_claim(
            mints.get(payment_id).cloned(),
            payment_id,
            recipient_address,
            token_amount,
        );
        if let MintClaim::Claimed(record) = &claim {
            mints.insert(payment_id.to_string(), record.clone());
        }

        Ok(claim)
    }

    async fn complete_mint(&self, payment_id: &str, queue_id: &str) -> StorageResult<MintRecord> {
        self.update_mint(payment_id, |r| r.mark_submitted(queue_id.to_string()))
            .await
    }

    async fn fail_mint(&self, payment_id: &str, error: &str) -> StorageResult<MintRecord> {
        self.update_mint(payment_id, |r| r.mark_failed(error.to_string()))
            .await
    }

    async fn hold_mint(&self, payment_id: &str, error: &str) -> StorageResult<MintRecord> {
        self.update_mint(payment_id, |r| r.mark_unknown(error.to_string()))
            .await
    }

    async fn get_mint(&self, payment_id: &str) -> StorageResult<Option<MintRecord>> {
        let mints = self.mints.read().await;
        Ok(mints.get(payment_id).cloned())
    }
}

/// One withdrawal per burn queue id
fn check_burn_unique(
    withdrawals: &HashMap<String, WithdrawalRecord>,
    record: &WithdrawalRecord,
) -> StorageResult<()> {
    let queue_id = match record.burn_queue_id.as_deref() {
        Some(q) => q,
        None => return Ok(()),
    };
    let taken = withdrawals
        .values()
        .any(|w| w.id != record.id && w.burn_queue_id.as_deref() == Some(queue_id));
    if taken {
        return Err(StorageError::Duplicate(format!("burn queue id: {}", queue_id)));
    }
    Ok(())
}

#[async_trait]
impl WithdrawalStore for MemoryStore {
    async fn insert_withdrawal(&self, record: &WithdrawalRecord) -> StorageResult<()> {
        let mut withdrawals = self.withdrawals.write().await;

        if withdrawals.contains_key(&record.id) {
            return Err(StorageError::Duplicate(format!("withdrawal: {}", record.id)));
        }
        check_burn_unique(&withdrawals, record)?;

        withdrawals.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_withdrawal(&self, record: &WithdrawalRecord) -> StorageResult<()> {
        let mut withdrawals = self.withdrawals.write().await;

        if !withdrawals.contains_key(&record.id) {
            return Err(StorageError::NotFound(record.id.clone()));
        }
        check_burn_unique(&withdrawals, record)?;

        withdrawals.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_withdrawal(&self, id: &str) -> StorageResult<Option<WithdrawalRecord>> {
        let withdrawals = self.withdrawals.read().await;
        Ok(withdrawals.get(id).cloned())
    }

    async fn list_withdrawals(&self, user_address: &str) -> StorageResult<Vec<WithdrawalRecord>> {
        let withdrawals = self.withdrawals.read().await;
        let mut records: Vec<_> = withdrawals
            .values()
            .filter(|r| r.user_address.eq_ignore_ascii_case(user_address))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::payment::MintStatus;
    use rust_decimal::Decimal;

    fn create_test_intent(id: &str, key: &str) -> PaymentIntent {
        PaymentIntent::new(
            id.to_string(),
            Decimal::new(1000, 2),
            "0xabc".to_string(),
            key.to_string(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_get_intent() {
        let store = MemoryStore::new();
        store.insert_intent(&create_test_intent("p1", "k1")).await.unwrap();

        let retrieved = store.get_intent("p1").await.unwrap().unwrap();
        assert_eq!(retrieved.recipient_address, "0xabc");

        let by_key = store.get_intent_by_key("k1").await.unwrap().unwrap();
        assert_eq!(by_key.id, "p1");
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key() {
        let store = MemoryStore::new();
        store.insert_intent(&create_test_intent("p1", "k1")).await.unwrap();

        let result = store.insert_intent(&create_test_intent("p2", "k1")).await;
        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_terminal_status_not_overwritten() {
        let store = MemoryStore::new();
        store.insert_intent(&create_test_intent("p1", "k1")).await.unwrap();

        store.update_intent_status("p1", PaymentStatus::Approved).await.unwrap();
        let intent = store
            .update_intent_status("p1", PaymentStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(intent.status, PaymentStatus::Approved);
    }

    #[tokio::test]
    async fn test_claim_mint_once() {
        let store = MemoryStore::new();

        let first = store.claim_mint("p1", "0xabc", 10).await.unwrap();
        assert!(matches!(first, MintClaim::Claimed(_)));

        let second = store.claim_mint("p1", "0xabc", 10).await.unwrap();
        assert!(matches!(second, MintClaim::InFlight(_)));

        store.complete_mint("p1", "q-1").await.unwrap();
        let third = store.claim_mint("p1", "0xabc", 10).await.unwrap();
        match third {
            MintClaim::AlreadyMinted(record) => {
                assert_eq!(record.queue_id.as_deref(), Some("q-1"))
            }
            other => panic!("unexpected claim: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_mint_can_be_reclaimed() {
        let store = MemoryStore::new();

        store.claim_mint("p1", "0xabc", 10).await.unwrap();
        let failed = store.fail_mint("p1", "engine 500").await.unwrap();
        assert_eq!(failed.status, MintStatus::Failed);

        match store.claim_mint("p1", "0xabc", 10).await.unwrap() {
            MintClaim::Claimed(record) => assert_eq!(record.attempts, 2),
            other => panic!("unexpected claim: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_held_mint_is_not_reclaimed() {
        let store = MemoryStore::new();

        store.claim_mint("p1", "0xabc", 10).await.unwrap();
        let held = store.hold_mint("p1", "unreadable engine reply").await.unwrap();
        assert_eq!(held.status, MintStatus::Unknown);

        match store.claim_mint("p1", "0xabc", 10).await.unwrap() {
            MintClaim::InFlight(record) => {
                assert_eq!(record.attempts, 1);
                assert_eq!(record.error.as_deref(), Some("unreadable engine reply"));
            }
            other => panic!("unexpected claim: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_winner() {
        let store = MemoryStore::new();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.claim_mint("p1", "0xabc", 10).await.unwrap() })
            })
            .collect();

        let mut claimed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), MintClaim::Claimed(_)) {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn test_burn_queue_id_backs_one_withdrawal() {
        let store = MemoryStore::new();

        let mut first = WithdrawalRecord::new("0xuser".into(), "k".into(), Decimal::ONE, 1);
        store.insert_withdrawal(&first).await.unwrap();
        first.set_burn_queue_id("q-small".to_string());
        store.update_withdrawal(&first).await.unwrap();
        // Re-saving the owner is fine
        store.update_withdrawal(&first).await.unwrap();

        let mut second = WithdrawalRecord::new("0xother".into(), "k".into(), Decimal::from(90000), 90000);
        store.insert_withdrawal(&second).await.unwrap();
        second.set_burn_queue_id("q-small".to_string());
        assert!(matches!(
            store.update_withdrawal(&second).await,
            Err(StorageError::Duplicate(_))
        ));

        let mut third = WithdrawalRecord::new("0xuser".into(), "k".into(), Decimal::from(5), 5);
        third.set_burn_queue_id("q-small".to_string());
        assert!(matches!(
            store.insert_withdrawal(&third).await,
            Err(StorageError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_withdrawals_by_user() {
        let store = MemoryStore::new();
        let mut record = WithdrawalRecord::new(
            "0xAbC".to_string(),
            "key@pix".to_string(),
            Decimal::new(500, 2),
            5,
        );
        store.insert_withdrawal(&record).await.unwrap();

        record.mark_payout_pending();
        store.update_withdrawal(&record).await.unwrap();

        let list = store.list_withdrawals("0xabc").await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, record.id);

        let missing = WithdrawalRecord::new("0x1".into(), "k".into(), Decimal::ONE, 1);
        assert!(matches!(
            store.update_withdrawal(&missing).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
