//! Payment Webhook Reconciler
//!
//! Turns provider notifications into mints, exactly once per approved
//! payment. The payment id → mint record mapping in the store is claimed
//! atomically before the engine is called; redelivered notifications find
//! the record and return the stored queue id instead of minting again.
//!
//! Per payment: pending → approved → minted, or pending → rejected.
//! Only a definite engine rejection releases a claim for redelivery; an
//! engine call with an unknown outcome leaves the mint held.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::common::logging::log_deposit_event;
use crate::engine::{GatewayError, TokenGateway};
use crate::storage::{PaymentStore, StorageError};
use crate::types::payment::{MintClaim, MintStatus, PaymentStatus};
use crate::types::units::tokens_from_brl;

use super::provider::{PaymentProvider, ProviderError, ProviderPayment};

/// Reconciliation errors
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Payment lookup failed; the provider should redeliver
    #[error("could not fetch payment {payment_id}: {source}")]
    Fetch {
        payment_id: String,
        #[source]
        source: ProviderError,
    },

    /// Approved payment without the metadata it was created with
    #[error("payment {payment_id}: {reason}")]
    MissingMetadata { payment_id: String, reason: String },

    #[error("mint for payment {payment_id} failed: {source}")]
    Mint {
        payment_id: String,
        #[source]
        source: GatewayError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What happened to an observed payment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Not approved; nothing minted
    NotApproved { status: String },
    /// This call submitted the mint
    #[serde(rename_all = "camelCase")]
    Minted {
        queue_id: String,
        amount_brl: Decimal,
        token_amount: u64,
    },
    /// A previous delivery already submitted the mint
    #[serde(rename_all = "camelCase")]
    AlreadyMinted { queue_id: String },
    /// Another delivery is submitting the mint right now
    InFlight,
    /// Approved amount below one whole token
    #[serde(rename_all = "camelCase")]
    NothingToMint { amount_brl: Decimal },
}

/// Acknowledgement returned to the provider
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookAck {
    /// Not a payment notification; acknowledged without action
    Ignored {
        kind: Option<String>,
        action: Option<String>,
    },
    Reconciled {
        payment_id: String,
        outcome: ReconcileOutcome,
    },
}

impl WebhookAck {
    /// JSON body for the 200 response
    pub fn body(&self) -> Value {
        match self {
            WebhookAck::Ignored { kind, action } => json!({
                "success": true,
                "message": "Notification received",
                "type": kind,
                "action": action,
            }),
            WebhookAck::Reconciled { payment_id, outcome } => match outcome {
                ReconcileOutcome::NotApproved { status } => json!({
                    "success": true,
                    "message": "Payment received but not yet approved",
                    "paymentId": payment_id,
                    "status": status,
                }),
                ReconcileOutcome::Minted {
                    queue_id,
                    amount_brl,
                    token_amount,
                } => json!({
                    "success": true,
                    "message": "Tokens sent",
                    "paymentId": payment_id,
                    "queueId": queue_id,
                    "amountBRL": amount_brl.to_string(),
                    "tokenAmount": token_amount.to_string(),
                }),
                ReconcileOutcome::AlreadyMinted { queue_id } => json!({
                    "success": true,
                    "message": "Payment already processed",
                    "paymentId": payment_id,
                    "queueId": queue_id,
                }),
                ReconcileOutcome::InFlight => json!({
                    "success": true,
                    "message": "Payment is being processed",
                    "paymentId": payment_id,
                }),
                ReconcileOutcome::NothingToMint { amount_brl } => json!({
                    "success": true,
                    "message": "Amount below one token, nothing to mint",
                    "paymentId": payment_id,
                    "amountBRL": amount_brl.to_string(),
                    "tokenAmount": "0",
                }),
            },
        }
    }
}

/// Provider payment id from either payload shape (`data.id` or `id`)
pub fn notification_payment_id(payload: &Value) -> Option<String> {
    let raw = payload
        .get("data")
        .and_then(|d| d.get("id"))
        .filter(|v| !v.is_null())
        .or_else(|| payload.get("id"))?;

    match raw {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reconciles provider payments into mints
pub struct WebhookReconciler {
    provider: Arc<dyn PaymentProvider>,
    gateway: Arc<TokenGateway>,
    store: Arc<dyn PaymentStore>,
}

impl WebhookReconciler {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        gateway: Arc<TokenGateway>,
        store: Arc<dyn PaymentStore>,
    ) -> Self {
        Self {
            provider,
            gateway,
            store,
        }
    }

    /// Handle one (possibly redelivered) notification
    pub async fn handle_notification(&self, payload: &Value) -> Result<WebhookAck, ReconcileError> {
        // Legacy IPN deliveries use `topic` instead of `type`
        let kind = payload
            .get("type")
            .or_else(|| payload.get("topic"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string);

        let payment_id = match (kind.as_deref(), notification_payment_id(payload)) {
            (Some("payment"), Some(id)) => id,
            _ => return Ok(WebhookAck::Ignored { kind, action }),
        };

        let payment = self
            .provider
            .get_payment(&payment_id)
            .await
            .map_err(|source| {
                log_deposit_event("payment_fetch_failed", &payment_id, "-", false, Some(&source.to_string()));
                ReconcileError::Fetch {
                    payment_id: payment_id.clone(),
                    source,
                }
            })?;

        let outcome = self.reconcile_payment(&payment).await?;
        Ok(WebhookAck::Reconciled {
            payment_id: payment.id,
            outcome,
        })
    }

    /// Mint for an approved payment at most once
    ///
    /// Shared by the webhook and the polling fallback.
    pub async fn reconcile_payment(
        &self,
        payment: &ProviderPayment,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let status = PaymentStatus::from_provider(&payment.status);
        match self.store.update_intent_status(&payment.id, status).await {
            Ok(_) | Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        if status != PaymentStatus::Approved {
            return Ok(ReconcileOutcome::NotApproved {
                status: payment.status.clone(),
            });
        }

        let missing = |reason: &str| {
            log_deposit_event("payment_metadata_missing", &payment.id, "-", false, Some(reason));
            ReconcileError::MissingMetadata {
                payment_id: payment.id.clone(),
                reason: reason.to_string(),
            }
        };

        let recipient = payment
            .recipient_address()
            .ok_or_else(|| missing("recipient_address not found in metadata"))?;
        let amount_brl = payment
            .amount_brl()
            .ok_or_else(|| missing("amount_brl not found in metadata"))?;
        let token_amount =
            tokens_from_brl(amount_brl).ok_or_else(|| missing("amount_brl is out of range"))?;

        if token_amount == 0 {
            log_deposit_event("payment_below_one_token", &payment.id, &amount_brl.to_string(), true, None);
            return Ok(ReconcileOutcome::NothingToMint { amount_brl });
        }

        let record = match self
            .store
            .claim_mint(&payment.id, recipient, token_amount)
            .await?
        {
            MintClaim::Claimed(record) => record,
            MintClaim::AlreadyMinted(record) => {
                tracing::info!(
                    target: "megabolsa::deposit",
                    payment_id = %payment.id,
                    queue_id = ?record.queue_id,
                    "duplicate notification, mint already submitted"
                );
                return Ok(ReconcileOutcome::AlreadyMinted {
                    queue_id: record.queue_id.unwrap_or_default(),
                });
            }
            MintClaim::InFlight(record) => {
                if record.status == MintStatus::Unknown {
                    tracing::warn!(
                        target: "megabolsa::deposit",
                        payment_id = %payment.id,
                        error = ?record.error,
                        "redelivery for a held mint, not resubmitting"
                    );
                } else {
                    tracing::info!(
                        target: "megabolsa::deposit",
                        payment_id = %payment.id,
                        "mint in flight on another delivery"
                    );
                }
                return Ok(ReconcileOutcome::InFlight);
            }
        };

        tracing::info!(
            target: "megabolsa::deposit",
            payment_id = %payment.id,
            amount_brl = %amount_brl,
            token_amount = record.token_amount,
            recipient = %record.recipient_address,
            attempt = record.attempts,
            "converting deposit to tokens"
        );

        // Respond to the provider right away; finality is not awaited here
        match self
            .gateway
            .mint(&record.recipient_address, record.token_amount, false)
            .await
        {
            Ok(transfer) => {
                if let Err(e) = self.store.complete_mint(&payment.id, &transfer.queue_id).await {
                    // Record stays `minting`, so redeliveries will not mint again
                    tracing::error!(
                        target: "megabolsa::deposit",
                        payment_id = %payment.id,
                        queue_id = %transfer.queue_id,
                        error = %e,
                        "mint submitted but not recorded"
                    );
                }
                log_deposit_event("payment_minted", &payment.id, &amount_brl.to_string(), true, None);
                Ok(ReconcileOutcome::Minted {
                    queue_id: transfer.queue_id,
                    amount_brl,
                    token_amount: record.token_amount,
                })
            }
            Err(source) => {
                let message = source.to_string();
                if source.is_rejection() {
                    self.store.fail_mint(&payment.id, &message).await?;
                    log_deposit_event("payment_mint_failed", &payment.id, &amount_brl.to_string(), false, Some(&message));
                } else {
                    // The engine may have queued it; a second mint_to could double it
                    self.store.hold_mint(&payment.id, &message).await?;
                    log_deposit_event("payment_mint_unknown", &payment.id, &amount_brl.to_string(), false, Some(&message));
                    tracing::error!(
                        target: "megabolsa::deposit",
                        payment_id = %payment.id,
                        recipient = %record.recipient_address,
                        token_amount = record.token_amount,
                        error = %message,
                        "mint outcome unknown, held for manual check against the engine"
                    );
                }
                Err(ReconcileError::Mint {
                    payment_id: payment.id.clone(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PollerConfig;
    use crate::engine::client::{EngineError, MockTokenEngine};
    use crate::payments::provider::MockPaymentProvider;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn approved_payment() -> ProviderPayment {
        serde_json::from_value(json!({
            "id": "p1",
            "status": "approved",
            "transaction_amount": 10.0,
            "metadata": {"recipient_address": "0xABC", "amount_brl": "10.00"}
        }))
        .unwrap()
    }

    fn provider_returning(payment: ProviderPayment, times: usize) -> MockPaymentProvider {
        let mut provider = MockPaymentProvider::new();
        provider
            .expect_get_payment()
            .withf(|id| id == "p1")
            .times(times)
            .returning(move |_| Ok(payment.clone()));
        provider
    }

    fn reconciler(
        provider: MockPaymentProvider,
        engine: MockTokenEngine,
    ) -> (WebhookReconciler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TokenGateway::new(
            Arc::new(engine),
            PollerConfig {
                max_attempts: 1,
                interval: Duration::from_millis(1),
            },
        ));
        (
            WebhookReconciler::new(Arc::new(provider), gateway, store.clone()),
            store,
        )
    }

    fn notification() -> Value {
        json!({"type": "payment", "action": "payment.updated", "data": {"id": "p1"}})
    }

    #[test]
    fn test_payment_id_shapes() {
        assert_eq!(notification_payment_id(&notification()).as_deref(), Some("p1"));
        assert_eq!(
            notification_payment_id(&json!({"type": "payment", "id": 123})).as_deref(),
            Some("123")
        );
        assert_eq!(
            notification_payment_id(&json!({"data": {"id": 77}})).as_deref(),
            Some("77")
        );
        assert_eq!(notification_payment_id(&json!({"type": "payment"})), None);
    }

    #[tokio::test]
    async fn test_approved_payment_mints_floor_amount() {
        let provider = provider_returning(approved_payment(), 1);
        let mut engine = MockTokenEngine::new();
        engine
            .expect_mint_to()
            .withf(|req| req.to_address == "0xABC" && req.amount == 10 && !req.wait_for_confirmation)
            .times(1)
            .returning(|_| Ok("q-1".to_string()));
        engine.expect_transaction_status().times(0);

        let (reconciler, store) = reconciler(provider, engine);
        let ack = reconciler.handle_notification(&notification()).await.unwrap();

        let body = ack.body();
        assert_eq!(body["success"], true);
        assert_eq!(body["queueId"], "q-1");
        assert_eq!(body["tokenAmount"], "10");

        let record = store.get_mint("p1").await.unwrap().unwrap();
        assert_eq!(record.status, MintStatus::Submitted);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_mints_once() {
        let provider = provider_returning(approved_payment(), 2);
        let mut engine = MockTokenEngine::new();
        engine
            .expect_mint_to()
            .times(1)
            .returning(|_| Ok("q-1".to_string()));

        let (reconciler, _) = reconciler(provider, engine);
        reconciler.handle_notification(&notification()).await.unwrap();
        let second = reconciler.handle_notification(&notification()).await.unwrap();

        assert_eq!(
            second,
            WebhookAck::Reconciled {
                payment_id: "p1".to_string(),
                outcome: ReconcileOutcome::AlreadyMinted {
                    queue_id: "q-1".to_string()
                },
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_mint_once() {
        let provider = provider_returning(approved_payment(), 8);
        let mut engine = MockTokenEngine::new();
        engine.expect_mint_to().times(1).returning(|_| Ok("q-1".to_string()));

        let (reconciler, _) = reconciler(provider, engine);
        let reconciler = Arc::new(reconciler);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = reconciler.clone();
                tokio::spawn(async move { r.handle_notification(&notification()).await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_pending_payment_does_not_mint() {
        let mut pending = approved_payment();
        pending.status = "pending".to_string();
        let provider = provider_returning(pending, 1);
        let mut engine = MockTokenEngine::new();
        engine.expect_mint_to().times(0);

        let (reconciler, store) = reconciler(provider, engine);
        let ack = reconciler.handle_notification(&notification()).await.unwrap();

        assert_eq!(ack.body()["status"], "pending");
        assert!(store.get_mint("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_payment_notification_is_ignored() {
        let mut provider = MockPaymentProvider::new();
        provider.expect_get_payment().times(0);
        let mut engine = MockTokenEngine::new();
        engine.expect_mint_to().times(0);

        let (reconciler, _) = reconciler(provider, engine);
        let ack = reconciler
            .handle_notification(&json!({"type": "merchant_order", "action": "created", "data": {"id": "m1"}}))
            .await
            .unwrap();

        let body = ack.body();
        assert_eq!(body["type"], "merchant_order");
        assert_eq!(body["action"], "created");
    }

    #[tokio::test]
    async fn test_missing_recipient_is_data_integrity_error() {
        let payment: ProviderPayment = serde_json::from_value(json!({
            "id": "p1",
            "status": "approved",
            "metadata": {"amount_brl": "10.00"}
        }))
        .unwrap();
        let provider = provider_returning(payment, 1);
        let mut engine = MockTokenEngine::new();
        engine.expect_mint_to().times(0);

        let (reconciler, _) = reconciler(provider, engine);
        let err = reconciler.handle_notification(&notification()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::MissingMetadata { .. }));
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces_error() {
        let mut provider = MockPaymentProvider::new();
        provider.expect_get_payment().times(1).returning(|_| {
            Err(ProviderError::Api {
                status: 500,
                message: "internal".to_string(),
                details: json!(null),
            })
        });
        let (reconciler, _) = reconciler(provider, MockTokenEngine::new());

        let err = reconciler.handle_notification(&notification()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_failed_mint_is_retried_on_redelivery() {
        let provider = provider_returning(approved_payment(), 2);
        let mut engine = MockTokenEngine::new();
        let mut seq = mockall::Sequence::new();
        engine
            .expect_mint_to()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(EngineError::Api {
                    status: 500,
                    body: "nonce too low".to_string(),
                })
            });
        engine
            .expect_mint_to()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("q-2".to_string()));

        let (reconciler, store) = reconciler(provider, engine);
        let err = reconciler.handle_notification(&notification()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Mint { .. }));
        assert_eq!(
            store.get_mint("p1").await.unwrap().unwrap().status,
            MintStatus::Failed
        );

        let ack = reconciler.handle_notification(&notification()).await.unwrap();
        assert_eq!(ack.body()["queueId"], "q-2");
        assert_eq!(store.get_mint("p1").await.unwrap().unwrap().attempts, 2);
    }

    /// First mint_to fails with `first`, later ones succeed with "q-2"
    ///
    /// Returns the record status after the failure, the body of the
    /// redelivery and how many times mint_to ran.
    async fn redeliver_after(first: EngineError) -> (MintStatus, Value, usize) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut first = Some(first);
        let mut engine = MockTokenEngine::new();
        engine.expect_mint_to().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            match first.take() {
                Some(e) => Err(e),
                None => Ok("q-2".to_string()),
            }
        });

        let (reconciler, store) = reconciler(provider_returning(approved_payment(), 2), engine);
        let err = reconciler.handle_notification(&notification()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Mint { .. }));
        let status = store.get_mint("p1").await.unwrap().unwrap().status;

        let ack = reconciler.handle_notification(&notification()).await.unwrap();
        (status, ack.body(), calls.load(Ordering::SeqCst))
    }

    async fn connect_error() -> reqwest::Error {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/contract", port))
            .send()
            .await
            .unwrap_err()
    }

    /// A listener that accepts and never answers
    async fn timeout_error() -> reqwest::Error {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap()
            .post(format!("http://{}/contract", addr))
            .send()
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_engine_rejection_releases_mint_for_redelivery() {
        let (status, body, calls) = redeliver_after(EngineError::Api {
            status: 503,
            body: "engine busy".to_string(),
        })
        .await;
        assert_eq!(status, MintStatus::Failed);
        assert_eq!(body["queueId"], "q-2");
        assert_eq!(calls, 2);

        let refused = connect_error().await;
        assert!(refused.is_connect());
        let (status, body, calls) = redeliver_after(EngineError::Http(refused)).await;
        assert_eq!(status, MintStatus::Failed);
        assert_eq!(body["queueId"], "q-2");
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_unreadable_engine_reply_holds_mint() {
        let (status, body, calls) =
            redeliver_after(EngineError::InvalidResponse("EOF while parsing".to_string())).await;
        assert_eq!(status, MintStatus::Unknown);
        assert_eq!(body["message"], "Payment is being processed");
        assert!(body.get("queueId").is_none());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_timed_out_mint_holds_mint() {
        let timed_out = timeout_error().await;
        assert!(timed_out.is_timeout());
        let (status, body, calls) = redeliver_after(EngineError::Http(timed_out)).await;
        assert_eq!(status, MintStatus::Unknown);
        assert_eq!(body["message"], "Payment is being processed");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_sub_token_amount_acknowledged_without_mint() {
        let payment: ProviderPayment = serde_json::from_value(json!({
            "id": "p1",
            "status": "approved",
            "metadata": {"recipient_address": "0xabc", "amount_brl": "0.50"}
        }))
        .unwrap();
        let provider = provider_returning(payment, 1);
        let mut engine = MockTokenEngine::new();
        engine.expect_mint_to().times(0);

        let (reconciler, _) = reconciler(provider, engine);
        let ack = reconciler.handle_notification(&notification()).await.unwrap();
        assert_eq!(ack.body()["tokenAmount"], "0");
    }
}
