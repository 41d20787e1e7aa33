//! Payment Intent Service
//!
//! Creates PIX payment intents with the provider and answers status
//! queries. A status query that observes an approved payment drives the
//! same idempotent reconciliation as the webhook, so deployments without a
//! public callback still mint.

use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::common::logging::log_deposit_event;
use crate::storage::{PaymentStore, StorageError};
use crate::types::payment::{PaymentIntent, PaymentStatus};
use crate::types::units::{min_deposit_brl, parse_brl};

use super::provider::{CreatePaymentRequest, PaymentProvider, ProviderError, ProviderPayment};
use super::reconciler::{ReconcileOutcome, WebhookReconciler};

/// Path of the webhook endpoint, appended to the public base URL
pub const WEBHOOK_PATH: &str = "/pix/webhook";

/// Intent service errors
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid notification URL: {0}")]
    InvalidNotificationUrl(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Provider answered 2xx without a code or an image
    #[error("QR code was not generated for payment {payment_id}; check that the account has a PIX key")]
    MissingQrCode { payment_id: String },

    /// Repeated request whose payment was already rejected
    #[error("payment {payment_id} for this requestId was rejected; send a new requestId")]
    RejectedRequest { payment_id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Deposit request as received from the client
#[derive(Debug, Clone, Default)]
pub struct CreateIntentInput {
    /// Raw amount (string or number rendered to string)
    pub amount: String,
    pub recipient_address: String,
    /// Client-generated request id used for deduplication
    pub request_id: Option<String>,
}

/// Data the client needs to pay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedIntent {
    pub payment_id: String,
    pub qr_code: Option<String>,
    pub qr_code_base64: Option<String>,
    pub amount: Decimal,
    pub recipient_address: String,
    pub status: PaymentStatus,
    /// Whether this is a replay of an earlier request
    pub reused: bool,
}

impl CreatedIntent {
    fn from_intent(intent: PaymentIntent, reused: bool) -> Self {
        Self {
            payment_id: intent.id,
            qr_code: intent.qr_code,
            qr_code_base64: intent.qr_code_base64,
            amount: intent.amount_brl,
            recipient_address: intent.recipient_address,
            status: intent.status,
            reused,
        }
    }
}

/// Status seen by a polling client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentStatus {
    /// Raw provider status ("pending" when nothing was found)
    pub status: String,
    pub payment_id: Option<String>,
    pub status_detail: Option<String>,
    /// Mint progress when the payment is approved and minting is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint: Option<ReconcileOutcome>,
}

/// Idempotency key for a deposit request
///
/// hex(SHA-256(recipient | normalized amount | request id)). Equal inputs
/// always produce the same key; the amount is normalized so "10" and
/// "10.00" collide.
pub fn idempotency_key(recipient_address: &str, amount: Decimal, request_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(recipient_address.trim().to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(amount.normalize().to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(request_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build and check the provider callback URL
///
/// Returns `Ok(None)` when the URL is valid but not publicly reachable
/// (plain http without a tunnel); the client then polls for status.
pub fn notification_url(public_base_url: &str) -> Result<Option<String>, IntentError> {
    let candidate = format!("{}{}", public_base_url.trim().trim_end_matches('/'), WEBHOOK_PATH);

    let parsed = url::Url::parse(&candidate)
        .map_err(|_| IntentError::InvalidNotificationUrl(candidate.clone()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(IntentError::InvalidNotificationUrl(candidate));
    }

    if parsed.scheme() == "https" || candidate.contains("ngrok") {
        Ok(Some(candidate))
    } else {
        Ok(None)
    }
}

/// Validate a deposit amount: a decimal of at least 0.01
pub fn parse_deposit_amount(raw: &str) -> Result<Decimal, IntentError> {
    let amount = parse_brl(raw)
        .ok_or_else(|| IntentError::Validation(format!("invalid amount: {:?}", raw)))?;
    if amount < min_deposit_brl() {
        return Err(IntentError::Validation(
            "minimum amount is R$ 0.01".to_string(),
        ));
    }
    Ok(amount)
}

/// Answer a repeated request from its stored intent
///
/// A rejected payment cannot be paid; the provider would hand back the
/// same payment for the same key, so the client must change requestId.
fn reuse(existing: PaymentIntent) -> Result<CreatedIntent, IntentError> {
    if existing.status == PaymentStatus::Rejected {
        return Err(IntentError::RejectedRequest {
            payment_id: existing.id,
        });
    }
    Ok(CreatedIntent::from_intent(existing, true))
}

/// Creates and queries PIX payment intents
pub struct PaymentIntentService {
    provider: Arc<dyn PaymentProvider>,
    store: Arc<dyn PaymentStore>,
    public_base_url: String,
    /// Present when the engine is configured
    reconciler: Option<Arc<WebhookReconciler>>,
}

impl PaymentIntentService {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: Arc<dyn PaymentStore>,
        public_base_url: impl Into<String>,
        reconciler: Option<Arc<WebhookReconciler>>,
    ) -> Self {
        Self {
            provider,
            store,
            public_base_url: public_base_url.into(),
            reconciler,
        }
    }

    /// Create a PIX intent, or return the one already created for the
    /// same idempotency key
    pub async fn create_intent(&self, input: CreateIntentInput) -> Result<CreatedIntent, IntentError> {
        let recipient = input.recipient_address.trim();
        if input.amount.trim().is_empty() || recipient.is_empty() {
            return Err(IntentError::Validation(
                "amount and recipientAddress are required".to_string(),
            ));
        }
        let amount = parse_deposit_amount(&input.amount)?;
        let notification_url = notification_url(&self.public_base_url)?;

        let request_id = match input.request_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let nonce = uuid::Uuid::new_v4().to_string();
                tracing::debug!(
                    target: "megabolsa::deposit",
                    recipient,
                    "no requestId supplied, intent will not be deduplicated"
                );
                nonce
            }
        };
        let key = idempotency_key(recipient, amount, &request_id);

        if let Some(existing) = self.store.get_intent_by_key(&key).await? {
            tracing::info!(
                target: "megabolsa::deposit",
                payment_id = %existing.id,
                status = %existing.status,
                "repeated request for an existing intent"
            );
            return reuse(existing);
        }

        if notification_url.is_none() {
            tracing::info!(
                target: "megabolsa::deposit",
                base_url = %self.public_base_url,
                "callback URL is not public, webhook omitted; client must poll"
            );
        }

        let request = CreatePaymentRequest::pix(amount, recipient, notification_url.clone());
        let payment = match self.provider.create_payment(&request, &key).await {
            Ok(p) => p,
            Err(e) => {
                log_deposit_event("intent_failed", "-", &amount.to_string(), false, Some(&e.to_string()));
                return Err(e.into());
            }
        };

        if payment.qr_code().is_none() && payment.qr_code_base64().is_none() {
            log_deposit_event(
                "intent_missing_qr_code",
                &payment.id,
                &amount.to_string(),
                false,
                Some("provider returned neither qr_code nor qr_code_base64"),
            );
            return Err(IntentError::MissingQrCode {
                payment_id: payment.id,
            });
        }

        let mut intent = PaymentIntent::new(payment.id.clone(), amount, recipient.to_string(), key.clone());
        intent.status = PaymentStatus::from_provider(&payment.status);
        intent.notification_url = notification_url;
        intent.qr_code = payment.qr_code().map(str::to_string);
        intent.qr_code_base64 = payment.qr_code_base64().map(str::to_string);

        match self.store.insert_intent(&intent).await {
            Ok(()) => {}
            // A concurrent request with the same key won the insert
            Err(StorageError::Duplicate(_)) => {
                if let Some(existing) = self.store.get_intent_by_key(&key).await? {
                    return reuse(existing);
                }
            }
            Err(e) => return Err(e.into()),
        }

        log_deposit_event("intent_created", &intent.id, &amount.to_string(), true, None);
        Ok(CreatedIntent::from_intent(intent, false))
    }

    /// Query a payment by id, falling back to a reference search when the
    /// provider does not know the id
    pub async fn query_intent(&self, id: &str) -> Result<IntentStatus, IntentError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(IntentError::Validation("preferenceId is required".to_string()));
        }

        let payment = match self.provider.get_payment(id).await {
            Ok(p) => Some(p),
            Err(e) if e.is_not_found() => self.provider.search_payments(id).await?.into_iter().next(),
            Err(e) => return Err(e.into()),
        };

        let payment = match payment {
            Some(p) => p,
            None => {
                return Ok(IntentStatus {
                    status: PaymentStatus::Pending.to_string(),
                    payment_id: None,
                    status_detail: None,
                    mint: None,
                })
            }
        };

        let mint = self.reconcile_observed(&payment).await;

        Ok(IntentStatus {
            status: if payment.status.is_empty() {
                PaymentStatus::Pending.to_string()
            } else {
                payment.status.clone()
            },
            payment_id: Some(payment.id.clone()),
            status_detail: payment.status_detail.clone(),
            mint,
        })
    }

    /// Record the observed status and, once approved, mint through the
    /// reconciler. Mint errors are logged; the next poll retries.
    async fn reconcile_observed(&self, payment: &ProviderPayment) -> Option<ReconcileOutcome> {
        let status = PaymentStatus::from_provider(&payment.status);

        match &self.reconciler {
            Some(reconciler) if status == PaymentStatus::Approved => {
                match reconciler.reconcile_payment(payment).await {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        tracing::warn!(
                            target: "megabolsa::deposit",
                            payment_id = %payment.id,
                            error = %e,
                            "polling reconciliation failed"
                        );
                        None
                    }
                }
            }
            _ => {
                match self.store.update_intent_status(&payment.id, status).await {
                    Ok(_) | Err(StorageError::NotFound(_)) => {}
                    Err(e) => tracing::warn!(
                        target: "megabolsa::deposit",
                        payment_id = %payment.id,
                        error = %e,
                        "failed to record payment status"
                    ),
                }
                None
            }
        }
    }
}
