//! Payment Provider HTTP Client
//!
//! Mercado Pago payments API: create a PIX payment, fetch a payment by id
//! and search payments by reference. Non-2xx responses keep the provider's
//! own message and body so handlers can pass them through.

use async_trait::async_trait;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::common::config::{HttpConfig, PaymentProviderConfig};
use crate::common::http::{build_client, send_with_retry};

/// Description shown to the payer
pub const PAYMENT_DESCRIPTION: &str = "Fundos para Megabolsa";

/// PIX payments accept any payer email
pub const DEFAULT_PAYER_EMAIL: &str = "user@megabolsa.com";

/// Provider errors
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx with the provider's message and parsed body
    #[error("{message}")]
    Api {
        status: u16,
        message: String,
        details: Value,
    },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::Api { status: 404, .. })
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payer {
    pub email: String,
}

/// Metadata attached at creation and read back by the reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PaymentMetadata {
    #[serde(default)]
    pub recipient_address: Option<String>,
    /// The amount as the client sent it; string or number on the wire
    #[serde(default)]
    pub amount_brl: Option<Value>,
    #[serde(default)]
    pub conversion_rate: Option<String>,
}

/// Body of `POST /v1/payments`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatePaymentRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub transaction_amount: Decimal,
    pub description: String,
    pub payment_method_id: String,
    pub payer: Payer,
    pub metadata: PaymentMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
}

impl CreatePaymentRequest {
    /// PIX payment crediting `recipient_address` at 1 BRL = 1 token
    pub fn pix(amount: Decimal, recipient_address: &str, notification_url: Option<String>) -> Self {
        Self {
            transaction_amount: amount,
            description: PAYMENT_DESCRIPTION.to_string(),
            payment_method_id: "pix".to_string(),
            payer: Payer {
                email: DEFAULT_PAYER_EMAIL.to_string(),
            },
            metadata: PaymentMetadata {
                recipient_address: Some(recipient_address.to_string()),
                amount_brl: Some(Value::String(amount.to_string())),
                conversion_rate: Some("1".to_string()),
            },
            notification_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct TransactionData {
    pub qr_code: Option<String>,
    pub qr_code_base64: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct PointOfInteraction {
    pub transaction_data: Option<TransactionData>,
}

/// Payment as returned by the provider
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderPayment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub status: String,
    pub status_detail: Option<String>,
    pub transaction_amount: Option<Decimal>,
    #[serde(default)]
    pub metadata: Option<PaymentMetadata>,
    pub point_of_interaction: Option<PointOfInteraction>,
}

impl ProviderPayment {
    pub fn recipient_address(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.recipient_address.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Deposit amount: metadata `amount_brl`, else `transaction_amount`
    pub fn amount_brl(&self) -> Option<Decimal> {
        let from_metadata = self
            .metadata
            .as_ref()
            .and_then(|m| m.amount_brl.as_ref())
            .and_then(|v| match v {
                Value::String(s) => Decimal::from_str(s.trim()).ok(),
                Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
                _ => None,
            });
        from_metadata.or(self.transaction_amount)
    }

    pub fn qr_code(&self) -> Option<&str> {
        self.transaction_data().and_then(|t| t.qr_code.as_deref())
    }

    pub fn qr_code_base64(&self) -> Option<&str> {
        self.transaction_data().and_then(|t| t.qr_code_base64.as_deref())
    }

    fn transaction_data(&self) -> Option<&TransactionData> {
        self.point_of_interaction
            .as_ref()
            .and_then(|p| p.transaction_data.as_ref())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ProviderPayment>,
}

/// Provider ids arrive as JSON numbers; accept strings too
pub fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Best human-readable message from an error body
///
/// Order: `message`, the raw text when it is not JSON, then the joined
/// `cause[].description|message` list.
pub fn extract_error_message(body: &str) -> (String, Value) {
    let details: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            let message = if body.trim().is_empty() {
                "payment provider request failed".to_string()
            } else {
                body.to_string()
            };
            return (message, Value::String(body.to_string()));
        }
    };

    if let Some(msg) = details.get("message").and_then(Value::as_str) {
        return (msg.to_string(), details);
    }
    if let Some(s) = details.as_str() {
        return (s.to_string(), details);
    }
    if let Some(causes) = details.get("cause").and_then(Value::as_array) {
        let joined = causes
            .iter()
            .filter_map(|c| {
                c.get("description")
                    .or_else(|| c.get("message"))
                    .and_then(Value::as_str)
            })
            .collect::<Vec<_>>()
            .join(", ");
        if !joined.is_empty() {
            return (joined, details);
        }
    }

    ("payment provider request failed".to_string(), details)
}

// ============================================================================
// Client
// ============================================================================

/// Operations the payment services need from the provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
        idempotency_key: &str,
    ) -> Result<ProviderPayment, ProviderError>;

    async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment, ProviderError>;

    /// Payments created under a reference id, newest first
    async fn search_payments(&self, reference: &str) -> Result<Vec<ProviderPayment>, ProviderError>;
}

/// Mercado Pago client
#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    http: HttpConfig,
    config: PaymentProviderConfig,
}

impl MercadoPagoClient {
    pub fn new(config: PaymentProviderConfig, http: HttpConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(&http)?,
            http,
            config,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.config.api_url
    }

    async fn read_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ProviderError> {
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let (message, details) = extract_error_message(&text);
            tracing::warn!(
                target: "megabolsa::deposit",
                status = status.as_u16(),
                body = %text,
                "payment provider error"
            );
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
                details,
            });
        }

        serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for MercadoPagoClient {
    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
        idempotency_key: &str,
    ) -> Result<ProviderPayment, ProviderError> {
        let url = format!("{}/v1/payments", self.config.api_url);

        // The idempotency key makes a replay safe, but a timed-out POST is
        // still not retried here.
        let resp = send_with_retry(&self.http, false, || {
            self.client
                .post(&url)
                .bearer_auth(&self.config.access_token)
                .header("X-Idempotency-Key", idempotency_key)
                .json(request)
        })
        .await?;

        Self::read_json(resp).await
    }

    async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment, ProviderError> {
        let url = format!("{}/v1/payments/{}", self.config.api_url, payment_id);

        let resp = send_with_retry(&self.http, true, || {
            self.client.get(&url).bearer_auth(&self.config.access_token)
        })
        .await?;

        Self::read_json(resp).await
    }

    async fn search_payments(&self, reference: &str) -> Result<Vec<ProviderPayment>, ProviderError> {
        let url = format!("{}/v1/payments/search", self.config.api_url);

        let resp = send_with_retry(&self.http, true, || {
            self.client
                .get(&url)
                .bearer_auth(&self.config.access_token)
                .query(&[("preference_id", reference)])
        })
        .await?;

        let search: SearchResponse = Self::read_json(resp).await?;
        Ok(search.results)
    }
}
