//! Payments Module
//!
//! Fiat (PIX) deposits: provider client, intent creation and the webhook
//! reconciler that converts approved payments into mints.

pub mod intent;
pub mod provider;
pub mod reconciler;

// Re-exports for convenience
pub use intent::{CreateIntentInput, CreatedIntent, IntentError, IntentStatus, PaymentIntentService};
pub use provider::{MercadoPagoClient, PaymentProvider, ProviderError, ProviderPayment};
pub use reconciler::{ReconcileError, ReconcileOutcome, WebhookAck, WebhookReconciler};
