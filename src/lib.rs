//! Megabolsa Backend - Deposit, Mint and Settlement Services
//!
//! Server-side pieces of the prediction market that cannot run in the
//! browser:
//!
//! 1. **PIX deposits** - payment intents with Mercado Pago, webhook and
//!    polling reconciliation that mints credit tokens exactly once per
//!    approved payment
//! 2. **Token gateway** - mint/burn through thirdweb Engine with bounded
//!    confirmation polling
//! 3. **Withdrawals** - burn confirmed before the PIX payout is queued
//! 4. **Settlement** - position valuation and portfolio statistics from
//!    on-chain share balances
//!
//! The market contract itself is an external collaborator; this crate only
//! consumes its read views.

pub mod api;
pub mod common;
pub mod engine;
pub mod payments;
pub mod settlement;
pub mod storage;
pub mod types;
pub mod withdrawal;

// Re-exports: configuration and errors
pub use common::{AppError, ConfigError, MegabolsaConfig};

// Re-exports: token engine
pub use engine::{ConfirmationPoller, EngineError, ThirdwebEngineClient, TokenEngine, TokenGateway};

// Re-exports: payments
pub use payments::{
    MercadoPagoClient, PaymentIntentService, PaymentProvider, ReconcileOutcome, WebhookReconciler,
};

// Re-exports: settlement
pub use settlement::{compute_invested, compute_winnings, Portfolio, PositionEvaluation, Winnings};

// Re-exports: storage
pub use storage::{MemoryStore, PaymentStore, SqliteStore, WithdrawalStore};

// Re-exports: withdrawals
pub use withdrawal::{WithdrawalError, WithdrawalService};
