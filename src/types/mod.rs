//! Shared Types Module
//!
//! Data types shared across the Megabolsa backend.

pub mod engine;
pub mod market;
pub mod payment;
pub mod units;
pub mod withdrawal;

// Re-exports for convenience
pub use engine::{BurnRequest, MintRequest, TokenTransfer, TransactionStatus, TxState, BURN_ADDRESS};
pub use market::{Market, Outcome, SharesBalance, Side};
pub use payment::{now_secs, MintClaim, MintRecord, MintStatus, PaymentIntent, PaymentStatus};
pub use units::{
    base_units_to_decimal, format_units, min_deposit_brl, parse_brl, tokens_from_brl,
    tokens_to_base_units, TOKEN_DECIMALS,
};
pub use withdrawal::{WithdrawalRecord, WithdrawalStatus};
