//! Settlement Module
//!
//! Position valuation and portfolio statistics for binary markets. Reads
//! market and share data supplied by the caller; no network or storage
//! access.

pub mod calculator;
pub mod portfolio;

pub use calculator::{
    compute_invested, compute_winnings, evaluate, mul_div, option_probabilities, payout,
    OptionProbabilities, PositionEvaluation, Winnings,
};
pub use portfolio::{Portfolio, PortfolioSummary, Position};
