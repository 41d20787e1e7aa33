//! Position & Settlement Calculator
//!
//! Pure functions over already-fetched market and share data. All share
//! arithmetic stays in `U256` base units; conversion to decimal token
//! strings happens only when building the response view.

use ethereum_types::{U256, U512};
use serde::{Deserialize, Serialize};

use crate::types::market::{u256_dec, Market, SharesBalance, Side};
use crate::types::units::format_units;

/// Basis points in 100%
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Winnings for one position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Winnings {
    /// Base units
    pub amount: U256,
    /// `None` while the market is unresolved
    pub is_winner: Option<bool>,
}

impl Winnings {
    fn none() -> Self {
        Self {
            amount: U256::zero(),
            is_winner: None,
        }
    }
}

/// Share of each option in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionProbabilities {
    pub option_a_bps: u32,
    pub option_b_bps: u32,
}

/// floor(a * b / c) without intermediate overflow; zero when `c` is zero
pub fn mul_div(a: U256, b: U256, c: U256) -> U256 {
    if c.is_zero() {
        return U256::zero();
    }
    if let Some(product) = a.checked_mul(b) {
        return product / c;
    }

    let wide = a.full_mul(b) / U512::from(c);
    U256::try_from(wide).unwrap_or(U256::MAX)
}

/// Payout of `user_shares` if their side wins
///
/// total pool * user shares / side total. A side with no shares pays
/// nothing.
pub fn payout(total_pool: U256, user_shares: U256, side_total: U256) -> U256 {
    if side_total.is_zero() || user_shares.is_zero() {
        return U256::zero();
    }
    mul_div(total_pool, user_shares, side_total)
}

/// Sum of both share quantities, in base units
pub fn compute_invested(shares: &SharesBalance) -> U256 {
    shares.option_a_shares.saturating_add(shares.option_b_shares)
}

/// Potential (unresolved) or actual (resolved) winnings
pub fn compute_winnings(market: &Market, shares: &SharesBalance) -> Winnings {
    let pool = market.total_shares();

    if !market.resolved {
        let best = [Side::OptionA, Side::OptionB]
            .into_iter()
            .filter(|side| !shares.for_side(*side).is_zero())
            .map(|side| payout(pool, shares.for_side(side), market.total_for(side)))
            .max()
            .unwrap_or_default();
        return Winnings {
            amount: best,
            is_winner: None,
        };
    }

    let winning_side = match market.outcome.winning_side() {
        Some(side) => side,
        // Resolved flag without an outcome; nothing can be claimed yet
        None => return Winnings::none(),
    };

    let user_winning = shares.for_side(winning_side);
    if user_winning.is_zero() {
        return Winnings {
            amount: U256::zero(),
            is_winner: Some(false),
        };
    }

    Winnings {
        amount: payout(pool, user_winning, market.total_for(winning_side)),
        is_winner: Some(true),
    }
}

/// Pool share of each option in basis points; 50/50 for an empty pool
pub fn option_probabilities(market: &Market) -> OptionProbabilities {
    let pool = market.total_shares();
    if pool.is_zero() {
        return OptionProbabilities {
            option_a_bps: BPS_DENOMINATOR / 2,
            option_b_bps: BPS_DENOMINATOR / 2,
        };
    }

    let a = mul_div(
        market.total_option_a_shares,
        U256::from(BPS_DENOMINATOR),
        pool,
    )
    .low_u32()
    .min(BPS_DENOMINATOR);

    OptionProbabilities {
        option_a_bps: a,
        option_b_bps: BPS_DENOMINATOR - a,
    }
}

// ============================================================================
// Response View
// ============================================================================

/// Evaluated position as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEvaluation {
    /// Decimal token string
    pub invested: String,
    #[serde(with = "u256_dec")]
    pub invested_base_units: U256,
    /// Potential winnings while unresolved, actual once resolved
    pub winnings: String,
    #[serde(with = "u256_dec")]
    pub winnings_base_units: U256,
    pub is_winner: Option<bool>,
    pub resolved: bool,
    pub probabilities: OptionProbabilities,
}

/// Evaluate one position
pub fn evaluate(market: &Market, shares: &SharesBalance) -> PositionEvaluation {
    let invested = compute_invested(shares);
    let winnings = compute_winnings(market, shares);

    PositionEvaluation {
        invested: format_units(invested),
        invested_base_units: invested,
        winnings: format_units(winnings.amount),
        winnings_base_units: winnings.amount,
        is_winner: winnings.is_winner,
        resolved: market.resolved,
        probabilities: option_probabilities(market),
    }
}
