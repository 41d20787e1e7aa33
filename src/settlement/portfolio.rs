//! Portfolio Aggregation
//!
//! Folds evaluated positions across markets into profile statistics.
//! Totals stay in base units; rates are `Decimal` percentages.

use ethereum_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::market::{u256_dec, Market, SharesBalance};
use crate::types::units::{base_units_to_decimal, format_units};

use super::calculator::{compute_invested, compute_winnings};

/// One market and the user's shares in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    #[serde(default)]
    pub market_id: Option<u64>,
    pub market: Market,
    pub shares: SharesBalance,
}

/// Aggregated statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Portfolio {
    pub total_invested: U256,
    pub total_potential_winnings: U256,
    pub active_markets: u32,
    pub resolved_markets: u32,
    pub won_markets: u32,
    pub lost_markets: u32,
    pub biggest_win: U256,
    pub total_gains: U256,
    pub total_losses: U256,
}

impl Portfolio {
    /// Aggregate positions; markets without shares are skipped
    pub fn aggregate<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Self {
        let mut portfolio = Portfolio::default();
        for position in positions {
            portfolio.add(&position.market, &position.shares);
        }
        portfolio
    }

    fn add(&mut self, market: &Market, shares: &SharesBalance) {
        if shares.is_empty() {
            return;
        }

        let invested = compute_invested(shares);
        let winnings = compute_winnings(market, shares);

        self.total_invested = self.total_invested.saturating_add(invested);
        self.total_potential_winnings = self.total_potential_winnings.saturating_add(winnings.amount);

        if !market.resolved {
            self.active_markets += 1;
            return;
        }

        self.resolved_markets += 1;
        match winnings.is_winner {
            Some(true) => {
                self.won_markets += 1;
                self.total_gains = self.total_gains.saturating_add(winnings.amount);
                self.biggest_win = self.biggest_win.max(winnings.amount);
            }
            Some(false) => {
                self.lost_markets += 1;
                self.total_losses = self.total_losses.saturating_add(invested);
            }
            None => {}
        }
    }

    /// won / resolved, as a percentage
    pub fn win_rate(&self) -> Decimal {
        if self.resolved_markets == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.won_markets) * Decimal::ONE_HUNDRED / Decimal::from(self.resolved_markets)
    }

    /// (potential - invested) / invested, as a percentage
    pub fn roi(&self) -> Decimal {
        let invested = match base_units_to_decimal(self.total_invested) {
            Some(v) if !v.is_zero() => v,
            _ => return Decimal::ZERO,
        };
        let potential = match base_units_to_decimal(self.total_potential_winnings) {
            Some(v) => v,
            None => return Decimal::ZERO,
        };

        (potential - invested)
            .checked_div(invested)
            .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
            .map(|r| r.round_dp(2))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn summary(&self) -> PortfolioSummary {
        PortfolioSummary {
            total_invested: format_units(self.total_invested),
            total_potential_winnings: format_units(self.total_potential_winnings),
            active_markets: self.active_markets,
            resolved_markets: self.resolved_markets,
            won_markets: self.won_markets,
            lost_markets: self.lost_markets,
            win_rate: self.win_rate().round_dp(2),
            roi: self.roi(),
            biggest_win: format_units(self.biggest_win),
            total_gains: format_units(self.total_gains),
            total_losses: format_units(self.total_losses),
            total_invested_base_units: self.total_invested,
        }
    }
}

/// Portfolio as returned by the API; amounts are decimal token strings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_invested: String,
    pub total_potential_winnings: String,
    pub active_markets: u32,
    pub resolved_markets: u32,
    pub won_markets: u32,
    pub lost_markets: u32,
    pub win_rate: Decimal,
    pub roi: Decimal,
    pub biggest_win: String,
    pub total_gains: String,
    pub total_losses: String,
    #[serde(with = "u256_dec")]
    pub total_invested_base_units: U256,
}
