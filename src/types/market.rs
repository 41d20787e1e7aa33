//! Market Types
//!
//! Read-only views of the prediction market contract: `getMarketInfo`
//! and `getSharesBalance`. Share quantities are 18-decimal base units and
//! are carried as `U256` end to end.

use ethereum_types::U256;
use serde::{Deserialize, Serialize};

/// Resolution outcome as encoded by the contract (`uint8`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Outcome {
    Unresolved = 0,
    OptionA = 1,
    OptionB = 2,
}

impl TryFrom<u8> for Outcome {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unresolved),
            1 => Ok(Self::OptionA),
            2 => Ok(Self::OptionB),
            other => Err(format!("invalid market outcome: {}", other)),
        }
    }
}

impl From<Outcome> for u8 {
    fn from(outcome: Outcome) -> u8 {
        outcome as u8
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::Unresolved
    }
}

/// Side of a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    OptionA,
    OptionB,
}

impl Outcome {
    /// Winning side, if any
    pub fn winning_side(&self) -> Option<Side> {
        match self {
            Self::Unresolved => None,
            Self::OptionA => Some(Side::OptionA),
            Self::OptionB => Some(Side::OptionB),
        }
    }
}

/// Market as returned by `getMarketInfo(marketId)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub question: String,
    pub option_a: String,
    pub option_b: String,
    /// UNIX seconds
    pub end_time: u64,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(with = "u256_dec")]
    pub total_option_a_shares: U256,
    #[serde(with = "u256_dec")]
    pub total_option_b_shares: U256,
    pub resolved: bool,
}

impl Market {
    /// Pool of both sides
    pub fn total_shares(&self) -> U256 {
        self.total_option_a_shares.saturating_add(self.total_option_b_shares)
    }

    pub fn total_for(&self, side: Side) -> U256 {
        match side {
            Side::OptionA => self.total_option_a_shares,
            Side::OptionB => self.total_option_b_shares,
        }
    }
}

/// User holdings from `getSharesBalance(marketId, address)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharesBalance {
    #[serde(with = "u256_dec")]
    pub option_a_shares: U256,
    #[serde(with = "u256_dec")]
    pub option_b_shares: U256,
}

impl SharesBalance {
    pub fn for_side(&self, side: Side) -> U256 {
        match side {
            Side::OptionA => self.option_a_shares,
            Side::OptionB => self.option_b_shares,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.option_a_shares.is_zero() && self.option_b_shares.is_zero()
    }
}

/// Serde for `U256` as a decimal string
///
/// Accepts a decimal string, a `0x` hex string or a JSON integer.
pub mod u256_dec {
    use ethereum_types::U256;
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        deserializer.deserialize_any(U256Visitor)
    }

    struct U256Visitor;

    impl<'de> Visitor<'de> for U256Visitor {
        type Value = U256;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer or integer string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
            Ok(U256::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
            u64::try_from(v)
                .map(U256::from)
                .map_err(|_| E::custom("negative share quantity"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
            let v = v.trim();
            let parsed = match v.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16).ok(),
                None => U256::from_dec_str(v).ok(),
            };
            parsed.ok_or_else(|| E::custom(format!("invalid integer: {}", v)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_deserializes_contract_shape() {
        let json = serde_json::json!({
            "question": "Will it rain?",
            "optionA": "Yes",
            "optionB": "No",
            "endTime": 1_700_000_000u64,
            "outcome": 1,
            "totalOptionAShares": "700000000000000000000",
            "totalOptionBShares": 300,
            "resolved": true
        });

        let market: Market = serde_json::from_value(json).unwrap();
        assert_eq!(market.outcome, Outcome::OptionA);
        assert_eq!(
            market.total_option_a_shares,
            U256::from(700u64) * U256::exp10(18)
        );
        assert_eq!(market.total_option_b_shares, U256::from(300u64));
    }

    #[test]
    fn test_outcome_rejects_unknown_values() {
        assert!(serde_json::from_value::<Outcome>(serde_json::json!(3)).is_err());
        assert_eq!(
            serde_json::from_value::<Outcome>(serde_json::json!(0)).unwrap(),
            Outcome::Unresolved
        );
        assert_eq!(serde_json::to_value(Outcome::OptionB).unwrap(), 2);
    }

    #[test]
    fn test_shares_serialize_as_decimal_strings() {
        let shares = SharesBalance {
            option_a_shares: U256::from(70u64),
            option_b_shares: U256::from_str_radix("ff", 16).unwrap(),
        };
        let json = serde_json::to_value(shares).unwrap();
        assert_eq!(json["optionAShares"], "70");
        assert_eq!(json["optionBShares"], "255");

        let hex: SharesBalance = serde_json::from_value(serde_json::json!({
            "optionAShares": "0x10",
            "optionBShares": "0"
        }))
        .unwrap();
        assert_eq!(hex.option_a_shares, U256::from(16u64));
        assert!(serde_json::from_value::<SharesBalance>(serde_json::json!({
            "optionAShares": -1,
            "optionBShares": "0"
        }))
        .is_err());
    }
}
