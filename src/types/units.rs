//! Unit Conversion Utilities
//!
//! Helpers for BRL deposits, whole-token amounts and the 18-decimal token
//! base unit. 1 BRL buys 1 token; fractional reais are dropped.

use ethereum_types::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Decimals of the credit token
pub const TOKEN_DECIMALS: usize = 18;

/// Smallest accepted fiat amount (R$ 0,01)
pub fn min_deposit_brl() -> Decimal {
    Decimal::new(1, 2)
}

/// 10^18
pub fn base_unit() -> U256 {
    U256::exp10(TOKEN_DECIMALS)
}

/// Parse a BRL amount ("10", "10.5", " 0.01 ")
pub fn parse_brl(s: &str) -> Option<Decimal> {
    Decimal::from_str(s.trim()).ok()
}

/// Whole tokens minted for a BRL amount: floor(amount)
///
/// `None` for negative amounts or amounts beyond `u64`.
pub fn tokens_from_brl(amount_brl: Decimal) -> Option<u64> {
    if amount_brl.is_sign_negative() {
        return None;
    }
    amount_brl.floor().to_u64()
}

/// Convert whole tokens into base units
pub fn tokens_to_base_units(tokens: u64) -> U256 {
    U256::from(tokens) * base_unit()
}

/// Format a base-unit amount as a decimal token string
///
/// Trailing fractional zeros are trimmed: 1.5e18 -> "1.5", 1e20 -> "100".
pub fn format_units(value: U256) -> String {
    let (whole, frac) = value.div_mod(base_unit());
    if frac.is_zero() {
        return whole.to_string();
    }

    let frac = format!("{:0>width$}", frac.to_string(), width = TOKEN_DECIMALS);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Convert base units to a `Decimal` token count for display
///
/// `None` when the whole part exceeds `u64`. Digits beyond `Decimal`
/// precision are rounded.
pub fn base_units_to_decimal(value: U256) -> Option<Decimal> {
    let (whole, frac) = value.div_mod(base_unit());
    if whole > U256::from(u64::MAX) {
        return None;
    }

    let whole = Decimal::from(whole.low_u64());
    let frac = Decimal::from_i128_with_scale(frac.low_u128() as i128, TOKEN_DECIMALS as u32);
    whole.checked_add(frac).map(|d| d.normalize())
}

/// Parse a base-unit integer given in decimal notation
pub fn parse_base_units(s: &str) -> Option<U256> {
    U256::from_dec_str(s.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_from_brl_floors() {
        assert_eq!(tokens_from_brl(parse_brl("10.00").unwrap()), Some(10));
        assert_eq!(tokens_from_brl(parse_brl("10.99").unwrap()), Some(10));
        assert_eq!(tokens_from_brl(parse_brl("0.50").unwrap()), Some(0));
        assert_eq!(tokens_from_brl(parse_brl("1").unwrap()), Some(1));
        assert_eq!(tokens_from_brl(parse_brl("-3").unwrap()), None);
    }

    #[test]
    fn test_tokens_from_brl_is_deterministic() {
        for raw in ["0.01", "7.3", "99.999", "12345.67"] {
            let amount = parse_brl(raw).unwrap();
            assert_eq!(tokens_from_brl(amount), tokens_from_brl(amount));
            assert_eq!(
                Decimal::from(tokens_from_brl(amount).unwrap()),
                amount.floor()
            );
        }
    }

    #[test]
    fn test_parse_brl() {
        assert_eq!(parse_brl(" 0.01 "), Some(min_deposit_brl()));
        assert!(parse_brl("abc").is_none());
        assert!(parse_brl("").is_none());
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::zero()), "0");
        assert_eq!(format_units(tokens_to_base_units(100)), "100");
        assert_eq!(format_units(base_unit() * 3 / 2), "1.5");
        assert_eq!(format_units(U256::one()), "0.000000000000000001");
    }

    #[test]
    fn test_base_units_to_decimal() {
        let value = tokens_to_base_units(70) + base_unit() / 4;
        assert_eq!(
            base_units_to_decimal(value),
            Some(Decimal::from_str("70.25").unwrap())
        );
        assert_eq!(base_units_to_decimal(U256::MAX), None);
    }

    #[test]
    fn test_parse_base_units() {
        assert_eq!(
            parse_base_units("1000000000000000000"),
            Some(base_unit())
        );
        assert!(parse_base_units("12abc").is_none());
    }
}
