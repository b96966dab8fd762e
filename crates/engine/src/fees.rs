//! Kalshi taker fee model.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Default Kalshi fee rate.
pub const DEFAULT_FEE_RATE: Decimal = dec!(0.07);

/// Calculates the Kalshi trading fee for `contracts` at `price`.
///
/// `fee = ceil_cents(rate * contracts * price * (1 - price))`, where
/// `ceil_cents` rounds the raw cent amount up to the next whole cent. The
/// fee is zero outside the open interval (0, 1).
#[must_use]
pub fn kalshi_fee(contracts: Decimal, price: Decimal, rate: Decimal) -> Decimal {
    if price <= Decimal::ZERO || price >= Decimal::ONE {
        return Decimal::ZERO;
    }
    let raw = rate * contracts * price * (Decimal::ONE - price);
    let cents = (raw * dec!(100)).ceil();
    cents / dec!(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_rounds_up_to_next_cent() {
        // 0.07 * 10 * 0.45 * 0.55 = 0.17325 -> 17.325 cents -> 18 cents.
        assert_eq!(kalshi_fee(dec!(10), dec!(0.45), DEFAULT_FEE_RATE), dec!(0.18));
    }

    #[test]
    fn test_fee_exact_cents_not_inflated() {
        // 0.07 * 100 * 0.5 * 0.5 = 1.75 exactly.
        assert_eq!(kalshi_fee(dec!(100), dec!(0.5), DEFAULT_FEE_RATE), dec!(1.75));
    }

    #[test]
    fn test_fee_zero_at_boundaries() {
        assert_eq!(kalshi_fee(dec!(10), Decimal::ZERO, DEFAULT_FEE_RATE), Decimal::ZERO);
        assert_eq!(kalshi_fee(dec!(10), Decimal::ONE, DEFAULT_FEE_RATE), Decimal::ZERO);
        assert_eq!(kalshi_fee(dec!(10), dec!(1.2), DEFAULT_FEE_RATE), Decimal::ZERO);
        assert_eq!(kalshi_fee(dec!(10), dec!(-0.2), DEFAULT_FEE_RATE), Decimal::ZERO);
    }

    #[test]
    fn test_fee_zero_contracts() {
        assert_eq!(kalshi_fee(Decimal::ZERO, dec!(0.45), DEFAULT_FEE_RATE), Decimal::ZERO);
    }

    #[test]
    fn test_fee_scales_with_rate() {
        let low = kalshi_fee(dec!(10), dec!(0.45), dec!(0.01));
        let high = kalshi_fee(dec!(10), dec!(0.45), dec!(0.14));
        assert!(low < high);
    }
}
