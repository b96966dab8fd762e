//! Trade sizing policy.
//!
//! The executed size is the minimum of three quantities, floored to whole
//! contracts:
//!
//! 1. sqrt sizing: `floor(sqrt(potential_trade_size))` — sub-linear in
//!    book depth to cap slippage
//! 2. wallet budget: `floor(min(0.95 * kalshi_usd - ceil(kalshi_fee),
//!    poly_usdc))`, never negative; the 0.95 factor reserves headroom on
//!    the fee-charging venue
//! 3. the optional global max-spend guard
//!
//! A result below the shutdown balance is treated as zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

use cross_arb_core::config::TradingConfig;
use cross_arb_core::types::{Currency, Wallets};

/// Headroom factor applied to the Kalshi balance.
const KALSHI_BALANCE_FACTOR: Decimal = dec!(0.95);

/// Sizing policy parameters.
#[derive(Debug, Clone)]
pub struct SizingConfig {
    /// Sizes below this are treated as zero.
    pub shutdown_balance: Decimal,
    /// Cumulative-spend ceiling; `None` disables the guard.
    pub max_spend: Option<Decimal>,
}

impl SizingConfig {
    /// Derives the policy from trading configuration:
    /// `max_spend = minimum_wallet_balance - shutdown_balance` when that
    /// span is positive.
    #[must_use]
    pub fn from_trading(config: &TradingConfig) -> Self {
        let span = config.minimum_wallet_balance - config.shutdown_balance;
        Self {
            shutdown_balance: config.shutdown_balance,
            max_spend: (span > Decimal::ZERO).then_some(span),
        }
    }
}

/// Determines the number of contracts to trade.
///
/// Returns zero when a wallet currency is missing, the spend guard has
/// been reached, or the computed size falls below the shutdown balance.
#[must_use]
pub fn trade_size(
    wallets: &Wallets,
    potential_trade_size: Decimal,
    kalshi_fees: Decimal,
    cumulative_spend: Decimal,
    config: &SizingConfig,
) -> u32 {
    if let Some(max_spend) = config.max_spend {
        if cumulative_spend >= max_spend {
            return 0;
        }
    }

    let size = sqrt_size(potential_trade_size).min(wallet_budget(wallets, kalshi_fees));
    if size < config.shutdown_balance {
        return 0;
    }
    size.to_u32().unwrap_or(0)
}

/// `floor(sqrt(floor(potential)))`, zero for negative input.
fn sqrt_size(potential: Decimal) -> Decimal {
    if potential < Decimal::ZERO {
        return Decimal::ZERO;
    }
    potential
        .floor()
        .sqrt()
        .map(|d| d.floor())
        .unwrap_or(Decimal::ZERO)
}

/// The lesser of the adjusted Kalshi budget and the Polymarket balance,
/// floored and clamped at zero. Missing currencies yield zero.
fn wallet_budget(wallets: &Wallets, kalshi_fees: Decimal) -> Decimal {
    let Some(kalshi_usd) = wallets.kalshi.balance(Currency::Usd) else {
        return Decimal::ZERO;
    };
    let Some(poly_usdc) = wallets.polymarket.balance(Currency::UsdcE) else {
        return Decimal::ZERO;
    };

    let kalshi_adjusted = KALSHI_BALANCE_FACTOR * kalshi_usd - kalshi_fees.ceil();
    kalshi_adjusted.min(poly_usdc).floor().max(Decimal::ZERO)
}
