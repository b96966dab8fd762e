//! Canonical domain vocabulary shared by the adapters and the engine.
//!
//! All financial quantities use [`rust_decimal::Decimal`]; binary floating
//! point is never used for prices or sizes.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Alias for monetary amounts in the venue's natural unit.
pub type Money = Decimal;

// =============================================================================
// Enumerations
// =============================================================================

/// A canonical enumeration of the supported venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    /// The sequence-gap venue (single normalized YES book, prices in cents).
    Kalshi,
    /// The asset-id venue (separate YES and NO books, decimal-string prices).
    Polymarket,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kalshi => write!(f, "KALSHI"),
            Self::Polymarket => write!(f, "POLYMARKET"),
        }
    }
}

/// Binary market outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// Book side for normalized order book updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Bid side.
    Buy,
    /// Ask side.
    Sell,
}

/// Possible Kalshi positions one can enter into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KalshiSide {
    Yes,
    No,
}

impl KalshiSide {
    /// Returns the API string representation.
    #[must_use]
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

/// Possible Polymarket order sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolySide {
    Buy,
    Sell,
}

impl PolySide {
    /// Returns the API string representation.
    #[must_use]
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// Currencies tracked by the wallet model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Kalshi account dollars.
    Usd,
    /// Polymarket collateral tokens.
    UsdcE,
    /// Polygon gas tokens.
    Pol,
}

// =============================================================================
// Price levels and market pair configuration
// =============================================================================

/// A single (price, size) level carried in normalized book events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Binding between a canonical market id and both venues' instrument ids.
///
/// Produced by orchestrator market discovery and handed to both adapters
/// before their run loops start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPairConfig {
    /// Canonical market id used across the engine (the Kalshi ticker).
    pub market_id: String,
    /// Kalshi market ticker.
    pub kalshi_ticker: String,
    /// Polymarket YES token id.
    pub polymarket_yes_token_id: String,
    /// Polymarket NO token id.
    pub polymarket_no_token_id: String,
}

// =============================================================================
// Opportunity
// =============================================================================

/// A profitable, risk-free "buy-both" arbitrage opportunity.
///
/// Immutable once produced by the detector; consumed by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub market_id: String,
    pub buy_yes_platform: Platform,
    pub buy_yes_price: Decimal,
    pub buy_no_platform: Platform,
    pub buy_no_price: Decimal,
    /// `1.0 - effective_cost` at detection time.
    pub profit_margin: Decimal,
    /// Top-of-book size available to the trade, before sizing policy.
    pub potential_trade_size: Decimal,
    /// Kalshi fee for `potential_trade_size` contracts at the Kalshi leg price.
    pub kalshi_fees: Decimal,
    pub kalshi_ticker: String,
    pub polymarket_yes_token_id: String,
    pub polymarket_no_token_id: String,
}

// =============================================================================
// Order results
// =============================================================================

/// Processed Kalshi order, as carried in events and trade records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalshiOrder {
    pub order_id: Option<String>,
    pub client_order_id: Option<String>,
    pub ticker: String,
    pub side: Option<KalshiSide>,
    pub action: Option<String>,
    /// Not frozen into an enum: the venue may resend orders with new states.
    pub status: String,
    pub yes_price: Option<u32>,
    pub no_price: Option<u32>,
    pub trade_size: Decimal,
}

/// Processed Polymarket order, as carried in events and trade records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolymarketOrder {
    pub success: bool,
    pub error_msg: Option<String>,
    pub order_id: Option<String>,
    pub status: String,
    pub taker_amount: Option<String>,
    pub making_amount: Option<String>,
    pub transactions_hashes: Option<Vec<String>>,
    pub trade_size: Decimal,
    pub token_id: Option<String>,
}

/// Details of a successful trade leg, used for unwinding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDetails {
    pub platform: Platform,
    pub trade_size: Decimal,
    pub order_id: Option<String>,
    pub kalshi_ticker: Option<String>,
    pub kalshi_side: Option<KalshiSide>,
    pub polymarket_token_id: Option<String>,
}

// =============================================================================
// Wallets
// =============================================================================

/// Balances held on a single venue, keyed by currency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeWallet {
    balances: HashMap<Currency, Money>,
}

impl ExchangeWallet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the balance for a currency, replacing any previous value.
    #[must_use]
    pub fn with_balance(mut self, currency: Currency, amount: Money) -> Self {
        self.balances.insert(currency, amount);
        self
    }

    /// Returns the balance for a currency, or `None` if untracked.
    #[must_use]
    pub fn balance(&self, currency: Currency) -> Option<Money> {
        self.balances.get(&currency).copied()
    }
}

/// Per-venue wallet snapshot.
///
/// Refreshed at startup from the balance oracle; updated optimistically
/// after confirmed spends. Authoritative reconciliation is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallets {
    pub kalshi: ExchangeWallet,
    pub polymarket: ExchangeWallet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_platform_display() {
        assert_eq!(Platform::Kalshi.to_string(), "KALSHI");
        assert_eq!(Platform::Polymarket.to_string(), "POLYMARKET");
    }

    #[test]
    fn test_platform_serde_value() {
        assert_eq!(
            serde_json::to_string(&Platform::Polymarket).unwrap(),
            "\"POLYMARKET\""
        );
    }

    #[test]
    fn test_kalshi_side_api_str() {
        assert_eq!(KalshiSide::Yes.as_api_str(), "yes");
        assert_eq!(KalshiSide::No.as_api_str(), "no");
    }

    #[test]
    fn test_poly_side_api_str() {
        assert_eq!(PolySide::Buy.as_api_str(), "BUY");
        assert_eq!(PolySide::Sell.as_api_str(), "SELL");
    }

    #[test]
    fn test_wallet_balance_lookup() {
        let wallet = ExchangeWallet::new()
            .with_balance(Currency::Usd, dec!(250))
            .with_balance(Currency::Pol, dec!(3));

        assert_eq!(wallet.balance(Currency::Usd), Some(dec!(250)));
        assert_eq!(wallet.balance(Currency::Pol), Some(dec!(3)));
        assert_eq!(wallet.balance(Currency::UsdcE), None);
    }

    #[test]
    fn test_opportunity_serializes_decimals_as_strings() {
        let opp = ArbitrageOpportunity {
            market_id: "KXBTC-TEST".to_string(),
            buy_yes_platform: Platform::Kalshi,
            buy_yes_price: dec!(0.45),
            buy_no_platform: Platform::Polymarket,
            buy_no_price: dec!(0.40),
            profit_margin: dec!(0.13),
            potential_trade_size: dec!(10),
            kalshi_fees: dec!(0.18),
            kalshi_ticker: "KXBTC-TEST".to_string(),
            polymarket_yes_token_id: "yes-token".to_string(),
            polymarket_no_token_id: "no-token".to_string(),
        };

        let json = serde_json::to_value(&opp).unwrap();
        assert_eq!(json["buy_yes_price"], "0.45");
        assert_eq!(json["buy_yes_platform"], "KALSHI");
    }
}
