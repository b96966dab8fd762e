//! The domain event set that flows over the message bus.
//!
//! Events are a tagged-variant set: the [`Event`] enum carries the concrete
//! payloads and [`EventKind`] is the discriminant used as the subscription
//! key in the bus registry. Every payload is `Clone` so the bus can fan a
//! single publish out to multiple handlers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{
    ArbitrageOpportunity, KalshiOrder, Outcome, Platform, PolymarketOrder, PriceLevel, Side,
    TradeDetails, Wallets,
};

/// Discriminant for [`Event`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderBookSnapshotReceived,
    OrderBookDeltaReceived,
    BookUpdated,
    OpportunityFound,
    ExecuteTrade,
    StoreTradeResults,
    TradeFailed,
    TradeAttemptCompleted,
    ArbitrageTradeSuccessful,
}

/// A full order book replacement for one (platform, market, outcome) book.
///
/// Signals that the existing book must be cleared and replaced.
#[derive(Debug, Clone)]
pub struct OrderBookSnapshot {
    pub platform: Platform,
    pub market_id: String,
    pub outcome: Outcome,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// A single price level change. `size` is the new absolute size at the level.
#[derive(Debug, Clone)]
pub struct OrderBookDelta {
    pub platform: Platform,
    pub market_id: String,
    pub outcome: Outcome,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
}

/// Emitted when a market's top-of-book has changed on some platform.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    pub market_id: String,
    pub platform: Platform,
}

/// Emitted by the detector when a qualifying opportunity is found.
#[derive(Debug, Clone)]
pub struct OpportunityFound {
    pub opportunity: ArbitrageOpportunity,
}

/// Command instructing the executor to place both legs.
#[derive(Debug, Clone)]
pub struct ExecuteTrade {
    pub opportunity: ArbitrageOpportunity,
    pub wallets: Wallets,
}

/// Outcome of a single arbitrage attempt across both venues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbTradeResult {
    pub category: String,
    pub opportunity: ArbitrageOpportunity,
    pub kalshi_order: Option<KalshiOrder>,
    pub kalshi_error: Option<String>,
    pub polymarket_order: Option<PolymarketOrder>,
    pub polymarket_error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Command instructing trade storage to buffer a trade result.
#[derive(Debug, Clone)]
pub struct StoreTradeResults {
    pub result: ArbTradeResult,
}

/// Emitted when exactly one leg of an arbitrage trade fails.
///
/// Triggers the unwinder against the successful leg.
#[derive(Debug, Clone)]
pub struct TradeFailed {
    pub failed_leg_platform: Platform,
    pub successful_leg: TradeDetails,
    pub opportunity: ArbitrageOpportunity,
    pub error_message: String,
}

/// The set of messages that flow over the bus.
#[derive(Debug, Clone)]
pub enum Event {
    OrderBookSnapshotReceived(OrderBookSnapshot),
    OrderBookDeltaReceived(OrderBookDelta),
    BookUpdated(BookUpdate),
    OpportunityFound(OpportunityFound),
    ExecuteTrade(ExecuteTrade),
    StoreTradeResults(StoreTradeResults),
    TradeFailed(TradeFailed),
    /// A trade attempt has been fully processed; the detector may unlock.
    TradeAttemptCompleted,
    /// Both legs succeeded; the orchestrator soft-resets ingestion.
    ArbitrageTradeSuccessful,
}

impl Event {
    /// Returns the discriminant used for handler registration.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::OrderBookSnapshotReceived(_) => EventKind::OrderBookSnapshotReceived,
            Self::OrderBookDeltaReceived(_) => EventKind::OrderBookDeltaReceived,
            Self::BookUpdated(_) => EventKind::BookUpdated,
            Self::OpportunityFound(_) => EventKind::OpportunityFound,
            Self::ExecuteTrade(_) => EventKind::ExecuteTrade,
            Self::StoreTradeResults(_) => EventKind::StoreTradeResults,
            Self::TradeFailed(_) => EventKind::TradeFailed,
            Self::TradeAttemptCompleted => EventKind::TradeAttemptCompleted,
            Self::ArbitrageTradeSuccessful => EventKind::ArbitrageTradeSuccessful,
        }
    }

    /// Returns the market id the event concerns, when it has one.
    #[must_use]
    pub fn market_id(&self) -> Option<&str> {
        match self {
            Self::OrderBookSnapshotReceived(e) => Some(&e.market_id),
            Self::OrderBookDeltaReceived(e) => Some(&e.market_id),
            Self::BookUpdated(e) => Some(&e.market_id),
            Self::OpportunityFound(e) => Some(&e.opportunity.market_id),
            Self::ExecuteTrade(e) => Some(&e.opportunity.market_id),
            Self::StoreTradeResults(e) => Some(&e.result.opportunity.market_id),
            Self::TradeFailed(e) => Some(&e.opportunity.market_id),
            Self::TradeAttemptCompleted | Self::ArbitrageTradeSuccessful => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExchangeWallet, Platform};
    use rust_decimal_macros::dec;

    fn sample_opportunity() -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            market_id: "M1".to_string(),
            buy_yes_platform: Platform::Kalshi,
            buy_yes_price: dec!(0.45),
            buy_no_platform: Platform::Polymarket,
            buy_no_price: dec!(0.40),
            profit_margin: dec!(0.13),
            potential_trade_size: dec!(10),
            kalshi_fees: dec!(0.18),
            kalshi_ticker: "K1".to_string(),
            polymarket_yes_token_id: "Y1".to_string(),
            polymarket_no_token_id: "N1".to_string(),
        }
    }

    #[test]
    fn test_event_kind_mapping() {
        let snapshot = Event::OrderBookSnapshotReceived(OrderBookSnapshot {
            platform: Platform::Kalshi,
            market_id: "M1".to_string(),
            outcome: Outcome::Yes,
            bids: vec![],
            asks: vec![],
        });
        assert_eq!(snapshot.kind(), EventKind::OrderBookSnapshotReceived);

        assert_eq!(
            Event::TradeAttemptCompleted.kind(),
            EventKind::TradeAttemptCompleted
        );
        assert_eq!(
            Event::ArbitrageTradeSuccessful.kind(),
            EventKind::ArbitrageTradeSuccessful
        );
    }

    #[test]
    fn test_event_market_id() {
        let event = Event::ExecuteTrade(ExecuteTrade {
            opportunity: sample_opportunity(),
            wallets: Wallets {
                kalshi: ExchangeWallet::new(),
                polymarket: ExchangeWallet::new(),
            },
        });
        assert_eq!(event.market_id(), Some("M1"));
        assert_eq!(Event::TradeAttemptCompleted.market_id(), None);
    }

    #[test]
    fn test_arb_trade_result_roundtrip() {
        let result = ArbTradeResult {
            category: "buy both".to_string(),
            opportunity: sample_opportunity(),
            kalshi_order: None,
            kalshi_error: Some("connection reset".to_string()),
            polymarket_order: None,
            polymarket_error: None,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&result).unwrap();
        let back: ArbTradeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.category, "buy both");
        assert_eq!(back.kalshi_error.as_deref(), Some("connection reset"));
        assert_eq!(back.opportunity.profit_margin, dec!(0.13));
    }
}
