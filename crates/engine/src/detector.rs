//! Buy-both arbitrage detection.
//!
//! On every `BookUpdated` the detector re-reads the market's state and
//! evaluates two directions:
//!
//! 1. buy YES on Kalshi + buy NO on Polymarket,
//!    sized by `min(kalshi_yes_ask_size, poly_no_ask_size)`
//! 2. buy YES on Polymarket + buy NO on Kalshi (derived `1 - yes_bid`),
//!    sized by `min(poly_yes_ask_size, kalshi_yes_bid_size)`
//!
//! A direction qualifies when
//! `leg1 + leg2 + fee/contracts < 1 - profitability_buffer` and both books
//! are fresh within the staleness threshold. The first qualifying
//! direction wins and sets the global one-in-flight lock, which only a
//! `TradeAttemptCompleted` releases.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use tracing::{debug, info};

use cross_arb_core::config::TradingConfig;
use cross_arb_core::events::{BookUpdate, Event, ExecuteTrade, OpportunityFound};
use cross_arb_core::types::{
    ArbitrageOpportunity, MarketPairConfig, Outcome, Platform, Wallets,
};
use cross_arb_core::{EventBus, EventHandler};

use crate::fees::kalshi_fee;
use crate::state::{MarketState, MarketStateManager};

/// Detection parameters.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Required margin below 1.0.
    pub profitability_buffer: Decimal,
    /// Maximum last-update gap between the two books of a direction.
    pub staleness_threshold: ChronoDuration,
    /// Kalshi fee rate.
    pub fee_rate: Decimal,
}

impl DetectorConfig {
    /// Derives detection parameters from trading configuration.
    #[must_use]
    pub fn from_trading(config: &TradingConfig) -> Self {
        Self {
            profitability_buffer: config.profitability_buffer,
            staleness_threshold: ChronoDuration::seconds(config.staleness_threshold_secs as i64),
            fee_rate: config.kalshi_fee_rate,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::from_trading(&TradingConfig::default())
    }
}

/// Evaluates top-of-book changes and emits at most one opportunity at a
/// time.
pub struct ArbitrageDetector {
    manager: Arc<MarketStateManager>,
    bus: Arc<EventBus>,
    config: DetectorConfig,
    pairs: HashMap<String, MarketPairConfig>,
    /// Balance snapshot taken at startup, carried into `ExecuteTrade`.
    wallets: Wallets,
    trade_in_progress: AtomicBool,
}

impl ArbitrageDetector {
    #[must_use]
    pub fn new(
        manager: Arc<MarketStateManager>,
        bus: Arc<EventBus>,
        config: DetectorConfig,
        pairs: Vec<MarketPairConfig>,
        wallets: Wallets,
    ) -> Self {
        let pairs = pairs
            .into_iter()
            .map(|p| (p.market_id.clone(), p))
            .collect();
        Self {
            manager,
            bus,
            config,
            pairs,
            wallets,
            trade_in_progress: AtomicBool::new(false),
        }
    }

    /// Returns true while a trade attempt is in flight.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.trade_in_progress.load(Ordering::Acquire)
    }

    fn on_book_updated(&self, event: &BookUpdate) {
        if self.is_locked() {
            debug!("Skipping opportunity check: trade already in progress");
            return;
        }

        let Some(pair) = self.pairs.get(&event.market_id) else {
            return;
        };

        let opportunity = self
            .manager
            .read_market(&event.market_id, |state| self.check_buy_both(state, pair))
            .flatten();

        if let Some(opportunity) = opportunity {
            info!(
                market_id = %opportunity.market_id,
                buy_yes_platform = %opportunity.buy_yes_platform,
                buy_yes_price = %opportunity.buy_yes_price,
                buy_no_platform = %opportunity.buy_no_platform,
                buy_no_price = %opportunity.buy_no_price,
                profit_margin = %opportunity.profit_margin,
                potential_trade_size = %opportunity.potential_trade_size,
                "Arbitrage opportunity detected, locking strategy until execution completes"
            );
            self.trade_in_progress.store(true, Ordering::Release);
            self.bus
                .publish(Event::OpportunityFound(OpportunityFound { opportunity }));
        } else {
            debug!(market_id = %event.market_id, "No arbitrage opportunity on book update");
        }
    }

    /// Evaluates both directions against the current market state.
    fn check_buy_both(
        &self,
        state: &MarketState,
        pair: &MarketPairConfig,
    ) -> Option<ArbitrageOpportunity> {
        let kalshi_yes = state.book(Platform::Kalshi, Outcome::Yes);
        let poly_yes = state.book(Platform::Polymarket, Outcome::Yes);
        let poly_no = state.book(Platform::Polymarket, Outcome::No);

        let (kalshi_yes_bid, kalshi_yes_ask) =
            kalshi_yes.map(|b| b.top()).unwrap_or((None, None));
        let poly_yes_ask = poly_yes.and_then(|b| b.best_ask());
        let poly_no_ask = poly_no.and_then(|b| b.best_ask());

        let kalshi_yes_ask_size = kalshi_yes_ask.map(|(_, s)| s).unwrap_or(Decimal::ZERO);
        let kalshi_yes_bid_size = kalshi_yes_bid.map(|(_, s)| s).unwrap_or(Decimal::ZERO);
        let poly_yes_ask_size = poly_yes_ask.map(|(_, s)| s).unwrap_or(Decimal::ZERO);
        let poly_no_ask_size = poly_no_ask.map(|(_, s)| s).unwrap_or(Decimal::ZERO);

        // Direction 1: buy YES on Kalshi, buy NO on Polymarket.
        if let (Some((kalshi_ask_price, _)), Some((poly_no_price, _))) =
            (kalshi_yes_ask, poly_no_ask)
        {
            if self.books_fresh(kalshi_yes, poly_no) {
                let cost = kalshi_ask_price + poly_no_price;
                let size = kalshi_yes_ask_size.min(poly_no_ask_size);
                if let Some(opportunity) = self.qualify(
                    state,
                    pair,
                    Platform::Kalshi,
                    kalshi_ask_price,
                    Platform::Polymarket,
                    poly_no_price,
                    cost,
                    size,
                    kalshi_ask_price,
                ) {
                    return Some(opportunity);
                }
            } else {
                debug!(market_id = %state.market_id, "Skipping direction 1: stale books");
            }
        }

        // Direction 2: buy YES on Polymarket, buy NO on Kalshi. The Kalshi
        // NO ask is derived from the YES bid, so the YES book's timestamp
        // gates staleness. Sizing against the YES bid size is a heuristic
        // carried over from the sizing model for the derived side.
        if let (Some((poly_yes_price, _)), Some(kalshi_no_price)) =
            (poly_yes_ask, state.kalshi_derived_no_ask())
        {
            if self.books_fresh(kalshi_yes, poly_yes) {
                let cost = poly_yes_price + kalshi_no_price;
                let size = poly_yes_ask_size.min(kalshi_yes_bid_size);
                if let Some(opportunity) = self.qualify(
                    state,
                    pair,
                    Platform::Polymarket,
                    poly_yes_price,
                    Platform::Kalshi,
                    kalshi_no_price,
                    cost,
                    size,
                    kalshi_no_price,
                ) {
                    return Some(opportunity);
                }
            } else {
                debug!(market_id = %state.market_id, "Skipping direction 2: stale books");
            }
        }

        None
    }

    /// Applies the fee-inclusive profitability condition to one direction.
    #[allow(clippy::too_many_arguments)]
    fn qualify(
        &self,
        state: &MarketState,
        pair: &MarketPairConfig,
        buy_yes_platform: Platform,
        buy_yes_price: Decimal,
        buy_no_platform: Platform,
        buy_no_price: Decimal,
        cost: Decimal,
        size: Decimal,
        kalshi_leg_price: Decimal,
    ) -> Option<ArbitrageOpportunity> {
        if size <= Decimal::ZERO {
            return None;
        }
        let fee = kalshi_fee(size, kalshi_leg_price, self.config.fee_rate);
        let effective_cost = cost + fee / size;
        if effective_cost >= Decimal::ONE - self.config.profitability_buffer {
            return None;
        }
        Some(ArbitrageOpportunity {
            market_id: state.market_id.clone(),
            buy_yes_platform,
            buy_yes_price,
            buy_no_platform,
            buy_no_price,
            profit_margin: Decimal::ONE - effective_cost,
            potential_trade_size: size,
            kalshi_fees: fee,
            kalshi_ticker: pair.kalshi_ticker.clone(),
            polymarket_yes_token_id: pair.polymarket_yes_token_id.clone(),
            polymarket_no_token_id: pair.polymarket_no_token_id.clone(),
        })
    }

    /// True when both books exist and their last updates are within the
    /// staleness threshold.
    fn books_fresh(
        &self,
        a: Option<&crate::book::PriceBook>,
        b: Option<&crate::book::PriceBook>,
    ) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => {
                (a.last_update - b.last_update).abs() <= self.config.staleness_threshold
            }
            _ => false,
        }
    }
}

#[async_trait]
impl EventHandler for ArbitrageDetector {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        match event {
            Event::BookUpdated(update) => self.on_book_updated(&update),
            Event::OpportunityFound(found) => {
                info!(
                    market_id = %found.opportunity.market_id,
                    "Issuing ExecuteTrade for detected opportunity"
                );
                self.bus.publish(Event::ExecuteTrade(ExecuteTrade {
                    opportunity: found.opportunity,
                    wallets: self.wallets.clone(),
                }));
            }
            Event::TradeAttemptCompleted => {
                self.trade_in_progress.store(false, Ordering::Release);
                info!("Trade attempt completed; re-enabling arbitrage checks");
            }
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "arbitrage_detector"
    }
}
