//! Market state ownership and top-of-book change detection.
//!
//! [`MarketStateManager`] exclusively owns all order books. It consumes
//! normalized snapshot/delta events from the bus, applies them, and emits
//! `BookUpdated` when and only when the (best bid, best ask) tuple of the
//! touched book changed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use cross_arb_core::events::{BookUpdate, Event, OrderBookDelta, OrderBookSnapshot};
use cross_arb_core::types::{Outcome, Platform, Side};
use cross_arb_core::{EventBus, EventHandler};

use crate::book::PriceBook;

/// Container for the YES and (optionally) NO books of one venue.
///
/// The single-book venue only allocates YES; its NO side is derived
/// arithmetically from YES quotes.
#[derive(Debug, Clone, Default)]
pub struct MarketOutcomes {
    pub yes: Option<PriceBook>,
    pub no: Option<PriceBook>,
}

impl MarketOutcomes {
    /// Allocation for the single-book venue.
    #[must_use]
    pub fn yes_only() -> Self {
        Self {
            yes: Some(PriceBook::new()),
            no: None,
        }
    }

    /// Allocation for the two-book venue.
    #[must_use]
    pub fn yes_and_no() -> Self {
        Self {
            yes: Some(PriceBook::new()),
            no: Some(PriceBook::new()),
        }
    }

    #[must_use]
    pub fn book(&self, outcome: Outcome) -> Option<&PriceBook> {
        match outcome {
            Outcome::Yes => self.yes.as_ref(),
            Outcome::No => self.no.as_ref(),
        }
    }

    pub fn book_mut(&mut self, outcome: Outcome) -> Option<&mut PriceBook> {
        match outcome {
            Outcome::Yes => self.yes.as_mut(),
            Outcome::No => self.no.as_mut(),
        }
    }

    /// Clears whichever books are allocated.
    pub fn reset(&mut self) {
        if let Some(book) = self.yes.as_mut() {
            book.clear();
        }
        if let Some(book) = self.no.as_mut() {
            book.clear();
        }
    }
}

/// Live state of a single market across both venues.
#[derive(Debug, Clone)]
pub struct MarketState {
    pub market_id: String,
    pub platforms: HashMap<Platform, MarketOutcomes>,
}

impl MarketState {
    #[must_use]
    pub fn new(market_id: impl Into<String>) -> Self {
        let mut platforms = HashMap::new();
        platforms.insert(Platform::Kalshi, MarketOutcomes::yes_only());
        platforms.insert(Platform::Polymarket, MarketOutcomes::yes_and_no());
        Self {
            market_id: market_id.into(),
            platforms,
        }
    }

    #[must_use]
    pub fn outcomes(&self, platform: Platform) -> Option<&MarketOutcomes> {
        self.platforms.get(&platform)
    }

    #[must_use]
    pub fn book(&self, platform: Platform, outcome: Outcome) -> Option<&PriceBook> {
        self.platforms.get(&platform)?.book(outcome)
    }

    /// Best price on one side of one book: `Buy` reads the best bid,
    /// `Sell` the best ask.
    #[must_use]
    pub fn price(&self, platform: Platform, outcome: Outcome, side: Side) -> Option<Decimal> {
        let book = self.book(platform, outcome)?;
        let level = match side {
            Side::Buy => book.best_bid(),
            Side::Sell => book.best_ask(),
        };
        level.map(|(price, _)| price)
    }

    /// The Kalshi NO ask, derived from the YES bid as `1 - bid`.
    #[must_use]
    pub fn kalshi_derived_no_ask(&self) -> Option<Decimal> {
        self.price(Platform::Kalshi, Outcome::Yes, Side::Buy)
            .map(|bid| Decimal::ONE - bid)
    }

    pub fn reset(&mut self) {
        for outcomes in self.platforms.values_mut() {
            outcomes.reset();
        }
    }
}

/// Owns all books; applies snapshots/deltas and emits `BookUpdated`.
pub struct MarketStateManager {
    bus: Arc<EventBus>,
    states: RwLock<HashMap<String, MarketState>>,
}

impl MarketStateManager {
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a market, allocating empty books for both venues.
    /// Idempotent; re-registration is logged and ignored.
    pub fn register_market(&self, market_id: &str) {
        let mut states = self.states.write();
        if states.contains_key(market_id) {
            warn!(market_id = %market_id, "Market is already registered");
            return;
        }
        info!(market_id = %market_id, "Registering new market");
        states.insert(market_id.to_string(), MarketState::new(market_id));
    }

    /// Clears all books across all markets. Used during soft-reset.
    pub fn reset(&self) {
        for state in self.states.write().values_mut() {
            state.reset();
        }
        info!("Market state for all markets has been reset");
    }

    /// Runs `f` against one market's state under the read lock.
    pub fn read_market<R>(&self, market_id: &str, f: impl FnOnce(&MarketState) -> R) -> Option<R> {
        self.states.read().get(market_id).map(f)
    }

    /// Read-only copy of all market states, for diagnostics.
    #[must_use]
    pub fn get_all_states(&self) -> Vec<MarketState> {
        self.states.read().values().cloned().collect()
    }

    fn handle_snapshot(&self, event: &OrderBookSnapshot) {
        let changed = {
            let mut states = self.states.write();
            let Some(book) = states
                .get_mut(&event.market_id)
                .and_then(|s| s.platforms.get_mut(&event.platform))
                .and_then(|o| o.book_mut(event.outcome))
            else {
                debug!(
                    market_id = %event.market_id,
                    platform = %event.platform,
                    outcome = %event.outcome,
                    "Snapshot for unknown book"
                );
                return;
            };

            let old_top = book.top();
            book.clear();
            let bids: Vec<_> = event.bids.iter().map(|l| (l.price, l.size)).collect();
            book.apply_many(Side::Buy, &bids);
            let asks: Vec<_> = event.asks.iter().map(|l| (l.price, l.size)).collect();
            book.apply_many(Side::Sell, &asks);
            old_top != book.top()
        };

        if changed {
            info!(
                market_id = %event.market_id,
                platform = %event.platform,
                "Top-of-book changed via snapshot"
            );
            self.emit_book_update(&event.market_id, event.platform);
        }
    }

    fn handle_delta(&self, event: &OrderBookDelta) {
        let changed = {
            let mut states = self.states.write();
            let Some(book) = states
                .get_mut(&event.market_id)
                .and_then(|s| s.platforms.get_mut(&event.platform))
                .and_then(|o| o.book_mut(event.outcome))
            else {
                debug!(
                    market_id = %event.market_id,
                    platform = %event.platform,
                    outcome = %event.outcome,
                    "Delta for unknown book"
                );
                return;
            };

            let old_top = book.top();
            book.apply(event.side, event.price, event.size);
            old_top != book.top()
        };

        if changed {
            debug!(
                market_id = %event.market_id,
                platform = %event.platform,
                "Top-of-book changed via delta"
            );
            self.emit_book_update(&event.market_id, event.platform);
        }
    }

    fn emit_book_update(&self, market_id: &str, platform: Platform) {
        self.bus.publish(Event::BookUpdated(BookUpdate {
            market_id: market_id.to_string(),
            platform,
        }));
    }
}

#[async_trait]
impl EventHandler for MarketStateManager {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        match event {
            Event::OrderBookSnapshotReceived(snapshot) => self.handle_snapshot(&snapshot),
            Event::OrderBookDeltaReceived(delta) => self.handle_delta(&delta),
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "market_state_manager"
    }
}
