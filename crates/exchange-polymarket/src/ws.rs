//! WebSocket adapter for the Polymarket `/market` channel.
//!
//! Subscribes with the full list of asset ids and transforms `book` and
//! `price_change` frames into normalized snapshot/delta events on the bus.
//! Each asset id maps to a (market id, outcome); two books per market are
//! maintained downstream because this venue trades YES and NO as separate
//! instruments.
//!
//! Frames may arrive singly or as arrays; bare `PING`/`PONG` text frames
//! are ignored. Prices and sizes are decimal strings, including the
//! venue's bare `".48"` form.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use cross_arb_core::events::{Event, OrderBookDelta, OrderBookSnapshot};
use cross_arb_core::types::{MarketPairConfig, Outcome, Platform, PriceLevel, Side};
use cross_arb_core::EventBus;

use crate::error::{PolymarketError, Result};
use crate::types::{BookMessage, PriceChangeMessage, SubscribeFrame, WirePriceLevel};

/// Production WebSocket URL for the CLOB market channel.
pub const POLYMARKET_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

/// Configuration for the WebSocket adapter.
#[derive(Debug, Clone)]
pub struct PolymarketWsConfig {
    pub ws_url: String,
    pub open_timeout: Duration,
    /// Timeout for the first frame after subscribing.
    pub confirmation_timeout: Duration,
    /// Fixed cooldown between reconnection attempts.
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
}

impl Default for PolymarketWsConfig {
    fn default() -> Self {
        Self {
            ws_url: POLYMARKET_WS_URL.to_string(),
            open_timeout: Duration::from_secs(10),
            confirmation_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(3),
            ping_interval: Duration::from_secs(15),
        }
    }
}

impl PolymarketWsConfig {
    /// Sets the WebSocket URL (tests point this at a mock server).
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }
}

#[derive(Debug, Clone)]
struct AssetIndex {
    /// Asset id -> (canonical market id, outcome).
    assets: HashMap<String, (String, Outcome)>,
    asset_ids: Vec<String>,
}

/// Adapter for the Polymarket order book stream.
///
/// `set_markets` and `set_bus` must both be called before [`run`](Self::run).
pub struct PolymarketWsClient {
    config: PolymarketWsConfig,
    bus: Mutex<Option<Arc<EventBus>>>,
    markets: Mutex<Option<AssetIndex>>,
}

impl PolymarketWsClient {
    #[must_use]
    pub fn new(config: PolymarketWsConfig) -> Self {
        Self {
            config,
            bus: Mutex::new(None),
            markets: Mutex::new(None),
        }
    }

    /// Binds asset ids to canonical (market id, outcome) pairs.
    pub fn set_markets(&self, pairs: &[MarketPairConfig]) {
        let mut assets = HashMap::new();
        let mut asset_ids = Vec::new();
        for pair in pairs {
            assets.insert(
                pair.polymarket_yes_token_id.clone(),
                (pair.market_id.clone(), Outcome::Yes),
            );
            assets.insert(
                pair.polymarket_no_token_id.clone(),
                (pair.market_id.clone(), Outcome::No),
            );
            asset_ids.push(pair.polymarket_yes_token_id.clone());
            asset_ids.push(pair.polymarket_no_token_id.clone());
        }
        *self.markets.lock() = Some(AssetIndex { assets, asset_ids });
    }

    /// Sets the bus events are published to.
    pub fn set_bus(&self, bus: Arc<EventBus>) {
        *self.bus.lock() = Some(bus);
    }

    /// Runs until cancelled, reconnecting after any transport error.
    ///
    /// # Errors
    ///
    /// Returns [`PolymarketError::NotConfigured`] if markets or bus were
    /// not set; never returns otherwise.
    pub async fn run(&self) -> Result<()> {
        let bus = self
            .bus
            .lock()
            .clone()
            .ok_or(PolymarketError::NotConfigured("message bus not set"))?;
        let markets = self
            .markets
            .lock()
            .clone()
            .ok_or(PolymarketError::NotConfigured("market config not set"))?;
        if markets.asset_ids.is_empty() {
            return Err(PolymarketError::NotConfigured("no asset ids configured"));
        }

        loop {
            info!(url = %self.config.ws_url, "[Polymarket] Connecting");
            if let Err(e) = self.connect_and_stream(&bus, &markets).await {
                warn!(
                    error = %e,
                    delay = ?self.config.reconnect_delay,
                    "[Polymarket] Connection lost; reconnecting"
                );
            }
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    async fn connect_and_stream(&self, bus: &Arc<EventBus>, markets: &AssetIndex) -> Result<()> {
        let (stream, _response) =
            timeout(self.config.open_timeout, connect_async(&self.config.ws_url))
                .await
                .map_err(|_| PolymarketError::Timeout("websocket open".to_string()))?
                .map_err(|e| PolymarketError::Network(e.to_string()))?;
        info!("[Polymarket] WebSocket connected");

        let (mut write, mut read) = stream.split();

        let frame = SubscribeFrame {
            assets_ids: &markets.asset_ids,
            channel: "market",
        };
        write
            .send(Message::Text(serde_json::to_string(&frame)?))
            .await
            .map_err(|e| PolymarketError::Network(e.to_string()))?;
        info!(
            assets = markets.asset_ids.len(),
            "[Polymarket] Sent subscription request"
        );

        // The first frame carries the initial per-asset snapshots.
        match timeout(self.config.confirmation_timeout, read.next()).await {
            Ok(Some(Ok(message))) => self.handle_ws_message(message, bus, markets),
            Ok(Some(Err(e))) => return Err(PolymarketError::Network(e.to_string())),
            Ok(None) => return Err(PolymarketError::Network("stream ended".to_string())),
            Err(_) => {
                warn!("[Polymarket] No subscription confirmation within timeout");
                return Err(PolymarketError::Timeout(
                    "subscription confirmation".to_string(),
                ));
            }
        }

        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| PolymarketError::Network(e.to_string()))?;
                }
                message = read.next() => match message {
                    Some(Ok(Message::Ping(data))) => {
                        write
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| PolymarketError::Network(e.to_string()))?;
                    }
                    Some(Ok(message)) => self.handle_ws_message(message, bus, markets),
                    Some(Err(e)) => return Err(PolymarketError::Network(e.to_string())),
                    None => return Err(PolymarketError::Network("stream ended".to_string())),
                }
            }
        }
    }

    fn handle_ws_message(&self, message: Message, bus: &Arc<EventBus>, markets: &AssetIndex) {
        match message {
            Message::Text(text) => {
                if text == "PING" || text == "PONG" {
                    return;
                }
                self.process_text(&text, bus, markets);
            }
            Message::Pong(_) | Message::Ping(_) => {}
            Message::Close(frame) => {
                debug!(frame = ?frame, "[Polymarket] Received close frame");
            }
            Message::Binary(_) | Message::Frame(_) => {}
        }
    }

    fn process_text(&self, text: &str, bus: &Arc<EventBus>, markets: &AssetIndex) {
        // Frames arrive singly or as arrays.
        let values: Vec<serde_json::Value> = if text.trim_start().starts_with('[') {
            match serde_json::from_str(text) {
                Ok(values) => values,
                Err(e) => {
                    warn!(error = %e, "[Polymarket] Received non-JSON message");
                    return;
                }
            }
        } else {
            match serde_json::from_str(text) {
                Ok(value) => vec![value],
                Err(e) => {
                    warn!(error = %e, "[Polymarket] Received non-JSON message");
                    return;
                }
            }
        };

        for value in values {
            self.process_value(value, bus, markets);
        }
    }

    fn process_value(&self, value: serde_json::Value, bus: &Arc<EventBus>, markets: &AssetIndex) {
        let event_type = value
            .get("event_type")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        match event_type.as_str() {
            "book" => match serde_json::from_value::<BookMessage>(value) {
                Ok(message) => self.publish_snapshot(&message, bus, markets),
                Err(e) => warn!(error = %e, "[Polymarket] Invalid book message; dropping"),
            },
            "price_change" => match serde_json::from_value::<PriceChangeMessage>(value) {
                Ok(message) => self.publish_deltas(&message, bus, markets),
                Err(e) => warn!(error = %e, "[Polymarket] Invalid price_change; dropping"),
            },
            other => {
                debug!(event_type = %other, "[Polymarket] Ignoring event type");
            }
        }
    }

    fn publish_snapshot(&self, message: &BookMessage, bus: &Arc<EventBus>, markets: &AssetIndex) {
        let Some((market_id, outcome)) = message
            .asset_key()
            .and_then(|key| markets.assets.get(key).cloned())
        else {
            debug!("[Polymarket] Snapshot for un-tracked asset");
            return;
        };

        let bids = parse_price_levels(&message.bids);
        let asks = parse_price_levels(&message.asks);
        debug!(
            market_id = %market_id,
            outcome = %outcome,
            bid_levels = bids.len(),
            ask_levels = asks.len(),
            "[Polymarket] Publishing book snapshot"
        );
        bus.publish(Event::OrderBookSnapshotReceived(OrderBookSnapshot {
            platform: Platform::Polymarket,
            market_id,
            outcome,
            bids,
            asks,
        }));
    }

    fn publish_deltas(
        &self,
        message: &PriceChangeMessage,
        bus: &Arc<EventBus>,
        markets: &AssetIndex,
    ) {
        let Some((market_id, outcome)) = message
            .asset_key()
            .and_then(|key| markets.assets.get(key).cloned())
        else {
            debug!("[Polymarket] Price change for un-tracked asset");
            return;
        };

        for change in &message.changes {
            let (Some(price), Some(size)) =
                (parse_decimal(&change.price), parse_decimal(&change.size))
            else {
                warn!(
                    price = %change.price,
                    size = %change.size,
                    "[Polymarket] Unparseable price change; dropping"
                );
                continue;
            };
            let side = match change.side.as_str() {
                "BUY" => Side::Buy,
                "SELL" => Side::Sell,
                other => {
                    warn!(side = %other, "[Polymarket] Unknown change side; dropping");
                    continue;
                }
            };
            bus.publish(Event::OrderBookDeltaReceived(OrderBookDelta {
                platform: Platform::Polymarket,
                market_id: market_id.clone(),
                outcome,
                side,
                price,
                size,
            }));
        }
    }
}

/// Parses wire levels, dropping empty and unparseable entries.
fn parse_price_levels(levels: &[WirePriceLevel]) -> Vec<PriceLevel> {
    levels
        .iter()
        .filter_map(|level| {
            let price = parse_decimal(&level.price)?;
            let size = parse_decimal(&level.size)?;
            (size > Decimal::ZERO).then_some(PriceLevel::new(price, size))
        })
        .collect()
}

/// Parses a decimal string, accepting the venue's bare ".48" form.
fn parse_decimal(s: &str) -> Option<Decimal> {
    if let Some(stripped) = s.strip_prefix('.') {
        return Decimal::from_str(&format!("0.{stripped}")).ok();
    }
    Decimal::from_str(s).ok()
}
