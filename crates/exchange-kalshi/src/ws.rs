//! WebSocket adapter for the Kalshi `orderbook_delta` channel.
//!
//! Transforms venue wire messages into normalized
//! `OrderBookSnapshotReceived` / `OrderBookDeltaReceived` events and
//! publishes them on the bus. The venue reports *signed* size deltas, so
//! the adapter keeps an internal shadow book per (ticker, side) purely to
//! translate deltas into the absolute sizes the event model requires. The
//! shadow is reset on every snapshot.
//!
//! A single sequence counter governs the whole subscription. The first
//! message must carry `seq = 1`; any other gap closes the socket with code
//! 4000 so the reconnection path resubscribes and receives fresh
//! snapshots.
//!
//! Normalization: prices arrive as integer cents and are divided by 100.
//! The venue's YES side maps to YES bids; its NO side represents NO bids,
//! which become YES asks at `(1 - price, size)`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use cross_arb_core::events::{Event, OrderBookDelta, OrderBookSnapshot};
use cross_arb_core::types::{MarketPairConfig, Outcome, Platform, PriceLevel, Side};
use cross_arb_core::EventBus;

use crate::auth::KalshiSigner;
use crate::error::{KalshiError, Result};
use crate::types::{DeltaData, SnapshotData, SubscribeCommand, SubscribeParams, WsFrame};

/// Kalshi production WebSocket URL.
pub const KALSHI_PROD_WS_URL: &str = "wss://trading-api.kalshi.com/trade-api/ws/v2";

/// Kalshi demo WebSocket URL.
pub const KALSHI_DEMO_WS_URL: &str = "wss://demo-api.kalshi.co/trade-api/ws/v2";

/// Close code sent when a sequence gap forces a resubscribe.
pub const RESUBSCRIBE_CLOSE_CODE: u16 = 4000;

/// Path signed for the WebSocket upgrade request.
const WS_SIGNING_PATH: &str = "/trade-api/ws/v2";

/// Configuration for the WebSocket adapter.
#[derive(Debug, Clone)]
pub struct KalshiWsConfig {
    pub ws_url: String,
    /// Timeout for establishing the connection.
    pub open_timeout: Duration,
    /// Timeout for the first read after subscribing.
    pub confirmation_timeout: Duration,
    /// Fixed cooldown between reconnection attempts.
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
}

impl Default for KalshiWsConfig {
    fn default() -> Self {
        Self {
            ws_url: KALSHI_PROD_WS_URL.to_string(),
            open_timeout: Duration::from_secs(10),
            confirmation_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
            ping_interval: Duration::from_secs(15),
        }
    }
}

impl KalshiWsConfig {
    /// Creates a configuration for the demo environment.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            ws_url: KALSHI_DEMO_WS_URL.to_string(),
            ..Default::default()
        }
    }

    /// Sets the WebSocket URL (tests point this at a mock server).
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }
}

/// Shadow of one market's books, keyed by price in cents.
#[derive(Debug, Default)]
struct ShadowBook {
    yes: HashMap<u32, i64>,
    no: HashMap<u32, i64>,
}

/// Per-subscription stream state: the shared sequence counter and the
/// shadow books. One critical section guards both.
#[derive(Debug, Default)]
struct StreamState {
    last_seq: u64,
    shadow: HashMap<String, ShadowBook>,
}

#[derive(Debug, Clone)]
struct MarketIndex {
    /// Kalshi ticker -> canonical market id.
    market_ids: HashMap<String, String>,
    tickers: Vec<String>,
}

/// What to do after processing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Continue,
    /// Close the socket and resubscribe through the reconnect path.
    Resubscribe,
}

/// Adapter for the Kalshi order book stream.
///
/// `set_markets` and `set_bus` must both be called before [`run`](Self::run).
pub struct KalshiWsClient {
    config: KalshiWsConfig,
    signer: Option<Arc<KalshiSigner>>,
    bus: Mutex<Option<Arc<EventBus>>>,
    markets: Mutex<Option<MarketIndex>>,
    state: Mutex<StreamState>,
    msg_id: AtomicU64,
}

impl KalshiWsClient {
    #[must_use]
    pub fn new(config: KalshiWsConfig) -> Self {
        Self {
            config,
            signer: None,
            bus: Mutex::new(None),
            markets: Mutex::new(None),
            state: Mutex::new(StreamState::default()),
            msg_id: AtomicU64::new(1),
        }
    }

    /// Attaches the request signer used for the WebSocket upgrade.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<KalshiSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Binds venue tickers to canonical market ids and resets stream state.
    pub fn set_markets(&self, pairs: &[MarketPairConfig]) {
        let market_ids = pairs
            .iter()
            .map(|p| (p.kalshi_ticker.clone(), p.market_id.clone()))
            .collect();
        let tickers: Vec<String> = pairs.iter().map(|p| p.kalshi_ticker.clone()).collect();
        *self.markets.lock() = Some(MarketIndex {
            market_ids,
            tickers,
        });

        let mut state = self.state.lock();
        state.last_seq = 0;
        state.shadow.clear();
    }

    /// Sets the bus events are published to.
    pub fn set_bus(&self, bus: Arc<EventBus>) {
        *self.bus.lock() = Some(bus);
    }

    /// Runs until cancelled, reconnecting after any transport error or
    /// requested resubscribe.
    ///
    /// # Errors
    ///
    /// Returns [`KalshiError::NotConfigured`] if markets or bus were not
    /// set; never returns otherwise.
    pub async fn run(&self) -> Result<()> {
        let bus = self
            .bus
            .lock()
            .clone()
            .ok_or(KalshiError::NotConfigured("message bus not set"))?;
        let markets = self
            .markets
            .lock()
            .clone()
            .ok_or(KalshiError::NotConfigured("market config not set"))?;
        if markets.tickers.is_empty() {
            return Err(KalshiError::NotConfigured("no market tickers configured"));
        }

        loop {
            info!(url = %self.config.ws_url, "[Kalshi] Connecting");
            match self.connect_and_stream(&bus, &markets).await {
                Ok(()) => {
                    warn!("[Kalshi] Resubscribing after protocol violation");
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        delay = ?self.config.reconnect_delay,
                        "[Kalshi] Connection lost; reconnecting"
                    );
                }
            }
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    /// One connection lifetime. `Ok(())` means a resubscribe was requested;
    /// errors are transport failures. Both paths reconnect.
    async fn connect_and_stream(&self, bus: &Arc<EventBus>, markets: &MarketIndex) -> Result<()> {
        let mut request = self
            .config
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| KalshiError::Network(e.to_string()))?;
        if let Some(signer) = &self.signer {
            for (name, value) in signer.headers("GET", WS_SIGNING_PATH)? {
                let value = value
                    .parse()
                    .map_err(|_| KalshiError::Signing("invalid header value".to_string()))?;
                request.headers_mut().insert(name, value);
            }
        }

        let (stream, _response) = timeout(self.config.open_timeout, connect_async(request))
            .await
            .map_err(|_| KalshiError::Timeout("websocket open".to_string()))?
            .map_err(|e| KalshiError::Network(e.to_string()))?;
        info!("[Kalshi] WebSocket connection established");

        let (mut write, mut read) = stream.split();

        // Fresh subscription: sequence baseline and shadow books start over.
        {
            let mut state = self.state.lock();
            state.last_seq = 0;
            state.shadow.clear();
        }

        let command = SubscribeCommand {
            id: self.msg_id.fetch_add(1, Ordering::Relaxed),
            cmd: "subscribe",
            params: SubscribeParams {
                channels: vec!["orderbook_delta"],
                market_tickers: &markets.tickers,
            },
        };
        write
            .send(Message::Text(serde_json::to_string(&command)?))
            .await
            .map_err(|e| KalshiError::Network(e.to_string()))?;
        info!(tickers = ?markets.tickers, "[Kalshi] Sent subscription request");

        // The first read confirms the subscription.
        let first = timeout(self.config.confirmation_timeout, read.next())
            .await
            .map_err(|_| KalshiError::Timeout("subscription confirmation".to_string()))?;
        match first {
            Some(Ok(message)) => {
                if self.handle_message(message, &mut write, bus, markets).await?
                    == FrameOutcome::Resubscribe
                {
                    return Ok(());
                }
            }
            Some(Err(e)) => return Err(KalshiError::Network(e.to_string())),
            None => return Err(KalshiError::Network("stream ended".to_string())),
        }

        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| KalshiError::Network(e.to_string()))?;
                }
                message = read.next() => match message {
                    Some(Ok(message)) => {
                        if self.handle_message(message, &mut write, bus, markets).await?
                            == FrameOutcome::Resubscribe
                        {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => return Err(KalshiError::Network(e.to_string())),
                    None => return Err(KalshiError::Network("stream ended".to_string())),
                }
            }
        }
    }

    async fn handle_message<W>(
        &self,
        message: Message,
        write: &mut W,
        bus: &Arc<EventBus>,
        markets: &MarketIndex,
    ) -> Result<FrameOutcome>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        match message {
            Message::Text(text) => {
                let outcome = self.process_text(&text, bus, markets);
                if outcome == FrameOutcome::Resubscribe {
                    self.send_resubscribe_close(write).await;
                }
                Ok(outcome)
            }
            Message::Ping(data) => {
                write
                    .send(Message::Pong(data))
                    .await
                    .map_err(|e| KalshiError::Network(e.to_string()))?;
                Ok(FrameOutcome::Continue)
            }
            Message::Pong(_) => Ok(FrameOutcome::Continue),
            Message::Close(frame) => Err(KalshiError::Network(format!(
                "connection closed by venue: {frame:?}"
            ))),
            Message::Binary(_) | Message::Frame(_) => Ok(FrameOutcome::Continue),
        }
    }

    fn process_text(&self, text: &str, bus: &Arc<EventBus>, markets: &MarketIndex) -> FrameOutcome {
        let frame: WsFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "[Kalshi] Failed to parse JSON message");
                return FrameOutcome::Continue;
            }
        };

        let ticker = frame
            .msg
            .get("market_ticker")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let Some(ticker) = ticker else {
            debug!("[Kalshi] Ignoring message without market_ticker");
            return FrameOutcome::Continue;
        };
        let Some(market_id) = markets.market_ids.get(&ticker).cloned() else {
            debug!(ticker = %ticker, "[Kalshi] Ignoring message for un-tracked ticker");
            return FrameOutcome::Continue;
        };

        if !self.advance_sequence(frame.seq) {
            error!(
                seq = ?frame.seq,
                ticker = %ticker,
                "[Kalshi] Sequence gap; requesting resubscription for all markets"
            );
            return FrameOutcome::Resubscribe;
        }

        match frame.msg_type.as_deref() {
            Some("orderbook_snapshot") => match serde_json::from_value::<SnapshotData>(frame.msg) {
                Ok(data) => {
                    self.apply_snapshot(&market_id, &data, bus);
                    FrameOutcome::Continue
                }
                Err(e) => {
                    // A bad snapshot corrupts local state for this market;
                    // the safest action is a fresh subscription.
                    warn!(
                        error = %e,
                        ticker = %ticker,
                        "[Kalshi] Invalid snapshot structure; requesting resubscription"
                    );
                    FrameOutcome::Resubscribe
                }
            },
            Some("orderbook_delta") => match serde_json::from_value::<DeltaData>(frame.msg) {
                Ok(data) => {
                    self.apply_delta(&market_id, &data, bus);
                    FrameOutcome::Continue
                }
                Err(e) => {
                    warn!(error = %e, ticker = %ticker, "[Kalshi] Invalid delta; dropping");
                    FrameOutcome::Continue
                }
            },
            other => {
                debug!(msg_type = ?other, "[Kalshi] Unhandled message type");
                FrameOutcome::Continue
            }
        }
    }

    /// Validates and advances the shared subscription sequence counter.
    ///
    /// The first message must carry `seq = 1`; after that, `last + 1`.
    fn advance_sequence(&self, seq: Option<u64>) -> bool {
        let Some(seq) = seq else {
            warn!("[Kalshi] Message has no sequence number");
            return false;
        };
        let mut state = self.state.lock();
        if seq == state.last_seq + 1 {
            state.last_seq = seq;
            true
        } else {
            false
        }
    }

    fn apply_snapshot(&self, market_id: &str, data: &SnapshotData, bus: &Arc<EventBus>) {
        {
            let mut state = self.state.lock();
            let shadow = state.shadow.entry(data.market_ticker.clone()).or_default();
            shadow.yes.clear();
            shadow.no.clear();
            for (price, size) in &data.yes {
                shadow.yes.insert(*price, *size);
            }
            for (price, size) in &data.no {
                shadow.no.insert(*price, *size);
            }
        }

        let bids = data
            .yes
            .iter()
            .map(|(price, size)| PriceLevel::new(cents_to_price(*price), Decimal::from(*size)))
            .collect();
        let asks = data
            .no
            .iter()
            .map(|(price, size)| {
                PriceLevel::new(Decimal::ONE - cents_to_price(*price), Decimal::from(*size))
            })
            .collect();

        debug!(market_id = %market_id, "[Kalshi] Publishing book snapshot");
        bus.publish(Event::OrderBookSnapshotReceived(OrderBookSnapshot {
            platform: Platform::Kalshi,
            market_id: market_id.to_string(),
            outcome: Outcome::Yes,
            bids,
            asks,
        }));
    }

    fn apply_delta(&self, market_id: &str, data: &DeltaData, bus: &Arc<EventBus>) {
        let (side, price) = match data.side.as_str() {
            "yes" => (Side::Buy, cents_to_price(data.price)),
            "no" => (Side::Sell, Decimal::ONE - cents_to_price(data.price)),
            other => {
                warn!(side = %other, "[Kalshi] Unknown delta side; dropping");
                return;
            }
        };

        let new_size = {
            let mut state = self.state.lock();
            let shadow = state.shadow.entry(data.market_ticker.clone()).or_default();
            let book = match data.side.as_str() {
                "yes" => &mut shadow.yes,
                _ => &mut shadow.no,
            };
            let current = book.get(&data.price).copied().unwrap_or(0);
            let new_size = current + data.delta;
            if new_size < 0 {
                // Protocol desync; drop without advancing the shadow.
                error!(
                    ticker = %data.market_ticker,
                    price = data.price,
                    new_size,
                    "[Kalshi] Negative size computed from delta; dropping"
                );
                return;
            }
            book.insert(data.price, new_size);
            new_size
        };

        bus.publish(Event::OrderBookDeltaReceived(OrderBookDelta {
            platform: Platform::Kalshi,
            market_id: market_id.to_string(),
            outcome: Outcome::Yes,
            side,
            price,
            size: Decimal::from(new_size),
        }));
    }

    async fn send_resubscribe_close<W>(&self, write: &mut W)
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let frame = CloseFrame {
            code: CloseCode::Library(RESUBSCRIBE_CLOSE_CODE),
            reason: "subscription sequence gap".into(),
        };
        if let Err(e) = write.send(Message::Close(Some(frame))).await {
            warn!(error = %e, "[Kalshi] Error closing websocket");
        }
    }
}

fn cents_to_price(cents: u32) -> Decimal {
    Decimal::from(cents) / dec!(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cross_arb_core::{EventHandler, EventKind};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    struct CaptureHandler {
        events: Arc<Mutex<Vec<Event>>>,
    }

    #[async_trait]
    impl EventHandler for CaptureHandler {
        async fn handle(&self, event: Event) -> anyhow::Result<()> {
            self.events.lock().push(event);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "capture"
        }
    }

    fn pair(market_id: &str, ticker: &str) -> MarketPairConfig {
        MarketPairConfig {
            market_id: market_id.to_string(),
            kalshi_ticker: ticker.to_string(),
            polymarket_yes_token_id: "Y1".to_string(),
            polymarket_no_token_id: "N1".to_string(),
        }
    }

    /// Serves one connection: reads the subscription, sends `frames`, then
    /// reports the close code it observes (if any).
    async fn spawn_server(frames: Vec<String>) -> (SocketAddr, oneshot::Receiver<Option<u16>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (close_tx, close_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut write, mut read) = ws.split();

            // Subscription request.
            let _ = read.next().await;

            for frame in frames {
                let _ = write.send(Message::Text(frame)).await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let mut observed = None;
            while let Some(Ok(message)) = read.next().await {
                if let Message::Close(frame) = message {
                    observed = frame.map(|f| u16::from(f.code));
                    break;
                }
            }
            let _ = close_tx.send(observed);
        });

        (addr, close_rx)
    }

    async fn run_client_against(
        addr: SocketAddr,
        pairs: &[MarketPairConfig],
    ) -> (Arc<Mutex<Vec<Event>>>, tokio::task::JoinHandle<()>) {
        let bus = Arc::new(EventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let capture: Arc<dyn EventHandler> = Arc::new(CaptureHandler {
            events: Arc::clone(&events),
        });
        bus.subscribe(EventKind::OrderBookSnapshotReceived, Arc::clone(&capture));
        bus.subscribe(EventKind::OrderBookDeltaReceived, capture);

        let bus_task = Arc::clone(&bus);
        tokio::spawn(async move { bus_task.run().await });

        let config = KalshiWsConfig::default()
            .with_ws_url(format!("ws://{addr}"));
        let client = Arc::new(KalshiWsClient::new(KalshiWsConfig {
            reconnect_delay: Duration::from_secs(60),
            ..config
        }));
        client.set_markets(pairs);
        client.set_bus(bus);

        let task = tokio::spawn(async move {
            let _ = client.run().await;
        });

        (events, task)
    }

    async fn wait_for_events(events: &Arc<Mutex<Vec<Event>>>, count: usize) {
        for _ in 0..300 {
            if events.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {count} events, saw {:?}",
            events.lock().iter().map(Event::kind).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_run_requires_configuration() {
        let client = KalshiWsClient::new(KalshiWsConfig::default());
        let err = client.run().await.unwrap_err();
        assert!(matches!(err, KalshiError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_snapshot_and_delta_normalization() {
        let snapshot = serde_json::json!({
            "type": "orderbook_snapshot",
            "seq": 1,
            "msg": {"market_ticker": "K1", "yes": [[80, 100]], "no": [[55, 10]]}
        });
        let delta = serde_json::json!({
            "type": "orderbook_delta",
            "seq": 2,
            "msg": {"market_ticker": "K1", "price": 80, "delta": -40, "side": "yes"}
        });
        let opposite = serde_json::json!({
            "type": "orderbook_delta",
            "seq": 3,
            "msg": {"market_ticker": "K1", "price": 80, "delta": 40, "side": "yes"}
        });
        let (addr, _close) = spawn_server(vec![
            snapshot.to_string(),
            delta.to_string(),
            opposite.to_string(),
        ])
        .await;
        let (events, task) = run_client_against(addr, &[pair("M1", "K1")]).await;

        wait_for_events(&events, 3).await;
        let events = events.lock().clone();

        match &events[0] {
            Event::OrderBookSnapshotReceived(s) => {
                assert_eq!(s.platform, Platform::Kalshi);
                assert_eq!(s.market_id, "M1");
                assert_eq!(s.outcome, Outcome::Yes);
                assert_eq!(s.bids, vec![PriceLevel::new(dec!(0.80), dec!(100))]);
                assert_eq!(s.asks, vec![PriceLevel::new(dec!(0.45), dec!(10))]);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
        match &events[1] {
            Event::OrderBookDeltaReceived(d) => {
                assert_eq!(d.side, Side::Buy);
                assert_eq!(d.price, dec!(0.80));
                // Shadow: 100 - 40 = 60 absolute contracts.
                assert_eq!(d.size, dec!(60));
            }
            other => panic!("expected delta, got {other:?}"),
        }
        match &events[2] {
            // The opposite-signed delta restores the snapshot size.
            Event::OrderBookDeltaReceived(d) => assert_eq!(d.size, dec!(100)),
            other => panic!("expected delta, got {other:?}"),
        }

        task.abort();
    }

    #[tokio::test]
    async fn test_no_side_delta_maps_to_derived_ask() {
        let snapshot = serde_json::json!({
            "type": "orderbook_snapshot",
            "seq": 1,
            "msg": {"market_ticker": "K1", "yes": [], "no": [[30, 5]]}
        });
        let delta = serde_json::json!({
            "type": "orderbook_delta",
            "seq": 2,
            "msg": {"market_ticker": "K1", "price": 30, "delta": 7, "side": "no"}
        });
        let (addr, _close) = spawn_server(vec![snapshot.to_string(), delta.to_string()]).await;
        let (events, task) = run_client_against(addr, &[pair("M1", "K1")]).await;

        wait_for_events(&events, 2).await;
        let events = events.lock().clone();
        match &events[1] {
            Event::OrderBookDeltaReceived(d) => {
                assert_eq!(d.side, Side::Sell);
                assert_eq!(d.price, dec!(0.70));
                assert_eq!(d.size, dec!(12));
            }
            other => panic!("expected delta, got {other:?}"),
        }
        task.abort();
    }

    #[tokio::test]
    async fn test_sequence_gap_closes_with_code_4000() {
        let snapshot = serde_json::json!({
            "type": "orderbook_snapshot",
            "seq": 1,
            "msg": {"market_ticker": "K1", "yes": [[60, 10]], "no": []}
        });
        let gap_delta = serde_json::json!({
            "type": "orderbook_delta",
            "seq": 3,
            "msg": {"market_ticker": "K1", "price": 60, "delta": 1, "side": "yes"}
        });
        let (addr, close_rx) = spawn_server(vec![snapshot.to_string(), gap_delta.to_string()]).await;
        let (_events, task) = run_client_against(addr, &[pair("M1", "K1")]).await;

        let code = tokio::time::timeout(Duration::from_secs(5), close_rx)
            .await
            .expect("server should observe a close")
            .unwrap();
        assert_eq!(code, Some(RESUBSCRIBE_CLOSE_CODE));
        task.abort();
    }

    #[tokio::test]
    async fn test_negative_delta_dropped_without_advancing_shadow() {
        let snapshot = serde_json::json!({
            "type": "orderbook_snapshot",
            "seq": 1,
            "msg": {"market_ticker": "K1", "yes": [[80, 100]], "no": []}
        });
        // Would take the level to -50: dropped, shadow untouched.
        let bad_delta = serde_json::json!({
            "type": "orderbook_delta",
            "seq": 2,
            "msg": {"market_ticker": "K1", "price": 80, "delta": -150, "side": "yes"}
        });
        let good_delta = serde_json::json!({
            "type": "orderbook_delta",
            "seq": 3,
            "msg": {"market_ticker": "K1", "price": 80, "delta": -40, "side": "yes"}
        });
        let (addr, _close) = spawn_server(vec![
            snapshot.to_string(),
            bad_delta.to_string(),
            good_delta.to_string(),
        ])
        .await;
        let (events, task) = run_client_against(addr, &[pair("M1", "K1")]).await;

        wait_for_events(&events, 2).await;
        let events = events.lock().clone();
        assert_eq!(events.len(), 2, "bad delta must not produce an event");
        match &events[1] {
            Event::OrderBookDeltaReceived(d) => assert_eq!(d.size, dec!(60)),
            other => panic!("expected delta, got {other:?}"),
        }
        task.abort();
    }

    #[tokio::test]
    async fn test_untracked_ticker_ignored() {
        let snapshot = serde_json::json!({
            "type": "orderbook_snapshot",
            "seq": 1,
            "msg": {"market_ticker": "OTHER", "yes": [[60, 10]], "no": []}
        });
        let tracked = serde_json::json!({
            "type": "orderbook_snapshot",
            "seq": 1,
            "msg": {"market_ticker": "K1", "yes": [[60, 10]], "no": []}
        });
        // The untracked frame is skipped before sequence validation, so the
        // tracked snapshot still registers as seq 1.
        let (addr, _close) = spawn_server(vec![snapshot.to_string(), tracked.to_string()]).await;
        let (events, task) = run_client_against(addr, &[pair("M1", "K1")]).await;

        wait_for_events(&events, 1).await;
        assert_eq!(events.lock().len(), 1);
        task.abort();
    }
}
