//! Batched persistence of trade attempts.
//!
//! Trade results accumulate in a bounded in-memory buffer and are flushed
//! to a [`TradeSink`] when the batch size is reached or on a periodic
//! tick. A failed flush re-prepends the batch for the next attempt
//! (at-least-once; duplicates are possible across restarts). `stop()`
//! cancels the periodic task and drains whatever remains. The buffer
//! mutex is held only for buffer mutation, never across sink I/O.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use cross_arb_core::events::{ArbTradeResult, Event};
use cross_arb_core::types::ArbitrageOpportunity;
use cross_arb_core::EventHandler;

/// Result of a sink insert: rows written plus an optional error string.
#[derive(Debug, Clone, Default)]
pub struct InsertResponse {
    pub data: Vec<serde_json::Value>,
    pub error: Option<String>,
}

/// Persistence sink for trade-attempt records. Idempotency is not
/// assumed.
#[async_trait]
pub trait TradeSink: Send + Sync {
    async fn insert(&self, batch: Vec<TradeAttemptRecord>) -> anyhow::Result<InsertResponse>;
}

/// One row in the persistence sink: the opportunity flattened together
/// with per-venue execution outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct TradeAttemptRecord {
    #[serde(flatten)]
    pub opportunity: ArbitrageOpportunity,
    pub category: String,
    pub detected_at: DateTime<Utc>,
    pub kalshi_trade_executed: bool,
    pub kalshi_order_id: Option<String>,
    pub kalshi_error: Option<String>,
    pub poly_trade_executed: bool,
    pub poly_order_id: Option<String>,
    pub polymarket_error: Option<String>,
}

impl From<&ArbTradeResult> for TradeAttemptRecord {
    fn from(result: &ArbTradeResult) -> Self {
        let kalshi_trade_executed = result.kalshi_order.is_some() && result.kalshi_error.is_none();
        let poly_trade_executed =
            result.polymarket_order.is_some() && result.polymarket_error.is_none();
        Self {
            opportunity: result.opportunity.clone(),
            category: result.category.clone(),
            detected_at: result.timestamp,
            kalshi_trade_executed,
            kalshi_order_id: result
                .kalshi_order
                .as_ref()
                .and_then(|o| o.order_id.clone()),
            kalshi_error: result.kalshi_error.clone(),
            poly_trade_executed,
            poly_order_id: result
                .polymarket_order
                .as_ref()
                .and_then(|o| o.order_id.clone()),
            polymarket_error: result.polymarket_error.clone(),
        }
    }
}

/// REST sink posting record batches as JSON.
pub struct RestTradeSink {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

impl RestTradeSink {
    /// Creates a sink posting to `endpoint` with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            endpoint: endpoint.into(),
            api_key: SecretString::from(api_key.into()),
        })
    }
}

#[async_trait]
impl TradeSink for RestTradeSink {
    async fn insert(&self, batch: Vec<TradeAttemptRecord>) -> anyhow::Result<InsertResponse> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("apikey", self.api_key.expose_secret())
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Prefer", "return=representation")
            .json(&batch)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            let data = serde_json::from_str(&text).unwrap_or_default();
            Ok(InsertResponse { data, error: None })
        } else {
            Ok(InsertResponse {
                data: Vec::new(),
                error: Some(format!("{status}: {text}")),
            })
        }
    }
}

/// Storage behavior parameters.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Buffered results that trigger an inline flush.
    pub batch_size: usize,
    /// Periodic flush interval.
    pub flush_interval: Duration,
    /// Hard cap on buffered results; the oldest is dropped beyond it.
    pub max_buffer_len: usize,
    /// Dry-run mode drops records instead of buffering.
    pub dry_run: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_secs(30 * 60),
            max_buffer_len: 10_000,
            dry_run: false,
        }
    }
}

/// Accumulates trade results and flushes them in batches.
pub struct TradeStorage {
    sink: Arc<dyn TradeSink>,
    settings: StorageSettings,
    buffer: Mutex<VecDeque<ArbTradeResult>>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
    stop_tx: watch::Sender<bool>,
}

impl TradeStorage {
    #[must_use]
    pub fn new(sink: Arc<dyn TradeSink>, settings: StorageSettings) -> Self {
        let (stop_tx, _stop_rx) = watch::channel(false);
        Self {
            sink,
            settings,
            buffer: Mutex::new(VecDeque::new()),
            flush_task: Mutex::new(None),
            stop_tx,
        }
    }

    /// Starts the periodic flush task.
    pub fn start(self: &Arc<Self>) {
        let storage = Arc::clone(self);
        let mut stop_rx = self.stop_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(storage.settings.flush_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await; // immediate first tick

            loop {
                tokio::select! {
                    _ = interval.tick() => storage.flush().await,
                    _ = stop_rx.changed() => {
                        info!("Flushing trade batches before stopping storage");
                        storage.flush().await;
                        break;
                    }
                }
            }
        });
        *self.flush_task.lock() = Some(handle);
        info!(
            batch_size = self.settings.batch_size,
            flush_interval_secs = self.settings.flush_interval.as_secs(),
            "Trade batch storage started"
        );
    }

    /// Stops the periodic task and drains the remaining buffer.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self.flush_task.lock().take();
        match handle {
            Some(handle) => {
                let _ = handle.await;
            }
            // start() was never called; drain directly.
            None => self.flush().await,
        }
        info!("Trade batch storage stopped");
    }

    /// Buffered results awaiting flush.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    async fn handle_store(&self, result: ArbTradeResult) {
        if self.settings.dry_run {
            return;
        }

        let should_flush = {
            let mut buffer = self.buffer.lock();
            buffer.push_back(result);
            while buffer.len() > self.settings.max_buffer_len {
                buffer.pop_front();
                warn!("Trade result buffer over capacity; dropped oldest record");
            }
            buffer.len() >= self.settings.batch_size
        };

        if should_flush {
            self.flush().await;
        }
    }

    /// Flushes the buffered results to the sink. On failure the batch is
    /// put back at the front of the buffer for the next attempt.
    async fn flush(&self) {
        let batch: Vec<ArbTradeResult> = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                debug!("No trade results to flush");
                return;
            }
            buffer.drain(..).collect()
        };

        let records: Vec<TradeAttemptRecord> = batch.iter().map(TradeAttemptRecord::from).collect();
        let count = records.len();

        let outcome = self.sink.insert(records).await;
        match outcome {
            Ok(response) if response.error.is_none() => {
                info!(flushed = count, "Flushed trade results to the sink");
            }
            Ok(response) => {
                error!(
                    error = response.error.as_deref().unwrap_or("unknown"),
                    "Sink rejected trade batch; re-queueing for retry"
                );
                self.requeue(batch);
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Failed to flush trade batch; re-queueing for retry");
                self.requeue(batch);
            }
        }
    }

    fn requeue(&self, batch: Vec<ArbTradeResult>) {
        let mut buffer = self.buffer.lock();
        for result in batch.into_iter().rev() {
            buffer.push_front(result);
        }
    }
}

#[async_trait]
impl EventHandler for TradeStorage {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        if let Event::StoreTradeResults(store) = event {
            self.handle_store(store.result).await;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "trade_storage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cross_arb_core::types::Platform;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockSink {
        fail: AtomicBool,
        batches: Mutex<Vec<Vec<TradeAttemptRecord>>>,
    }

    impl MockSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail: AtomicBool::new(false),
                batches: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TradeSink for MockSink {
        async fn insert(&self, batch: Vec<TradeAttemptRecord>) -> anyhow::Result<InsertResponse> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("sink unavailable");
            }
            self.batches.lock().push(batch);
            Ok(InsertResponse::default())
        }
    }

    fn result(market_id: &str) -> ArbTradeResult {
        ArbTradeResult {
            category: "buy both".to_string(),
            opportunity: ArbitrageOpportunity {
                market_id: market_id.to_string(),
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
            },
            kalshi_order: None,
            kalshi_error: Some("refused".to_string()),
            polymarket_order: None,
            polymarket_error: None,
            timestamp: Utc::now(),
        }
    }

    fn settings(batch_size: usize) -> StorageSettings {
        StorageSettings {
            batch_size,
            flush_interval: Duration::from_secs(3600),
            max_buffer_len: 100,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn test_batch_size_triggers_inline_flush() {
        let sink = MockSink::new();
        let storage = TradeStorage::new(Arc::clone(&sink) as Arc<dyn TradeSink>, settings(2));

        storage.handle_store(result("M1")).await;
        assert_eq!(storage.buffered(), 1);
        assert!(sink.batches.lock().is_empty());

        storage.handle_store(result("M2")).await;
        assert_eq!(storage.buffered(), 0);
        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][0].opportunity.market_id, "M1");
    }

    #[tokio::test]
    async fn test_failed_flush_requeues_in_order() {
        let sink = MockSink::new();
        sink.fail.store(true, Ordering::SeqCst);
        let storage = TradeStorage::new(Arc::clone(&sink) as Arc<dyn TradeSink>, settings(2));

        storage.handle_store(result("M1")).await;
        storage.handle_store(result("M2")).await;
        // Flush failed: both results back in the buffer, order preserved.
        assert_eq!(storage.buffered(), 2);

        sink.fail.store(false, Ordering::SeqCst);
        storage.flush().await;
        assert_eq!(storage.buffered(), 0);
        let batches = sink.batches.lock();
        assert_eq!(batches[0][0].opportunity.market_id, "M1");
        assert_eq!(batches[0][1].opportunity.market_id, "M2");
    }

    #[tokio::test]
    async fn test_stop_drains_buffer() {
        let sink = MockSink::new();
        let storage = Arc::new(TradeStorage::new(
            Arc::clone(&sink) as Arc<dyn TradeSink>,
            settings(100),
        ));
        storage.start();

        storage.handle_store(result("M1")).await;
        storage.stop().await;

        assert_eq!(storage.buffered(), 0);
        assert_eq!(sink.batches.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_without_start_still_drains() {
        let sink = MockSink::new();
        let storage = TradeStorage::new(Arc::clone(&sink) as Arc<dyn TradeSink>, settings(100));
        storage.handle_store(result("M1")).await;
        storage.stop().await;
        assert_eq!(sink.batches.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_drops_records() {
        let sink = MockSink::new();
        let mut dry = settings(1);
        dry.dry_run = true;
        let storage = TradeStorage::new(Arc::clone(&sink) as Arc<dyn TradeSink>, dry);

        storage.handle_store(result("M1")).await;
        assert_eq!(storage.buffered(), 0);
        assert!(sink.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_buffer_cap_drops_oldest() {
        let sink = MockSink::new();
        sink.fail.store(true, Ordering::SeqCst);
        let mut capped = settings(100);
        capped.max_buffer_len = 2;
        let storage = TradeStorage::new(Arc::clone(&sink) as Arc<dyn TradeSink>, capped);

        storage.handle_store(result("M1")).await;
        storage.handle_store(result("M2")).await;
        storage.handle_store(result("M3")).await;
        assert_eq!(storage.buffered(), 2);

        sink.fail.store(false, Ordering::SeqCst);
        storage.flush().await;
        let batches = sink.batches.lock();
        assert_eq!(batches[0][0].opportunity.market_id, "M2");
        assert_eq!(batches[0][1].opportunity.market_id, "M3");
    }

    #[test]
    fn test_record_serialization_flattens_opportunity() {
        let record = TradeAttemptRecord::from(&result("M1"));
        assert!(!record.kalshi_trade_executed);
        assert!(!record.poly_trade_executed);

        let json = serde_json::to_value(&record).unwrap();
        // Opportunity fields sit at the top level, decimals as strings.
        assert_eq!(json["market_id"], "M1");
        assert_eq!(json["buy_yes_price"], "0.45");
        assert_eq!(json["category"], "buy both");
        assert_eq!(json["kalshi_error"], "refused");
        assert!(json["detected_at"].as_str().unwrap().contains('T'));
    }
}
