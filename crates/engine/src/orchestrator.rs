//! Application orchestration.
//!
//! The orchestrator is the composition root of the live trading loop: it
//! resolves configured market pairs against both venues, registers
//! markets, wires every handler onto the bus, and manages the runtime
//! tasks. After a successful arbitrage round it performs a soft reset:
//! both adapter tasks are cancelled, the cool-down elapses, all books are
//! cleared, and the adapters are restarted so fresh snapshots arrive.
//! Any component may set the shutdown signal; the orchestrator then
//! cancels everything, drains trade storage, and returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use cross_arb_core::config::{MarketPairEntry, TradingConfig};
use cross_arb_core::events::Event;
use cross_arb_core::types::MarketPairConfig;
use cross_arb_core::{EventBus, EventHandler, EventKind, ShutdownSignal};
use cross_arb_kalshi::types::Market as KalshiMarket;
use cross_arb_kalshi::{KalshiClient, KalshiWsClient};
use cross_arb_polymarket::types::GammaMarket;
use cross_arb_polymarket::{PolymarketClient, PolymarketWsClient};

use crate::balances::BalanceOracle;
use crate::detector::{ArbitrageDetector, DetectorConfig};
use crate::executor::{ExecutorConfig, TradeExecutor};
use crate::gateway::TradeGateway;
use crate::sizing::SizingConfig;
use crate::state::MarketStateManager;
use crate::storage::TradeStorage;
use crate::unwinder::Unwinder;

/// Orchestration parameters.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pause between cancelling ingestion and restarting it.
    pub cool_down: Duration,
    pub dry_run: bool,
    pub trading: TradingConfig,
}

/// Owns the runtime lifecycle of all tasks.
pub struct Orchestrator {
    bus: Arc<EventBus>,
    manager: Arc<MarketStateManager>,
    kalshi_ws: Arc<KalshiWsClient>,
    poly_ws: Arc<PolymarketWsClient>,
    kalshi_client: Arc<KalshiClient>,
    poly_client: Arc<PolymarketClient>,
    gateway: Arc<dyn TradeGateway>,
    oracle: Arc<dyn BalanceOracle>,
    storage: Arc<TradeStorage>,
    shutdown: ShutdownSignal,
    config: OrchestratorConfig,
    market_entries: Vec<MarketPairEntry>,
    tasks: Mutex<HashMap<&'static str, JoinHandle<()>>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        bus: Arc<EventBus>,
        manager: Arc<MarketStateManager>,
        kalshi_ws: Arc<KalshiWsClient>,
        poly_ws: Arc<PolymarketWsClient>,
        kalshi_client: Arc<KalshiClient>,
        poly_client: Arc<PolymarketClient>,
        gateway: Arc<dyn TradeGateway>,
        oracle: Arc<dyn BalanceOracle>,
        storage: Arc<TradeStorage>,
        shutdown: ShutdownSignal,
        config: OrchestratorConfig,
        market_entries: Vec<MarketPairEntry>,
    ) -> Self {
        Self {
            bus,
            manager,
            kalshi_ws,
            poly_ws,
            kalshi_client,
            poly_client,
            gateway,
            oracle,
            storage,
            shutdown,
            config,
            market_entries,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Configures markets, wires handlers, starts all tasks, and blocks
    /// until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration or startup balances are invalid.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let configs = self.configure_markets().await?;

        let balances = self
            .oracle
            .get_venue_balances()
            .await
            .context("startup balance check failed")?;
        info!(
            usd = %balances.usd,
            usdc_e = %balances.usdc_e,
            pol = %balances.pol,
            "Startup balances loaded"
        );
        let wallets = balances.into_wallets();

        // Composition root: subscribe every handler in dispatch order.
        let detector = Arc::new(ArbitrageDetector::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.bus),
            DetectorConfig::from_trading(&self.config.trading),
            configs,
            wallets,
        ));
        let executor = Arc::new(TradeExecutor::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.bus),
            self.shutdown.clone(),
            ExecutorConfig {
                dry_run: self.config.dry_run,
                sizing: SizingConfig::from_trading(&self.config.trading),
            },
        ));
        let unwinder = Arc::new(Unwinder::new(
            Arc::clone(&self.gateway),
            self.shutdown.clone(),
        ));

        let manager: Arc<dyn EventHandler> = Arc::clone(&self.manager) as _;
        self.bus
            .subscribe(EventKind::OrderBookSnapshotReceived, Arc::clone(&manager));
        self.bus
            .subscribe(EventKind::OrderBookDeltaReceived, manager);
        let detector: Arc<dyn EventHandler> = detector;
        self.bus.subscribe(EventKind::BookUpdated, Arc::clone(&detector));
        self.bus
            .subscribe(EventKind::OpportunityFound, Arc::clone(&detector));
        self.bus
            .subscribe(EventKind::TradeAttemptCompleted, detector);
        self.bus.subscribe(EventKind::ExecuteTrade, executor);
        self.bus.subscribe(
            EventKind::StoreTradeResults,
            Arc::clone(&self.storage) as Arc<dyn EventHandler>,
        );
        self.bus.subscribe(EventKind::TradeFailed, unwinder);
        self.bus.subscribe(
            EventKind::ArbitrageTradeSuccessful,
            Arc::clone(&self) as Arc<dyn EventHandler>,
        );

        // Runtime tasks.
        {
            let bus = Arc::clone(&self.bus);
            self.tasks
                .lock()
                .insert("event_bus", tokio::spawn(async move { bus.run().await }));
        }
        self.spawn_adapters();
        self.storage.start();
        info!("Orchestrator started all tasks");

        self.shutdown.triggered().await;
        warn!("Shutdown signal received; stopping all services");
        self.stop().await;
        Ok(())
    }

    /// Resolves the configured pairs against both venues and configures
    /// the adapters and the state manager.
    async fn configure_markets(&self) -> Result<Vec<MarketPairConfig>> {
        info!(pairs = self.market_entries.len(), "Configuring markets");
        ensure!(
            !self.market_entries.is_empty(),
            "no market pairs configured"
        );

        let poly_ids: Vec<String> = self
            .market_entries
            .iter()
            .map(|e| e.polymarket_market_id.clone())
            .collect();

        let (gamma_markets, kalshi_markets) = tokio::join!(
            self.poly_client.get_markets_by_ids(&poly_ids),
            self.fetch_kalshi_markets(),
        );
        let gamma_markets = gamma_markets.context("polymarket market lookup failed")?;

        let configs = build_market_configs(&self.market_entries, &gamma_markets, &kalshi_markets);
        ensure!(
            !configs.is_empty(),
            "no tradeable market pairs after discovery"
        );

        for config in &configs {
            self.manager.register_market(&config.market_id);
        }
        self.kalshi_ws.set_markets(&configs);
        self.kalshi_ws.set_bus(Arc::clone(&self.bus));
        self.poly_ws.set_markets(&configs);
        self.poly_ws.set_bus(Arc::clone(&self.bus));

        info!(markets = configs.len(), "Market configuration complete");
        Ok(configs)
    }

    async fn fetch_kalshi_markets(&self) -> Vec<KalshiMarket> {
        let mut markets = Vec::new();
        for entry in &self.market_entries {
            match self.kalshi_client.get_market(&entry.kalshi_ticker).await {
                Ok(market) => markets.push(market),
                Err(e) => {
                    warn!(
                        ticker = %entry.kalshi_ticker,
                        error = %e,
                        "Could not fetch Kalshi market; skipping pair"
                    );
                }
            }
        }
        markets
    }

    fn spawn_adapters(&self) {
        let mut tasks = self.tasks.lock();

        let kalshi = Arc::clone(&self.kalshi_ws);
        let kalshi_shutdown = self.shutdown.clone();
        tasks.insert(
            "kalshi_ws",
            tokio::spawn(async move {
                if let Err(e) = kalshi.run().await {
                    error!(error = %e, "Kalshi adapter exited; signaling shutdown");
                    kalshi_shutdown.trigger();
                }
            }),
        );

        let poly = Arc::clone(&self.poly_ws);
        let poly_shutdown = self.shutdown.clone();
        tasks.insert(
            "poly_ws",
            tokio::spawn(async move {
                if let Err(e) = poly.run().await {
                    error!(error = %e, "Polymarket adapter exited; signaling shutdown");
                    poly_shutdown.trigger();
                }
            }),
        );
    }

    fn abort_adapters(&self) {
        let mut tasks = self.tasks.lock();
        for name in ["kalshi_ws", "poly_ws"] {
            if let Some(task) = tasks.remove(name) {
                task.abort();
                info!(task = name, "Cancelled adapter task");
            }
        }
    }

    /// Soft reset after a successful round: cancel ingestion, cool down,
    /// clear books, reconnect. The detector stays locked until the final
    /// `TradeAttemptCompleted` is processed; the reset publishes nothing.
    async fn soft_reset(&self) {
        info!(
            cool_down = ?self.config.cool_down,
            "Successful trade detected; starting cool-down and reset"
        );
        self.abort_adapters();

        tokio::time::sleep(self.config.cool_down).await;
        info!("Cool-down complete; resetting market state");
        self.manager.reset();

        self.spawn_adapters();
        info!("Reset complete; resuming normal operation");
    }

    /// Stops all running tasks gracefully.
    pub async fn stop(&self) {
        let tasks: Vec<(&'static str, JoinHandle<()>)> = self.tasks.lock().drain().collect();
        for (name, task) in tasks {
            if !task.is_finished() {
                task.abort();
                info!(task = name, "Cancelled task");
            }
            // Cancellation errors are expected and swallowed.
            let _ = task.await;
        }
        self.storage.stop().await;
        self.bus.unsubscribe_all();
        info!("Orchestrator stopped");
    }
}

#[async_trait]
impl EventHandler for Orchestrator {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        if matches!(event, Event::ArbitrageTradeSuccessful) {
            self.soft_reset().await;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "orchestrator"
    }
}

/// Joins configured pairs with live venue metadata, skipping pairs that
/// are missing, inactive, or structurally incomplete.
#[must_use]
pub fn build_market_configs(
    entries: &[MarketPairEntry],
    gamma_markets: &[GammaMarket],
    kalshi_markets: &[KalshiMarket],
) -> Vec<MarketPairConfig> {
    let mut configs = Vec::new();
    for entry in entries {
        let Some(gamma) = gamma_markets
            .iter()
            .find(|m| m.id == entry.polymarket_market_id)
        else {
            warn!(pair = %entry.kalshi_ticker, "No Polymarket data for pair; skipping");
            continue;
        };
        let Some(kalshi) = kalshi_markets
            .iter()
            .find(|m| m.ticker == entry.kalshi_ticker)
        else {
            warn!(pair = %entry.kalshi_ticker, "No Kalshi data for pair; skipping");
            continue;
        };

        if !gamma.active || !kalshi.is_active() {
            warn!(pair = %entry.kalshi_ticker, "Market pair is not active; skipping");
            continue;
        }
        if gamma.clob_token_ids.len() != 2 {
            warn!(
                pair = %entry.kalshi_ticker,
                tokens = gamma.clob_token_ids.len(),
                "Unexpected token count for pair; skipping"
            );
            continue;
        }

        configs.push(MarketPairConfig {
            market_id: kalshi.ticker.clone(),
            kalshi_ticker: kalshi.ticker.clone(),
            polymarket_yes_token_id: gamma.clob_token_ids[0].clone(),
            polymarket_no_token_id: gamma.clob_token_ids[1].clone(),
        });
    }
    configs
}
