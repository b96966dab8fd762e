//! Two-leg trade execution.
//!
//! Consumes `ExecuteTrade`, sizes the trade, and dispatches both legs
//! concurrently. Outcomes are classified into three paths: both legs
//! succeed (`ArbitrageTradeSuccessful`), exactly one fails
//! (`TradeFailed`, which triggers the unwinder), or both fail (the
//! shutdown signal is set). `StoreTradeResults` is published
//! unconditionally and `TradeAttemptCompleted` last on every path, so the
//! detector always unlocks.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{error, info, warn};
use uuid::Uuid;

use cross_arb_core::events::{ArbTradeResult, Event, ExecuteTrade, StoreTradeResults, TradeFailed};
use cross_arb_core::types::{
    ArbitrageOpportunity, KalshiOrder, KalshiSide, Platform, PolySide, PolymarketOrder,
    TradeDetails,
};
use cross_arb_core::{EventBus, EventHandler, ShutdownSignal};

use crate::gateway::TradeGateway;
use crate::sizing::{trade_size, SizingConfig};

/// Category label attached to buy-both trade records.
pub const CATEGORY_BUY_BOTH: &str = "buy both";

/// Executor parameters.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Short-circuit both legs to synthetic placed results.
    pub dry_run: bool,
    pub sizing: SizingConfig,
}

/// Places both legs of an opportunity and classifies the outcome.
pub struct TradeExecutor {
    gateway: Arc<dyn TradeGateway>,
    bus: Arc<EventBus>,
    shutdown: ShutdownSignal,
    config: ExecutorConfig,
    /// Optimistic total spent on confirmed trades, in dollars.
    cumulative_spend: Mutex<Decimal>,
}

impl TradeExecutor {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn TradeGateway>,
        bus: Arc<EventBus>,
        shutdown: ShutdownSignal,
        config: ExecutorConfig,
    ) -> Self {
        if config.dry_run {
            warn!("TradeExecutor is in DRY RUN mode; no real orders will be placed");
        }
        Self {
            gateway,
            bus,
            shutdown,
            config,
            cumulative_spend: Mutex::new(Decimal::ZERO),
        }
    }

    /// Total confirmed spend so far.
    #[must_use]
    pub fn cumulative_spend(&self) -> Decimal {
        *self.cumulative_spend.lock()
    }

    async fn handle_execute(&self, command: ExecuteTrade) {
        let opportunity = command.opportunity;
        let spent = self.cumulative_spend();
        let size = trade_size(
            &command.wallets,
            opportunity.potential_trade_size,
            opportunity.kalshi_fees,
            spent,
            &self.config.sizing,
        );

        if size == 0 {
            info!(
                market_id = %opportunity.market_id,
                "Opportunity found but sized to zero; not trading"
            );
            self.bus.publish(Event::TradeAttemptCompleted);
            return;
        }

        info!(
            market_id = %opportunity.market_id,
            trade_size = size,
            buy_yes_platform = %opportunity.buy_yes_platform,
            buy_no_platform = %opportunity.buy_no_platform,
            dry_run = self.config.dry_run,
            "Executing arbitrage"
        );

        let (kalshi_result, polymarket_result) = self.place_legs(&opportunity, size).await;
        self.classify_and_publish(opportunity, kalshi_result, polymarket_result);
    }

    async fn place_legs(
        &self,
        opportunity: &ArbitrageOpportunity,
        size: u32,
    ) -> (Result<KalshiOrder>, Result<PolymarketOrder>) {
        if self.config.dry_run {
            return dry_run_legs(opportunity, size);
        }

        match opportunity.buy_yes_platform {
            Platform::Kalshi => tokio::join!(
                self.kalshi_leg(
                    &opportunity.kalshi_ticker,
                    KalshiSide::Yes,
                    opportunity.buy_yes_price,
                    size,
                ),
                self.polymarket_leg(
                    &opportunity.polymarket_no_token_id,
                    opportunity.buy_no_price,
                    size,
                ),
            ),
            Platform::Polymarket => tokio::join!(
                self.kalshi_leg(
                    &opportunity.kalshi_ticker,
                    KalshiSide::No,
                    opportunity.buy_no_price,
                    size,
                ),
                self.polymarket_leg(
                    &opportunity.polymarket_yes_token_id,
                    opportunity.buy_yes_price,
                    size,
                ),
            ),
        }
    }

    async fn kalshi_leg(
        &self,
        ticker: &str,
        side: KalshiSide,
        price: Decimal,
        size: u32,
    ) -> Result<KalshiOrder> {
        let price_in_cents = (price * dec!(100))
            .round()
            .to_u32()
            .context("leg price out of range")?;
        self.gateway
            .place_kalshi_order(
                ticker,
                side,
                size,
                price_in_cents,
                &Uuid::new_v4().to_string(),
            )
            .await
    }

    async fn polymarket_leg(
        &self,
        token_id: &str,
        price: Decimal,
        size: u32,
    ) -> Result<PolymarketOrder> {
        self.gateway
            .place_polymarket_order(token_id, price, Decimal::from(size), PolySide::Buy)
            .await
    }

    fn classify_and_publish(
        &self,
        opportunity: ArbitrageOpportunity,
        kalshi_result: Result<KalshiOrder>,
        polymarket_result: Result<PolymarketOrder>,
    ) {
        let result = ArbTradeResult {
            category: CATEGORY_BUY_BOTH.to_string(),
            opportunity: opportunity.clone(),
            kalshi_order: kalshi_result.as_ref().ok().cloned(),
            kalshi_error: kalshi_result.as_ref().err().map(|e| format!("{e:#}")),
            polymarket_order: polymarket_result.as_ref().ok().cloned(),
            polymarket_error: polymarket_result.as_ref().err().map(|e| format!("{e:#}")),
            timestamp: Utc::now(),
        };
        self.bus
            .publish(Event::StoreTradeResults(StoreTradeResults { result }));

        match (kalshi_result, polymarket_result) {
            (Ok(kalshi), Ok(_polymarket)) => {
                let spend = kalshi.trade_size
                    * (opportunity.buy_yes_price + opportunity.buy_no_price)
                    + opportunity.kalshi_fees;
                *self.cumulative_spend.lock() += spend;
                info!(
                    market_id = %opportunity.market_id,
                    spend = %spend,
                    "Both arbitrage legs succeeded"
                );
                self.bus.publish(Event::ArbitrageTradeSuccessful);
            }
            (Err(kalshi_error), Ok(polymarket)) => {
                warn!("Kalshi leg failed, Polymarket succeeded; triggering unwind");
                let successful_leg = TradeDetails {
                    platform: Platform::Polymarket,
                    trade_size: polymarket.trade_size,
                    order_id: polymarket.order_id.clone(),
                    kalshi_ticker: None,
                    kalshi_side: None,
                    polymarket_token_id: polymarket.token_id.clone(),
                };
                self.publish_trade_failed(
                    Platform::Kalshi,
                    successful_leg,
                    opportunity,
                    format!("{kalshi_error:#}"),
                );
            }
            (Ok(kalshi), Err(polymarket_error)) => {
                warn!("Polymarket leg failed, Kalshi succeeded; triggering unwind");
                let successful_leg = TradeDetails {
                    platform: Platform::Kalshi,
                    trade_size: kalshi.trade_size,
                    order_id: kalshi.order_id.clone(),
                    kalshi_ticker: Some(kalshi.ticker.clone()),
                    kalshi_side: kalshi.side,
                    polymarket_token_id: None,
                };
                self.publish_trade_failed(
                    Platform::Polymarket,
                    successful_leg,
                    opportunity,
                    format!("{polymarket_error:#}"),
                );
            }
            (Err(kalshi_error), Err(polymarket_error)) => {
                error!(
                    market_id = %opportunity.market_id,
                    kalshi_error = %format!("{kalshi_error:#}"),
                    polymarket_error = %format!("{polymarket_error:#}"),
                    "Both arbitrage legs failed; signaling shutdown"
                );
                self.shutdown.trigger();
            }
        }

        // Always last, so the detector unlocks on every path.
        self.bus.publish(Event::TradeAttemptCompleted);
    }

    fn publish_trade_failed(
        &self,
        failed_leg_platform: Platform,
        successful_leg: TradeDetails,
        opportunity: ArbitrageOpportunity,
        error_message: String,
    ) {
        warn!(
            failed_leg = %failed_leg_platform,
            successful_leg = %successful_leg.platform,
            "Publishing TradeFailed event"
        );
        self.bus.publish(Event::TradeFailed(TradeFailed {
            failed_leg_platform,
            successful_leg,
            opportunity,
            error_message,
        }));
    }
}

/// Synthetic placed results for dry-run mode. No order ids are assigned;
/// downstream consumers treat the id as absent.
fn dry_run_legs(
    opportunity: &ArbitrageOpportunity,
    size: u32,
) -> (Result<KalshiOrder>, Result<PolymarketOrder>) {
    let (kalshi_side, kalshi_price, poly_token, poly_price) = match opportunity.buy_yes_platform {
        Platform::Kalshi => (
            KalshiSide::Yes,
            opportunity.buy_yes_price,
            &opportunity.polymarket_no_token_id,
            opportunity.buy_no_price,
        ),
        Platform::Polymarket => (
            KalshiSide::No,
            opportunity.buy_no_price,
            &opportunity.polymarket_yes_token_id,
            opportunity.buy_yes_price,
        ),
    };
    info!(
        ticker = %opportunity.kalshi_ticker,
        side = ?kalshi_side,
        price = %kalshi_price,
        "[DRY RUN] Would place Kalshi order"
    );
    info!(
        token_id = %poly_token,
        price = %poly_price,
        "[DRY RUN] Would place Polymarket order"
    );

    let price_cents = (kalshi_price * dec!(100)).round().to_u32();
    let (yes_price, no_price) = match kalshi_side {
        KalshiSide::Yes => (price_cents, None),
        KalshiSide::No => (None, price_cents),
    };
    let kalshi = KalshiOrder {
        order_id: None,
        client_order_id: None,
        ticker: opportunity.kalshi_ticker.clone(),
        side: Some(kalshi_side),
        action: Some("buy".to_string()),
        status: "dry_run".to_string(),
        yes_price,
        no_price,
        trade_size: Decimal::from(size),
    };
    let polymarket = PolymarketOrder {
        success: true,
        error_msg: None,
        order_id: None,
        status: "dry_run".to_string(),
        taker_amount: None,
        making_amount: None,
        transactions_hashes: None,
        trade_size: Decimal::from(size),
        token_id: Some(poly_token.clone()),
    };
    (Ok(kalshi), Ok(polymarket))
}

#[async_trait]
impl EventHandler for TradeExecutor {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        if let Event::ExecuteTrade(command) = event {
            self.handle_execute(command).await;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "trade_executor"
    }
}
