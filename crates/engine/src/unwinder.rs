//! Unwinds the surviving leg of a partially-failed arbitrage trade.
//!
//! On `TradeFailed`, places a market order opposing the successful buy:
//! a Kalshi market sell on the same side, or a Polymarket emulated market
//! sell on the held token. A failed unwind leaves one-sided exposure and
//! is treated as fatal: it is logged at error and the shutdown signal is
//! set for manual reconciliation.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use tracing::{error, info, warn};
use uuid::Uuid;

use cross_arb_core::events::{Event, TradeFailed};
use cross_arb_core::types::{KalshiSide, Platform, PolySide, TradeDetails};
use cross_arb_core::{EventHandler, ShutdownSignal};
use cross_arb_kalshi::types::Action;

use crate::gateway::TradeGateway;

/// Places opposing market orders for stranded legs.
pub struct Unwinder {
    gateway: Arc<dyn TradeGateway>,
    shutdown: ShutdownSignal,
}

impl Unwinder {
    #[must_use]
    pub fn new(gateway: Arc<dyn TradeGateway>, shutdown: ShutdownSignal) -> Self {
        Self { gateway, shutdown }
    }

    async fn handle_trade_failed(&self, event: &TradeFailed) {
        info!(
            market_id = %event.opportunity.market_id,
            successful_leg = %event.successful_leg.platform,
            "Unwinder processing failed trade"
        );
        match event.successful_leg.platform {
            Platform::Kalshi => self.unwind_kalshi(&event.successful_leg).await,
            Platform::Polymarket => self.unwind_polymarket(&event.successful_leg).await,
        }
    }

    async fn unwind_kalshi(&self, leg: &TradeDetails) {
        let Some(ticker) = leg.kalshi_ticker.as_deref() else {
            error!("Kalshi unwind missing ticker; signaling shutdown");
            self.shutdown.trigger();
            return;
        };
        let side = leg.kalshi_side.unwrap_or(KalshiSide::Yes);
        let count = leg.trade_size.to_u32().unwrap_or(0);

        warn!(
            ticker = %ticker,
            side = ?side,
            count,
            "EMERGENCY UNWIND: placing Kalshi market sell"
        );
        match self
            .gateway
            .place_kalshi_market_order(
                ticker,
                side,
                count,
                &Uuid::new_v4().to_string(),
                Action::Sell,
                None,
            )
            .await
        {
            Ok(order) => {
                info!(order_id = ?order.order_id, "Placed Kalshi emergency unwind order");
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Failed to place Kalshi unwind order; signaling shutdown");
                self.shutdown.trigger();
            }
        }
    }

    async fn unwind_polymarket(&self, leg: &TradeDetails) {
        let Some(token_id) = leg.polymarket_token_id.as_deref() else {
            error!("Polymarket unwind missing token id; signaling shutdown");
            self.shutdown.trigger();
            return;
        };

        warn!(
            token_id = %token_id,
            size = %leg.trade_size,
            "EMERGENCY UNWIND: placing Polymarket market sell"
        );
        match self
            .gateway
            .place_polymarket_market_order(token_id, leg.trade_size, PolySide::Sell)
            .await
        {
            Ok(order) => {
                info!(order_id = ?order.order_id, "Placed Polymarket emergency unwind order");
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Failed to place Polymarket unwind order; signaling shutdown");
                self.shutdown.trigger();
            }
        }
    }
}

#[async_trait]
impl EventHandler for Unwinder {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        if let Event::TradeFailed(failed) = event {
            self.handle_trade_failed(&failed).await;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "unwinder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use cross_arb_core::types::{ArbitrageOpportunity, KalshiOrder, PolymarketOrder};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        KalshiMarket {
            ticker: String,
            side: KalshiSide,
            count: u32,
            action: Action,
        },
        PolymarketMarket {
            token_id: String,
            size: Decimal,
            side: PolySide,
        },
    }

    struct MockGateway {
        fail: bool,
        calls: Mutex<Vec<Call>>,
    }

    impl MockGateway {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TradeGateway for MockGateway {
        async fn place_kalshi_order(
            &self,
            _ticker: &str,
            _side: KalshiSide,
            _count: u32,
            _price_in_cents: u32,
            _client_order_id: &str,
        ) -> Result<KalshiOrder> {
            unreachable!("unwinder never places limit orders")
        }

        async fn place_kalshi_market_order(
            &self,
            ticker: &str,
            side: KalshiSide,
            count: u32,
            _client_order_id: &str,
            action: Action,
            _buy_max_cost: Option<i64>,
        ) -> Result<KalshiOrder> {
            self.calls.lock().push(Call::KalshiMarket {
                ticker: ticker.to_string(),
                side,
                count,
                action,
            });
            if self.fail {
                return Err(anyhow!("kalshi unwind rejected"));
            }
            Ok(KalshiOrder {
                order_id: Some("unwind-1".to_string()),
                client_order_id: None,
                ticker: ticker.to_string(),
                side: Some(side),
                action: Some("sell".to_string()),
                status: "executed".to_string(),
                yes_price: None,
                no_price: None,
                trade_size: Decimal::from(count),
            })
        }

        async fn place_polymarket_order(
            &self,
            _token_id: &str,
            _price: Decimal,
            _size: Decimal,
            _side: PolySide,
        ) -> Result<PolymarketOrder> {
            unreachable!("unwinder never places limit orders")
        }

        async fn place_polymarket_market_order(
            &self,
            token_id: &str,
            size: Decimal,
            side: PolySide,
        ) -> Result<PolymarketOrder> {
            self.calls.lock().push(Call::PolymarketMarket {
                token_id: token_id.to_string(),
                size,
                side,
            });
            if self.fail {
                return Err(anyhow!("polymarket unwind rejected"));
            }
            Ok(PolymarketOrder {
                success: true,
                error_msg: None,
                order_id: Some("unwind-2".to_string()),
                status: "matched".to_string(),
                taker_amount: None,
                making_amount: None,
                transactions_hashes: None,
                trade_size: size,
                token_id: Some(token_id.to_string()),
            })
        }
    }

    fn opportunity() -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            market_id: "M1".to_string(),
            buy_yes_platform: Platform::Kalshi,
            buy_yes_price: dec!(0.45),
            buy_no_platform: Platform::Polymarket,
            buy_no_price: dec!(0.40),
            profit_margin: dec!(0.13),
            potential_trade_size: dec!(25),
            kalshi_fees: dec!(0.18),
            kalshi_ticker: "K1".to_string(),
            polymarket_yes_token_id: "Y1".to_string(),
            polymarket_no_token_id: "N1".to_string(),
        }
    }

    fn failed_with_poly_leg() -> TradeFailed {
        TradeFailed {
            failed_leg_platform: Platform::Kalshi,
            successful_leg: TradeDetails {
                platform: Platform::Polymarket,
                trade_size: dec!(5),
                order_id: Some("O2".to_string()),
                kalshi_ticker: None,
                kalshi_side: None,
                polymarket_token_id: Some("N1".to_string()),
            },
            opportunity: opportunity(),
            error_message: "kalshi leg refused".to_string(),
        }
    }

    fn failed_with_kalshi_leg() -> TradeFailed {
        TradeFailed {
            failed_leg_platform: Platform::Polymarket,
            successful_leg: TradeDetails {
                platform: Platform::Kalshi,
                trade_size: dec!(5),
                order_id: Some("K-ORD".to_string()),
                kalshi_ticker: Some("K1".to_string()),
                kalshi_side: Some(KalshiSide::Yes),
                polymarket_token_id: None,
            },
            opportunity: opportunity(),
            error_message: "polymarket leg refused".to_string(),
        }
    }

    #[tokio::test]
    async fn test_polymarket_leg_unwound_with_market_sell() {
        let gateway = MockGateway::new(false);
        let shutdown = ShutdownSignal::new();
        let unwinder = Unwinder::new(Arc::clone(&gateway) as Arc<dyn TradeGateway>, shutdown.clone());

        unwinder
            .handle(Event::TradeFailed(failed_with_poly_leg()))
            .await
            .unwrap();

        assert_eq!(
            gateway.calls.lock().clone(),
            vec![Call::PolymarketMarket {
                token_id: "N1".to_string(),
                size: dec!(5),
                side: PolySide::Sell,
            }]
        );
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_kalshi_leg_unwound_with_same_side_sell() {
        let gateway = MockGateway::new(false);
        let shutdown = ShutdownSignal::new();
        let unwinder = Unwinder::new(Arc::clone(&gateway) as Arc<dyn TradeGateway>, shutdown.clone());

        unwinder
            .handle(Event::TradeFailed(failed_with_kalshi_leg()))
            .await
            .unwrap();

        assert_eq!(
            gateway.calls.lock().clone(),
            vec![Call::KalshiMarket {
                ticker: "K1".to_string(),
                side: KalshiSide::Yes,
                count: 5,
                action: Action::Sell,
            }]
        );
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_unwind_failure_is_fatal() {
        let gateway = MockGateway::new(true);
        let shutdown = ShutdownSignal::new();
        let unwinder = Unwinder::new(Arc::clone(&gateway) as Arc<dyn TradeGateway>, shutdown.clone());

        unwinder
            .handle(Event::TradeFailed(failed_with_poly_leg()))
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_missing_token_id_is_fatal() {
        let gateway = MockGateway::new(false);
        let shutdown = ShutdownSignal::new();
        let unwinder = Unwinder::new(Arc::clone(&gateway) as Arc<dyn TradeGateway>, shutdown.clone());

        let mut event = failed_with_poly_leg();
        event.successful_leg.polymarket_token_id = None;
        unwinder.handle(Event::TradeFailed(event)).await.unwrap();

        assert!(gateway.calls.lock().is_empty());
        assert!(shutdown.is_triggered());
    }
}
