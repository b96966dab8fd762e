//! The order-placement seam between the engine and the venue clients.
//!
//! [`TradeGateway`] translates engine-level intents into venue API calls
//! and post-processes raw responses into the domain order models carried
//! in events and trade records. The executor and unwinder depend only on
//! the trait, so tests can substitute a mock.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use cross_arb_core::types::{KalshiOrder, KalshiSide, PolySide, PolymarketOrder};
use cross_arb_kalshi::types::{Action, Order as KalshiRawOrder, OrderRequest};
use cross_arb_kalshi::KalshiClient;
use cross_arb_polymarket::types::{OrderResponse, OrderType};
use cross_arb_polymarket::PolymarketClient;

/// Places orders on both venues.
#[async_trait]
pub trait TradeGateway: Send + Sync {
    /// Places a fill-or-kill limit order on Kalshi.
    async fn place_kalshi_order(
        &self,
        ticker: &str,
        side: KalshiSide,
        count: u32,
        price_in_cents: u32,
        client_order_id: &str,
    ) -> Result<KalshiOrder>;

    /// Places a true market order on Kalshi. `buy_max_cost` is required
    /// for market buys and ignored for sells.
    async fn place_kalshi_market_order(
        &self,
        ticker: &str,
        side: KalshiSide,
        count: u32,
        client_order_id: &str,
        action: Action,
        buy_max_cost: Option<i64>,
    ) -> Result<KalshiOrder>;

    /// Places a fill-or-kill limit order on Polymarket.
    async fn place_polymarket_order(
        &self,
        token_id: &str,
        price: Decimal,
        size: Decimal,
        side: PolySide,
    ) -> Result<PolymarketOrder>;

    /// Places an emulated market order on Polymarket.
    async fn place_polymarket_market_order(
        &self,
        token_id: &str,
        size: Decimal,
        side: PolySide,
    ) -> Result<PolymarketOrder>;
}

/// Gateway backed by the real venue clients.
pub struct LiveTradeGateway {
    kalshi: Arc<KalshiClient>,
    polymarket: Arc<PolymarketClient>,
}

impl LiveTradeGateway {
    #[must_use]
    pub fn new(kalshi: Arc<KalshiClient>, polymarket: Arc<PolymarketClient>) -> Self {
        Self { kalshi, polymarket }
    }
}

#[async_trait]
impl TradeGateway for LiveTradeGateway {
    async fn place_kalshi_order(
        &self,
        ticker: &str,
        side: KalshiSide,
        count: u32,
        price_in_cents: u32,
        client_order_id: &str,
    ) -> Result<KalshiOrder> {
        info!(ticker = %ticker, side = ?side, count, price_in_cents, "Placing Kalshi limit order");
        let request = OrderRequest::limit_buy(ticker, side, price_in_cents, count, client_order_id);
        let order = self
            .kalshi
            .create_order(&request)
            .await
            .context("Kalshi order placement failed")?;
        Ok(process_kalshi_order(order, Decimal::from(count)))
    }

    async fn place_kalshi_market_order(
        &self,
        ticker: &str,
        side: KalshiSide,
        count: u32,
        client_order_id: &str,
        action: Action,
        buy_max_cost: Option<i64>,
    ) -> Result<KalshiOrder> {
        if action == Action::Buy && buy_max_cost.is_none() {
            anyhow::bail!("buy_max_cost is required for a market buy order");
        }
        info!(ticker = %ticker, side = ?side, count, action = ?action, "Placing Kalshi market order");
        let request = OrderRequest::market(ticker, side, action, count, client_order_id, buy_max_cost);
        let order = self
            .kalshi
            .create_order(&request)
            .await
            .context("Kalshi market order placement failed")?;
        Ok(process_kalshi_order(order, Decimal::from(count)))
    }

    async fn place_polymarket_order(
        &self,
        token_id: &str,
        price: Decimal,
        size: Decimal,
        side: PolySide,
    ) -> Result<PolymarketOrder> {
        info!(token_id = %token_id, %price, %size, side = ?side, "Placing Polymarket FOK order");
        let response = self
            .polymarket
            .place_order(token_id, price, size, side, OrderType::FOK)
            .await
            .context("Polymarket order placement failed")?;
        Ok(process_polymarket_order(response, token_id, size))
    }

    async fn place_polymarket_market_order(
        &self,
        token_id: &str,
        size: Decimal,
        side: PolySide,
    ) -> Result<PolymarketOrder> {
        info!(token_id = %token_id, %size, side = ?side, "Placing Polymarket market order");
        let response = self
            .polymarket
            .place_market_order(token_id, size, side)
            .await
            .context("Polymarket market order placement failed")?;
        Ok(process_polymarket_order(response, token_id, size))
    }
}

/// Maps a raw Kalshi order onto the domain model, attaching the size.
fn process_kalshi_order(order: KalshiRawOrder, trade_size: Decimal) -> KalshiOrder {
    let side = match order.side.as_deref() {
        Some("yes") => Some(KalshiSide::Yes),
        Some("no") => Some(KalshiSide::No),
        _ => None,
    };
    KalshiOrder {
        order_id: order.order_id,
        client_order_id: order.client_order_id,
        ticker: order.ticker,
        side,
        action: order.action,
        status: order.status,
        yes_price: order.yes_price,
        no_price: order.no_price,
        trade_size,
    }
}

/// Maps a raw Polymarket response onto the domain model. The executed
/// size comes from `takerAmount` when parseable, else the requested size.
fn process_polymarket_order(
    response: OrderResponse,
    token_id: &str,
    requested_size: Decimal,
) -> PolymarketOrder {
    let trade_size = response
        .taker_amount
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(requested_size);
    PolymarketOrder {
        success: response.success,
        error_msg: response.error_msg,
        order_id: response.order_id,
        status: response.status,
        taker_amount: response.taker_amount,
        making_amount: response.making_amount,
        transactions_hashes: response.transactions_hashes,
        trade_size,
        token_id: Some(token_id.to_string()),
    }
}
