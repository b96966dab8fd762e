//! Data models for the Kalshi venue.
//!
//! REST order/balance/market models plus the WebSocket wire schemas for the
//! `orderbook_delta` channel. Prices are integer cents on the wire; sizes
//! are integer contracts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Order types
// =============================================================================

/// Order action (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    /// Returns the API string representation.
    #[must_use]
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Request body for `POST /portfolio/orders`.
///
/// Limit orders carry exactly one of `yes_price`/`no_price`; market buys
/// require `buy_max_cost`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub ticker: String,
    /// Side as an API string ("yes"/"no").
    pub side: &'static str,
    pub action: Action,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub count: u32,
    pub client_order_id: String,
    pub time_in_force: &'static str,
    pub post_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yes_price: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_price: Option<u32>,
    /// Required for market buys; spend ceiling in cents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_max_cost: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_ts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_position_floor: Option<i32>,
}

impl OrderRequest {
    /// Fill-or-kill limit buy for the given side at `price_cents`.
    #[must_use]
    pub fn limit_buy(
        ticker: impl Into<String>,
        side: cross_arb_core::KalshiSide,
        price_cents: u32,
        count: u32,
        client_order_id: impl Into<String>,
    ) -> Self {
        let (yes_price, no_price) = match side {
            cross_arb_core::KalshiSide::Yes => (Some(price_cents), None),
            cross_arb_core::KalshiSide::No => (None, Some(price_cents)),
        };
        Self {
            ticker: ticker.into(),
            side: side.as_api_str(),
            action: Action::Buy,
            order_type: OrderType::Limit,
            count,
            client_order_id: client_order_id.into(),
            time_in_force: "fill_or_kill",
            post_only: false,
            yes_price,
            no_price,
            buy_max_cost: None,
            expiration_ts: None,
            sell_position_floor: None,
        }
    }

    /// Market order with an explicit action; buys must set `buy_max_cost`.
    #[must_use]
    pub fn market(
        ticker: impl Into<String>,
        side: cross_arb_core::KalshiSide,
        action: Action,
        count: u32,
        client_order_id: impl Into<String>,
        buy_max_cost: Option<i64>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            side: side.as_api_str(),
            action,
            order_type: OrderType::Market,
            count,
            client_order_id: client_order_id.into(),
            time_in_force: "fill_or_kill",
            post_only: false,
            yes_price: None,
            no_price: None,
            buy_max_cost,
            expiration_ts: None,
            sell_position_floor: None,
        }
    }
}

/// Order as returned by the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Option<String>,
    pub client_order_id: Option<String>,
    pub ticker: String,
    pub side: Option<String>,
    pub action: Option<String>,
    #[serde(rename = "type")]
    pub order_type: Option<String>,
    pub status: String,
    pub yes_price: Option<u32>,
    pub no_price: Option<u32>,
}

/// Account balance, in cents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Balance {
    pub balance: i64,
}

impl Balance {
    /// Balance in dollars.
    #[must_use]
    pub fn dollars(&self) -> Decimal {
        Decimal::from(self.balance) / Decimal::from(100)
    }
}

/// Market metadata used during discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub ticker: String,
    pub status: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl Market {
    /// Returns true if the market is open for trading.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == "active" || self.status == "open"
    }
}

// =============================================================================
// WebSocket wire schemas
// =============================================================================

/// Outgoing subscription command.
#[derive(Debug, Serialize)]
pub struct SubscribeCommand<'a> {
    pub id: u64,
    pub cmd: &'static str,
    pub params: SubscribeParams<'a>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeParams<'a> {
    pub channels: Vec<&'static str>,
    pub market_tickers: &'a [String],
}

/// Loosely-typed incoming frame, inspected before full validation.
#[derive(Debug, Deserialize)]
pub struct WsFrame {
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub seq: Option<u64>,
    #[serde(default)]
    pub msg: serde_json::Value,
}

/// `orderbook_snapshot` payload. Levels are `[price_cents, contracts]`.
#[derive(Debug, Deserialize)]
pub struct SnapshotData {
    pub market_ticker: String,
    #[serde(default)]
    pub yes: Vec<(u32, i64)>,
    #[serde(default)]
    pub no: Vec<(u32, i64)>,
}

/// `orderbook_delta` payload. `delta` is a signed size change.
#[derive(Debug, Deserialize)]
pub struct DeltaData {
    pub market_ticker: String,
    pub price: u32,
    pub delta: i64,
    pub side: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cross_arb_core::KalshiSide;
    use rust_decimal_macros::dec;

    #[test]
    fn test_limit_buy_yes_sets_only_yes_price() {
        let req = OrderRequest::limit_buy("KXBTC-TEST", KalshiSide::Yes, 45, 10, "cid-1");
        assert_eq!(req.side, "yes");
        assert_eq!(req.yes_price, Some(45));
        assert!(req.no_price.is_none());
        assert_eq!(req.time_in_force, "fill_or_kill");
        assert_eq!(req.order_type, OrderType::Limit);
    }

    #[test]
    fn test_limit_buy_no_sets_only_no_price() {
        let req = OrderRequest::limit_buy("KXBTC-TEST", KalshiSide::No, 55, 10, "cid-2");
        assert!(req.yes_price.is_none());
        assert_eq!(req.no_price, Some(55));
    }

    #[test]
    fn test_market_sell_serializes_without_prices() {
        let req = OrderRequest::market("KXBTC-TEST", KalshiSide::Yes, Action::Sell, 5, "cid-3", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "market");
        assert_eq!(json["action"], "sell");
        assert!(json.get("yes_price").is_none());
        assert!(json.get("buy_max_cost").is_none());
    }

    #[test]
    fn test_balance_dollars() {
        let balance = Balance { balance: 25_050 };
        assert_eq!(balance.dollars(), dec!(250.50));
    }

    #[test]
    fn test_snapshot_wire_parsing() {
        let json = r#"{
            "type": "orderbook_snapshot",
            "seq": 1,
            "msg": {"market_ticker": "KXBTC-TEST", "yes": [[60, 10]], "no": [[55, 10]]}
        }"#;

        let frame: WsFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.msg_type.as_deref(), Some("orderbook_snapshot"));
        assert_eq!(frame.seq, Some(1));

        let snapshot: SnapshotData = serde_json::from_value(frame.msg).unwrap();
        assert_eq!(snapshot.market_ticker, "KXBTC-TEST");
        assert_eq!(snapshot.yes, vec![(60, 10)]);
        assert_eq!(snapshot.no, vec![(55, 10)]);
    }

    #[test]
    fn test_delta_wire_parsing() {
        let json = r#"{"market_ticker": "KXBTC-TEST", "price": 80, "delta": -40, "side": "yes"}"#;
        let delta: DeltaData = serde_json::from_str(json).unwrap();
        assert_eq!(delta.price, 80);
        assert_eq!(delta.delta, -40);
        assert_eq!(delta.side, "yes");
    }

    #[test]
    fn test_subscribe_command_shape() {
        let tickers = vec!["K1".to_string(), "K2".to_string()];
        let cmd = SubscribeCommand {
            id: 1,
            cmd: "subscribe",
            params: SubscribeParams {
                channels: vec!["orderbook_delta"],
                market_tickers: &tickers,
            },
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains(r#""cmd":"subscribe""#));
        assert!(json.contains(r#""channels":["orderbook_delta"]"#));
        assert!(json.contains(r#""market_tickers":["K1","K2"]"#));
    }
}
