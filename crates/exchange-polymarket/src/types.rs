//! Data models for the Polymarket venue.

use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use cross_arb_core::PolySide;

/// Order time-in-force / type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Fill-or-kill: fills entirely and immediately or is cancelled.
    FOK,
    /// Fill-and-kill: fills what is available, cancels the rest.
    FAK,
    /// Good-til-cancelled: rests on the book.
    GTC,
}

impl OrderType {
    /// Returns the API string representation.
    #[must_use]
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::FOK => "FOK",
            Self::FAK => "FAK",
            Self::GTC => "GTC",
        }
    }
}

/// Order payload posted to the CLOB.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPayload {
    #[serde(rename = "tokenID")]
    pub token_id: String,
    pub price: Decimal,
    pub size: Decimal,
    pub side: PolySide,
    #[serde(rename = "orderType")]
    pub order_type: OrderType,
}

/// Response from order placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "errorMsg", default)]
    pub error_msg: Option<String>,
    #[serde(rename = "orderID", default)]
    pub order_id: Option<String>,
    pub status: String,
    #[serde(rename = "takerAmount", default)]
    pub taker_amount: Option<String>,
    #[serde(rename = "makingAmount", default)]
    pub making_amount: Option<String>,
    #[serde(rename = "transactionsHashes", default)]
    pub transactions_hashes: Option<Vec<String>>,
}

/// Market metadata from the gamma API, used during discovery.
///
/// `clobTokenIds` arrives either as a JSON array or as a JSON-encoded
/// string containing one; both forms are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
    pub id: String,
    #[serde(default)]
    pub active: bool,
    #[serde(
        rename = "clobTokenIds",
        deserialize_with = "deserialize_token_ids",
        default
    )]
    pub clob_token_ids: Vec<String>,
    #[serde(default)]
    pub question: Option<String>,
}

fn deserialize_token_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| D::Error::custom("token id must be a string"))
            })
            .collect(),
        serde_json::Value::String(s) => {
            serde_json::from_str(&s).map_err(|e| D::Error::custom(format!("bad token id list: {e}")))
        }
        serde_json::Value::Null => Ok(Vec::new()),
        other => Err(D::Error::custom(format!(
            "unexpected clobTokenIds value: {other}"
        ))),
    }
}

// =============================================================================
// WebSocket wire schemas
// =============================================================================

/// Outgoing subscription frame for the `/market` channel.
#[derive(Debug, Serialize)]
pub struct SubscribeFrame<'a> {
    pub assets_ids: &'a [String],
    #[serde(rename = "type")]
    pub channel: &'static str,
}

/// A (price, size) level as decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct WirePriceLevel {
    pub price: String,
    pub size: String,
}

/// `event_type: "book"` — a full per-asset snapshot.
#[derive(Debug, Deserialize)]
pub struct BookMessage {
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub bids: Vec<WirePriceLevel>,
    #[serde(default)]
    pub asks: Vec<WirePriceLevel>,
}

impl BookMessage {
    /// The asset the snapshot belongs to.
    #[must_use]
    pub fn asset_key(&self) -> Option<&str> {
        self.asset_id.as_deref().or(self.market.as_deref())
    }
}

/// One change inside a `price_change` message; `size` is absolute.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceChange {
    pub price: String,
    pub side: String,
    pub size: String,
}

/// `event_type: "price_change"` — one or more level changes per message.
#[derive(Debug, Deserialize)]
pub struct PriceChangeMessage {
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub changes: Vec<PriceChange>,
}

impl PriceChangeMessage {
    /// The asset the changes belong to.
    #[must_use]
    pub fn asset_key(&self) -> Option<&str> {
        self.asset_id.as_deref().or(self.market.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_payload_wire_names() {
        let payload = OrderPayload {
            token_id: "token-1".to_string(),
            price: dec!(0.40),
            size: dec!(5),
            side: PolySide::Buy,
            order_type: OrderType::FOK,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["tokenID"], "token-1");
        assert_eq!(json["side"], "BUY");
        assert_eq!(json["orderType"], "FOK");
    }

    #[test]
    fn test_order_response_parsing() {
        let json = r#"{
            "success": true,
            "orderID": "0xorder",
            "status": "matched",
            "takerAmount": "5",
            "makingAmount": "2",
            "transactionsHashes": ["0xabc"]
        }"#;
        let resp: OrderResponse = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        assert_eq!(resp.order_id.as_deref(), Some("0xorder"));
        assert_eq!(resp.taker_amount.as_deref(), Some("5"));
        assert!(resp.error_msg.is_none());
    }

    #[test]
    fn test_gamma_market_token_ids_as_array() {
        let json = r#"{"id": "0xcond", "active": true, "clobTokenIds": ["y", "n"]}"#;
        let market: GammaMarket = serde_json::from_str(json).unwrap();
        assert_eq!(market.clob_token_ids, vec!["y", "n"]);
    }

    #[test]
    fn test_gamma_market_token_ids_as_json_string() {
        let json = r#"{"id": "0xcond", "active": false, "clobTokenIds": "[\"y\", \"n\"]"}"#;
        let market: GammaMarket = serde_json::from_str(json).unwrap();
        assert_eq!(market.clob_token_ids, vec!["y", "n"]);
        assert!(!market.active);
    }

    #[test]
    fn test_book_message_asset_key_falls_back_to_market() {
        let json = r#"{"event_type": "book", "market": "token-9", "bids": [], "asks": []}"#;
        let msg: BookMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.asset_key(), Some("token-9"));
    }

    #[test]
    fn test_price_change_parsing() {
        let json = r#"{
            "event_type": "price_change",
            "asset_id": "token-1",
            "changes": [
                {"price": ".49", "side": "BUY", "size": "50"},
                {"price": ".51", "side": "SELL", "size": "0"}
            ]
        }"#;
        let msg: PriceChangeMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.asset_key(), Some("token-1"));
        assert_eq!(msg.changes.len(), 2);
        assert_eq!(msg.changes[1].size, "0");
    }
}
