//! Polymarket REST client.
//!
//! Covers the surfaces the engine needs: FOK order placement, emulated
//! market orders, gamma market lookup for discovery, and the two balance
//! queries behind the balance oracle (CLOB collateral and Polygon gas).
//!
//! Write calls carry L2 HMAC-SHA256 authentication headers. The venue has
//! no true market-order primitive, so market orders are emulated with an
//! aggressively-priced FOK limit (0.01 for SELL, 0.99 for BUY).

use std::time::Duration;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use cross_arb_core::PolySide;

use crate::error::{PolymarketError, Result};
use crate::types::{GammaMarket, OrderPayload, OrderResponse, OrderType};

/// Production CLOB REST base URL.
pub const CLOB_BASE_URL: &str = "https://clob.polymarket.com";

/// Production gamma (market metadata) base URL.
pub const GAMMA_BASE_URL: &str = "https://gamma-api.polymarket.com";

/// Aggressive price used to emulate a market SELL.
const MARKET_SELL_PRICE: Decimal = dec!(0.01);

/// Aggressive price used to emulate a market BUY.
const MARKET_BUY_PRICE: Decimal = dec!(0.99);

/// L2 API credentials.
#[derive(Clone)]
pub struct L2Credentials {
    pub api_key: SecretString,
    pub secret: SecretString,
    pub passphrase: SecretString,
    /// Funding wallet address, sent as `POLY_ADDRESS`.
    pub address: String,
}

impl L2Credentials {
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            secret: SecretString::from(secret.into()),
            passphrase: SecretString::from(passphrase.into()),
            address: address.into(),
        }
    }
}

/// Configuration for the REST client.
#[derive(Debug, Clone)]
pub struct PolymarketClientConfig {
    pub clob_base_url: String,
    pub gamma_base_url: String,
    /// Polygon JSON-RPC endpoint for the gas-token balance.
    pub polygon_rpc_url: String,
    pub timeout: Duration,
    pub min_request_interval: Duration,
}

impl Default for PolymarketClientConfig {
    fn default() -> Self {
        Self {
            clob_base_url: CLOB_BASE_URL.to_string(),
            gamma_base_url: GAMMA_BASE_URL.to_string(),
            polygon_rpc_url: String::new(),
            timeout: Duration::from_secs(30),
            min_request_interval: Duration::from_millis(100),
        }
    }
}

/// REST client for the CLOB and gamma APIs.
pub struct PolymarketClient {
    http: reqwest::Client,
    config: PolymarketClientConfig,
    credentials: Option<L2Credentials>,
    limiter: DefaultDirectRateLimiter,
}

impl PolymarketClient {
    /// Creates a new client; credentials may be omitted for read-only use.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        config: PolymarketClientConfig,
        credentials: Option<L2Credentials>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(PolymarketError::from)?;
        let quota = Quota::with_period(config.min_request_interval).ok_or_else(|| {
            PolymarketError::Serialization("zero rate-limit interval".to_string())
        })?;
        Ok(Self {
            http,
            config,
            credentials,
            limiter: RateLimiter::direct(quota),
        })
    }

    /// Places a limit order on the CLOB (FOK for arbitrage legs).
    #[instrument(skip(self), fields(token_id = %token_id, side = ?side))]
    pub async fn place_order(
        &self,
        token_id: &str,
        price: Decimal,
        size: Decimal,
        side: PolySide,
        order_type: OrderType,
    ) -> Result<OrderResponse> {
        let payload = OrderPayload {
            token_id: token_id.to_string(),
            price,
            size,
            side,
            order_type,
        };
        let body = serde_json::to_string(&payload)?;
        let response: OrderResponse = self
            .signed_request(Method::POST, "/order", Some(body))
            .await?;
        if !response.success {
            let detail = response
                .error_msg
                .clone()
                .unwrap_or_else(|| response.status.clone());
            return Err(PolymarketError::OrderRejected(detail));
        }
        Ok(response)
    }

    /// Emulates a market order with an aggressively-priced FOK limit.
    #[instrument(skip(self), fields(token_id = %token_id, side = ?side))]
    pub async fn place_market_order(
        &self,
        token_id: &str,
        size: Decimal,
        side: PolySide,
    ) -> Result<OrderResponse> {
        let price = match side {
            PolySide::Sell => MARKET_SELL_PRICE,
            PolySide::Buy => MARKET_BUY_PRICE,
        };
        self.place_order(token_id, price, size, side, OrderType::FOK)
            .await
    }

    /// Fetches gamma market metadata for the given condition ids.
    #[instrument(skip(self, ids))]
    pub async fn get_markets_by_ids(&self, ids: &[String]) -> Result<Vec<GammaMarket>> {
        self.limiter.until_ready().await;
        let url = format!("{}/markets", self.config.gamma_base_url);
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("id", id.as_str())).collect();

        let response = self.http.get(&url).query(&query).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(PolymarketError::api(status.as_u16(), text));
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Returns (USDC.e collateral, POL gas) balances in natural units.
    ///
    /// Collateral comes from the CLOB balance endpoint (micro units); the
    /// gas balance from a Polygon `eth_getBalance` call (wei).
    #[instrument(skip(self))]
    pub async fn get_starting_balances(&self) -> Result<(Decimal, Decimal)> {
        let collateral = self.get_collateral_balance().await?;
        let gas = self.get_gas_balance().await?;
        Ok((collateral, gas))
    }

    async fn get_collateral_balance(&self) -> Result<Decimal> {
        #[derive(Deserialize)]
        struct BalanceAllowance {
            balance: String,
        }
        let resp: BalanceAllowance = self
            .signed_request(Method::GET, "/balance-allowance?asset_type=COLLATERAL", None)
            .await?;
        let micro: Decimal = resp
            .balance
            .parse()
            .map_err(|_| PolymarketError::Serialization(format!("bad balance: {}", resp.balance)))?;
        Ok(micro / dec!(1000000))
    }

    async fn get_gas_balance(&self) -> Result<Decimal> {
        #[derive(Deserialize)]
        struct RpcResponse {
            result: Option<String>,
            error: Option<serde_json::Value>,
        }
        let address = self
            .credentials
            .as_ref()
            .map(|c| c.address.clone())
            .ok_or(PolymarketError::NotConfigured("wallet address"))?;

        self.limiter.until_ready().await;
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBalance",
            "params": [address, "latest"],
        });
        let resp: RpcResponse = self
            .http
            .post(&self.config.polygon_rpc_url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = resp.error {
            return Err(PolymarketError::api(0, error.to_string()));
        }
        let hex = resp
            .result
            .ok_or_else(|| PolymarketError::Serialization("missing RPC result".to_string()))?;
        let wei = i128::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|_| PolymarketError::Serialization(format!("bad wei value: {hex}")))?;
        Decimal::try_from_i128_with_scale(wei, 18)
            .map_err(|e| PolymarketError::Serialization(e.to_string()))
    }

    async fn signed_request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<String>,
    ) -> Result<T> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(PolymarketError::NotConfigured("L2 credentials"))?;

        self.limiter.until_ready().await;
        let url = format!("{}{path_and_query}", self.config.clob_base_url);
        let timestamp = Utc::now().timestamp().to_string();
        let signature = l2_signature(
            credentials,
            &timestamp,
            method.as_str(),
            path_and_query,
            body.as_deref(),
        )?;

        let mut builder = self
            .http
            .request(method, &url)
            .header("POLY_ADDRESS", &credentials.address)
            .header("POLY_API_KEY", credentials.api_key.expose_secret())
            .header("POLY_PASSPHRASE", credentials.passphrase.expose_secret())
            .header("POLY_TIMESTAMP", &timestamp)
            .header("POLY_SIGNATURE", signature);
        if let Some(body) = body {
            builder = builder
                .header("content-type", "application/json")
                .body(body);
        }

        debug!(url = %url, "Sending Polymarket request");
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        match status {
            s if s.is_success() => Ok(serde_json::from_str(&text)?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(PolymarketError::Authentication(text))
            }
            s => Err(PolymarketError::api(s.as_u16(), text)),
        }
    }
}

/// Computes the L2 HMAC signature over `timestamp + method + path + body`.
fn l2_signature(
    credentials: &L2Credentials,
    timestamp: &str,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<String> {
    let secret = credentials.secret.expose_secret();
    let key = URL_SAFE
        .decode(secret)
        .or_else(|_| URL_SAFE_NO_PAD.decode(secret))
        .unwrap_or_else(|_| {
            warn!("L2 secret is not base64; using raw bytes");
            secret.as_bytes().to_vec()
        });

    let mut message = format!("{timestamp}{method}{path}");
    if let Some(body) = body {
        message.push_str(body);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|e| PolymarketError::Authentication(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}
