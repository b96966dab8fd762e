//! Kalshi REST client with request signing and rate limiting.
//!
//! Calls are spaced at least 100 ms apart via a governor rate limiter and
//! signed with the [`KalshiSigner`](crate::auth::KalshiSigner).

use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::auth::KalshiSigner;
use crate::error::{KalshiError, Result};
use crate::types::{Balance, Market, Order, OrderRequest};

/// Kalshi production API base URL.
pub const KALSHI_PROD_URL: &str = "https://trading-api.kalshi.com/trade-api/v2";

/// Kalshi demo API base URL.
pub const KALSHI_DEMO_URL: &str = "https://demo-api.kalshi.co/trade-api/v2";

/// Configuration for the REST client.
#[derive(Debug, Clone)]
pub struct KalshiClientConfig {
    pub base_url: String,
    /// Minimum spacing between requests.
    pub min_request_interval: Duration,
    pub timeout: Duration,
}

impl Default for KalshiClientConfig {
    fn default() -> Self {
        Self {
            base_url: KALSHI_PROD_URL.to_string(),
            min_request_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
        }
    }
}

impl KalshiClientConfig {
    /// Creates a configuration for the demo environment.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            base_url: KALSHI_DEMO_URL.to_string(),
            ..Default::default()
        }
    }

    /// Sets the base URL (tests point this at a mock server).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Rate-limited, request-signing REST client.
pub struct KalshiClient {
    http: reqwest::Client,
    base_url: String,
    /// Path prefix of `base_url`, included in the signed message.
    path_prefix: String,
    signer: Arc<KalshiSigner>,
    limiter: DefaultDirectRateLimiter,
}

impl KalshiClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed or the
    /// rate-limit interval is zero.
    pub fn new(config: KalshiClientConfig, signer: Arc<KalshiSigner>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(KalshiError::from)?;

        let quota = Quota::with_period(config.min_request_interval)
            .ok_or_else(|| KalshiError::InvalidOrder("zero rate-limit interval".to_string()))?;

        let path_prefix = path_prefix_of(&config.base_url);

        Ok(Self {
            http,
            base_url: config.base_url,
            path_prefix,
            signer,
            limiter: RateLimiter::direct(quota),
        })
    }

    /// Returns the account balance in cents.
    #[instrument(skip(self))]
    pub async fn get_balance(&self) -> Result<Balance> {
        self.request::<Balance>(Method::GET, "/portfolio/balance", None)
            .await
    }

    /// Fetches one market by ticker.
    #[instrument(skip(self))]
    pub async fn get_market(&self, ticker: &str) -> Result<Market> {
        #[derive(Deserialize)]
        struct MarketResponse {
            market: Market,
        }
        let resp = self
            .request::<MarketResponse>(Method::GET, &format!("/markets/{ticker}"), None)
            .await?;
        Ok(resp.market)
    }

    /// Submits an order.
    #[instrument(skip(self, request), fields(ticker = %request.ticker, count = request.count))]
    pub async fn create_order(&self, request: &OrderRequest) -> Result<Order> {
        #[derive(Deserialize)]
        struct OrderResponse {
            order: Order,
        }
        let body = serde_json::to_value(request)?;
        let resp = self
            .request::<OrderResponse>(Method::POST, "/portfolio/orders", Some(body))
            .await?;
        Ok(resp.order)
    }

    /// Cancels a resting order.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let path = format!("/portfolio/orders/{order_id}");
        let _: serde_json::Value = self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        self.limiter.until_ready().await;

        let url = format!("{}{path}", self.base_url);
        let signed_path = format!("{}{path}", self.path_prefix);
        let mut builder = self.http.request(method.clone(), &url);
        for (name, value) in self.signer.headers(method.as_str(), &signed_path)? {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        debug!(url = %url, "Sending Kalshi request");
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        match status {
            s if s.is_success() => {
                // Cancels may return an empty body.
                let body = if text.trim().is_empty() { "null" } else { &text };
                Ok(serde_json::from_str(body)?)
            }
            StatusCode::TOO_MANY_REQUESTS => Err(KalshiError::RateLimit),
            s => Err(KalshiError::api(s.as_u16(), text)),
        }
    }
}

/// Extracts the path component of a base URL, e.g.
/// `https://host/trade-api/v2` -> `/trade-api/v2`.
fn path_prefix_of(base_url: &str) -> String {
    base_url
        .split_once("://")
        .and_then(|(_, rest)| rest.find('/').map(|i| rest[i..].to_string()))
        .unwrap_or_default()
}
