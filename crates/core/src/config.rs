//! Application configuration.
//!
//! Loaded by the CLI via figment: a TOML file merged with `ARB_`-prefixed
//! environment variables (credentials are normally supplied through the
//! environment, everything else through the file).

use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Venue environment selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Demo,
    Prod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    /// When set, both legs short-circuit to synthetic results and records
    /// are not persisted.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub kalshi: KalshiConfig,
    pub polymarket: PolymarketConfig,
    /// Market pairs to trade, matched offline.
    pub markets: Vec<MarketPairEntry>,
}

/// One configured market pair: the Polymarket market id and the equivalent
/// Kalshi ticker. Token ids are resolved at startup by market discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPairEntry {
    pub polymarket_market_id: String,
    pub kalshi_ticker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Required margin below 1.0 before an opportunity qualifies.
    pub profitability_buffer: Decimal,
    /// Maximum allowed gap between the two books' last updates.
    pub staleness_threshold_secs: u64,
    /// Kalshi taker fee rate.
    pub kalshi_fee_rate: Decimal,
    /// Pause between a successful trade and ingestion restart.
    pub cool_down_seconds: u64,
    /// Combined-wallet floor used by the max-spend guard.
    pub minimum_wallet_balance: Decimal,
    /// Trade sizes below this are treated as zero.
    pub shutdown_balance: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            profitability_buffer: Decimal::new(1, 2), // 0.01
            staleness_threshold_secs: 5,
            kalshi_fee_rate: Decimal::new(7, 2), // 0.07
            cool_down_seconds: 5,
            minimum_wallet_balance: Decimal::from(100),
            shutdown_balance: Decimal::from(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Buffered records that trigger an inline flush.
    pub batch_size: usize,
    /// Periodic flush interval.
    pub flush_interval_secs: u64,
    /// Hard cap on the buffer; the oldest record is dropped beyond it.
    pub max_buffer_len: usize,
    /// Persistence sink REST endpoint.
    pub endpoint: String,
    /// Sink API key.
    pub api_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_secs: 30 * 60,
            max_buffer_len: 10_000,
            endpoint: String::new(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalshiConfig {
    /// REST base URL; defaults are chosen from `environment` when empty.
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub ws_url: Option<String>,
    pub api_key_id: String,
    /// Path to the RSA private key PEM used for request signing.
    pub private_key_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolymarketConfig {
    #[serde(default)]
    pub clob_base_url: Option<String>,
    #[serde(default)]
    pub gamma_base_url: Option<String>,
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Polygon JSON-RPC endpoint used for the gas-token balance.
    pub polygon_rpc_url: String,
    /// Funding wallet address on Polygon.
    pub wallet_address: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

/// Loads [`AppConfig`] from a TOML file merged with the environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from `path`, overridden by `ARB_*` env vars
    /// (nested keys split on `__`, e.g. `ARB_KALSHI__API_KEY_ID`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a required field is
    /// missing after the merge.
    pub fn load(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ARB_").split("__"))
            .extract()?;
        Ok(config)
    }
}
