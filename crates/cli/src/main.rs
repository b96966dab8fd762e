//! Command-line entry point for the cross-venue arbitrage engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use cross_arb_core::config::{AppConfig, ConfigLoader, Environment};
use cross_arb_core::{EventBus, ShutdownSignal};
use cross_arb_engine::{
    LiveBalanceOracle, LiveTradeGateway, MarketStateManager, Orchestrator, OrchestratorConfig,
    RestTradeSink, StorageSettings, TradeStorage,
};
use cross_arb_engine::balances::BalanceOracle;
use cross_arb_kalshi::{
    KalshiClient, KalshiClientConfig, KalshiSigner, KalshiWsClient, KalshiWsConfig,
};
use cross_arb_polymarket::{
    L2Credentials, PolymarketClient, PolymarketClientConfig, PolymarketWsClient,
    PolymarketWsConfig,
};

#[derive(Parser)]
#[command(name = "cross-arb")]
#[command(about = "Cross-venue arbitrage engine for binary prediction markets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live trading loop
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Force dry-run mode regardless of configuration
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch and print venue balances, then exit
    CheckBalances {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, dry_run } => run_trading(&config, dry_run).await,
        Commands::CheckBalances { config } => check_balances(&config).await,
    }
}

async fn run_trading(config_path: &str, dry_run_override: bool) -> Result<()> {
    let mut config = ConfigLoader::load(config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    if dry_run_override {
        config.dry_run = true;
    }
    if config.dry_run {
        warn!("Dry-run mode: no real orders will be placed");
    }

    let bus = Arc::new(EventBus::new());
    let manager = Arc::new(MarketStateManager::new(Arc::clone(&bus)));
    let (kalshi_client, kalshi_ws) = build_kalshi(&config)?;
    let (poly_client, poly_ws) = build_polymarket(&config)?;

    let sink = Arc::new(
        RestTradeSink::new(&config.storage.endpoint, &config.storage.api_key)
            .context("building trade sink")?,
    );
    let storage = Arc::new(TradeStorage::new(
        sink,
        StorageSettings {
            batch_size: config.storage.batch_size,
            flush_interval: Duration::from_secs(config.storage.flush_interval_secs),
            max_buffer_len: config.storage.max_buffer_len,
            dry_run: config.dry_run,
        },
    ));

    let gateway = Arc::new(LiveTradeGateway::new(
        Arc::clone(&kalshi_client),
        Arc::clone(&poly_client),
    ));
    let oracle = Arc::new(LiveBalanceOracle::new(
        Arc::clone(&kalshi_client),
        Arc::clone(&poly_client),
    ));

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; shutting down");
                shutdown.trigger();
            }
        });
    }

    let orchestrator = Arc::new(Orchestrator::new(
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
        OrchestratorConfig {
            cool_down: Duration::from_secs(config.trading.cool_down_seconds),
            dry_run: config.dry_run,
            trading: config.trading.clone(),
        },
        config.markets.clone(),
    ));

    info!(markets = config.markets.len(), "Starting live trading service");
    orchestrator.run().await
}

async fn check_balances(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load(config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    let (kalshi_client, _) = build_kalshi(&config)?;
    let (poly_client, _) = build_polymarket(&config)?;

    let oracle = LiveBalanceOracle::new(kalshi_client, poly_client);
    let balances = oracle.get_venue_balances().await?;
    println!("Kalshi USD:        {}", balances.usd);
    println!("Polymarket USDC.e: {}", balances.usdc_e);
    println!("Polygon POL:       {}", balances.pol);
    Ok(())
}

fn build_kalshi(config: &AppConfig) -> Result<(Arc<KalshiClient>, Arc<KalshiWsClient>)> {
    let signer = Arc::new(
        KalshiSigner::from_pem_file(&config.kalshi.api_key_id, &config.kalshi.private_key_path)
            .context("loading Kalshi signing key")?,
    );

    let mut client_config = match config.environment {
        Environment::Demo => KalshiClientConfig::demo(),
        Environment::Prod => KalshiClientConfig::default(),
    };
    if let Some(url) = &config.kalshi.api_base_url {
        client_config = client_config.with_base_url(url);
    }
    let client = Arc::new(KalshiClient::new(client_config, Arc::clone(&signer))?);

    let mut ws_config = match config.environment {
        Environment::Demo => KalshiWsConfig::demo(),
        Environment::Prod => KalshiWsConfig::default(),
    };
    if let Some(url) = &config.kalshi.ws_url {
        ws_config = ws_config.with_ws_url(url);
    }
    let ws = Arc::new(KalshiWsClient::new(ws_config).with_signer(signer));

    Ok((client, ws))
}

fn build_polymarket(config: &AppConfig) -> Result<(Arc<PolymarketClient>, Arc<PolymarketWsClient>)> {
    let mut client_config = PolymarketClientConfig::default();
    if let Some(url) = &config.polymarket.clob_base_url {
        client_config.clob_base_url = url.clone();
    }
    if let Some(url) = &config.polymarket.gamma_base_url {
        client_config.gamma_base_url = url.clone();
    }
    client_config.polygon_rpc_url = config.polymarket.polygon_rpc_url.clone();

    let credentials = L2Credentials::new(
        &config.polymarket.api_key,
        &config.polymarket.api_secret,
        &config.polymarket.api_passphrase,
        &config.polymarket.wallet_address,
    );
    let client = Arc::new(PolymarketClient::new(client_config, Some(credentials))?);

    let mut ws_config = PolymarketWsConfig::default();
    if let Some(url) = &config.polymarket.ws_url {
        ws_config = ws_config.with_ws_url(url);
    }
    let ws = Arc::new(PolymarketWsClient::new(ws_config));

    Ok((client, ws))
}
