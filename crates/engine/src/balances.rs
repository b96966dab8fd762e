//! Startup balance oracle.
//!
//! Wraps both venues' balance surfaces behind one trait. Startup fails
//! fast when any balance is missing or zero, since the sizer would only
//! ever produce zero-size trades.

use std::sync::Arc;

use anyhow::{ensure, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;

use cross_arb_core::types::{Currency, ExchangeWallet, Wallets};
use cross_arb_kalshi::KalshiClient;
use cross_arb_polymarket::PolymarketClient;

/// Balances for every currency the engine tracks, in natural units.
#[derive(Debug, Clone, Copy)]
pub struct VenueBalances {
    /// Kalshi account dollars.
    pub usd: Decimal,
    /// Polymarket collateral tokens.
    pub usdc_e: Decimal,
    /// Polygon gas tokens.
    pub pol: Decimal,
}

impl VenueBalances {
    /// Validates that every balance is positive.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first empty balance.
    pub fn ensure_funded(&self) -> Result<()> {
        ensure!(self.usd > Decimal::ZERO, "Kalshi USD balance must be greater than zero");
        ensure!(
            self.usdc_e > Decimal::ZERO,
            "Polymarket USDC.e balance must be greater than zero"
        );
        ensure!(self.pol > Decimal::ZERO, "POL balance must be greater than zero");
        Ok(())
    }

    /// Builds the wallet snapshot handed to the detector.
    #[must_use]
    pub fn into_wallets(self) -> Wallets {
        Wallets {
            kalshi: ExchangeWallet::new().with_balance(Currency::Usd, self.usd),
            polymarket: ExchangeWallet::new()
                .with_balance(Currency::UsdcE, self.usdc_e)
                .with_balance(Currency::Pol, self.pol),
        }
    }
}

/// Source of venue balances.
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    async fn get_venue_balances(&self) -> Result<VenueBalances>;
}

/// Oracle backed by the two venue clients.
pub struct LiveBalanceOracle {
    kalshi: Arc<KalshiClient>,
    polymarket: Arc<PolymarketClient>,
}

impl LiveBalanceOracle {
    #[must_use]
    pub fn new(kalshi: Arc<KalshiClient>, polymarket: Arc<PolymarketClient>) -> Self {
        Self { kalshi, polymarket }
    }
}

#[async_trait]
impl BalanceOracle for LiveBalanceOracle {
    async fn get_venue_balances(&self) -> Result<VenueBalances> {
        let kalshi_balance = self.kalshi.get_balance().await?;
        let (usdc_e, pol) = self.polymarket.get_starting_balances().await?;
        let balances = VenueBalances {
            usd: kalshi_balance.dollars().floor(),
            usdc_e: usdc_e.floor(),
            pol,
        };
        balances.ensure_funded()?;
        Ok(balances)
    }
}
