//! Cross-venue arbitrage engine.
//!
//! Owns everything between the venue adapters and the outside world:
//!
//! - [`book`]: sorted bid/ask ladders with O(log n) updates
//! - [`state`]: per-market book ownership and top-of-book change detection
//! - [`fees`]: the Kalshi taker fee model
//! - [`detector`]: buy-both opportunity detection with the
//!   one-in-flight-trade lock
//! - [`sizing`]: the sqrt/wallet/spend-guard trade sizer
//! - [`gateway`]: the order-placement seam over both venue clients
//! - [`executor`]: concurrent two-leg execution and outcome classification
//! - [`unwinder`]: market-order unwind of a stranded leg
//! - [`storage`]: batched persistence of trade attempts
//! - [`balances`]: the startup balance oracle
//! - [`orchestrator`]: market discovery, wiring, soft-reset, and shutdown
//!
//! When the same binary event is priced differently across the two venues,
//! buying YES on one and NO on the other for a combined cost below $1
//! locks in the difference at resolution. The engine reacts to top-of-book
//! changes, holds at most one trade in flight, and soft-resets ingestion
//! after every completed round.

pub mod balances;
pub mod book;
pub mod detector;
pub mod executor;
pub mod fees;
pub mod gateway;
pub mod orchestrator;
pub mod sizing;
pub mod state;
pub mod storage;
pub mod unwinder;

pub use balances::{BalanceOracle, LiveBalanceOracle, VenueBalances};
pub use book::{BookSnapshot, PriceBook};
pub use detector::{ArbitrageDetector, DetectorConfig};
pub use executor::{ExecutorConfig, TradeExecutor};
pub use fees::kalshi_fee;
pub use gateway::{LiveTradeGateway, TradeGateway};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use sizing::{trade_size, SizingConfig};
pub use state::{MarketOutcomes, MarketState, MarketStateManager};
pub use storage::{InsertResponse, RestTradeSink, StorageSettings, TradeAttemptRecord, TradeSink, TradeStorage};
pub use unwinder::Unwinder;
