//! Core types, events, and message bus for the cross-venue arbitrage engine.
//!
//! This crate holds everything the exchange adapters and the trading engine
//! share: the canonical domain vocabulary ([`types`]), the event set that
//! flows over the bus ([`events`]), the single-consumer message bus itself
//! ([`bus`]), application configuration ([`config`]), and the cooperative
//! shutdown signal ([`shutdown`]).

pub mod bus;
pub mod config;
pub mod events;
pub mod shutdown;
pub mod types;

pub use bus::{EventBus, EventHandler};
pub use config::{AppConfig, ConfigLoader, Environment};
pub use events::{
    ArbTradeResult, BookUpdate, Event, EventKind, ExecuteTrade, OpportunityFound, OrderBookDelta,
    OrderBookSnapshot, StoreTradeResults, TradeFailed,
};
pub use shutdown::ShutdownSignal;
pub use types::{
    ArbitrageOpportunity, Currency, ExchangeWallet, KalshiOrder, KalshiSide, MarketPairConfig,
    Money, Outcome, Platform, PolySide, PolymarketOrder, PriceLevel, Side, TradeDetails, Wallets,
};
