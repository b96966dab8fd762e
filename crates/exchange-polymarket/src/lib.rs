//! Polymarket CLOB integration.
//!
//! This crate provides:
//! - REST client for FOK order placement, emulated market orders, market
//!   lookup, and balance queries, authenticated with L2 HMAC headers
//! - WebSocket adapter for the `/market` channel that publishes normalized
//!   snapshot/delta events keyed by asset id
//!
//! Polymarket trades YES and NO as separate instruments, so each market
//! pair subscribes two asset ids and maintains two books. Prices and sizes
//! arrive as decimal strings (including the venue's bare `".48"` form).

pub mod client;
pub mod error;
pub mod types;
pub mod ws;

pub use client::{PolymarketClient, PolymarketClientConfig, L2Credentials};
pub use error::{PolymarketError, Result};
pub use types::{GammaMarket, OrderPayload, OrderResponse, OrderType};
pub use ws::{PolymarketWsClient, PolymarketWsConfig, POLYMARKET_WS_URL};
