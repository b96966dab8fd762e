//! Kalshi venue integration.
//!
//! This crate provides:
//! - RSA-PSS request signing for Kalshi API authentication
//! - Rate-limited REST client for orders, cancels, balances, and markets
//! - WebSocket adapter that reconstructs normalized order books from the
//!   `orderbook_delta` channel and publishes snapshot/delta events
//!
//! # Authentication
//!
//! Kalshi signs every request with RSA-PSS (SHA-256) over
//! `timestamp + method + path`, sent in `KALSHI-ACCESS-*` headers. The key
//! id and PEM path come from application configuration.
//!
//! # Streaming
//!
//! The WebSocket adapter subscribes once to all configured tickers. A
//! single sequence counter spans the whole subscription: the first message
//! must carry `seq = 1` and each subsequent message `seq = last + 1`. Any
//! gap closes the socket with code 4000, which forces a resubscribe and a
//! fresh snapshot per market.

pub mod auth;
pub mod client;
pub mod error;
pub mod types;
pub mod ws;

pub use auth::KalshiSigner;
pub use client::{KalshiClient, KalshiClientConfig, KALSHI_DEMO_URL, KALSHI_PROD_URL};
pub use error::{KalshiError, Result};
pub use types::{Action, Balance, Market, Order, OrderRequest, OrderType};
pub use ws::{KalshiWsClient, KalshiWsConfig, KALSHI_DEMO_WS_URL, KALSHI_PROD_WS_URL};
