#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for reference-tagged Solana payment requests.
//!
//! The merchant exposes a transaction-request endpoint; the buyer's side
//! calls it with a selection, a reference and its own address, and receives
//! an unsigned transaction encoded as base64.
//!
//! # Modules
//!
//! - [`link`] - `solana:` transaction-request links and endpoint URLs
//! - [`types`] - Request and response bodies
//! - [`server`] - Axum router for the endpoint (feature: `server`)
//! - [`client`] - Transaction source calling a remote endpoint (feature: `client`)
//!
//! # Feature Flags
//!
//! - `server` - Axum handlers
//! - `client` - reqwest-based [`solpay::checkout::TransactionSource`]
//! - `telemetry` - Enables tracing instrumentation

pub mod link;
pub mod types;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod server;
