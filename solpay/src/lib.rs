#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for reference-tagged Solana payment requests.
//!
//! A merchant builds an *unsigned* transfer transaction on the server, tags the
//! transfer instruction with a freshly generated [`Reference`] key, and hands
//! the transaction to the buyer's wallet. Anyone holding the reference can
//! later find the settled transaction on the ledger without knowing its
//! signature in advance.
//!
//! # Flow
//!
//! ```text
//! selection ─► Catalog::total ─► TransactionBuilder::build ─► encode
//!        ─► wallet sign + send ─► ConfirmationPoller ─► Confirmed
//! ```
//!
//! The [`checkout::Checkout`] driver runs the whole flow as an explicit state
//! machine.
//!
//! # Modules
//!
//! - [`address`] - Base58 account addresses
//! - [`asset`] - Native SOL and SPL token assets, exact base-unit conversion
//! - [`builder`] - Server-side unsigned transaction builder
//! - [`catalog`] - Product table and price calculator
//! - [`checkout`] - Checkout state machine and driver
//! - [`encoding`] - Base64 helpers for the transport boundary
//! - [`error`] - Error taxonomy shared by every component
//! - [`intent`] - Payment intents and validity anchors
//! - [`ledger`] - Read-only ledger seam and its RPC implementation
//! - [`poller`] - Cancellable confirmation poller
//! - [`recorder`] - Intent recording extension point
//! - [`reference`] - Reference key generation
//! - [`submit`] - Signing agent seam and transaction submitter
//! - [`transaction`] - Unsigned transaction wrapper and codec
//! - [`verify`] - Settled transfer verification
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod address;
pub mod asset;
pub mod builder;
pub mod catalog;
pub mod checkout;
pub mod encoding;
pub mod error;
pub mod intent;
pub mod ledger;
pub mod poller;
pub mod recorder;
pub mod reference;
pub mod submit;
pub mod transaction;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use address::Address;
pub use asset::PaymentAsset;
pub use builder::{BuiltTransaction, TransactionBuilder, TransferRequest};
pub use catalog::{Catalog, Product, Selection};
pub use error::{CheckoutError, ValidationError};
pub use intent::{PaymentIntent, ValidityAnchor};
pub use ledger::LedgerClient;
pub use reference::Reference;
pub use transaction::{SerializedTransaction, UnsignedTransaction};
