//! Axum router for the Solana Pay transaction-request endpoint.
//!
//! `GET /api/checkout` answers with the merchant label and icon.
//! `POST /api/checkout?<product>=<qty>&reference=<key>` with body
//! `{ "account": "<buyer>" }` answers with a base64 unsigned transaction.
//! Malformed input is a 400 with `{ error }`; build failures are a 500 whose
//! body does not carry the cause.

pub mod error;
pub mod handlers;

use axum::Router;
use axum::routing::get;
use solpay::LedgerClient;
use solpay::checkout::LocalTransactionSource;
use solpay::recorder::IntentRecorder;
use std::sync::Arc;

pub use error::ApiError;

/// Route of the transaction-request endpoint.
pub const CHECKOUT_PATH: &str = "/api/checkout";

/// Pricing and building engine behind the endpoint.
pub type CheckoutEngine = LocalTransactionSource<Arc<dyn LedgerClient>, Arc<dyn IntentRecorder>>;

/// Merchant-facing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantInfo {
    /// Shop name shown by wallets.
    pub label: String,
    /// Absolute URL of the shop icon.
    pub icon: String,
    /// Message attached to every issued transaction.
    pub message: String,
}

/// State shared by the handlers.
pub struct CheckoutState {
    /// Prices selections and builds transactions.
    pub engine: CheckoutEngine,
    /// Merchant text.
    pub merchant: MerchantInfo,
}

impl std::fmt::Debug for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutState")
            .field("catalog", self.engine.catalog())
            .field("recipient", self.engine.builder().recipient())
            .field("merchant", &self.merchant)
            .finish_non_exhaustive()
    }
}

/// Shared handler state.
pub type SharedState = Arc<CheckoutState>;

/// Creates an Axum [`Router`] serving [`CHECKOUT_PATH`].
pub fn checkout_router(state: SharedState) -> Router {
    Router::new()
        .route(
            CHECKOUT_PATH,
            get(handlers::get_checkout).post(handlers::post_checkout),
        )
        .with_state(state)
}
