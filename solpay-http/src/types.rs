//! Wire bodies of the transaction-request endpoint.

use serde::{Deserialize, Serialize};
use solpay::SerializedTransaction;

/// Query key carrying the reference.
pub const REFERENCE_PARAM: &str = "reference";

/// `POST` body: the buyer account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Base58 buyer address. Missing is reported, not rejected by the parser.
    #[serde(default)]
    pub account: Option<String>,
}

/// `POST` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    /// Base64 unsigned transaction.
    pub transaction: SerializedTransaction,
    /// Text shown by the wallet.
    pub message: String,
}

/// `GET` reply: merchant metadata shown before the wallet asks for a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    /// Merchant name.
    pub label: String,
    /// Absolute URL of the merchant icon.
    pub icon: String,
}

/// Error body of every non-200 reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub error: String,
}
