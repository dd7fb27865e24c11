//! Error taxonomy.
//!
//! Each component owns a narrow error enum. [`CheckoutError`] aggregates them
//! and is the single type the checkout state machine turns into a user-visible
//! state.

use rust_decimal::Decimal;

use crate::checkout::InvalidTransition;
use crate::ledger::LedgerError;
use crate::recorder::RecordError;
use crate::submit::SubmitError;
use crate::transaction::EncodingError;
use crate::verify::VerificationError;

/// Malformed input. Reported immediately, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A selected product identifier is not in the catalog.
    #[error("Invalid selection: unknown product {0}")]
    InvalidSelection(String),
    /// A quantity could not be parsed as a non-negative integer.
    #[error("Invalid quantity {value:?} for product {id}")]
    InvalidQuantity {
        /// Product identifier.
        id: String,
        /// Raw value as received.
        value: String,
    },
    /// A catalog entry is unusable (negative price, duplicate id).
    #[error("Invalid product {0}")]
    InvalidProduct(String),
    /// The computed amount is exactly zero.
    #[error("Can't checkout with charge of 0")]
    ZeroAmount,
    /// The amount is negative.
    #[error("Amount must not be negative")]
    NegativeAmount,
    /// The amount does not fit the ledger's integer unit.
    #[error("Amount overflow")]
    AmountOverflow,
    /// The amount cannot be expressed exactly in base units.
    #[error("Amount {amount} is not representable with {decimals} decimals")]
    InexactAmount {
        /// Requested amount.
        amount: Decimal,
        /// Decimals of the asset.
        decimals: u8,
    },
    /// No reference was provided.
    #[error("No reference provided")]
    MissingReference,
    /// No buyer account was provided.
    #[error("No account provided")]
    MissingAccount,
    /// An address is not a valid base58 public key.
    #[error("Invalid address {0}")]
    InvalidAddress(String),
}

/// Any failure the checkout flow can surface.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    /// Malformed selection or request.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The ledger could not be reached.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Transaction bytes could not be encoded or decoded.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// The signing agent declined or failed.
    #[error(transparent)]
    Submit(#[from] SubmitError),
    /// The settled transaction does not match the intent.
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// The intent could not be recorded.
    #[error(transparent)]
    Record(#[from] RecordError),
    /// The transaction source returned something the buyer must not sign.
    #[error("Untrusted transaction: {0}")]
    UntrustedTransaction(String),
    /// The remote transaction source failed.
    #[error("Transaction source error: {0}")]
    Source(String),
    /// The confirmation poller stopped without an outcome.
    #[error("Confirmation poller stopped: {0}")]
    Poller(String),
    /// An event does not apply to the current state.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl CheckoutError {
    /// Returns `true` if the error is the recoverable stale-anchor signal.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Submit(SubmitError::StaleTransaction))
    }

    /// Returns `true` if the error stems from caller input rather than the
    /// environment.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Record(RecordError::ReferenceReused(_))
        )
    }
}
