//! Checkout states, events and the transition function.

use serde::{Deserialize, Serialize};
use solana_signature::Signature;
use std::fmt;

use crate::address::Address;

/// Where a checkout attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// Nothing started.
    #[default]
    Idle,
    /// Waiting for a signing agent.
    AwaitingWallet,
    /// Fetching an unsigned transaction.
    BuildingTransaction,
    /// Waiting for the buyer to sign.
    AwaitingSignature,
    /// Handed to the network, poller not yet running.
    Broadcasting,
    /// Watching the ledger for the reference.
    Polling,
    /// Settled and verified.
    Confirmed,
    /// Stopped on an error; see the session's last error.
    Failed,
    /// The poll budget ran out.
    Expired,
    /// Abandoned by the caller.
    Cancelled,
}

impl CheckoutStatus {
    /// Returns `true` for states no event except `Reset` leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Failed | Self::Expired | Self::Cancelled
        )
    }

    /// Applies `event`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if `event` does not apply in this state.
    pub const fn next(self, event: &CheckoutEvent) -> Result<Self, InvalidTransition> {
        use CheckoutEvent as E;
        let next = match (self, event) {
            (Self::Idle, E::Begin) => Self::AwaitingWallet,
            (Self::AwaitingWallet, E::WalletConnected(_)) => Self::BuildingTransaction,
            (Self::BuildingTransaction, E::TransactionBuilt) => Self::AwaitingSignature,
            (Self::AwaitingSignature, E::Submitted(_)) => Self::Broadcasting,
            (Self::AwaitingSignature, E::AnchorExpired) => Self::BuildingTransaction,
            (Self::Broadcasting, E::BroadcastAccepted) => Self::Polling,
            (Self::Polling, E::Settled(_)) => Self::Confirmed,
            (Self::Polling, E::PollExpired) => Self::Expired,
            (Self::AwaitingWallet, E::WalletUnavailable)
            | (Self::BuildingTransaction, E::BuildFailed)
            | (Self::AwaitingSignature, E::SubmissionFailed)
            | (Self::Polling, E::VerificationFailed) => Self::Failed,
            (from, E::Cancel) if !from.is_terminal() => Self::Cancelled,
            (Self::Failed | Self::Expired | Self::Cancelled, E::Reset) => Self::Idle,
            (from, event) => {
                return Err(InvalidTransition {
                    from,
                    event: event.name(),
                });
            }
        };
        Ok(next)
    }

    /// Snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingWallet => "awaiting_wallet",
            Self::BuildingTransaction => "building_transaction",
            Self::AwaitingSignature => "awaiting_signature",
            Self::Broadcasting => "broadcasting",
            Self::Polling => "polling",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutEvent {
    /// The caller started the checkout.
    Begin,
    /// A signing agent answered with the buyer address.
    WalletConnected(Address),
    /// No signing agent is available.
    WalletUnavailable,
    /// An unsigned transaction was obtained and accepted.
    TransactionBuilt,
    /// No acceptable transaction could be obtained.
    BuildFailed,
    /// The agent broadcast the transaction.
    Submitted(Signature),
    /// The agent declined or failed.
    SubmissionFailed,
    /// The anchor expired before the transaction was sent.
    AnchorExpired,
    /// The poller is running.
    BroadcastAccepted,
    /// The poller found the settled transaction.
    Settled(Signature),
    /// The poller ran out of budget.
    PollExpired,
    /// The settled transaction does not match the intent.
    VerificationFailed,
    /// The caller abandoned the checkout.
    Cancel,
    /// The caller wants to start over.
    Reset,
}

impl CheckoutEvent {
    /// Event name for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::WalletConnected(_) => "wallet_connected",
            Self::WalletUnavailable => "wallet_unavailable",
            Self::TransactionBuilt => "transaction_built",
            Self::BuildFailed => "build_failed",
            Self::Submitted(_) => "submitted",
            Self::SubmissionFailed => "submission_failed",
            Self::AnchorExpired => "anchor_expired",
            Self::BroadcastAccepted => "broadcast_accepted",
            Self::Settled(_) => "settled",
            Self::PollExpired => "poll_expired",
            Self::VerificationFailed => "verification_failed",
            Self::Cancel => "cancel",
            Self::Reset => "reset",
        }
    }
}

/// An event that does not apply in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid transition: {event} in state {from}")]
pub struct InvalidTransition {
    /// State the event arrived in.
    pub from: CheckoutStatus,
    /// Name of the rejected event.
    pub event: &'static str,
}
