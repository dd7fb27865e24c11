//! Signing agent seam and transaction submitter.
//!
//! The signing agent is the buyer's wallet. It may decline, it may find the
//! anchor expired, or it may sign and broadcast. Broadcasting does not mean
//! settled; settlement is observed by [`crate::poller`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_response::TransactionError;
use solana_keypair::Keypair;
use solana_signature::Signature;
use solana_signer::Signer;
use std::sync::Arc;

use crate::address::Address;
use crate::ledger::LedgerClient;
use crate::transaction::UnsignedTransaction;

/// Why a submission did not produce a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The user declined to sign. Not retried.
    #[error("Transaction rejected by user")]
    UserRejected,
    /// The validity anchor expired. Recover by rebuilding.
    #[error("Transaction anchor expired")]
    StaleTransaction,
    /// No signing agent could be reached.
    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),
    /// Signing or broadcasting failed.
    #[error("Broadcast failed: {0}")]
    Broadcast(String),
}

/// Proof that the agent handed the transaction to the network.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastHandle {
    /// Transaction id.
    #[serde_as(as = "DisplayFromStr")]
    pub signature: Signature,
}

/// The buyer's wallet.
#[async_trait]
pub trait SigningAgent: Send + Sync {
    /// Connects and returns the buyer address.
    async fn connect(&self) -> Result<Address, SubmitError>;

    /// Signs `transaction` and broadcasts it.
    async fn sign_and_send(
        &self,
        transaction: &UnsignedTransaction,
    ) -> Result<BroadcastHandle, SubmitError>;
}

#[async_trait]
impl<T: SigningAgent + ?Sized> SigningAgent for Arc<T> {
    async fn connect(&self) -> Result<Address, SubmitError> {
        (**self).connect().await
    }

    async fn sign_and_send(
        &self,
        transaction: &UnsignedTransaction,
    ) -> Result<BroadcastHandle, SubmitError> {
        (**self).sign_and_send(transaction).await
    }
}

/// Hands transactions to a signing agent, refusing stale ones up front.
#[derive(Debug, Clone)]
pub struct TransactionSubmitter<L, A> {
    ledger: L,
    agent: A,
    check_anchor: bool,
}

impl<L, A> TransactionSubmitter<L, A> {
    /// Creates a submitter that checks the anchor before asking the agent.
    pub const fn new(ledger: L, agent: A) -> Self {
        Self {
            ledger,
            agent,
            check_anchor: true,
        }
    }

    /// Enables or disables the anchor pre-check.
    #[must_use]
    pub const fn with_anchor_check(mut self, enabled: bool) -> Self {
        self.check_anchor = enabled;
        self
    }

    /// The wrapped agent.
    pub const fn agent(&self) -> &A {
        &self.agent
    }
}

impl<L: LedgerClient, A: SigningAgent> TransactionSubmitter<L, A> {
    /// Asks the agent to sign and broadcast `transaction`.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::StaleTransaction`] if the anchor is known to be
    ///   expired, or the agent reports so
    /// - [`SubmitError::UserRejected`] if the user declines
    /// - [`SubmitError::Broadcast`] on any other agent failure
    pub async fn submit(
        &self,
        transaction: &UnsignedTransaction,
    ) -> Result<BroadcastHandle, SubmitError> {
        if self.check_anchor {
            match self
                .ledger
                .is_anchor_valid(&transaction.anchor_blockhash())
                .await
            {
                Ok(false) => return Err(SubmitError::StaleTransaction),
                Ok(true) => {}
                // The agent gets the final word when the ledger cannot answer.
                #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
                Err(e) => {
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(error = %e, "Anchor pre-check failed");
                }
            }
        }
        let handle = self.agent.sign_and_send(transaction).await?;
        #[cfg(feature = "telemetry")]
        tracing::info!(signature = %handle.signature, "Transaction broadcast");
        Ok(handle)
    }
}

/// Approval prompt shown before signing. Returning `false` declines.
pub type Approval = Arc<dyn Fn(&UnsignedTransaction) -> bool + Send + Sync>;

/// A [`SigningAgent`] holding a local key pair and broadcasting over RPC.
#[derive(Clone)]
pub struct KeypairWallet {
    keypair: Arc<Keypair>,
    client: Arc<RpcClient>,
    approval: Option<Approval>,
}

impl std::fmt::Debug for KeypairWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairWallet")
            .field("pubkey", &self.keypair.pubkey())
            .finish_non_exhaustive()
    }
}

impl KeypairWallet {
    /// Creates a wallet that signs without asking.
    #[must_use]
    pub const fn new(keypair: Arc<Keypair>, client: Arc<RpcClient>) -> Self {
        Self {
            keypair,
            client,
            approval: None,
        }
    }

    /// Installs an approval prompt.
    #[must_use]
    pub fn with_approval(mut self, approval: Approval) -> Self {
        self.approval = Some(approval);
        self
    }

    /// Wallet address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.keypair.pubkey().into()
    }
}

#[async_trait]
impl SigningAgent for KeypairWallet {
    async fn connect(&self) -> Result<Address, SubmitError> {
        Ok(self.address())
    }

    async fn sign_and_send(
        &self,
        transaction: &UnsignedTransaction,
    ) -> Result<BroadcastHandle, SubmitError> {
        if let Some(approval) = &self.approval
            && !approval(transaction)
        {
            return Err(SubmitError::UserRejected);
        }
        let signed = transaction
            .clone()
            .sign_with(self.keypair.as_ref())
            .map_err(|e| SubmitError::Broadcast(e.to_string()))?;
        let signature = self
            .client
            .send_transaction(signed.inner())
            .await
            .map_err(|e| {
                if e.get_transaction_error() == Some(TransactionError::BlockhashNotFound) {
                    SubmitError::StaleTransaction
                } else {
                    SubmitError::Broadcast(e.to_string())
                }
            })?;
        Ok(BroadcastHandle { signature })
    }
}
