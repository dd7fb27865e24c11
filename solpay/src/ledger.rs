//! Read-only ledger seam.
//!
//! Every component that talks to the ledger does so through [`LedgerClient`],
//! injected as a shared handle. Lookups distinguish the expected "nothing
//! settled yet" answer ([`LookupError::NotFound`]) from real failures so the
//! poller can stay quiet on the former and loud on the latter.

use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_client::rpc_request::RpcRequest;
use solana_commitment_config::CommitmentConfig;
use solana_message::Hash;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use serde_json::json;
use solana_transaction_status_client_types::{
    EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding,
};
use std::str::FromStr;
use std::sync::Arc;

use crate::intent::ValidityAnchor;
use crate::reference::Reference;

/// Page size of signature lookups.
const SIGNATURE_PAGE_LIMIT: usize = 1000;

/// The ledger could not serve a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Transport or RPC failure.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a lookup that found nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// Nothing matches yet. Expected steady state while polling.
    #[error("No matching transaction found")]
    NotFound,
    /// Network or RPC failure.
    #[error("Ledger transport error: {0}")]
    Transport(String),
    /// The ledger answered with something unreadable.
    #[error("Malformed ledger response: {0}")]
    Malformed(String),
}

impl LookupError {
    /// Returns `true` for the expected "not yet" signal.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    fn from_client(err: &ClientError) -> Self {
        match err.kind() {
            ClientErrorKind::SerdeJson(_) => Self::Malformed(err.to_string()),
            _ => Self::Transport(err.to_string()),
        }
    }
}

/// Read-only view of the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetches a fresh validity anchor at `finalized` commitment.
    async fn latest_anchor(&self) -> Result<ValidityAnchor, LedgerError>;

    /// Finds the oldest successful transaction that lists `reference`.
    async fn find_reference(&self, reference: &Reference) -> Result<Signature, LookupError>;

    /// Fetches a settled transaction by signature.
    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<VersionedTransaction, LookupError>;

    /// Returns `true` while the anchor blockhash is still accepted by the
    /// ledger.
    async fn is_anchor_valid(&self, blockhash: &Hash) -> Result<bool, LedgerError>;
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    async fn latest_anchor(&self) -> Result<ValidityAnchor, LedgerError> {
        (**self).latest_anchor().await
    }

    async fn find_reference(&self, reference: &Reference) -> Result<Signature, LookupError> {
        (**self).find_reference(reference).await
    }

    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<VersionedTransaction, LookupError> {
        (**self).fetch_transaction(signature).await
    }

    async fn is_anchor_valid(&self, blockhash: &Hash) -> Result<bool, LedgerError> {
        (**self).is_anchor_valid(blockhash).await
    }
}

/// [`LedgerClient`] over the nonblocking JSON-RPC client.
#[derive(Clone)]
pub struct RpcLedger {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("url", &self.client.url())
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}

impl RpcLedger {
    /// Wraps a shared RPC client. Lookups use `confirmed` commitment.
    #[must_use]
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self {
            client,
            commitment: CommitmentConfig::confirmed(),
        }
    }

    /// Connects to `url`.
    #[must_use]
    pub fn from_url(url: impl ToString) -> Self {
        Self::new(Arc::new(RpcClient::new(url.to_string())))
    }

    /// Overrides the commitment used for lookups.
    #[must_use]
    pub const fn with_commitment(mut self, commitment: CommitmentConfig) -> Self {
        self.commitment = commitment;
        self
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn latest_anchor(&self) -> Result<ValidityAnchor, LedgerError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(CommitmentConfig::finalized())
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        #[cfg(feature = "telemetry")]
        tracing::debug!(%blockhash, last_valid_block_height, "Fetched validity anchor");
        Ok(ValidityAnchor {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn find_reference(&self, reference: &Reference) -> Result<Signature, LookupError> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(SIGNATURE_PAGE_LIMIT),
            commitment: Some(self.commitment),
        };
        let statuses = self
            .client
            .get_signatures_for_address_with_config(reference.pubkey(), config)
            .await
            .map_err(|e| LookupError::from_client(&e))?;
        // Newest first; failed transactions never moved funds.
        let oldest = statuses
            .iter()
            .rev()
            .find(|status| status.err.is_none())
            .ok_or(LookupError::NotFound)?;
        Signature::from_str(&oldest.signature).map_err(|e| LookupError::Malformed(e.to_string()))
    }

    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<VersionedTransaction, LookupError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        // `null` means the ledger does not serve the transaction yet.
        let confirmed: Option<EncodedConfirmedTransactionWithStatusMeta> = self
            .client
            .send(
                RpcRequest::GetTransaction,
                json!([signature.to_string(), config]),
            )
            .await
            .map_err(|e| LookupError::from_client(&e))?;
        confirmed
            .ok_or(LookupError::NotFound)?
            .transaction
            .transaction
            .decode()
            .ok_or_else(|| LookupError::Malformed(format!("undecodable transaction {signature}")))
    }

    async fn is_anchor_valid(&self, blockhash: &Hash) -> Result<bool, LedgerError> {
        self.client
            .is_blockhash_valid(blockhash, CommitmentConfig::processed())
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))
    }
}
