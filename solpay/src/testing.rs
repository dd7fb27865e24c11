//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use solana_keypair::Keypair;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::address::Address;
use crate::asset::PaymentAsset;
use crate::builder::{
    compile, native_transfer_instruction, token_transfer_instruction, with_reference,
};
use crate::intent::{PaymentIntent, ValidityAnchor};
use crate::ledger::{LedgerClient, LedgerError, LookupError};
use crate::reference::Reference;
use crate::submit::{BroadcastHandle, SigningAgent, SubmitError};
use crate::transaction::{UnsignedTransaction, message_mentions};

pub(crate) fn blockhash(seed: u64) -> Hash {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes[31] = 0xAB;
    Hash::new_from_array(bytes)
}

pub(crate) fn anchor(seed: u8) -> ValidityAnchor {
    ValidityAnchor {
        blockhash: blockhash(u64::from(seed)),
        last_valid_block_height: u64::from(seed),
    }
}

pub(crate) fn native_transfer(
    buyer: Pubkey,
    shop: Pubkey,
    lamports: u64,
    reference: Reference,
) -> UnsignedTransaction {
    let ix = with_reference(native_transfer_instruction(&buyer, &shop, lamports), &reference);
    compile(&buyer, &ix, &anchor(1).blockhash)
}

pub(crate) fn token_transfer(
    buyer: Pubkey,
    shop: Pubkey,
    mint: Pubkey,
    decimals: u8,
    amount: u64,
    reference: Reference,
) -> UnsignedTransaction {
    let ix = token_transfer_instruction(&buyer, &shop, &mint, amount, decimals).unwrap();
    compile(&buyer, &with_reference(ix, &reference), &anchor(1).blockhash)
}

pub(crate) fn intent(asset: PaymentAsset, base_units: u64) -> PaymentIntent {
    PaymentIntent {
        amount: asset.from_base_units(base_units).unwrap(),
        base_units,
        asset,
        recipient: Keypair::new().pubkey().into(),
        reference: Reference::generate(),
        fee_payer: Keypair::new().pubkey().into(),
        anchor: anchor(1),
    }
}

pub(crate) fn signature(seed: usize) -> Signature {
    let mut bytes = [0u8; 64];
    bytes[..8].copy_from_slice(&(seed as u64).to_le_bytes());
    bytes[63] = 0xCD;
    Signature::from(bytes)
}

/// In-memory ledger with call counters.
///
/// Anchors are numbered from 1 in fetch order. Settled transactions are kept
/// by signature and found through any account they mention.
#[derive(Debug, Default)]
pub(crate) struct MockLedger {
    anchor_calls: AtomicUsize,
    find_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    anchor_failure: bool,
    expired_anchors: u64,
    not_found_polls: usize,
    transport_errors: bool,
    panicking_lookups: bool,
    forced_match: Option<Signature>,
    settled: Mutex<Vec<(Signature, VersionedTransaction)>>,
}

impl MockLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every anchor fetch fails.
    pub(crate) fn with_anchor_failure(mut self) -> Self {
        self.anchor_failure = true;
        self
    }

    /// Every anchor is reported expired.
    pub(crate) fn with_anchor_expired(mut self) -> Self {
        self.expired_anchors = u64::MAX;
        self
    }

    /// The first `n` anchors handed out are reported expired.
    pub(crate) fn with_expired_anchors(mut self, n: u64) -> Self {
        self.expired_anchors = n;
        self
    }

    /// `find_reference` answers `NotFound` for the first `n` calls.
    pub(crate) fn with_not_found_polls(mut self, n: usize) -> Self {
        self.not_found_polls = n;
        self
    }

    /// `find_reference` always fails with a transport error.
    pub(crate) fn with_transport_errors(mut self) -> Self {
        self.transport_errors = true;
        self
    }

    /// `find_reference` panics.
    pub(crate) fn with_panicking_lookups(mut self) -> Self {
        self.panicking_lookups = true;
        self
    }

    /// `find_reference` matches `signature` once past the `NotFound` polls.
    pub(crate) fn with_match(mut self, signature: Signature) -> Self {
        self.forced_match = Some(signature);
        self
    }

    /// Records a transaction as settled.
    pub(crate) fn settle(&self, signature: Signature, transaction: VersionedTransaction) {
        self.settled.lock().unwrap().push((signature, transaction));
    }

    pub(crate) fn anchor_calls(&self) -> usize {
        self.anchor_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn latest_anchor(&self) -> Result<ValidityAnchor, LedgerError> {
        let n = self.anchor_calls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        if self.anchor_failure {
            return Err(LedgerError::Unavailable("connection refused".into()));
        }
        Ok(ValidityAnchor {
            blockhash: blockhash(n),
            last_valid_block_height: 1_000 + n,
        })
    }

    async fn find_reference(&self, reference: &Reference) -> Result<Signature, LookupError> {
        let n = self.find_calls.fetch_add(1, Ordering::SeqCst) + 1;
        assert!(!self.panicking_lookups, "ledger lookup panicked");
        if self.transport_errors {
            return Err(LookupError::Transport("timed out".into()));
        }
        if n <= self.not_found_polls {
            return Err(LookupError::NotFound);
        }
        if let Some(signature) = self.forced_match {
            return Ok(signature);
        }
        self.settled
            .lock()
            .unwrap()
            .iter()
            .find(|(_, tx)| message_mentions(&tx.message, reference.pubkey()))
            .map(|(signature, _)| *signature)
            .ok_or(LookupError::NotFound)
    }

    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<VersionedTransaction, LookupError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.settled
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| s == signature)
            .map(|(_, tx)| tx.clone())
            .ok_or(LookupError::NotFound)
    }

    async fn is_anchor_valid(&self, blockhash: &Hash) -> Result<bool, LedgerError> {
        let bytes = blockhash.to_bytes();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&bytes[..8]);
        Ok(u64::from_le_bytes(seed) > self.expired_anchors)
    }
}

/// Scripted wallet.
#[derive(Debug)]
pub(crate) struct MockAgent {
    buyer: Keypair,
    connect_calls: AtomicUsize,
    sign_calls: AtomicUsize,
    reject: bool,
    unavailable: bool,
    stale_answers: AtomicUsize,
    ledger: Option<Arc<MockLedger>>,
    signed: Mutex<Vec<UnsignedTransaction>>,
}

impl MockAgent {
    pub(crate) fn new() -> Self {
        Self {
            buyer: Keypair::new(),
            connect_calls: AtomicUsize::new(0),
            sign_calls: AtomicUsize::new(0),
            reject: false,
            unavailable: false,
            stale_answers: AtomicUsize::new(0),
            ledger: None,
            signed: Mutex::new(Vec::new()),
        }
    }

    /// Declines every signature request.
    pub(crate) fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    /// Fails to connect.
    pub(crate) fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Answers `StaleTransaction` to the first `n` requests.
    pub(crate) fn stale_for(self, n: usize) -> Self {
        self.stale_answers.store(n, Ordering::SeqCst);
        self
    }

    /// Broadcast transactions settle immediately on `ledger`.
    pub(crate) fn settling_on(mut self, ledger: Arc<MockLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub(crate) fn buyer(&self) -> Address {
        self.buyer.pubkey().into()
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    /// Transactions the agent was asked to sign, in order.
    pub(crate) fn signed(&self) -> Vec<UnsignedTransaction> {
        self.signed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SigningAgent for MockAgent {
    async fn connect(&self) -> Result<Address, SubmitError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(SubmitError::WalletUnavailable("no wallet installed".into()));
        }
        Ok(self.buyer())
    }

    async fn sign_and_send(
        &self,
        transaction: &UnsignedTransaction,
    ) -> Result<BroadcastHandle, SubmitError> {
        let n = self.sign_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.signed.lock().unwrap().push(transaction.clone());
        if self.reject {
            return Err(SubmitError::UserRejected);
        }
        let stale = self
            .stale_answers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if stale {
            return Err(SubmitError::StaleTransaction);
        }
        let signature = signature(n);
        if let Some(ledger) = &self.ledger {
            let mut settled = transaction.inner().clone();
            if let Some(slot) = settled.signatures.first_mut() {
                *slot = signature;
            }
            ledger.settle(signature, settled);
        }
        Ok(BroadcastHandle { signature })
    }
}
