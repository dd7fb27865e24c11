//! The checkout driver.
//!
//! [`Checkout`] owns one attempt at a time. Each [`Checkout::step`] performs
//! the side effect of the current state, turns its result into a
//! [`CheckoutEvent`] and applies it. Every await inside a step races the
//! session's cancellation token.

use solana_signature::Signature;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::source::{Order, TransactionSource};
use super::state::{CheckoutEvent, CheckoutStatus, InvalidTransition};
use crate::address::Address;
use crate::catalog::Selection;
use crate::error::CheckoutError;
use crate::ledger::LedgerClient;
use crate::poller::{
    ConfirmationPoller, PollError, PollEvent, PollHandle, PollOutcome, PollerConfig,
};
use crate::reference::Reference;
use crate::submit::{SigningAgent, SubmitError, TransactionSubmitter};
use crate::transaction::UnsignedTransaction;
use crate::verify::ExpectedTransfer;

/// Driver settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Stale-anchor rebuilds allowed before the attempt fails.
    pub max_rebuilds: u32,
    /// Check the settled transfer against the transaction the buyer signed.
    pub verify_transfer: bool,
    /// Ask the ledger whether the anchor is still valid before signing.
    pub check_anchor: bool,
    /// Confirmation polling.
    pub poller: PollerConfig,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            max_rebuilds: 3,
            verify_transfer: true,
            check_anchor: true,
            poller: PollerConfig::default(),
        }
    }
}

/// State of one checkout attempt.
#[derive(Debug, Default)]
pub struct CheckoutSession {
    /// 1-based attempt number; bumped by reset.
    pub attempt: u32,
    /// Current state.
    pub status: CheckoutStatus,
    /// Buyer address once a wallet connected.
    pub buyer: Option<Address>,
    /// Reference of the transaction in flight.
    pub reference: Option<Reference>,
    /// Transfer the buyer was asked to sign.
    pub intent: Option<ExpectedTransfer>,
    /// Transaction the buyer was asked to sign.
    pub transaction: Option<UnsignedTransaction>,
    /// Broadcast signature, replaced by the settled one on confirmation.
    pub signature: Option<Signature>,
    /// Error that moved the attempt to `Failed`.
    pub last_error: Option<CheckoutError>,
    /// Stale-anchor rebuilds so far.
    pub rebuilds: u32,
    /// Query failures reported by the poller, in order.
    pub poll_errors: Vec<PollError>,
}

impl CheckoutSession {
    fn new(attempt: u32) -> Self {
        Self {
            attempt,
            ..Self::default()
        }
    }

    fn discard_transaction(&mut self) {
        self.reference = None;
        self.intent = None;
        self.transaction = None;
    }
}

/// Runs a selection through connect, build, sign, broadcast and confirm.
pub struct Checkout<L, A, S> {
    source: S,
    submitter: TransactionSubmitter<L, A>,
    poller: ConfirmationPoller<L>,
    selection: Selection,
    config: CheckoutConfig,
    session: CheckoutSession,
    poll: Option<PollHandle>,
    cancel: CancellationToken,
    status: watch::Sender<CheckoutStatus>,
    poll_error: watch::Sender<Option<PollError>>,
}

impl<L, A, S> std::fmt::Debug for Checkout<L, A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkout")
            .field("selection", &self.selection)
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<L, A, S> Checkout<L, A, S>
where
    L: LedgerClient + Clone + 'static,
    A: SigningAgent,
    S: TransactionSource,
{
    /// Creates an idle checkout for `selection`.
    pub fn new(
        ledger: L,
        agent: A,
        source: S,
        selection: Selection,
        config: CheckoutConfig,
    ) -> Self {
        let submitter = TransactionSubmitter::new(ledger.clone(), agent)
            .with_anchor_check(config.check_anchor);
        let poller = ConfirmationPoller::new(ledger, config.poller);
        let (status, _) = watch::channel(CheckoutStatus::Idle);
        let (poll_error, _) = watch::channel(None);
        Self {
            source,
            submitter,
            poller,
            selection,
            config,
            session: CheckoutSession::new(1),
            poll: None,
            cancel: CancellationToken::new(),
            status,
            poll_error,
        }
    }

    /// Current attempt.
    pub const fn session(&self) -> &CheckoutSession {
        &self.session
    }

    /// Current state.
    pub const fn status(&self) -> CheckoutStatus {
        self.session.status
    }

    /// Watches state changes.
    pub fn subscribe(&self) -> watch::Receiver<CheckoutStatus> {
        self.status.subscribe()
    }

    /// Watches the latest poll failure while the attempt is polling.
    ///
    /// Every failure is also kept in [`CheckoutSession::poll_errors`].
    pub fn subscribe_poll_errors(&self) -> watch::Receiver<Option<PollError>> {
        self.poll_error.subscribe()
    }

    /// Token that cancels the current attempt when triggered.
    ///
    /// Reset installs a fresh token; fetch it again afterwards.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Performs the current state's side effect and applies the result.
    ///
    /// A terminal state is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the resulting event does not apply,
    /// which the driver itself never produces.
    pub async fn step(&mut self) -> Result<CheckoutStatus, InvalidTransition> {
        if self.session.status.is_terminal() {
            return Ok(self.session.status);
        }
        let cancel = self.cancel.clone();
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => CheckoutEvent::Cancel,
            event = self.effect() => event,
        };
        self.apply(event)
    }

    /// Steps until a terminal state.
    ///
    /// # Errors
    ///
    /// See [`Checkout::step`].
    pub async fn run(&mut self) -> Result<CheckoutStatus, InvalidTransition> {
        loop {
            let status = self.step().await?;
            if status.is_terminal() {
                return Ok(status);
            }
        }
    }

    /// Abandons the attempt. Stops any poller.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] from a terminal state.
    pub fn cancel(&mut self) -> Result<CheckoutStatus, InvalidTransition> {
        let status = self.apply(CheckoutEvent::Cancel)?;
        self.cancel.cancel();
        Ok(status)
    }

    /// Starts a new attempt from `Failed`, `Expired` or `Cancelled`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] from any other state.
    pub fn reset(&mut self) -> Result<CheckoutStatus, InvalidTransition> {
        self.apply(CheckoutEvent::Reset)?;
        self.session = CheckoutSession::new(self.session.attempt + 1);
        self.cancel = CancellationToken::new();
        self.poll_error.send_replace(None);
        Ok(self.session.status)
    }

    fn apply(&mut self, event: CheckoutEvent) -> Result<CheckoutStatus, InvalidTransition> {
        let from = self.session.status;
        let next = from.next(&event)?;
        if next != CheckoutStatus::Polling {
            // Releases the poll task and its timer.
            self.poll = None;
        }
        self.session.status = next;
        self.status.send_replace(next);
        #[cfg(feature = "telemetry")]
        tracing::debug!(
            attempt = self.session.attempt,
            %from,
            event = event.name(),
            to = %next,
            "Checkout transition"
        );
        Ok(next)
    }

    fn fail(&mut self, error: impl Into<CheckoutError>) {
        let error = error.into();
        #[cfg(feature = "telemetry")]
        tracing::warn!(attempt = self.session.attempt, error = %error, "Checkout failed");
        self.session.last_error = Some(error);
    }

    async fn effect(&mut self) -> CheckoutEvent {
        match self.session.status {
            CheckoutStatus::Idle => CheckoutEvent::Begin,
            CheckoutStatus::AwaitingWallet => self.connect().await,
            CheckoutStatus::BuildingTransaction => self.build().await,
            CheckoutStatus::AwaitingSignature => self.sign().await,
            CheckoutStatus::Broadcasting => self.start_polling(),
            CheckoutStatus::Polling => self.await_settlement().await,
            // step() returns before reaching here.
            CheckoutStatus::Confirmed
            | CheckoutStatus::Failed
            | CheckoutStatus::Expired
            | CheckoutStatus::Cancelled => CheckoutEvent::Cancel,
        }
    }

    async fn connect(&mut self) -> CheckoutEvent {
        match self.submitter.agent().connect().await {
            Ok(buyer) => {
                self.session.buyer = Some(buyer);
                CheckoutEvent::WalletConnected(buyer)
            }
            Err(e) => {
                self.fail(e);
                CheckoutEvent::WalletUnavailable
            }
        }
    }

    async fn build(&mut self) -> CheckoutEvent {
        let Some(buyer) = self.session.buyer else {
            self.fail(crate::error::ValidationError::MissingAccount);
            return CheckoutEvent::BuildFailed;
        };
        let reference = *self.session.reference.get_or_insert_with(Reference::generate);
        let order = Order {
            selection: self.selection.clone(),
            reference,
            buyer,
        };
        let result = self.source.request_transaction(&order).await;
        match result.and_then(|tx| admit(&tx, reference, buyer).map(|expected| (tx, expected))) {
            Ok((transaction, expected)) => {
                self.session.transaction = Some(transaction);
                self.session.intent = Some(expected);
                CheckoutEvent::TransactionBuilt
            }
            Err(e) => {
                self.fail(e);
                CheckoutEvent::BuildFailed
            }
        }
    }

    async fn sign(&mut self) -> CheckoutEvent {
        let Some(transaction) = self.session.transaction.as_ref() else {
            self.fail(CheckoutError::UntrustedTransaction("no transaction to sign".into()));
            return CheckoutEvent::SubmissionFailed;
        };
        match self.submitter.submit(transaction).await {
            Ok(handle) => {
                self.session.signature = Some(handle.signature);
                CheckoutEvent::Submitted(handle.signature)
            }
            Err(SubmitError::StaleTransaction)
                if self.session.rebuilds < self.config.max_rebuilds =>
            {
                self.session.rebuilds += 1;
                self.session.discard_transaction();
                #[cfg(feature = "telemetry")]
                tracing::info!(rebuilds = self.session.rebuilds, "Anchor expired, rebuilding");
                CheckoutEvent::AnchorExpired
            }
            Err(e) => {
                self.fail(e);
                CheckoutEvent::SubmissionFailed
            }
        }
    }

    fn start_polling(&mut self) -> CheckoutEvent {
        if let Some(reference) = self.session.reference {
            let expected = self.session.intent.filter(|_| self.config.verify_transfer);
            self.poll = Some(self.poller.spawn(reference, expected));
        }
        CheckoutEvent::BroadcastAccepted
    }

    async fn await_settlement(&mut self) -> CheckoutEvent {
        let Some(handle) = self.poll.as_mut() else {
            self.fail(CheckoutError::UntrustedTransaction("no reference to poll".into()));
            return CheckoutEvent::VerificationFailed;
        };
        let outcome = loop {
            match handle.next_event().await {
                PollEvent::Error(error) => {
                    self.poll_error.send_replace(Some(error.clone()));
                    self.session.poll_errors.push(error);
                }
                PollEvent::Finished(outcome) => break outcome,
            }
        };
        match outcome {
            PollOutcome::Confirmed(signature) => {
                self.session.signature = Some(signature);
                CheckoutEvent::Settled(signature)
            }
            PollOutcome::Expired { .. } => CheckoutEvent::PollExpired,
            PollOutcome::Cancelled => CheckoutEvent::Cancel,
            PollOutcome::Mismatch { signature, error } => {
                self.session.signature = Some(signature);
                self.fail(error);
                CheckoutEvent::VerificationFailed
            }
            PollOutcome::Panicked(reason) => {
                self.fail(CheckoutError::Poller(reason));
                CheckoutEvent::VerificationFailed
            }
        }
    }
}

/// Checks a transaction from an untrusted source before the buyer signs it.
fn admit(
    transaction: &UnsignedTransaction,
    reference: Reference,
    buyer: Address,
) -> Result<ExpectedTransfer, CheckoutError> {
    if !transaction.carries_reference(&reference) {
        return Err(CheckoutError::UntrustedTransaction(format!(
            "missing reference {reference}"
        )));
    }
    if transaction.fee_payer() != Some(*buyer.pubkey()) {
        return Err(CheckoutError::UntrustedTransaction(
            "fee payer is not the buyer".into(),
        ));
    }
    ExpectedTransfer::from_transaction(transaction, reference).ok_or_else(|| {
        CheckoutError::UntrustedTransaction("not a single referenced transfer".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::PaymentAsset;
    use crate::builder::TransactionBuilder;
    use crate::catalog::Catalog;
    use crate::checkout::source::LocalTransactionSource;
    use crate::testing::{MockAgent, MockLedger, native_transfer};
    use async_trait::async_trait;
    use solana_keypair::Keypair;
    use solana_signer::Signer;
    use std::sync::Arc;
    use std::time::Duration;

    type TestCheckout =
        Checkout<Arc<MockLedger>, Arc<MockAgent>, LocalTransactionSource<Arc<MockLedger>>>;

    fn checkout(
        ledger: &Arc<MockLedger>,
        agent: &Arc<MockAgent>,
        config: CheckoutConfig,
    ) -> TestCheckout {
        let shop: Address = Keypair::new().pubkey().into();
        let builder = TransactionBuilder::new(Arc::clone(ledger), shop, PaymentAsset::Native);
        let source = LocalTransactionSource::new(Arc::new(Catalog::default()), builder);
        let selection = Selection::new().with("box-of-cookies", 2).unwrap();
        Checkout::new(Arc::clone(ledger), Arc::clone(agent), source, selection, config)
    }

    async fn trace(checkout: &mut TestCheckout) -> Vec<CheckoutStatus> {
        let mut seen = Vec::new();
        loop {
            let status = checkout.step().await.unwrap();
            seen.push(status);
            if status.is_terminal() {
                return seen;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path() {
        let ledger = Arc::new(MockLedger::new());
        let agent = Arc::new(MockAgent::new().settling_on(Arc::clone(&ledger)));
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());

        let seen = trace(&mut checkout).await;
        assert_eq!(
            seen,
            [
                CheckoutStatus::AwaitingWallet,
                CheckoutStatus::BuildingTransaction,
                CheckoutStatus::AwaitingSignature,
                CheckoutStatus::Broadcasting,
                CheckoutStatus::Polling,
                CheckoutStatus::Confirmed,
            ]
        );

        let session = checkout.session();
        let reference = session.reference.unwrap();
        let signed = agent.signed();
        assert_eq!(signed.len(), 1);
        assert!(signed[0].carries_reference(&reference));
        assert_eq!(session.buyer, Some(agent.buyer()));
        assert_eq!(session.intent.unwrap().base_units, 100_000_000);
        assert_eq!(session.signature, Some(crate::testing::signature(1)));
        assert!(session.last_error.is_none());
        assert_eq!(ledger.fetch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_is_published() {
        let ledger = Arc::new(MockLedger::new());
        let agent = Arc::new(MockAgent::new().settling_on(Arc::clone(&ledger)));
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());
        let rx = checkout.subscribe();
        checkout.run().await.unwrap();
        assert_eq!(*rx.borrow(), CheckoutStatus::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_anchor_rebuilds_with_fresh_reference() {
        let ledger = Arc::new(MockLedger::new().with_expired_anchors(1));
        let agent = Arc::new(MockAgent::new().settling_on(Arc::clone(&ledger)));
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());

        let seen = trace(&mut checkout).await;
        assert_eq!(
            &seen[..4],
            [
                CheckoutStatus::AwaitingWallet,
                CheckoutStatus::BuildingTransaction,
                CheckoutStatus::AwaitingSignature,
                CheckoutStatus::BuildingTransaction,
            ]
        );
        assert_eq!(seen.last(), Some(&CheckoutStatus::Confirmed));
        assert_eq!(ledger.anchor_calls(), 2);
        // The stale transaction never reached the wallet.
        assert_eq!(agent.sign_calls(), 1);
        assert_eq!(checkout.session().rebuilds, 1);
        let signed = &agent.signed()[0];
        assert!(signed.carries_reference(&checkout.session().reference.unwrap()));
        assert_eq!(signed.anchor_blockhash(), crate::testing::blockhash(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wallet_stale_answer_draws_new_reference() {
        let ledger = Arc::new(MockLedger::new());
        let agent = Arc::new(
            MockAgent::new()
                .stale_for(1)
                .settling_on(Arc::clone(&ledger)),
        );
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());

        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Confirmed);
        let signed = agent.signed();
        assert_eq!(signed.len(), 2);
        assert_ne!(signed[0].anchor_blockhash(), signed[1].anchor_blockhash());
        let first = signed[0].transfer().unwrap().extra_accounts;
        let second = signed[1].transfer().unwrap().extra_accounts;
        assert_ne!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuilds_are_capped() {
        let ledger = Arc::new(MockLedger::new());
        let agent = Arc::new(MockAgent::new().stale_for(10));
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());

        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Failed);
        assert_eq!(agent.sign_calls(), 4);
        assert_eq!(ledger.anchor_calls(), 4);
        assert!(checkout.session().last_error.as_ref().unwrap().is_stale());
        assert_eq!(ledger.find_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_rejection_fails_without_polling() {
        let ledger = Arc::new(MockLedger::new());
        let agent = Arc::new(MockAgent::new().rejecting());
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());

        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Failed);
        assert!(matches!(
            checkout.session().last_error,
            Some(CheckoutError::Submit(SubmitError::UserRejected))
        ));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ledger.find_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wallet_unavailable() {
        let ledger = Arc::new(MockLedger::new());
        let agent = Arc::new(MockAgent::new().unavailable());
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());

        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Failed);
        assert!(matches!(
            checkout.session().last_error,
            Some(CheckoutError::Submit(SubmitError::WalletUnavailable(_)))
        ));
        assert_eq!(ledger.anchor_calls(), 0);
        assert!(checkout.session().reference.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_polling_stops_queries() {
        let ledger = Arc::new(MockLedger::new());
        let agent = Arc::new(MockAgent::new());
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());

        while checkout.status() != CheckoutStatus::Polling {
            checkout.step().await.unwrap();
        }
        let token = checkout.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_200)).await;
            token.cancel();
        });
        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Cancelled);

        let calls = ledger.find_calls();
        assert_eq!(calls, 2);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ledger.find_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_then_reset_starts_new_attempt() {
        let ledger = Arc::new(MockLedger::new());
        let agent = Arc::new(MockAgent::new().settling_on(Arc::clone(&ledger)));
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());

        checkout.step().await.unwrap();
        assert_eq!(checkout.cancel().unwrap(), CheckoutStatus::Cancelled);
        assert!(checkout.cancel().is_err());
        assert_eq!(agent.connect_calls(), 0);

        assert_eq!(checkout.reset().unwrap(), CheckoutStatus::Idle);
        assert_eq!(checkout.session().attempt, 2);
        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Confirmed);
        assert!(checkout.reset().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_budget_expires() {
        let ledger = Arc::new(MockLedger::new());
        let agent = Arc::new(MockAgent::new());
        let config = CheckoutConfig {
            poller: PollerConfig {
                max_attempts: Some(3),
                ..PollerConfig::default()
            },
            ..CheckoutConfig::default()
        };
        let mut checkout = checkout(&ledger, &agent, config);

        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Expired);
        assert_eq!(ledger.find_calls(), 3);
        assert!(checkout.session().poll_errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_poll_error_reaches_the_session() {
        let ledger = Arc::new(MockLedger::new().with_transport_errors());
        let agent = Arc::new(MockAgent::new());
        let config = CheckoutConfig {
            poller: PollerConfig {
                timeout: Some(Duration::from_millis(20_250)),
                ..PollerConfig::default()
            },
            ..CheckoutConfig::default()
        };
        let mut checkout = checkout(&ledger, &agent, config);
        let latest = checkout.subscribe_poll_errors();

        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Expired);
        assert_eq!(ledger.find_calls(), 40);
        let attempts: Vec<u32> = checkout
            .session()
            .poll_errors
            .iter()
            .map(|e| e.attempt)
            .collect();
        assert_eq!(attempts, (1..=40).collect::<Vec<_>>());
        assert_eq!(latest.borrow().as_ref().map(|e| e.attempt), Some(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_are_published_while_polling() {
        let ledger = Arc::new(MockLedger::new().with_transport_errors());
        let agent = Arc::new(MockAgent::new());
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());
        let mut latest = checkout.subscribe_poll_errors();
        while checkout.status() != CheckoutStatus::Polling {
            checkout.step().await.unwrap();
        }
        let token = checkout.cancel_token();
        let watcher = tokio::spawn(async move {
            latest.changed().await.unwrap();
            let first = latest.borrow_and_update().as_ref().map(|e| e.attempt);
            token.cancel();
            first
        });

        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Cancelled);
        assert_eq!(watcher.await.unwrap(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_poller_fails_the_attempt() {
        let ledger = Arc::new(MockLedger::new().with_panicking_lookups());
        let agent = Arc::new(MockAgent::new());
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());

        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Failed);
        assert!(matches!(
            checkout.session().last_error,
            Some(CheckoutError::Poller(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_transfer_that_does_not_match_fails() {
        let ledger = Arc::new(MockLedger::new().with_match(crate::testing::signature(99)));
        let agent = Arc::new(MockAgent::new());
        let mut checkout = checkout(&ledger, &agent, CheckoutConfig::default());
        while checkout.status() != CheckoutStatus::Polling {
            checkout.step().await.unwrap();
        }
        // Someone else's transfer settles under the same reference.
        let reference = checkout.session().reference.unwrap();
        let wrong = native_transfer(*agent.buyer().pubkey(), Keypair::new().pubkey(), 1, reference);
        ledger.settle(crate::testing::signature(99), wrong.into_inner());

        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Failed);
        assert!(matches!(
            checkout.session().last_error,
            Some(CheckoutError::Verification(_))
        ));
    }

    struct Unreferenced;

    #[async_trait]
    impl TransactionSource for Unreferenced {
        async fn request_transaction(
            &self,
            order: &Order,
        ) -> Result<UnsignedTransaction, CheckoutError> {
            Ok(native_transfer(
                *order.buyer.pubkey(),
                Keypair::new().pubkey(),
                5,
                Reference::generate(),
            ))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_without_reference_is_not_signed() {
        let ledger = Arc::new(MockLedger::new());
        let agent = Arc::new(MockAgent::new());
        let mut checkout = Checkout::new(
            Arc::clone(&ledger),
            Arc::clone(&agent),
            Unreferenced,
            Selection::new(),
            CheckoutConfig::default(),
        );

        assert_eq!(checkout.run().await.unwrap(), CheckoutStatus::Failed);
        assert!(matches!(
            checkout.session().last_error,
            Some(CheckoutError::UntrustedTransaction(_))
        ));
        assert_eq!(agent.sign_calls(), 0);
    }
}
