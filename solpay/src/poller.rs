//! Cancellable confirmation poller.
//!
//! A poller asks the ledger, once per interval, for a settled transaction
//! carrying a reference. "Not found yet" is the steady state and stays at
//! trace level. Every other failure is delivered through the handle and
//! polling continues until a match, the budget, or cancellation. The error
//! channel is bounded: a full channel makes the task wait, never drop.
//!
//! The task is owned by a [`PollHandle`]. Dropping the handle cancels and
//! aborts the task, so the timer is released on every exit path.

use solana_signature::Signature;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ledger::{LedgerClient, LookupError};
use crate::reference::Reference;
use crate::verify::{ExpectedTransfer, VerificationError, verify_transfer};

/// Poll cadence and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay between queries. The first query runs one interval after spawn.
    pub interval: Duration,
    /// Give up after this many queries.
    pub max_attempts: Option<u32>,
    /// Give up after this much time.
    pub timeout: Option<Duration>,
    /// Capacity of the error channel. The task waits while it is full.
    pub error_buffer: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_attempts: None,
            timeout: None,
            error_buffer: 16,
        }
    }
}

/// How a poll ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A settled transaction carries the reference.
    Confirmed(Signature),
    /// The budget ran out first.
    Expired {
        /// Queries made.
        attempts: u32,
    },
    /// Polling was cancelled.
    Cancelled,
    /// A transaction carries the reference but not the expected transfer.
    Mismatch {
        /// The offending transaction.
        signature: Signature,
        /// What did not match.
        error: VerificationError,
    },
    /// The poll task panicked.
    Panicked(String),
}

/// What [`PollHandle::next_event`] yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// A query failed; polling goes on.
    Error(PollError),
    /// The task stopped and every error before it was delivered.
    Finished(PollOutcome),
}

/// A failed query. Polling continues after it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Poll attempt {attempt} failed: {source}")]
pub struct PollError {
    /// 1-based query number.
    pub attempt: u32,
    /// Underlying failure.
    #[source]
    pub source: LookupError,
}

enum Check {
    Pending,
    Settled(Signature),
    Failed(LookupError),
    Mismatch(Signature, VerificationError),
}

/// Spawns poll tasks against a shared ledger.
#[derive(Debug, Clone)]
pub struct ConfirmationPoller<L> {
    ledger: L,
    config: PollerConfig,
}

impl<L> ConfirmationPoller<L> {
    /// Creates a poller with `config`.
    pub const fn new(ledger: L, config: PollerConfig) -> Self {
        Self { ledger, config }
    }

    /// Poll cadence and budget.
    pub const fn config(&self) -> &PollerConfig {
        &self.config
    }
}

impl<L: LedgerClient + Clone + 'static> ConfirmationPoller<L> {
    /// Starts polling for `reference`.
    ///
    /// With `expected`, a found transaction is fetched and checked against
    /// the expected transfer before it counts as confirmed.
    #[must_use]
    pub fn spawn(&self, reference: Reference, expected: Option<ExpectedTransfer>) -> PollHandle {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.config.error_buffer.max(1));
        let task = tokio::spawn(poll_reference(
            self.ledger.clone(),
            self.config,
            reference,
            expected,
            cancel.clone(),
            tx,
        ));
        #[cfg(feature = "telemetry")]
        tracing::debug!(%reference, "Started confirmation poller");
        PollHandle {
            reference,
            task: Some(task),
            outcome: None,
            cancel,
            errors: rx,
            backlog: VecDeque::new(),
        }
    }
}

async fn check<L: LedgerClient>(
    ledger: &L,
    reference: &Reference,
    expected: Option<&ExpectedTransfer>,
) -> Check {
    let signature = match ledger.find_reference(reference).await {
        Ok(signature) => signature,
        Err(LookupError::NotFound) => return Check::Pending,
        Err(e) => return Check::Failed(e),
    };
    let Some(expected) = expected else {
        return Check::Settled(signature);
    };
    match ledger.fetch_transaction(&signature).await {
        Ok(transaction) => match verify_transfer(&transaction, expected) {
            Ok(_) => Check::Settled(signature),
            Err(error) => Check::Mismatch(signature, error),
        },
        // Listed but not yet served at this commitment.
        Err(LookupError::NotFound) => Check::Pending,
        Err(e) => Check::Failed(e),
    }
}

/// Runs the poll loop until a match, the budget, or `cancel`.
///
/// Errors other than "not found" are sent on `errors`, waiting for room
/// while the channel is full.
pub async fn poll_reference<L: LedgerClient>(
    ledger: L,
    config: PollerConfig,
    reference: Reference,
    expected: Option<ExpectedTransfer>,
    cancel: CancellationToken,
    errors: mpsc::Sender<PollError>,
) -> PollOutcome {
    let start = Instant::now();
    let mut ticker = tokio::time::interval_at(start + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = async {
        match config.timeout {
            Some(timeout) => tokio::time::sleep_until(start + timeout).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut attempts: u32 = 0;
    loop {
        if config.max_attempts.is_some_and(|max| attempts >= max) {
            return PollOutcome::Expired { attempts };
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => return PollOutcome::Cancelled,
            () = &mut deadline => return PollOutcome::Expired { attempts },
            _ = ticker.tick() => {}
        }
        attempts = attempts.saturating_add(1);

        let status = tokio::select! {
            biased;
            () = cancel.cancelled() => return PollOutcome::Cancelled,
            () = &mut deadline => return PollOutcome::Expired { attempts },
            result = check(&ledger, &reference, expected.as_ref()) => result,
        };
        match status {
            Check::Pending => {
                #[cfg(feature = "telemetry")]
                tracing::trace!(%reference, attempt = attempts, "Reference not settled yet");
            }
            Check::Settled(signature) => {
                #[cfg(feature = "telemetry")]
                tracing::info!(%reference, %signature, attempt = attempts, "Payment confirmed");
                return PollOutcome::Confirmed(signature);
            }
            Check::Mismatch(signature, error) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(%reference, %signature, %error, "Settled transfer does not match");
                return PollOutcome::Mismatch { signature, error };
            }
            Check::Failed(source) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(%reference, attempt = attempts, error = %source, "Poll failed");
                let error = PollError {
                    attempt: attempts,
                    source,
                };
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return PollOutcome::Cancelled,
                    () = &mut deadline => return PollOutcome::Expired { attempts },
                    // A closed channel means the handle is gone.
                    _ = errors.send(error) => {}
                }
            }
        }
    }
}

/// Owner of a running poll task.
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct PollHandle {
    reference: Reference,
    task: Option<JoinHandle<PollOutcome>>,
    outcome: Option<PollOutcome>,
    cancel: CancellationToken,
    errors: mpsc::Receiver<PollError>,
    backlog: VecDeque<PollError>,
}

impl PollHandle {
    /// Reference being polled.
    #[must_use]
    pub const fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Waits for the next query failure or, once the task stopped and all
    /// failures were taken, the outcome. Cancel-safe.
    pub async fn next_event(&mut self) -> PollEvent {
        if let Some(error) = self.backlog.pop_front() {
            return PollEvent::Error(error);
        }
        match self.advance().await {
            Some(error) => PollEvent::Error(error),
            None => PollEvent::Finished(self.finished()),
        }
    }

    /// Waits for the outcome. Cancel-safe; later calls return the same
    /// outcome. Failures received meanwhile stay queued for
    /// [`PollHandle::try_next_error`].
    pub async fn wait(&mut self) -> PollOutcome {
        while let Some(error) = self.advance().await {
            self.backlog.push_back(error);
        }
        self.finished()
    }

    /// Requests cancellation. The task stops at its next await point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Pops a queued error without waiting.
    pub fn try_next_error(&mut self) -> Option<PollError> {
        self.backlog
            .pop_front()
            .or_else(|| self.errors.try_recv().ok())
    }

    /// Receives one error from the task, or records the outcome and returns
    /// `None` once the task stopped and the channel is empty.
    async fn advance(&mut self) -> Option<PollError> {
        if self.outcome.is_none() {
            let Self { task, errors, .. } = self;
            let outcome = tokio::select! {
                biased;
                Some(error) = errors.recv() => return Some(error),
                outcome = join(task) => outcome,
            };
            self.task = None;
            self.outcome = Some(outcome);
        }
        self.errors.try_recv().ok()
    }

    fn finished(&self) -> PollOutcome {
        self.outcome.clone().unwrap_or(PollOutcome::Cancelled)
    }
}

async fn join(task: &mut Option<JoinHandle<PollOutcome>>) -> PollOutcome {
    let Some(handle) = task.as_mut() else {
        return PollOutcome::Cancelled;
    };
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => PollOutcome::Cancelled,
        Err(e) => {
            #[cfg(feature = "telemetry")]
            tracing::error!(error = %e, "Poll task panicked");
            PollOutcome::Panicked(e.to_string())
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
