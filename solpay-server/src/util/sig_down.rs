//! Shutdown on SIGTERM / SIGINT (Ctrl+C on Windows).
//!
//! The signal fans out through a [`CancellationToken`]: the server hands a
//! clone to axum's graceful shutdown, the payer hands one to the checkout so
//! an interrupted payment ends as `Cancelled` and its poller is released.

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Listens for shutdown signals in a background task.
#[allow(missing_debug_implementations)] // TaskTracker doesn't impl Debug
pub struct SigDown {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl SigDown {
    /// Installs the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if a handler cannot be registered.
    #[allow(clippy::unnecessary_wraps)] // Result needed on Unix for signal registration
    pub fn try_new() -> Result<Self, std::io::Error> {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let trigger = token.clone();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            tracker.spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT"),
                    () = trigger.cancelled() => return,
                }
                trigger.cancel();
            });
        }

        #[cfg(windows)]
        {
            tracker.spawn(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl-C"),
                    () = trigger.cancelled() => return,
                }
                trigger.cancel();
            });
        }

        tracker.close();
        Ok(Self { tracker, token })
    }

    /// Token cancelled when a signal arrives.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stops listening without a signal and waits for the listener to exit.
    pub async fn release(&self) {
        self.token.cancel();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_release_cancels_token_and_ends_listener() {
        let sig_down = SigDown::try_new().unwrap();
        let token = sig_down.cancellation_token();
        assert!(!token.is_cancelled());
        sig_down.release().await;
        assert!(token.is_cancelled());
        assert!(sig_down.tracker.is_empty());
    }
}
