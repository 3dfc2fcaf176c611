//! Polls a predicate at a fixed interval until it holds, a deadline passes,
//! or the wait is cancelled.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Predicate: Send {
    type Error: Send;

    async fn is_done(&mut self) -> Result<bool, Self::Error>;
}

/// Decides whether a wait that ran into its deadline gets another round.
pub trait TimeoutContinuation: Send {
    fn keep_waiting(&mut self, waited: Duration) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError<E> {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Wait was cancelled")]
    Cancelled,
    #[error("{0}")]
    Predicate(E),
}

/// Receiving end of a cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, signal) = Self::new();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation was requested. Pending forever when the
    /// sender went away without cancelling.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct BoundedWaiter {
    interval: Duration,
    cancel: CancelSignal,
    on_timeout: Option<Box<dyn TimeoutContinuation>>,
}

impl BoundedWaiter {
    pub fn new(interval: Duration, cancel: CancelSignal) -> Self {
        Self {
            interval,
            cancel,
            on_timeout: None,
        }
    }

    pub fn ask_on_timeout(mut self, continuation: Box<dyn TimeoutContinuation>) -> Self {
        self.on_timeout = Some(continuation);
        self
    }

    /// Evaluates `predicate` right away and then once per interval.
    ///
    /// A predicate error ends the wait immediately.
    pub async fn wait_for<P: Predicate>(
        &mut self,
        predicate: &mut P,
        timeout: Duration,
    ) -> Result<(), WaitError<P::Error>> {
        let started = Instant::now();
        // None when the deadline lies beyond what an Instant can hold.
        let mut deadline = started.checked_add(timeout);

        loop {
            if self.cancel.is_cancelled() {
                return Err(WaitError::Cancelled);
            }

            let done = tokio::select! {
                result = predicate.is_done() => result.map_err(WaitError::Predicate)?,
                _ = self.cancel.cancelled() => return Err(WaitError::Cancelled),
            };
            if done {
                return Ok(());
            }

            let now = Instant::now();
            if let Some(at) = deadline {
                if now >= at {
                    let waited = started.elapsed();
                    log::debug!("Wait deadline reached after {waited:?}");
                    let keep_waiting = self
                        .on_timeout
                        .as_mut()
                        .is_some_and(|continuation| continuation.keep_waiting(waited));
                    if !keep_waiting {
                        return Err(WaitError::Timeout(waited));
                    }
                    deadline = at.checked_add(timeout);
                }
            }

            // The last sleep ends on the deadline so the final poll happens there.
            let pause = match deadline {
                Some(at) => self.interval.min(at.saturating_duration_since(now)),
                None => self.interval,
            };
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.cancel.cancelled() => return Err(WaitError::Cancelled),
            }
        }
    }
}
