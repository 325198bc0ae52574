use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::SightlineError;

/// Cancellation and deadline signal shared by long-running operations.
///
/// Clones observe the same flag. A signal may additionally carry a deadline;
/// once it passes the signal reports cancelled without anyone calling
/// [`CancelSignal::cancel`].
///
/// # Examples
///
/// ```
/// use sightline_core::CancelSignal;
///
/// let signal = CancelSignal::new();
/// let worker = signal.clone();
/// assert!(worker.check().is_ok());
///
/// signal.cancel();
/// assert!(worker.is_cancelled());
/// assert!(worker.check().unwrap_err().is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            deadline: None,
        }
    }

    /// A signal that also fires once `timeout` has elapsed from now.
    ///
    /// The returned signal still shares the manual flag with `self`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            tx: Arc::clone(&self.tx),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Cancelled)` once the signal has fired.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Cancelled`] if cancelled or past the deadline.
    pub fn check(&self) -> Result<(), SightlineError> {
        if self.is_cancelled() {
            Err(SightlineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the signal fires.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let flagged = async move {
            // The sender lives as long as `self`, so this only returns once set.
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        };
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = flagged => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => flagged.await,
        }
    }

    /// Run `fut` until it completes or the signal fires, whichever is first.
    ///
    /// Dropping `fut` on cancellation abandons any in-flight request it owns.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Cancelled`] if the signal fired first,
    /// otherwise whatever `fut` returned.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, SightlineError>
    where
        F: Future<Output = Result<T, SightlineError>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(SightlineError::Cancelled),
            result = fut => result,
        }
    }
}
