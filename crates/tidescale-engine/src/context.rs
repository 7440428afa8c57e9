//! Per-cycle cancellation and timeout.
//!
//! Only the calls that leave the process (metrics fetch, replica read and
//! write) go through [`CycleContext::guard`]; everything between them is
//! plain computation.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use tidescale_core::{ScaleError, ScaleResult};

/// Cancellation signal plus an optional per-call deadline.
///
/// Cancellation is the same `watch::Receiver<bool>` the driver uses as its
/// shutdown signal: flipping it to `true` aborts in-flight calls.
#[derive(Debug, Clone)]
pub struct CycleContext {
    cancel: watch::Receiver<bool>,
    timeout: Option<Duration>,
}

impl CycleContext {
    pub fn new(cancel: watch::Receiver<bool>) -> Self {
        Self {
            cancel,
            timeout: None,
        }
    }

    /// A context that is never cancelled.
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(rx)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Apply `timeout` unless one is already set.
    pub fn or_timeout(mut self, timeout: Duration) -> Self {
        self.timeout.get_or_insert(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Run `fut`, giving up on cancellation or when the deadline passes.
    pub async fn guard<F: Future>(&self, fut: F) -> ScaleResult<F::Output> {
        if self.is_cancelled() {
            return Err(ScaleError::Cancelled);
        }

        let mut cancel = self.cancel.clone();
        let work = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| ScaleError::Timeout(limit)),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            res = work => res,
            _ = cancelled(&mut cancel) => Err(ScaleError::Cancelled),
        }
    }
}

/// Resolves once the signal reads `true`. Never resolves if the sender is
/// gone without having cancelled.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
