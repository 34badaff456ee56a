// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Caller-supplied cancellation and deadline

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Cancellation scope for one operation
///
/// Network-bound work (upstream fetches, function invocations, registry
/// scans) is raced against the token and the optional deadline through
/// [`OperationContext::run`].
#[derive(Debug, Clone)]
pub struct OperationContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::background()
    }
}

impl OperationContext {
    /// Context that is never cancelled unless [`cancel`](Self::cancel) is called
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Narrow the deadline to at most `timeout` from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    /// Child scope: cancelled with the parent, cancellable on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails fast if the scope is already cancelled or past its deadline
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled("cancelled by caller".to_string()));
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(Error::Cancelled("deadline exceeded".to_string()));
        }
        Ok(())
    }

    /// Run `fut` until it completes, the token fires or the deadline passes
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    Err(Error::Cancelled("cancelled by caller".to_string()))
                }
                _ = tokio::time::sleep_until(deadline) => {
                    Err(Error::Cancelled("deadline exceeded".to_string()))
                }
                out = fut => out,
            },
            None => tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    Err(Error::Cancelled("cancelled by caller".to_string()))
                }
                out = fut => out,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn run_passes_through_results() {
        let ctx = OperationContext::background();
        assert_eq!(ctx.run(async { Ok(7) }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn cancelled_parent_cancels_child() {
        let parent = OperationContext::background();
        let child = parent.child();
        parent.cancel();
        let err = child.run(async { Ok(()) }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_alone() {
        let parent = OperationContext::background();
        parent.child().cancel();
        assert!(parent.check().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_pending_work() {
        let ctx = OperationContext::background().with_timeout(Duration::from_secs(5));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn with_timeout_keeps_the_earlier_deadline() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
        rt.block_on(async {
            let short = OperationContext::background().with_timeout(Duration::from_secs(1));
            let first = short.deadline().unwrap();
            let narrowed = short.with_timeout(Duration::from_secs(100));
            assert_eq!(narrowed.deadline(), Some(first));
        });
    }
}
