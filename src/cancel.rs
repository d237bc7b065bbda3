//! Cooperative cancellation shared by the runner, the tasks and the host.
//!
//! A [`CancellationToken`] is cheap to clone; all clones observe the same
//! flag. Long waits (parser readiness, prompts, the rendering backend) are
//! wrapped in [`CancellationToken::run_until_cancelled`] so that cancelling
//! interrupts them instead of waiting for them to finish.

use crate::error::ConvertError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), ConvertError> {
        if self.is_cancelled() {
            Err(ConvertError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Drive `fut` to completion unless cancellation fires first.
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Result<F::Output, ConvertError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ConvertError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let out = token.run_until_cancelled(async { 7 }).await.unwrap();
        assert_eq!(out, 7);
        assert!(token.check().is_ok());
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_future() {
        let token = CancellationToken::new();
        let clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            clone.cancel();
        });

        let result = token
            .run_until_cancelled(std::future::pending::<()>())
            .await;
        assert!(matches!(result, Err(ConvertError::Cancelled)));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_wins_over_ready_future() {
        let token = CancellationToken::new();
        token.cancel();
        let result = token.run_until_cancelled(async { 1 }).await;
        assert!(result.is_err());
        assert!(matches!(token.check(), Err(ConvertError::Cancelled)));
    }
}
