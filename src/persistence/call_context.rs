//! Cancellation and deadline scope for store calls

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::StoreError;

/// Execution scope handed to every `EventStore` operation.
///
/// A call aborts with `StoreError::Cancelled` once the token is cancelled and
/// with `StoreError::Timeout` once the deadline has passed, whichever comes
/// first.
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A scope that is never cancelled and has no deadline
    pub fn background() -> Self {
        CallContext {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A scope cancelled together with `parent`
    pub fn child_of(parent: &CancellationToken) -> Self {
        CallContext {
            token: parent.child_token(),
            deadline: None,
        }
    }

    /// Bound the scope to `timeout` from now. A timeout too large to
    /// represent leaves the scope without a deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Tighten the deadline; a later deadline than the current one is ignored
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the scope is already cancelled or expired
    pub fn check(&self) -> Result<(), StoreError> {
        if self.token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(StoreError::Timeout),
            _ => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the scope ends first
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, StoreError> {
        self.check()?;

        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(StoreError::Cancelled),
            _ = expiry => Err(StoreError::Timeout),
            output = fut => Ok(output),
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}
