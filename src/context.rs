use crate::kv::KvError;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline handle threaded through every catalog and store
/// call. Clones share one token. Children derived with
/// [`Context::child_with_timeout`] are cancelled with their parent, but
/// cancelling a child leaves the parent running.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derives a child of this context with the earlier of the two
    /// deadlines.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once this context or any of its ancestors is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails fast when the call must not proceed. Stores call this before
    /// applying anything.
    pub fn check(&self) -> Result<(), KvError> {
        if self.is_cancelled() {
            return Err(KvError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(KvError::DeadlineExceeded);
        }
        Ok(())
    }
}
