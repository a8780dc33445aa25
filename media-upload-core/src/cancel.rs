//! Owned, revocable cancellation capability for one in-flight upload.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Requests abort of exactly one upload. Not `Clone`: the task
/// owns it and drops it on every terminal transition.
#[derive(Debug)]
pub struct CancellationHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

/// Read side of a [`CancellationHandle`], given to the transport.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            token: self.token.clone(),
            reason: Arc::clone(&self.reason),
        }
    }

    /// Requests abort. Returns `true` only for the call that actually did it.
    pub fn cancel(&self, reason: &str) -> bool {
        if self.reason.set(reason.to_string()).is_err() {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    /// Resolves once the owning handle has been invoked.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.get().cloned()
    }
}
