//! Run-once guard for async initialization
//!
//! The first caller drives the future; concurrent callers park on the same
//! cell and every caller, now or later, gets a clone of the recorded outcome.

use std::future::Future;
use tokio::sync::OnceCell;

/// Executes an async routine at most once per guard and replays its outcome
pub struct SingleFlight<T> {
    outcome: OnceCell<T>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self { outcome: OnceCell::new() }
    }

    /// Run `init` if nothing has run yet, otherwise return the recorded outcome.
    ///
    /// Failures are outcomes too: encode them in `T` (e.g. `Result<_, Arc<E>>`)
    /// and they are replayed without re-running `init`.
    pub async fn run<F, Fut>(&self, init: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.outcome.get_or_init(init).await.clone()
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
