use std::{future::Future, panic::AssertUnwindSafe, time::Duration};

use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Fire-and-forget work detached from the request/response cycle.
///
/// Failures and panics are logged and never retried. Shutdown waits for
/// outstanding tasks up to a grace period.
#[derive(Clone, Default)]
pub struct Background {
    tracker: TaskTracker,
}

impl Background {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(task = name, error = ?e, "background task failed"),
                Err(_) => error!(task = name, "background task panicked"),
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Closes the tracker and waits for running tasks. Returns false when the
    /// grace period elapsed first.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        info!(pending = self.tracker.len(), "waiting for background tasks");
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(pending = self.tracker.len(), "background tasks still running after grace period");
            return false;
        }
        true
    }
}
