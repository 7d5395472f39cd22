//! Fire-and-forget task spawning with a concurrency cap.
//!
//! Used for side work that must not hold up the caller: webhook delivery
//! after a message is processed and cache population after a decode.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// Spawns detached tasks while keeping at most `limit` of them in flight.
///
/// Panics inside a task are caught at the task boundary and logged.
pub struct BoundedSpawner {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    limit: usize,
}

impl BoundedSpawner {
    /// Creates a spawner. A limit of zero is raised to one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            tracker: TaskTracker::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of tasks currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    /// Spawns `task` only if a slot is free right now.
    ///
    /// Returns `false` when the task was dropped because the spawner is
    /// saturated or closed.
    pub fn try_spawn<F>(&self, name: &'static str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                self.tracker.spawn(async move {
                    run_guarded(name, task).await;
                    drop(permit);
                });
                true
            }
            Err(_) => {
                debug!(task = name, "No free slot, skipping task");
                false
            }
        }
    }

    /// Waits until every task spawned so far has finished.
    ///
    /// The spawner stays usable afterwards.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Rejects new tasks and waits for running ones to finish.
    pub async fn close(&self) {
        self.permits.close();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn run_guarded<F>(name: &'static str, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(task).await {
        if e.is_panic() {
            error!(task = name, error = %e, "Background task panicked");
        } else {
            warn!(task = name, error = %e, "Background task was cancelled");
        }
    }
}
