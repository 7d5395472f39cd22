//! Fixed-size worker pool with handoff submission.
//!
//! Workers pull jobs from a single shared channel. [`WorkerPool::submit`]
//! returns only after a worker has taken the job, so a saturated pool holds
//! the submitter back. The stream consumer relies on this to stop reading
//! from the broker while every worker is busy.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A unit of work executed by a pool worker.
pub type Task = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Errors returned by the pool.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
}

struct Job {
    task: Task,
    accepted: oneshot::Sender<()>,
}

/// A pool of long-lived Tokio tasks executing submitted jobs.
///
/// # Failure isolation
///
/// Each job runs in its own spawned task and the worker awaits its handle.
/// An `Err` result is logged; a panic surfaces as a `JoinError`, is logged,
/// and the worker moves on to the next job. Pool capacity never shrinks.
///
/// # Shutdown
///
/// [`WorkerPool::close`] stops accepting submissions and waits for every
/// accepted job to finish. It has no timeout of its own.
pub struct WorkerPool {
    size: usize,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts `size` workers. A size of zero is raised to one.
    pub fn new(size: usize) -> Self {
        let size = if size == 0 {
            warn!("Worker pool size is 0, using 1");
            1
        } else {
            size
        };

        let (tx, rx) = mpsc::channel::<Job>(1);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..size)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, rx.clone())))
            .collect();

        info!(size, "Worker pool started");

        Self {
            size,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Hands a job to the next free worker, waiting until one accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] if the pool has been closed.
    pub async fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let sender = self.sender.lock().await.clone().ok_or(PoolError::Closed)?;

        let (accepted, on_accept) = oneshot::channel();
        sender
            .send(Job {
                task: Box::pin(task),
                accepted,
            })
            .await
            .map_err(|_| PoolError::Closed)?;

        on_accept.await.map_err(|_| PoolError::Closed)
    }

    /// Returns true once [`Self::close`] has been called.
    pub async fn is_closed(&self) -> bool {
        self.sender.lock().await.is_none()
    }

    /// Stops accepting jobs and waits for all accepted jobs to complete.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        // Dropping the last sender lets workers drain the channel and exit.
        self.sender.lock().await.take();

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for (worker_id, handle) in workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker_id, error = %e, "Worker terminated abnormally");
            }
        }

        debug!(size = self.size, "Worker pool closed");
    }
}

async fn worker_loop(worker_id: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        let Some(job) = job else {
            break;
        };

        // The submitter may have given up waiting; the job still runs.
        let _ = job.accepted.send(());

        match tokio::spawn(job.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(worker_id, error = %e, "Task failed"),
            Err(e) if e.is_panic() => error!(worker_id, error = %e, "Task panicked"),
            Err(e) => warn!(worker_id, error = %e, "Task was cancelled"),
        }
    }

    debug!(worker_id, "Worker stopped");
}
