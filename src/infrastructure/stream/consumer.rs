//! Consumer-group read loop with pending-entry reclaim.

use super::{
    HandlerError, MessageHandler, PAYLOAD_FIELD, QueueError, StreamBroker, StreamEntry,
    StreamMessage,
};
use crate::concurrency::{PoolError, WorkerPool};
use anyhow::Context;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a failed broker call before the loop tries again.
const BROKER_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Who acknowledges successfully handled entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// The consumer acks after the handler returns `Ok`.
    #[default]
    Auto,
    /// The handler acks through [`StreamConsumer::ack`].
    Manual,
}

/// Consumer group settings.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub group: String,
    /// Must be unique among concurrently running consumers of the group.
    pub consumer_name: String,
    /// Longest wait for new entries in one read.
    pub block: Duration,
    /// Entries pending longer than this are reclaimed.
    pub pending_idle: Duration,
    pub reclaim_batch: usize,
    pub read_count: usize,
    pub ack_mode: AckMode,
    /// Entry field holding the payload.
    pub value_field: String,
    /// Create the group (and stream) before the first read.
    pub ensure_group: bool,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            group: "default-group".to_string(),
            consumer_name: random_consumer_name("consumer"),
            block: Duration::from_secs(5),
            pending_idle: Duration::from_secs(10),
            reclaim_batch: 20,
            read_count: 1,
            ack_mode: AckMode::Auto,
            value_field: PAYLOAD_FIELD.to_string(),
            ensure_group: false,
        }
    }
}

/// Returns `<prefix>-<8 random alphanumerics>`.
pub fn random_consumer_name(prefix: &str) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    let suffix: String = (0..8)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect();
    format!("{prefix}-{suffix}")
}

/// State shared with every dispatched task.
struct Dispatch {
    broker: Arc<dyn StreamBroker>,
    group: String,
    value_field: String,
    ack_mode: AckMode,
}

/// Reads a stream under a consumer group and runs a handler per entry on a
/// [`WorkerPool`].
///
/// Each loop iteration first reclaims entries that other consumers (or this
/// one) left pending past the idle threshold, then blocks for new entries.
/// Both kinds are dispatched the same way. Dispatch waits for a free worker,
/// so a busy pool stops further reads.
///
/// Failed handlers leave their entry pending; the reclaim pass is the only
/// retry mechanism, with no attempt limit.
pub struct StreamConsumer {
    dispatch: Arc<Dispatch>,
    pool: Arc<WorkerPool>,
    options: ConsumerOptions,
    closed: AtomicBool,
}

impl StreamConsumer {
    pub fn new(
        broker: Arc<dyn StreamBroker>,
        pool: Arc<WorkerPool>,
        options: ConsumerOptions,
    ) -> Self {
        let dispatch = Arc::new(Dispatch {
            broker,
            group: options.group.clone(),
            value_field: options.value_field.clone(),
            ack_mode: options.ack_mode,
        });

        Self {
            dispatch,
            pool,
            options,
            closed: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &ConsumerOptions {
        &self.options
    }

    /// Creates `stream` and the configured group if missing.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the broker rejects the request for any
    /// reason other than the group already existing.
    pub async fn ensure_group(&self, stream: &str) -> Result<(), QueueError> {
        self.dispatch
            .broker
            .ensure_group(stream, &self.options.group)
            .await
    }

    /// Acknowledges entries, for use in [`AckMode::Manual`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the broker call fails.
    pub async fn ack(&self, stream: &str, ids: &[String]) -> Result<u64, QueueError> {
        self.dispatch
            .broker
            .ack(stream, &self.options.group, ids)
            .await
    }

    /// Runs the read loop until `cancel` fires or the consumer is closed.
    ///
    /// Cancellation is checked once per iteration, so an in-flight blocking
    /// read finishes its wait first. Tasks already handed to the pool keep
    /// running; call [`Self::close`] to wait for them.
    ///
    /// # Errors
    ///
    /// Only group creation (when `ensure_group` is set) fails the call.
    /// Broker errors inside the loop are logged and retried.
    pub async fn consume(
        &self,
        cancel: &CancellationToken,
        stream: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), QueueError> {
        if self.options.ensure_group {
            self.ensure_group(stream).await?;
        }

        info!(
            stream,
            group = %self.options.group,
            consumer = %self.options.consumer_name,
            "Consumer started"
        );

        while !cancel.is_cancelled() && !self.is_closed() {
            let step = match self.reclaim_pass(stream, &handler).await {
                Ok(()) => self.read_pass(stream, &handler).await,
                Err(e) => Err(e),
            };

            match step {
                Ok(()) => {}
                Err(ConsumeError::PoolClosed) => {
                    debug!(stream, "Worker pool closed, stopping consumer");
                    break;
                }
                Err(ConsumeError::Queue(e)) => {
                    error!(stream, error = %e, "Stream broker call failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(BROKER_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!(stream, consumer = %self.options.consumer_name, "Consumer stopped");
        Ok(())
    }

    /// Stops the loop and waits for dispatched tasks to finish.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn reclaim_pass(
        &self,
        stream: &str,
        handler: &Arc<dyn MessageHandler>,
    ) -> Result<(), ConsumeError> {
        let entries = self
            .dispatch
            .broker
            .claim_idle(
                stream,
                &self.options.group,
                &self.options.consumer_name,
                self.options.pending_idle,
                self.options.reclaim_batch,
            )
            .await?;

        if !entries.is_empty() {
            info!(stream, count = entries.len(), "Reclaimed idle entries");
            metrics::counter!("stream_entries_reclaimed_total").increment(entries.len() as u64);
        }

        self.dispatch_all(stream, entries, handler).await
    }

    async fn read_pass(
        &self,
        stream: &str,
        handler: &Arc<dyn MessageHandler>,
    ) -> Result<(), ConsumeError> {
        let entries = self
            .dispatch
            .broker
            .read_group(
                stream,
                &self.options.group,
                &self.options.consumer_name,
                self.options.read_count,
                self.options.block,
            )
            .await?;

        self.dispatch_all(stream, entries, handler).await
    }

    async fn dispatch_all(
        &self,
        stream: &str,
        entries: Vec<StreamEntry>,
        handler: &Arc<dyn MessageHandler>,
    ) -> Result<(), ConsumeError> {
        for entry in entries {
            let dispatch = self.dispatch.clone();
            let handler = handler.clone();
            let stream = stream.to_string();

            self.pool
                .submit(async move { dispatch.process(&stream, entry, handler).await })
                .await?;
        }
        Ok(())
    }
}

impl Dispatch {
    async fn process(
        &self,
        stream: &str,
        mut entry: StreamEntry,
        handler: Arc<dyn MessageHandler>,
    ) -> anyhow::Result<()> {
        let Some(payload) = entry.fields.remove(&self.value_field) else {
            warn!(
                stream,
                entry_id = %entry.id,
                field = %self.value_field,
                "Entry has no payload field, dropping"
            );
            metrics::counter!("stream_entries_dropped_total").increment(1);
            return self.ack(stream, &entry.id).await;
        };

        let message = StreamMessage {
            stream: stream.to_string(),
            id: entry.id,
            payload,
        };

        match handler.handle(&message).await {
            Ok(()) => {
                metrics::counter!("stream_entries_processed_total").increment(1);
                if self.ack_mode == AckMode::Auto {
                    self.ack(stream, &message.id).await?;
                }
                Ok(())
            }
            Err(HandlerError::Permanent(reason)) => {
                error!(stream, entry_id = %message.id, %reason, "Entry failed permanently, dropping");
                metrics::counter!("stream_entries_dropped_total").increment(1);
                self.ack(stream, &message.id).await
            }
            Err(HandlerError::Retryable(reason)) => {
                warn!(stream, entry_id = %message.id, %reason, "Entry failed, left pending for reclaim");
                metrics::counter!("stream_entries_failed_total").increment(1);
                Ok(())
            }
        }
    }

    async fn ack(&self, stream: &str, id: &str) -> anyhow::Result<()> {
        self.broker
            .ack(stream, &self.group, &[id.to_string()])
            .await
            .with_context(|| format!("failed to ack entry {id} on {stream}"))?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum ConsumeError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("worker pool closed")]
    PoolClosed,
}

impl From<PoolError> for ConsumeError {
    fn from(_: PoolError) -> Self {
        Self::PoolClosed
    }
}
