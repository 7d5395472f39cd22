//! Durable stream queue: producer, consumer-group broker and consumer loop.
//!
//! The broker is expressed as two capability traits so the delivery
//! semantics (consumer-group ownership, pending entries, idle reclaim) can be
//! exercised against [`MemoryStream`] as well as Redis.
//!
//! - [`StreamProducer`] - appends payloads to a named stream
//! - [`StreamBroker`] - group reads, pending reclaim and acknowledgement
//! - [`StreamConsumer`] - the read / reclaim / dispatch loop
//! - [`MessageHandler`] - business logic invoked for each entry

mod consumer;
mod memory_stream;
mod redis_stream;

pub use consumer::{AckMode, ConsumerOptions, StreamConsumer, random_consumer_name};
pub use memory_stream::MemoryStream;
pub use redis_stream::{RedisStreamBroker, RedisStreamProducer};

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Name of the single field carrying the serialized submission.
pub const PAYLOAD_FIELD: &str = "payload";

/// Errors raised by stream backends.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("stream name must not be empty")]
    EmptyStreamName,

    #[error("payload must not be empty")]
    EmptyPayload,

    #[error("stream broker error: {0}")]
    Broker(String),

    #[error("unexpected broker reply: {0}")]
    Protocol(String),
}

impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        Self::Broker(e.to_string())
    }
}

/// One delivered entry: broker id plus its raw field map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, Vec<u8>>,
}

impl StreamEntry {
    pub fn new(id: impl Into<String>, fields: HashMap<String, Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Payload handed to a [`MessageHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub stream: String,
    pub id: String,
    pub payload: Vec<u8>,
}

/// How a handler failure should be treated by the consumer.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HandlerError {
    /// Redelivery cannot succeed. The entry is acknowledged and dropped.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// The entry stays pending and is picked up again by a reclaim pass.
    #[error("retryable failure: {0}")]
    Retryable(String),
}

/// Appends entries to a stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamProducer: Send + Sync {
    /// Appends `payload` as a single-field entry and returns the entry id.
    ///
    /// # Errors
    ///
    /// - [`QueueError::EmptyStreamName`] / [`QueueError::EmptyPayload`] on empty input
    /// - [`QueueError::Broker`] if the append was not acknowledged
    async fn publish(&self, stream: &str, payload: &[u8]) -> Result<String, QueueError>;
}

/// Consumer-group operations on a stream.
///
/// Each entry delivered through [`StreamBroker::read_group`] or
/// [`StreamBroker::claim_idle`] is owned by exactly one consumer of the group
/// and stays pending until acknowledged.
#[async_trait]
pub trait StreamBroker: Send + Sync {
    /// Creates the stream and the group reading from the start of the log.
    ///
    /// An already existing group is not an error.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), QueueError>;

    /// Delivers up to `count` never-delivered entries to `consumer`, waiting at
    /// most `block` for one to arrive. An empty result means the wait timed out.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, QueueError>;

    /// Transfers up to `count` entries pending for longer than `min_idle` to
    /// `consumer` and returns them. Claiming resets their idle time.
    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, QueueError>;

    /// Removes `ids` from the group's pending set. Returns how many were pending.
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, QueueError>;
}

/// Business logic run for every stream entry.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &StreamMessage) -> Result<(), HandlerError>;
}

pub(crate) fn check_publish_args(stream: &str, payload: &[u8]) -> Result<(), QueueError> {
    if stream.is_empty() {
        return Err(QueueError::EmptyStreamName);
    }
    if payload.is_empty() {
        return Err(QueueError::EmptyPayload);
    }
    Ok(())
}
