//! In-process stream with consumer-group semantics.
//!
//! Mirrors the subset of Redis Streams behaviour the consumer depends on:
//! ordered append, one owner per delivered entry, a per-group pending list
//! and idle-based claiming. Used by tests and by single-process setups.

use super::{QueueError, StreamBroker, StreamEntry, StreamProducer, check_publish_args};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

type Fields = HashMap<String, Vec<u8>>;

#[derive(Debug)]
struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct Group {
    last_delivered: u64,
    pending: BTreeMap<u64, PendingEntry>,
}

#[derive(Debug, Default)]
struct Log {
    entries: BTreeMap<u64, Fields>,
    last_seq: u64,
    groups: HashMap<String, Group>,
}

/// Stream broker held entirely in memory.
///
/// Entry ids have the Redis shape `<seq>-0` with `seq` starting at 1.
#[derive(Debug, Default)]
pub struct MemoryStream {
    logs: Mutex<HashMap<String, Log>>,
    appended: Notify,
    max_len: Option<usize>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `max_len` entries per stream, dropping the oldest.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    /// Number of entries currently retained in `stream`.
    pub async fn len(&self, stream: &str) -> usize {
        self.logs
            .lock()
            .await
            .get(stream)
            .map_or(0, |log| log.entries.len())
    }

    /// Number of delivered but unacknowledged entries in `group`.
    pub async fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.logs
            .lock()
            .await
            .get(stream)
            .and_then(|log| log.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Current owner and delivery count of a pending entry.
    pub async fn pending_info(&self, stream: &str, group: &str, id: &str) -> Option<(String, u32)> {
        let seq = parse_id(id)?;
        let logs = self.logs.lock().await;
        let pending = logs.get(stream)?.groups.get(group)?.pending.get(&seq)?;
        Some((pending.consumer.clone(), pending.delivery_count))
    }
}

fn format_id(seq: u64) -> String {
    format!("{seq}-0")
}

fn parse_id(id: &str) -> Option<u64> {
    id.split('-').next()?.parse().ok()
}

fn no_group(stream: &str, group: &str) -> QueueError {
    QueueError::Broker(format!(
        "NOGROUP No such key '{stream}' or consumer group '{group}'"
    ))
}

#[async_trait]
impl StreamProducer for MemoryStream {
    async fn publish(&self, stream: &str, payload: &[u8]) -> Result<String, QueueError> {
        check_publish_args(stream, payload)?;

        let id = {
            let mut logs = self.logs.lock().await;
            let log = logs.entry(stream.to_string()).or_default();

            log.last_seq += 1;
            let seq = log.last_seq;
            log.entries.insert(
                seq,
                HashMap::from([(super::PAYLOAD_FIELD.to_string(), payload.to_vec())]),
            );

            if let Some(max_len) = self.max_len {
                while log.entries.len() > max_len {
                    log.entries.pop_first();
                }
            }
            format_id(seq)
        };

        self.appended.notify_waiters();
        Ok(id)
    }
}

#[async_trait]
impl StreamBroker for MemoryStream {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), QueueError> {
        let mut logs = self.logs.lock().await;
        logs.entry(stream.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, QueueError> {
        let deadline = Instant::now() + block;

        loop {
            // Register for wakeups before inspecting the log so an append
            // between the check and the wait is not missed.
            let appended = self.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            {
                let mut logs = self.logs.lock().await;
                let log = logs.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
                let group_state = log
                    .groups
                    .get_mut(group)
                    .ok_or_else(|| no_group(stream, group))?;

                let now = Instant::now();
                let mut delivered = Vec::new();
                for (&seq, fields) in log
                    .entries
                    .range(group_state.last_delivered + 1..)
                    .take(count.max(1))
                {
                    group_state.pending.insert(
                        seq,
                        PendingEntry {
                            consumer: consumer.to_string(),
                            delivered_at: now,
                            delivery_count: 1,
                        },
                    );
                    delivered.push(StreamEntry::new(format_id(seq), fields.clone()));
                }

                if let Some(last) = delivered.last().and_then(|e| parse_id(&e.id)) {
                    group_state.last_delivered = last;
                    return Ok(delivered);
                }
            }

            if block.is_zero() || tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, QueueError> {
        let mut logs = self.logs.lock().await;
        let log = logs.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        let group_state = log
            .groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;

        let now = Instant::now();
        let idle: Vec<u64> = group_state
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.delivered_at) >= min_idle)
            .map(|(&seq, _)| seq)
            .take(count)
            .collect();

        let mut claimed = Vec::with_capacity(idle.len());
        for seq in idle {
            match log.entries.get(&seq) {
                Some(fields) => {
                    if let Some(p) = group_state.pending.get_mut(&seq) {
                        p.consumer = consumer.to_string();
                        p.delivered_at = now;
                        p.delivery_count += 1;
                    }
                    claimed.push(StreamEntry::new(format_id(seq), fields.clone()));
                }
                // Trimmed away while pending.
                None => {
                    group_state.pending.remove(&seq);
                }
            }
        }

        Ok(claimed)
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, QueueError> {
        let mut logs = self.logs.lock().await;
        let Some(group_state) = logs.get_mut(stream).and_then(|log| log.groups.get_mut(group))
        else {
            return Ok(0);
        };

        let acked = ids
            .iter()
            .filter_map(|id| parse_id(id))
            .filter(|seq| group_state.pending.remove(seq).is_some())
            .count();

        Ok(acked as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const STREAM: &str = "links";
    const GROUP: &str = "workers";
    const NO_WAIT: Duration = Duration::ZERO;

    async fn stream_with_group() -> MemoryStream {
        let stream = MemoryStream::new();
        stream.ensure_group(STREAM, GROUP).await.unwrap();
        stream
    }

    fn payload(entry: &StreamEntry) -> &[u8] {
        &entry.fields[super::super::PAYLOAD_FIELD]
    }

    #[tokio::test]
    async fn test_publish_rejects_empty_arguments() {
        let stream = MemoryStream::new();

        assert!(matches!(
            stream.publish("", b"x").await,
            Err(QueueError::EmptyStreamName)
        ));
        assert!(matches!(
            stream.publish(STREAM, b"").await,
            Err(QueueError::EmptyPayload)
        ));
        assert_eq!(stream.len(STREAM).await, 0);
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let stream = MemoryStream::new();
        let a = stream.publish(STREAM, b"a").await.unwrap();
        let b = stream.publish(STREAM, b"b").await.unwrap();

        assert_eq!(a, "1-0");
        assert_eq!(b, "2-0");
    }

    #[tokio::test]
    async fn test_ensure_group_is_idempotent() {
        let stream = stream_with_group().await;
        stream.publish(STREAM, b"a").await.unwrap();
        stream
            .read_group(STREAM, GROUP, "c1", 10, NO_WAIT)
            .await
            .unwrap();

        stream.ensure_group(STREAM, GROUP).await.unwrap();

        // Existing group state survives.
        assert_eq!(stream.pending_count(STREAM, GROUP).await, 1);
    }

    #[tokio::test]
    async fn test_group_reads_from_start_of_log() {
        let stream = MemoryStream::new();
        stream.publish(STREAM, b"early").await.unwrap();
        stream.ensure_group(STREAM, GROUP).await.unwrap();

        let entries = stream
            .read_group(STREAM, GROUP, "c1", 10, NO_WAIT)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(payload(&entries[0]), b"early");
    }

    #[tokio::test]
    async fn test_each_entry_delivered_once_per_group() {
        let stream = stream_with_group().await;
        for i in 0..5 {
            stream
                .publish(STREAM, format!("m{i}").as_bytes())
                .await
                .unwrap();
        }

        let first = stream
            .read_group(STREAM, GROUP, "c1", 3, NO_WAIT)
            .await
            .unwrap();
        let second = stream
            .read_group(STREAM, GROUP, "c2", 10, NO_WAIT)
            .await
            .unwrap();
        let third = stream
            .read_group(STREAM, GROUP, "c1", 10, NO_WAIT)
            .await
            .unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        assert!(third.is_empty());
        assert_eq!(stream.pending_count(STREAM, GROUP).await, 5);
    }

    #[tokio::test]
    async fn test_independent_groups_see_all_entries() {
        let stream = stream_with_group().await;
        stream.ensure_group(STREAM, "audit").await.unwrap();
        stream.publish(STREAM, b"a").await.unwrap();
        stream.publish(STREAM, b"b").await.unwrap();

        let workers = stream
            .read_group(STREAM, GROUP, "c1", 10, NO_WAIT)
            .await
            .unwrap();
        let audit = stream
            .read_group(STREAM, "audit", "c1", 10, NO_WAIT)
            .await
            .unwrap();

        assert_eq!(workers.len(), 2);
        assert_eq!(audit.len(), 2);
    }

    #[tokio::test]
    async fn test_read_without_group_fails() {
        let stream = MemoryStream::new();
        let err = stream
            .read_group(STREAM, GROUP, "c1", 1, NO_WAIT)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NOGROUP"));
    }

    #[tokio::test]
    async fn test_blocking_read_times_out_empty() {
        let stream = stream_with_group().await;
        let started = Instant::now();

        let entries = stream
            .read_group(STREAM, GROUP, "c1", 1, Duration::from_millis(30))
            .await
            .unwrap();

        assert!(entries.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_blocking_read_wakes_on_publish() {
        let stream = Arc::new(stream_with_group().await);

        let reader = {
            let stream = stream.clone();
            tokio::spawn(async move {
                stream
                    .read_group(STREAM, GROUP, "c1", 1, Duration::from_secs(5))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.publish(STREAM, b"late").await.unwrap();

        let entries = tokio::time::timeout(Duration::from_secs(2), reader)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(payload(&entries[0]), b"late");
    }

    #[tokio::test]
    async fn test_claim_idle_transfers_ownership_after_threshold() {
        let stream = stream_with_group().await;
        let id = stream.publish(STREAM, b"job").await.unwrap();
        stream
            .read_group(STREAM, GROUP, "consumer-a", 1, NO_WAIT)
            .await
            .unwrap();

        let idle = Duration::from_millis(40);
        let too_early = stream
            .claim_idle(STREAM, GROUP, "consumer-b", idle, 10)
            .await
            .unwrap();
        assert!(too_early.is_empty());

        tokio::time::sleep(idle).await;
        let claimed = stream
            .claim_idle(STREAM, GROUP, "consumer-b", idle, 10)
            .await
            .unwrap();

        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, id);
        assert_eq!(
            stream.pending_info(STREAM, GROUP, &id).await,
            Some(("consumer-b".to_string(), 2))
        );

        // Claiming reset the idle clock.
        let again = stream
            .claim_idle(STREAM, GROUP, "consumer-c", idle, 10)
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_claim_respects_batch_size() {
        let stream = stream_with_group().await;
        for _ in 0..5 {
            stream.publish(STREAM, b"job").await.unwrap();
        }
        stream
            .read_group(STREAM, GROUP, "c1", 10, NO_WAIT)
            .await
            .unwrap();

        let claimed = stream
            .claim_idle(STREAM, GROUP, "c2", Duration::ZERO, 2)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].id, "1-0");
        assert_eq!(claimed[1].id, "2-0");
    }

    #[tokio::test]
    async fn test_ack_removes_from_pending() {
        let stream = stream_with_group().await;
        let a = stream.publish(STREAM, b"a").await.unwrap();
        let b = stream.publish(STREAM, b"b").await.unwrap();
        stream
            .read_group(STREAM, GROUP, "c1", 10, NO_WAIT)
            .await
            .unwrap();

        let acked = stream
            .ack(STREAM, GROUP, &[a.clone(), "99-0".to_string()])
            .await
            .unwrap();
        assert_eq!(acked, 1);
        assert_eq!(stream.pending_count(STREAM, GROUP).await, 1);
        assert!(stream.pending_info(STREAM, GROUP, &a).await.is_none());
        assert!(stream.pending_info(STREAM, GROUP, &b).await.is_some());

        // Acknowledged entries are never reclaimed.
        let claimed = stream
            .claim_idle(STREAM, GROUP, "c2", Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, b);
    }

    #[tokio::test]
    async fn test_max_len_trims_oldest_entries() {
        let stream = MemoryStream::with_max_len(2);
        stream.ensure_group(STREAM, GROUP).await.unwrap();
        for i in 0..4 {
            stream
                .publish(STREAM, format!("m{i}").as_bytes())
                .await
                .unwrap();
        }

        assert_eq!(stream.len(STREAM).await, 2);
        let entries = stream
            .read_group(STREAM, GROUP, "c1", 10, NO_WAIT)
            .await
            .unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["3-0", "4-0"]);
    }
}
