//! Redis Streams backend.

use super::{
    PAYLOAD_FIELD, QueueError, StreamBroker, StreamEntry, StreamProducer, check_publish_args,
};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::{AsyncConnectionConfig, Client, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Appends entries with `XADD`, optionally trimming with `MAXLEN ~`.
#[derive(Clone)]
pub struct RedisStreamProducer {
    conn: ConnectionManager,
    max_len: Option<usize>,
}

impl RedisStreamProducer {
    pub fn new(conn: ConnectionManager, max_len: Option<usize>) -> Self {
        Self { conn, max_len }
    }
}

#[async_trait]
impl StreamProducer for RedisStreamProducer {
    async fn publish(&self, stream: &str, payload: &[u8]) -> Result<String, QueueError> {
        check_publish_args(stream, payload)?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream);
        if let Some(max_len) = self.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*").arg(PAYLOAD_FIELD).arg(payload);

        let mut conn = self.conn.clone();
        let id: String = cmd.query_async(&mut conn).await?;

        debug!(stream, entry_id = %id, "Entry published");
        Ok(id)
    }
}

/// Consumer-group operations over Redis Streams.
///
/// `XREADGROUP ... BLOCK` holds its connection for the whole wait, so blocking
/// reads go through a dedicated connection while acknowledgements and claims
/// share the [`ConnectionManager`].
pub struct RedisStreamBroker {
    client: Client,
    conn: ConnectionManager,
    blocking: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStreamBroker {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Broker`] if the URL is invalid or the server is unreachable.
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;

        info!("✓ Redis stream broker connected");
        Ok(Self {
            client,
            conn,
            blocking: Mutex::new(None),
        })
    }

    /// Shared connection, also usable by a producer or cache.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn blocking_connection(&self) -> Result<MultiplexedConnection, QueueError> {
        let mut slot = self.blocking.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        // A blocked XREADGROUP outlives the client's default response timeout.
        let config = AsyncConnectionConfig::new().set_response_timeout(None);
        let conn = self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn reset_blocking_connection(&self) {
        self.blocking.lock().await.take();
    }
}

#[async_trait]
impl StreamBroker for RedisStreamBroker {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => {
                info!(stream, group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream, group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, QueueError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count.max(1));
        // BLOCK 0 waits forever in Redis; a zero duration means "don't wait".
        if !block.is_zero() {
            cmd.arg("BLOCK").arg(block.as_millis() as u64);
        }
        cmd.arg("STREAMS").arg(stream).arg(">");

        let mut conn = self.blocking_connection().await?;
        let reply: Option<StreamReadReply> = match cmd.query_async(&mut conn).await {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_io_error() {
                    self.reset_blocking_connection().await;
                }
                return Err(e.into());
            }
        };

        Ok(reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(entry_from)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, QueueError> {
        let min_idle_ms = min_idle.as_millis() as u64;
        let mut conn = self.conn.clone();

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        // XCLAIM re-checks the idle time, so an entry taken by another
        // consumer in between is skipped rather than stolen twice.
        let mut claim = redis::cmd("XCLAIM");
        claim.arg(stream).arg(group).arg(consumer).arg(min_idle_ms);
        for p in &pending.ids {
            claim.arg(&p.id);
        }

        let claimed: StreamClaimReply = claim.query_async(&mut conn).await?;
        if claimed.ids.len() < pending.ids.len() {
            warn!(
                stream,
                group,
                listed = pending.ids.len(),
                claimed = claimed.ids.len(),
                "Some idle entries were not claimed"
            );
        }

        Ok(claimed.ids.into_iter().map(entry_from).collect())
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, QueueError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let acked: u64 = redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(ids)
            .query_async(&mut conn)
            .await?;
        Ok(acked)
    }
}

fn entry_from(raw: StreamId) -> StreamEntry {
    let fields = raw
        .map
        .into_iter()
        .filter_map(|(field, value)| value_bytes(value).map(|bytes| (field, bytes)))
        .collect();
    StreamEntry::new(raw.id, fields)
}

fn value_bytes(value: Value) -> Option<Vec<u8>> {
    match value {
        Value::BulkString(bytes) => Some(bytes),
        Value::SimpleString(s) => Some(s.into_bytes()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_bytes_accepts_string_replies() {
        assert_eq!(
            value_bytes(Value::BulkString(b"{}".to_vec())),
            Some(b"{}".to_vec())
        );
        assert_eq!(
            value_bytes(Value::SimpleString("ok".into())),
            Some(b"ok".to_vec())
        );
        assert_eq!(value_bytes(Value::Int(1)), None);
        assert_eq!(value_bytes(Value::Nil), None);
    }

    /// Reads one RESP array command and returns its arguments.
    async fn read_command(
        reader: &mut tokio::io::BufReader<tokio::net::TcpStream>,
    ) -> Option<Vec<String>> {
        use tokio::io::{AsyncBufReadExt, AsyncReadExt};

        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        let argc: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            line.clear();
            reader.read_line(&mut line).await.ok()?;
            let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
            let mut buf = vec![0u8; len + 2];
            reader.read_exact(&mut buf).await.ok()?;
            buf.truncate(len);
            args.push(String::from_utf8_lossy(&buf).into_owned());
        }
        Some(args)
    }

    /// Minimal RESP server: XREADGROUP waits out its BLOCK and answers nil,
    /// everything else answers `+OK`.
    async fn spawn_blocking_server() -> String {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut reader = tokio::io::BufReader::new(socket);
                    while let Some(args) = read_command(&mut reader).await {
                        let reply: &[u8] = if args[0].eq_ignore_ascii_case("XREADGROUP") {
                            let block_ms = args
                                .iter()
                                .position(|a| a.eq_ignore_ascii_case("BLOCK"))
                                .and_then(|i| args.get(i + 1))
                                .and_then(|ms| ms.parse().ok())
                                .unwrap_or(0);
                            tokio::time::sleep(Duration::from_millis(block_ms)).await;
                            b"*-1\r\n"
                        } else {
                            b"+OK\r\n"
                        };
                        if reader.get_mut().write_all(reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        format!("redis://{addr}/0")
    }

    #[tokio::test]
    async fn test_read_group_waits_out_long_block() {
        let url = spawn_blocking_server().await;
        let broker = RedisStreamBroker::connect(&url).await.unwrap();

        let started = std::time::Instant::now();
        let entries = broker
            .read_group("s", "g", "c", 1, Duration::from_millis(1500))
            .await
            .unwrap();

        assert!(entries.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".to_string())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_group_roundtrip() {
        let broker = RedisStreamBroker::connect(&redis_url()).await.unwrap();
        let producer = RedisStreamProducer::new(broker.connection(), Some(1000));

        let stream = format!("test-stream-{}", rand::random::<u32>());
        broker.ensure_group(&stream, "g").await.unwrap();
        broker.ensure_group(&stream, "g").await.unwrap();

        let id = producer.publish(&stream, b"hello").await.unwrap();
        let entries = broker
            .read_group(&stream, "g", "c1", 10, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].fields[PAYLOAD_FIELD], b"hello".to_vec());

        let claimed = broker
            .claim_idle(&stream, "g", "c2", Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);

        assert_eq!(broker.ack(&stream, "g", &[id]).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_idle_read_returns_empty() {
        let broker = RedisStreamBroker::connect(&redis_url()).await.unwrap();
        let stream = format!("test-stream-{}", rand::random::<u32>());
        broker.ensure_group(&stream, "g").await.unwrap();

        let entries = broker
            .read_group(&stream, "g", "c1", 10, Duration::from_millis(1500))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }
}
