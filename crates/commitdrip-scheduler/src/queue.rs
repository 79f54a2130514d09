//! Job queue implementations.
//!
//! Redis lists back the durable queue: producers `RPUSH`, the worker `BLPOP`s.
//! Delivery is at-least-once and carries only job identifiers.

use async_trait::async_trait;
use commitdrip_core::{Error, JobId, JobQueue, Result};
use redis::aio::MultiplexedConnection;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

/// Slack on top of the blocking wait before the client gives up on a reply.
const RESPONSE_TIMEOUT_GRACE: Duration = Duration::from_secs(2);

/// Queue backed by a Redis list.
pub struct RedisJobQueue {
    client: redis::Client,
    key: String,
    config: redis::AsyncConnectionConfig,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisJobQueue {
    /// Create a queue on `key`. `max_block` is the longest blocking pop that
    /// will be issued; replies are awaited that long plus a grace period.
    ///
    /// No connection is made until the first operation.
    pub fn new(url: &str, key: impl Into<String>, max_block: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Queue(format!("invalid redis url: {}", e)))?;
        let config = redis::AsyncConnectionConfig::new()
            .set_response_timeout(Some(max_block.saturating_add(RESPONSE_TIMEOUT_GRACE)));

        Ok(Self {
            client,
            key: key.into(),
            config,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection_with_config(&self.config)
            .await
            .map_err(|e| Error::Queue(format!("failed to connect to redis: {}", e)))?;
        debug!(key = %self.key, "Connected to redis");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the cached connection so the next call reconnects.
    async fn reset(&self) {
        *self.connection.lock().await = None;
    }

    async fn on_error(&self, action: &str, e: redis::RedisError) -> Error {
        if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
            self.reset().await;
        }
        Error::Queue(format!("{} failed: {}", action, e))
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, id: JobId) -> Result<()> {
        let mut conn = self.connection().await?;
        let pushed: redis::RedisResult<i64> = redis::cmd("RPUSH")
            .arg(&self.key)
            .arg(id.to_string())
            .query_async(&mut conn)
            .await;

        match pushed {
            Ok(len) => {
                debug!(job_id = %id, queue_len = len, "Enqueued job");
                Ok(())
            }
            Err(e) => Err(self.on_error("RPUSH", e).await),
        }
    }

    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<JobId>> {
        let mut conn = self.connection().await?;
        // BLPOP takes whole seconds; zero would block forever.
        let secs = timeout.as_secs().max(1);
        let popped: redis::RedisResult<Option<(String, String)>> = redis::cmd("BLPOP")
            .arg(&self.key)
            .arg(secs)
            .query_async(&mut conn)
            .await;

        match popped {
            Ok(None) => Ok(None),
            Ok(Some((_, raw))) => match raw.parse::<JobId>() {
                Ok(id) => Ok(Some(id)),
                Err(e) => {
                    warn!(payload = %raw, error = %e, "Dropping malformed queue entry");
                    Ok(None)
                }
            },
            Err(e) => Err(self.on_error("BLPOP", e).await),
        }
    }
}

/// In-process queue for tests and single-process runs.
///
/// Can be switched offline to simulate an unreachable backend.
#[derive(Default)]
pub struct MemoryJobQueue {
    items: Mutex<VecDeque<JobId>>,
    ready: Notify,
    offline: AtomicBool,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Queued identifiers, head first.
    pub async fn snapshot(&self) -> Vec<JobId> {
        self.items.lock().await.iter().copied().collect()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Queue("queue is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn push(&self, id: JobId) -> Result<()> {
        self.check_online()?;
        self.items.lock().await.push_back(id);
        self.ready.notify_one();
        Ok(())
    }

    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<JobId>> {
        self.check_online()?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(id) = self.items.lock().await.pop_front() {
                return Ok(Some(id));
            }
            if tokio::time::timeout_at(deadline, self.ready.notified())
                .await
                .is_err()
            {
                return Ok(self.items.lock().await.pop_front());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_queue_is_fifo() {
        let queue = MemoryJobQueue::new();
        let (a, b) = (JobId::new(), JobId::new());
        queue.push(a).await.unwrap();
        queue.push(b).await.unwrap();

        let timeout = Duration::from_millis(10);
        assert_eq!(queue.blocking_pop(timeout).await.unwrap(), Some(a));
        assert_eq!(queue.blocking_pop(timeout).await.unwrap(), Some(b));
        assert_eq!(queue.blocking_pop(timeout).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_queue_wakes_blocked_consumer() {
        let queue = Arc::new(MemoryJobQueue::new());
        let id = JobId::new();

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.blocking_pop(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(id).await.unwrap();

        assert_eq!(consumer.await.unwrap().unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_offline_memory_queue_reports_queue_error() {
        let queue = MemoryJobQueue::new();
        queue.set_offline(true);
        assert!(matches!(queue.push(JobId::new()).await, Err(Error::Queue(_))));
        assert!(matches!(
            queue.blocking_pop(Duration::from_millis(1)).await,
            Err(Error::Queue(_))
        ));

        queue.set_offline(false);
        queue.push(JobId::new()).await.unwrap();
        assert_eq!(queue.len().await, 1);
    }

    #[test]
    fn test_invalid_redis_url_is_rejected() {
        let err = RedisJobQueue::new("not a url", "k", Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Queue(_)));
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_queue_error() {
        let queue =
            RedisJobQueue::new("redis://127.0.0.1:1/", "commitdrip:test", Duration::from_secs(1))
                .unwrap();
        let err = queue.push(JobId::new()).await.unwrap_err();
        assert!(matches!(err, Error::Queue(_)));
    }

    #[tokio::test]
    #[ignore = "requires a running redis at REDIS_URL"]
    async fn test_redis_push_then_pop() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let key = format!("commitdrip:test:{}", JobId::new());
        let queue = RedisJobQueue::new(&url, key, Duration::from_secs(1)).unwrap();

        let id = JobId::new();
        queue.push(id).await.unwrap();
        assert_eq!(
            queue.blocking_pop(Duration::from_secs(1)).await.unwrap(),
            Some(id)
        );
        assert_eq!(queue.blocking_pop(Duration::from_secs(1)).await.unwrap(), None);
    }
}
