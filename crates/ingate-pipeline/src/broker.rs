//! Downstream broker contract and the Redis Streams implementation.
//!
//! Delivery is at-least-once: a publish that times out after the broker
//! accepted it may be retried by the caller, and consumers deduplicate on
//! `event_id`. Entries are keyed by subject so a consumer reading one stream
//! observes a subject's events in publish order.

use async_trait::async_trait;
use ingate_core::{
    error::{CoreError, Result},
    models::CommitRecord,
};
use redis::aio::ConnectionManager;

/// Publish contract for committed events.
#[async_trait]
pub trait EventBroker: Send + Sync + 'static {
    /// Publishes a committed record to the named channel.
    ///
    /// `key` is the partition/grouping key; implementations must preserve
    /// per-key publish order.
    async fn publish(&self, channel: &str, key: &str, record: &CommitRecord) -> Result<()>;
}

/// Broker over Redis Streams.
///
/// Each channel maps to one stream; `XADD` appends in arrival order, which
/// preserves per-subject order since all of a subject's events land on the
/// same stream.
#[derive(Clone)]
pub struct RedisStreamBroker {
    connection: ConnectionManager,
}

impl RedisStreamBroker {
    /// Creates a broker over an established connection manager.
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl EventBroker for RedisStreamBroker {
    async fn publish(&self, channel: &str, key: &str, record: &CommitRecord) -> Result<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| CoreError::InvalidInput(format!("record serialization failed: {e}")))?;
        let mut conn = self.connection.clone();

        let _: String = redis::cmd("XADD")
            .arg(channel)
            .arg("*")
            .arg("key")
            .arg(key)
            .arg("event_id")
            .arg(record.event_id.to_string())
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| CoreError::BackendUnavailable(format!("stream publish failed: {e}")))?;

        Ok(())
    }
}
