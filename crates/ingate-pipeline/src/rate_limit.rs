//! Fixed-window rate limiting over a pluggable counter store.
//!
//! The limiter only needs "atomic increment with expiry" from its backing:
//! a process-local map for single-instance deployments, or Redis when
//! multiple gateway instances share a budget. A backing failure fails open
//! with a warning; availability wins over strict enforcement (see
//! DESIGN.md for the policy discussion).

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use ingate_core::{
    error::{CoreError, Result},
    models::{RateDecision, RatePolicy},
};
use redis::aio::ConnectionManager;
use tracing::warn;

/// A counter snapshot from one fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// The counter value after this increment.
    pub count: u64,

    /// When the window resets, epoch milliseconds.
    pub reset_at_ms: i64,
}

/// Atomic increment-with-expiry contract the limiter runs on.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Increments the counter for `key`, creating a fresh window when the
    /// previous one has elapsed.
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount>;
}

/// Process-local counter store backed by a mutex-guarded map.
///
/// Suitable for single-instance deployments and tests; counters are lost on
/// restart, which only ever under-counts.
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, (u64, i64)>>,
}

impl MemoryCounterStore {
    /// Creates an empty counter store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);

        let mut windows = self
            .windows
            .lock()
            .map_err(|_| CoreError::BackendUnavailable("counter map poisoned".to_string()))?;

        let entry = windows.entry(key.to_string()).or_insert((0, now_ms));
        if now_ms - entry.1 > window_ms {
            *entry = (0, now_ms);
        }
        entry.0 += 1;

        Ok(WindowCount { count: entry.0, reset_at_ms: entry.1 + window_ms })
    }
}

/// Shared counter store backed by Redis.
///
/// Uses INCR plus PTTL in one pipeline and stamps the expiry on first use of
/// a window, matching the atomic increment-with-expiry contract across many
/// gateway instances.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisCounterStore {
    /// Creates a counter store over an established connection manager.
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection, key_prefix: "rate:".to_string() }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let redis_key = self.key(key);
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let mut conn = self.connection.clone();

        let (count, mut ttl_ms): (u64, i64) = redis::pipe()
            .atomic()
            .incr(&redis_key, 1u64)
            .pttl(&redis_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CoreError::BackendUnavailable(format!("redis increment failed: {e}")))?;

        // A fresh key has no expiry yet (PTTL returns -1); stamp the window.
        if ttl_ms <= 0 {
            let _: () = redis::cmd("PEXPIRE")
                .arg(&redis_key)
                .arg(window_ms)
                .query_async(&mut conn)
                .await
                .map_err(|e| CoreError::BackendUnavailable(format!("redis expire failed: {e}")))?;
            ttl_ms = window_ms;
        }

        Ok(WindowCount { count, reset_at_ms: Utc::now().timestamp_millis() + ttl_ms })
    }
}

/// Fixed-window rate limiter.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    default_policy: RatePolicy,
}

impl RateLimiter {
    /// Creates a limiter over the given counter store.
    pub fn new(store: Arc<dyn CounterStore>, default_policy: RatePolicy) -> Self {
        Self { store, default_policy }
    }

    /// The policy applied when a principal carries no override.
    pub fn default_policy(&self) -> RatePolicy {
        self.default_policy
    }

    /// Increments the window for `key` and decides whether the request fits.
    ///
    /// `remaining` and `reset_at_ms` are always populated so callers can set
    /// the standard rate-limit response headers. A backing failure allows
    /// the request through with a warning rather than rejecting it.
    pub async fn check(&self, key: &str, policy: Option<RatePolicy>) -> RateDecision {
        let policy = policy.unwrap_or(self.default_policy);
        let window = Duration::from_secs(u64::from(policy.window_secs));

        match self.store.increment(key, window).await {
            Ok(count) => {
                let limit = u64::from(policy.limit);
                let remaining = limit.saturating_sub(count.count);
                RateDecision {
                    allowed: count.count <= limit,
                    limit: policy.limit,
                    remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
                    reset_at_ms: count.reset_at_ms,
                }
            },
            Err(e) => {
                warn!(key, error = %e, "rate limiter backend failed, allowing request");
                RateDecision {
                    allowed: true,
                    limit: policy.limit,
                    remaining: policy.limit.saturating_sub(1),
                    reset_at_ms: Utc::now().timestamp_millis()
                        + i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
                }
            },
        }
    }
}
