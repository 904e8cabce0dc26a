//! Counter store capability used by the admission gate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a counter store.
///
/// "Key not found" is never an error: reads return `Ok(None)` for absent keys.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The round trip did not complete in time
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A counter key held something other than an integer
    #[error("malformed value at {key}: {value:?}")]
    Malformed { key: String, value: String },

    /// Errors reported by the Redis client
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// When a key should expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Relative TTL, restarted each time it is applied
    After(Duration),
    /// Absolute instant; applying it again is idempotent
    At(DateTime<Utc>),
}

/// One increment-and-expire step inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterUpdate {
    pub key: String,
    pub expiry: Expiry,
}

impl CounterUpdate {
    pub fn new(key: impl Into<String>, expiry: Expiry) -> Self {
        Self {
            key: key.into(),
            expiry,
        }
    }
}

/// Shared key-value store with per-key expiry and atomic increments.
///
/// Implementations must make each increment atomic and must apply
/// [`CounterStore::increment_batch`] all-or-nothing.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Whether a key is present.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Read an integer counter. `Ok(None)` means the key is absent.
    async fn get_count(&self, key: &str) -> StoreResult<Option<u64>>;

    /// Write a value with a relative TTL.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Atomically increment a counter, creating it at zero if absent.
    async fn increment(&self, key: &str) -> StoreResult<u64>;

    /// Increment every key and apply its expiry as one atomic unit.
    ///
    /// Returns the new counter values in input order.
    async fn increment_batch(&self, updates: &[CounterUpdate]) -> StoreResult<Vec<u64>>;

    /// Liveness probe.
    async fn ping(&self) -> StoreResult<()>;
}
