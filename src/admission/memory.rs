//! In-process counter store.
//!
//! Mirrors the Redis semantics the gate relies on (lazy expiry, INCR on absent
//! keys, all-or-nothing batches) against an injectable [`Clock`], so expiry can
//! be exercised without waiting. It also records every operation and can be
//! switched into an outage mode.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::clock::{Clock, SystemClock};
use super::store::{CounterStore, CounterUpdate, Expiry, StoreError, StoreResult};

/// A store operation as observed by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Exists(String),
    Get(String),
    Set(String),
    Increment(String),
    Batch(Vec<String>),
    Ping,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory [`CounterStore`].
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
    ops: Mutex<Vec<StoreOp>>,
}

impl MemoryStore {
    /// Create a store that reads time from the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
            ops: Mutex::new(Vec::new()),
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Write a raw value, bypassing the operation log.
    pub fn seed(&self, key: &str, value: &str, expiry: Option<Expiry>) {
        let now = self.clock.now();
        let entry = Entry {
            value: value.to_string(),
            expires_at: expiry.map(|e| resolve_expiry(now, e)),
        };
        self.entries.write().insert(key.to_string(), entry);
    }

    /// Read a live raw value, bypassing the operation log.
    pub fn peek(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        self.entries
            .read()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    /// Expiry instant of a live key, if it has one.
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.entries
            .read()
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
    }

    /// Operations recorded since creation or the last [`MemoryStore::clear_operations`].
    pub fn operations(&self) -> Vec<StoreOp> {
        self.ops.lock().clone()
    }

    pub fn clear_operations(&self) {
        self.ops.lock().clear();
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, op: StoreOp) -> StoreResult<()> {
        self.ops.lock().push(op);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    /// Current integer value of a live key, purging it if expired.
    fn live_count(
        entries: &mut HashMap<String, Entry>,
        key: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<u64>> {
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => parse_count(key, &entry.value).map(Some),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_count(key: &str, value: &str) -> StoreResult<u64> {
    value.parse::<u64>().map_err(|_| StoreError::Malformed {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn resolve_expiry(now: DateTime<Utc>, expiry: Expiry) -> DateTime<Utc> {
    match expiry {
        Expiry::After(ttl) => {
            now + chrono::Duration::seconds(ttl.as_secs() as i64)
                + chrono::Duration::nanoseconds(i64::from(ttl.subsec_nanos()))
        }
        Expiry::At(at) => at,
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.record(StoreOp::Exists(key.to_string()))?;
        Ok(self.peek(key).is_some())
    }

    async fn get_count(&self, key: &str) -> StoreResult<Option<u64>> {
        self.record(StoreOp::Get(key.to_string()))?;
        let now = self.clock.now();
        let mut entries = self.entries.write();
        Self::live_count(&mut entries, key, now)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.record(StoreOp::Set(key.to_string()))?;
        self.seed(key, value, Some(Expiry::After(ttl)));
        Ok(())
    }

    async fn increment(&self, key: &str) -> StoreResult<u64> {
        self.record(StoreOp::Increment(key.to_string()))?;
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let next = Self::live_count(&mut entries, key, now)?.unwrap_or(0) + 1;
        let expires_at = entries.get(key).and_then(|e| e.expires_at);
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn increment_batch(&self, updates: &[CounterUpdate]) -> StoreResult<Vec<u64>> {
        self.record(StoreOp::Batch(
            updates.iter().map(|u| u.key.clone()).collect(),
        ))?;
        let now = self.clock.now();
        let mut entries = self.entries.write();

        // Validate every key before touching any of them.
        let mut current = Vec::with_capacity(updates.len());
        for update in updates {
            current.push(Self::live_count(&mut entries, &update.key, now)?.unwrap_or(0));
        }

        let mut results = Vec::with_capacity(updates.len());
        for (update, count) in updates.iter().zip(current) {
            let next = count + 1;
            let expires_at = resolve_expiry(now, update.expiry);
            if expires_at <= now {
                entries.remove(&update.key);
            } else {
                entries.insert(
                    update.key.clone(),
                    Entry {
                        value: next.to_string(),
                        expires_at: Some(expires_at),
                    },
                );
            }
            results.push(next);
        }
        Ok(results)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.record(StoreOp::Ping)
    }
}
