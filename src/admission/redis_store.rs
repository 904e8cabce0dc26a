//! Redis-backed counter store.
//!
//! Uses a multiplexed `ConnectionManager`, which reconnects on its own with a
//! bounded retry budget. Admission batches run as a MULTI/EXEC pipeline so the
//! increments and expiries land together or not at all.

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use super::store::{CounterStore, CounterUpdate, Expiry, StoreError, StoreResult};
use crate::config::StoreConfig;

/// Redis implementation of [`CounterStore`].
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Open a managed connection using the store configuration.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the first connection fails.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.connect_timeout())
            .set_response_timeout(config.response_timeout())
            .set_number_of_retries(config.max_retries);

        let connection = ConnectionManager::new_with_config(client, manager_config).await?;

        info!(
            connect_timeout_ms = config.connect_timeout_ms,
            response_timeout_ms = config.response_timeout_ms,
            max_retries = config.max_retries,
            "Redis connection manager ready"
        );

        Ok(Self { connection })
    }
}

fn parse_count(key: &str, value: String) -> StoreResult<u64> {
    value
        .parse::<u64>()
        .map_err(|_| StoreError::Malformed {
            key: key.to_string(),
            value,
        })
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let present: bool = conn.exists(key).await?;
        Ok(present)
    }

    async fn get_count(&self, key: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(key).await?;
        raw.map(|value| parse_count(key, value)).transpose()
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn increment(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.connection.clone();
        let count: u64 = conn.incr(key, 1u64).await?;
        Ok(count)
    }

    async fn increment_batch(&self, updates: &[CounterUpdate]) -> StoreResult<Vec<u64>> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for update in updates {
            pipe.incr(&update.key, 1u64);
            match update.expiry {
                Expiry::After(ttl) => {
                    pipe.expire(&update.key, ttl.as_secs() as i64).ignore();
                }
                Expiry::At(at) => {
                    pipe.expire_at(&update.key, at.timestamp()).ignore();
                }
            }
        }

        let mut conn = self.connection.clone();
        let counts: Vec<u64> = pipe.query_async(&mut conn).await?;

        debug!(keys = updates.len(), "Applied counter batch");
        Ok(counts)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
