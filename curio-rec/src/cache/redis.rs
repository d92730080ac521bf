//! Redis cache store
//!
//! Shared backend for deployments running more than one process. Batched
//! operations map onto single commands (`MGET`, `DEL`) or pipelines so each
//! trait call stays one round trip. The multiplexed connection is opened on
//! first use and shared by every caller.

use super::store::CacheStore;
use crate::types::CacheError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Keys requested per `SCAN` step
const SCAN_BATCH: usize = 500;

pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisStore {
    /// Parse `url` without connecting
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(backend)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                debug!("Opening Redis connection");
                self.client.get_multiplexed_async_connection().await
            })
            .await
            .map_err(backend)?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(values)
    }

    async fn set_many(
        &self,
        entries: Vec<(String, String)>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            let cmd = pipe.cmd("SET").arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(expiry_millis(ttl));
            }
            cmd.ignore();
        }

        let mut conn = self.connection().await?;
        let _: () = pipe.query_async(&mut conn).await.map_err(backend)?;
        Ok(())
    }

    async fn set_many_if_absent(
        &self,
        entries: Vec<(String, String)>,
        ttl: Option<Duration>,
    ) -> Result<Vec<bool>, CacheError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            let cmd = pipe.cmd("SET").arg(key).arg(value).arg("NX");
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(expiry_millis(ttl));
            }
        }

        let mut conn = self.connection().await?;
        let replies: Vec<Value> = pipe.query_async(&mut conn).await.map_err(backend)?;
        // NX replies OK when written and nil when the key already existed
        Ok(replies.into_iter().map(|r| !matches!(r, Value::Nil)).collect())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let deleted: usize = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(deleted)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let pattern = scan_pattern(prefix);
        let mut conn = self.connection().await?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once across steps
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn idle_times(&self, keys: &[String]) -> Result<Vec<Option<Duration>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("OBJECT").arg("IDLETIME").arg(key);
        }

        let mut conn = self.connection().await?;
        let idle: Vec<Option<u64>> = pipe.query_async(&mut conn).await.map_err(backend)?;
        Ok(idle.into_iter().map(|secs| secs.map(Duration::from_secs)).collect())
    }

    async fn used_memory(&self) -> Result<u64, CacheError> {
        let mut conn = self.connection().await?;
        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        parse_used_memory(&info)
            .ok_or_else(|| CacheError::Backend("INFO memory reply has no used_memory field".to_string()))
    }
}

fn backend(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

/// Expiry in whole milliseconds; Redis rejects a zero expiry
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// `MATCH` pattern for keys starting with `prefix`, glob characters escaped
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// Extract `used_memory` (bytes) from an `INFO memory` reply
fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("used_memory:"))
        .and_then(|value| value.trim().parse().ok())
}
