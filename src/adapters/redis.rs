// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis store adapter.
//!
//! Provides point lookups for seeding and the bulk `MGET` used by the polling
//! watcher, both over one multiplexed async connection.

use crate::domain::{ConfigError, Result};
use crate::ports::{Getter, MultiGet};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::fmt;

fn redis_error(message: &str, e: redis::RedisError) -> ConfigError {
    ConfigError::SourceError {
        source_name: "redis".to_string(),
        message: format!("{}: {}", message, e),
        source: Some(Box::new(e)),
    }
}

/// Values are read as raw bytes and decoded lossily, so a value that is not
/// valid UTF-8 never fails a lookup.
fn decode(value: Option<Vec<u8>>) -> Option<String> {
    value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Connection to a Redis server holding configuration keys.
///
/// Redis keeps no per-key revision, so [`Getter::get`] always reports version
/// `0`; the polling watcher keeps its own counters instead.
///
/// # Examples
///
/// ```rust,no_run
/// use harvestcfg::adapters::RedisStore;
/// use harvestcfg::ports::Getter;
///
/// # #[tokio::main]
/// # async fn main() -> harvestcfg::domain::Result<()> {
/// let store = RedisStore::connect("redis://127.0.0.1:6379").await?;
/// let (value, _version) = store.get("app:log-level").await?;
/// println!("{:?}", value);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Opens a multiplexed connection to `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client =
            Client::open(url).map_err(|e| redis_error("Failed to create Redis client", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| redis_error("Failed to connect to Redis", e))?;
        Ok(Self { conn })
    }

    /// Wraps an already established connection.
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl Getter for RedisStore {
    async fn get(&self, key: &str) -> Result<(Option<String>, u64)> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| redis_error("Failed to fetch value from Redis", e))?;
        Ok((decode(value), 0))
    }
}

#[async_trait]
impl MultiGet for RedisStore {
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut conn = self.conn.clone();
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("Failed to MGET keys", e))?;

        if values.len() != keys.len() {
            return Err(ConfigError::SourceError {
                source_name: "redis".to_string(),
                message: format!(
                    "MGET returned {} values for {} keys",
                    values.len(),
                    keys.len()
                ),
                source: None,
            });
        }
        Ok(values.into_iter().map(decode).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_is_lossy() {
        assert_eq!(decode(None), None);
        assert_eq!(decode(Some(b"3600".to_vec())), Some("3600".to_string()));
        assert_eq!(
            decode(Some(vec![b'a', 0xff, b'b'])),
            Some("a\u{FFFD}b".to_string())
        );
    }
}
