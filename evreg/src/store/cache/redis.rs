use std::time::Duration;

use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use ::redis::{AsyncCommands, Client};
use evreg_config::shared::CacheConfig;
use secrecy::ExposeSecret;

use crate::error::{ErrorKind, EvregResult};
use crate::evreg_error;
use crate::store::cache::SlotCache;

/// Redis time-to-live answer for a key that does not exist.
const TTL_KEY_MISSING: i64 = -2;

/// Redis time-to-live answer for a key without expiry.
const TTL_NO_EXPIRY: i64 = -1;

/// Redis-backed slot cache.
///
/// Wraps a [`ConnectionManager`], which multiplexes one connection across
/// clones and reconnects with capped exponential backoff when it drops. The
/// manager is created eagerly in [`RedisSlotCache::connect`] so a misconfigured
/// cache URL fails at startup, not on the first request; connections are
/// released when the last clone is dropped.
#[derive(Clone)]
pub struct RedisSlotCache {
    conn: ConnectionManager,
}

impl RedisSlotCache {
    /// Connects to Redis using the configured URL, connect timeout, and
    /// reconnect backoff.
    pub async fn connect(config: &CacheConfig) -> EvregResult<Self> {
        let client = Client::open(config.url.expose_secret().as_str()).map_err(|err| {
            evreg_error!(
                ErrorKind::ConfigError,
                "Invalid cache URL",
                source: err
            )
        })?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_millis(config.connect_timeout_ms))
            .set_factor(config.reconnect_base_delay_ms)
            .set_exponent_base(2)
            .set_max_delay(config.reconnect_max_delay_ms);

        let conn = ConnectionManager::new_with_config(client, manager_config).await?;

        Ok(Self { conn })
    }
}

impl SlotCache for RedisSlotCache {
    async fn get(&self, key: &str) -> EvregResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;

        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> EvregResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;

        Ok(())
    }

    async fn put_forever(&self, key: &str, value: &str) -> EvregResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;

        Ok(())
    }

    async fn put_many(&self, entries: &[(String, String)], ttl_secs: u64) -> EvregResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let mut pipe = ::redis::pipe();
        for (key, value) in entries {
            pipe.set_ex(key, value, ttl_secs).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> EvregResult<bool> {
        let mut conn = self.conn.clone();
        // SET NX EX answers OK when the value was stored and nil when the key
        // already existed.
        let response: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;

        Ok(response.is_some())
    }

    async fn delete(&self, key: &str) -> EvregResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;

        Ok(())
    }

    async fn ttl(&self, key: &str) -> EvregResult<Option<u64>> {
        let mut conn = self.conn.clone();
        let ttl: i64 = conn.ttl(key).await?;

        match ttl {
            TTL_KEY_MISSING | TTL_NO_EXPIRY => Ok(None),
            secs => Ok(Some(secs as u64)),
        }
    }

    async fn ping(&self) -> EvregResult<()> {
        let mut conn = self.conn.clone();
        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;

        Ok(())
    }
}
