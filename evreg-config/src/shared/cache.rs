use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

/// Connection configuration for the Redis slot cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Redis connection URL, e.g. `redis://localhost:6379`.
    ///
    /// Kept secret because managed Redis URLs embed credentials.
    pub url: SecretString,
    /// Maximum time, in milliseconds, to wait for a connection attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Base delay, in milliseconds, for exponential reconnect backoff.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Upper bound, in milliseconds, on the reconnect backoff delay.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Time-to-live, in seconds, applied to slot cache entries.
    #[serde(default = "default_entry_ttl_secs")]
    pub entry_ttl_secs: u64,
}

impl CacheConfig {
    /// Default connection timeout (10 seconds).
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

    /// Default base reconnect delay (100 milliseconds).
    pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 100;

    /// Default reconnect delay cap (30 seconds).
    pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;

    /// Default slot entry TTL (300 seconds).
    pub const DEFAULT_ENTRY_TTL_SECS: u64 = 300;

    /// Validates cache configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.entry_ttl_secs == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "cache.entry_ttl_secs".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "cache.reconnect_max_delay_ms".to_string(),
                constraint: "must be at least reconnect_base_delay_ms".to_string(),
            });
        }

        Ok(())
    }
}

fn default_connect_timeout_ms() -> u64 {
    CacheConfig::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_reconnect_base_delay_ms() -> u64 {
    CacheConfig::DEFAULT_RECONNECT_BASE_DELAY_MS
}

fn default_reconnect_max_delay_ms() -> u64 {
    CacheConfig::DEFAULT_RECONNECT_MAX_DELAY_MS
}

fn default_entry_ttl_secs() -> u64 {
    CacheConfig::DEFAULT_ENTRY_TTL_SECS
}
