use serde::Deserialize;

use crate::shared::ValidationError;

/// Policy applied when the read path finds a cache entry.
///
/// `Trust` returns the cached value as-is and relies on periodic reconciliation
/// to correct drift. `VerifySource` re-derives the value from the database on
/// every hit and overwrites the entry on mismatch, which trades away most of
/// the cache's latency benefit and is intended for admin or debug surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheReadPolicy {
    Trust,
    VerifySource,
}

/// Tuning for the slot cache subsystem: population, write-path retries, and the
/// consistency reconciler.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SlotsConfig {
    /// Stable per-process identifier used as the leadership lock value.
    ///
    /// A random identifier is generated at startup when unset.
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Read-path policy on cache hit.
    #[serde(default = "default_read_policy")]
    pub read_policy: CacheReadPolicy,
    /// Number of entries written per pipelined batch during population.
    #[serde(default = "default_population_batch_size")]
    pub population_batch_size: usize,
    /// Pause, in milliseconds, between population batches.
    #[serde(default = "default_population_batch_pause_ms")]
    pub population_batch_pause_ms: u64,
    /// Maximum attempts for the write-path decrement.
    #[serde(default = "default_decrement_max_attempts")]
    pub decrement_max_attempts: u32,
    /// Base backoff, in milliseconds, between decrement attempts.
    #[serde(default = "default_decrement_backoff_ms")]
    pub decrement_backoff_ms: u64,
    /// Number of events verified per reconciler batch.
    #[serde(default = "default_reconcile_batch_size")]
    pub reconcile_batch_size: usize,
    /// Pause, in milliseconds, between reconciler batches.
    #[serde(default = "default_reconcile_batch_pause_ms")]
    pub reconcile_batch_pause_ms: u64,
    /// Maximum attempts to overwrite a divergent cache entry before it is
    /// invalidated instead.
    #[serde(default = "default_fix_max_attempts")]
    pub fix_max_attempts: u32,
    /// Base backoff, in milliseconds, between fix attempts.
    #[serde(default = "default_fix_backoff_ms")]
    pub fix_backoff_ms: u64,
    /// Interval, in seconds, between leadership checks of the reconciler loop.
    #[serde(default = "default_leader_poll_interval_secs")]
    pub leader_poll_interval_secs: u64,
}

impl SlotsConfig {
    pub const DEFAULT_POPULATION_BATCH_SIZE: usize = 100;
    pub const DEFAULT_POPULATION_BATCH_PAUSE_MS: u64 = 50;
    pub const DEFAULT_DECREMENT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_DECREMENT_BACKOFF_MS: u64 = 100;
    pub const DEFAULT_RECONCILE_BATCH_SIZE: usize = 50;
    pub const DEFAULT_RECONCILE_BATCH_PAUSE_MS: u64 = 100;
    pub const DEFAULT_FIX_MAX_ATTEMPTS: u32 = 2;
    pub const DEFAULT_FIX_BACKOFF_MS: u64 = 100;
    pub const DEFAULT_LEADER_POLL_INTERVAL_SECS: u64 = 60;

    /// Validates slot cache tuning settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.population_batch_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "slots.population_batch_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.reconcile_batch_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "slots.reconcile_batch_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.decrement_max_attempts == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "slots.decrement_max_attempts".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            read_policy: default_read_policy(),
            population_batch_size: default_population_batch_size(),
            population_batch_pause_ms: default_population_batch_pause_ms(),
            decrement_max_attempts: default_decrement_max_attempts(),
            decrement_backoff_ms: default_decrement_backoff_ms(),
            reconcile_batch_size: default_reconcile_batch_size(),
            reconcile_batch_pause_ms: default_reconcile_batch_pause_ms(),
            fix_max_attempts: default_fix_max_attempts(),
            fix_backoff_ms: default_fix_backoff_ms(),
            leader_poll_interval_secs: default_leader_poll_interval_secs(),
        }
    }
}

fn default_read_policy() -> CacheReadPolicy {
    CacheReadPolicy::Trust
}

fn default_population_batch_size() -> usize {
    SlotsConfig::DEFAULT_POPULATION_BATCH_SIZE
}

fn default_population_batch_pause_ms() -> u64 {
    SlotsConfig::DEFAULT_POPULATION_BATCH_PAUSE_MS
}

fn default_decrement_max_attempts() -> u32 {
    SlotsConfig::DEFAULT_DECREMENT_MAX_ATTEMPTS
}

fn default_decrement_backoff_ms() -> u64 {
    SlotsConfig::DEFAULT_DECREMENT_BACKOFF_MS
}

fn default_reconcile_batch_size() -> usize {
    SlotsConfig::DEFAULT_RECONCILE_BATCH_SIZE
}

fn default_reconcile_batch_pause_ms() -> u64 {
    SlotsConfig::DEFAULT_RECONCILE_BATCH_PAUSE_MS
}

fn default_fix_max_attempts() -> u32 {
    SlotsConfig::DEFAULT_FIX_MAX_ATTEMPTS
}

fn default_fix_backoff_ms() -> u64 {
    SlotsConfig::DEFAULT_FIX_BACKOFF_MS
}

fn default_leader_poll_interval_secs() -> u64 {
    SlotsConfig::DEFAULT_LEADER_POLL_INTERVAL_SECS
}
