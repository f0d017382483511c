use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{ErrorKind, EvregResult};
use crate::evreg_error;
use crate::store::cache::SlotCache;

/// One stored value with its expiry deadline, if any.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
    /// TTL the entry was stored with, kept so tests can assert on it.
    ttl_secs: Option<u64>,
}

/// Inner state of [`MemorySlotCache`].
#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// When set, every operation fails as if the store were unreachable.
    unreachable: bool,
    /// Number of upcoming write operations that fail with a transient error.
    failing_writes: u32,
    /// Per-key budgets of write operations that fail with a transient error.
    failing_writes_by_key: HashMap<String, u32>,
}

/// In-memory slot cache for tests and local development.
///
/// Implements the full [`SlotCache`] contract including TTL expiry (against
/// the tokio clock, so paused-time tests can fast-forward it) and supports
/// injecting failures: a whole-store unreachable mode and a budget of
/// transient write failures for exercising retry paths.
#[derive(Debug, Clone, Default)]
pub struct MemorySlotCache {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySlotCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail as if the store were down.
    pub async fn set_unreachable(&self, unreachable: bool) {
        let mut inner = self.inner.lock().await;
        inner.unreachable = unreachable;
    }

    /// Makes the next `count` write operations fail with a transient error.
    pub async fn fail_next_writes(&self, count: u32) {
        let mut inner = self.inner.lock().await;
        inner.failing_writes = count;
    }

    /// Makes the next `count` write operations touching `key` fail with a
    /// transient error. Writes to other keys are unaffected.
    pub async fn fail_next_writes_to(&self, key: &str, count: u32) {
        let mut inner = self.inner.lock().await;
        inner.failing_writes_by_key.insert(key.to_string(), count);
    }

    /// Returns the TTL the live entry under `key` was stored with, [`None`]
    /// when the key is absent or was stored without expiry.
    pub async fn stored_ttl_secs(&self, key: &str) -> Option<u64> {
        let mut inner = self.inner.lock().await;
        Self::expire(&mut inner);
        inner.entries.get(key).and_then(|entry| entry.ttl_secs)
    }

    /// Returns the number of live entries.
    pub async fn len(&self) -> usize {
        let mut inner = self.inner.lock().await;
        Self::expire(&mut inner);
        inner.entries.len()
    }

    /// Returns whether the cache holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn expire(inner: &mut Inner) {
        let now = Instant::now();
        inner
            .entries
            .retain(|_, entry| entry.expires_at.is_none_or(|at| at > now));
    }

    fn check_reachable(inner: &Inner) -> EvregResult<()> {
        if inner.unreachable {
            return Err(evreg_error!(
                ErrorKind::CacheConnectionFailed,
                "Cache store is unreachable"
            ));
        }

        Ok(())
    }

    fn check_write(inner: &mut Inner, keys: &[&str]) -> EvregResult<()> {
        Self::check_reachable(inner)?;

        if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            return Err(evreg_error!(
                ErrorKind::CacheOperationFailed,
                "Injected transient write failure"
            ));
        }

        for key in keys {
            if let Some(budget) = inner.failing_writes_by_key.get_mut(*key) {
                if *budget > 0 {
                    *budget -= 1;
                    return Err(evreg_error!(
                        ErrorKind::CacheOperationFailed,
                        "Injected transient write failure"
                    ));
                }
            }
        }

        Ok(())
    }

    fn entry(value: &str, ttl_secs: Option<u64>) -> Entry {
        Entry {
            value: value.to_string(),
            expires_at: ttl_secs
                .map(|secs| Instant::now() + std::time::Duration::from_secs(secs)),
            ttl_secs,
        }
    }
}

impl SlotCache for MemorySlotCache {
    async fn get(&self, key: &str) -> EvregResult<Option<String>> {
        let mut inner = self.inner.lock().await;
        Self::check_reachable(&inner)?;
        Self::expire(&mut inner);

        Ok(inner.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> EvregResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check_write(&mut inner, &[key])?;

        inner
            .entries
            .insert(key.to_string(), Self::entry(value, Some(ttl_secs)));

        Ok(())
    }

    async fn put_forever(&self, key: &str, value: &str) -> EvregResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check_write(&mut inner, &[key])?;

        inner.entries.insert(key.to_string(), Self::entry(value, None));

        Ok(())
    }

    async fn put_many(&self, entries: &[(String, String)], ttl_secs: u64) -> EvregResult<()> {
        let mut inner = self.inner.lock().await;
        let keys: Vec<&str> = entries.iter().map(|(key, _)| key.as_str()).collect();
        Self::check_write(&mut inner, &keys)?;

        for (key, value) in entries {
            inner
                .entries
                .insert(key.clone(), Self::entry(value, Some(ttl_secs)));
        }

        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> EvregResult<bool> {
        let mut inner = self.inner.lock().await;
        Self::check_write(&mut inner, &[key])?;
        Self::expire(&mut inner);

        if inner.entries.contains_key(key) {
            return Ok(false);
        }

        inner
            .entries
            .insert(key.to_string(), Self::entry(value, Some(ttl_secs)));

        Ok(true)
    }

    async fn delete(&self, key: &str) -> EvregResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check_write(&mut inner, &[key])?;

        inner.entries.remove(key);

        Ok(())
    }

    async fn ttl(&self, key: &str) -> EvregResult<Option<u64>> {
        let mut inner = self.inner.lock().await;
        Self::check_reachable(&inner)?;
        Self::expire(&mut inner);

        let now = Instant::now();
        Ok(inner.entries.get(key).and_then(|entry| {
            entry
                .expires_at
                .map(|at| at.saturating_duration_since(now).as_secs())
        }))
    }

    async fn ping(&self) -> EvregResult<()> {
        let inner = self.inner.lock().await;
        Self::check_reachable(&inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_their_ttl() {
        let cache = MemorySlotCache::new();
        cache.put("k", "v", 300).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::advance(std::time::Duration::from_secs(301)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_without_expiry_never_expire() {
        let cache = MemorySlotCache::new();
        cache.put_forever("k", "v").await.unwrap();

        tokio::time::advance(std::time::Duration::from_secs(86_400)).await;

        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(cache.ttl("k").await.unwrap(), None);
        assert_eq!(cache.stored_ttl_secs("k").await, None);
    }

    #[tokio::test]
    async fn put_if_absent_respects_existing_keys() {
        let cache = MemorySlotCache::new();

        assert!(cache.put_if_absent("lock", "a", 60).await.unwrap());
        assert!(!cache.put_if_absent("lock", "b", 60).await.unwrap());
        assert_eq!(cache.get("lock").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn injected_write_failures_are_transient() {
        let cache = MemorySlotCache::new();
        cache.fail_next_writes(1).await;

        let err = cache.put("k", "v", 60).await.unwrap_err();
        assert!(err.kind().is_cache_retryable());

        cache.put("k", "v", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
    }
}
