//! Periodic reconciliation of the slot cache against the events database.
//!
//! A background loop on every instance polls for leadership of the
//! consistency lock; the winner verifies each event's cached entry against a
//! fresh database snapshot. Missing or divergent entries are rewritten from
//! the snapshot, and an entry that cannot be rewritten is invalidated so the
//! read path falls back to the database. Each cycle publishes a status record
//! with its outcome tally.

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use evreg_config::shared::{CacheConfig, SlotsConfig};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::EvregResult;
use crate::keys;
use crate::leadership::with_leader_election;
use crate::status;
use crate::store::cache::SlotCache;
use crate::store::events::EventStore;
use crate::types::{ConsistencyStatus, EventSlotCounts, ReconcileTally};

/// Per-event verification outcome.
enum Outcome {
    Consistent,
    Fixed,
    Error,
    Unavailable,
}

/// Verifies and repairs slot cache entries on a fixed interval.
pub struct Reconciler<C, E> {
    cache: C,
    events: E,
    instance_id: String,
    entry_ttl_secs: u64,
    batch_size: usize,
    batch_pause: Duration,
    fix_max_attempts: u32,
    fix_backoff: Duration,
    poll_interval: Duration,
}

impl<C, E> Reconciler<C, E>
where
    C: SlotCache,
    E: EventStore,
{
    pub fn new(
        cache: C,
        events: E,
        instance_id: String,
        cache_config: &CacheConfig,
        slots: &SlotsConfig,
    ) -> Self {
        Self {
            cache,
            events,
            instance_id,
            entry_ttl_secs: cache_config.entry_ttl_secs,
            batch_size: slots.reconcile_batch_size,
            batch_pause: Duration::from_millis(slots.reconcile_batch_pause_ms),
            fix_max_attempts: slots.fix_max_attempts,
            fix_backoff: Duration::from_millis(slots.fix_backoff_ms),
            poll_interval: Duration::from_secs(slots.leader_poll_interval_secs),
        }
    }

    /// Runs reconciliation cycles until shutdown is signaled.
    ///
    /// Every poll interval this instance contends for the consistency lock;
    /// losing just means another instance is reconciling. Cycle errors are
    /// logged and the loop keeps going.
    pub async fn run(&self, mut shutdown: ShutdownRx) {
        // Separate handle for the cycle, which checks it between batches.
        let cycle_shutdown = shutdown.clone();
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; startup population just ran, so
        // skip it.
        interval.tick().await;

        info!(instance_id = %self.instance_id, "reconciler loop started");

        loop {
            tokio::select! {
                _ = shutdown.signaled() => {
                    info!("reconciler loop stopping");
                    return;
                }
                _ = interval.tick() => {
                    let run = with_leader_election(
                        &self.cache,
                        keys::CONSISTENCY_LOCK_KEY,
                        keys::CONSISTENCY_LOCK_TTL_SECS,
                        &self.instance_id,
                        || self.reconcile_once(&cycle_shutdown),
                    )
                    .await;

                    if let Err(err) = run {
                        warn!(error = %err, "reconciliation cycle failed");
                    }
                }
            }
        }
    }

    /// Runs one reconciliation cycle.
    ///
    /// Returns [`None`] when the cycle was skipped: the cache is unreachable
    /// (nothing to verify against) or a manual reinitialization is in flight
    /// (the rebuild is about to overwrite everything anyway).
    pub async fn reconcile_once(
        &self,
        shutdown: &ShutdownRx,
    ) -> EvregResult<Option<ReconcileTally>> {
        if let Err(err) = self.cache.ping().await {
            warn!(error = %err, "cache unreachable, skipping reconciliation");
            return Ok(None);
        }

        if status::is_manual_reinitialization_active(&self.cache).await? {
            info!("manual reinitialization in flight, skipping reconciliation");
            return Ok(None);
        }

        let counts = match self.events.load_slot_counts().await {
            Ok(counts) => counts,
            Err(err) => {
                let mut record = ConsistencyStatus::running(0);
                record.fail(err.to_string());
                self.publish_status(&record).await;
                return Err(err);
            }
        };

        let mut record = ConsistencyStatus::running(counts.len());
        self.publish_status(&record).await;
        debug!(total_events = counts.len(), "reconciliation cycle started");

        let mut tally = ReconcileTally::default();
        let mut processed = 0;

        for (index, chunk) in counts.chunks(self.batch_size.max(1)).enumerate() {
            if shutdown.should_shutdown() {
                warn!(processed, "reconciliation interrupted by shutdown");
                return Ok(Some(tally));
            }

            if index > 0 {
                tokio::time::sleep(self.batch_pause).await;
            }

            let outcomes = join_all(chunk.iter().map(|counts| self.reconcile_event(counts))).await;
            for outcome in outcomes {
                match outcome {
                    Outcome::Consistent => tally.consistent += 1,
                    Outcome::Fixed => tally.fixed += 1,
                    Outcome::Error => tally.errors += 1,
                    Outcome::Unavailable => tally.unavailable += 1,
                }
            }
            processed += chunk.len();

            record.advance(processed, tally);
            self.publish_status(&record).await;
        }

        record.complete(tally);
        self.publish_status(&record).await;
        info!(
            consistent = tally.consistent,
            fixed = tally.fixed,
            errors = tally.errors,
            unavailable = tally.unavailable,
            "reconciliation cycle finished"
        );

        Ok(Some(tally))
    }

    async fn reconcile_event(&self, counts: &EventSlotCounts) -> Outcome {
        let key = keys::event_slots(counts.id);
        let expected = counts.to_entry();

        let cached = match self.cache.get(&key).await {
            Ok(cached) => cached,
            Err(err) => {
                debug!(event_id = %counts.id, error = %err, "cache read failed during reconciliation");
                return Outcome::Unavailable;
            }
        };

        let divergent = match cached {
            None => true,
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(entry) => expected != entry,
                // Corrupt entries count as divergent and get overwritten.
                Err(_) => true,
            },
        };
        if !divergent {
            return Outcome::Consistent;
        }

        let Ok(value) = serde_json::to_string(&expected) else {
            return Outcome::Error;
        };

        if self.write_with_retries(&key, &value).await.is_ok() {
            debug!(event_id = %counts.id, available = expected.available, "slot entry repaired");
            return Outcome::Fixed;
        }

        // Last resort: invalidate so reads fall back to the database instead
        // of serving a value we could not correct.
        match self.cache.delete(&key).await {
            Ok(()) => {
                warn!(event_id = %counts.id, "slot entry invalidated after failed repairs");
            }
            Err(err) => {
                warn!(event_id = %counts.id, error = %err, "failed to invalidate divergent slot entry");
            }
        }

        Outcome::Error
    }

    async fn write_with_retries(&self, key: &str, value: &str) -> EvregResult<()> {
        let mut attempt = 0;
        loop {
            match self.cache.put(key, value, self.entry_ttl_secs).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt + 1 < self.fix_max_attempts => {
                    attempt += 1;
                    tokio::time::sleep(self.fix_backoff * 2u32.pow(attempt - 1)).await;
                    debug!(key, attempt, error = %err, "retrying slot entry repair");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn publish_status(&self, record: &ConsistencyStatus) {
        if let Err(err) = status::write_consistency_status(&self.cache, record).await {
            warn!(error = %err, "failed to publish consistency status");
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::store::cache::MemorySlotCache;
    use crate::store::events::MemoryEventStore;
    use crate::types::{EventId, ProgressState};

    fn cache_config() -> CacheConfig {
        CacheConfig {
            url: SecretString::new("redis://localhost:6379".to_string()),
            connect_timeout_ms: CacheConfig::DEFAULT_CONNECT_TIMEOUT_MS,
            reconnect_base_delay_ms: CacheConfig::DEFAULT_RECONNECT_BASE_DELAY_MS,
            reconnect_max_delay_ms: CacheConfig::DEFAULT_RECONNECT_MAX_DELAY_MS,
            entry_ttl_secs: CacheConfig::DEFAULT_ENTRY_TTL_SECS,
        }
    }

    fn reconciler(
        cache: MemorySlotCache,
        events: MemoryEventStore,
    ) -> Reconciler<MemorySlotCache, MemoryEventStore> {
        Reconciler::new(
            cache,
            events,
            "test-instance".to_string(),
            &cache_config(),
            &SlotsConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn repairs_missing_and_divergent_entries() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        // Consistent, divergent, missing, corrupt.
        events.insert_event(EventId(1), 10, 3).await;
        events.insert_event(EventId(2), 10, 3).await;
        events.insert_event(EventId(3), 10, 3).await;
        events.insert_event(EventId(4), 10, 3).await;
        cache
            .put("event:1:slots", r#"{"available":7,"total":10}"#, 300)
            .await
            .unwrap();
        cache
            .put("event:2:slots", r#"{"available":9,"total":10}"#, 300)
            .await
            .unwrap();
        cache.put("event:4:slots", "not json", 300).await.unwrap();
        let (_tx, rx) = create_shutdown_channel();

        let tally = reconciler(cache.clone(), events)
            .reconcile_once(&rx)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(tally.consistent, 1);
        assert_eq!(tally.fixed, 3);
        assert_eq!(tally.errors, 0);
        for id in 1..=4 {
            assert_eq!(
                cache.get(&format!("event:{id}:slots")).await.unwrap(),
                Some(r#"{"available":7,"total":10}"#.to_string())
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unrepairable_entry_is_invalidated() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 3).await;
        cache
            .put("event:1:slots", r#"{"available":9,"total":10}"#, 300)
            .await
            .unwrap();
        let (_tx, rx) = create_shutdown_channel();
        let reconciler = reconciler(cache.clone(), events);

        // Both repair attempts fail; the invalidation that follows succeeds.
        cache.fail_next_writes_to("event:1:slots", 2).await;
        let tally = reconciler.reconcile_once(&rx).await.unwrap().unwrap();

        assert_eq!(tally.errors, 1);
        assert_eq!(cache.get("event:1:slots").await.unwrap(), None);
    }

    #[tokio::test]
    async fn skips_when_cache_is_unreachable() {
        let cache = MemorySlotCache::new();
        cache.set_unreachable(true).await;
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 3).await;
        let (_tx, rx) = create_shutdown_channel();

        let result = reconciler(cache, events).reconcile_once(&rx).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn skips_while_manual_reinitialization_is_active() {
        let cache = MemorySlotCache::new();
        status::set_manual_reinitialization(&cache).await.unwrap();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 3).await;
        let (_tx, rx) = create_shutdown_channel();

        let result = reconciler(cache.clone(), events)
            .reconcile_once(&rx)
            .await
            .unwrap();

        assert!(result.is_none());
        // The untouched cache proves nothing was reconciled.
        assert_eq!(cache.get("event:1:slots").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_completed_status_with_tally() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 3).await;
        events.insert_event(EventId(2), 10, 3).await;
        cache
            .put("event:1:slots", r#"{"available":7,"total":10}"#, 300)
            .await
            .unwrap();
        let (_tx, rx) = create_shutdown_channel();

        reconciler(cache.clone(), events)
            .reconcile_once(&rx)
            .await
            .unwrap();

        let record = status::read_consistency_status(&cache).await.unwrap().unwrap();
        assert_eq!(record.state, ProgressState::Completed);
        assert_eq!(record.total_events, 2);
        assert_eq!(record.processed_events, 2);
        assert_eq!(record.tally.consistent, 1);
        assert_eq!(record.tally.fixed, 1);
        assert!(record.completed_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_failure_publishes_failed_status() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.set_unreachable(true).await;
        let (_tx, rx) = create_shutdown_channel();

        let result = reconciler(cache.clone(), events).reconcile_once(&rx).await;

        assert!(result.is_err());
        let record = status::read_consistency_status(&cache).await.unwrap().unwrap();
        assert_eq!(record.state, ProgressState::Failed);
        assert!(record.error.is_some());
    }
}
