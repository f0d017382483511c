//! Bulk population of the slot cache from the events database.
//!
//! Used at startup and for operator-triggered rebuilds. One transactional
//! snapshot of every event's counters is written out in pipelined batches,
//! with a short pause between batches to keep bulk writes from crowding out
//! request traffic on the cache connection. Population is idempotent: entries
//! are plain overwrites derived from the snapshot, so overlapping runs
//! converge on the same values.

use std::time::Duration;

use tracing::{info, warn};

use evreg_config::shared::{CacheConfig, SlotsConfig};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, EvregResult};
use crate::evreg_error;
use crate::keys;
use crate::status;
use crate::store::cache::SlotCache;
use crate::store::events::EventStore;
use crate::types::{EventSlotCounts, ReinitializationStatus};

/// Writes slot entries for every event into the cache.
#[derive(Clone)]
pub struct Populator<C, E> {
    cache: C,
    events: E,
    entry_ttl_secs: u64,
    batch_size: usize,
    batch_pause: Duration,
}

impl<C, E> Populator<C, E>
where
    C: SlotCache,
    E: EventStore,
{
    pub fn new(cache: C, events: E, cache_config: &CacheConfig, slots: &SlotsConfig) -> Self {
        Self {
            cache,
            events,
            entry_ttl_secs: cache_config.entry_ttl_secs,
            batch_size: slots.population_batch_size,
            batch_pause: Duration::from_millis(slots.population_batch_pause_ms),
        }
    }

    /// Populates the cache with every event's slot entry.
    ///
    /// Skips the run entirely when the cache is unreachable; startup must not
    /// fail because of a cache outage, the read path falls back to the
    /// database until the next run. Returns the number of entries written.
    pub async fn populate_all(&self, shutdown: &ShutdownRx) -> EvregResult<usize> {
        if let Err(err) = self.cache.ping().await {
            warn!(error = %err, "cache unreachable, skipping slot cache population");
            return Ok(0);
        }

        let counts = self.events.load_slot_counts().await?;
        info!(total_events = counts.len(), "populating slot cache");

        let (written, interrupted) = self.write_batches(&counts, shutdown, None).await?;
        if interrupted {
            warn!(written, "slot cache population interrupted by shutdown");
        } else {
            info!(written, "slot cache population finished");
        }

        Ok(written)
    }

    /// Populates the cache while publishing a progress record under
    /// [`keys::REINITIALIZATION_STATUS_KEY`].
    ///
    /// The manual-reinitialization flag is cleared on every exit path so a
    /// failed rebuild cannot suppress automatic reconciliation for longer
    /// than the flag's own TTL.
    pub async fn populate_all_tracked(&self, shutdown: &ShutdownRx) -> EvregResult<usize> {
        let result = self.populate_tracked_inner(shutdown).await;

        if let Err(err) = status::clear_manual_reinitialization(&self.cache).await {
            warn!(error = %err, "failed to clear manual reinitialization flag");
        }

        result
    }

    async fn populate_tracked_inner(&self, shutdown: &ShutdownRx) -> EvregResult<usize> {
        let counts = match self.events.load_slot_counts().await {
            Ok(counts) => counts,
            Err(err) => {
                let mut record = ReinitializationStatus::starting(0);
                record.fail(err.to_string());
                self.publish_progress(&record).await;
                return Err(err);
            }
        };

        let mut record = ReinitializationStatus::starting(counts.len());
        status::write_reinitialization_status(&self.cache, &record).await?;
        info!(total_events = counts.len(), "reinitializing slot cache");

        match self.write_batches(&counts, shutdown, Some(&mut record)).await {
            Ok((written, interrupted)) => {
                if interrupted {
                    // Leave the record in `running`; the next rebuild
                    // overwrites it and startup population restores the
                    // entries anyway.
                    warn!(written, "slot cache reinitialization interrupted by shutdown");
                    return Ok(written);
                }

                record.complete();
                self.publish_progress(&record).await;
                info!(written, "slot cache reinitialization finished");
                Ok(written)
            }
            Err(err) => {
                record.fail(err.to_string());
                self.publish_progress(&record).await;
                Err(err)
            }
        }
    }

    /// Writes the snapshot out in paced, pipelined batches.
    ///
    /// Returns the number of entries written and whether shutdown cut the run
    /// short.
    async fn write_batches(
        &self,
        counts: &[EventSlotCounts],
        shutdown: &ShutdownRx,
        mut record: Option<&mut ReinitializationStatus>,
    ) -> EvregResult<(usize, bool)> {
        let mut written = 0;

        for (index, chunk) in counts.chunks(self.batch_size.max(1)).enumerate() {
            if shutdown.should_shutdown() {
                return Ok((written, true));
            }

            if index > 0 {
                tokio::time::sleep(self.batch_pause).await;
            }

            let entries = chunk
                .iter()
                .map(|counts| {
                    let value = serde_json::to_string(&counts.to_entry()).map_err(|err| {
                        evreg_error!(
                            ErrorKind::SerializationError,
                            "Failed to serialize slot entry",
                            source: err
                        )
                    })?;

                    Ok((keys::event_slots(counts.id), value))
                })
                .collect::<EvregResult<Vec<_>>>()?;

            self.cache.put_many(&entries, self.entry_ttl_secs).await?;
            written += chunk.len();

            if let Some(record) = record.as_deref_mut() {
                record.advance(written);
                self.publish_progress(record).await;
            }
        }

        Ok((written, false))
    }

    async fn publish_progress(&self, record: &ReinitializationStatus) {
        if let Err(err) = status::write_reinitialization_status(&self.cache, record).await {
            warn!(error = %err, "failed to publish reinitialization progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::store::cache::MemorySlotCache;
    use crate::store::events::MemoryEventStore;
    use crate::types::{EventId, ProgressState};

    fn cache_config() -> CacheConfig {
        CacheConfig {
            url: secrecy::SecretString::new("redis://localhost:6379".to_string()),
            connect_timeout_ms: CacheConfig::DEFAULT_CONNECT_TIMEOUT_MS,
            reconnect_base_delay_ms: CacheConfig::DEFAULT_RECONNECT_BASE_DELAY_MS,
            reconnect_max_delay_ms: CacheConfig::DEFAULT_RECONNECT_MAX_DELAY_MS,
            entry_ttl_secs: CacheConfig::DEFAULT_ENTRY_TTL_SECS,
        }
    }

    fn populator(
        cache: MemorySlotCache,
        events: MemoryEventStore,
    ) -> Populator<MemorySlotCache, MemoryEventStore> {
        Populator::new(cache, events, &cache_config(), &SlotsConfig::default())
    }

    async fn seed(events: &MemoryEventStore, count: i64) {
        for id in 1..=count {
            events.insert_event(EventId(id), 100, 40).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn populates_every_event_with_entry_ttl() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        seed(&events, 250).await;
        let (_tx, rx) = create_shutdown_channel();

        let written = populator(cache.clone(), events).populate_all(&rx).await.unwrap();

        assert_eq!(written, 250);
        assert_eq!(cache.len().await, 250);
        assert_eq!(
            cache.get("event:17:slots").await.unwrap(),
            Some(r#"{"available":60,"total":100}"#.to_string())
        );
        assert_eq!(cache.stored_ttl_secs("event:17:slots").await, Some(300));
    }

    #[tokio::test(start_paused = true)]
    async fn population_is_idempotent() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        seed(&events, 10).await;
        let (_tx, rx) = create_shutdown_channel();
        let populator = populator(cache.clone(), events);

        populator.populate_all(&rx).await.unwrap();
        let first = cache.get("event:3:slots").await.unwrap();

        populator.populate_all(&rx).await.unwrap();

        assert_eq!(cache.len().await, 10);
        assert_eq!(cache.get("event:3:slots").await.unwrap(), first);
    }

    #[tokio::test]
    async fn unreachable_cache_skips_the_run() {
        let cache = MemorySlotCache::new();
        cache.set_unreachable(true).await;
        let events = MemoryEventStore::new();
        seed(&events, 5).await;
        let (_tx, rx) = create_shutdown_channel();

        let written = populator(cache, events).populate_all(&rx).await.unwrap();

        assert_eq!(written, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tracked_run_publishes_completed_status_and_clears_flag() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        seed(&events, 120).await;
        status::set_manual_reinitialization(&cache).await.unwrap();
        let (_tx, rx) = create_shutdown_channel();

        let written = populator(cache.clone(), events)
            .populate_all_tracked(&rx)
            .await
            .unwrap();

        assert_eq!(written, 120);
        let record = status::read_reinitialization_status(&cache).await.unwrap().unwrap();
        assert_eq!(record.state, ProgressState::Completed);
        assert_eq!(record.total_events, 120);
        assert_eq!(record.percent_complete, 100);
        assert!(record.completed_at.is_some());
        assert!(!status::is_manual_reinitialization_active(&cache).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn tracked_run_records_snapshot_failure() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.set_unreachable(true).await;
        status::set_manual_reinitialization(&cache).await.unwrap();
        let (_tx, rx) = create_shutdown_channel();

        let result = populator(cache.clone(), events).populate_all_tracked(&rx).await;

        assert!(result.is_err());
        let record = status::read_reinitialization_status(&cache).await.unwrap().unwrap();
        assert_eq!(record.state, ProgressState::Failed);
        assert!(record.error.is_some());
        assert!(!status::is_manual_reinitialization_active(&cache).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_between_batches() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        seed(&events, 250).await;
        let (tx, rx) = create_shutdown_channel();
        tx.shutdown();

        let written = populator(cache.clone(), events).populate_all(&rx).await.unwrap();

        assert_eq!(written, 0);
        assert!(cache.is_empty().await);
    }
}
