//! Read and write paths for event slot availability.
//!
//! [`SlotService`] is the one entry point request handlers go through. Reads
//! prefer the cache and fall back to the events database on a miss or a cache
//! failure; the database answer is written back so the next read hits. Writes
//! commit to the database first and then adjust the cached entry best-effort,
//! so a cache outage can never lose a registration.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use evreg_config::shared::{CacheConfig, CacheReadPolicy, SlotsConfig};

use crate::bail;
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, EvregResult};
use crate::keys;
use crate::leadership::{LeaderOutcome, with_leader_election};
use crate::population::Populator;
use crate::status;
use crate::store::cache::SlotCache;
use crate::store::events::EventStore;
use crate::evreg_error;
use crate::types::{ConsistencyStatus, EventId, EventSlotCounts, ReinitializationStatus, SlotEntry};

/// Slot availability service over a cache and the events database.
#[derive(Clone)]
pub struct SlotService<C, E> {
    cache: C,
    events: E,
    populator: Populator<C, E>,
    instance_id: String,
    entry_ttl_secs: u64,
    read_policy: CacheReadPolicy,
    decrement_max_attempts: u32,
    decrement_backoff: Duration,
}

impl<C, E> SlotService<C, E>
where
    C: SlotCache + Clone,
    E: EventStore + Clone,
{
    pub fn new(cache: C, events: E, cache_config: &CacheConfig, slots: &SlotsConfig) -> Self {
        let instance_id = slots
            .instance_id
            .clone()
            .unwrap_or_else(|| format!("evreg-{:08x}", rand::rng().random::<u32>()));
        let populator = Populator::new(cache.clone(), events.clone(), cache_config, slots);

        Self {
            cache,
            events,
            populator,
            instance_id,
            entry_ttl_secs: cache_config.entry_ttl_secs,
            read_policy: slots.read_policy,
            decrement_max_attempts: slots.decrement_max_attempts,
            decrement_backoff: Duration::from_millis(slots.decrement_backoff_ms),
        }
    }

    /// Identifier stored in leadership locks held by this instance.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Returns the slot availability of an event.
    ///
    /// Serves from the cache when possible; on a miss, a corrupt entry, or a
    /// cache failure the database is consulted and the derived entry is
    /// written back best-effort. Fails with
    /// [`ErrorKind::EventNotFound`] only when the database says the event does
    /// not exist.
    pub async fn available_slots(&self, event_id: EventId) -> EvregResult<SlotEntry> {
        let key = keys::event_slots(event_id);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<SlotEntry>(&raw) {
                Ok(entry) => return self.serve_hit(event_id, &key, entry).await,
                Err(err) => {
                    warn!(%event_id, error = %err, "corrupt slot entry, refreshing from database");
                }
            },
            Ok(None) => {
                debug!(%event_id, "slot cache miss");
            }
            Err(err) => {
                warn!(%event_id, error = %err, "slot cache read failed, falling back to database");
            }
        }

        self.refresh_from_source(event_id, &key).await
    }

    /// Registers an attendee for an event.
    ///
    /// The database commit is authoritative; the cached entry is adjusted
    /// afterwards and any cache trouble is logged, never surfaced.
    pub async fn register(
        &self,
        event_id: EventId,
        attendee_id: uuid::Uuid,
    ) -> EvregResult<EventSlotCounts> {
        let counts = self.events.commit_registration(event_id, attendee_id).await?;
        self.on_registration_committed(event_id).await;

        Ok(counts)
    }

    /// Decrements the cached availability of an event after a registration
    /// committed.
    ///
    /// A missing entry is left missing (the next read repopulates it) and an
    /// entry already at zero is left untouched. Transient cache failures are
    /// retried with exponential backoff; when every attempt fails the entry
    /// is invalidated instead, because a deleted entry costs one database
    /// read while a stale one oversells the event. Never returns an error.
    pub async fn on_registration_committed(&self, event_id: EventId) {
        let key = keys::event_slots(event_id);

        for attempt in 0..self.decrement_max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.decrement_backoff * 2u32.pow(attempt - 1)).await;
            }

            match self.try_decrement(&key).await {
                Ok(()) => return,
                Err(err) => {
                    warn!(
                        %event_id,
                        attempt = attempt + 1,
                        error = %err,
                        "cache decrement attempt failed"
                    );
                }
            }
        }

        if let Err(err) = self.cache.delete(&key).await {
            warn!(%event_id, error = %err, "failed to invalidate slot entry after decrement retries");
        } else {
            debug!(%event_id, "slot entry invalidated after decrement retries");
        }
    }

    /// Raises the manual-reinitialization flag and rebuilds the cache with
    /// progress tracking, guarded by the population lock.
    ///
    /// Returns [`LeaderOutcome::NotLeader`] without clearing the flag when
    /// another instance is already populating; that run owns the flag.
    pub async fn reinitialize(
        &self,
        shutdown: &ShutdownRx,
    ) -> EvregResult<LeaderOutcome<usize>> {
        status::set_manual_reinitialization(&self.cache).await?;

        with_leader_election(
            &self.cache,
            keys::POPULATION_LOCK_KEY,
            keys::POPULATION_LOCK_TTL_SECS,
            &self.instance_id,
            || self.populator.populate_all_tracked(shutdown),
        )
        .await
    }

    /// Populates the cache without progress tracking, guarded by the
    /// population lock. Used at startup.
    pub async fn populate(&self, shutdown: &ShutdownRx) -> EvregResult<LeaderOutcome<usize>> {
        with_leader_election(
            &self.cache,
            keys::POPULATION_LOCK_KEY,
            keys::POPULATION_LOCK_TTL_SECS,
            &self.instance_id,
            || self.populator.populate_all(shutdown),
        )
        .await
    }

    /// Status record of the most recent tracked reinitialization.
    pub async fn reinitialization_status(&self) -> EvregResult<Option<ReinitializationStatus>> {
        status::read_reinitialization_status(&self.cache).await
    }

    /// Status record of the most recent reconciliation cycle.
    pub async fn consistency_status(&self) -> EvregResult<Option<ConsistencyStatus>> {
        status::read_consistency_status(&self.cache).await
    }

    /// Raw cache read for debugging surfaces.
    pub async fn cache_entry(&self, key: &str) -> EvregResult<Option<String>> {
        self.cache.get(key).await
    }

    /// Liveness of the cache.
    pub async fn ping_cache(&self) -> EvregResult<()> {
        self.cache.ping().await
    }

    /// Liveness of the events database.
    pub async fn ping_events(&self) -> EvregResult<()> {
        self.events.ping().await
    }

    async fn serve_hit(
        &self,
        event_id: EventId,
        key: &str,
        entry: SlotEntry,
    ) -> EvregResult<SlotEntry> {
        match self.read_policy {
            CacheReadPolicy::Trust => Ok(entry),
            CacheReadPolicy::VerifySource => {
                let truth = self.refresh_from_source(event_id, key).await?;
                if truth != entry {
                    warn!(
                        %event_id,
                        cached_available = entry.available,
                        actual_available = truth.available,
                        "divergent slot entry corrected on read"
                    );
                }

                Ok(truth)
            }
        }
    }

    async fn refresh_from_source(&self, event_id: EventId, key: &str) -> EvregResult<SlotEntry> {
        let Some(counts) = self.events.slot_counts(event_id).await? else {
            bail!(
                ErrorKind::EventNotFound,
                "Event not found",
                format!("Event {event_id} does not exist")
            );
        };

        let entry = counts.to_entry();
        match serde_json::to_string(&entry) {
            Ok(value) => {
                if let Err(err) = self.cache.put(key, &value, self.entry_ttl_secs).await {
                    warn!(%event_id, error = %err, "failed to write slot entry back to cache");
                }
            }
            Err(err) => {
                warn!(%event_id, error = %err, "failed to serialize slot entry");
            }
        }

        Ok(entry)
    }

    async fn try_decrement(&self, key: &str) -> EvregResult<()> {
        let Some(raw) = self.cache.get(key).await? else {
            return Ok(());
        };

        let entry = match serde_json::from_str::<SlotEntry>(&raw) {
            Ok(entry) => entry,
            Err(_) => {
                // Corrupt entry; drop it rather than decrement garbage.
                return self.cache.delete(key).await;
            }
        };

        if entry.available < 0 {
            // Negative availability is as corrupt as bad JSON; invalidate
            // instead of decrementing it further.
            return self.cache.delete(key).await;
        }

        if entry.available == 0 {
            return Ok(());
        }

        let updated = SlotEntry {
            available: entry.available - 1,
            total: entry.total,
        };
        let value = serde_json::to_string(&updated).map_err(|err| {
            evreg_error!(
                ErrorKind::SerializationError,
                "Failed to serialize slot entry",
                source: err
            )
        })?;

        self.cache.put(key, &value, self.entry_ttl_secs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::store::cache::MemorySlotCache;
    use crate::store::events::MemoryEventStore;
    use crate::types::ProgressState;
    use secrecy::SecretString;
    use uuid::Uuid;

    fn cache_config() -> CacheConfig {
        CacheConfig {
            url: SecretString::new("redis://localhost:6379".to_string()),
            connect_timeout_ms: CacheConfig::DEFAULT_CONNECT_TIMEOUT_MS,
            reconnect_base_delay_ms: CacheConfig::DEFAULT_RECONNECT_BASE_DELAY_MS,
            reconnect_max_delay_ms: CacheConfig::DEFAULT_RECONNECT_MAX_DELAY_MS,
            entry_ttl_secs: CacheConfig::DEFAULT_ENTRY_TTL_SECS,
        }
    }

    fn service(
        cache: MemorySlotCache,
        events: MemoryEventStore,
    ) -> SlotService<MemorySlotCache, MemoryEventStore> {
        SlotService::new(cache, events, &cache_config(), &SlotsConfig::default())
    }

    fn verifying_service(
        cache: MemorySlotCache,
        events: MemoryEventStore,
    ) -> SlotService<MemorySlotCache, MemoryEventStore> {
        let slots = SlotsConfig {
            read_policy: CacheReadPolicy::VerifySource,
            ..SlotsConfig::default()
        };
        SlotService::new(cache, events, &cache_config(), &slots)
    }

    #[tokio::test]
    async fn cache_miss_reads_database_and_writes_back() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 3).await;
        let service = service(cache.clone(), events);

        let entry = service.available_slots(EventId(1)).await.unwrap();

        assert_eq!(entry, SlotEntry { available: 7, total: 10 });
        assert_eq!(
            cache.get("event:1:slots").await.unwrap(),
            Some(r#"{"available":7,"total":10}"#.to_string())
        );
        assert_eq!(cache.stored_ttl_secs("event:1:slots").await, Some(300));
    }

    #[tokio::test]
    async fn trusted_hit_serves_cached_value() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 9).await;
        cache
            .put("event:1:slots", r#"{"available":5,"total":10}"#, 300)
            .await
            .unwrap();
        let service = service(cache, events);

        let entry = service.available_slots(EventId(1)).await.unwrap();

        // Stale but trusted; the reconciler owns drift correction.
        assert_eq!(entry, SlotEntry { available: 5, total: 10 });
    }

    #[tokio::test]
    async fn verifying_hit_corrects_divergent_entry() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 9).await;
        cache
            .put("event:1:slots", r#"{"available":5,"total":10}"#, 300)
            .await
            .unwrap();
        let service = verifying_service(cache.clone(), events);

        let entry = service.available_slots(EventId(1)).await.unwrap();

        assert_eq!(entry, SlotEntry { available: 1, total: 10 });
        assert_eq!(
            cache.get("event:1:slots").await.unwrap(),
            Some(r#"{"available":1,"total":10}"#.to_string())
        );
    }

    #[tokio::test]
    async fn unreachable_cache_falls_back_to_database() {
        let cache = MemorySlotCache::new();
        cache.set_unreachable(true).await;
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 4).await;
        let service = service(cache, events);

        let entry = service.available_slots(EventId(1)).await.unwrap();

        assert_eq!(entry, SlotEntry { available: 6, total: 10 });
    }

    #[tokio::test]
    async fn missing_event_is_not_found() {
        let service = service(MemorySlotCache::new(), MemoryEventStore::new());

        let err = service.available_slots(EventId(404)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::EventNotFound);
    }

    #[tokio::test]
    async fn corrupt_entry_is_refreshed_from_database() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 2).await;
        cache.put("event:1:slots", "not json", 300).await.unwrap();
        let service = service(cache.clone(), events);

        let entry = service.available_slots(EventId(1)).await.unwrap();

        assert_eq!(entry, SlotEntry { available: 8, total: 10 });
        assert_eq!(
            cache.get("event:1:slots").await.unwrap(),
            Some(r#"{"available":8,"total":10}"#.to_string())
        );
    }

    #[tokio::test]
    async fn registration_decrements_cached_availability() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 3).await;
        cache
            .put("event:1:slots", r#"{"available":7,"total":10}"#, 120)
            .await
            .unwrap();
        let service = service(cache.clone(), events);

        let counts = service.register(EventId(1), Uuid::new_v4()).await.unwrap();

        assert_eq!(counts.registered_slots, 4);
        assert_eq!(
            cache.get("event:1:slots").await.unwrap(),
            Some(r#"{"available":6,"total":10}"#.to_string())
        );
        // The rewrite refreshes the entry TTL.
        assert_eq!(cache.stored_ttl_secs("event:1:slots").await, Some(300));
    }

    #[tokio::test]
    async fn negative_entry_is_invalidated_instead_of_decremented() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 3).await;
        cache
            .put("event:1:slots", r#"{"available":-1,"total":10}"#, 300)
            .await
            .unwrap();
        let service = service(cache.clone(), events);

        service.register(EventId(1), Uuid::new_v4()).await.unwrap();

        assert_eq!(cache.get("event:1:slots").await.unwrap(), None);
    }

    #[tokio::test]
    async fn decrement_is_a_noop_when_entry_is_absent() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 0).await;
        let service = service(cache.clone(), events);

        service.register(EventId(1), Uuid::new_v4()).await.unwrap();

        assert_eq!(cache.get("event:1:slots").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn decrement_retries_transient_cache_failures() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 0).await;
        cache
            .put("event:1:slots", r#"{"available":10,"total":10}"#, 300)
            .await
            .unwrap();
        cache.fail_next_writes(2).await;
        let service = service(cache.clone(), events);

        service.register(EventId(1), Uuid::new_v4()).await.unwrap();

        assert_eq!(
            cache.get("event:1:slots").await.unwrap(),
            Some(r#"{"available":9,"total":10}"#.to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn decrement_exhaustion_invalidates_the_entry() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 0).await;
        cache
            .put("event:1:slots", r#"{"available":10,"total":10}"#, 300)
            .await
            .unwrap();
        // All three decrement attempts fail; the final invalidation succeeds.
        cache.fail_next_writes(3).await;
        let service = service(cache.clone(), events);

        let counts = service.register(EventId(1), Uuid::new_v4()).await.unwrap();

        // The registration itself is never affected.
        assert_eq!(counts.registered_slots, 1);
        assert_eq!(cache.get("event:1:slots").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cached_availability_never_goes_negative() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 100, 0).await;
        cache
            .put("event:1:slots", r#"{"available":2,"total":100}"#, 300)
            .await
            .unwrap();
        let service = service(cache.clone(), events);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.on_registration_committed(EventId(1)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entry: SlotEntry =
            serde_json::from_str(&cache.get("event:1:slots").await.unwrap().unwrap()).unwrap();
        assert!(entry.available >= 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reinitialize_tracks_progress_and_holds_the_population_lock() {
        let cache = MemorySlotCache::new();
        let events = MemoryEventStore::new();
        events.insert_event(EventId(1), 10, 5).await;
        let (_tx, rx) = create_shutdown_channel();
        let service = service(cache.clone(), events);

        let outcome = service.reinitialize(&rx).await.unwrap();

        assert_eq!(outcome, LeaderOutcome::Led(1));
        let record = service.reinitialization_status().await.unwrap().unwrap();
        assert_eq!(record.state, ProgressState::Completed);
        // Lock released, flag cleared.
        assert_eq!(cache.get(keys::POPULATION_LOCK_KEY).await.unwrap(), None);
        assert_eq!(cache.get(keys::MANUAL_REINITIALIZATION_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reinitialize_yields_when_another_instance_populates() {
        let cache = MemorySlotCache::new();
        cache
            .put_if_absent(keys::POPULATION_LOCK_KEY, "other", 300)
            .await
            .unwrap();
        let events = MemoryEventStore::new();
        let (_tx, rx) = create_shutdown_channel();
        let service = service(cache.clone(), events);

        let outcome = service.reinitialize(&rx).await.unwrap();

        assert_eq!(outcome, LeaderOutcome::NotLeader);
        // The running rebuild owns the flag; it stays raised.
        assert!(status::is_manual_reinitialization_active(&cache).await.unwrap());
    }
}
