use std::future::Future;

use uuid::Uuid;

use crate::error::EvregResult;
use crate::types::{EventId, EventSlotCounts};

/// Trait for the events database, the source of truth for slot counts.
///
/// Every cache entry is derived from this store; when the cache and the store
/// disagree, the store wins.
pub trait EventStore: Send + Sync {
    /// Loads the slot counts of every event in one transactional snapshot.
    ///
    /// All rows come from the same consistent view, so counts read here can be
    /// compared against each other without racing concurrent registrations.
    fn load_slot_counts(&self) -> impl Future<Output = EvregResult<Vec<EventSlotCounts>>> + Send;

    /// Loads the slot counts of a single event, [`None`] when it does not
    /// exist.
    fn slot_counts(
        &self,
        event_id: EventId,
    ) -> impl Future<Output = EvregResult<Option<EventSlotCounts>>> + Send;

    /// Registers `attendee_id` for the event, atomically checking capacity
    /// and incrementing the registered count under a row lock.
    ///
    /// Fails with [`ErrorKind::EventNotFound`](crate::error::ErrorKind) when
    /// the event does not exist,
    /// [`ErrorKind::NoAvailableSlots`](crate::error::ErrorKind) when it is
    /// full, and [`ErrorKind::AlreadyRegistered`](crate::error::ErrorKind)
    /// when the attendee holds a registration for it. Returns the counts
    /// after the registration committed.
    fn commit_registration(
        &self,
        event_id: EventId,
        attendee_id: Uuid,
    ) -> impl Future<Output = EvregResult<EventSlotCounts>> + Send;

    /// Lightweight liveness check for readiness probes.
    fn ping(&self) -> impl Future<Output = EvregResult<()>> + Send;
}
