use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bail;
use crate::error::{ErrorKind, EvregResult};
use crate::evreg_error;
use crate::store::events::EventStore;
use crate::types::{EventId, EventSlotCounts};

#[derive(Debug, Default)]
struct Inner {
    events: BTreeMap<EventId, EventSlotCounts>,
    registrations: Vec<(EventId, Uuid)>,
    unreachable: bool,
}

/// In-memory event store for tests and local development.
///
/// Slot counts are held behind one async mutex, which gives
/// [`EventStore::commit_registration`] the same check-then-increment atomicity
/// the database provides with row locks.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryEventStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an event with the given capacity and registration
    /// count.
    pub async fn insert_event(&self, id: EventId, max_slots: i32, registered_slots: i32) {
        let mut inner = self.inner.lock().await;
        inner.events.insert(
            id,
            EventSlotCounts {
                id,
                max_slots,
                registered_slots,
            },
        );
    }

    /// Overwrites the registered count of an existing event. No-op when the
    /// event does not exist.
    pub async fn set_registered_slots(&self, id: EventId, registered_slots: i32) {
        let mut inner = self.inner.lock().await;
        if let Some(counts) = inner.events.get_mut(&id) {
            counts.registered_slots = registered_slots;
        }
    }

    /// Makes every subsequent operation fail as if the database were down.
    pub async fn set_unreachable(&self, unreachable: bool) {
        let mut inner = self.inner.lock().await;
        inner.unreachable = unreachable;
    }

    /// Returns the registrations committed so far, in order.
    pub async fn registrations(&self) -> Vec<(EventId, Uuid)> {
        let inner = self.inner.lock().await;
        inner.registrations.clone()
    }

    fn check_reachable(inner: &Inner) -> EvregResult<()> {
        if inner.unreachable {
            return Err(evreg_error!(
                ErrorKind::SourceConnectionFailed,
                "Events database is unreachable"
            ));
        }

        Ok(())
    }
}

impl EventStore for MemoryEventStore {
    async fn load_slot_counts(&self) -> EvregResult<Vec<EventSlotCounts>> {
        let inner = self.inner.lock().await;
        Self::check_reachable(&inner)?;

        Ok(inner.events.values().copied().collect())
    }

    async fn slot_counts(&self, event_id: EventId) -> EvregResult<Option<EventSlotCounts>> {
        let inner = self.inner.lock().await;
        Self::check_reachable(&inner)?;

        Ok(inner.events.get(&event_id).copied())
    }

    async fn commit_registration(
        &self,
        event_id: EventId,
        attendee_id: Uuid,
    ) -> EvregResult<EventSlotCounts> {
        let mut inner = self.inner.lock().await;
        Self::check_reachable(&inner)?;

        let Some(counts) = inner.events.get(&event_id).copied() else {
            bail!(
                ErrorKind::EventNotFound,
                "Event not found",
                format!("Event {event_id} does not exist")
            );
        };

        if counts.available() == 0 {
            bail!(
                ErrorKind::NoAvailableSlots,
                "No available slots",
                format!("Event {event_id} is at capacity")
            );
        }

        if inner
            .registrations
            .iter()
            .any(|registered| *registered == (event_id, attendee_id))
        {
            bail!(
                ErrorKind::AlreadyRegistered,
                "Attendee already registered",
                format!("Attendee {attendee_id} is already registered for event {event_id}")
            );
        }

        let counts = inner
            .events
            .get_mut(&event_id)
            .map(|counts| {
                counts.registered_slots += 1;
                *counts
            })
            .unwrap_or(counts);
        inner.registrations.push((event_id, attendee_id));

        Ok(counts)
    }

    async fn ping(&self) -> EvregResult<()> {
        let inner = self.inner.lock().await;
        Self::check_reachable(&inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registrations_stop_at_capacity() {
        let store = MemoryEventStore::new();
        store.insert_event(EventId(1), 2, 1).await;

        let counts = store
            .commit_registration(EventId(1), Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(counts.available(), 0);

        let err = store
            .commit_registration(EventId(1), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoAvailableSlots);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let store = MemoryEventStore::new();
        store.insert_event(EventId(1), 5, 0).await;
        let attendee = Uuid::new_v4();

        store.commit_registration(EventId(1), attendee).await.unwrap();

        let err = store
            .commit_registration(EventId(1), attendee)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyRegistered);

        // The failed attempt consumed no slot.
        let counts = store.slot_counts(EventId(1)).await.unwrap().unwrap();
        assert_eq!(counts.registered_slots, 1);
    }

    #[tokio::test]
    async fn registering_for_missing_event_fails() {
        let store = MemoryEventStore::new();

        let err = store
            .commit_registration(EventId(9), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EventNotFound);
    }
}
