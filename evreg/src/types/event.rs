use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of an event row in the events database.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventId {
    fn from(value: i64) -> Self {
        EventId(value)
    }
}

/// Slot counters of one event as stored in the events database.
///
/// The database is the source of truth for these fields; everything the cache
/// holds is derived from them. `registered_slots <= max_slots` is enforced by
/// the registration write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct EventSlotCounts {
    pub id: EventId,
    pub max_slots: i32,
    pub registered_slots: i32,
}

impl EventSlotCounts {
    /// Remaining capacity, floored at zero so a cache entry derived from an
    /// inconsistent row can never advertise negative availability.
    pub fn available(&self) -> i32 {
        (self.max_slots - self.registered_slots).max(0)
    }

    /// Derives the cache entry for this event.
    pub fn to_entry(&self) -> SlotEntry {
        SlotEntry {
            available: self.available(),
            total: self.max_slots,
        }
    }
}

/// Cached `{available, total}` projection of an event's slot counters.
///
/// Ephemeral and never authoritative: the entry may be absent, stale, or
/// evicted at any time, and every consumer must tolerate that. The JSON field
/// names are part of the cache wire format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub available: i32,
    pub total: i32,
}
