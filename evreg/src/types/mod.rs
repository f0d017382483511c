//! Core data types shared across the slot cache subsystem.

mod event;
mod status;

pub use event::{EventId, EventSlotCounts, SlotEntry};
pub use status::{ConsistencyStatus, ProgressState, ReconcileTally, ReinitializationStatus};
