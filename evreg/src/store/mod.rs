//! Storage backends for the slot cache subsystem.
//!
//! Two stores with very different trust levels: the events database
//! ([`events::EventStore`]) is the source of truth, the cache
//! ([`cache::SlotCache`]) is a best-effort projection. Both are
//! dependency-injected so every component can be exercised against the
//! in-memory implementations.

pub mod cache;
pub mod events;
