//! Core library for the evreg event-registration backend.
//!
//! Keeps a per-event `{available, total}` seat counter synchronized between
//! the events database (the source of truth) and a Redis cache, under
//! concurrent registrations, multi-instance deployment, and cache failure.
//! The cache is never authoritative: every consumer tolerates its absence,
//! and a periodic reconciler repairs drift from database snapshots.

pub mod concurrency;
pub mod error;
pub mod keys;
mod macros;
pub mod leadership;
pub mod population;
pub mod reconciler;
pub mod slots;
pub mod status;
pub mod store;
pub mod types;
