//! Cache key namespace and TTL constants.
//!
//! These strings are shared with external tooling that inspects the cache
//! directly and must be reproduced bit-exact.

use crate::types::EventId;

/// Lock guarding bulk cache population; held for the duration of one run.
pub const POPULATION_LOCK_KEY: &str = "cache:initialization:lock";

/// TTL of the population lock, in seconds.
pub const POPULATION_LOCK_TTL_SECS: u64 = 300;

/// Lock guarding a reconciliation cycle.
pub const CONSISTENCY_LOCK_KEY: &str = "cache:consistency:lock";

/// TTL of the consistency lock, in seconds. Short so leadership can migrate
/// between instances within a couple of polling intervals.
pub const CONSISTENCY_LOCK_TTL_SECS: u64 = 60;

/// Status record of an operator-triggered reinitialization.
pub const REINITIALIZATION_STATUS_KEY: &str = "cache:reinitialization:status";

/// Status record of the most recent reconciliation cycle.
pub const CONSISTENCY_STATUS_KEY: &str = "cache:consistency:status";

/// Marker suppressing automatic reconciliation while a manual rebuild runs.
pub const MANUAL_REINITIALIZATION_KEY: &str = "cache:manual_reinitialization";

/// Literal value stored under [`MANUAL_REINITIALIZATION_KEY`].
pub const MANUAL_REINITIALIZATION_VALUE: &str = "1";

/// TTL of the manual-reinitialization marker, in seconds.
pub const MANUAL_REINITIALIZATION_TTL_SECS: u64 = 3600;

/// TTL of terminal (`completed`/`failed`) status records, in seconds.
pub const STATUS_TERMINAL_TTL_SECS: u64 = 3600;

/// TTL of in-progress consistency status records, in seconds.
pub const STATUS_RUNNING_TTL_SECS: u64 = 600;

/// Returns the cache key of an event's slot entry.
pub fn event_slots(event_id: EventId) -> String {
    format!("event:{event_id}:slots")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_slots_key_format() {
        assert_eq!(event_slots(EventId(42)), "event:42:slots");
    }
}
