use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress state of a tracked background operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Starting,
    Running,
    Completed,
    Failed,
}

impl ProgressState {
    /// Returns whether the operation has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressState::Completed | ProgressState::Failed)
    }
}

/// Status record of an operator-triggered cache reinitialization.
///
/// Written to the cache under a well-known key after every batch so an
/// external poller can observe incremental progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinitializationStatus {
    pub state: ProgressState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_events: usize,
    pub completed_events: usize,
    pub percent_complete: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReinitializationStatus {
    /// Creates a fresh `starting` record.
    pub fn starting(total_events: usize) -> Self {
        Self {
            state: ProgressState::Starting,
            started_at: Utc::now(),
            completed_at: None,
            total_events,
            completed_events: 0,
            percent_complete: 0,
            error: None,
        }
    }

    /// Records batch progress and transitions to `running`.
    pub fn advance(&mut self, completed_events: usize) {
        self.state = ProgressState::Running;
        self.completed_events = completed_events;
        self.percent_complete = if self.total_events == 0 {
            100
        } else {
            ((completed_events * 100) / self.total_events).min(100) as u8
        };
    }

    /// Marks the reinitialization as completed.
    pub fn complete(&mut self) {
        self.state = ProgressState::Completed;
        self.completed_at = Some(Utc::now());
        self.completed_events = self.total_events;
        self.percent_complete = 100;
    }

    /// Marks the reinitialization as failed with the given reason.
    pub fn fail(&mut self, error: String) {
        self.state = ProgressState::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error);
    }
}

/// Per-event outcome counters of one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileTally {
    /// Cache entry matched the database-derived truth.
    pub consistent: usize,
    /// Entry was created or corrected from the database.
    pub fixed: usize,
    /// Entry could not be corrected; it was invalidated as a last resort.
    pub errors: usize,
    /// Cache was unreachable for this event's check.
    pub unavailable: usize,
}

impl ReconcileTally {
    /// Merges another tally into this one.
    pub fn merge(&mut self, other: ReconcileTally) {
        self.consistent += other.consistent;
        self.fixed += other.fixed;
        self.errors += other.errors;
        self.unavailable += other.unavailable;
    }
}

/// Status record of a consistency reconciliation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyStatus {
    pub state: ProgressState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_events: usize,
    pub processed_events: usize,
    #[serde(flatten)]
    pub tally: ReconcileTally,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConsistencyStatus {
    /// Creates a fresh `running` record for a cycle over `total_events` events.
    pub fn running(total_events: usize) -> Self {
        Self {
            state: ProgressState::Running,
            started_at: Utc::now(),
            completed_at: None,
            total_events,
            processed_events: 0,
            tally: ReconcileTally::default(),
            error: None,
        }
    }

    /// Records progress after a batch has settled.
    pub fn advance(&mut self, processed_events: usize, tally: ReconcileTally) {
        self.processed_events = processed_events;
        self.tally = tally;
    }

    /// Marks the cycle as completed with its final tally.
    pub fn complete(&mut self, tally: ReconcileTally) {
        self.state = ProgressState::Completed;
        self.completed_at = Some(Utc::now());
        self.processed_events = self.total_events;
        self.tally = tally;
    }

    /// Marks the cycle as failed with the given reason.
    pub fn fail(&mut self, error: String) {
        self.state = ProgressState::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_complete_rounds_down_and_saturates() {
        let mut status = ReinitializationStatus::starting(3);
        status.advance(1);
        assert_eq!(status.percent_complete, 33);
        status.advance(3);
        assert_eq!(status.percent_complete, 100);

        let mut empty = ReinitializationStatus::starting(0);
        empty.advance(0);
        assert_eq!(empty.percent_complete, 100);
    }

    #[test]
    fn terminal_states() {
        assert!(!ProgressState::Starting.is_terminal());
        assert!(!ProgressState::Running.is_terminal());
        assert!(ProgressState::Completed.is_terminal());
        assert!(ProgressState::Failed.is_terminal());
    }

    #[test]
    fn tally_merge_accumulates() {
        let mut tally = ReconcileTally {
            consistent: 1,
            fixed: 2,
            errors: 0,
            unavailable: 0,
        };
        tally.merge(ReconcileTally {
            consistent: 3,
            fixed: 0,
            errors: 1,
            unavailable: 1,
        });

        assert_eq!(tally.consistent, 4);
        assert_eq!(tally.fixed, 2);
        assert_eq!(tally.errors, 1);
        assert_eq!(tally.unavailable, 1);
    }
}
