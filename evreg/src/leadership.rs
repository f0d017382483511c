//! TTL-lock leader election over the cache.
//!
//! Maintenance jobs that must run on a single instance acquire a cache key
//! with an atomic put-if-absent before doing any work. The lock carries a TTL
//! so a crashed leader never wedges the job; the trade-off is that a run
//! outliving the TTL can briefly overlap with a new leader, which every
//! guarded job tolerates by being idempotent.

use std::future::Future;

use tracing::{debug, warn};

use crate::error::EvregResult;
use crate::store::cache::SlotCache;

/// Outcome of a leadership-guarded run.
#[derive(Debug, PartialEq, Eq)]
pub enum LeaderOutcome<T> {
    /// This instance held the lock and ran the job.
    Led(T),
    /// Another instance holds the lock; nothing was run.
    NotLeader,
}

impl<T> LeaderOutcome<T> {
    /// Returns the job result when this instance led.
    pub fn into_led(self) -> Option<T> {
        match self {
            LeaderOutcome::Led(value) => Some(value),
            LeaderOutcome::NotLeader => None,
        }
    }
}

/// Runs `work` only when this instance wins the TTL lock under `lock_key`.
///
/// The lock stores `instance_id` so release can be guarded: after the work
/// finishes the lock is deleted only when it still carries our id, which keeps
/// a slow run whose lock expired from deleting the next leader's lock. Work
/// errors are propagated after the release attempt.
pub async fn with_leader_election<C, F, Fut, T>(
    cache: &C,
    lock_key: &str,
    lock_ttl_secs: u64,
    instance_id: &str,
    work: F,
) -> EvregResult<LeaderOutcome<T>>
where
    C: SlotCache,
    F: FnOnce() -> Fut,
    Fut: Future<Output = EvregResult<T>>,
{
    let acquired = cache
        .put_if_absent(lock_key, instance_id, lock_ttl_secs)
        .await?;
    if !acquired {
        debug!(lock_key, instance_id, "lock held elsewhere, skipping run");
        return Ok(LeaderOutcome::NotLeader);
    }

    debug!(lock_key, instance_id, "lock acquired");
    let result = work().await;

    if let Err(err) = release(cache, lock_key, instance_id).await {
        // The TTL will reclaim the lock; the job result matters more.
        warn!(lock_key, error = %err, "failed to release lock");
    }

    result.map(LeaderOutcome::Led)
}

async fn release<C: SlotCache>(cache: &C, lock_key: &str, instance_id: &str) -> EvregResult<()> {
    match cache.get(lock_key).await? {
        Some(holder) if holder == instance_id => cache.delete(lock_key).await,
        Some(_) | None => {
            // Expired mid-run and possibly reacquired by someone else; leave
            // the current holder's lock alone.
            debug!(lock_key, instance_id, "lock no longer ours, not releasing");
            Ok(())
        }
    }
}
