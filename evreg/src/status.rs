//! Status records and operator flags stored in the cache.
//!
//! Both long-running maintenance jobs publish their progress under well-known
//! keys so operators can poll them over the API or straight from the cache.
//! Terminal records linger for an hour. An in-flight reinitialization record
//! carries no expiry (the run always overwrites it with a terminal record,
//! and the next rebuild replaces whatever a crashed run left); in-flight
//! consistency records expire after ten minutes.

use crate::error::{ErrorKind, EvregResult};
use crate::evreg_error;
use crate::keys::{
    CONSISTENCY_STATUS_KEY, MANUAL_REINITIALIZATION_KEY, MANUAL_REINITIALIZATION_TTL_SECS,
    MANUAL_REINITIALIZATION_VALUE, REINITIALIZATION_STATUS_KEY, STATUS_RUNNING_TTL_SECS,
    STATUS_TERMINAL_TTL_SECS,
};
use crate::store::cache::SlotCache;
use crate::types::{ConsistencyStatus, ProgressState, ReinitializationStatus};

fn encode<T: serde::Serialize>(value: &T) -> EvregResult<String> {
    serde_json::to_string(value).map_err(|err| {
        evreg_error!(
            ErrorKind::SerializationError,
            "Failed to serialize status record",
            source: err
        )
    })
}

/// Publishes the reinitialization status record.
pub async fn write_reinitialization_status<C: SlotCache>(
    cache: &C,
    status: &ReinitializationStatus,
) -> EvregResult<()> {
    let encoded = encode(status)?;
    if status.state.is_terminal() {
        cache
            .put(REINITIALIZATION_STATUS_KEY, &encoded, STATUS_TERMINAL_TTL_SECS)
            .await
    } else {
        cache.put_forever(REINITIALIZATION_STATUS_KEY, &encoded).await
    }
}

/// Reads the reinitialization status record, [`None`] when no run has been
/// recorded recently.
pub async fn read_reinitialization_status<C: SlotCache>(
    cache: &C,
) -> EvregResult<Option<ReinitializationStatus>> {
    let Some(raw) = cache.get(REINITIALIZATION_STATUS_KEY).await? else {
        return Ok(None);
    };

    Ok(Some(serde_json::from_str(&raw)?))
}

/// Publishes the consistency status record.
///
/// A failed cycle keeps the short TTL: the next cycle is at most one polling
/// interval away and will overwrite it anyway.
pub async fn write_consistency_status<C: SlotCache>(
    cache: &C,
    status: &ConsistencyStatus,
) -> EvregResult<()> {
    let ttl_secs = match status.state {
        ProgressState::Completed => STATUS_TERMINAL_TTL_SECS,
        _ => STATUS_RUNNING_TTL_SECS,
    };

    cache.put(CONSISTENCY_STATUS_KEY, &encode(status)?, ttl_secs).await
}

/// Reads the consistency status record, [`None`] when no cycle has been
/// recorded recently.
pub async fn read_consistency_status<C: SlotCache>(
    cache: &C,
) -> EvregResult<Option<ConsistencyStatus>> {
    let Some(raw) = cache.get(CONSISTENCY_STATUS_KEY).await? else {
        return Ok(None);
    };

    Ok(Some(serde_json::from_str(&raw)?))
}

/// Raises the manual-reinitialization flag, which suppresses automatic
/// reconciliation until the rebuild finishes or the flag expires.
pub async fn set_manual_reinitialization<C: SlotCache>(cache: &C) -> EvregResult<()> {
    cache
        .put(
            MANUAL_REINITIALIZATION_KEY,
            MANUAL_REINITIALIZATION_VALUE,
            MANUAL_REINITIALIZATION_TTL_SECS,
        )
        .await
}

/// Clears the manual-reinitialization flag.
pub async fn clear_manual_reinitialization<C: SlotCache>(cache: &C) -> EvregResult<()> {
    cache.delete(MANUAL_REINITIALIZATION_KEY).await
}

/// Returns whether a manual reinitialization is currently in flight.
pub async fn is_manual_reinitialization_active<C: SlotCache>(cache: &C) -> EvregResult<bool> {
    Ok(cache.get(MANUAL_REINITIALIZATION_KEY).await?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cache::MemorySlotCache;

    #[tokio::test]
    async fn reinitialization_status_round_trips() {
        let cache = MemorySlotCache::new();

        assert!(read_reinitialization_status(&cache).await.unwrap().is_none());

        let mut status = ReinitializationStatus::starting(10);
        status.advance(5);
        write_reinitialization_status(&cache, &status).await.unwrap();

        let read = read_reinitialization_status(&cache).await.unwrap().unwrap();
        assert_eq!(read.state, ProgressState::Running);
        assert_eq!(read.completed_events, 5);
        assert_eq!(read.percent_complete, 50);
        // In-flight reinitialization records carry no expiry.
        assert_eq!(cache.stored_ttl_secs(REINITIALIZATION_STATUS_KEY).await, None);
    }

    #[tokio::test]
    async fn terminal_records_linger_longer() {
        let cache = MemorySlotCache::new();

        let mut status = ReinitializationStatus::starting(10);
        status.complete();
        write_reinitialization_status(&cache, &status).await.unwrap();

        assert_eq!(
            cache.stored_ttl_secs(REINITIALIZATION_STATUS_KEY).await,
            Some(STATUS_TERMINAL_TTL_SECS)
        );
    }

    #[tokio::test]
    async fn consistency_records_expire_unless_completed() {
        let cache = MemorySlotCache::new();

        let mut status = ConsistencyStatus::running(4);
        write_consistency_status(&cache, &status).await.unwrap();
        assert_eq!(
            cache.stored_ttl_secs(CONSISTENCY_STATUS_KEY).await,
            Some(STATUS_RUNNING_TTL_SECS)
        );

        status.fail("snapshot failed".to_string());
        write_consistency_status(&cache, &status).await.unwrap();
        assert_eq!(
            cache.stored_ttl_secs(CONSISTENCY_STATUS_KEY).await,
            Some(STATUS_RUNNING_TTL_SECS)
        );

        let mut status = ConsistencyStatus::running(4);
        status.complete(crate::types::ReconcileTally::default());
        write_consistency_status(&cache, &status).await.unwrap();
        assert_eq!(
            cache.stored_ttl_secs(CONSISTENCY_STATUS_KEY).await,
            Some(STATUS_TERMINAL_TTL_SECS)
        );
    }

    #[tokio::test]
    async fn manual_flag_lifecycle() {
        let cache = MemorySlotCache::new();

        assert!(!is_manual_reinitialization_active(&cache).await.unwrap());

        set_manual_reinitialization(&cache).await.unwrap();
        assert!(is_manual_reinitialization_active(&cache).await.unwrap());
        assert_eq!(
            cache.get(MANUAL_REINITIALIZATION_KEY).await.unwrap(),
            Some(MANUAL_REINITIALIZATION_VALUE.to_string())
        );
        assert_eq!(
            cache.stored_ttl_secs(MANUAL_REINITIALIZATION_KEY).await,
            Some(MANUAL_REINITIALIZATION_TTL_SECS)
        );

        clear_manual_reinitialization(&cache).await.unwrap();
        assert!(!is_manual_reinitialization_active(&cache).await.unwrap());
    }
}
