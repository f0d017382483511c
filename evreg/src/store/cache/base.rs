use std::future::Future;

use crate::error::EvregResult;

/// Trait for the key/value cache holding slot entries, locks, and status
/// records.
///
/// The cache is best-effort: implementations may lose any key at any time and
/// callers must treat every failure as recoverable by falling back to the
/// events database. All TTLs are expressed in whole seconds because that is
/// the granularity of the cache wire protocol.
pub trait SlotCache: Send + Sync {
    /// Returns the value stored under `key`, or [`None`] on a miss.
    fn get(&self, key: &str) -> impl Future<Output = EvregResult<Option<String>>> + Send;

    /// Stores `value` under `key` with the given TTL, overwriting any
    /// previous value.
    fn put(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = EvregResult<()>> + Send;

    /// Stores `value` under `key` without an expiry, overwriting any previous
    /// value and TTL.
    fn put_forever(&self, key: &str, value: &str) -> impl Future<Output = EvregResult<()>> + Send;

    /// Stores every `(key, value)` pair with the given TTL in one pipelined
    /// round trip.
    fn put_many(
        &self,
        entries: &[(String, String)],
        ttl_secs: u64,
    ) -> impl Future<Output = EvregResult<()>> + Send;

    /// Atomically stores `value` under `key` with the given TTL only when the
    /// key does not exist. Returns whether the value was stored.
    ///
    /// This is the primitive leadership locks are built on, so atomicity with
    /// respect to concurrent callers is part of the contract.
    fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = EvregResult<bool>> + Send;

    /// Deletes `key`. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = EvregResult<()>> + Send;

    /// Returns the remaining TTL of `key` in seconds, [`None`] when the key
    /// does not exist or has no expiry.
    fn ttl(&self, key: &str) -> impl Future<Output = EvregResult<Option<u64>>> + Send;

    /// Lightweight liveness check for readiness probes and reachability
    /// gating.
    fn ping(&self) -> impl Future<Output = EvregResult<()>> + Send;
}
