//! Cache entry snapshots.

use super::key::QueryKey;
use modera_core::Timestamp;

/// Lifecycle state of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// Never fetched; a fetch is in flight or about to start.
    Pending,
    /// Fetched within the staleness window.
    Fresh,
    /// Past the staleness window or explicitly invalidated; the last value
    /// is still servable while a refetch happens.
    Stale,
    /// The last fetch failed; the previous value, if any, is still servable.
    Error,
}

/// Point-in-time view of one cache entry.
///
/// Snapshots are cheap clones handed to subscribers; mutating one has no
/// effect on the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub value: Option<serde_json::Value>,
    pub fetched_at: Option<Timestamp>,
    pub status: QueryStatus,
    /// Failed fetch attempts since the last success or invalidation.
    pub attempts: u32,
}

impl CacheEntry {
    /// Whether a value can be rendered, fresh or not.
    pub fn is_servable(&self) -> bool {
        self.value.is_some()
    }
}
