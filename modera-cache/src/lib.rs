//! Query cache and TTL-gated flag fetcher.
//!
//! Two independent pieces live here:
//!
//! - [`QueryCache`]: a key-addressed store of fetched query results with
//!   explicit freshness, prefix invalidation, retry with exponential backoff,
//!   and a background sweep. The realtime synchronizer invalidates it; the UI
//!   subscribes to it.
//! - [`GatedFetcher`]: a short-lived memoized remote read for volatile global
//!   flags (maintenance mode). Fails open on backend unavailability.
//!
//! Both are plain constructed values, passed to whoever needs them. There is
//! no process-wide singleton.

pub mod flag;
pub mod query;

pub use flag::GatedFetcher;
pub use query::{
    CacheConfig, CacheEntry, QueryCache, QueryFetcher, QueryKey, QueryStatus, RetryPolicy,
    Subscription,
};
