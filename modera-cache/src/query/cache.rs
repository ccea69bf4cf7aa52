//! The query cache: subscriptions, invalidation, retry.
//!
//! All state lives behind one mutex inside an `Arc`; the public handle is a
//! cheap clone. Fetches run on spawned tasks, so a tokio runtime must be
//! current when entries are first touched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use modera_core::{CacheError, FetchError, Timestamp};
use serde_json::Value;
use tracing::{debug, warn};

use super::entry::{CacheEntry, QueryStatus};
use super::key::QueryKey;
use super::retry::RetryPolicy;

/// Fetches the document behind a cache key.
///
/// Implemented by the REST layer; injected at cache construction so tests
/// can script responses.
#[async_trait]
pub trait QueryFetcher: Send + Sync + 'static {
    async fn fetch(&self, key: &QueryKey) -> Result<Value, FetchError>;
}

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age past which a fresh entry reads as stale.
    pub stale_after: Duration,
    /// Idle time past which a stale, unsubscribed entry is swept.
    pub evict_after: Duration,
    /// How often the background sweeper runs.
    pub sweep_interval: Duration,
    /// Backoff schedule for failed fetches.
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            evict_after: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_after(mut self, duration: Duration) -> Self {
        self.stale_after = duration;
        self
    }

    pub fn with_evict_after(mut self, duration: Duration) -> Self {
        self.evict_after = duration;
        self
    }

    pub fn with_sweep_interval(mut self, duration: Duration) -> Self {
        self.sweep_interval = duration;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

type Listener = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

struct EntryState {
    value: Option<Value>,
    fetched_at: Option<Timestamp>,
    status: QueryStatus,
    attempts: u32,
    /// A fetch task currently owns this entry; further triggers coalesce.
    fetching: bool,
    /// Invalidated while a fetch was in flight; refetch once it lands.
    dirty: bool,
    last_touched: Timestamp,
    listeners: Vec<(u64, Listener)>,
}

impl EntryState {
    fn pending() -> Self {
        Self {
            value: None,
            fetched_at: None,
            status: QueryStatus::Pending,
            attempts: 0,
            fetching: false,
            dirty: false,
            last_touched: Utc::now(),
            listeners: Vec::new(),
        }
    }
}

struct CacheInner {
    entries: Mutex<HashMap<QueryKey, EntryState>>,
    fetcher: Arc<dyn QueryFetcher>,
    config: CacheConfig,
    next_listener_id: AtomicU64,
}

/// Key-addressed cache of query results.
///
/// Cloning shares the underlying store. Construct one per engine and pass it
/// to the components that need it; per the design notes this is deliberately
/// not a global.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

enum NextStep {
    Done,
    Refetch,
    RetryAfter(Duration),
}

impl QueryCache {
    pub fn new(fetcher: Arc<dyn QueryFetcher>, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                fetcher,
                config,
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn with_defaults(fetcher: Arc<dyn QueryFetcher>) -> Self {
        Self::new(fetcher, CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // A poisoned lock still guards a consistent map; recover the guard.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<QueryKey, EntryState>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current snapshot for a key.
    ///
    /// First touch registers the entry as pending and starts a fetch. A
    /// stale entry is returned as-is; refetching stale data is driven by
    /// subscription or invalidation, not by reads.
    pub fn get(&self, key: &QueryKey) -> CacheEntry {
        let (snapshot, needs_fetch) = {
            let mut entries = self.lock_entries();
            let state = entries.entry(key.clone()).or_insert_with(EntryState::pending);
            state.last_touched = Utc::now();
            let needs_fetch = state.status == QueryStatus::Pending && !state.fetching;
            (snapshot_entry(key, state, &self.inner.config), needs_fetch)
        };
        if needs_fetch {
            self.spawn_fetch(key.clone());
        }
        snapshot
    }

    /// Register interest in a key.
    ///
    /// The listener fires on every status or value transition. The returned
    /// guard unsubscribes on drop. Subscribing to a pending or stale entry
    /// triggers a fetch; an entry parked in the error state stays parked
    /// until [`QueryCache::invalidate`] or [`QueryCache::retry`].
    pub fn subscribe(
        &self,
        key: &QueryKey,
        listener: impl Fn(&CacheEntry) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let needs_fetch = {
            let mut entries = self.lock_entries();
            let state = entries.entry(key.clone()).or_insert_with(EntryState::pending);
            state.last_touched = Utc::now();
            state.listeners.push((id, Arc::new(listener)));
            let effective = effective_status(state, &self.inner.config);
            !state.fetching
                && matches!(effective, QueryStatus::Pending | QueryStatus::Stale)
        };
        if needs_fetch {
            self.spawn_fetch(key.clone());
        }
        Subscription {
            inner: Arc::downgrade(&self.inner),
            key: key.clone(),
            id,
        }
    }

    /// Mark every entry under `prefix` stale.
    ///
    /// Subscribed entries refetch immediately (coalesced with any in-flight
    /// fetch); idle entries wait for their next subscription. Returns how
    /// many entries matched.
    pub fn invalidate(&self, prefix: &QueryKey) -> Result<usize, CacheError> {
        let mut to_fetch = Vec::new();
        let mut notifications = Vec::new();
        let matched = {
            let mut entries = self
                .inner
                .entries
                .lock()
                .map_err(|_| CacheError::LockPoisoned)?;
            let mut matched = 0;
            for (key, state) in entries.iter_mut() {
                if !key.starts_with(prefix) {
                    continue;
                }
                matched += 1;
                state.attempts = 0;
                if state.status != QueryStatus::Pending {
                    state.status = QueryStatus::Stale;
                }
                if state.fetching {
                    state.dirty = true;
                } else if !state.listeners.is_empty() {
                    to_fetch.push(key.clone());
                }
                if !state.listeners.is_empty() {
                    let snapshot = snapshot_entry(key, state, &self.inner.config);
                    let listeners: Vec<Listener> =
                        state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
                    notifications.push((listeners, snapshot));
                }
            }
            matched
        };

        for (listeners, snapshot) in notifications {
            for listener in &listeners {
                listener(&snapshot);
            }
        }
        debug!(prefix = %prefix, matched, "cache invalidate");
        for key in to_fetch {
            self.spawn_fetch(key);
        }
        Ok(matched)
    }

    /// Manually retry an entry parked in the error state.
    pub fn retry(&self, key: &QueryKey) -> Result<(), CacheError> {
        {
            let mut entries = self
                .inner
                .entries
                .lock()
                .map_err(|_| CacheError::LockPoisoned)?;
            let state = entries.get_mut(key).ok_or_else(|| CacheError::UnknownEntry {
                key: key.to_string(),
            })?;
            state.attempts = 0;
        }
        self.spawn_fetch(key.clone());
        Ok(())
    }

    /// Force a refetch of every subscribed entry.
    ///
    /// This is the degraded-mode poll used while a realtime channel is down;
    /// push-based invalidation makes it unnecessary otherwise.
    pub fn refresh_subscribed(&self) -> usize {
        let mut to_fetch = Vec::new();
        {
            let mut entries = self.lock_entries();
            for (key, state) in entries.iter_mut() {
                if state.listeners.is_empty() {
                    continue;
                }
                state.attempts = 0;
                if state.fetching {
                    state.dirty = true;
                    continue;
                }
                if state.status != QueryStatus::Pending {
                    state.status = QueryStatus::Stale;
                }
                to_fetch.push(key.clone());
            }
        }
        let count = to_fetch.len();
        for key in to_fetch {
            self.spawn_fetch(key);
        }
        count
    }

    /// Evict entries that are stale or errored, unsubscribed, and idle past
    /// the eviction window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let evict_after = self.inner.config.evict_after;
        let config = self.inner.config.clone();
        let now = Utc::now();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, state| {
            if !state.listeners.is_empty() || state.fetching {
                return true;
            }
            let effective = effective_status(state, &config);
            if !matches!(effective, QueryStatus::Stale | QueryStatus::Error) {
                return true;
            }
            let idle = now
                .signed_duration_since(state.last_touched)
                .to_std()
                .unwrap_or(Duration::ZERO);
            idle < evict_after
        });
        before - entries.len()
    }

    /// Run [`QueryCache::sweep`] on the configured interval until the handle
    /// is aborted.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.inner.config.sweep_interval);
            loop {
                ticker.tick().await;
                let evicted = cache.sweep();
                if evicted > 0 {
                    debug!(evicted, "cache sweep");
                }
            }
        })
    }

    /// Number of live entries, swept or not.
    pub fn entry_count(&self) -> usize {
        self.lock_entries().len()
    }

    /// Number of listeners registered for a key.
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.lock_entries()
            .get(key)
            .map(|state| state.listeners.len())
            .unwrap_or(0)
    }

    fn spawn_fetch(&self, key: QueryKey) {
        {
            let mut entries = self.lock_entries();
            let Some(state) = entries.get_mut(&key) else {
                return;
            };
            // An in-flight fetch already covers this trigger. Only
            // invalidation marks the entry dirty, because only invalidation
            // demands data fetched after a specific point.
            if state.fetching {
                return;
            }
            state.fetching = true;
        }
        let cache = self.clone();
        tokio::spawn(async move {
            cache.run_fetch(key).await;
        });
    }

    async fn run_fetch(&self, key: QueryKey) {
        loop {
            let result = self.inner.fetcher.fetch(&key).await;
            match self.apply_fetch_result(&key, result) {
                NextStep::Done => break,
                NextStep::Refetch => continue,
                NextStep::RetryAfter(delay) => tokio::time::sleep(delay).await,
            }
        }
    }

    fn apply_fetch_result(&self, key: &QueryKey, result: Result<Value, FetchError>) -> NextStep {
        let (step, listeners, snapshot) = {
            let mut entries = self.lock_entries();
            let Some(state) = entries.get_mut(key) else {
                return NextStep::Done;
            };

            let step = match result {
                Ok(value) => {
                    state.value = Some(value);
                    state.fetched_at = Some(Utc::now());
                    state.status = QueryStatus::Fresh;
                    state.attempts = 0;
                    if state.dirty {
                        state.dirty = false;
                        NextStep::Refetch
                    } else {
                        state.fetching = false;
                        NextStep::Done
                    }
                }
                Err(err) => {
                    let attempt = state.attempts;
                    state.attempts += 1;
                    state.status = QueryStatus::Error;
                    warn!(key = %key, attempt, error = %err, "query fetch failed");
                    if state.dirty {
                        state.dirty = false;
                        NextStep::Refetch
                    } else if !err.is_transient()
                        || self.inner.config.retry.is_exhausted(state.attempts)
                    {
                        state.fetching = false;
                        NextStep::Done
                    } else {
                        NextStep::RetryAfter(self.inner.config.retry.delay_for(attempt))
                    }
                }
            };

            let snapshot = snapshot_entry(key, state, &self.inner.config);
            let listeners: Vec<Listener> =
                state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            (step, listeners, snapshot)
        };

        for listener in &listeners {
            listener(&snapshot);
        }
        step
    }
}

/// Scoped cache interest; unsubscribes on drop.
pub struct Subscription {
    inner: Weak<CacheInner>,
    key: QueryKey,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut entries = inner.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(state) = entries.get_mut(&self.key) {
                state.listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

fn effective_status(state: &EntryState, config: &CacheConfig) -> QueryStatus {
    match state.status {
        QueryStatus::Fresh => {
            let Some(fetched_at) = state.fetched_at else {
                return QueryStatus::Stale;
            };
            let age = Utc::now()
                .signed_duration_since(fetched_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if age < config.stale_after {
                QueryStatus::Fresh
            } else {
                QueryStatus::Stale
            }
        }
        other => other,
    }
}

fn snapshot_entry(key: &QueryKey, state: &EntryState, config: &CacheConfig) -> CacheEntry {
    CacheEntry {
        key: key.clone(),
        value: state.value.clone(),
        fetched_at: state.fetched_at,
        status: effective_status(state, config),
        attempts: state.attempts,
    }
}
