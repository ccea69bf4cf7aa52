//! TTL-gated fetch for volatile global flags.
//!
//! The routing gate consults the maintenance flag on every navigation; this
//! wrapper keeps that cheap by memoizing the remote read for a short TTL and
//! failing open when the backend is unreachable. A failed read never resets
//! the capture time, so the very next call retries instead of waiting out
//! the TTL on a bad value.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use modera_core::FetchError;
use tokio::time::Instant;
use tracing::{debug, warn};

struct TtlSlot<T> {
    value: T,
    captured_at: Instant,
}

/// Memoized remote read with a fixed TTL and a safe fallback.
pub struct GatedFetcher<T> {
    ttl: Duration,
    timeout: Duration,
    fallback: T,
    slots: Mutex<HashMap<String, TtlSlot<T>>>,
}

impl<T: Clone> GatedFetcher<T> {
    pub fn new(ttl: Duration, timeout: Duration, fallback: T) -> Self {
        Self {
            ttl,
            timeout,
            fallback,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read the flag, fetching only when the memoized value has expired.
    ///
    /// `fetch` is bounded by the configured timeout; a timeout counts as a
    /// failure. On failure the previous value is returned if one exists,
    /// else the fallback, and the capture time is left untouched.
    pub async fn read<F, Fut>(&self, key: &str, fetch: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        if let Some(value) = self.cached(key) {
            return value;
        }

        let fetched = match tokio::time::timeout(self.timeout, fetch()).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                warn!(key, error = %err, "flag fetch failed, serving previous value");
                None
            }
            Err(_) => {
                warn!(
                    key,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "flag fetch timed out, serving previous value"
                );
                None
            }
        };

        match fetched {
            Some(value) => {
                self.store(key, value.clone());
                debug!(key, "flag refreshed");
                value
            }
            None => self.previous(key).unwrap_or_else(|| self.fallback.clone()),
        }
    }

    /// When the memoized value for `key` was captured, if ever.
    pub fn captured_at(&self, key: &str) -> Option<Instant> {
        self.lock_slots().get(key).map(|slot| slot.captured_at)
    }

    fn cached(&self, key: &str) -> Option<T> {
        self.lock_slots()
            .get(key)
            .filter(|slot| slot.captured_at.elapsed() < self.ttl)
            .map(|slot| slot.value.clone())
    }

    /// Last known value regardless of TTL, for the fail-open path.
    fn previous(&self, key: &str) -> Option<T> {
        self.lock_slots().get(key).map(|slot| slot.value.clone())
    }

    fn store(&self, key: &str, value: T) {
        self.lock_slots().insert(
            key.to_string(),
            TtlSlot {
                value,
                captured_at: Instant::now(),
            },
        );
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, TtlSlot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
