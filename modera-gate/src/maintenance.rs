//! Maintenance flag monitor.
//!
//! One TTL-gated read of the platform settings endpoint, shared by every
//! navigation. The parse is deliberately forgiving: a missing entry, an empty
//! value list, or any string other than `"true"` reads as disabled, so a
//! misbehaving backend can never lock users out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use modera_cache::GatedFetcher;
use modera_core::{FetchError, PlatformSetting};

/// Settings key for the maintenance flag.
pub const MAINTENANCE_FLAG_KEY: &str = "maintenance-mode";

/// Fetches the current maintenance state from the backend.
///
/// Implemented by the REST layer; the monitor only cares about the boolean.
#[async_trait]
pub trait MaintenanceProbe: Send + Sync {
    async fn fetch_enabled(&self) -> Result<bool, FetchError>;
}

/// Interpret a platform settings list.
pub fn maintenance_enabled(settings: &[PlatformSetting]) -> bool {
    settings
        .iter()
        .find(|setting| setting.key == MAINTENANCE_FLAG_KEY)
        .and_then(|setting| setting.value.first())
        .map(|value| value == "true")
        .unwrap_or(false)
}

/// TTL-cached view of the maintenance flag.
pub struct MaintenanceMonitor {
    probe: Arc<dyn MaintenanceProbe>,
    gate: GatedFetcher<bool>,
}

impl MaintenanceMonitor {
    pub fn new(probe: Arc<dyn MaintenanceProbe>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            probe,
            gate: GatedFetcher::new(ttl, timeout, false),
        }
    }

    /// Current flag value; at most one probe call per TTL window.
    pub async fn is_enabled(&self) -> bool {
        let probe = Arc::clone(&self.probe);
        self.gate
            .read(MAINTENANCE_FLAG_KEY, move || async move {
                probe.fetch_enabled().await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn setting(key: &str, values: &[&str]) -> PlatformSetting {
        PlatformSetting {
            key: key.to_string(),
            value: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_enabled() {
        let settings = vec![
            setting("site-name", &["Moderate Tech"]),
            setting("maintenance-mode", &["true"]),
        ];
        assert!(maintenance_enabled(&settings));
    }

    #[test]
    fn test_parse_fails_open_on_anything_else() {
        assert!(!maintenance_enabled(&[]));
        assert!(!maintenance_enabled(&[setting("maintenance-mode", &[])]));
        assert!(!maintenance_enabled(&[setting("maintenance-mode", &["false"])]));
        assert!(!maintenance_enabled(&[setting("maintenance-mode", &["TRUE"])]));
        assert!(!maintenance_enabled(&[setting("maintenance-mode", &["yes"])]));
        assert!(!maintenance_enabled(&[setting("other", &["true"])]));
    }

    #[test]
    fn test_parse_uses_first_value_only() {
        assert!(maintenance_enabled(&[setting(
            "maintenance-mode",
            &["true", "false"]
        )]));
        assert!(!maintenance_enabled(&[setting(
            "maintenance-mode",
            &["false", "true"]
        )]));
    }

    struct ScriptedProbe {
        calls: AtomicU32,
        results: Mutex<Vec<Result<bool, FetchError>>>,
    }

    #[async_trait]
    impl MaintenanceProbe for ScriptedProbe {
        async fn fetch_enabled(&self) -> Result<bool, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.lock().unwrap().remove(0)
        }
    }

    #[tokio::test]
    async fn test_monitor_memoizes_within_ttl() {
        let probe = Arc::new(ScriptedProbe {
            calls: AtomicU32::new(0),
            results: Mutex::new(vec![Ok(true), Ok(false)]),
        });
        let monitor = MaintenanceMonitor::new(
            probe.clone(),
            Duration::from_secs(30),
            Duration::from_secs(2),
        );

        assert!(monitor.is_enabled().await);
        assert!(monitor.is_enabled().await, "second read is served from cache");
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_monitor_fails_open() {
        let probe = Arc::new(ScriptedProbe {
            calls: AtomicU32::new(0),
            results: Mutex::new(vec![Err(FetchError::Transport {
                reason: "refused".to_string(),
            })]),
        });
        let monitor = MaintenanceMonitor::new(
            probe,
            Duration::from_secs(30),
            Duration::from_secs(2),
        );
        assert!(!monitor.is_enabled().await);
    }
}
