//! Transient user-facing alerts raised by realtime events.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// A dismissible toast. The sync layer only produces these; rendering and
/// dismissal belong to the UI.
#[derive(Debug, Clone)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Info, message)
    }
}

/// Receives alerts from the synchronizer.
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: Alert);
}

/// Logs alerts instead of displaying them; the default for headless use.
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn raise(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Error => tracing::error!(message = %alert.message, "alert"),
            AlertLevel::Warning => tracing::warn!(message = %alert.message, "alert"),
            _ => tracing::info!(message = %alert.message, "alert"),
        }
    }
}

/// Captures alerts in memory, for tests and for UIs that drain a queue.
#[derive(Default)]
pub struct MemoryAlertSink {
    alerts: std::sync::Mutex<Vec<Alert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything captured so far.
    pub fn take(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Alert>> {
        self.alerts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl AlertSink for MemoryAlertSink {
    fn raise(&self, alert: Alert) {
        self.lock().push(alert);
    }
}
