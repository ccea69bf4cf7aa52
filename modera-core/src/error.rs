//! Error types shared across the sync layer.

use thiserror::Error;

/// Failures while fetching data from the backend.
///
/// Every transport-specific failure is normalized into one of these variants
/// before it leaves the data layer, so callers never branch on the shape of a
/// reqwest or websocket error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Response decode failed: {reason}")]
    Decode { reason: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("No endpoint mapped for cache key {key}")]
    UnknownKey { key: String },
}

impl FetchError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Decode failures and unmapped keys are deterministic; retrying them
    /// burns attempts without changing the outcome.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Transport { .. }
                | FetchError::Timeout { .. }
                | FetchError::Status { status: 500..=599, .. }
        )
    }
}

/// Failures inside the query cache itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache lock poisoned")]
    LockPoisoned,

    #[error("No entry for key {key}")]
    UnknownEntry { key: String },
}

/// Failures manipulating the session store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Expected an impersonation token, got {kind}")]
    WrongTokenKind { kind: String },

    #[error("No impersonation in progress")]
    NotImpersonating,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Transport {
            reason: "connection reset".to_string()
        }
        .is_transient());
        assert!(FetchError::Timeout { timeout_ms: 2000 }.is_transient());
        assert!(FetchError::Status {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());

        assert!(!FetchError::Status {
            status: 404,
            message: "not found".to_string()
        }
        .is_transient());
        assert!(!FetchError::Decode {
            reason: "missing field".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_error_messages_are_human_readable() {
        let err = FetchError::Timeout { timeout_ms: 2000 };
        assert_eq!(err.to_string(), "Request timed out after 2000ms");
    }
}
