//! REST API client and the cache fetcher built on it.
//!
//! Every transport failure is normalized into [`ApiClientError`] here and,
//! at the cache seam, into `FetchError`, so nothing above this module ever
//! inspects a reqwest error. The bearer token is read from the session store
//! per request; an impersonation begun or ended between two requests is
//! picked up automatically.

use async_trait::async_trait;
use modera_cache::{QueryFetcher, QueryKey};
use modera_core::{
    FetchError, MessageRecord, NotificationRecord, PlatformSetting, ThreadId, ThreadSummary,
    UserId,
};
use modera_gate::{maintenance_enabled, MaintenanceProbe, SessionStore};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Config error: {0}")]
    Config(String),
}

/// Error body the backend returns alongside non-success statuses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    session: SessionStore,
    timeout_ms: u64,
}

impl RestClient {
    pub fn new(config: &ClientConfig, session: SessionStore) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session,
            timeout_ms: config.request_timeout_ms,
        })
    }

    pub async fn list_threads(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<ThreadSummary>, ApiClientError> {
        let query = user_query(user_id);
        self.get_json("/api/threads", &query).await
    }

    pub async fn list_messages(
        &self,
        thread_id: ThreadId,
    ) -> Result<Vec<MessageRecord>, ApiClientError> {
        let path = format!("/api/threads/{}/messages", thread_id);
        self.get_json(&path, &[]).await
    }

    pub async fn list_notifications(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<NotificationRecord>, ApiClientError> {
        let query = user_query(user_id);
        self.get_json("/api/notifications", &query).await
    }

    pub async fn platform_settings(&self) -> Result<Vec<PlatformSetting>, ApiClientError> {
        self.get_json("/api/system/platform", &[]).await
    }

    pub(crate) async fn get_value(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, ApiClientError> {
        self.get_json(path, query).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, ApiClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(credential) = self.session.snapshot() {
            request = request.bearer_auth(credential.token);
        }
        let response = request.send().await?;
        self.parse_response(response).await
    }

    async fn parse_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let text = response.text().await?;
            let message = match serde_json::from_str::<ApiErrorBody>(&text) {
                Ok(body) => body.message,
                Err(_) => text,
            };
            Err(ApiClientError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn user_query(user_id: Option<UserId>) -> Vec<(String, String)> {
    user_id
        .map(|id| vec![("user".to_string(), id.to_string())])
        .unwrap_or_default()
}

/// Normalize an API error at the cache seam.
pub(crate) fn to_fetch_error(err: ApiClientError, timeout_ms: u64) -> FetchError {
    match err {
        ApiClientError::Http(err) => {
            if err.is_timeout() {
                FetchError::Timeout { timeout_ms }
            } else if let Some(status) = err.status() {
                FetchError::Status {
                    status: status.as_u16(),
                    message: err.to_string(),
                }
            } else if err.is_decode() {
                FetchError::Decode {
                    reason: err.to_string(),
                }
            } else {
                FetchError::Transport {
                    reason: err.to_string(),
                }
            }
        }
        ApiClientError::Status { status, message } => FetchError::Status { status, message },
        ApiClientError::Serde(err) => FetchError::Decode {
            reason: err.to_string(),
        },
        ApiClientError::InvalidResponse(reason) => FetchError::Decode { reason },
        ApiClientError::Config(reason) => FetchError::Transport { reason },
    }
}

/// Map a cache key to its REST endpoint.
pub(crate) fn endpoint_for(key: &QueryKey) -> Result<(String, Vec<(String, String)>), FetchError> {
    match key.segments() {
        [root] if root == "threads" => Ok(("/api/threads".to_string(), Vec::new())),
        [root, user] if root == "threads" => Ok((
            "/api/threads".to_string(),
            vec![("user".to_string(), user.clone())],
        )),
        [root, thread] if root == "messages" => {
            Ok((format!("/api/threads/{}/messages", thread), Vec::new()))
        }
        [root] if root == "notifications" => Ok(("/api/notifications".to_string(), Vec::new())),
        [root, user] if root == "notifications" => Ok((
            "/api/notifications".to_string(),
            vec![("user".to_string(), user.clone())],
        )),
        _ => Err(FetchError::UnknownKey {
            key: key.to_string(),
        }),
    }
}

/// [`QueryFetcher`] that routes cache keys to REST endpoints.
pub struct ApiFetcher {
    rest: RestClient,
}

impl ApiFetcher {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl QueryFetcher for ApiFetcher {
    async fn fetch(&self, key: &QueryKey) -> Result<Value, FetchError> {
        let (path, query) = endpoint_for(key)?;
        debug!(key = %key, path = %path, "fetching query");
        self.rest
            .get_value(&path, &query)
            .await
            .map_err(|err| to_fetch_error(err, self.rest.timeout_ms))
    }
}

#[async_trait]
impl MaintenanceProbe for RestClient {
    async fn fetch_enabled(&self) -> Result<bool, FetchError> {
        let settings = self
            .platform_settings()
            .await
            .map_err(|err| to_fetch_error(err, self.timeout_ms))?;
        Ok(maintenance_enabled(&settings))
    }
}
