//! Moderate Tech client sync layer entry point.
//!
//! Wires the pieces together: configuration, the REST client, the query
//! cache, both realtime channels, the cache synchronizer, and the routing
//! gate, all assembled by [`SyncEngine`].

pub mod api;
pub mod config;
pub mod engine;

pub use api::{ApiClientError, ApiFetcher, RestClient};
pub use config::{CacheSettings, ClientConfig, ConfigError};
pub use engine::SyncEngine;
