//! The sync engine: one object that owns the whole client-side sync layer.
//!
//! Construction wires the cache to the REST fetcher and the routing gate to
//! the maintenance monitor. `start` connects both realtime channels, joins
//! the user's room, and attaches the synchronizer; `shutdown` tears all of
//! it down deterministically. A handler left registered after teardown would
//! keep mutating a cache nobody renders, so teardown is not optional.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use modera_cache::QueryCache;
use modera_core::UserId;
use modera_events::ChannelKind;
use modera_gate::{MaintenanceMonitor, RoutingGate, SessionStore};
use modera_realtime::{
    AlertSink, CacheSynchronizer, ChannelState, RealtimeChannel, TracingAlertSink,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiClientError, ApiFetcher, RestClient};
use crate::config::ClientConfig;

pub struct SyncEngine {
    config: ClientConfig,
    session: SessionStore,
    cache: QueryCache,
    rest: RestClient,
    messages: RealtimeChannel,
    notifications: RealtimeChannel,
    gate: RoutingGate,
    alerts: Arc<dyn AlertSink>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Build the engine with the default alert sink (log-only).
    pub fn new(config: ClientConfig, session: SessionStore) -> Result<Self, ApiClientError> {
        Self::with_alerts(config, session, Arc::new(TracingAlertSink))
    }

    pub fn with_alerts(
        config: ClientConfig,
        session: SessionStore,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self, ApiClientError> {
        config
            .validate()
            .map_err(|err| ApiClientError::Config(err.to_string()))?;

        let rest = RestClient::new(&config, session.clone())?;
        let fetcher = Arc::new(ApiFetcher::new(rest.clone()));
        let cache = QueryCache::new(fetcher, config.cache_config());

        let messages = RealtimeChannel::new(
            ChannelKind::Messages,
            config.messages_ws_url.clone(),
            config.reconnect.clone(),
        );
        let notifications = RealtimeChannel::new(
            ChannelKind::Notifications,
            config.notifications_ws_url.clone(),
            config.reconnect.clone(),
        );

        let monitor = MaintenanceMonitor::new(
            Arc::new(rest.clone()),
            config.maintenance_ttl(),
            config.maintenance_timeout(),
        );
        let gate = RoutingGate::new(monitor);

        Ok(Self {
            config,
            session,
            cache,
            rest,
            messages,
            notifications,
            gate,
            alerts,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Connect both channels for the signed-in user and start the background
    /// tasks (cache sweeper, degraded-mode poll).
    pub fn start(&self, user_id: UserId) {
        let Some(credential) = self.session.snapshot() else {
            warn!("sync engine start without a credential; channels stay down");
            return;
        };

        let synchronizer = Arc::new(
            CacheSynchronizer::new(
                self.cache.clone(),
                self.session.clone(),
                Arc::clone(&self.alerts),
            )
            .with_rules(CacheSynchronizer::default_rules(user_id)),
        );
        Arc::clone(&synchronizer).attach(&self.messages);
        synchronizer.attach(&self.notifications);

        self.messages.connect(&credential);
        self.notifications.connect(&credential);
        self.messages.join_room(user_id.to_string());
        self.notifications.join_room(user_id.to_string());

        let mut tasks = self.lock_tasks();
        tasks.push(self.cache.spawn_sweeper());
        tasks.push(self.spawn_poll_fallback());
        info!(user = %user_id, "sync engine started");
    }

    /// Disconnect channels and stop background tasks. Idempotent.
    pub fn shutdown(&self) {
        self.messages.disconnect();
        self.notifications.disconnect();
        let mut tasks = self.lock_tasks();
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("sync engine stopped");
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn gate(&self) -> &RoutingGate {
        &self.gate
    }

    pub fn messages(&self) -> &RealtimeChannel {
        &self.messages
    }

    pub fn notifications(&self) -> &RealtimeChannel {
        &self.notifications
    }

    /// Poll fallback: refreshes subscribed queries on the configured
    /// interval, but only while at least one channel is not connected.
    /// While both channels are up, push-based invalidation is the only
    /// refresh path.
    fn spawn_poll_fallback(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let messages = self.messages.clone();
        let notifications = self.notifications.clone();
        let interval = Duration::from_millis(self.config.refresh_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                let degraded = messages.state() != ChannelState::Connected
                    || notifications.state() != ChannelState::Connected;
                if !degraded {
                    continue;
                }
                let refreshed = cache.refresh_subscribed();
                if refreshed > 0 {
                    debug!(refreshed, "degraded-mode poll refreshed subscribed queries");
                }
            }
        })
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
