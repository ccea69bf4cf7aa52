//! Event-driven cache invalidation.
//!
//! The synchronizer owns a rule table mapping `(channel, event type)` to the
//! cache key prefixes that event makes stale. Notification events are first
//! checked against the session's role using the classification table in
//! `modera-core`; an out-of-role event produces no invalidations and no
//! alert. A failing invalidation is logged and swallowed so the channel can
//! keep processing the events behind it.

use std::collections::BTreeSet;
use std::sync::Arc;

use modera_cache::{QueryCache, QueryKey};
use modera_core::{NotificationRecord, UserId};
use modera_events::{ChannelKind, InboundEvent, MessageEvent, NotificationEvent};
use modera_gate::SessionStore;
use tracing::{debug, warn};

use crate::alerts::{Alert, AlertSink};
use crate::channel::RealtimeChannel;

type InvalidationFn = Arc<dyn Fn(&InboundEvent) -> Vec<QueryKey> + Send + Sync>;

/// One `(channel, event type) -> prefixes` mapping.
pub struct SyncRule {
    channel: ChannelKind,
    event_type: &'static str,
    invalidations: InvalidationFn,
}

impl SyncRule {
    pub fn new(
        channel: ChannelKind,
        event_type: &'static str,
        invalidations: impl Fn(&InboundEvent) -> Vec<QueryKey> + Send + Sync + 'static,
    ) -> Self {
        Self {
            channel,
            event_type,
            invalidations: Arc::new(invalidations),
        }
    }

    pub fn channel(&self) -> ChannelKind {
        self.channel
    }

    pub fn event_type(&self) -> &'static str {
        self.event_type
    }
}

/// Applies realtime events to the query cache.
pub struct CacheSynchronizer {
    cache: QueryCache,
    session: SessionStore,
    alerts: Arc<dyn AlertSink>,
    rules: Vec<SyncRule>,
}

impl CacheSynchronizer {
    pub fn new(cache: QueryCache, session: SessionStore, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            cache,
            session,
            alerts,
            rules: Vec::new(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<SyncRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn add_rule(&mut self, rule: SyncRule) {
        self.rules.push(rule);
    }

    /// The platform's standard rule set for a signed-in user.
    ///
    /// A new message touches the thread list (both the user-scoped and the
    /// unscoped listing) and the message queries; a new notification touches
    /// the notification queries.
    pub fn default_rules(user_id: UserId) -> Vec<SyncRule> {
        vec![
            SyncRule::new(ChannelKind::Messages, "message:new", move |_| {
                vec![
                    QueryKey::root("threads").push(user_id),
                    QueryKey::root("threads"),
                    QueryKey::root("messages"),
                ]
            }),
            SyncRule::new(ChannelKind::Notifications, "notification:new", move |_| {
                vec![
                    QueryKey::root("notifications").push(user_id),
                    QueryKey::root("notifications"),
                ]
            }),
        ]
    }

    /// Register this synchronizer's handlers on a channel.
    ///
    /// One handler per distinct event type with a rule on that channel.
    pub fn attach(self: Arc<Self>, channel: &RealtimeChannel) {
        let event_types: BTreeSet<&'static str> = self
            .rules
            .iter()
            .filter(|rule| rule.channel == channel.kind())
            .map(|rule| rule.event_type)
            .collect();

        for event_type in event_types {
            let synchronizer = Arc::clone(&self);
            channel.on(event_type, move |event| synchronizer.handle(event));
        }
    }

    /// Process one inbound event.
    pub fn handle(&self, event: &InboundEvent) {
        if let Some(notification) = notification_payload(event) {
            let scope = notification.kind.scope();
            let role = self.session.role();
            let in_scope = role.map(|role| scope.matches_role(role)).unwrap_or(false);
            if !in_scope {
                debug!(
                    kind = ?notification.kind,
                    role = ?role,
                    "dropping out-of-role notification"
                );
                return;
            }
        }

        let mut matched = false;
        for rule in &self.rules {
            if rule.channel != event.channel() || rule.event_type != event.event_type() {
                continue;
            }
            matched = true;
            for prefix in (rule.invalidations)(event) {
                match self.cache.invalidate(&prefix) {
                    Ok(count) => {
                        debug!(prefix = %prefix, entries = count, "invalidated by realtime event");
                    }
                    Err(err) => {
                        warn!(prefix = %prefix, error = %err, "cache invalidation failed");
                    }
                }
            }
        }

        if matched {
            if let Some(alert) = alert_for(event) {
                self.alerts.raise(alert);
            }
        }
    }
}

fn notification_payload(event: &InboundEvent) -> Option<&NotificationRecord> {
    match event {
        InboundEvent::Notification(NotificationEvent::NotificationNew { notification }) => {
            Some(notification)
        }
        _ => None,
    }
}

fn alert_for(event: &InboundEvent) -> Option<Alert> {
    match event {
        InboundEvent::Message(MessageEvent::MessageNew { message }) => Some(Alert::info(format!(
            "New message from {}",
            message.sender_id
        ))),
        InboundEvent::Message(MessageEvent::UserOnline { .. }) => None,
        InboundEvent::Notification(NotificationEvent::NotificationNew { notification }) => {
            Some(Alert::info(notification.title.clone()))
        }
    }
}
