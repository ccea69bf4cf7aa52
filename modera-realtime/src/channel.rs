//! WebSocket realtime channel with reconnect backoff.
//!
//! One manager task per channel owns the transport. The public handle only
//! touches shared registries (state, handlers, rooms), so every method is
//! cheap, synchronous, and safe to call from anywhere; the task notices
//! changes through the shutdown watch and the outbound queue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use modera_core::Credential;
use modera_events::{decode, ChannelKind, InboundEvent, OutboundFrame};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Connection lifecycle. `Error` is a failed attempt awaiting its backoff;
/// the manager moves back to `Connecting` on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Reconnect schedule for a dropped transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_ms: 250,
            max_ms: 15_000,
            multiplier: 2.0,
            jitter_ms: 100,
        }
    }
}

type Handler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ChannelShared {
    kind: ChannelKind,
    url: String,
    reconnect: ReconnectConfig,
    state: Mutex<ChannelState>,
    handlers: Mutex<Vec<(String, Handler)>>,
    rooms: Mutex<Vec<String>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl ChannelShared {
    fn set_state(&self, next: ChannelState) {
        *lock(&self.state) = next;
    }
}

/// A persistent realtime connection for one concern.
#[derive(Clone)]
pub struct RealtimeChannel {
    shared: Arc<ChannelShared>,
}

impl RealtimeChannel {
    pub fn new(kind: ChannelKind, url: impl Into<String>, reconnect: ReconnectConfig) -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                kind,
                url: url.into(),
                reconnect,
                state: Mutex::new(ChannelState::Disconnected),
                handlers: Mutex::new(Vec::new()),
                rooms: Mutex::new(Vec::new()),
                outbound: Mutex::new(None),
                shutdown: Mutex::new(None),
            }),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.shared.kind
    }

    pub fn state(&self) -> ChannelState {
        *lock(&self.shared.state)
    }

    /// Start the manager task. A no-op while already connecting or
    /// connected.
    pub fn connect(&self, credential: &Credential) {
        {
            let mut state = lock(&self.shared.state);
            if matches!(*state, ChannelState::Connecting | ChannelState::Connected) {
                debug!(channel = %self.shared.kind, "connect ignored, channel already active");
                return;
            }
            *state = ChannelState::Connecting;
        }
        let (tx, rx) = watch::channel(false);
        *lock(&self.shared.shutdown) = Some(tx);
        info!(channel = %self.shared.kind, "realtime channel connecting");

        let shared = Arc::clone(&self.shared);
        let token = credential.token.clone();
        tokio::spawn(run_channel(shared, token, rx));
    }

    /// Announce interest in a room. Queued until connected and replayed
    /// after every reconnect.
    pub fn join_room(&self, topic: impl Into<String>) {
        let room = topic.into();
        {
            let mut rooms = lock(&self.shared.rooms);
            if !rooms.contains(&room) {
                rooms.push(room.clone());
            }
        }
        if let Some(sender) = lock(&self.shared.outbound).as_ref() {
            let _ = sender.send(OutboundFrame::Join { room });
        }
    }

    /// Register a handler for one event type. Handlers for the same type
    /// run in registration order.
    pub fn on(
        &self,
        event_type: impl Into<String>,
        handler: impl Fn(&InboundEvent) + Send + Sync + 'static,
    ) {
        lock(&self.shared.handlers).push((event_type.into(), Arc::new(handler)));
    }

    /// Remove every handler registered for the event type.
    pub fn off(&self, event_type: &str) {
        lock(&self.shared.handlers).retain(|(registered, _)| registered.as_str() != event_type);
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.shared.handlers).len()
    }

    /// Tear the channel down: stop the manager, drop all handlers.
    ///
    /// Safe before any connect and safe to repeat.
    pub fn disconnect(&self) {
        let sender = lock(&self.shared.shutdown).take();
        let had_session = sender.is_some();
        if let Some(tx) = sender {
            let _ = tx.send(true);
        }
        *lock(&self.shared.outbound) = None;
        lock(&self.shared.handlers).clear();
        self.shared.set_state(ChannelState::Disconnected);
        if had_session {
            info!(channel = %self.shared.kind, "realtime channel torn down");
        }
    }

    #[cfg(test)]
    fn dispatch_text(&self, text: &str) {
        dispatch(&self.shared, text);
    }
}

enum ServeEnd {
    Shutdown,
    Dropped,
}

async fn run_channel(
    shared: Arc<ChannelShared>,
    token: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = shared.reconnect.initial_ms;
    loop {
        if *shutdown.borrow() {
            break;
        }

        match tokio_tungstenite::connect_async(shared.url.as_str()).await {
            Ok((transport, _)) => {
                backoff = shared.reconnect.initial_ms;
                if let ServeEnd::Shutdown =
                    serve_connection(&shared, &token, transport, &mut shutdown).await
                {
                    shared.set_state(ChannelState::Disconnected);
                    return;
                }
            }
            Err(err) => {
                shared.set_state(ChannelState::Error);
                warn!(channel = %shared.kind, error = %err, "realtime connect failed");
            }
        }

        let delay = jittered_backoff(backoff, shared.reconnect.jitter_ms);
        tokio::select! {
            _ = shutdown.changed() => {
                shared.set_state(ChannelState::Disconnected);
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
        }
        backoff = next_backoff(backoff, &shared.reconnect);
        shared.set_state(ChannelState::Connecting);
    }
    shared.set_state(ChannelState::Disconnected);
}

async fn serve_connection<S>(
    shared: &Arc<ChannelShared>,
    token: &str,
    transport: S,
    shutdown: &mut watch::Receiver<bool>,
) -> ServeEnd
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Sink<Message>
        + Unpin,
{
    let (mut sink, mut stream) = transport.split();

    let auth = OutboundFrame::Auth {
        token: token.to_string(),
    };
    if sink.send(Message::Text(auth.to_wire())).await.is_err() {
        shared.set_state(ChannelState::Error);
        return ServeEnd::Dropped;
    }

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
    *lock(&shared.outbound) = Some(out_tx);
    shared.set_state(ChannelState::Connected);
    info!(channel = %shared.kind, "realtime channel connected");

    // Replay room membership; a reconnect must rejoin everything.
    let rooms: Vec<String> = lock(&shared.rooms).clone();
    for room in rooms {
        if sink
            .send(Message::Text(OutboundFrame::Join { room }.to_wire()))
            .await
            .is_err()
        {
            break;
        }
    }

    let end = loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.close().await;
                break ServeEnd::Shutdown;
            }
            Some(frame) = out_rx.recv() => {
                if sink.send(Message::Text(frame.to_wire())).await.is_err() {
                    break ServeEnd::Dropped;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => dispatch(shared, &text),
                Some(Ok(Message::Close(_))) | None => break ServeEnd::Dropped,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(channel = %shared.kind, error = %err, "realtime stream error");
                    break ServeEnd::Dropped;
                }
            }
        }
    };

    *lock(&shared.outbound) = None;
    if matches!(end, ServeEnd::Dropped) {
        shared.set_state(ChannelState::Disconnected);
        info!(channel = %shared.kind, "realtime channel disconnected");
    }
    end
}

/// Decode a frame and fan it out to the matching handlers, in registration
/// order. Undecodable frames are logged and dropped; the channel lives on.
fn dispatch(shared: &ChannelShared, text: &str) {
    match decode(shared.kind, text) {
        Ok(event) => {
            let handlers: Vec<Handler> = lock(&shared.handlers)
                .iter()
                .filter(|(event_type, _)| event_type.as_str() == event.event_type())
                .map(|(_, handler)| Arc::clone(handler))
                .collect();
            debug!(
                channel = %shared.kind,
                event = event.event_type(),
                handlers = handlers.len(),
                "dispatching realtime event"
            );
            for handler in handlers {
                handler(&event);
            }
        }
        Err(err) => {
            warn!(channel = %shared.kind, error = %err, "dropping undecodable frame");
        }
    }
}

fn next_backoff(current_ms: u64, config: &ReconnectConfig) -> u64 {
    let next = (current_ms as f64 * config.multiplier) as u64;
    next.min(config.max_ms)
}

fn jittered_backoff(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    base_ms.saturating_add(nanos % jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use modera_core::{MessageId, MessageRecord, Role, ThreadId, UserId};
    use modera_events::MessageEvent;

    fn channel(kind: ChannelKind) -> RealtimeChannel {
        RealtimeChannel::new(kind, "ws://127.0.0.1:9/ws", ReconnectConfig::default())
    }

    fn message_frame() -> String {
        let event = MessageEvent::MessageNew {
            message: MessageRecord {
                message_id: MessageId::generate(),
                thread_id: ThreadId::generate(),
                sender_id: UserId::generate(),
                recipient_id: UserId::generate(),
                body: "hi".to_string(),
                sent_at: Utc::now(),
            },
        };
        serde_json::to_string(&event).unwrap()
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let ch = channel(ChannelKind::Messages);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        ch.on("message:new", move |_| first.lock().unwrap().push(1));
        let second = Arc::clone(&seen);
        ch.on("message:new", move |_| second.lock().unwrap().push(2));

        ch.dispatch_text(&message_frame());
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_handlers_filter_by_event_type() {
        let ch = channel(ChannelKind::Messages);
        let seen = Arc::new(Mutex::new(0u32));

        let sink = Arc::clone(&seen);
        ch.on("user:online", move |_| *sink.lock().unwrap() += 1);

        ch.dispatch_text(&message_frame());
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn test_off_removes_all_handlers_for_a_type() {
        let ch = channel(ChannelKind::Messages);
        ch.on("message:new", |_| {});
        ch.on("message:new", |_| {});
        ch.on("user:online", |_| {});
        assert_eq!(ch.handler_count(), 3);

        ch.off("message:new");
        assert_eq!(ch.handler_count(), 1);
    }

    #[test]
    fn test_undecodable_frame_is_dropped_silently() {
        let ch = channel(ChannelKind::Messages);
        let seen = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&seen);
        ch.on("message:new", move |_| *sink.lock().unwrap() += 1);

        ch.dispatch_text("not json at all");
        ch.dispatch_text(r#"{"type":"message:vanished"}"#);
        assert_eq!(*seen.lock().unwrap(), 0);

        ch.dispatch_text(&message_frame());
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_disconnect_before_connect_is_safe_and_idempotent() {
        let ch = channel(ChannelKind::Notifications);
        ch.on("notification:new", |_| {});

        ch.disconnect();
        ch.disconnect();

        assert_eq!(ch.state(), ChannelState::Disconnected);
        assert_eq!(ch.handler_count(), 0, "teardown must drop all handlers");
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_and_disconnect_stops_the_manager() {
        let ch = channel(ChannelKind::Messages);
        let credential = Credential::regular("tok", Role::Teacher);

        ch.connect(&credential);
        assert!(matches!(
            ch.state(),
            ChannelState::Connecting | ChannelState::Error
        ));
        // A second connect while active must not spawn another manager.
        ch.connect(&credential);

        ch.disconnect();
        assert_eq!(ch.state(), ChannelState::Disconnected);
        assert_eq!(ch.handler_count(), 0);
    }

    #[test]
    fn test_join_room_is_deduplicated() {
        let ch = channel(ChannelKind::Messages);
        ch.join_room("user-1");
        ch.join_room("user-1");
        ch.join_room("user-2");
        assert_eq!(lock(&ch.shared.rooms).len(), 2);
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(jittered_backoff(500, 0), 500);
        for _ in 0..20 {
            let delay = jittered_backoff(500, 100);
            assert!((500..600).contains(&delay));
        }
    }

    #[test]
    fn test_backoff_progression_caps_at_max() {
        let config = ReconnectConfig {
            initial_ms: 250,
            max_ms: 1_000,
            multiplier: 2.0,
            jitter_ms: 0,
        };
        let mut backoff = config.initial_ms;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(backoff);
            backoff = next_backoff(backoff, &config);
        }
        assert_eq!(seen, vec![250, 500, 1_000, 1_000, 1_000]);
    }
}
