//! Realtime channels and the cache synchronizer.
//!
//! Each concern (messages, notifications) gets its own [`RealtimeChannel`]:
//! a websocket manager task that authenticates, joins the user's room,
//! decodes inbound frames at the boundary, and dispatches typed events to
//! handlers in registration order. The [`CacheSynchronizer`] is the main
//! consumer: it maps events to cache invalidations and transient alerts,
//! filtered by the session's role.

pub mod alerts;
pub mod channel;
pub mod synchronizer;

pub use alerts::{Alert, AlertLevel, AlertSink, MemoryAlertSink, TracingAlertSink};
pub use channel::{ChannelState, RealtimeChannel, ReconnectConfig};
pub use synchronizer::{CacheSynchronizer, SyncRule};
