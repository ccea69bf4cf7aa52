//! Realtime Wire Events
//!
//! This module defines the event types delivered over the two realtime
//! channels (messages, notifications) and the frames the client sends back.
//! Raw JSON is decoded and validated here, at the channel boundary; nothing
//! downstream ever branches on untyped payloads.

use modera_core::{MessageRecord, NotificationRecord, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The two independent realtime channels.
///
/// Ordering is guaranteed per channel only; the server makes no promise
/// about interleaving between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Messages,
    Notifications,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Messages => f.write_str("messages"),
            ChannelKind::Notifications => f.write_str("notifications"),
        }
    }
}

// ============================================================================
// INBOUND EVENTS
// ============================================================================

/// Events delivered on the messages channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageEvent {
    /// A new message landed in one of the user's threads.
    #[serde(rename = "message:new")]
    MessageNew { message: MessageRecord },

    /// A participant's presence changed.
    #[serde(rename = "user:online")]
    UserOnline { user_id: UserId, online: bool },
}

impl MessageEvent {
    /// Get the event type as a string for logging/debugging.
    pub fn event_type(&self) -> &'static str {
        match self {
            MessageEvent::MessageNew { .. } => "message:new",
            MessageEvent::UserOnline { .. } => "user:online",
        }
    }
}

/// Events delivered on the notifications channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationEvent {
    /// A new notification for the connected user.
    #[serde(rename = "notification:new")]
    NotificationNew { notification: NotificationRecord },
}

impl NotificationEvent {
    /// Get the event type as a string for logging/debugging.
    pub fn event_type(&self) -> &'static str {
        match self {
            NotificationEvent::NotificationNew { .. } => "notification:new",
        }
    }
}

/// A decoded event tagged with the channel it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message(MessageEvent),
    Notification(NotificationEvent),
}

impl InboundEvent {
    pub fn channel(&self) -> ChannelKind {
        match self {
            InboundEvent::Message(_) => ChannelKind::Messages,
            InboundEvent::Notification(_) => ChannelKind::Notifications,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            InboundEvent::Message(event) => event.event_type(),
            InboundEvent::Notification(event) => event.event_type(),
        }
    }
}

/// Decode failure at the channel boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to decode {channel} event: {reason}")]
pub struct EventDecodeError {
    pub channel: ChannelKind,
    pub reason: String,
}

/// Decode a raw text frame from the given channel.
///
/// This is the only place raw realtime JSON is parsed. Unknown event tags
/// and malformed payloads are rejected here.
pub fn decode(channel: ChannelKind, text: &str) -> Result<InboundEvent, EventDecodeError> {
    let map_err = |err: serde_json::Error| EventDecodeError {
        channel,
        reason: err.to_string(),
    };

    match channel {
        ChannelKind::Messages => serde_json::from_str::<MessageEvent>(text)
            .map(InboundEvent::Message)
            .map_err(map_err),
        ChannelKind::Notifications => serde_json::from_str::<NotificationEvent>(text)
            .map(InboundEvent::Notification)
            .map_err(map_err),
    }
}

// ============================================================================
// OUTBOUND FRAMES
// ============================================================================

/// Frames the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    /// Connection-time authentication payload.
    #[serde(rename = "auth")]
    Auth { token: String },

    /// Announce interest in a logical room (the user's ID).
    #[serde(rename = "join")]
    Join { room: String },
}

impl OutboundFrame {
    /// Serialize to the wire text form.
    pub fn to_wire(&self) -> String {
        // OutboundFrame has no non-serializable fields; encoding cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
