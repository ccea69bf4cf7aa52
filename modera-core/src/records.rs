//! Domain records shared by REST responses and realtime payloads.

use crate::identity::{MessageId, NotificationId, ThreadId, Timestamp, UserId};
use crate::notification::NotificationKind;
use serde::{Deserialize, Serialize};

/// A single message inside a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: MessageId,
    pub thread_id: ThreadId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub body: String,
    pub sent_at: Timestamp,
}

/// Thread listing entry as returned by the threads endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: ThreadId,
    pub participants: Vec<UserId>,
    pub last_message_at: Option<Timestamp>,
    pub unread_count: u32,
}

/// A delivered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub notification_id: NotificationId,
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: Option<String>,
    pub created_at: Timestamp,
}

/// One entry of the platform settings list.
///
/// The backend models settings as a key plus a list of string values; the
/// maintenance flag is the entry with key `maintenance-mode` whose first
/// value is the string `"true"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSetting {
    pub key: String,
    pub value: Vec<String>,
}
