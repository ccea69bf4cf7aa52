//! Notification kinds and their role scoping.
//!
//! Both realtime channels broadcast to every connected client of a user, so
//! the client is responsible for discarding notification types that do not
//! belong to the session's role. This table is the single authoritative
//! classification; nothing else in the workspace hardcodes a kind list.

use crate::session::Role;
use serde::{Deserialize, Serialize};

/// Every notification type the platform emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    // Admin-facing operational events.
    UserRegistered,
    SupportTicketOpened,
    ModerationEscalated,

    // Teacher-facing events.
    AnnouncementPosted,
    GradeReleased,
    ThreadReply,
}

/// Which audience a notification kind targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationScope {
    Admin,
    User,
}

impl NotificationKind {
    /// Classify this kind as admin-scoped or user-scoped.
    pub fn scope(&self) -> NotificationScope {
        match self {
            NotificationKind::UserRegistered
            | NotificationKind::SupportTicketOpened
            | NotificationKind::ModerationEscalated => NotificationScope::Admin,

            NotificationKind::AnnouncementPosted
            | NotificationKind::GradeReleased
            | NotificationKind::ThreadReply => NotificationScope::User,
        }
    }

    /// All kinds, for exhaustive table-driven tests.
    pub fn all() -> &'static [NotificationKind] {
        &[
            NotificationKind::UserRegistered,
            NotificationKind::SupportTicketOpened,
            NotificationKind::ModerationEscalated,
            NotificationKind::AnnouncementPosted,
            NotificationKind::GradeReleased,
            NotificationKind::ThreadReply,
        ]
    }
}

impl NotificationScope {
    /// Whether a session with the given role should react to this scope.
    pub fn matches_role(&self, role: Role) -> bool {
        match self {
            NotificationScope::Admin => role == Role::Admin,
            NotificationScope::User => role == Role::Teacher,
        }
    }
}
