//! Moderate Tech Core - Data Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no networking, no caching logic.

pub mod error;
pub mod identity;
pub mod notification;
pub mod records;
pub mod session;

pub use error::{CacheError, FetchError, SessionError};
pub use identity::{new_entity_id, EntityId, MessageId, NotificationId, ThreadId, Timestamp, UserId};
pub use notification::{NotificationKind, NotificationScope};
pub use records::{MessageRecord, NotificationRecord, PlatformSetting, ThreadSummary};
pub use session::{Credential, Role, TokenKind};
