//! Session store and cookie parsing.
//!
//! The store holds at most two credentials: the user's own token and, for
//! admins, an impersonation token. Snapshots always prefer the impersonation
//! token; ending impersonation drops it under the same lock, so the next
//! snapshot already reflects the regular role.

use std::sync::{Arc, Mutex, PoisonError};

use modera_core::{Credential, Role, SessionError, TokenKind};
use tracing::debug;

/// Cookie carrying the regular session token.
pub const JWT_COOKIE: &str = "jwt";
/// Cookie carrying the impersonation token, present only while an admin acts
/// as another user.
pub const JWT_IMPERSONATION_COOKIE: &str = "jwtImpersonation";
/// Cookie carrying the wire form of the effective role.
pub const ROLE_COOKIE: &str = "role";

#[derive(Default)]
struct Slots {
    regular: Option<Credential>,
    impersonation: Option<Credential>,
}

/// Shared, explicitly threaded session context.
///
/// Readers treat each snapshot as immutable; impersonation may end between
/// two reads separated by an await point.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<Slots>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_regular(credential: Credential) -> Self {
        let store = Self::new();
        store.set_regular(credential);
        store
    }

    /// Install the user's own credential. Kind is normalized to `Regular`.
    pub fn set_regular(&self, mut credential: Credential) {
        credential.kind = TokenKind::Regular;
        self.lock().regular = Some(credential);
    }

    /// Start acting as another user.
    pub fn begin_impersonation(&self, credential: Credential) -> Result<(), SessionError> {
        if credential.kind != TokenKind::Impersonation {
            return Err(SessionError::WrongTokenKind {
                kind: format!("{:?}", credential.kind),
            });
        }
        debug!(role = %credential.role, "impersonation started");
        self.lock().impersonation = Some(credential);
        Ok(())
    }

    /// Stop impersonating; returns the restored regular role, if a regular
    /// credential is present.
    pub fn end_impersonation(&self) -> Result<Option<Role>, SessionError> {
        let mut slots = self.lock();
        if slots.impersonation.take().is_none() {
            return Err(SessionError::NotImpersonating);
        }
        let restored = slots.regular.as_ref().map(|cred| cred.role);
        debug!(restored = ?restored, "impersonation ended");
        Ok(restored)
    }

    /// Drop both credentials (logout).
    pub fn clear(&self) {
        let mut slots = self.lock();
        slots.regular = None;
        slots.impersonation = None;
    }

    /// The effective credential: impersonation wins over regular.
    pub fn snapshot(&self) -> Option<Credential> {
        let slots = self.lock();
        slots
            .impersonation
            .clone()
            .or_else(|| slots.regular.clone())
    }

    /// The effective role, if any credential is installed.
    pub fn role(&self) -> Option<Role> {
        self.snapshot().map(|cred| cred.role)
    }

    pub fn is_impersonating(&self) -> bool {
        self.lock().impersonation.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parse a `Cookie:` header into the effective credential.
///
/// The impersonation token takes precedence. A missing or unparseable role
/// cookie means no usable credential; the gate then routes to login rather
/// than guessing.
pub fn credential_from_cookies(header: &str) -> Option<Credential> {
    let mut jwt: Option<&str> = None;
    let mut impersonation: Option<&str> = None;
    let mut role_raw: Option<&str> = None;

    for pair in header.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let name = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("").trim();
        if value.is_empty() {
            continue;
        }
        match name {
            JWT_COOKIE => jwt = Some(value),
            JWT_IMPERSONATION_COOKIE => impersonation = Some(value),
            ROLE_COOKIE => role_raw = Some(value),
            _ => {}
        }
    }

    let role = Role::parse_wire(role_raw?)?;
    if let Some(token) = impersonation {
        Some(Credential::impersonation(token, role))
    } else {
        jwt.map(|token| Credential::regular(token, role))
    }
}
