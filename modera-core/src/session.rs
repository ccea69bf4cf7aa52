//! Session credential types.
//!
//! A session carries an opaque bearer token plus the role it was issued for.
//! Admin sessions may additionally hold an impersonation token; wherever both
//! exist, the impersonation token wins.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform role attached to a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Teacher,
}

impl Role {
    /// Parse the wire form stored in the `role` cookie.
    ///
    /// Unknown strings yield `None`; callers treat that as an absent
    /// credential rather than guessing a role.
    pub fn parse_wire(value: &str) -> Option<Role> {
        match value.trim() {
            "ADMIN" => Some(Role::Admin),
            "TEACHER" => Some(Role::Teacher),
            _ => None,
        }
    }

    /// Wire form for cookies and payloads.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Which slot a bearer token occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// The user's own session token.
    Regular,
    /// An admin acting as another user.
    Impersonation,
}

/// An opaque bearer credential with its role.
///
/// The token is never inspected client-side; validation is the backend's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub kind: TokenKind,
    pub role: Role,
}

impl Credential {
    pub fn regular(token: impl Into<String>, role: Role) -> Self {
        Self {
            token: token.into(),
            kind: TokenKind::Regular,
            role,
        }
    }

    pub fn impersonation(token: impl Into<String>, role: Role) -> Self {
        Self {
            token: token.into(),
            kind: TokenKind::Impersonation,
            role,
        }
    }

    pub fn is_impersonation(&self) -> bool {
        self.kind == TokenKind::Impersonation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_round_trip() {
        assert_eq!(Role::parse_wire("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse_wire("TEACHER"), Some(Role::Teacher));
        assert_eq!(Role::parse_wire(Role::Admin.as_wire()), Some(Role::Admin));
    }

    #[test]
    fn test_role_parse_rejects_unknown() {
        assert_eq!(Role::parse_wire("STUDENT"), None);
        assert_eq!(Role::parse_wire(""), None);
        assert_eq!(Role::parse_wire("admin"), None);
    }

    #[test]
    fn test_role_parse_trims_whitespace() {
        assert_eq!(Role::parse_wire(" TEACHER "), Some(Role::Teacher));
    }

    #[test]
    fn test_credential_constructors() {
        let regular = Credential::regular("tok-1", Role::Teacher);
        assert_eq!(regular.kind, TokenKind::Regular);
        assert!(!regular.is_impersonation());

        let imp = Credential::impersonation("tok-2", Role::Teacher);
        assert!(imp.is_impersonation());
    }
}
