//! The navigation routing gate.
//!
//! One decision per navigation: allow, or redirect. The order of checks is
//! deliberate. The maintenance page itself is always reachable. Auth pages
//! bounce signed-in users to their dashboard but stay open to everyone else,
//! maintenance included, so people can still sign in as the outage ends.
//! Maintenance is evaluated before any role check and skips admin-prefixed
//! paths, giving admins an operational override. Only then do the role
//! prefix checks run.

use modera_core::{Credential, Role};
use tracing::debug;

use crate::maintenance::MaintenanceMonitor;
use crate::session::credential_from_cookies;

/// Well-known paths and prefixes.
pub mod paths {
    use modera_core::Role;

    pub const MAINTENANCE: &str = "/maintenance";
    pub const LOGIN: &str = "/login";
    pub const REGISTER: &str = "/register";
    pub const ADMIN_PREFIX: &str = "/dashboard/admin";
    pub const TEACHER_PREFIX: &str = "/dashboard/teacher";
    pub const PROTECTED_PREFIX: &str = "/dashboard";

    /// Landing page for a role.
    pub fn dashboard_for(role: Role) -> &'static str {
        match role {
            Role::Admin => ADMIN_PREFIX,
            Role::Teacher => TEACHER_PREFIX,
        }
    }
}

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Redirect(String),
}

impl GateDecision {
    fn redirect(target: &str) -> Self {
        GateDecision::Redirect(target.to_string())
    }
}

fn is_auth_page(path: &str) -> bool {
    path == paths::LOGIN || path == paths::REGISTER
}

fn is_admin_path(path: &str) -> bool {
    path.starts_with(paths::ADMIN_PREFIX)
}

fn is_teacher_path(path: &str) -> bool {
    path.starts_with(paths::TEACHER_PREFIX)
}

fn is_protected(path: &str) -> bool {
    path.starts_with(paths::PROTECTED_PREFIX)
}

/// Pure gate decision over a path, an optional credential, and the
/// maintenance flag. First match wins.
pub fn evaluate(path: &str, credential: Option<&Credential>, maintenance: bool) -> GateDecision {
    // The maintenance page must never redirect to itself.
    if path == paths::MAINTENANCE {
        return GateDecision::Allow;
    }

    // Auth pages: signed-in users belong on their dashboard, everyone else
    // may pass, maintenance or not.
    if is_auth_page(path) {
        return match credential {
            Some(cred) => GateDecision::redirect(paths::dashboard_for(cred.role)),
            None => GateDecision::Allow,
        };
    }

    // Maintenance blocks everything except admin-prefixed paths.
    if maintenance && !is_admin_path(path) {
        return GateDecision::redirect(paths::MAINTENANCE);
    }

    let Some(cred) = credential else {
        if is_protected(path) {
            return GateDecision::redirect(paths::LOGIN);
        }
        return GateDecision::Allow;
    };

    if is_admin_path(path) && cred.role != Role::Admin {
        // A valid non-admin credential lands on the teacher dashboard.
        return GateDecision::redirect(paths::TEACHER_PREFIX);
    }

    if is_teacher_path(path) && cred.role != Role::Teacher {
        return GateDecision::redirect(paths::LOGIN);
    }

    GateDecision::Allow
}

/// Request-time gate: reads cookies, consults the TTL-gated maintenance
/// flag, and evaluates.
pub struct RoutingGate {
    monitor: MaintenanceMonitor,
}

impl RoutingGate {
    pub fn new(monitor: MaintenanceMonitor) -> Self {
        Self { monitor }
    }

    pub async fn decide(&self, path: &str, cookie_header: Option<&str>) -> GateDecision {
        let credential = cookie_header.and_then(credential_from_cookies);

        // Admin paths bypass maintenance and the public pages never consult
        // it, so skip the read entirely there.
        let maintenance = if is_admin_path(path) || path == paths::MAINTENANCE || is_auth_page(path)
        {
            false
        } else {
            self.monitor.is_enabled().await
        };

        let decision = evaluate(path, credential.as_ref(), maintenance);
        debug!(path, maintenance, decision = ?decision, "gate decision");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Credential {
        Credential::regular("admin-token", Role::Admin)
    }

    fn teacher() -> Credential {
        Credential::regular("teacher-token", Role::Teacher)
    }

    #[test]
    fn test_maintenance_page_always_allowed() {
        assert_eq!(evaluate("/maintenance", None, true), GateDecision::Allow);
        assert_eq!(
            evaluate("/maintenance", Some(&teacher()), false),
            GateDecision::Allow
        );
    }

    #[test]
    fn test_auth_pages_open_to_anonymous_users() {
        assert_eq!(evaluate("/login", None, false), GateDecision::Allow);
        assert_eq!(evaluate("/register", None, true), GateDecision::Allow);
    }

    #[test]
    fn test_auth_pages_bounce_signed_in_users_to_their_dashboard() {
        assert_eq!(
            evaluate("/login", Some(&teacher()), false),
            GateDecision::Redirect("/dashboard/teacher".to_string())
        );
        assert_eq!(
            evaluate("/register", Some(&admin()), false),
            GateDecision::Redirect("/dashboard/admin".to_string())
        );
    }

    #[test]
    fn test_maintenance_blocks_everyone_on_non_admin_paths() {
        assert_eq!(
            evaluate("/", None, true),
            GateDecision::Redirect("/maintenance".to_string())
        );
        assert_eq!(
            evaluate("/dashboard/teacher", Some(&teacher()), true),
            GateDecision::Redirect("/maintenance".to_string())
        );
    }

    #[test]
    fn test_maintenance_spares_admin_paths() {
        assert_eq!(
            evaluate("/dashboard/admin/users", Some(&admin()), true),
            GateDecision::Allow
        );
    }

    #[test]
    fn test_unauthenticated_protected_path_goes_to_login() {
        assert_eq!(
            evaluate("/dashboard/teacher", None, false),
            GateDecision::Redirect("/login".to_string())
        );
        assert_eq!(
            evaluate("/dashboard/admin/users", None, false),
            GateDecision::Redirect("/login".to_string())
        );
    }

    #[test]
    fn test_public_pages_allowed_without_credential() {
        assert_eq!(evaluate("/", None, false), GateDecision::Allow);
        assert_eq!(evaluate("/pricing", None, false), GateDecision::Allow);
    }

    #[test]
    fn test_teacher_on_admin_path_lands_on_teacher_dashboard() {
        assert_eq!(
            evaluate("/dashboard/admin/users", Some(&teacher()), false),
            GateDecision::Redirect("/dashboard/teacher".to_string())
        );
    }

    #[test]
    fn test_admin_on_teacher_path_goes_to_login() {
        assert_eq!(
            evaluate("/dashboard/teacher", Some(&admin()), false),
            GateDecision::Redirect("/login".to_string())
        );
    }

    #[test]
    fn test_matching_roles_are_allowed() {
        assert_eq!(
            evaluate("/dashboard/admin/users", Some(&admin()), false),
            GateDecision::Allow
        );
        assert_eq!(
            evaluate("/dashboard/teacher", Some(&teacher()), false),
            GateDecision::Allow
        );
    }

    #[test]
    fn test_impersonated_role_drives_the_decision() {
        // Admin impersonating a teacher carries the teacher role.
        let cred = Credential::impersonation("imp-token", Role::Teacher);
        assert_eq!(
            evaluate("/dashboard/teacher", Some(&cred), false),
            GateDecision::Allow
        );
        assert_eq!(
            evaluate("/dashboard/admin/users", Some(&cred), false),
            GateDecision::Redirect("/dashboard/teacher".to_string())
        );
    }
}
