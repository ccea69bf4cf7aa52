use modera_core::{Credential, Role, TokenKind};
use modera_gate::{evaluate, paths, GateDecision};
use proptest::prelude::*;

fn path_strategy() -> impl Strategy<Value = String> {
    let known = proptest::sample::select(vec![
        "/".to_string(),
        "/pricing".to_string(),
        "/faq".to_string(),
        paths::MAINTENANCE.to_string(),
        paths::LOGIN.to_string(),
        paths::REGISTER.to_string(),
        paths::ADMIN_PREFIX.to_string(),
        format!("{}/users", paths::ADMIN_PREFIX),
        format!("{}/settings", paths::ADMIN_PREFIX),
        paths::TEACHER_PREFIX.to_string(),
        format!("{}/grading", paths::TEACHER_PREFIX),
        "/dashboard".to_string(),
    ]);
    prop_oneof![known, "/[a-z]{1,12}"]
}

fn credential_strategy() -> impl Strategy<Value = Option<Credential>> {
    prop_oneof![
        Just(None),
        any::<(bool, bool)>().prop_map(|(is_admin, impersonating)| {
            let role = if is_admin { Role::Admin } else { Role::Teacher };
            let kind = if impersonating {
                TokenKind::Impersonation
            } else {
                TokenKind::Regular
            };
            Some(Credential {
                token: "token".to_string(),
                kind,
                role,
            })
        }),
    ]
}

proptest! {
    #[test]
    fn gate_never_redirects_to_the_current_path(
        path in path_strategy(),
        credential in credential_strategy(),
        maintenance in any::<bool>(),
    ) {
        if let GateDecision::Redirect(target) = evaluate(&path, credential.as_ref(), maintenance) {
            prop_assert_ne!(target, path, "self-redirect would loop forever");
        }
    }

    #[test]
    fn gate_redirect_targets_are_well_known(
        path in path_strategy(),
        credential in credential_strategy(),
        maintenance in any::<bool>(),
    ) {
        if let GateDecision::Redirect(target) = evaluate(&path, credential.as_ref(), maintenance) {
            let known = [
                paths::MAINTENANCE,
                paths::LOGIN,
                paths::ADMIN_PREFIX,
                paths::TEACHER_PREFIX,
            ];
            prop_assert!(known.contains(&target.as_str()), "unexpected target {}", target);
        }
    }

    #[test]
    fn maintenance_blocks_every_non_admin_non_public_path(
        path in path_strategy(),
        credential in credential_strategy(),
    ) {
        prop_assume!(!path.starts_with(paths::ADMIN_PREFIX));
        prop_assume!(path != paths::MAINTENANCE);
        prop_assume!(path != paths::LOGIN && path != paths::REGISTER);

        let decision = evaluate(&path, credential.as_ref(), true);
        prop_assert_eq!(
            decision,
            GateDecision::Redirect(paths::MAINTENANCE.to_string())
        );
    }

    #[test]
    fn admin_credential_is_never_sent_to_maintenance_on_admin_paths(
        suffix in "/[a-z]{0,10}",
        maintenance in any::<bool>(),
    ) {
        let path = format!("{}{}", paths::ADMIN_PREFIX, suffix);
        let cred = Credential::regular("token", Role::Admin);
        let decision = evaluate(&path, Some(&cred), maintenance);
        prop_assert_ne!(
            decision,
            GateDecision::Redirect(paths::MAINTENANCE.to_string())
        );
    }

    #[test]
    fn unauthenticated_dashboard_access_requires_login_or_maintenance(
        suffix in "/[a-z]{0,10}",
        maintenance in any::<bool>(),
    ) {
        let path = format!("/dashboard{}", suffix);
        let decision = evaluate(&path, None, maintenance);
        let expected = if maintenance && !path.starts_with(paths::ADMIN_PREFIX) {
            GateDecision::Redirect(paths::MAINTENANCE.to_string())
        } else {
            GateDecision::Redirect(paths::LOGIN.to_string())
        };
        prop_assert_eq!(decision, expected);
    }
}
