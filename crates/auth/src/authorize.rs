use serde::Serialize;
use thiserror::Error;

use crate::{Membership, Organization, Permission, User};

/// Why a request was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    /// Organization owner: unconditional.
    Owner,
    /// Manager-equivalent membership role: unconditional within the organization.
    Manager,
    /// Worker holding the explicit grant.
    Granted,
}

/// Why a request was denied. Internal only; never shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotAMember,
    MissingPermission,
}

/// Outcome of a permission evaluation. Denial is a value, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow(AllowReason),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    /// Collapse into the externally visible result; every deny branch maps to
    /// the same `Forbidden`.
    pub fn into_result(self) -> Result<AllowReason, AuthzError> {
        match self {
            Decision::Allow(reason) => Ok(reason),
            Decision::Deny(_) => Err(AuthzError::Forbidden),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthzError {
    /// Single shape for "not a member" and "missing permission".
    #[error("forbidden")]
    Forbidden,
}

/// Evaluate `required` for `user` inside `organization`.
///
/// First match wins:
/// 1. no membership binding the user to this organization and not the owner: deny
/// 2. owner: allow
/// 3. manager-equivalent role: allow
/// 4. worker: allow iff `required` is in the explicit grant set
///
/// Platform admins are not special-cased here; admin-only routes use
/// [`require_admin`] before any tenant logic runs.
///
/// - No IO
/// - No panics
pub fn evaluate(
    user: &User,
    organization: &Organization,
    membership: Option<&Membership>,
    required: &Permission,
) -> Decision {
    let is_owner = organization.is_owned_by(user.id);
    // A row for another user or another organization is no membership at all.
    let membership = membership.filter(|m| m.binds(organization.id, user.id));

    match (is_owner, membership) {
        (false, None) => Decision::Deny(DenyReason::NotAMember),
        (true, _) => Decision::Allow(AllowReason::Owner),
        (false, Some(m)) if m.role.is_manager() => Decision::Allow(AllowReason::Manager),
        (false, Some(m)) => {
            if m.permissions.contains(required) {
                Decision::Allow(AllowReason::Granted)
            } else {
                Decision::Deny(DenyReason::MissingPermission)
            }
        }
    }
}

/// Authorize `user` for `required`, logging the internal deny reason.
pub fn check_permission(
    user: &User,
    organization: &Organization,
    membership: Option<&Membership>,
    required: &Permission,
) -> Result<AllowReason, AuthzError> {
    let decision = evaluate(user, organization, membership, required);
    if let Decision::Deny(reason) = decision {
        tracing::debug!(
            user_id = %user.id,
            organization_id = %organization.id,
            permission = %required,
            reason = ?reason,
            "permission denied"
        );
    }
    decision.into_result()
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("admin role required")]
pub struct AdminRequired;

/// Platform-operator check for admin-eligible routes.
pub fn require_admin(user: &User) -> Result<(), AdminRequired> {
    if user.is_admin() { Ok(()) } else { Err(AdminRequired) }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;

    use atelier_core::{OrganizationId, UserId};

    use super::*;
    use crate::{GlobalRole, MembershipRole, PermissionSet, catalog};

    fn user(role: GlobalRole) -> User {
        User::register(UserId::new(), &format!("{}@x.com", UserId::new()), "U", role, Utc::now()).unwrap()
    }

    fn org_owned_by(owner: &User) -> Organization {
        Organization::new(OrganizationId::new(), owner.id, "O1", "o1".into(), Utc::now()).unwrap()
    }

    fn member(org: &Organization, user: &User, role: MembershipRole, grants: &[&str]) -> Membership {
        let mut m = Membership::from_invitation(org.id, user.id, role, Utc::now());
        m.permissions = PermissionSet::parse_all(grants).unwrap();
        m
    }

    #[test]
    fn worker_grant_allows_only_what_was_granted() {
        let owner = user(GlobalRole::Owner);
        let worker = user(GlobalRole::Worker);
        let org = org_owned_by(&owner);
        let m = member(&org, &worker, MembershipRole::Worker, &["orders:read"]);

        assert_eq!(
            evaluate(&worker, &org, Some(&m), &catalog::ORDERS_READ),
            Decision::Allow(AllowReason::Granted)
        );
        assert_eq!(
            evaluate(&worker, &org, Some(&m), &catalog::ORDERS_WRITE),
            Decision::Deny(DenyReason::MissingPermission)
        );
    }

    #[test]
    fn manager_is_unrestricted_without_grants() {
        let owner = user(GlobalRole::Owner);
        let manager = user(GlobalRole::Worker);
        let org = org_owned_by(&owner);
        let m = member(&org, &manager, MembershipRole::Manager, &[]);

        for p in catalog::ALL {
            assert_eq!(evaluate(&manager, &org, Some(&m), p), Decision::Allow(AllowReason::Manager));
        }
    }

    #[test]
    fn admin_gets_no_tenant_bypass() {
        let owner = user(GlobalRole::Owner);
        let admin = user(GlobalRole::Admin);
        let org = org_owned_by(&owner);

        assert_eq!(
            evaluate(&admin, &org, None, &catalog::ORDERS_READ),
            Decision::Deny(DenyReason::NotAMember)
        );
        assert!(require_admin(&admin).is_ok());
        assert_eq!(require_admin(&owner), Err(AdminRequired));
    }

    #[test]
    fn membership_for_another_org_does_not_count() {
        let owner = user(GlobalRole::Owner);
        let other_owner = user(GlobalRole::Owner);
        let worker = user(GlobalRole::Worker);
        let org = org_owned_by(&owner);
        let other = org_owned_by(&other_owner);
        let m = member(&other, &worker, MembershipRole::Manager, &[]);

        assert_eq!(
            evaluate(&worker, &org, Some(&m), &catalog::ORDERS_READ),
            Decision::Deny(DenyReason::NotAMember)
        );
    }

    #[test]
    fn both_deny_branches_share_one_error() {
        let owner = user(GlobalRole::Owner);
        let worker = user(GlobalRole::Worker);
        let stranger = user(GlobalRole::Client);
        let org = org_owned_by(&owner);
        let m = member(&org, &worker, MembershipRole::Worker, &[]);

        let missing = check_permission(&worker, &org, Some(&m), &catalog::PAYMENTS_READ).unwrap_err();
        let not_member = check_permission(&stranger, &org, None, &catalog::PAYMENTS_READ).unwrap_err();
        assert_eq!(missing, not_member);
        assert_eq!(missing.to_string(), not_member.to_string());
    }

    fn any_permission() -> impl Strategy<Value = Permission> {
        (0..catalog::ALL.len()).prop_map(|i| catalog::ALL[i].clone())
    }

    fn any_global_role() -> impl Strategy<Value = GlobalRole> {
        prop_oneof![
            Just(GlobalRole::Admin),
            Just(GlobalRole::Owner),
            Just(GlobalRole::Worker),
            Just(GlobalRole::Client),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a non-owner without membership is denied for every permission.
        #[test]
        fn outsiders_are_always_denied(role in any_global_role(), p in any_permission()) {
            let owner = user(GlobalRole::Owner);
            let org = org_owned_by(&owner);
            let outsider = user(role);
            prop_assert_eq!(evaluate(&outsider, &org, None, &p), Decision::Deny(DenyReason::NotAMember));
            prop_assert_eq!(check_permission(&outsider, &org, None, &p), Err(AuthzError::Forbidden));
        }

        /// Property: the owner is allowed every permission, granted or not.
        #[test]
        fn owner_is_always_allowed(p in any_permission()) {
            let owner = user(GlobalRole::Owner);
            let org = org_owned_by(&owner);
            prop_assert_eq!(evaluate(&owner, &org, None, &p), Decision::Allow(AllowReason::Owner));
        }

        /// Property: a worker is allowed exactly the permissions in their grant set.
        #[test]
        fn worker_decision_is_set_membership(
            grants in prop::collection::vec(any_permission(), 0..6),
            p in any_permission(),
        ) {
            let owner = user(GlobalRole::Owner);
            let worker = user(GlobalRole::Worker);
            let org = org_owned_by(&owner);
            let mut m = Membership::from_invitation(org.id, worker.id, MembershipRole::Worker, Utc::now());
            m.permissions = grants.iter().cloned().collect();

            let allowed = evaluate(&worker, &org, Some(&m), &p).is_allowed();
            prop_assert_eq!(allowed, grants.contains(&p));
        }
    }
}
