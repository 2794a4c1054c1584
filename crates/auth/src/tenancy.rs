//! Tenancy resolution: which organization a request is scoped to, and how the
//! user relates to it.
//!
//! Pure over pre-fetched facts; the infra layer gathers them from storage.
//! Callers must scope every downstream query with the *resolved*
//! `organization.id`, never with a client-supplied id.

use serde::Serialize;
use thiserror::Error;

use atelier_core::OrganizationId;

use crate::authorize::{AllowReason, AuthzError, check_permission};
use crate::{Membership, Organization, Permission, User};

/// How the user relates to the resolved organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "membership", rename_all = "snake_case")]
pub enum Access {
    /// Implicit full access; no membership row exists or is needed.
    Owner,
    Member(Membership),
}

/// Outcome of tenancy resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTenancy {
    pub organization: Organization,
    pub access: Access,
}

impl ResolvedTenancy {
    pub fn organization_id(&self) -> OrganizationId {
        self.organization.id
    }

    pub fn membership(&self) -> Option<&Membership> {
        match &self.access {
            Access::Owner => None,
            Access::Member(m) => Some(m),
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self.access, Access::Owner)
    }

    pub fn check(&self, user: &User, permission: &Permission) -> Result<AllowReason, AuthzError> {
        check_permission(user, &self.organization, self.membership(), permission)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TenancyError {
    /// Authenticated, but no tenant relationship could be established.
    #[error("no organization context")]
    NoOrganizationContext,
}

/// Storage facts about one user needed for resolution.
#[derive(Debug, Clone, Default)]
pub struct TenancyFacts {
    /// The requested organization, if one was requested and it exists.
    pub requested_organization: Option<Organization>,
    /// The organization the user owns, if any.
    pub owned_organization: Option<Organization>,
    /// Every membership the user holds, with its organization.
    pub memberships: Vec<(Organization, Membership)>,
}

/// Resolve the organization scope for `user`.
///
/// 1. Requested org owned by the user: owner scope.
/// 2. No org requested and the user owns one: owner scope of that org.
/// 3. Membership in the requested org, or the sole membership when nothing was
///    requested: member scope.
/// 4. Otherwise `NoOrganizationContext`.
pub fn resolve(
    user: &User,
    requested: Option<OrganizationId>,
    facts: TenancyFacts,
) -> Result<ResolvedTenancy, TenancyError> {
    let TenancyFacts {
        requested_organization,
        owned_organization,
        memberships,
    } = facts;

    let mut memberships: Vec<(Organization, Membership)> = memberships
        .into_iter()
        .filter(|(org, m)| m.binds(org.id, user.id))
        .collect();

    match requested {
        Some(requested_id) => {
            if let Some(org) = requested_organization.filter(|o| o.id == requested_id) {
                if org.is_owned_by(user.id) {
                    return Ok(ResolvedTenancy {
                        organization: org,
                        access: Access::Owner,
                    });
                }
            }

            memberships
                .into_iter()
                .find(|(org, _)| org.id == requested_id)
                .map(|(organization, m)| ResolvedTenancy {
                    organization,
                    access: Access::Member(m),
                })
                .ok_or(TenancyError::NoOrganizationContext)
        }
        None => {
            if let Some(org) = owned_organization.filter(|o| o.is_owned_by(user.id)) {
                return Ok(ResolvedTenancy {
                    organization: org,
                    access: Access::Owner,
                });
            }

            if memberships.len() == 1 {
                if let Some((organization, m)) = memberships.pop() {
                    return Ok(ResolvedTenancy {
                        organization,
                        access: Access::Member(m),
                    });
                }
            }

            Err(TenancyError::NoOrganizationContext)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use atelier_core::UserId;

    use super::*;
    use crate::{GlobalRole, MembershipRole};

    fn user(role: GlobalRole) -> User {
        User::register(UserId::new(), &format!("{}@x.com", UserId::new()), "U", role, Utc::now()).unwrap()
    }

    fn org(owner: &User, name: &str) -> Organization {
        Organization::new(OrganizationId::new(), owner.id, name, name.to_lowercase(), Utc::now()).unwrap()
    }

    fn membership(org: &Organization, user: &User) -> Membership {
        Membership::from_invitation(org.id, user.id, MembershipRole::Worker, Utc::now())
    }

    #[test]
    fn requested_org_owned_by_user_resolves_to_owner() {
        let owner = user(GlobalRole::Owner);
        let o1 = org(&owner, "O1");
        let facts = TenancyFacts {
            requested_organization: Some(o1.clone()),
            owned_organization: Some(o1.clone()),
            memberships: vec![],
        };
        let resolved = resolve(&owner, Some(o1.id), facts).unwrap();
        assert!(resolved.is_owner());
        assert_eq!(resolved.organization_id(), o1.id);
    }

    #[test]
    fn owner_without_request_resolves_to_owned_org() {
        let owner = user(GlobalRole::Owner);
        let o1 = org(&owner, "O1");
        let facts = TenancyFacts {
            owned_organization: Some(o1.clone()),
            ..Default::default()
        };
        let resolved = resolve(&owner, None, facts).unwrap();
        assert_eq!(resolved.access, Access::Owner);
        assert_eq!(resolved.organization_id(), o1.id);
    }

    #[test]
    fn sole_membership_is_used_without_request() {
        let owner = user(GlobalRole::Owner);
        let worker = user(GlobalRole::Worker);
        let o1 = org(&owner, "O1");
        let m = membership(&o1, &worker);
        let facts = TenancyFacts {
            memberships: vec![(o1.clone(), m.clone())],
            ..Default::default()
        };
        let resolved = resolve(&worker, None, facts).unwrap();
        assert_eq!(resolved.membership(), Some(&m));
    }

    #[test]
    fn several_memberships_without_request_is_ambiguous() {
        let worker = user(GlobalRole::Worker);
        let (a, b) = (user(GlobalRole::Owner), user(GlobalRole::Owner));
        let (oa, ob) = (org(&a, "A"), org(&b, "B"));
        let facts = TenancyFacts {
            memberships: vec![
                (oa.clone(), membership(&oa, &worker)),
                (ob.clone(), membership(&ob, &worker)),
            ],
            ..Default::default()
        };
        assert_eq!(resolve(&worker, None, facts), Err(TenancyError::NoOrganizationContext));
    }

    #[test]
    fn requested_org_without_relationship_fails() {
        let owner = user(GlobalRole::Owner);
        let stranger = user(GlobalRole::Owner);
        let o1 = org(&owner, "O1");
        let own = org(&stranger, "Mine");
        let facts = TenancyFacts {
            requested_organization: Some(o1.clone()),
            owned_organization: Some(own),
            memberships: vec![],
        };
        // Never silently re-scoped to the stranger's own organization.
        assert_eq!(resolve(&stranger, Some(o1.id), facts), Err(TenancyError::NoOrganizationContext));
    }

    #[test]
    fn membership_rows_for_other_users_are_ignored() {
        let owner = user(GlobalRole::Owner);
        let worker = user(GlobalRole::Worker);
        let impostor = user(GlobalRole::Worker);
        let o1 = org(&owner, "O1");
        let facts = TenancyFacts {
            memberships: vec![(o1.clone(), membership(&o1, &worker))],
            ..Default::default()
        };
        assert_eq!(resolve(&impostor, Some(o1.id), facts), Err(TenancyError::NoOrganizationContext));
    }

    #[test]
    fn no_relationship_at_all_fails() {
        let client = user(GlobalRole::Client);
        assert_eq!(
            resolve(&client, None, TenancyFacts::default()),
            Err(TenancyError::NoOrganizationContext)
        );
    }
}
