use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use atelier_auth::{ApprovalStatus, GlobalRole, Membership, Organization, User};
use atelier_core::{InvitationId, MembershipId, OrganizationId, UserId};
use atelier_invitations::{Invitation, InvitationStatus};

use super::{
    AcceptInvitation, AcceptOutcome, ApproveOutcome, DirectoryStore, InvitationStore, StoreError,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    organizations: HashMap<OrganizationId, Organization>,
    memberships: HashMap<MembershipId, Membership>,
    invitations: HashMap<InvitationId, Invitation>,
}

impl Tables {
    fn organization_by_owner(&self, owner_id: UserId) -> Option<&Organization> {
        self.organizations.values().find(|o| o.owner_id == owner_id)
    }

    fn membership_for(&self, organization_id: OrganizationId, user_id: UserId) -> Option<&Membership> {
        self.memberships
            .values()
            .find(|m| m.binds(organization_id, user_id))
    }

    fn pending_for(&self, organization_id: OrganizationId, email: &str) -> Option<&Invitation> {
        self.invitations.values().find(|i| {
            i.organization_id == organization_id
                && i.status == InvitationStatus::Pending
                && i.email.eq_ignore_ascii_case(email)
        })
    }
}

/// In-memory store for dev/tests.
///
/// One lock over every table, so multi-table operations are atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if t.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim();
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(
        &self,
        role: GlobalRole,
        status: ApprovalStatus,
    ) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self
            .read()?
            .users
            .values()
            .filter(|u| u.global_role == role && u.status == status)
            .cloned()
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn transition_user_status(
        &self,
        id: UserId,
        from: ApprovalStatus,
        to: ApprovalStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let mut t = self.write()?;
        match t.users.get_mut(&id) {
            Some(user) if user.status == from => {
                user.status = to;
                user.updated_at = now;
                Ok(Some(user.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn approve_owner(
        &self,
        user_id: UserId,
        organization: &Organization,
        now: DateTime<Utc>,
    ) -> Result<ApproveOutcome, StoreError> {
        let mut t = self.write()?;
        let eligible = t.users.get(&user_id).is_some_and(|u| {
            u.global_role == GlobalRole::Owner && u.status == ApprovalStatus::Pending
        });
        if !eligible || t.organization_by_owner(user_id).is_some() {
            return Ok(ApproveOutcome::NotPending);
        }
        if t.organizations.values().any(|o| o.slug == organization.slug) {
            return Err(StoreError::Conflict(format!("slug '{}' taken", organization.slug)));
        }

        t.organizations.insert(organization.id, organization.clone());
        let user = match t.users.get_mut(&user_id) {
            Some(user) => {
                user.status = ApprovalStatus::Approved;
                user.updated_at = now;
                user.clone()
            }
            None => return Ok(ApproveOutcome::NotPending),
        };
        Ok(ApproveOutcome::Approved {
            user,
            organization: organization.clone(),
        })
    }

    async fn find_organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError> {
        Ok(self.read()?.organizations.get(&id).cloned())
    }

    async fn find_owned_organization(&self, owner_id: UserId) -> Result<Option<Organization>, StoreError> {
        Ok(self.read()?.organization_by_owner(owner_id).cloned())
    }

    async fn memberships_of(&self, user_id: UserId) -> Result<Vec<(Organization, Membership)>, StoreError> {
        let t = self.read()?;
        Ok(t.memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                t.organizations
                    .get(&m.organization_id)
                    .map(|o| (o.clone(), m.clone()))
            })
            .collect())
    }

    async fn find_membership(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(self.read()?.membership_for(organization_id, user_id).cloned())
    }

    async fn find_membership_by_id(
        &self,
        organization_id: OrganizationId,
        id: MembershipId,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(self
            .read()?
            .memberships
            .get(&id)
            .filter(|m| m.organization_id == organization_id)
            .cloned())
    }

    async fn list_members(&self, organization_id: OrganizationId) -> Result<Vec<(Membership, User)>, StoreError> {
        let t = self.read()?;
        let mut members: Vec<(Membership, User)> = t
            .memberships
            .values()
            .filter(|m| m.organization_id == organization_id)
            .filter_map(|m| t.users.get(&m.user_id).map(|u| (m.clone(), u.clone())))
            .collect();
        members.sort_by_key(|(m, _)| m.created_at);
        Ok(members)
    }

    async fn update_membership(&self, membership: &Membership) -> Result<bool, StoreError> {
        let mut t = self.write()?;
        match t.memberships.get_mut(&membership.id) {
            Some(existing) if existing.organization_id == membership.organization_id => {
                existing.role = membership.role;
                existing.permissions = membership.permissions.clone();
                existing.updated_at = membership.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_membership(
        &self,
        organization_id: OrganizationId,
        id: MembershipId,
    ) -> Result<bool, StoreError> {
        let mut t = self.write()?;
        let matches = t
            .memberships
            .get(&id)
            .is_some_and(|m| m.organization_id == organization_id);
        if matches {
            t.memberships.remove(&id);
        }
        Ok(matches)
    }
}

#[async_trait]
impl InvitationStore for InMemoryStore {
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if invitation.status == InvitationStatus::Pending
            && t.pending_for(invitation.organization_id, &invitation.email).is_some()
        {
            return Err(StoreError::Conflict("pending invitation exists".to_string()));
        }
        t.invitations.insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn find_invitation(&self, id: InvitationId) -> Result<Option<Invitation>, StoreError> {
        Ok(self.read()?.invitations.get(&id).cloned())
    }

    async fn find_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>, StoreError> {
        Ok(self
            .read()?
            .invitations
            .values()
            .find(|i| i.token.expose() == token)
            .cloned())
    }

    async fn find_pending_invitation(
        &self,
        organization_id: OrganizationId,
        email: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        Ok(self.read()?.pending_for(organization_id, email).cloned())
    }

    async fn list_invitations(&self, organization_id: OrganizationId) -> Result<Vec<Invitation>, StoreError> {
        let mut invitations: Vec<Invitation> = self
            .read()?
            .invitations
            .values()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect();
        invitations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invitations)
    }

    async fn rotate_invitation(&self, current: &Invitation, rotated: &Invitation) -> Result<bool, StoreError> {
        let mut t = self.write()?;
        let unchanged = t.invitations.get(&current.id).is_some_and(|stored| {
            stored.status == current.status && stored.updated_at == current.updated_at
        });
        if !unchanged {
            return Ok(false);
        }
        // Reviving an EXPIRED row must not create a second PENDING one.
        if current.status != InvitationStatus::Pending
            && t.pending_for(rotated.organization_id, &rotated.email).is_some()
        {
            return Err(StoreError::Conflict("pending invitation exists".to_string()));
        }
        t.invitations.insert(rotated.id, rotated.clone());
        Ok(true)
    }

    async fn accept_invitation(&self, accept: &AcceptInvitation) -> Result<AcceptOutcome, StoreError> {
        let mut t = self.write()?;

        let usable = t
            .invitations
            .get(&accept.invitation_id)
            .is_some_and(|i| i.token == accept.token && i.is_usable(accept.now));
        if !usable {
            return Ok(AcceptOutcome::Stale);
        }

        let existing = t
            .membership_for(accept.organization_id, accept.user_id)
            .cloned();
        let (membership, created) = match existing {
            Some(existing) => (existing, false),
            None => {
                let m = Membership::from_invitation(
                    accept.organization_id,
                    accept.user_id,
                    accept.role,
                    accept.now,
                );
                t.memberships.insert(m.id, m.clone());
                (m, true)
            }
        };

        if let Some(invitation) = t.invitations.get_mut(&accept.invitation_id) {
            invitation.status = InvitationStatus::Accepted;
            invitation.updated_at = accept.now;
        }

        if let Some(promote_to) = accept.promote_to {
            if let Some(user) = t.users.get_mut(&accept.user_id) {
                if user.global_role.is_bare_default() {
                    user.global_role = promote_to;
                    user.updated_at = accept.now;
                }
            }
        }

        Ok(AcceptOutcome::Accepted { membership, created })
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut t = self.write()?;
        let mut expired = 0;
        for invitation in t.invitations.values_mut() {
            if invitation.status == InvitationStatus::Pending && invitation.is_expired(now) {
                invitation.status = InvitationStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}
