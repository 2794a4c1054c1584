//! Membership management inside the resolved organization.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use atelier_audit::{AuditAction, AuditEntry, AuditRecorder};
use atelier_auth::{Membership, MembershipRole, PermissionSet, User, catalog};
use atelier_core::{Clock, MembershipId, OrganizationId, UserId};

use crate::store::DirectoryStore;

use super::ServiceDeps;
use super::error::{ServiceError, ServiceResult};
use super::tenancy::TenancyService;

/// A membership joined with the member's public identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub id: MembershipId,
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: MembershipRole,
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberView {
    fn new(membership: Membership, user: &User) -> Self {
        Self {
            id: membership.id,
            organization_id: membership.organization_id,
            user_id: membership.user_id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: membership.role,
            permissions: membership.permissions,
            created_at: membership.created_at,
            updated_at: membership.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct MemberService {
    directory: Arc<dyn DirectoryStore>,
    tenancy: TenancyService,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
}

impl MemberService {
    pub fn new(deps: &ServiceDeps, tenancy: TenancyService, audit: AuditRecorder) -> Self {
        Self {
            directory: deps.directory.clone(),
            tenancy,
            audit,
            clock: deps.clock.clone(),
        }
    }

    pub async fn list_members(
        &self,
        actor: &User,
        requested: Option<OrganizationId>,
    ) -> ServiceResult<Vec<MemberView>> {
        let scope = self
            .tenancy
            .authorize(actor, requested, &catalog::WORKERS_MANAGE)
            .await?;
        let members = self.directory.list_members(scope.organization_id()).await?;
        Ok(members
            .into_iter()
            .map(|(membership, user)| MemberView::new(membership, &user))
            .collect())
    }

    /// Replace a member's role and explicit grants.
    ///
    /// Every permission must be a catalog entry; the whole update is rejected otherwise.
    #[instrument(skip(self, actor, permissions), fields(actor_id = %actor.id, membership_id = %membership_id, role = %role))]
    pub async fn update_member(
        &self,
        actor: &User,
        requested: Option<OrganizationId>,
        membership_id: MembershipId,
        role: MembershipRole,
        permissions: &[String],
    ) -> ServiceResult<Membership> {
        let scope = self
            .tenancy
            .authorize(actor, requested, &catalog::WORKERS_MANAGE)
            .await?;
        let permissions = PermissionSet::parse_all(permissions)?;

        let current = self
            .directory
            .find_membership_by_id(scope.organization_id(), membership_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        if current.user_id == actor.id {
            return Err(ServiceError::SelfModification);
        }

        let now = self.clock.now();
        let updated = Membership {
            role,
            permissions,
            updated_at: now,
            ..current.clone()
        };
        if !self.directory.update_membership(&updated).await? {
            return Err(ServiceError::NotFound);
        }

        self.audit
            .record(
                AuditEntry::builder(actor.id, AuditAction::MembershipUpdate)
                    .resource("membership", updated.id)
                    .organization(updated.organization_id)
                    .details(json!({
                        "user_id": updated.user_id,
                        "old": { "role": current.role, "permissions": current.permissions },
                        "new": { "role": updated.role, "permissions": updated.permissions },
                    }))
                    .build(now),
            )
            .await;

        Ok(updated)
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id, membership_id = %membership_id))]
    pub async fn remove_member(
        &self,
        actor: &User,
        requested: Option<OrganizationId>,
        membership_id: MembershipId,
    ) -> ServiceResult<()> {
        let scope = self
            .tenancy
            .authorize(actor, requested, &catalog::WORKERS_MANAGE)
            .await?;
        let organization_id = scope.organization_id();

        let current = self
            .directory
            .find_membership_by_id(organization_id, membership_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        if current.user_id == actor.id {
            return Err(ServiceError::SelfModification);
        }

        if !self.directory.delete_membership(organization_id, membership_id).await? {
            return Err(ServiceError::NotFound);
        }

        self.audit
            .record(
                AuditEntry::builder(actor.id, AuditAction::MembershipRemove)
                    .resource("membership", membership_id)
                    .organization(organization_id)
                    .details(json!({
                        "user_id": current.user_id,
                        "role": current.role,
                        "permissions": current.permissions,
                    }))
                    .build(self.clock.now()),
            )
            .await;

        Ok(())
    }
}
