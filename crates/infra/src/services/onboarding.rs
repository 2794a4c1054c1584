//! Registration and admin-gated owner onboarding.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::instrument;

use atelier_audit::{AuditAction, AuditEntry, AuditRecorder};
use atelier_auth::{ApprovalStatus, GlobalRole, Organization, User, normalize_email, slugify};
use atelier_core::{Clock, OrganizationId, UserId};

use crate::notifier::{Notification, Notifier, dispatch};
use crate::store::{ApproveOutcome, DirectoryStore, StoreError};

use super::ServiceDeps;
use super::error::{ServiceError, ServiceResult};
use super::tenancy::require_admin;

/// Slug suffixes tried before giving up on a name.
const MAX_SLUG_ATTEMPTS: u32 = 20;

#[derive(Clone)]
pub struct OnboardingService {
    directory: Arc<dyn DirectoryStore>,
    audit: AuditRecorder,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    notifier_timeout: Duration,
}

impl OnboardingService {
    pub fn new(deps: &ServiceDeps, audit: AuditRecorder) -> Self {
        Self {
            directory: deps.directory.clone(),
            audit,
            notifier: deps.notifier.clone(),
            clock: deps.clock.clone(),
            notifier_timeout: deps.notifier_timeout,
        }
    }

    /// Create a user; owners start `PENDING`, everyone else `ACTIVE`.
    #[instrument(skip(self, email, display_name), fields(role = %role))]
    pub async fn register(&self, email: &str, display_name: &str, role: GlobalRole) -> ServiceResult<User> {
        let user = User::register(UserId::new(), email, display_name, role, self.clock.now())?;
        match self.directory.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(ServiceError::Validation("email already registered".to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        tracing::info!(user_id = %user.id, status = %user.status, "user registered");
        Ok(user)
    }

    /// Make sure the platform operator account exists. Returns the existing user
    /// untouched when the email is already registered.
    pub async fn bootstrap_admin(&self, email: &str) -> ServiceResult<User> {
        let email = normalize_email(email)?;
        if let Some(existing) = self.directory.find_user_by_email(&email).await? {
            if !existing.is_admin() {
                tracing::warn!(user_id = %existing.id, "bootstrap admin email belongs to a non-admin user");
            }
            return Ok(existing);
        }
        self.register(&email, "Administrator", GlobalRole::Admin).await
    }

    pub async fn list_pending_owners(&self, admin: &User) -> ServiceResult<Vec<User>> {
        require_admin(admin)?;
        Ok(self
            .directory
            .list_users(GlobalRole::Owner, ApprovalStatus::Pending)
            .await?)
    }

    /// Approve a pending owner and create their organization in one step.
    #[instrument(skip(self, admin, organization_name), fields(admin_id = %admin.id, user_id = %user_id))]
    pub async fn approve_owner(
        &self,
        admin: &User,
        user_id: UserId,
        organization_name: &str,
    ) -> ServiceResult<Organization> {
        require_admin(admin)?;
        let now = self.clock.now();

        let mut attempt = 1;
        let (owner, organization) = loop {
            let slug = slugify(organization_name, attempt)?;
            let candidate = Organization::new(OrganizationId::new(), user_id, organization_name, slug, now)?;
            match self.directory.approve_owner(user_id, &candidate, now).await {
                Ok(ApproveOutcome::Approved { user, organization }) => break (user, organization),
                Ok(ApproveOutcome::NotPending) => return Err(self.not_pending(user_id).await),
                Err(StoreError::Conflict(reason)) if attempt < MAX_SLUG_ATTEMPTS => {
                    tracing::debug!(attempt, %reason, "slug collision, retrying");
                    attempt += 1;
                }
                Err(StoreError::Conflict(_)) => {
                    return Err(ServiceError::Validation(
                        "could not derive a unique slug for this organization name".to_string(),
                    ));
                }
                Err(err) => return Err(err.into()),
            }
        };

        tracing::info!(
            user_id = %owner.id,
            organization_id = %organization.id,
            slug = %organization.slug,
            "owner approved"
        );

        self.audit
            .record(
                AuditEntry::builder(admin.id, AuditAction::OwnerApprove)
                    .resource("user", owner.id)
                    .organization(organization.id)
                    .details(json!({ "email": owner.email }))
                    .build(now),
            )
            .await;
        self.audit
            .record(
                AuditEntry::builder(admin.id, AuditAction::OrganizationCreate)
                    .resource("organization", organization.id)
                    .organization(organization.id)
                    .details(json!({
                        "name": organization.name,
                        "slug": organization.slug,
                        "owner_id": owner.id,
                    }))
                    .build(now),
            )
            .await;

        let notice = Notification::OwnerApproved {
            to: owner.email.clone(),
            display_name: owner.display_name.clone(),
            organization_name: organization.name.clone(),
        };
        dispatch(self.notifier.as_ref(), notice, self.notifier_timeout).await;

        Ok(organization)
    }

    #[instrument(skip(self, admin, reason), fields(admin_id = %admin.id, user_id = %user_id))]
    pub async fn reject_owner(&self, admin: &User, user_id: UserId, reason: Option<String>) -> ServiceResult<User> {
        require_admin(admin)?;
        let now = self.clock.now();

        let owner = match self.directory.find_user(user_id).await? {
            Some(user) if user.global_role == GlobalRole::Owner => user,
            Some(_) => return Err(ServiceError::InvalidState),
            None => return Err(ServiceError::NotFound),
        };
        let rejected = self
            .directory
            .transition_user_status(owner.id, ApprovalStatus::Pending, ApprovalStatus::Rejected, now)
            .await?
            .ok_or(ServiceError::InvalidState)?;

        tracing::info!(user_id = %rejected.id, "owner rejected");

        self.audit
            .record(
                AuditEntry::builder(admin.id, AuditAction::OwnerReject)
                    .resource("user", rejected.id)
                    .details(json!({ "email": rejected.email, "reason": reason }))
                    .build(now),
            )
            .await;

        let notice = Notification::OwnerRejected {
            to: rejected.email.clone(),
            display_name: rejected.display_name.clone(),
            reason,
        };
        dispatch(self.notifier.as_ref(), notice, self.notifier_timeout).await;

        Ok(rejected)
    }

    async fn not_pending(&self, user_id: UserId) -> ServiceError {
        match self.directory.find_user(user_id).await {
            Ok(Some(_)) => ServiceError::InvalidState,
            Ok(None) => ServiceError::NotFound,
            Err(err) => err.into(),
        }
    }
}
