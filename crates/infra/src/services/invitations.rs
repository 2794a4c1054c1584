//! Invitation Lifecycle Manager: create, resend, validate, accept.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use atelier_audit::{AuditAction, AuditEntry, AuditRecorder};
use atelier_auth::{Membership, MembershipRole, Organization, User, catalog, normalize_email};
use atelier_core::{Clock, InvitationId, OrganizationId};
use atelier_invitations::{
    AcceptMode, Invitation, InvitationPolicy, InvitationStatus, InvitationSummary, Validity,
    promoted_role, validate,
};

use crate::notifier::{AcceptUrl, Notification, Notifier, dispatch};
use crate::store::{AcceptInvitation, AcceptOutcome, DirectoryStore, InvitationStore, StoreError};

use super::ServiceDeps;
use super::error::{ServiceError, ServiceResult};
use super::tenancy::TenancyService;

/// Result of a successful accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedInvitation {
    pub organization_id: OrganizationId,
    pub membership: Membership,
    /// `false` for an idempotent re-accept.
    pub created: bool,
}

#[derive(Clone)]
pub struct InvitationService {
    directory: Arc<dyn DirectoryStore>,
    invitations: Arc<dyn InvitationStore>,
    tenancy: TenancyService,
    audit: AuditRecorder,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    policy: InvitationPolicy,
    public_base_url: String,
    notifier_timeout: Duration,
}

impl InvitationService {
    pub fn new(deps: &ServiceDeps, tenancy: TenancyService, audit: AuditRecorder) -> Self {
        Self {
            directory: deps.directory.clone(),
            invitations: deps.invitations.clone(),
            tenancy,
            audit,
            notifier: deps.notifier.clone(),
            clock: deps.clock.clone(),
            policy: deps.policy,
            public_base_url: deps.public_base_url.clone(),
            notifier_timeout: deps.notifier_timeout,
        }
    }

    /// Invite `email` into the inviter's resolved organization.
    ///
    /// The token leaves only through the notifier; the caller gets a summary.
    #[instrument(skip(self, inviter, email), fields(inviter_id = %inviter.id, requested = ?requested, role = %role))]
    pub async fn create(
        &self,
        inviter: &User,
        requested: Option<OrganizationId>,
        email: &str,
        role: MembershipRole,
    ) -> ServiceResult<InvitationSummary> {
        let scope = self
            .tenancy
            .authorize(inviter, requested, &catalog::WORKERS_MANAGE)
            .await?;
        let organization = &scope.organization;
        let email = normalize_email(email)?;
        self.ensure_not_member(organization, &email).await?;

        if self
            .invitations
            .find_pending_invitation(organization.id, &email)
            .await?
            .is_some()
        {
            return Err(ServiceError::DuplicatePendingInvitation);
        }

        let now = self.clock.now();
        let invitation = Invitation::issue(organization.id, &email, role, inviter.id, &self.policy, now)?;
        match self.invitations.insert_invitation(&invitation).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(ServiceError::DuplicatePendingInvitation),
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            organization_id = %organization.id,
            invitation_id = %invitation.id,
            token = %invitation.token.fingerprint(),
            "invitation created"
        );

        self.audit
            .record(
                AuditEntry::builder(inviter.id, AuditAction::InvitationCreate)
                    .resource("invitation", invitation.id)
                    .organization(organization.id)
                    .details(json!({
                        "email": invitation.email,
                        "role": invitation.role,
                        "token": invitation.token.fingerprint(),
                        "expires_at": invitation.expires_at,
                    }))
                    .build(now),
            )
            .await;

        self.notify(&invitation, inviter, &organization.name).await;
        Ok(invitation.summary())
    }

    /// Rotate the token and restart the validity window.
    ///
    /// Unknown ids and invitations of other organizations are both `Forbidden`.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id, invitation_id = %invitation_id))]
    pub async fn resend(&self, actor: &User, invitation_id: InvitationId) -> ServiceResult<InvitationSummary> {
        let current = self
            .invitations
            .find_invitation(invitation_id)
            .await?
            .ok_or(ServiceError::Forbidden)?;

        let scope = self
            .tenancy
            .authorize(actor, Some(current.organization_id), &catalog::WORKERS_MANAGE)
            .await
            .map_err(|err| match err {
                ServiceError::NoOrganizationContext => ServiceError::Forbidden,
                other => other,
            })?;

        let now = self.clock.now();
        current.ensure_resendable(&self.policy, now)?;
        // An expired invitation may be revived long after its invitee joined another way.
        self.ensure_not_member(&scope.organization, &current.email).await?;
        let rotated = current.rotated(&self.policy, now);

        let won = match self.invitations.rotate_invitation(&current, &rotated).await {
            Ok(won) => won,
            Err(StoreError::Conflict(_)) => return Err(ServiceError::DuplicatePendingInvitation),
            Err(err) => return Err(err.into()),
        };
        if !won {
            return Err(self.lost_rotation(invitation_id, now).await);
        }

        tracing::info!(
            organization_id = %rotated.organization_id,
            invitation_id = %rotated.id,
            old_token = %current.token.fingerprint(),
            new_token = %rotated.token.fingerprint(),
            "invitation resent"
        );

        self.audit
            .record(
                AuditEntry::builder(actor.id, AuditAction::InvitationResend)
                    .resource("invitation", rotated.id)
                    .organization(rotated.organization_id)
                    .details(json!({
                        "email": rotated.email,
                        "previous_status": current.status,
                        "old_token": current.token.fingerprint(),
                        "new_token": rotated.token.fingerprint(),
                        "expires_at": rotated.expires_at,
                    }))
                    .build(now),
            )
            .await;

        self.notify(&rotated, actor, &scope.organization.name).await;
        Ok(rotated.summary())
    }

    /// `AlreadyMember` when `email` belongs to the owner or a member of `organization`.
    async fn ensure_not_member(&self, organization: &Organization, email: &str) -> ServiceResult<()> {
        let Some(existing) = self.directory.find_user_by_email(email).await? else {
            return Ok(());
        };
        let is_member = organization.is_owned_by(existing.id)
            || self
                .directory
                .find_membership(organization.id, existing.id)
                .await?
                .is_some();
        if is_member {
            return Err(ServiceError::AlreadyMember);
        }
        Ok(())
    }

    /// Someone else changed the row between our read and our write.
    async fn lost_rotation(&self, invitation_id: InvitationId, now: chrono::DateTime<chrono::Utc>) -> ServiceError {
        let reloaded = match self.invitations.find_invitation(invitation_id).await {
            Ok(Some(reloaded)) => reloaded,
            Ok(None) => return ServiceError::InvalidState,
            Err(err) => return err.into(),
        };
        if reloaded.status == InvitationStatus::Accepted {
            return ServiceError::InvalidState;
        }
        match reloaded.ensure_resendable(&self.policy, now) {
            Err(err) => err.into(),
            // A concurrent resend won but the cooldown is already over.
            Ok(()) => ServiceError::TooSoon { retry_after_secs: 1 },
        }
    }

    /// Read-only token check; no authentication required.
    pub async fn validate(&self, token: &str) -> ServiceResult<Validity> {
        let found = self.invitations.find_invitation_by_token(token).await?;
        Ok(validate(found.as_ref(), self.clock.now()))
    }

    /// Accept an invitation for the authenticated `acceptor`.
    #[instrument(skip(self, acceptor, token), fields(acceptor_id = ?acceptor.map(|u| u.id)))]
    pub async fn accept(&self, acceptor: Option<&User>, token: &str) -> ServiceResult<AcceptedInvitation> {
        let acceptor = acceptor.ok_or(ServiceError::AuthenticationRequired)?;
        let invitation = self
            .invitations
            .find_invitation_by_token(token)
            .await?
            .ok_or(ServiceError::InvalidOrExpired)?;

        let now = self.clock.now();
        // `claimed` is true only when this call moved the row PENDING -> ACCEPTED.
        let (accepted, claimed) = match invitation.check_acceptable(acceptor, now)? {
            AcceptMode::Replay => (self.replay(&invitation, acceptor).await?, false),
            AcceptMode::Fresh => {
                let request = AcceptInvitation {
                    invitation_id: invitation.id,
                    token: invitation.token.clone(),
                    organization_id: invitation.organization_id,
                    user_id: acceptor.id,
                    role: invitation.role,
                    promote_to: promoted_role(acceptor.global_role),
                    now,
                };
                match self.invitations.accept_invitation(&request).await? {
                    AcceptOutcome::Accepted { membership, created } => (
                        AcceptedInvitation {
                            organization_id: invitation.organization_id,
                            membership,
                            created,
                        },
                        true,
                    ),
                    // Lost a race; a concurrent double-submit by the same acceptor is still a success.
                    AcceptOutcome::Stale => {
                        let reloaded = self
                            .invitations
                            .find_invitation(invitation.id)
                            .await?
                            .ok_or(ServiceError::InvalidOrExpired)?;
                        if reloaded.status != InvitationStatus::Accepted {
                            return Err(ServiceError::InvalidOrExpired);
                        }
                        (self.replay(&reloaded, acceptor).await?, false)
                    }
                }
            }
        };

        tracing::info!(
            organization_id = %accepted.organization_id,
            invitation_id = %invitation.id,
            membership_id = %accepted.membership.id,
            created = accepted.created,
            "invitation accepted"
        );

        if claimed {
            self.audit
                .record(
                    AuditEntry::builder(acceptor.id, AuditAction::InvitationAccept)
                        .resource("invitation", invitation.id)
                        .organization(invitation.organization_id)
                        .details(json!({
                            "membership_id": accepted.membership.id,
                            "membership_created": accepted.created,
                            "role": accepted.membership.role,
                            "token": invitation.token.fingerprint(),
                            "promoted_to": promoted_role(acceptor.global_role),
                        }))
                        .build(now),
                )
                .await;
        }

        Ok(accepted)
    }

    /// Re-accept of an `ACCEPTED` invitation: succeeds without writes iff the
    /// acceptor already holds the membership.
    async fn replay(&self, invitation: &Invitation, acceptor: &User) -> ServiceResult<AcceptedInvitation> {
        let membership = self
            .directory
            .find_membership(invitation.organization_id, acceptor.id)
            .await?
            .ok_or(ServiceError::InvalidOrExpired)?;
        Ok(AcceptedInvitation {
            organization_id: invitation.organization_id,
            membership,
            created: false,
        })
    }

    /// Invitations of the actor's resolved organization, newest first, without tokens.
    pub async fn list(
        &self,
        actor: &User,
        requested: Option<OrganizationId>,
    ) -> ServiceResult<Vec<InvitationSummary>> {
        let scope = self
            .tenancy
            .authorize(actor, requested, &catalog::WORKERS_MANAGE)
            .await?;
        let invitations = self.invitations.list_invitations(scope.organization_id()).await?;
        Ok(invitations.iter().map(Invitation::summary).collect())
    }

    /// Maintenance sweep: overdue `PENDING` → `EXPIRED`.
    pub async fn expire_overdue(&self) -> ServiceResult<u64> {
        let expired = self.invitations.expire_overdue(self.clock.now()).await?;
        if expired > 0 {
            tracing::info!(expired, "expired overdue invitations");
        }
        Ok(expired)
    }

    async fn notify(&self, invitation: &Invitation, inviter: &User, organization_name: &str) {
        let notification = Notification::Invitation {
            to: invitation.email.clone(),
            inviter_name: inviter.display_name.clone(),
            organization_name: organization_name.to_string(),
            role: invitation.role,
            accept_url: AcceptUrl::new(invitation.accept_url(&self.public_base_url)),
        };
        dispatch(self.notifier.as_ref(), notification, self.notifier_timeout).await;
    }
}
