//! Storage boundary for identity, tenancy and invitation state.
//!
//! Two traits split the tables by concern; both in-memory and Postgres
//! implementations provide the multi-row operations (owner approval, invitation
//! acceptance) as single atomic units.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use atelier_auth::{ApprovalStatus, GlobalRole, Membership, MembershipRole, Organization, User};
use atelier_core::{InvitationId, MembershipId, OrganizationId, UserId};
use atelier_invitations::{Invitation, InvitationToken};

pub use in_memory::InMemoryStore;
pub use postgres::{PostgresAuditLog, PostgresStore};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule rejected the write (email, slug, pending invitation, membership).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Backend(String),
}

/// Outcome of an owner approval attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproveOutcome {
    Approved { user: User, organization: Organization },
    /// The user is not an `OWNER` in `PENDING` (any more).
    NotPending,
}

/// Everything the accept transaction writes.
#[derive(Debug, Clone)]
pub struct AcceptInvitation {
    pub invitation_id: InvitationId,
    /// The token the acceptor presented; a concurrent resend that rotated it makes the accept stale.
    pub token: InvitationToken,
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub role: MembershipRole,
    /// Set when the acceptor's global role is a bare default.
    pub promote_to: Option<GlobalRole>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted {
        membership: Membership,
        /// `false` when the membership already existed.
        created: bool,
    },
    /// The invitation was no longer `PENDING` (or had expired) when the
    /// transaction ran; nothing was written.
    Stale,
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Fails with `Conflict` when the email is already registered (case-insensitive).
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(
        &self,
        role: GlobalRole,
        status: ApprovalStatus,
    ) -> Result<Vec<User>, StoreError>;

    /// Move a user from `from` to `to`. Returns the updated user, or `None` if
    /// the user was not in `from`.
    async fn transition_user_status(
        &self,
        id: UserId,
        from: ApprovalStatus,
        to: ApprovalStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    /// Atomically mark a pending owner `APPROVED` and create their organization.
    /// Fails with `Conflict` when the slug is taken.
    async fn approve_owner(
        &self,
        user_id: UserId,
        organization: &Organization,
        now: DateTime<Utc>,
    ) -> Result<ApproveOutcome, StoreError>;

    async fn find_organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError>;

    async fn find_owned_organization(&self, owner_id: UserId) -> Result<Option<Organization>, StoreError>;

    /// Every membership the user holds, with its organization.
    async fn memberships_of(&self, user_id: UserId) -> Result<Vec<(Organization, Membership)>, StoreError>;

    async fn find_membership(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<Option<Membership>, StoreError>;

    /// Lookup by id, scoped to `organization_id`.
    async fn find_membership_by_id(
        &self,
        organization_id: OrganizationId,
        id: MembershipId,
    ) -> Result<Option<Membership>, StoreError>;

    async fn list_members(&self, organization_id: OrganizationId) -> Result<Vec<(Membership, User)>, StoreError>;

    /// Persist role and permissions. Returns `false` if no row matched.
    async fn update_membership(&self, membership: &Membership) -> Result<bool, StoreError>;

    /// Returns `false` if no row matched.
    async fn delete_membership(
        &self,
        organization_id: OrganizationId,
        id: MembershipId,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    /// Fails with `Conflict` when a `PENDING` invitation exists for the same
    /// organization and email.
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StoreError>;

    async fn find_invitation(&self, id: InvitationId) -> Result<Option<Invitation>, StoreError>;

    async fn find_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>, StoreError>;

    async fn find_pending_invitation(
        &self,
        organization_id: OrganizationId,
        email: &str,
    ) -> Result<Option<Invitation>, StoreError>;

    /// Newest first.
    async fn list_invitations(&self, organization_id: OrganizationId) -> Result<Vec<Invitation>, StoreError>;

    /// Compare-and-set: replace `current` with `rotated` only if the stored row
    /// still has `current`'s status and `updated_at`. Returns whether it won.
    async fn rotate_invitation(&self, current: &Invitation, rotated: &Invitation) -> Result<bool, StoreError>;

    /// Mark accepted, create the membership if missing, promote the global
    /// role; all or nothing.
    async fn accept_invitation(&self, accept: &AcceptInvitation) -> Result<AcceptOutcome, StoreError>;

    /// Move overdue `PENDING` rows to `EXPIRED`. Returns how many moved.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
