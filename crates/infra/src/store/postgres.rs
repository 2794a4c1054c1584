//! Postgres-backed stores.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Backend` |
//! | PoolClosed / network / decode | N/A | `Backend` |
//!
//! ## Tenant Isolation
//!
//! Every membership and invitation query that can be reached with a
//! caller-supplied id also filters on `organization_id`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use atelier_audit::{AuditAction, AuditEntry, AuditError, AuditFilter, AuditLog};
use atelier_auth::{
    ApprovalStatus, GlobalRole, Membership, MembershipRole, Organization, PermissionSet, User,
};
use atelier_core::{AuditEntryId, InvitationId, MembershipId, OrganizationId, UserId};
use atelier_invitations::{Invitation, InvitationStatus, InvitationToken};

use super::{
    AcceptInvitation, AcceptOutcome, ApproveOutcome, DirectoryStore, InvitationStore, StoreError,
};

const USER_COLUMNS: &str = "id, email, display_name, global_role, status, created_at, updated_at";
const MEMBERSHIP_COLUMNS: &str =
    "id, organization_id, user_id, role, permissions, created_at, updated_at";
const INVITATION_COLUMNS: &str = "id, token, organization_id, email, role, invited_by, status, created_at, expires_at, updated_at";

/// Postgres implementation of [`DirectoryStore`] and [`InvitationStore`].
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        tracing::info!("connecting to database");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply `crates/infra/migrations`.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DirectoryStore for PostgresStore {
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, global_role, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.global_role.as_str())
        .bind(user.status.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.trim())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(
        &self,
        role: GlobalRole,
        status: ApprovalStatus,
    ) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE global_role = $1 AND status = $2 ORDER BY created_at"
        ))
        .bind(role.as_str())
        .bind(status.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_users", e))?;
        rows.iter().map(user_from_row).collect()
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn transition_user_status(
        &self,
        id: UserId,
        from: ApprovalStatus,
        to: ApprovalStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE users SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2 RETURNING {USER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transition_user_status", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(
        skip(self, organization),
        fields(user_id = %user_id, organization_id = %organization.id, slug = %organization.slug),
        err
    )]
    async fn approve_owner(
        &self,
        user_id: UserId,
        organization: &Organization,
        now: DateTime<Utc>,
    ) -> Result<ApproveOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE users SET status = 'APPROVED', updated_at = $2
            WHERE id = $1 AND global_role = 'OWNER' AND status = 'PENDING'
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("approve_owner_status", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(ApproveOutcome::NotPending);
        };
        let user = user_from_row(&row)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO organizations (id, name, slug, owner_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(organization.id.as_uuid())
        .bind(&organization.name)
        .bind(&organization.slug)
        .bind(organization.owner_id.as_uuid())
        .bind(organization.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(map_sqlx_error("insert_organization", e));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(ApproveOutcome::Approved {
            user,
            organization: organization.clone(),
        })
    }

    async fn find_organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, slug, owner_id, created_at FROM organizations WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_organization", e))?;
        row.as_ref().map(organization_from_row).transpose()
    }

    async fn find_owned_organization(&self, owner_id: UserId) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, slug, owner_id, created_at FROM organizations WHERE owner_id = $1",
        )
        .bind(owner_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_owned_organization", e))?;
        row.as_ref().map(organization_from_row).transpose()
    }

    async fn memberships_of(&self, user_id: UserId) -> Result<Vec<(Organization, Membership)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                m.id, m.organization_id, m.user_id, m.role, m.permissions, m.created_at, m.updated_at,
                o.name AS org_name, o.slug AS org_slug, o.owner_id AS org_owner_id,
                o.created_at AS org_created_at
            FROM memberships m
            JOIN organizations o ON o.id = m.organization_id
            WHERE m.user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("memberships_of", e))?;

        rows.iter()
            .map(|row| {
                let membership = membership_from_row(row)?;
                let organization = Organization {
                    id: membership.organization_id,
                    name: row.try_get("org_name").map_err(decode_error)?,
                    slug: row.try_get("org_slug").map_err(decode_error)?,
                    owner_id: UserId::from_uuid(row.try_get("org_owner_id").map_err(decode_error)?),
                    created_at: row.try_get("org_created_at").map_err(decode_error)?,
                };
                Ok((organization, membership))
            })
            .collect()
    }

    async fn find_membership(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<Option<Membership>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE organization_id = $1 AND user_id = $2"
        ))
        .bind(organization_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_membership", e))?;
        row.as_ref().map(membership_from_row).transpose()
    }

    async fn find_membership_by_id(
        &self,
        organization_id: OrganizationId,
        id: MembershipId,
    ) -> Result<Option<Membership>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE organization_id = $1 AND id = $2"
        ))
        .bind(organization_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_membership_by_id", e))?;
        row.as_ref().map(membership_from_row).transpose()
    }

    async fn list_members(&self, organization_id: OrganizationId) -> Result<Vec<(Membership, User)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                m.id, m.organization_id, m.user_id, m.role, m.permissions, m.created_at, m.updated_at,
                u.email AS user_email, u.display_name AS user_display_name,
                u.global_role AS user_global_role, u.status AS user_status,
                u.created_at AS user_created_at, u.updated_at AS user_updated_at
            FROM memberships m
            JOIN users u ON u.id = m.user_id
            WHERE m.organization_id = $1
            ORDER BY m.created_at
            "#,
        )
        .bind(organization_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_members", e))?;

        rows.iter()
            .map(|row| {
                let membership = membership_from_row(row)?;
                let global_role: String = row.try_get("user_global_role").map_err(decode_error)?;
                let status: String = row.try_get("user_status").map_err(decode_error)?;
                let user = User {
                    id: membership.user_id,
                    email: row.try_get("user_email").map_err(decode_error)?,
                    display_name: row.try_get("user_display_name").map_err(decode_error)?,
                    global_role: GlobalRole::parse(&global_role).map_err(corrupt)?,
                    status: ApprovalStatus::parse(&status).map_err(corrupt)?,
                    created_at: row.try_get("user_created_at").map_err(decode_error)?,
                    updated_at: row.try_get("user_updated_at").map_err(decode_error)?,
                };
                Ok((membership, user))
            })
            .collect()
    }

    #[instrument(
        skip(self, membership),
        fields(organization_id = %membership.organization_id, membership_id = %membership.id),
        err
    )]
    async fn update_membership(&self, membership: &Membership) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE memberships SET role = $3, permissions = $4, updated_at = $5
            WHERE organization_id = $1 AND id = $2
            "#,
        )
        .bind(membership.organization_id.as_uuid())
        .bind(membership.id.as_uuid())
        .bind(membership.role.as_str())
        .bind(membership.permissions.to_strings())
        .bind(membership.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_membership", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, membership_id = %id), err)]
    async fn delete_membership(
        &self,
        organization_id: OrganizationId,
        id: MembershipId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM memberships WHERE organization_id = $1 AND id = $2")
            .bind(organization_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_membership", e))?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl InvitationStore for PostgresStore {
    #[instrument(
        skip(self, invitation),
        fields(organization_id = %invitation.organization_id, invitation_id = %invitation.id),
        err
    )]
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO invitations (
                id, token, organization_id, email, role, invited_by, status,
                created_at, expires_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(invitation.id.as_uuid())
        .bind(invitation.token.expose())
        .bind(invitation.organization_id.as_uuid())
        .bind(&invitation.email)
        .bind(invitation.role.as_str())
        .bind(invitation.invited_by.as_uuid())
        .bind(invitation.status.as_str())
        .bind(invitation.created_at)
        .bind(invitation.expires_at)
        .bind(invitation.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_invitation", e))?;
        Ok(())
    }

    async fn find_invitation(&self, id: InvitationId) -> Result<Option<Invitation>, StoreError> {
        let row = sqlx::query(&format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_invitation", e))?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn find_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>, StoreError> {
        let row = sqlx::query(&format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE token = $1"))
            .bind(token)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_invitation_by_token", e))?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn find_pending_invitation(
        &self,
        organization_id: OrganizationId,
        email: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM invitations
            WHERE organization_id = $1 AND lower(email) = lower($2) AND status = 'PENDING'
            "#
        ))
        .bind(organization_id.as_uuid())
        .bind(email.trim())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_pending_invitation", e))?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn list_invitations(&self, organization_id: OrganizationId) -> Result<Vec<Invitation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE organization_id = $1 ORDER BY created_at DESC"
        ))
        .bind(organization_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_invitations", e))?;
        rows.iter().map(invitation_from_row).collect()
    }

    #[instrument(
        skip(self, current, rotated),
        fields(organization_id = %current.organization_id, invitation_id = %current.id),
        err
    )]
    async fn rotate_invitation(&self, current: &Invitation, rotated: &Invitation) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET token = $4, status = $5, created_at = $6, expires_at = $7, updated_at = $8
            WHERE id = $1 AND status = $2 AND updated_at = $3
            "#,
        )
        .bind(current.id.as_uuid())
        .bind(current.status.as_str())
        .bind(current.updated_at)
        .bind(rotated.token.expose())
        .bind(rotated.status.as_str())
        .bind(rotated.created_at)
        .bind(rotated.expires_at)
        .bind(rotated.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("rotate_invitation", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(
        skip(self, accept),
        fields(
            organization_id = %accept.organization_id,
            invitation_id = %accept.invitation_id,
            user_id = %accept.user_id
        ),
        err
    )]
    async fn accept_invitation(&self, accept: &AcceptInvitation) -> Result<AcceptOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Status and token together are the compare-and-set against a racing resend or accept.
        let claimed = sqlx::query(
            r#"
            UPDATE invitations SET status = 'ACCEPTED', updated_at = $2
            WHERE id = $1 AND status = 'PENDING' AND expires_at > $2 AND token = $3
            "#,
        )
        .bind(accept.invitation_id.as_uuid())
        .bind(accept.now)
        .bind(accept.token.expose())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("claim_invitation", e))?;

        if claimed.rows_affected() != 1 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(AcceptOutcome::Stale);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO memberships (id, organization_id, user_id, role, permissions, created_at, updated_at)
            VALUES ($1, $2, $3, $4, '{}', $5, $5)
            ON CONFLICT (organization_id, user_id) DO NOTHING
            "#,
        )
        .bind(MembershipId::new().as_uuid())
        .bind(accept.organization_id.as_uuid())
        .bind(accept.user_id.as_uuid())
        .bind(accept.role.as_str())
        .bind(accept.now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_membership", e))?;
        let created = inserted.rows_affected() == 1;

        let row = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE organization_id = $1 AND user_id = $2"
        ))
        .bind(accept.organization_id.as_uuid())
        .bind(accept.user_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_membership", e))?;
        let membership = membership_from_row(&row)?;

        if let Some(promote_to) = accept.promote_to {
            sqlx::query(
                "UPDATE users SET global_role = $2, updated_at = $3 WHERE id = $1 AND global_role = 'CLIENT'",
            )
            .bind(accept.user_id.as_uuid())
            .bind(promote_to.as_str())
            .bind(accept.now)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("promote_user", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(AcceptOutcome::Accepted { membership, created })
    }

    #[instrument(skip(self), err)]
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE invitations SET status = 'EXPIRED' WHERE status = 'PENDING' AND expires_at <= $1",
        )
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("expire_overdue", e))?;
        Ok(result.rows_affected())
    }
}

/// Postgres implementation of the audit trail.
#[derive(Debug, Clone)]
pub struct PostgresAuditLog {
    pool: Arc<PgPool>,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl AuditLog for PostgresAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries (
                id, actor_id, action, resource_type, resource_id, organization_id, details, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.actor_id.as_uuid())
        .bind(entry.action.as_str())
        .bind(&entry.resource_type)
        .bind(entry.resource_id.as_deref())
        .bind(entry.organization_id.map(Uuid::from))
        .bind(&entry.details)
        .bind(entry.recorded_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, action, resource_type, resource_id, organization_id, details, recorded_at
            FROM audit_entries
            WHERE ($1::uuid IS NULL OR organization_id = $1)
              AND ($2::uuid IS NULL OR actor_id = $2)
              AND ($3::text IS NULL OR action = $3)
            ORDER BY recorded_at DESC
            LIMIT $4
            "#,
        )
        .bind(filter.organization_id.map(Uuid::from))
        .bind(filter.actor_id.map(Uuid::from))
        .bind(filter.action.map(|a| a.as_str()))
        .bind(i64::from(filter.effective_limit()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let storage = |e: sqlx::Error| AuditError::Storage(e.to_string());
                let action: String = row.try_get("action").map_err(storage)?;
                let organization_id: Option<Uuid> = row.try_get("organization_id").map_err(storage)?;
                Ok(AuditEntry {
                    id: AuditEntryId::from_uuid(row.try_get("id").map_err(storage)?),
                    actor_id: UserId::from_uuid(row.try_get("actor_id").map_err(storage)?),
                    action: action.parse::<AuditAction>().map_err(AuditError::Storage)?,
                    resource_type: row.try_get("resource_type").map_err(storage)?,
                    resource_id: row.try_get("resource_id").map_err(storage)?,
                    organization_id: organization_id.map(OrganizationId::from_uuid),
                    details: row.try_get("details").map_err(storage)?,
                    recorded_at: row.try_get("recorded_at").map_err(storage)?,
                })
            })
            .collect()
    }
}

// Row mapping

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let global_role: String = row.try_get("global_role").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    Ok(User {
        id: UserId::from_uuid(row.try_get("id").map_err(decode_error)?),
        email: row.try_get("email").map_err(decode_error)?,
        display_name: row.try_get("display_name").map_err(decode_error)?,
        global_role: GlobalRole::parse(&global_role).map_err(corrupt)?,
        status: ApprovalStatus::parse(&status).map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn organization_from_row(row: &PgRow) -> Result<Organization, StoreError> {
    Ok(Organization {
        id: OrganizationId::from_uuid(row.try_get("id").map_err(decode_error)?),
        name: row.try_get("name").map_err(decode_error)?,
        slug: row.try_get("slug").map_err(decode_error)?,
        owner_id: UserId::from_uuid(row.try_get("owner_id").map_err(decode_error)?),
        created_at: row.try_get("created_at").map_err(decode_error)?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<Membership, StoreError> {
    let role: String = row.try_get("role").map_err(decode_error)?;
    let permissions: Vec<String> = row.try_get("permissions").map_err(decode_error)?;
    Ok(Membership {
        id: MembershipId::from_uuid(row.try_get("id").map_err(decode_error)?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id").map_err(decode_error)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode_error)?),
        role: role.parse::<MembershipRole>().map_err(corrupt)?,
        permissions: PermissionSet::parse_all(&permissions).map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn invitation_from_row(row: &PgRow) -> Result<Invitation, StoreError> {
    let token: String = row.try_get("token").map_err(decode_error)?;
    let role: String = row.try_get("role").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    Ok(Invitation {
        id: InvitationId::from_uuid(row.try_get("id").map_err(decode_error)?),
        token: InvitationToken::from_raw(token),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id").map_err(decode_error)?),
        email: row.try_get("email").map_err(decode_error)?,
        role: role.parse::<MembershipRole>().map_err(corrupt)?,
        invited_by: UserId::from_uuid(row.try_get("invited_by").map_err(decode_error)?),
        status: InvitationStatus::parse(&status).map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        expires_at: row.try_get("expires_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {err}"))
}

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("unexpected stored value: {err}"))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
