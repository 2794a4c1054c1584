//! Tenancy facts: organizations and the memberships that join users to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, MembershipId, OrganizationId, UserId};

use crate::{MembershipRole, PermissionSet};

/// A tenant. Exactly one owner; ownership is not transferable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    /// Globally unique (enforced by storage).
    pub slug: String,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(
        id: OrganizationId,
        owner_id: UserId,
        name: &str,
        slug: String,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("organization name cannot be empty"));
        }
        Ok(Self {
            id,
            name: name.to_string(),
            slug,
            owner_id,
            created_at: now,
        })
    }

    /// Ownership is a direct field comparison, never a membership row.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}

/// Derive a URL-safe slug from an organization name.
///
/// `attempt` > 1 appends a numeric suffix for collision retries.
pub fn slugify(name: &str, attempt: u32) -> Result<String, DomainError> {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        return Err(DomainError::validation(
            "organization name must contain at least one letter or digit",
        ));
    }
    if attempt > 1 {
        slug.push_str(&format!("-{attempt}"));
    }
    Ok(slug)
}

/// A non-owner user's grant inside one organization.
///
/// At most one per `(organization_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub role: MembershipRole,
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    /// Membership created by invitation acceptance: invited role, no grants.
    pub fn from_invitation(
        organization_id: OrganizationId,
        user_id: UserId,
        role: MembershipRole,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MembershipId::new(),
            organization_id,
            user_id,
            role,
            permissions: PermissionSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this row actually joins `user_id` to `organization_id`.
    pub fn binds(&self, organization_id: OrganizationId, user_id: UserId) -> bool {
        self.organization_id == organization_id && self.user_id == user_id
    }
}
