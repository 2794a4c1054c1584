//! Identity model: who is asking, and with which global attributes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use atelier_core::{DomainError, UserId};

/// Platform-wide role of a user.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlobalRole {
    /// Platform operator.
    Admin,
    /// Tailor/seamstress who runs an organization (subject to admin approval).
    Owner,
    /// Has at least one workplace.
    Worker,
    /// Bare default for self-registered users.
    Client,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Admin => "ADMIN",
            GlobalRole::Owner => "OWNER",
            GlobalRole::Worker => "WORKER",
            GlobalRole::Client => "CLIENT",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw {
            "ADMIN" => Ok(GlobalRole::Admin),
            "OWNER" => Ok(GlobalRole::Owner),
            "WORKER" => Ok(GlobalRole::Worker),
            "CLIENT" => Ok(GlobalRole::Client),
            other => Err(DomainError::validation(format!("unknown global role '{other}'"))),
        }
    }

    /// Status a freshly registered user starts in.
    pub fn initial_status(&self) -> ApprovalStatus {
        match self {
            GlobalRole::Owner => ApprovalStatus::Pending,
            GlobalRole::Admin | GlobalRole::Worker | GlobalRole::Client => ApprovalStatus::Active,
        }
    }

    /// Neither admin nor organization-owner-eligible nor already a worker:
    /// accepting an invitation promotes this role.
    pub fn is_bare_default(&self) -> bool {
        matches!(self, GlobalRole::Client)
    }
}

impl core::fmt::Display for GlobalRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account approval status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    /// Owner awaiting admin approval.
    Pending,
    /// Owner approved by an admin.
    Approved,
    Active,
    Suspended,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Active => "ACTIVE",
            ApprovalStatus::Suspended => "SUSPENDED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw {
            "PENDING" => Ok(ApprovalStatus::Pending),
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "ACTIVE" => Ok(ApprovalStatus::Active),
            "SUSPENDED" => Ok(ApprovalStatus::Suspended),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            other => Err(DomainError::validation(format!("unknown approval status '{other}'"))),
        }
    }

    /// Suspended and rejected accounts cannot act at all.
    pub fn may_authenticate(&self) -> bool {
        !matches!(self, ApprovalStatus::Suspended | ApprovalStatus::Rejected)
    }
}

impl core::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated user as seen by the authorization core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Stored normalized (trimmed, lowercase).
    pub email: String,
    pub display_name: String,
    pub global_role: GlobalRole,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a newly registered user; status follows from the role.
    pub fn register(
        id: UserId,
        email: &str,
        display_name: &str,
        global_role: GlobalRole,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let email = normalize_email(email)?;
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }

        Ok(Self {
            id,
            email,
            display_name: display_name.to_string(),
            global_role,
            status: global_role.initial_status(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.global_role == GlobalRole::Admin
    }

    /// Case-insensitive email comparison.
    pub fn email_matches(&self, other: &str) -> bool {
        self.email.eq_ignore_ascii_case(other.trim())
    }
}

/// Trim + lowercase an email and apply a basic shape check.
pub fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(DomainError::validation("invalid email format"));
    }
    Ok(email)
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    #[error("unauthenticated")]
    Unauthenticated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owners_start_pending_and_clients_active() {
        let now = Utc::now();
        let owner = User::register(UserId::new(), "ama@atelier.test", "Ama", GlobalRole::Owner, now).unwrap();
        assert_eq!(owner.status, ApprovalStatus::Pending);

        let client = User::register(UserId::new(), "kofi@x.com", "Kofi", GlobalRole::Client, now).unwrap();
        assert_eq!(client.status, ApprovalStatus::Active);
    }

    #[test]
    fn register_normalizes_email() {
        let user = User::register(UserId::new(), "  Worker@X.com ", "W", GlobalRole::Client, Utc::now()).unwrap();
        assert_eq!(user.email, "worker@x.com");
        assert!(user.email_matches("WORKER@x.COM"));
    }

    #[test]
    fn invalid_emails_are_rejected() {
        for raw in ["", "no-at-sign", "@x.com", "a@b", "a@.com", "a b@x.com"] {
            assert!(normalize_email(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn only_clients_are_bare_defaults() {
        assert!(GlobalRole::Client.is_bare_default());
        assert!(!GlobalRole::Worker.is_bare_default());
        assert!(!GlobalRole::Owner.is_bare_default());
        assert!(!GlobalRole::Admin.is_bare_default());
    }

    #[test]
    fn suspended_and_rejected_cannot_authenticate() {
        assert!(!ApprovalStatus::Suspended.may_authenticate());
        assert!(!ApprovalStatus::Rejected.may_authenticate());
        assert!(ApprovalStatus::Pending.may_authenticate());
    }
}
