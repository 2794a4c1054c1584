use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use atelier_auth::{GlobalRole, MembershipRole, User, normalize_email};
use atelier_core::{InvitationId, OrganizationId, UserId};

use crate::token::InvitationToken;

/// Lifetime and throttle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvitationPolicy {
    pub ttl: Duration,
    pub resend_cooldown: Duration,
}

impl Default for InvitationPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::days(7),
            resend_cooldown: Duration::seconds(60),
        }
    }
}

/// `PENDING` → `ACCEPTED` | `EXPIRED`. Resend may move `EXPIRED` back to `PENDING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "PENDING",
            InvitationStatus::Accepted => "ACCEPTED",
            InvitationStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, InvitationError> {
        match raw {
            "PENDING" => Ok(InvitationStatus::Pending),
            "ACCEPTED" => Ok(InvitationStatus::Accepted),
            "EXPIRED" => Ok(InvitationStatus::Expired),
            other => Err(InvitationError::Validation(format!(
                "unknown invitation status '{other}'"
            ))),
        }
    }
}

impl core::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvitationError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Resend is only possible from `PENDING` or `EXPIRED`.
    #[error("invitation cannot be resent in its current state")]
    InvalidState,

    #[error("invitation was sent too recently; retry in {retry_after_secs}s")]
    TooSoon { retry_after_secs: i64 },

    #[error("invitation is invalid or expired")]
    InvalidOrExpired,

    #[error("cannot accept your own invitation")]
    SelfInvitation,

    #[error("invitation was issued to a different email address")]
    EmailMismatch,
}

/// Invitation record. Never physically deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub token: InvitationToken,
    pub organization_id: OrganizationId,
    /// Normalized (trimmed, lowercase).
    pub email: String,
    pub role: MembershipRole,
    pub invited_by: UserId,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How an acceptance should be carried out once the guards pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptMode {
    /// `PENDING` and in date: run the accept transaction.
    Fresh,
    /// Already `ACCEPTED`: succeeds without writes, but only if the acceptor
    /// already holds the membership.
    Replay,
}

impl Invitation {
    /// Issue a new `PENDING` invitation with a fresh token.
    pub fn issue(
        organization_id: OrganizationId,
        email: &str,
        role: MembershipRole,
        invited_by: UserId,
        policy: &InvitationPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self, InvitationError> {
        let email = normalize_email(email).map_err(|e| InvitationError::Validation(e.to_string()))?;
        Ok(Self {
            id: InvitationId::new(),
            token: InvitationToken::generate(),
            organization_id,
            email,
            role,
            invited_by,
            status: InvitationStatus::Pending,
            created_at: now,
            expires_at: now + policy.ttl,
            updated_at: now,
        })
    }

    /// `expires_at` is the only expiry source.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// `PENDING` and not yet past `expires_at`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired(now)
    }

    /// Resend preconditions: state first, then the throttle on `updated_at`.
    pub fn ensure_resendable(
        &self,
        policy: &InvitationPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), InvitationError> {
        if self.status == InvitationStatus::Accepted {
            return Err(InvitationError::InvalidState);
        }
        let elapsed = now - self.updated_at;
        if elapsed < policy.resend_cooldown {
            let remaining = policy.resend_cooldown - elapsed;
            // Round up so "retry after" never lands inside the window.
            let retry_after_secs = (remaining.num_milliseconds() + 999) / 1000;
            return Err(InvitationError::TooSoon {
                retry_after_secs: retry_after_secs.max(1),
            });
        }
        Ok(())
    }

    /// The post-resend row: new token, fresh window, back to `PENDING`.
    ///
    /// Does not check preconditions; call [`ensure_resendable`](Self::ensure_resendable) first.
    pub fn rotated(&self, policy: &InvitationPolicy, now: DateTime<Utc>) -> Self {
        let mut token = InvitationToken::generate();
        while token == self.token {
            token = InvitationToken::generate();
        }
        Self {
            token,
            status: InvitationStatus::Pending,
            created_at: now,
            expires_at: now + policy.ttl,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Accept guards, in order: state, self-invitation, email match.
    pub fn check_acceptable(
        &self,
        acceptor: &User,
        now: DateTime<Utc>,
    ) -> Result<AcceptMode, InvitationError> {
        let mode = match self.status {
            InvitationStatus::Pending if !self.is_expired(now) => AcceptMode::Fresh,
            InvitationStatus::Accepted => AcceptMode::Replay,
            InvitationStatus::Pending | InvitationStatus::Expired => {
                return Err(InvitationError::InvalidOrExpired);
            }
        };
        if self.invited_by == acceptor.id {
            return Err(InvitationError::SelfInvitation);
        }
        if !acceptor.email_matches(&self.email) {
            return Err(InvitationError::EmailMismatch);
        }
        Ok(mode)
    }

    /// `{base_url}/accept-invitation?token={token}`. Only ever handed to the notifier.
    pub fn accept_url(&self, base_url: &str) -> String {
        format!(
            "{}/accept-invitation?token={}",
            base_url.trim_end_matches('/'),
            self.token.expose()
        )
    }

    pub fn summary(&self) -> InvitationSummary {
        InvitationSummary {
            id: self.id,
            organization_id: self.organization_id,
            email: self.email.clone(),
            role: self.role,
            invited_by: self.invited_by,
            status: self.status,
            created_at: self.created_at,
            expires_at: self.expires_at,
            updated_at: self.updated_at,
        }
    }
}

/// Invitation without its token; safe to return to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvitationSummary {
    pub id: InvitationId,
    pub organization_id: OrganizationId,
    pub email: String,
    pub role: MembershipRole,
    pub invited_by: UserId,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Global role after accepting: a bare default is promoted to `WORKER`.
pub fn promoted_role(current: GlobalRole) -> Option<GlobalRole> {
    current.is_bare_default().then_some(GlobalRole::Worker)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    NotFound,
    NotPending,
    Expired,
}

/// Result of the public, read-only token check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validity {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
}

impl Validity {
    fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn invalid(reason: InvalidReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Check, in order: existence, `PENDING`, expiry. Never mutates.
pub fn validate(found: Option<&Invitation>, now: DateTime<Utc>) -> Validity {
    match found {
        None => Validity::invalid(InvalidReason::NotFound),
        Some(inv) if inv.status != InvitationStatus::Pending => {
            Validity::invalid(InvalidReason::NotPending)
        }
        Some(inv) if inv.is_expired(now) => Validity::invalid(InvalidReason::Expired),
        Some(_) => Validity::valid(),
    }
}
