use thiserror::Error;

use atelier_auth::{AdminRequired, AuthzError, IdentityError, PermissionError, TenancyError};
use atelier_core::DomainError;
use atelier_invitations::InvitationError;

use crate::store::StoreError;

/// Failure taxonomy of the service layer. The API maps each variant to one
/// HTTP status; `Internal` never carries detail outward.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("unauthenticated")]
    Unauthenticated,

    /// No identity on a route that can prompt login/registration instead.
    #[error("authentication required")]
    AuthenticationRequired,

    #[error("no organization context")]
    NoOrganizationContext,

    /// Single shape for every denial branch.
    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("already a member of this organization")]
    AlreadyMember,

    #[error("a pending invitation already exists for this email")]
    DuplicatePendingInvitation,

    #[error("invalid state for this operation")]
    InvalidState,

    #[error("too soon; retry in {retry_after_secs}s")]
    TooSoon { retry_after_secs: i64 },

    #[error("invitation is invalid or expired")]
    InvalidOrExpired,

    #[error("cannot accept your own invitation")]
    SelfInvitation,

    #[error("invitation was issued to a different email address")]
    EmailMismatch,

    /// Self-lockout guard on membership changes.
    #[error("cannot modify your own membership")]
    SelfModification,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("internal error")]
    Internal,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        tracing::error!(target: "telemetry", error = %err, "storage failure");
        ServiceError::Internal
    }
}

impl From<AuthzError> for ServiceError {
    fn from(_: AuthzError) -> Self {
        ServiceError::Forbidden
    }
}

impl From<AdminRequired> for ServiceError {
    fn from(_: AdminRequired) -> Self {
        ServiceError::Forbidden
    }
}

impl From<TenancyError> for ServiceError {
    fn from(err: TenancyError) -> Self {
        match err {
            TenancyError::NoOrganizationContext => ServiceError::NoOrganizationContext,
        }
    }
}

impl From<IdentityError> for ServiceError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Unauthenticated => ServiceError::Unauthenticated,
        }
    }
}

impl From<PermissionError> for ServiceError {
    fn from(err: PermissionError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<InvitationError> for ServiceError {
    fn from(err: InvitationError) -> Self {
        match err {
            InvitationError::Validation(msg) => ServiceError::Validation(msg),
            InvitationError::InvalidState => ServiceError::InvalidState,
            InvitationError::TooSoon { retry_after_secs } => ServiceError::TooSoon { retry_after_secs },
            InvitationError::InvalidOrExpired => ServiceError::InvalidOrExpired,
            InvitationError::SelfInvitation => ServiceError::SelfInvitation,
            InvitationError::EmailMismatch => ServiceError::EmailMismatch,
        }
    }
}
