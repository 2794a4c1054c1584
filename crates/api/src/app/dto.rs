use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use atelier_auth::{GlobalRole, MembershipRole};
use atelier_core::OrganizationId;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: String,
    /// `OWNER` or `CLIENT`; defaults to `CLIENT`.
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    pub email: String,
    pub role: String,
    pub organization_id: Option<OrganizationId>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateInvitationQuery {
    pub token: String,
}

/// Optional explicit organization for organization-scoped routes.
#[derive(Debug, Default, Deserialize)]
pub struct OrganizationQuery {
    pub organization_id: Option<OrganizationId>,
}

#[derive(Debug, Deserialize)]
pub struct AuthzCheckQuery {
    pub permission: String,
    pub organization_id: Option<OrganizationId>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub organization_id: Option<OrganizationId>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveOwnerRequest {
    pub organization_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectOwnerRequest {
    pub reason: Option<String>,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_id<T: From<Uuid>>(raw: &str, what: &'static str) -> Result<T, axum::response::Response> {
    raw.parse::<Uuid>()
        .map(T::from)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

pub fn parse_membership_role(raw: &str) -> Result<MembershipRole, axum::response::Response> {
    raw.parse::<MembershipRole>()
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_role", e.to_string()))
}

/// Self-registration may only ask for the roles a stranger may hold.
pub fn parse_registration_role(raw: Option<&str>) -> Result<GlobalRole, axum::response::Response> {
    let Some(raw) = raw else {
        return Ok(GlobalRole::Client);
    };
    match GlobalRole::parse(&raw.trim().to_ascii_uppercase()) {
        Ok(role @ (GlobalRole::Owner | GlobalRole::Client)) => Ok(role),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_role",
            "role must be one of: OWNER, CLIENT",
        )),
    }
}
