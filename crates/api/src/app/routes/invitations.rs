//! Invitation lifecycle endpoints.
//!
//! Tokens never appear in a response body; they travel only through the notifier.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};

use atelier_core::InvitationId;
use atelier_infra::services::Services;

use crate::app::{dto, errors};
use crate::context::{Identity, OptionalIdentity};

/// POST /invitations
pub async fn create(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<dto::CreateInvitationRequest>,
) -> axum::response::Response {
    let role = match dto::parse_membership_role(&body.role) {
        Ok(role) => role,
        Err(resp) => return resp,
    };

    match services
        .invitations
        .create(identity.user(), body.organization_id, &body.email, role)
        .await
    {
        Ok(invitation) => (StatusCode::CREATED, Json(invitation)).into_response(),
        Err(e) => errors::service_error(e),
    }
}

/// GET /invitations
pub async fn list(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<dto::OrganizationQuery>,
) -> axum::response::Response {
    match services
        .invitations
        .list(identity.user(), query.organization_id)
        .await
    {
        Ok(invitations) => Json(serde_json::json!({ "invitations": invitations })).into_response(),
        Err(e) => errors::service_error(e),
    }
}

/// POST /invitations/:id/resend
pub async fn resend(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: InvitationId = match dto::parse_id(&id, "invitation") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.invitations.resend(identity.user(), id).await {
        Ok(invitation) => Json(invitation).into_response(),
        Err(e) => errors::service_error(e),
    }
}

/// GET /invitations/validate?token=
pub async fn validate(
    Extension(services): Extension<Arc<Services>>,
    Query(query): Query<dto::ValidateInvitationQuery>,
) -> axum::response::Response {
    match services.invitations.validate(&query.token).await {
        Ok(validity) => Json(validity).into_response(),
        Err(e) => errors::service_error(e),
    }
}

/// POST /invitations/accept
pub async fn accept(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<OptionalIdentity>,
    Json(body): Json<dto::AcceptInvitationRequest>,
) -> axum::response::Response {
    match services.invitations.accept(identity.user(), &body.token).await {
        Ok(accepted) => {
            let status = if accepted.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(accepted)).into_response()
        }
        Err(e) => errors::service_error(e),
    }
}
