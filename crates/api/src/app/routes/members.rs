use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};

use atelier_core::MembershipId;
use atelier_infra::services::Services;

use crate::app::{dto, errors};
use crate::context::Identity;

/// GET /members
pub async fn list(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<dto::OrganizationQuery>,
) -> axum::response::Response {
    match services
        .members
        .list_members(identity.user(), query.organization_id)
        .await
    {
        Ok(members) => Json(serde_json::json!({ "members": members })).into_response(),
        Err(e) => errors::service_error(e),
    }
}

/// PUT /members/:id
pub async fn update(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Query(query): Query<dto::OrganizationQuery>,
    Json(body): Json<dto::UpdateMemberRequest>,
) -> axum::response::Response {
    let id: MembershipId = match dto::parse_id(&id, "membership") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let role = match dto::parse_membership_role(&body.role) {
        Ok(role) => role,
        Err(resp) => return resp,
    };

    match services
        .members
        .update_member(identity.user(), query.organization_id, id, role, &body.permissions)
        .await
    {
        Ok(membership) => Json(membership).into_response(),
        Err(e) => errors::service_error(e),
    }
}

/// DELETE /members/:id
pub async fn remove(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Query(query): Query<dto::OrganizationQuery>,
) -> axum::response::Response {
    let id: MembershipId = match dto::parse_id(&id, "membership") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .members
        .remove_member(identity.user(), query.organization_id, id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error(e),
    }
}
