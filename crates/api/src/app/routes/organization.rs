//! Tenancy and permission endpoints for the CRUD layer and the UI.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};

use atelier_auth::{Permission, catalog};
use atelier_infra::services::Services;

use crate::app::{dto, errors};
use crate::context::Identity;

/// GET /organization - the organization this request resolves to
pub async fn current(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<dto::OrganizationQuery>,
) -> axum::response::Response {
    match services
        .tenancy
        .resolve_organization(identity.user(), query.organization_id)
        .await
    {
        Ok(resolved) => Json(resolved).into_response(),
        Err(e) => errors::service_error(e),
    }
}

/// GET /authz/check?permission=X - allow, or the uniform denial
pub async fn check(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<dto::AuthzCheckQuery>,
) -> axum::response::Response {
    let permission = match Permission::parse(&query.permission) {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_permission", e.to_string()),
    };

    match services
        .tenancy
        .authorize(identity.user(), query.organization_id, &permission)
        .await
    {
        Ok(scope) => Json(serde_json::json!({
            "allowed": true,
            "organization_id": scope.organization_id(),
            "permission": permission,
        }))
        .into_response(),
        Err(e) => errors::service_error(e),
    }
}

/// GET /permissions - the catalog and what each membership role implies
pub async fn permissions(Extension(_identity): Extension<Identity>) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "resources": catalog::resources(),
            "roles": catalog::all_role_defaults(),
        })),
    )
        .into_response()
}
