//! Platform-operator routes: owner onboarding.
//!
//! Every handler is gated on the global `ADMIN` role inside the service, before
//! any tenant logic runs.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use atelier_core::UserId;
use atelier_infra::services::Services;

use crate::app::{dto, errors};
use crate::context::Identity;

pub fn router() -> Router {
    Router::new()
        .route("/owners/pending", get(list_pending_owners))
        .route("/owners/:id/approve", post(approve_owner))
        .route("/owners/:id/reject", post(reject_owner))
}

/// GET /admin/owners/pending
pub async fn list_pending_owners(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
) -> axum::response::Response {
    match services.onboarding.list_pending_owners(identity.user()).await {
        Ok(owners) => Json(serde_json::json!({ "owners": owners })).into_response(),
        Err(e) => errors::service_error(e),
    }
}

/// POST /admin/owners/:id/approve
pub async fn approve_owner(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(body): Json<dto::ApproveOwnerRequest>,
) -> axum::response::Response {
    let user_id: UserId = match dto::parse_id(&id, "user") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .onboarding
        .approve_owner(identity.user(), user_id, &body.organization_name)
        .await
    {
        Ok(organization) => (StatusCode::CREATED, Json(organization)).into_response(),
        Err(e) => errors::service_error(e),
    }
}

/// POST /admin/owners/:id/reject
pub async fn reject_owner(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    body: Option<Json<dto::RejectOwnerRequest>>,
) -> axum::response::Response {
    let user_id: UserId = match dto::parse_id(&id, "user") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let reason = body.and_then(|Json(body)| body.reason);

    match services
        .onboarding
        .reject_owner(identity.user(), user_id, reason)
        .await
    {
        Ok(user) => Json(user).into_response(),
        Err(e) => errors::service_error(e),
    }
}
