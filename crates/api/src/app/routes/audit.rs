use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    response::IntoResponse,
};

use atelier_infra::services::Services;

use crate::app::{dto, errors};
use crate::context::Identity;

/// GET /audit - newest first, scoped to the resolved organization
pub async fn list(
    Extension(services): Extension<Arc<Services>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<dto::AuditQuery>,
) -> axum::response::Response {
    match services
        .audit_trail(identity.user(), query.organization_id, query.limit)
        .await
    {
        Ok(entries) => Json(serde_json::json!({ "entries": entries })).into_response(),
        Err(e) => errors::service_error(e),
    }
}
