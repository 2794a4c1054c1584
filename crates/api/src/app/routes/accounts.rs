//! Self-registration. Session issuance lives with the external session service.

use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use atelier_infra::services::Services;

use crate::app::{dto, errors};

/// POST /register
pub async fn register(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<dto::RegisterRequest>,
) -> axum::response::Response {
    let role = match dto::parse_registration_role(body.role.as_deref()) {
        Ok(role) => role,
        Err(resp) => return resp,
    };

    match services
        .onboarding
        .register(&body.email, &body.display_name, role)
        .await
    {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => errors::service_error(e),
    }
}
