use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::context::Identity;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(identity): Extension<Identity>) -> impl IntoResponse {
    let user = identity.user();
    Json(serde_json::json!({
        "id": user.id,
        "email": user.email,
        "display_name": user.display_name,
        "global_role": user.global_role,
        "status": user.status,
    }))
}
