use axum::http::{HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use serde_json::json;

use atelier_infra::services::ServiceError;

/// Map a service failure to its HTTP shape.
///
/// Every denial branch produces the identical `forbidden` body; internal
/// failures carry no detail.
pub fn service_error(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Unauthenticated => {
            json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required")
        }
        ServiceError::AuthenticationRequired => json_error(
            StatusCode::UNAUTHORIZED,
            "authentication_required",
            "sign in or register to accept this invitation",
        ),
        ServiceError::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
        ServiceError::NoOrganizationContext => json_error(
            StatusCode::FORBIDDEN,
            "no_organization",
            "you are not part of an organization yet; ask your team for an invitation",
        ),
        ServiceError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        ServiceError::AlreadyMember => json_error(StatusCode::CONFLICT, "already_member", err.to_string()),
        ServiceError::DuplicatePendingInvitation => {
            json_error(StatusCode::CONFLICT, "duplicate_pending_invitation", err.to_string())
        }
        ServiceError::InvalidState => json_error(StatusCode::CONFLICT, "invalid_state", err.to_string()),
        ServiceError::InvalidOrExpired => json_error(StatusCode::GONE, "invalid_or_expired", err.to_string()),
        ServiceError::TooSoon { retry_after_secs } => too_soon(retry_after_secs),
        ServiceError::SelfInvitation => json_error(StatusCode::BAD_REQUEST, "self_invitation", err.to_string()),
        ServiceError::EmailMismatch => json_error(StatusCode::FORBIDDEN, "email_mismatch", err.to_string()),
        ServiceError::SelfModification => {
            json_error(StatusCode::FORBIDDEN, "self_modification", err.to_string())
        }
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ServiceError::Internal => json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal error"),
    }
}

fn too_soon(retry_after_secs: i64) -> axum::response::Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        axum::Json(json!({
            "error": "too_soon",
            "message": "invitation was sent too recently",
            "retry_after_secs": retry_after_secs,
        })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
