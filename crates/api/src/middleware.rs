use axum::{
    extract::State,
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use atelier_infra::services::{IdentityResolver, ServiceError};

use crate::app::errors;
use crate::context::{Identity, OptionalIdentity};

/// Reject the request unless the bearer token resolves to an active user.
pub async fn require_identity(
    State(identity): State<IdentityResolver>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(Some(token)) => token,
        Ok(None) | Err(()) => return errors::service_error(ServiceError::Unauthenticated),
    };

    let user = match identity.resolve_identity(token).await {
        Ok(user) => user,
        Err(err) => return errors::service_error(err),
    };

    req.extensions_mut().insert(Identity::new(user));
    next.run(req).await
}

/// Attach the identity if one was presented. A missing header is fine; a bad
/// one is still `401`.
pub async fn optional_identity(
    State(identity): State<IdentityResolver>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(()) => return errors::service_error(ServiceError::Unauthenticated),
    };

    let user = match identity.resolve_optional(token).await {
        Ok(user) => user,
        Err(err) => return errors::service_error(err),
    };

    req.extensions_mut().insert(OptionalIdentity::new(user));
    next.run(req).await
}

/// `Ok(None)` when there is no `Authorization` header at all.
fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, ()> {
    let Some(header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header.to_str().map_err(|_| ())?;
    let token = header.strip_prefix("Bearer ").ok_or(())?.trim();
    if token.is_empty() {
        return Err(());
    }

    Ok(Some(token))
}
