//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage backend selection and service assembly
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and parsing helpers
//! - `errors.rs`: service failures mapped to consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use atelier_infra::services::Services;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the tests).
pub fn build_app(services: Services) -> Router {
    let identity = services.identity.clone();

    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        identity.clone(),
        middleware::require_identity,
    ));

    let optional = routes::optional_identity_router().layer(axum::middleware::from_fn_with_state(
        identity,
        middleware::optional_identity,
    ));

    Router::new()
        .merge(routes::public_router())
        .merge(optional)
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(Arc::new(services))))
}
