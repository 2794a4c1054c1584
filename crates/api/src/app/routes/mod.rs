use axum::{
    Router,
    routing::{get, post, put},
};

pub mod accounts;
pub mod admin;
pub mod audit;
pub mod invitations;
pub mod members;
pub mod organization;
pub mod system;

/// Routes that need no identity at all.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/register", post(accounts::register))
        .route("/invitations/validate", get(invitations::validate))
}

/// Routes that take an identity if one is presented.
pub fn optional_identity_router() -> Router {
    Router::new().route("/invitations/accept", post(invitations::accept))
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/me", get(system::whoami))
        .route("/invitations", get(invitations::list).post(invitations::create))
        .route("/invitations/:id/resend", post(invitations::resend))
        .route("/organization", get(organization::current))
        .route("/authz/check", get(organization::check))
        .route("/permissions", get(organization::permissions))
        .route("/members", get(members::list))
        .route("/members/:id", put(members::update).delete(members::remove))
        .route("/audit", get(audit::list))
        .nest("/admin", admin::router())
}
