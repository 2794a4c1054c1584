//! `atelier-auth`: pure organization-scoped authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: identity,
//! tenancy facts and grants come in as values, decisions go out as values.

pub mod authorize;
pub mod catalog;
pub mod claims;
pub mod identity;
pub mod organization;
pub mod permissions;
pub mod roles;
pub mod tenancy;

pub use authorize::{
    AdminRequired, AllowReason, AuthzError, Decision, DenyReason, check_permission, evaluate,
    require_admin,
};
pub use claims::{SessionClaims, TokenValidationError, validate_claims};
pub use identity::{ApprovalStatus, GlobalRole, IdentityError, User, normalize_email};
pub use organization::{Membership, Organization, slugify};
pub use permissions::{Permission, PermissionError, PermissionSet};
pub use roles::MembershipRole;
pub use tenancy::{Access, ResolvedTenancy, TenancyError, TenancyFacts};
