//! `atelier-core`: identifiers, clock and error primitives shared by every crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use id::{AuditEntryId, InvitationId, MembershipId, OrganizationId, UserId};
