//! `atelier-invitations`: invitation entity and its state machine.
//!
//! Pure decision logic only: storage, notification and auditing are wired in
//! by the infra service layer.

pub mod invitation;
pub mod token;

pub use invitation::{
    AcceptMode, InvalidReason, Invitation, InvitationError, InvitationPolicy, InvitationStatus,
    InvitationSummary, Validity, promoted_role, validate,
};
pub use token::{InvitationToken, fingerprint};
