//! `atelier-audit`: append-only trail of sensitive state transitions.

pub mod entry;
pub mod log;
pub mod recorder;

pub use entry::{AuditAction, AuditEntry, AuditEntryBuilder, AuditFilter};
pub use log::{AuditError, AuditLog, InMemoryAuditLog};
pub use recorder::AuditRecorder;
