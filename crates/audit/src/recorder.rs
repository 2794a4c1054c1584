use std::sync::Arc;

use crate::entry::AuditEntry;
use crate::log::AuditLog;

/// Best-effort audit writer.
///
/// A failed append never fails the business operation that triggered it; the
/// failure is reported on the `telemetry` target instead.
#[derive(Clone)]
pub struct AuditRecorder {
    log: Arc<dyn AuditLog>,
}

impl AuditRecorder {
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &Arc<dyn AuditLog> {
        &self.log
    }

    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action;
        let resource_type = entry.resource_type.clone();
        if let Err(err) = self.log.append(entry).await {
            tracing::error!(
                target: "telemetry",
                action = %action,
                resource_type = %resource_type,
                error = %err,
                "audit append failed"
            );
        }
    }
}
