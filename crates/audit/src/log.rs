use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use crate::entry::{AuditEntry, AuditFilter};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage error: {0}")]
    Storage(String),
}

/// Append-only audit persistence.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Entries matching `filter`, newest first, at most `filter.effective_limit()`.
    async fn list(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, AuditError>;
}

/// In-memory audit log (dev/tests).
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AuditError::Storage("audit log lock poisoned".to_string()))?;
        entries.push(entry);
        Ok(())
    }

    async fn list(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AuditError::Storage("audit log lock poisoned".to_string()))?;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(filter.effective_limit() as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use atelier_core::{OrganizationId, UserId};

    use super::*;
    use crate::entry::AuditAction;

    #[tokio::test]
    async fn list_is_newest_first_and_filtered() {
        let log = InMemoryAuditLog::new();
        let actor = UserId::new();
        let org = OrganizationId::new();
        let now = Utc::now();

        for (i, action) in [
            AuditAction::InvitationCreate,
            AuditAction::InvitationResend,
            AuditAction::InvitationAccept,
        ]
        .into_iter()
        .enumerate()
        {
            let entry = AuditEntry::builder(actor, action)
                .resource_type("invitation")
                .organization(org)
                .build(now + Duration::seconds(i as i64));
            log.append(entry).await.unwrap();
        }
        log.append(
            AuditEntry::builder(actor, AuditAction::OwnerApprove)
                .resource_type("user")
                .build(now),
        )
        .await
        .unwrap();

        let scoped = log.list(AuditFilter::new().organization(org)).await.unwrap();
        let actions: Vec<_> = scoped.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::InvitationAccept,
                AuditAction::InvitationResend,
                AuditAction::InvitationCreate,
            ]
        );

        let limited = log.list(AuditFilter::new().limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].action, AuditAction::OwnerApprove);
    }
}
