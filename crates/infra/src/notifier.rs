//! Outbound notifications (email delivery lives outside this workspace).
//!
//! Delivery is fire-and-forget: [`dispatch`] bounds every call by a deadline
//! and only logs failures, so no state transition ever depends on it.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use atelier_auth::MembershipRole;

/// Accept link carrying a bearer token. `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AcceptUrl(String);

impl AcceptUrl {
    pub fn new(url: String) -> Self {
        Self(url)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AcceptUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AcceptUrl(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Invitation {
        to: String,
        inviter_name: String,
        organization_name: String,
        role: MembershipRole,
        accept_url: AcceptUrl,
    },
    OwnerApproved {
        to: String,
        display_name: String,
        organization_name: String,
    },
    OwnerRejected {
        to: String,
        display_name: String,
        reason: Option<String>,
    },
}

impl Notification {
    pub fn template(&self) -> &'static str {
        match self {
            Notification::Invitation { .. } => "invitation",
            Notification::OwnerApproved { .. } => "owner_approved",
            Notification::OwnerRejected { .. } => "owner_rejected",
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Notification::Invitation { to, .. }
            | Notification::OwnerApproved { to, .. }
            | Notification::OwnerRejected { to, .. } => to,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Send `notification`, bounded by `timeout`. Never fails.
pub async fn dispatch(notifier: &dyn Notifier, notification: Notification, timeout: Duration) {
    let template = notification.template();
    match tokio::time::timeout(timeout, notifier.send(&notification)).await {
        Ok(Ok(())) => tracing::debug!(template, "notification sent"),
        Ok(Err(err)) => tracing::warn!(template, error = %err, "notification failed"),
        Err(_) => tracing::warn!(template, timeout_ms = timeout.as_millis() as u64, "notification timed out"),
    }
}

/// Writes a log line per notification. Never logs the accept URL.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            template = notification.template(),
            recipient = notification.recipient(),
            "notification"
        );
        Ok(())
    }
}

/// Keeps every notification in an outbox (dev/tests).
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    outbox: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.outbox.lock() {
            Ok(outbox) => outbox.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Accept URL of the most recent invitation sent to `email`.
    pub fn last_accept_url(&self, email: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|n| match n {
            Notification::Invitation { to, accept_url, .. } if to.eq_ignore_ascii_case(email) => {
                Some(accept_url.expose().to_string())
            }
            _ => None,
        })
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.outbox
            .lock()
            .map_err(|_| NotifyError::Delivery("outbox lock poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}
