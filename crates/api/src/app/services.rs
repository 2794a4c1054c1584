//! Service wiring: pick the storage backend from configuration and assemble
//! the application services once at startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use atelier_audit::{AuditLog, InMemoryAuditLog};
use atelier_core::SystemClock;
use atelier_infra::config::AppConfig;
use atelier_infra::notifier::LogNotifier;
use atelier_infra::services::{ServiceDeps, Services};
use atelier_infra::session::JwtSessionService;
use atelier_infra::store::{DirectoryStore, InMemoryStore, InvitationStore, PostgresAuditLog, PostgresStore};

/// How often overdue invitations are moved to `EXPIRED`.
const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

struct Storage {
    directory: Arc<dyn DirectoryStore>,
    invitations: Arc<dyn InvitationStore>,
    audit_log: Arc<dyn AuditLog>,
}

async fn build_storage(config: &AppConfig) -> anyhow::Result<Storage> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to run migrations")?;
            let audit_log = PostgresAuditLog::new(store.pool().clone());
            let store = Arc::new(store);
            tracing::info!("using postgres storage");
            Ok(Storage {
                directory: store.clone(),
                invitations: store,
                audit_log: Arc::new(audit_log),
            })
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory storage");
            let store = Arc::new(InMemoryStore::new());
            Ok(Storage {
                directory: store.clone(),
                invitations: store,
                audit_log: Arc::new(InMemoryAuditLog::new()),
            })
        }
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<Services> {
    let Storage {
        directory,
        invitations,
        audit_log,
    } = build_storage(config).await?;

    let services = Services::new(ServiceDeps {
        directory,
        invitations,
        audit_log,
        sessions: Arc::new(JwtSessionService::new(config.session_secret.as_bytes())),
        notifier: Arc::new(LogNotifier),
        clock: Arc::new(SystemClock),
        policy: config.invitation_policy,
        public_base_url: config.public_base_url.clone(),
        notifier_timeout: config.notifier_timeout,
    });

    if let Some(email) = &config.bootstrap_admin_email {
        let admin = services
            .onboarding
            .bootstrap_admin(email)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bootstrap admin: {e}"))?;
        tracing::info!(user_id = %admin.id, "admin account ready");
    }

    Ok(services)
}

/// Periodically expire overdue invitations. Runs until the runtime shuts down.
pub fn spawn_invitation_sweeper(services: Services) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = services.invitations.expire_overdue().await {
                tracing::warn!(error = %err, "invitation sweep failed");
            }
        }
    })
}
