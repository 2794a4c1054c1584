//! Application services: the operations the API exposes, composed from the
//! pure crates and the storage/notifier adapters.

pub mod error;
pub mod identity;
pub mod invitations;
pub mod members;
pub mod onboarding;
pub mod tenancy;

use std::sync::Arc;
use std::time::Duration;

use atelier_audit::{AuditEntry, AuditFilter, AuditLog, AuditRecorder};
use atelier_auth::{User, catalog};
use atelier_core::{Clock, OrganizationId};
use atelier_invitations::InvitationPolicy;

use crate::notifier::Notifier;
use crate::session::SessionService;
use crate::store::{DirectoryStore, InvitationStore};

pub use error::{ServiceError, ServiceResult};
pub use identity::IdentityResolver;
pub use invitations::{AcceptedInvitation, InvitationService};
pub use members::{MemberService, MemberView};
pub use onboarding::OnboardingService;
pub use tenancy::{TenancyService, require_admin};

/// Collaborators shared by every service.
#[derive(Clone)]
pub struct ServiceDeps {
    pub directory: Arc<dyn DirectoryStore>,
    pub invitations: Arc<dyn InvitationStore>,
    pub audit_log: Arc<dyn AuditLog>,
    pub sessions: Arc<dyn SessionService>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub policy: InvitationPolicy,
    /// Base of `{base}/accept-invitation?token=…`.
    pub public_base_url: String,
    pub notifier_timeout: Duration,
}

/// Every service, wired once at startup.
#[derive(Clone)]
pub struct Services {
    pub identity: IdentityResolver,
    pub tenancy: TenancyService,
    pub invitations: InvitationService,
    pub members: MemberService,
    pub onboarding: OnboardingService,
    pub audit: AuditRecorder,
}

impl Services {
    pub fn new(deps: ServiceDeps) -> Self {
        let audit = AuditRecorder::new(deps.audit_log.clone());
        let tenancy = TenancyService::new(deps.directory.clone());
        Self {
            identity: IdentityResolver::new(deps.sessions.clone(), deps.directory.clone(), deps.clock.clone()),
            invitations: InvitationService::new(&deps, tenancy.clone(), audit.clone()),
            members: MemberService::new(&deps, tenancy.clone(), audit.clone()),
            onboarding: OnboardingService::new(&deps, audit.clone()),
            tenancy,
            audit,
        }
    }
}

impl Services {
    /// Audit trail of the actor's resolved organization, newest first.
    pub async fn audit_trail(
        &self,
        actor: &User,
        requested: Option<OrganizationId>,
        limit: Option<u32>,
    ) -> ServiceResult<Vec<AuditEntry>> {
        let scope = self
            .tenancy
            .authorize(actor, requested, &catalog::WORKERS_MANAGE)
            .await?;
        let mut filter = AuditFilter::new().organization(scope.organization_id());
        if let Some(limit) = limit {
            filter = filter.limit(limit);
        }
        self.audit.log().list(filter).await.map_err(|err| {
            tracing::error!(target: "telemetry", error = %err, "audit read failed");
            ServiceError::Internal
        })
    }
}
