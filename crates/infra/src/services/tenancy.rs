//! Tenancy Resolver service and the authorization choke point.
//!
//! Every organization-scoped operation goes through [`TenancyService::authorize`]
//! and scopes its queries with the returned `organization.id` only.

use std::sync::Arc;

use tracing::instrument;

use atelier_auth::{Permission, ResolvedTenancy, TenancyFacts, User, tenancy};
use atelier_core::OrganizationId;

use crate::store::DirectoryStore;

use super::error::ServiceResult;

#[derive(Clone)]
pub struct TenancyService {
    directory: Arc<dyn DirectoryStore>,
}

impl TenancyService {
    pub fn new(directory: Arc<dyn DirectoryStore>) -> Self {
        Self { directory }
    }

    /// Gather the user's tenancy facts and resolve the request scope.
    #[instrument(skip(self, user), fields(user_id = %user.id, requested = ?requested))]
    pub async fn resolve_organization(
        &self,
        user: &User,
        requested: Option<OrganizationId>,
    ) -> ServiceResult<ResolvedTenancy> {
        let requested_organization = match requested {
            Some(id) => self.directory.find_organization(id).await?,
            None => None,
        };
        let owned_organization = match requested {
            Some(_) => None,
            None => self.directory.find_owned_organization(user.id).await?,
        };
        let memberships = self.directory.memberships_of(user.id).await?;

        let facts = TenancyFacts {
            requested_organization,
            owned_organization,
            memberships,
        };
        Ok(tenancy::resolve(user, requested, facts)?)
    }

    /// Tenancy Resolver, then Permission Evaluator.
    pub async fn authorize(
        &self,
        user: &User,
        requested: Option<OrganizationId>,
        permission: &Permission,
    ) -> ServiceResult<ResolvedTenancy> {
        let resolved = self.resolve_organization(user, requested).await?;
        resolved.check(user, permission)?;
        Ok(resolved)
    }
}

/// Platform-operator gate, checked before any tenant logic.
pub fn require_admin(user: &User) -> ServiceResult<()> {
    Ok(atelier_auth::require_admin(user)?)
}
