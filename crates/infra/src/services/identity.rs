//! Identity Context Resolver: session token → authenticated [`User`].

use std::sync::Arc;

use atelier_auth::{IdentityError, User};
use atelier_core::Clock;

use crate::session::SessionService;
use crate::store::DirectoryStore;

use super::error::{ServiceError, ServiceResult};

#[derive(Clone)]
pub struct IdentityResolver {
    sessions: Arc<dyn SessionService>,
    directory: Arc<dyn DirectoryStore>,
    clock: Arc<dyn Clock>,
}

impl IdentityResolver {
    pub fn new(
        sessions: Arc<dyn SessionService>,
        directory: Arc<dyn DirectoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            directory,
            clock,
        }
    }

    /// Who is asking. Pure read.
    ///
    /// Unknown users and suspended/rejected accounts are `Unauthenticated`.
    pub async fn resolve_identity(&self, token: &str) -> ServiceResult<User> {
        let user_id = self
            .sessions
            .authenticate(token, self.clock.now())
            .ok_or(IdentityError::Unauthenticated)?;

        match self.directory.find_user(user_id).await? {
            Some(user) if user.status.may_authenticate() => Ok(user),
            Some(user) => {
                tracing::debug!(user_id = %user.id, status = %user.status, "account may not authenticate");
                Err(ServiceError::Unauthenticated)
            }
            None => Err(ServiceError::Unauthenticated),
        }
    }

    /// For routes that treat "no identity" differently from "bad identity".
    ///
    /// No token gives `Ok(None)`; a token that fails to resolve is still
    /// `Unauthenticated`.
    pub async fn resolve_optional(&self, token: Option<&str>) -> ServiceResult<Option<User>> {
        match token {
            None => Ok(None),
            Some(token) => self.resolve_identity(token).await.map(Some),
        }
    }
}
