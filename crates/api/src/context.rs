use atelier_auth::User;

/// Authenticated identity for a request.
///
/// Present on every protected route; carries no organization scope, which is
/// re-derived per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user: User,
}

impl Identity {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn user(&self) -> &User {
        &self.user
    }
}

/// Identity on routes where "nobody" is a meaningful answer (invitation accept).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalIdentity {
    user: Option<User>,
}

impl OptionalIdentity {
    pub fn new(user: Option<User>) -> Self {
        Self { user }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }
}
