//! Explicit session context.
//!
//! Every call that reaches the remote store takes the caller's [`Session`].
//! There is no ambient auth state: a token only travels where a session is
//! passed.

use bazaar_core::UserId;
use secrecy::SecretString;

/// Authenticated identity and bearer token.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct Credentials {
    user_id: UserId,
    token: SecretString,
}

impl Credentials {
    #[must_use]
    pub const fn new(user_id: UserId, token: SecretString) -> Self {
        Self { user_id, token }
    }

    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// A browsing session, authenticated or not.
#[derive(Debug, Clone, Default)]
pub struct Session {
    credentials: Option<Credentials>,
}

impl Session {
    /// A session with no logged-in user.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { credentials: None }
    }

    #[must_use]
    pub const fn authenticated(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    #[must_use]
    pub const fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.credentials.as_ref().map(Credentials::user_id)
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }
}
