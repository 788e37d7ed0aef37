//! Login, logout and session validation.
//!
//! Sessions move absent -> active -> (expired | revoked). Expiry is lazy:
//! checked at every read, never by a background sweeper.

use std::sync::Arc;

use chrono::Utc;

use crate::config::Configuration;
use crate::crypto::{self, PasswordManager};
use crate::error::{EngineError, Result};
use crate::store::{EphemeralStore, UserFile};

/// Credential verification and session issuance.
#[derive(Clone)]
pub struct AuthService {
    config: Arc<Configuration>,
    store: Arc<EphemeralStore>,
    users: Arc<UserFile>,
    pwd: Arc<PasswordManager>,
}

impl AuthService {
    /// Create a new [`AuthService`].
    pub fn new(
        config: Arc<Configuration>,
        store: Arc<EphemeralStore>,
        users: Arc<UserFile>,
        pwd: Arc<PasswordManager>,
    ) -> Self {
        Self {
            config,
            store,
            users,
            pwd,
        }
    }

    /// Verify credentials and issue a session token.
    ///
    /// An unknown username and a wrong password both fail with the same
    /// `InvalidCredentials`.
    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        let Some(user) = self.users.find(username) else {
            return Err(EngineError::InvalidCredentials);
        };
        if !self.pwd.verify_password(password, &user.password_hash) {
            return Err(EngineError::InvalidCredentials);
        }

        let token = crypto::session_token();
        let now = Utc::now().timestamp();
        self.store.create_session(
            &token,
            &user.username,
            now,
            now + self.config.session_ttl,
        );

        tracing::debug!(%username, "session issued");
        Ok(token)
    }

    /// Revoke a session. Idempotent, succeeds for unknown tokens.
    pub fn logout(&self, token: &str) {
        self.store.delete_session(token);
    }

    /// Resolve a session token to its username.
    ///
    /// An expired session is deleted on sight and reported exactly like a
    /// missing one.
    pub fn session_username(&self, token: &str) -> Result<String> {
        let Some((username, expires_at)) = self.store.get_session(token)
        else {
            return Err(EngineError::Unauthorized);
        };

        if Utc::now().timestamp() > expires_at {
            self.store.delete_session(token);
            return Err(EngineError::Unauthorized);
        }

        Ok(username)
    }
}
