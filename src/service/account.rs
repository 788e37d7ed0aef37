//! Account lifecycle orchestration.
//!
//! Drives the ephemeral and durable stores, the credential file, and the
//! outbound collaborators (mail, SMS, restart notification, webhook
//! fan-out). Fan-out is always detached from the triggering request; its
//! failures are logged, never returned.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::Configuration;
use crate::crypto::{self, PasswordManager};
use crate::error::{EngineError, Result};
use crate::mail::Mailer;
use crate::notify::RestartNotifier;
use crate::provider::sms::SmsSender;
use crate::provider::webhook::PasswordTargets;
use crate::store::{EphemeralStore, MetaStore, UserFile, UserRecord};
use crate::totp::{self, TotpSetup};

/// SMS reset codes live for ten minutes.
const SMS_CODE_TTL: i64 = 600;
const SMS_CODE_DIGITS: usize = 6;

/// Result of a signup request.
#[derive(Debug, PartialEq, Eq)]
pub enum SignupOutcome {
    /// The user exists and can log in.
    Approved,
    /// The signup waits for approval under this pending id.
    Pending(String),
}

/// Non-secret account summary.
#[derive(Debug, PartialEq, Eq)]
pub struct Profile {
    pub username: String,
    pub totp_enabled: bool,
    pub phone: String,
}

/// Orchestrates account state transitions.
#[derive(Clone)]
pub struct AccountService {
    config: Arc<Configuration>,
    store: Arc<EphemeralStore>,
    meta: Arc<MetaStore>,
    users: Arc<UserFile>,
    pwd: Arc<PasswordManager>,
    mailer: Arc<dyn Mailer>,
    notifier: Arc<dyn RestartNotifier>,
    targets: Option<Arc<PasswordTargets>>,
    sms: Option<Arc<dyn SmsSender>>,
}

impl AccountService {
    /// Create a new [`AccountService`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Configuration>,
        store: Arc<EphemeralStore>,
        meta: Arc<MetaStore>,
        users: Arc<UserFile>,
        pwd: Arc<PasswordManager>,
        mailer: Arc<dyn Mailer>,
        notifier: Arc<dyn RestartNotifier>,
        targets: Option<Arc<PasswordTargets>>,
        sms: Option<Arc<dyn SmsSender>>,
    ) -> Self {
        Self {
            config,
            store,
            meta,
            users,
            pwd,
            mailer,
            notifier,
            targets,
            sms,
        }
    }

    // ---------- Password reset (email) ----------

    /// Issue a reset token and hand it to the mailer.
    ///
    /// An unknown username returns Ok with nothing stored and nothing sent,
    /// indistinguishable from a genuine request.
    pub async fn request_password_reset(&self, username: &str) -> Result<()> {
        let Some(user) = self.users.find(username) else {
            return Ok(());
        };

        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now().timestamp() + self.config.reset_token_ttl;
        self.store.create_reset_token(&token, &user.username, expires_at);

        self.mailer.send_reset_email(&user.username, &token).await
    }

    /// Confirm a reset token and set the new password.
    ///
    /// The token is single-use: `used` is checked before any mutation and
    /// set right after the password update.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<()> {
        let Some((username, expires_at, used)) =
            self.store.get_reset_token(token)
        else {
            return Err(EngineError::InvalidToken);
        };
        if used || Utc::now().timestamp() > expires_at {
            return Err(EngineError::TokenExpired);
        }

        let hash = self.update_password(&username, new_password)?;
        self.store.mark_reset_token_used(token);

        self.notifier.restart_auth_proxy().await;
        self.sync_password_targets(&username, new_password, &hash);
        Ok(())
    }

    // ---------- Signup ----------

    /// Register a new account.
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<SignupOutcome> {
        self.signup_with_phone(username, email, password, "").await
    }

    /// Register a new account, optionally stashing a phone number.
    pub async fn signup_with_phone(
        &self,
        username: &str,
        email: &str,
        password: &str,
        phone: &str,
    ) -> Result<SignupOutcome> {
        if username.is_empty() || password.is_empty() {
            return Err(EngineError::InvalidInput);
        }
        if self.users.find(username).is_some() {
            return Err(EngineError::AlreadyExists);
        }

        let hash = self.pwd.hash_password(password)?;

        if self.config.signup_require_approval {
            let id = Uuid::new_v4().to_string();
            self.store.create_pending_signup(
                &id,
                username,
                email,
                &hash,
                Utc::now().timestamp(),
            );
            if !phone.is_empty() {
                self.meta.set_phone(username, phone)?;
            }

            tracing::info!(%username, "signup pending approval");
            return Ok(SignupOutcome::Pending(id));
        }

        self.users.upsert(UserRecord {
            username: username.to_owned(),
            password_hash: hash.clone(),
            totp_secret: String::new(),
        })?;
        if !phone.is_empty() {
            self.meta.set_phone(username, phone)?;
        }

        tracing::info!(%username, "user created");
        self.notifier.restart_auth_proxy().await;
        self.sync_password_targets(username, password, &hash);
        Ok(SignupOutcome::Approved)
    }

    /// Materialize a pending signup into a user.
    ///
    /// Pending records are kept after approval, so approving twice simply
    /// rewrites the same user and re-notifies.
    pub async fn approve_signup(&self, id: &str) -> Result<()> {
        let (username, password_hash) = self.store.get_pending_signup(id)?;

        self.users.upsert(UserRecord {
            username: username.clone(),
            password_hash,
            totp_secret: String::new(),
        })?;
        self.store.approve_pending_signup(id);

        tracing::info!(%username, "signup approved");
        self.notifier.restart_auth_proxy().await;
        Ok(())
    }

    // ---------- Profile ----------

    /// Account summary for an existing user.
    pub fn profile(&self, username: &str) -> Result<Profile> {
        let Some(user) = self.users.find(username) else {
            return Err(EngineError::NotFound);
        };

        Ok(Profile {
            totp_enabled: !user.totp_secret.trim().is_empty(),
            phone: self.meta.get_phone(username),
            username: user.username,
        })
    }

    /// Upsert the phone number in the durable metadata store.
    pub fn set_phone(&self, username: &str, phone: &str) -> Result<()> {
        self.meta.set_phone(username, phone)
    }

    // ---------- Password change ----------

    /// Change a password after re-verifying the old one.
    pub async fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let Some(user) = self.users.find(username) else {
            return Err(EngineError::NotFound);
        };
        if !self.pwd.verify_password(old_password, &user.password_hash) {
            return Err(EngineError::InvalidCredentials);
        }

        let hash = self.update_password(username, new_password)?;
        self.notifier.restart_auth_proxy().await;
        self.sync_password_targets(username, new_password, &hash);
        Ok(())
    }

    // ---------- TOTP ----------

    /// Generate second-factor material for the user to scan. Nothing is
    /// persisted until [`Self::totp_enable`] confirms the secret.
    pub fn totp_setup(&self, username: &str) -> Result<TotpSetup> {
        totp::generate(&self.config.totp_issuer, username)
    }

    /// Validate the submitted code against the submitted secret, then
    /// persist the secret.
    pub async fn totp_enable(
        &self,
        username: &str,
        secret: &str,
        code: &str,
    ) -> Result<()> {
        if !totp::verify(secret, code).unwrap_or(false) {
            return Err(EngineError::InvalidCode);
        }

        let Some(mut user) = self.users.find(username) else {
            return Err(EngineError::NotFound);
        };
        user.totp_secret = secret.trim().to_owned();
        self.users.upsert(user)?;

        tracing::info!(%username, "totp enabled");
        self.notifier.restart_auth_proxy().await;
        Ok(())
    }

    /// Clear the second factor after re-verifying the password.
    pub async fn totp_disable(
        &self,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let Some(mut user) = self.users.find(username) else {
            return Err(EngineError::NotFound);
        };
        if !self.pwd.verify_password(password, &user.password_hash) {
            return Err(EngineError::InvalidPassword);
        }

        user.totp_secret = String::new();
        self.users.upsert(user)?;

        tracing::info!(%username, "totp disabled");
        self.notifier.restart_auth_proxy().await;
        Ok(())
    }

    /// Re-enroll a second factor with a recovery key.
    ///
    /// The accepted key is the fixed `RECOVERY-<username>` derivation the
    /// fronting proxy's tooling hands out. Being computable from a public
    /// identifier, it is a known weakness of that scheme; the behavior is
    /// kept as-is for compatibility.
    pub async fn totp_recover(
        &self,
        username: &str,
        recovery_key: &str,
        new_secret: &str,
        code: &str,
    ) -> Result<()> {
        if recovery_key != format!("RECOVERY-{username}") {
            return Err(EngineError::InvalidRecoveryKey);
        }
        self.totp_enable(username, new_secret, code).await
    }

    // ---------- SMS reset ----------

    /// Whether an SMS sender is wired in.
    pub fn sms_enabled(&self) -> bool {
        self.sms.is_some()
    }

    /// Issue an SMS reset code for the user owning `phone`.
    ///
    /// An unknown phone returns Ok with nothing stored and nothing sent.
    /// Send failures surface as a generic `SmsSendFailed`; the cause only
    /// reaches the log.
    pub async fn request_sms_reset(&self, phone: &str) -> Result<()> {
        let Some(sms) = &self.sms else {
            return Err(EngineError::SmsNotConfigured);
        };

        let username = self.meta.find_user_by_phone(phone);
        if username.is_empty() {
            return Ok(());
        }

        let code = crypto::numeric_code(SMS_CODE_DIGITS);
        let id = Uuid::new_v4().to_string();
        let expires_at = Utc::now().timestamp() + SMS_CODE_TTL;
        self.store.store_sms_reset_code(&id, &username, &code, expires_at);

        let message = format!(
            "Your password reset code is: {code} (valid for 10 minutes)"
        );
        if let Err(err) = sms.send_sms(phone, &message).await {
            tracing::error!(error = %err, "failed to send SMS reset code");
            return Err(EngineError::SmsSendFailed);
        }

        Ok(())
    }

    /// Verify and consume an SMS code, then set the new password.
    pub async fn reset_password_sms(
        &self,
        phone: &str,
        code: &str,
        new_password: &str,
    ) -> Result<()> {
        let username = self.meta.find_user_by_phone(phone);
        if username.is_empty() {
            return Err(EngineError::NoSuchPhone);
        }
        self.store.verify_and_consume_sms_code(
            &username,
            code,
            Utc::now().timestamp(),
        )?;

        let hash = self.update_password(&username, new_password)?;
        self.notifier.restart_auth_proxy().await;
        self.sync_password_targets(&username, new_password, &hash);
        Ok(())
    }

    // ---------- Helpers ----------

    /// Hash and store a new password, preserving the TOTP secret.
    fn update_password(
        &self,
        username: &str,
        new_password: &str,
    ) -> Result<String> {
        let Some(mut user) = self.users.find(username) else {
            return Err(EngineError::NotFound);
        };

        let hash = self.pwd.hash_password(new_password)?;
        user.password_hash = hash.clone();
        self.users.upsert(user)?;
        Ok(hash)
    }

    /// Detach the webhook fan-out from the request path. The provider logs
    /// per-target failures itself; nothing is surfaced to the caller.
    fn sync_password_targets(
        &self,
        username: &str,
        plain_password: &str,
        hashed_password: &str,
    ) {
        let Some(targets) = &self.targets else {
            return;
        };

        let targets = Arc::clone(targets);
        let username = username.to_owned();
        let plain = plain_password.to_owned();
        let hashed = hashed_password.to_owned();
        tokio::spawn(async move {
            targets.sync_password(&username, &plain, &hashed).await;
        });
    }
}
