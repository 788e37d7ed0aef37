//! Ephemeral state tables.
//!
//! Four independent key-value tables (sessions, reset tokens, pending
//! signups, SMS reset codes), each behind its own lock so operations on one
//! never block operations on another. Expiry is always checked against a
//! caller-supplied clock at read time; nothing here runs a background sweep.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
struct SessionEntry {
    username: String,
    #[allow(dead_code)]
    created_at: i64,
    expires_at: i64,
}

#[derive(Debug, Clone)]
struct ResetTokenEntry {
    username: String,
    expires_at: i64,
    used: bool,
}

#[derive(Debug, Clone)]
struct PendingSignup {
    username: String,
    email: String,
    password_hash: String,
    created_at: i64,
    approved: bool,
}

#[derive(Debug, Clone)]
struct SmsResetCode {
    username: String,
    code: String,
    expires_at: i64,
    used: bool,
}

/// Concurrent in-memory store for all ephemeral records.
///
/// No lock is held across anything slower than a single map mutation.
#[derive(Debug, Default)]
pub struct EphemeralStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    reset_tokens: Mutex<HashMap<String, ResetTokenEntry>>,
    signups: Mutex<HashMap<String, PendingSignup>>,
    sms_codes: Mutex<HashMap<String, SmsResetCode>>,
}

impl EphemeralStore {
    /// Create a new, empty [`EphemeralStore`].
    pub fn new() -> Self {
        Self::default()
    }

    // ---------- Sessions ----------

    /// Store a new session token. Last write wins on key collision, which
    /// must not occur given token randomness.
    pub fn create_session(
        &self,
        token: &str,
        username: &str,
        created_at: i64,
        expires_at: i64,
    ) {
        self.sessions.lock().expect("sessions lock poisoned").insert(
            token.to_owned(),
            SessionEntry {
                username: username.to_owned(),
                created_at,
                expires_at,
            },
        );
    }

    /// Pure lookup: returns `(username, expires_at)`. Expiry enforcement is
    /// the caller's responsibility.
    pub fn get_session(&self, token: &str) -> Option<(String, i64)> {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .get(token)
            .map(|entry| (entry.username.clone(), entry.expires_at))
    }

    /// Idempotent removal.
    pub fn delete_session(&self, token: &str) {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .remove(token);
    }

    // ---------- Reset tokens ----------

    /// Store a new password reset token.
    pub fn create_reset_token(
        &self,
        token: &str,
        username: &str,
        expires_at: i64,
    ) {
        self.reset_tokens
            .lock()
            .expect("reset tokens lock poisoned")
            .insert(
                token.to_owned(),
                ResetTokenEntry {
                    username: username.to_owned(),
                    expires_at,
                    used: false,
                },
            );
    }

    /// Returns `(username, expires_at, used)`.
    pub fn get_reset_token(&self, token: &str) -> Option<(String, i64, bool)> {
        self.reset_tokens
            .lock()
            .expect("reset tokens lock poisoned")
            .get(token)
            .map(|entry| (entry.username.clone(), entry.expires_at, entry.used))
    }

    /// Mark a reset token as used. No-op when the token is absent.
    pub fn mark_reset_token_used(&self, token: &str) {
        if let Some(entry) = self
            .reset_tokens
            .lock()
            .expect("reset tokens lock poisoned")
            .get_mut(token)
        {
            entry.used = true;
        }
    }

    // ---------- Pending signups ----------

    /// Store a new pending signup.
    pub fn create_pending_signup(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
        created_at: i64,
    ) {
        self.signups.lock().expect("signups lock poisoned").insert(
            id.to_owned(),
            PendingSignup {
                username: username.to_owned(),
                email: email.to_owned(),
                password_hash: password_hash.to_owned(),
                created_at,
                approved: false,
            },
        );
    }

    /// Returns `(username, password_hash)` for a pending signup.
    pub fn get_pending_signup(&self, id: &str) -> Result<(String, String)> {
        self.signups
            .lock()
            .expect("signups lock poisoned")
            .get(id)
            .map(|entry| (entry.username.clone(), entry.password_hash.clone()))
            .ok_or(EngineError::NotFound)
    }

    /// Mark a pending signup as approved. The record is kept as an audit
    /// trace; repeated approval is a no-op here.
    pub fn approve_pending_signup(&self, id: &str) {
        if let Some(entry) = self
            .signups
            .lock()
            .expect("signups lock poisoned")
            .get_mut(id)
        {
            entry.approved = true;
        }
    }

    /// Email recorded with a pending signup, if any.
    pub fn pending_signup_email(&self, id: &str) -> Option<String> {
        self.signups
            .lock()
            .expect("signups lock poisoned")
            .get(id)
            .map(|entry| entry.email.clone())
    }

    // ---------- SMS reset codes ----------

    /// Store a reset code for SMS-based password reset. Multiple live codes
    /// per user are allowed.
    pub fn store_sms_reset_code(
        &self,
        id: &str,
        username: &str,
        code: &str,
        expires_at: i64,
    ) {
        self.sms_codes.lock().expect("sms codes lock poisoned").insert(
            id.to_owned(),
            SmsResetCode {
                username: username.to_owned(),
                code: code.to_owned(),
                expires_at,
                used: false,
            },
        );
    }

    /// Verify a code for the given user and consume it.
    ///
    /// Among all stored codes for `username` matching `code`, the one with
    /// the latest expiry (a proxy for most recently issued) is selected;
    /// equal expiries are broken by smallest id so the pick is deterministic.
    /// Exactly the selected record is marked used on success.
    pub fn verify_and_consume_sms_code(
        &self,
        username: &str,
        code: &str,
        now: i64,
    ) -> Result<()> {
        let mut codes = self.sms_codes.lock().expect("sms codes lock poisoned");

        let mut best: Option<(String, i64)> = None;
        for (id, entry) in codes.iter() {
            if entry.username != username || entry.code != code {
                continue;
            }
            let better = match &best {
                None => true,
                Some((best_id, best_expiry)) => {
                    entry.expires_at > *best_expiry
                        || (entry.expires_at == *best_expiry
                            && id < best_id)
                },
            };
            if better {
                best = Some((id.clone(), entry.expires_at));
            }
        }

        let Some((id, _)) = best else {
            return Err(EngineError::InvalidCode);
        };
        let Some(entry) = codes.get_mut(&id) else {
            return Err(EngineError::InvalidCode);
        };

        if entry.used {
            return Err(EngineError::CodeUsed);
        }
        if now > entry.expires_at {
            return Err(EngineError::CodeExpired);
        }

        entry.used = true;
        Ok(())
    }

    /// Expiry of the newest code stored for a user, if any. Test hook and
    /// housekeeping helper.
    pub fn latest_sms_code_expiry(&self, username: &str) -> Option<i64> {
        self.sms_codes
            .lock()
            .expect("sms codes lock poisoned")
            .values()
            .filter(|entry| entry.username == username)
            .map(|entry| entry.expires_at)
            .max()
    }
}
