//! Error handler for keyrack.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Enum representing engine-side errors.
///
/// Authentication mismatches (`InvalidCredentials`, `InvalidPassword`,
/// `InvalidCode`, `InvalidRecoveryKey`) all carry a single generic message so
/// callers cannot distinguish which check failed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("username and password required")]
    InvalidInput,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid password")]
    InvalidPassword,

    #[error("invalid code")]
    InvalidCode,

    #[error("invalid recovery key")]
    InvalidRecoveryKey,

    #[error("not found")]
    NotFound,

    #[error("user already exists")]
    AlreadyExists,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("code expired")]
    CodeExpired,

    #[error("code already used")]
    CodeUsed,

    #[error("no user with that phone")]
    NoSuchPhone,

    #[error("unauthorized")]
    Unauthorized,

    #[error("SMS not configured")]
    SmsNotConfigured,

    #[error("failed to send SMS")]
    SmsSendFailed,

    /// Returned by [`crate::mail::Mailer`] implementations when delivery
    /// fails; reset requests propagate it to the caller.
    #[error("mail delivery failed: {0}")]
    Mail(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("metadata encode failed: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("metadata decode failed: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("argon2 error: {0}")]
    Crypto(String),

    #[error("totp error: {0}")]
    Totp(String),
}
