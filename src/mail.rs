//! Send reset emails to users.
//!
//! Actual delivery is a deployment concern; the engine only drives the
//! capability. The default implementation logs and succeeds so a deployment
//! without mail keeps working.

use async_trait::async_trait;

use crate::error::Result;

/// Capability to deliver a password reset email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset_email(&self, username: &str, token: &str) -> Result<()>;
}

/// No-op mailer used when no real sender is wired in.
#[derive(Debug, Default)]
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_reset_email(&self, username: &str, _token: &str) -> Result<()> {
        tracing::info!(%username, "reset email requested but no mailer configured");
        Ok(())
    }
}
