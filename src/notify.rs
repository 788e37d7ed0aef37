//! Restart notification for the fronting auth proxy.
//!
//! The proxy re-reads its credential file on restart, so every credential
//! mutation asks for one. Fire-and-forget: no return value is consumed.

use async_trait::async_trait;

/// Capability to ask the auth proxy to restart.
#[async_trait]
pub trait RestartNotifier: Send + Sync {
    async fn restart_auth_proxy(&self);
}

/// No-op notifier used when no real integration is wired in.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl RestartNotifier for NoopNotifier {
    async fn restart_auth_proxy(&self) {
        tracing::debug!("auth proxy restart requested, no notifier configured");
    }
}
