//! SMS delivery through a configurable webhook.

use async_trait::async_trait;

use crate::error::{EngineError, Result};
use crate::provider::template;
use crate::provider::webhook::{self, TargetConfig};

/// Capability to send an SMS message.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, message: &str) -> Result<()>;
}

/// [`SmsSender`] backed by a single webhook target, rendered with the
/// `{To, Message}` dataset merged under the target's own variables.
#[derive(Debug)]
pub struct WebhookSms {
    config: TargetConfig,
}

impl WebhookSms {
    /// Build the sender from an optional configuration record. `None` when
    /// SMS is not configured.
    pub fn from_config(config: Option<TargetConfig>) -> Option<Self> {
        let config = config?;
        if config.url.is_empty() || config.body.is_empty() {
            tracing::warn!("sms webhook missing url or body, disabled");
            return None;
        }

        tracing::info!(
            method = %config.method,
            url = %config.url,
            "sms webhook configured"
        );
        Some(Self { config })
    }
}

#[async_trait]
impl SmsSender for WebhookSms {
    async fn send_sms(&self, to: &str, message: &str) -> Result<()> {
        let data = template::merge_vars(
            &self.config.env,
            &[("To", to), ("Message", message)],
        );

        webhook::deliver(&self.config, &data).await.map_err(|err| {
            tracing::error!(%to, error = %err, "failed to send SMS");
            EngineError::SmsSendFailed
        })?;

        tracing::debug!(%to, "SMS sent via webhook");
        Ok(())
    }
}
