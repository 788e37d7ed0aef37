//! Webhook fan-out for password change events.
//!
//! Every configured target receives the event concurrently; the call joins
//! on all of them and reports per-target failures without ever failing the
//! operation that triggered it.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::provider::template::{self, TemplateError};

/// Per-target bound on one delivery attempt, slow targets included.
pub(crate) const CALL_TIMEOUT: Duration = Duration::from_secs(15);
/// How much of an error response body is kept for diagnostics.
pub(crate) const BODY_CAPTURE_LIMIT: usize = 1024;

/// A single webhook target.
///
/// `url`, `body` and every header value are rendered through the
/// [`template`] engine before delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub skip_tls_verify: bool,
    /// Extra template variables for this target. They win over the event
    /// dataset on key collision.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_method() -> String {
    "POST".into()
}

fn default_content_type() -> String {
    "application/json".into()
}

/// Why one target's delivery failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("template {field}: {source}")]
    Template {
        field: String,
        #[source]
        source: TemplateError,
    },

    #[error("invalid HTTP method '{0}'")]
    Method(String),

    #[error("http request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// A delivery failure attributed to its target.
#[derive(Debug, thiserror::Error)]
#[error("{name}: {source}")]
pub struct TargetError {
    pub name: String,
    #[source]
    pub source: DeliveryError,
}

fn render_field(
    field: &str,
    value: &str,
    data: &HashMap<String, String>,
) -> Result<String, DeliveryError> {
    template::render(value, data).map_err(|source| DeliveryError::Template {
        field: field.to_owned(),
        source,
    })
}

/// Render and deliver one templated webhook call.
pub(crate) async fn deliver(
    config: &TargetConfig,
    data: &HashMap<String, String>,
) -> Result<(), DeliveryError> {
    let url = render_field("url", &config.url, data)?;
    let body = render_field("body", &config.body, data)?;
    let method = Method::from_bytes(config.method.as_bytes())
        .map_err(|_| DeliveryError::Method(config.method.clone()))?;

    let client = Client::builder()
        .timeout(CALL_TIMEOUT)
        .danger_accept_invalid_certs(config.skip_tls_verify)
        .build()?;

    let mut request = client
        .request(method, &url)
        .header(CONTENT_TYPE, config.content_type.as_str())
        .body(body);
    for (name, value) in &config.headers {
        let rendered = render_field(&format!("header {name}"), value, data)?;
        request = request.header(name.as_str(), rendered);
    }

    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await.unwrap_or_default();

    if status.is_client_error() || status.is_server_error() {
        let body = String::from_utf8_lossy(
            &bytes[..bytes.len().min(BODY_CAPTURE_LIMIT)],
        )
        .into_owned();
        return Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(())
}

/// Webhook-based password sync targets.
#[derive(Debug, Default)]
pub struct PasswordTargets {
    targets: Vec<TargetConfig>,
}

impl PasswordTargets {
    /// Build the provider from configured targets. Returns `None` when no
    /// target is configured so callers can skip the fan-out entirely.
    pub fn from_config(targets: Vec<TargetConfig>) -> Option<Self> {
        if targets.is_empty() {
            return None;
        }

        tracing::info!(count = targets.len(), "password targets loaded");
        Some(Self { targets })
    }

    /// Send a password change to every target in parallel and wait for all
    /// of them. The returned list holds one entry per failed target; an
    /// empty list means every delivery succeeded.
    pub async fn sync_password(
        &self,
        username: &str,
        plain_password: &str,
        hashed_password: &str,
    ) -> Vec<TargetError> {
        let mut deliveries = JoinSet::new();
        for target in &self.targets {
            let target = target.clone();
            let data = template::merge_vars(
                &target.env,
                &[
                    ("Username", username),
                    ("Password", plain_password),
                    ("HashedPassword", hashed_password),
                ],
            );

            deliveries.spawn(async move {
                match deliver(&target, &data).await {
                    Ok(()) => {
                        tracing::info!(
                            target = %target.name,
                            "password synced"
                        );
                        None
                    },
                    Err(source) => Some(TargetError {
                        name: target.name.clone(),
                        source,
                    }),
                }
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok(Some(error)) => {
                    tracing::error!(
                        target = %error.name,
                        error = %error.source,
                        "password sync failed"
                    );
                    errors.push(error);
                },
                Ok(None) => {},
                Err(err) => {
                    tracing::error!(error = %err, "sync task panicked");
                },
            }
        }
        errors
    }
}
