//! Outbound collaborators: webhook fan-out and SMS delivery.

pub mod sms;
pub mod template;
pub mod webhook;

pub use sms::{SmsSender, WebhookSms};
pub use webhook::{PasswordTargets, TargetConfig};
