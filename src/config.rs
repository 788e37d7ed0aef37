//! Configuration manager for keyrack.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::provider::webhook::TargetConfig;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Path to the auth proxy `users` file holding credential records.
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,
    /// Path to the durable per-user metadata file.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: PathBuf,
    /// Session lifetime in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl: i64,
    /// Password reset token lifetime in seconds.
    #[serde(default = "default_reset_token_ttl")]
    pub reset_token_ttl: i64,
    /// Whether new signups wait for an explicit approval.
    #[serde(default)]
    pub signup_require_approval: bool,
    /// Issuer advertised in TOTP provisioning URLs.
    #[serde(default = "default_totp_issuer")]
    pub totp_issuer: String,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to Argon2 configuration.
    #[serde(default, skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Webhook targets receiving password change events.
    #[serde(default, skip_serializing)]
    pub password_targets: Vec<TargetConfig>,
    /// Webhook used to deliver SMS reset codes. `None` disables SMS resets.
    #[serde(default, skip_serializing)]
    pub sms: Option<TargetConfig>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            users_file: default_users_file(),
            metadata_file: default_metadata_file(),
            session_ttl: default_session_ttl(),
            reset_token_ttl: default_reset_token_ttl(),
            signup_require_approval: false,
            totp_issuer: default_totp_issuer(),
            version: String::default(),
            path: PathBuf::default(),
            argon2: None,
            password_targets: Vec::new(),
            sms: None,
        }
    }
}

fn default_users_file() -> PathBuf {
    PathBuf::from("data/users")
}

fn default_metadata_file() -> PathBuf {
    PathBuf::from("data/users.toml")
}

fn default_session_ttl() -> i64 {
    86_400
}

fn default_reset_token_ttl() -> i64 {
    3_600
}

fn default_totp_issuer() -> String {
    "keyrack".into()
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Arc::new(self.error(err));
                        },
                    };

                // set app version.
                config.version = VERSION.to_owned();

                Arc::new(config)
            },
            Err(err) => Arc::new(self.error(err)),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Configuration = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.session_ttl, 86_400);
        assert_eq!(config.reset_token_ttl, 3_600);
        assert!(!config.signup_require_approval);
        assert_eq!(config.totp_issuer, "keyrack");
        assert!(config.password_targets.is_empty());
        assert!(config.sms.is_none());
    }

    #[test]
    fn test_targets() {
        let config: Configuration = serde_yaml::from_str(
            r#"
session_ttl: 600
password_targets:
  - name: caddy
    url: https://caddy.local/users/{{Username}}
    body: '{"password": "{{HashedPassword}}"}'
    skip_tls_verify: true
    env:
      Realm: internal
sms:
  url: https://gateway.local/send
  body: '{"to": "{{To}}", "text": "{{Message}}"}'
"#,
        )
        .unwrap();

        assert_eq!(config.session_ttl, 600);
        assert_eq!(config.password_targets.len(), 1);

        let target = &config.password_targets[0];
        assert_eq!(target.name, "caddy");
        assert_eq!(target.method, "POST");
        assert_eq!(target.content_type, "application/json");
        assert!(target.skip_tls_verify);
        assert_eq!(target.env.get("Realm").unwrap(), "internal");
        assert!(config.sms.is_some());
    }
}
