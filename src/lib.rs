//! Keyrack is the account-management engine that sits beside an
//! authentication proxy: it issues sessions, resets and changes passwords,
//! enrolls TOTP second factors, and fans password changes out to external
//! systems over webhooks.

#[forbid(unsafe_code)]
#[deny(unused_mut)]
pub mod crypto;
pub mod error;
pub mod mail;
pub mod notify;
pub mod provider;
pub mod service;
pub mod store;
pub mod totp;

pub mod config;

use std::sync::Arc;

use config::Configuration;
use crypto::PasswordManager;
use error::Result;
use mail::{Mailer, NoopMailer};
use notify::{NoopNotifier, RestartNotifier};
use provider::sms::{SmsSender, WebhookSms};
use provider::webhook::PasswordTargets;
use service::{AccountService, AuthService};
use store::{EphemeralStore, MetaStore, UserFile};

/// External capabilities the engine drives but does not implement.
pub struct Collaborators {
    pub mailer: Arc<dyn Mailer>,
    pub notifier: Arc<dyn RestartNotifier>,
    pub sms: Option<Arc<dyn SmsSender>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            mailer: Arc::new(NoopMailer),
            notifier: Arc::new(NoopNotifier),
            sms: None,
        }
    }
}

/// Stores plus the services driving them, built once at startup and shared
/// by reference. No ambient globals.
pub struct Engine {
    pub config: Arc<Configuration>,
    pub store: Arc<EphemeralStore>,
    pub meta: Arc<MetaStore>,
    pub users: Arc<UserFile>,
    pub auth: AuthService,
    pub account: AccountService,
}

impl Engine {
    /// Wire stores and services from a configuration.
    ///
    /// Fails only on unrecoverable startup problems, such as an unusable
    /// storage directory.
    pub fn new(
        config: Arc<Configuration>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let store = Arc::new(EphemeralStore::new());
        let meta = Arc::new(MetaStore::open(&config.metadata_file)?);
        let users = Arc::new(UserFile::open(&config.users_file)?);
        let pwd = Arc::new(PasswordManager::new(config.argon2.clone())?);
        let targets =
            PasswordTargets::from_config(config.password_targets.clone())
                .map(Arc::new);

        let auth = AuthService::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&users),
            Arc::clone(&pwd),
        );
        let account = AccountService::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&meta),
            Arc::clone(&users),
            pwd,
            collaborators.mailer,
            collaborators.notifier,
            targets,
            collaborators.sms,
        );

        Ok(Self {
            config,
            store,
            meta,
            users,
            auth,
            account,
        })
    }

    /// Initialize from `config.yaml` with default collaborators. The SMS
    /// sender comes from the configuration's webhook record when present.
    pub fn initialize() -> Result<Self> {
        let config = Configuration::default().read();
        let sms = WebhookSms::from_config(config.sms.clone())
            .map(|sender| Arc::new(sender) as Arc<dyn SmsSender>);

        Self::new(
            config,
            Collaborators {
                sms,
                ..Default::default()
            },
        )
    }
}
