//! The auth proxy credential file.
//!
//! One record per line, `username:password_hash[:totp_secret]`. The proxy
//! owns this format; this store mutates it on the proxy's behalf with the
//! same temp-file-plus-rename commit as the metadata store.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::Result;

/// A credential record for one user.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UserRecord {
    pub username: String,
    /// PHC-formatted password hash. Non-empty once the user exists.
    pub password_hash: String,
    /// Base32 TOTP secret. Empty means the second factor is disabled.
    pub totp_secret: String,
}

/// File-backed store of [`UserRecord`]s, keyed by username.
#[derive(Debug)]
pub struct UserFile {
    path: PathBuf,
    users: RwLock<BTreeMap<String, UserRecord>>,
}

fn parse_line(line: &str) -> Option<UserRecord> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut parts = line.splitn(3, ':');
    let username = parts.next()?.to_owned();
    let password_hash = parts.next()?.to_owned();
    let totp_secret = parts.next().unwrap_or_default().to_owned();

    Some(UserRecord {
        username,
        password_hash,
        totp_secret,
    })
}

impl UserFile {
    /// Open the credential file, creating the parent directory if needed.
    /// A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut users = BTreeMap::new();
        match fs::read_to_string(&path) {
            Ok(raw) => {
                for record in raw.lines().filter_map(parse_line) {
                    users.insert(record.username.clone(), record);
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
            Err(err) => return Err(err.into()),
        }

        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    fn save(&self, users: &BTreeMap<String, UserRecord>) -> Result<()> {
        let mut raw = String::new();
        for record in users.values() {
            raw.push_str(&record.username);
            raw.push(':');
            raw.push_str(&record.password_hash);
            if !record.totp_secret.is_empty() {
                raw.push(':');
                raw.push_str(&record.totp_secret);
            }
            raw.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Look up a user by name.
    pub fn find(&self, username: &str) -> Option<UserRecord> {
        self.users
            .read()
            .expect("users lock poisoned")
            .get(username)
            .cloned()
    }

    /// Insert or replace a credential record and commit the file.
    pub fn upsert(&self, record: UserRecord) -> Result<()> {
        let mut users = self.users.write().expect("users lock poisoned");
        users.insert(record.username.clone(), record);
        self.save(&users)
    }
}
