//! Durable per-user metadata, persisted as a TOML file.
//!
//! The whole collection lives in memory and is loaded once at startup. Every
//! mutation re-serializes everything to a temporary file and atomically
//! renames it over the canonical path, so the on-disk file is always either
//! the previous complete state or the new complete state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Persistent non-secret attributes of a user.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMeta {
    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Role label, free-form.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    /// Phone number used for SMS-based resets.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone: String,
    /// Whether the account went through signup approval.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub approved: bool,
}

/// TOML-backed store of [`UserMeta`] records, keyed by username.
#[derive(Debug)]
pub struct MetaStore {
    path: PathBuf,
    users: RwLock<BTreeMap<String, UserMeta>>,
}

impl MetaStore {
    /// Open the store, creating the parent directory if needed and loading
    /// any existing file. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let users = match fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                BTreeMap::new()
            },
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    /// Serialize the full collection and commit it with a rename. Callers
    /// hold the write lock, so writers are serialized.
    fn save(&self, users: &BTreeMap<String, UserMeta>) -> Result<()> {
        let raw = toml::to_string(users)?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Phone number for a user. Empty when absent, never an error.
    pub fn get_phone(&self, username: &str) -> String {
        self.users
            .read()
            .expect("meta lock poisoned")
            .get(username)
            .map(|meta| meta.phone.clone())
            .unwrap_or_default()
    }

    /// Set the phone number for a user, creating the record if needed.
    pub fn set_phone(&self, username: &str, phone: &str) -> Result<()> {
        let mut users = self.users.write().expect("meta lock poisoned");
        users.entry(username.to_owned()).or_default().phone =
            phone.to_owned();
        self.save(&users)
    }

    /// Metadata for a user, or `None` if absent.
    pub fn get_user_meta(&self, username: &str) -> Option<UserMeta> {
        self.users
            .read()
            .expect("meta lock poisoned")
            .get(username)
            .cloned()
    }

    /// Replace the metadata for a user.
    pub fn set_user_meta(&self, username: &str, meta: UserMeta) -> Result<()> {
        let mut users = self.users.write().expect("meta lock poisoned");
        users.insert(username.to_owned(), meta);
        self.save(&users)
    }

    /// Username owning a phone number, or empty when unknown.
    ///
    /// Linear scan over the collection; fine at the user-base scale this
    /// store is built for, a limit to revisit beyond that.
    pub fn find_user_by_phone(&self, phone: &str) -> String {
        self.users
            .read()
            .expect("meta lock poisoned")
            .iter()
            .find(|(_, meta)| meta.phone == phone)
            .map(|(username, _)| username.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_roundtrip_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");

        let store = MetaStore::open(&path).unwrap();
        assert_eq!(store.get_phone("alice"), "");

        store.set_phone("alice", "+33612345678").unwrap();
        assert_eq!(store.get_phone("alice"), "+33612345678");
        assert_eq!(store.find_user_by_phone("+33612345678"), "alice");
        assert_eq!(store.find_user_by_phone("+10000000000"), "");

        // A fresh open observes the committed state.
        let reloaded = MetaStore::open(&path).unwrap();
        assert_eq!(reloaded.get_phone("alice"), "+33612345678");
    }

    #[test]
    fn test_meta_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("users.toml")).unwrap();

        assert!(store.get_user_meta("bob").is_none());

        let meta = UserMeta {
            name: "Bob".into(),
            role: "admin".into(),
            phone: "+440000".into(),
            approved: true,
        };
        store.set_user_meta("bob", meta.clone()).unwrap();
        assert_eq!(store.get_user_meta("bob").unwrap(), meta);
    }

    #[test]
    fn test_stray_temp_file_does_not_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");

        let store = MetaStore::open(&path).unwrap();
        store.set_phone("alice", "+336000").unwrap();

        // Simulate a crash after the temp write but before the rename: the
        // canonical file must still hold the prior complete state.
        fs::write(path.with_extension("toml.tmp"), "garbage = [").unwrap();

        let reloaded = MetaStore::open(&path).unwrap();
        assert_eq!(reloaded.get_phone("alice"), "+336000");
    }
}
