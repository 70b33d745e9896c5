//! Per-user sharing key store.
//!
//! A sharing key lets one local user drop files into another local user's
//! shared folder with `cpd copy`. Keys are short random hex strings mapped
//! to usernames in a JSON file under the CPD config directory; there is no
//! cryptography here beyond generating random bytes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::RngCore;

use crate::config;
use crate::error::{Error, Result};

/// Length of a sharing key in random bytes (rendered as hex, so 8 chars).
const KEY_BYTES: usize = 4;

/// On-disk store mapping username to sharing key.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: BTreeMap<String, String>,
    path: PathBuf,
}

impl KeyStore {
    /// Load the key store from the default location, creating an empty
    /// store if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = config::config_dir()?.join("keys.json");
        Self::load_from(path)
    }

    /// Load a key store from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        let keys = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| Error::Serialization(e.to_string()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self { keys, path })
    }

    /// Persist the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.keys)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Generate and record a fresh key for `username`, replacing any
    /// previous one.
    #[must_use]
    pub fn generate(&mut self, username: &str) -> String {
        let mut bytes = [0u8; KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let key: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

        self.keys.insert(username.to_string(), key.clone());
        key
    }

    /// Look up the key recorded for `username`.
    #[must_use]
    pub fn key_for(&self, username: &str) -> Option<&str> {
        self.keys.get(username).map(String::as_str)
    }

    /// Reverse lookup: find which user a bare key belongs to.
    #[must_use]
    pub fn user_for(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(_, stored)| *stored == key)
            .map(|(user, _)| user.as_str())
    }

    /// Resolve a `user:key` or bare `key` argument against the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if the key doesn't match any user, or
    /// doesn't match the named user.
    pub fn resolve(&self, user_key: &str) -> Result<String> {
        let (username, key) = match user_key.split_once(':') {
            Some((user, key)) => (user.to_string(), key),
            None => {
                let user = self
                    .user_for(user_key)
                    .ok_or_else(|| Error::InvalidKey("no matching user found".to_string()))?;
                (user.to_string(), user_key)
            }
        };

        if username.is_empty() || key.is_empty() {
            return Err(Error::InvalidKey("invalid key format".to_string()));
        }

        if self.key_for(&username) != Some(key) {
            return Err(Error::InvalidKey(format!(
                "key does not match user '{username}'"
            )));
        }

        Ok(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &std::path::Path) -> KeyStore {
        KeyStore::load_from(dir.join("keys.json")).unwrap()
    }

    #[test]
    fn test_generate_is_hex() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let key = store.generate("alice");
        assert_eq!(key.len(), KEY_BYTES * 2);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let key = store.generate("alice");
        store.save().unwrap();

        let reloaded = store_in(dir.path());
        assert_eq!(reloaded.key_for("alice"), Some(key.as_str()));
    }

    #[test]
    fn test_resolve_user_colon_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let key = store.generate("alice");

        let user = store.resolve(&format!("alice:{key}")).unwrap();
        assert_eq!(user, "alice");
    }

    #[test]
    fn test_resolve_bare_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let key = store.generate("bob");

        let user = store.resolve(&key).unwrap();
        assert_eq!(user, "bob");
    }

    #[test]
    fn test_resolve_rejects_wrong_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.generate("alice");

        assert!(matches!(
            store.resolve("alice:00000000"),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            store.resolve("ffffffff"),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_regenerate_replaces_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let first = store.generate("alice");
        let second = store.generate("alice");
        assert_eq!(store.key_for("alice"), Some(second.as_str()));
        // Old key no longer resolves (unless the 4-byte draw collided).
        if first != second {
            assert!(store.resolve(&first).is_err());
        }
    }
}
