//! Password store in htdigest format.
//!
//! One entry per line, `username:realm:ha1`, where `ha1` is the lowercase hex
//! MD5 of `username:realm:password`. Blank lines and lines starting with `#`
//! are ignored.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordStore {
    /// Keyed by (realm, username).
    entries: BTreeMap<(String, String), String>,
}

impl PasswordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let store = Self::parse(&text)?;
        debug!(path = %path.display(), entries = store.len(), "password store loaded");
        Ok(store)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut store = Self::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let invalid = |message: &str| Error::PasswordFile {
                line: idx + 1,
                message: message.to_string(),
            };
            let mut parts = line.splitn(3, ':');
            let (Some(user), Some(realm), Some(ha1)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(invalid("expected username:realm:ha1"));
            };
            if user.is_empty() {
                return Err(invalid("empty username"));
            }
            if !is_md5_hex(ha1) {
                return Err(invalid("ha1 must be 32 hex digits"));
            }
            store.insert(user, realm, ha1);
        }
        Ok(store)
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, username: &str, realm: &str, ha1: &str) {
        self.entries.insert(
            (realm.to_string(), username.to_string()),
            ha1.to_ascii_lowercase(),
        );
    }

    pub fn lookup(&self, realm: &str, username: &str) -> Option<&str> {
        self.entries
            .get(&(realm.to_string(), username.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize back to htdigest lines.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|((realm, user), ha1)| format!("{user}:{realm}:{ha1}\n"))
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render())?;
        Ok(())
    }
}

fn is_md5_hex(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
