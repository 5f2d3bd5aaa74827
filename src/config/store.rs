//! Flat key-value configuration store
//!
//! Files hold whitespace-separated `key value` pairs, written one pair per
//! line. The value `NULL` marks a key that is present but unset.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

const UNSET: &str = "NULL";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigStore {
    entries: Vec<(String, String)>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the pairs found in `text`; a trailing key without value is ignored
    pub fn parse(&mut self, text: &str) -> usize {
        let mut tokens = text.split([' ', '\n', '\r', '\t']).filter(|t| !t.is_empty());
        let mut count = 0;

        while let (Some(key), Some(value)) = (tokens.next(), tokens.next()) {
            self.entries.push((key.to_string(), value.to_string()));
            count += 1;
        }
        count
    }

    /// Load a file, appending to anything loaded before
    pub fn load(&mut self, path: &Path) -> Result<usize> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let count = self.parse(&text);
        debug!("loaded {} configuration entries from {}", count, path.display());
        Ok(count)
    }

    /// Replace `path` with the given pairs
    pub fn save<K, V>(path: &Path, pairs: &[(K, V)]) -> Result<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if path.exists() {
            debug!("replacing old configuration {}", path.display());
            fs::remove_file(path)
                .with_context(|| format!("deleting old configuration {}", path.display()))?;
        }

        let mut text = String::new();
        for (key, value) in pairs {
            text.push_str(key.as_ref());
            text.push(' ');
            text.push_str(value.as_ref());
            text.push('\n');
        }

        fs::write(path, text).with_context(|| format!("writing configuration {}", path.display()))
    }

    /// First value stored for `key`, unless it is `NULL`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| *v != UNSET)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Whether `key` holds exactly `truthy`
    pub fn get_bool(&self, key: &str, truthy: &str) -> bool {
        self.get(key) == Some(truthy)
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn print(&self) {
        for (index, (key, _)) in self.entries.iter().enumerate() {
            debug!("   Key #{}: {} = {}", index + 1, key, self.get(key).unwrap_or("N/A"));
        }
    }
}
