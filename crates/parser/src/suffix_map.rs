//! Dotted-suffix lookup table
//!
//! Keys are stored fully qualified (`method.param`); a lookup key matches a
//! stored key when it equals one of the stored key's trailing dotted
//! suffixes. `c` matches `a.b.c` and `x.c`; `b.c` matches only `a.b.c`.

use stackql_provider_common::{ProviderError, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct SuffixMap<V> {
    entries: BTreeMap<String, V>,
}

impl<V> Default for SuffixMap<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

fn is_dotted_suffix(stored: &str, key: &str) -> bool {
    if stored == key {
        return true;
    }
    stored
        .strip_suffix(key)
        .map(|head| head.ends_with('.'))
        .unwrap_or(false)
}

impl<V> SuffixMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully qualified key; an exact duplicate is a structural error
    pub fn insert(&mut self, key: String, value: V) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(ProviderError::Parameter(format!(
                "duplicate parameter key '{}'",
                key
            )));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// First stored entry (in key order) matched by `key`
    pub fn get(&self, key: &str) -> Option<(&str, &V)> {
        self.entries
            .iter()
            .find(|(stored, _)| is_dotted_suffix(stored, key))
            .map(|(stored, value)| (stored.as_str(), value))
    }

    /// Remove and return the entry matched by `key`; at most one is removed
    pub fn take(&mut self, key: &str) -> Option<(String, V)> {
        let stored = self.get(key).map(|(stored, _)| stored.to_string())?;
        self.entries.remove_entry(&stored)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
