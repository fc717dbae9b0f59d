//! Metadata entries attached to every submitted job.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Session-wide `key=value` metadata merged into each job's `md` argument.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    ///
    /// Surrounding quotes and spaces are stripped from the value.
    pub fn add_entry(&self, key: &str, value: &str) {
        let cleaned = strip_quotes(value).to_owned();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), cleaned);
    }

    /// Removes `key`, returning `true` when it was present.
    pub fn remove_entry(&self, key: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Returns the value stored for `key`.
    #[must_use]
    pub fn get_entry(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Snapshot of every entry, ordered by key.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `true` when no metadata is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// Splits a `key=value` token, stripping quotes from the value.
#[must_use]
pub fn split_pair(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once('=')?;
    let trimmed_key = key.trim();
    if trimmed_key.is_empty() {
        return None;
    }
    Some((trimmed_key, strip_quotes(value)))
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches(|character| matches!(character, '\'' | '"' | ' '))
}
