//! Dedup store for discovered and processed URLs

use crate::state::{lock, UrlState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// One URL and its dedup state, as persisted in snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenEntry {
    pub url: String,
    pub state: UrlState,
}

/// Tracks discovered vs. processed URLs
///
/// Both `mark_discovered` and `mark_processed` are single check-and-set
/// operations under one lock, so two workers racing on the same URL always
/// see exactly one winner.
#[derive(Debug, Default)]
pub struct SeenStore {
    entries: Mutex<HashMap<String, UrlState>>,
}

impl SeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from persisted entries
    pub fn from_entries(entries: impl IntoIterator<Item = SeenEntry>) -> Self {
        let store = Self::new();
        store.replace(entries);
        store
    }

    /// Records a URL as discovered
    ///
    /// Returns `false` if the URL was already known (discovered or processed).
    pub fn mark_discovered(&self, url: &str) -> bool {
        let mut entries = lock(&self.entries);
        if entries.contains_key(url) {
            return false;
        }
        entries.insert(url.to_string(), UrlState::Discovered);
        true
    }

    /// Returns true if the URL has been processed successfully
    pub fn is_processed(&self, url: &str) -> bool {
        lock(&self.entries)
            .get(url)
            .map(|state| state.is_terminal())
            .unwrap_or(false)
    }

    /// Records a URL as processed
    ///
    /// Returns `false` if it was already processed.
    pub fn mark_processed(&self, url: &str) -> bool {
        let mut entries = lock(&self.entries);
        let previous = entries.insert(url.to_string(), UrlState::Processed);
        previous != Some(UrlState::Processed)
    }

    /// Current state of a URL, if known
    pub fn state(&self, url: &str) -> Option<UrlState> {
        lock(&self.entries).get(url).copied()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Number of URLs in each state: (discovered, processed)
    pub fn counts(&self) -> (usize, usize) {
        let entries = lock(&self.entries);
        let processed = entries.values().filter(|s| s.is_terminal()).count();
        (entries.len() - processed, processed)
    }

    /// All entries sorted by URL
    pub fn entries(&self) -> Vec<SeenEntry> {
        let mut entries: Vec<SeenEntry> = lock(&self.entries)
            .iter()
            .map(|(url, state)| SeenEntry {
                url: url.clone(),
                state: *state,
            })
            .collect();
        entries.sort_by(|a, b| a.url.cmp(&b.url));
        entries
    }

    /// Replaces the whole content of the store
    pub fn replace(&self, entries: impl IntoIterator<Item = SeenEntry>) {
        let mut map = lock(&self.entries);
        map.clear();
        for entry in entries {
            map.insert(entry.url, entry.state);
        }
    }
}
