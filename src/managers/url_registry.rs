//! NormalizedUrl → TabId index used to spot duplicate tabs.
//!
//! Each tab owns at most one entry: recording a new URL for a tab drops the
//! entry it held before. Entries can still go stale when tabs close while
//! the engine is not listening; lookups that find a dead tab evict it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use url::Url;

use crate::services::tab_host::TabHost;
use crate::types::errors::HostError;
use crate::types::tab::{is_internal_url, TabId, TabQuery};

/// Strips the fragment. Parseable URLs are also put in canonical form
/// (lowercase scheme and host, default path); anything else is cut at the
/// first `#`.
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => match url.find('#') {
            Some(pos) => url[..pos].to_string(),
            None => url.to_string(),
        },
    }
}

#[derive(Default)]
pub struct UrlRegistry {
    entries: Mutex<HashMap<String, TabId>>,
}

impl UrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, TabId>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the whole index with the currently open tabs.
    ///
    /// When several tabs share a URL the last one reported wins.
    pub async fn rebuild(&self, host: &dyn TabHost) -> Result<usize, HostError> {
        let tabs = host.query_tabs(&TabQuery::all()).await?;
        let fresh: HashMap<String, TabId> = tabs
            .iter()
            .filter(|t| !is_internal_url(&t.url))
            .map(|t| (normalize_url(&t.url), t.id))
            .collect();
        let count = fresh.len();
        *self.entries() = fresh;
        tracing::debug!(entries = count, "url registry rebuilt");
        Ok(count)
    }

    /// Points the normalized form of `url` at `tab_id` and returns that form.
    pub fn record_or_update(&self, url: &str, tab_id: TabId) -> String {
        let normalized = normalize_url(url);
        let mut entries = self.entries();
        entries.retain(|key, id| *id != tab_id || *key == normalized);
        entries.insert(normalized.clone(), tab_id);
        normalized
    }

    pub fn lookup(&self, normalized: &str) -> Option<TabId> {
        self.entries().get(normalized).copied()
    }

    /// Drops the entry owned by `tab_id`, if any.
    pub fn forget(&self, tab_id: TabId) -> Option<String> {
        let mut entries = self.entries();
        let key = entries
            .iter()
            .find(|(_, id)| **id == tab_id)
            .map(|(key, _)| key.clone())?;
        entries.remove(&key);
        Some(key)
    }

    /// Removes `normalized` only while it still points at `tab_id`.
    pub fn evict(&self, normalized: &str, tab_id: TabId) -> bool {
        let mut entries = self.entries();
        if entries.get(normalized) == Some(&tab_id) {
            entries.remove(normalized);
            true
        } else {
            false
        }
    }

    pub fn reset(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
