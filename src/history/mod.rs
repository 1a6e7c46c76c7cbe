//! In-memory clipboard history, newest first.
//!
//! Invariants held after every operation:
//! - one entry per distinct `content`
//! - size-based eviction never removes a pinned entry
//! - `clear_history` keeps pinned entries

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::clipboard::ClipboardEntry;

/// History shared between the detector and the service facade.
pub type SharedHistory = Arc<RwLock<HistoryStore>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: crate::DEFAULT_MAX_HISTORY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    entries: Vec<ClipboardEntry>,
    max_size: usize,
}

impl HistoryStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_size: max_size.max(1),
        }
    }

    /// Rebuild a store from a persisted snapshot (newest first). Later
    /// duplicates of a content value are dropped.
    pub fn from_entries(entries: Vec<ClipboardEntry>, max_size: usize) -> Self {
        let mut store = Self::new(max_size);
        for entry in entries {
            if !store.contains_content(&entry.content) {
                store.entries.push(entry);
            }
        }
        store.evict_overflow(0);
        store
    }

    /// Insert at the front, replacing any entry with the same content.
    pub fn add(&mut self, entry: ClipboardEntry) {
        self.entries.retain(|e| e.content != entry.content);
        self.entries.insert(0, entry);
        // the entry just added stays even when everything older is pinned
        self.evict_overflow(1);
    }

    pub fn get_history(&self) -> Vec<ClipboardEntry> {
        self.entries.clone()
    }

    pub fn get(&self, id: &str) -> Option<&ClipboardEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains_content(&self, content: &str) -> bool {
        self.entries.iter().any(|e| e.content == content)
    }

    pub fn contains_image(&self, fingerprint: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.is_image() && e.content == fingerprint)
    }

    /// Flip the pin flag. Returns the new state, `false` for unknown ids.
    pub fn toggle_pin(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.is_pinned = !entry.is_pinned;
                entry.is_pinned
            }
            None => false,
        }
    }

    pub fn remove_item(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn clear_history(&mut self) {
        self.entries.retain(|e| e.is_pinned);
    }

    pub fn set_max_history_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
        self.evict_overflow(0);
    }

    pub fn max_history_size(&self) -> usize {
        self.max_size
    }

    /// Returns whether the tag was newly added.
    pub fn add_tag(&mut self, id: &str, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() {
            return false;
        }
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .is_some_and(|e| e.tags.insert(tag.to_string()))
    }

    pub fn remove_tag(&mut self, id: &str, tag: &str) -> bool {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .is_some_and(|e| e.tags.remove(tag.trim()))
    }

    /// Move an existing entry to the front. Its timestamp is left alone.
    pub fn promote(&mut self, id: &str) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(index) => {
                let entry = self.entries.remove(index);
                self.entries.insert(0, entry);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pinned_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pinned).count()
    }

    /// Drop unpinned entries from the tail until within capacity. The first
    /// `protected` entries are never dropped.
    fn evict_overflow(&mut self, protected: usize) {
        while self.entries.len() > self.max_size {
            let victim = self
                .entries
                .iter()
                .enumerate()
                .skip(protected)
                .rev()
                .find(|(_, e)| !e.is_pinned)
                .map(|(i, _)| i);

            match victim {
                Some(index) => {
                    let evicted = self.entries.remove(index);
                    debug!("Evicted history entry {}", evicted.id);
                }
                None => break,
            }
        }
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(crate::DEFAULT_MAX_HISTORY)
    }
}
