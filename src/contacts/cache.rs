//! In-memory resolution cache.
//
// Entries are derived from the alias table, the fallback list and the
// directory. Any mutation of the two local stores clears the whole cache and
// bumps the generation so that a lookup started before the mutation cannot
// write its (now stale) answer back afterwards.

use std::collections::HashMap;
use std::sync::Mutex;

use log::debug;

use super::{normalize, Contact};

/// What a normalised query resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    Email(String),
    /// Scored candidates from a fuzzy search, best first.
    Candidates(Vec<Contact>),
}

#[derive(Default)]
struct CacheState {
    generation: u64,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Default)]
pub struct ResolutionCache {
    state: Mutex<CacheState>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let state = self.lock();
        state.entries.get(&normalize(key)).cloned()
    }

    pub fn put(&self, key: &str, entry: CacheEntry) {
        let key = normalize(key);
        if key.is_empty() {
            return;
        }
        self.lock().entries.insert(key, entry);
    }

    /// Insert only if no clear happened since `generation` was observed.
    pub fn put_if_current(&self, generation: u64, key: &str, entry: CacheEntry) -> bool {
        let key = normalize(key);
        if key.is_empty() {
            return false;
        }
        let mut state = self.lock();
        if state.generation != generation {
            debug!("Dropping cache write for '{}' from generation {}", key, generation);
            return false;
        }
        state.entries.insert(key, entry);
        true
    }

    /// Cache a resolved contact under both its name and its email.
    pub fn remember(&self, generation: u64, name: &str, email: &str) {
        if name.trim().is_empty() || email.trim().is_empty() {
            return;
        }
        self.put_if_current(generation, name, CacheEntry::Email(email.to_string()));
        self.put_if_current(generation, email, CacheEntry::Email(email.to_string()));
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        state.generation += 1;
        debug!("Cleared resolution cache ({} entries, generation {})", dropped, state.generation);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        // The state holds plain data, a panic while holding the lock cannot leave it torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
