//! User-defined alias table (alias -> email).

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{normalize, ContactError, ResolutionCache, Saved};
use crate::state::{JsonStore, Persistent, MAX_ITEMS};

/// Normalised alias -> email, persisted as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasTable(BTreeMap<String, String>);

impl AliasTable {
    pub fn get(&self, alias: &str) -> Option<&String> {
        self.0.get(alias)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn normalized(self) -> Self {
        Self(self.0.into_iter().map(|(alias, email)| (normalize(&alias), email)).collect())
    }
}

impl Persistent for AliasTable {
    fn filename() -> &'static str {
        "name-aliases.json"
    }

    fn item_count(&self) -> usize {
        self.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum AliasChange {
    Added,
    Updated { old_email: String },
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasEntry {
    pub alias: String,
    pub email: String,
}

pub struct AliasStore {
    table: RwLock<Arc<AliasTable>>,
    writer: Mutex<()>,
    file: JsonStore<AliasTable>,
    cache: Arc<ResolutionCache>,
}

impl AliasStore {
    /// Load aliases from `file`, starting empty if it is missing or unreadable.
    pub fn open(file: JsonStore<AliasTable>, cache: Arc<ResolutionCache>) -> Self {
        let table = file.load_or(AliasTable::default()).normalized();
        Self { table: RwLock::new(Arc::new(table)), writer: Mutex::new(()), file, cache }
    }

    pub fn snapshot(&self) -> Arc<AliasTable> {
        match self.table.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn get(&self, alias: &str) -> Option<String> {
        self.snapshot().get(&normalize(alias)).cloned()
    }

    pub fn list(&self) -> Vec<AliasEntry> {
        self.snapshot()
            .iter()
            .map(|(alias, email)| AliasEntry { alias: alias.clone(), email: email.clone() })
            .collect()
    }

    /// Map `alias` to `email`, replacing any previous mapping.
    pub async fn add(&self, alias: &str, email: &str) -> Result<Saved<AliasChange>, ContactError> {
        let key = normalize(alias);
        let email = email.trim();
        if key.is_empty() {
            return Err(ContactError::InvalidInput("Please provide a valid alias name.".into()));
        }

        let _guard = self.writer.lock().await;
        let current = self.snapshot();
        let change = match current.get(&key) {
            Some(old) if old == email => AliasChange::Unchanged,
            Some(old) => AliasChange::Updated { old_email: old.clone() },
            None => AliasChange::Added,
        };

        if change == AliasChange::Unchanged {
            // An earlier save of this mapping may have failed, so write it again.
            let saved_to_file = self.persist(&current);
            // Entries cached before the alias existed may still shadow it.
            self.cache.clear();
            return Ok(Saved { value: change, saved_to_file });
        }
        if change == AliasChange::Added && current.len() >= MAX_ITEMS {
            return Err(ContactError::StoreFull { kind: "aliases", limit: MAX_ITEMS });
        }

        let mut next = (*current).clone();
        next.0.insert(key.clone(), email.to_string());
        let saved_to_file = self.commit(next);
        info!("Alias '{}' -> {} ({:?})", key, email, change);
        Ok(Saved { value: change, saved_to_file })
    }

    /// Remove `alias`, returning the email it pointed to.
    pub async fn delete(&self, alias: &str) -> Result<Saved<String>, ContactError> {
        let key = normalize(alias);

        let _guard = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        let email = next.0.remove(&key).ok_or_else(|| ContactError::AliasNotFound(alias.trim().to_string()))?;
        let saved_to_file = self.commit(next);
        info!("Deleted alias '{}' -> {}", key, email);
        Ok(Saved { value: email, saved_to_file })
    }

    fn persist(&self, table: &AliasTable) -> bool {
        match self.file.save(table) {
            Ok(()) => true,
            Err(e) => {
                error!("Error saving name aliases: {}", e);
                false
            }
        }
    }

    // Caller holds the writer lock.
    fn commit(&self, next: AliasTable) -> bool {
        let saved = self.persist(&next);
        match self.table.write() {
            Ok(mut guard) => *guard = Arc::new(next),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(next),
        }
        self.cache.clear();
        saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::CacheEntry;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn open_in(dir: &std::path::Path) -> (AliasStore, Arc<ResolutionCache>) {
        let cache = Arc::new(ResolutionCache::new());
        (AliasStore::open(JsonStore::in_dir(dir), Arc::clone(&cache)), cache)
    }

    #[tokio::test]
    async fn add_normalises_and_persists() {
        let dir = tempdir().unwrap();
        let (store, _) = open_in(dir.path());

        let saved = store.add("  My Manager ", "boss@example.com").await.unwrap();
        assert_eq!(saved.value, AliasChange::Added);
        assert!(saved.saved_to_file);
        assert_eq!(store.get("my manager"), Some("boss@example.com".to_string()));

        let (reopened, _) = open_in(dir.path());
        assert_eq!(
            reopened.list(),
            vec![AliasEntry { alias: "my manager".into(), email: "boss@example.com".into() }]
        );
    }

    #[tokio::test]
    async fn overwrite_reports_old_email() {
        let dir = tempdir().unwrap();
        let (store, _) = open_in(dir.path());
        store.add("X", "y@z.com").await.unwrap();
        let saved = store.add("x", "w@z.com").await.unwrap();
        assert_eq!(saved.value, AliasChange::Updated { old_email: "y@z.com".into() });
        assert_eq!(store.get("X"), Some("w@z.com".into()));
    }

    #[tokio::test]
    async fn same_mapping_is_unchanged() {
        let dir = tempdir().unwrap();
        let (store, _) = open_in(dir.path());
        store.add("x", "y@z.com").await.unwrap();
        let saved = store.add("X", "y@z.com").await.unwrap();
        assert_eq!(saved.value, AliasChange::Unchanged);
    }

    #[tokio::test]
    async fn mutations_clear_cache() {
        let dir = tempdir().unwrap();
        let (store, cache) = open_in(dir.path());
        cache.put("someone", CacheEntry::Email("a@b.com".into()));
        store.add("boss", "boss@example.com").await.unwrap();
        assert!(cache.is_empty());

        cache.put("someone", CacheEntry::Email("a@b.com".into()));
        store.delete("boss").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_alias_is_not_found() {
        let dir = tempdir().unwrap();
        let (store, _) = open_in(dir.path());
        let err = store.delete("ghost").await.unwrap_err();
        assert_eq!(err, ContactError::AliasNotFound("ghost".into()));
    }

    #[tokio::test]
    async fn blank_alias_is_rejected() {
        let dir = tempdir().unwrap();
        let (store, _) = open_in(dir.path());
        assert!(matches!(store.add("   ", "a@b.com").await, Err(ContactError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn save_failure_still_updates_memory() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let cache = Arc::new(ResolutionCache::new());
        let store = AliasStore::open(JsonStore::new(blocker.join("aliases.json")), cache);

        let saved = store.add("boss", "boss@example.com").await.unwrap();
        assert!(!saved.saved_to_file);
        assert_eq!(store.get("boss"), Some("boss@example.com".into()));

        // Repeating the add is unchanged in memory but still not on disk.
        let retry = store.add("boss", "boss@example.com").await.unwrap();
        assert_eq!(retry.value, AliasChange::Unchanged);
        assert!(!retry.saved_to_file);
    }

    #[tokio::test]
    async fn unchanged_add_rewrites_a_missing_file() {
        let dir = tempdir().unwrap();
        let (store, _) = open_in(dir.path());
        store.add("boss", "boss@example.com").await.unwrap();
        std::fs::remove_file(dir.path().join("name-aliases.json")).unwrap();

        let retry = store.add("boss", "boss@example.com").await.unwrap();
        assert_eq!(retry.value, AliasChange::Unchanged);
        assert!(retry.saved_to_file);
        let (reopened, _) = open_in(dir.path());
        assert_eq!(reopened.get("boss"), Some("boss@example.com".into()));
    }

    #[tokio::test]
    async fn full_table_rejects_new_aliases_but_allows_updates() {
        let dir = tempdir().unwrap();
        let full: BTreeMap<String, String> =
            (0..MAX_ITEMS).map(|i| (format!("alias {}", i), format!("a{}@example.com", i))).collect();
        JsonStore::<AliasTable>::in_dir(dir.path()).save(&AliasTable(full)).unwrap();
        let (store, _) = open_in(dir.path());

        let err = store.add("one too many", "x@example.com").await.unwrap_err();
        assert_eq!(err, ContactError::StoreFull { kind: "aliases", limit: MAX_ITEMS });
        let updated = store.add("alias 0", "new@example.com").await.unwrap();
        assert!(updated.saved_to_file);

        let (reopened, _) = open_in(dir.path());
        assert_eq!(reopened.list().len(), MAX_ITEMS);
        assert_eq!(reopened.get("alias 0"), Some("new@example.com".into()));
    }

    #[test]
    fn loaded_keys_are_normalised() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("name-aliases.json"), r#"{" Big Boss ": "b@example.com"}"#).unwrap();
        let (store, _) = open_in(dir.path());
        assert_eq!(store.get("big boss"), Some("b@example.com".into()));
    }
}
