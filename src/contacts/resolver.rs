//! Multi-tier name-to-email resolution.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use super::{
    is_email, normalize, AliasChange, AliasEntry, AliasStore, AliasTable, CacheEntry, Contact, ContactEdit,
    ContactError, ContactList, ContactRecord, ContactSource, Directory, FallbackStore, FuzzyMatcher,
    ResolutionCache, Saved, CONFIDENT_MATCH_THRESHOLD,
};
use crate::state::JsonStore;

/// Every contact the broker knows about, grouped by where it lives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactListing {
    pub directory: Vec<Contact>,
    pub fallback: Vec<Contact>,
}

/// Outcome of resolving a list of attendee names without user interaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttendeeResolution {
    pub resolved: Vec<String>,
    pub unresolved: Vec<String>,
}

pub struct Resolver {
    cache: Arc<ResolutionCache>,
    aliases: AliasStore,
    fallback: FallbackStore,
    directory: Box<dyn Directory>,
    matcher: FuzzyMatcher,
    confident_threshold: u8,
}

impl Resolver {
    /// Open both local stores against one shared cache.
    pub fn new(
        aliases_file: JsonStore<AliasTable>,
        contacts_file: JsonStore<ContactList>,
        seed: Vec<ContactRecord>,
        directory: Box<dyn Directory>,
    ) -> Self {
        let cache = Arc::new(ResolutionCache::new());
        let aliases = AliasStore::open(aliases_file, Arc::clone(&cache));
        let fallback = FallbackStore::open(contacts_file, seed, Arc::clone(&cache));
        Self {
            cache,
            aliases,
            fallback,
            directory,
            matcher: FuzzyMatcher::default(),
            confident_threshold: CONFIDENT_MATCH_THRESHOLD,
        }
    }

    pub fn with_matcher(mut self, matcher: FuzzyMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_confident_threshold(mut self, threshold: u8) -> Self {
        self.confident_threshold = threshold;
        self
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Resolve a name, alias or email to a single contact.
    ///
    /// Tries, in order: literal email syntax, the cache, the alias table, the
    /// directory and a substring search of the fallback list. `None` is the
    /// normal "not found" outcome.
    pub async fn resolve_contact(&self, query: &str) -> Option<Contact> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        if is_email(query) {
            return Some(Contact::new(query, query, ContactSource::DirectEmail));
        }

        // Read before any store snapshot so a concurrent mutation invalidates our writes.
        let generation = self.cache.generation();
        let key = normalize(query);

        if let Some(CacheEntry::Email(email)) = self.cache.get(&key) {
            debug!("Cache hit for '{}'", key);
            return Some(Contact::new(query, email, ContactSource::Cache));
        }

        if let Some(email) = self.aliases.get(&key) {
            debug!("Alias hit for '{}'", key);
            self.cache.remember(generation, query, &email);
            return Some(Contact::new(query, email, ContactSource::Alias));
        }

        match self.directory.lookup(query).await {
            Ok(Some(found)) => {
                debug!("Directory hit for '{}': {}", key, found.email);
                self.remember_resolution(generation, query, &found);
                return Some(Contact { source: ContactSource::Directory, ..found });
            }
            Ok(None) => {}
            Err(e) => warn!("Directory lookup for '{}' failed, treating as a miss: {}", query, e),
        }

        if let Some(found) = self.fallback.find_substring(query) {
            debug!("Fallback hit for '{}': {}", key, found.email);
            self.remember_resolution(generation, query, &found);
            return Some(found);
        }

        debug!("No contact found for '{}'", query);
        None
    }

    /// Resolve a name to an email only when the answer is unambiguous.
    ///
    /// Falls back to scored candidates (cached from an earlier search, then a
    /// fresh fuzzy match over the fallback list) and accepts the best one
    /// only at or above the confident threshold.
    pub async fn resolve_name_to_email(&self, name: &str) -> Option<String> {
        if let Some(contact) = self.resolve_contact(name).await {
            return Some(contact.email);
        }

        let key = normalize(name);
        if key.is_empty() {
            return None;
        }
        if let Some(email) = self.aliases.get(&key) {
            return Some(email);
        }

        if let Some(CacheEntry::Candidates(candidates)) = self.cache.get(&key) {
            if let Some(email) = self.confident_pick(candidates) {
                debug!("Resolved '{}' from cached candidates", key);
                return Some(email);
            }
        }

        let fallback = self.fallback.snapshot();
        let matches = self.matcher.rank(name, fallback.records());
        let picked = self.confident_pick(matches);
        if picked.is_none() {
            info!("Could not confidently resolve '{}'", name.trim());
        }
        picked
    }

    fn confident_pick(&self, mut candidates: Vec<Contact>) -> Option<String> {
        candidates.retain(|c| c.score.is_some());
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates
            .into_iter()
            .next()
            .filter(|top| top.score.unwrap_or(0) >= self.confident_threshold)
            .map(|top| top.email)
    }

    /// Contacts matching `query` for the user to choose from.
    ///
    /// A direct resolution wins; otherwise near matches from the fallback
    /// list are returned with scores and cached as candidates for `query`.
    pub async fn search(&self, query: &str) -> Vec<Contact> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        if let Some(contact) = self.resolve_contact(query).await {
            return vec![contact];
        }

        let generation = self.cache.generation();
        let fallback = self.fallback.snapshot();
        let matches = self.matcher.rank(query, fallback.records());
        if !matches.is_empty() {
            debug!("{} fuzzy candidate(s) for '{}' via {}", matches.len(), query, self.matcher.scorer_name());
            self.cache.put_if_current(generation, query, CacheEntry::Candidates(matches.clone()));
        }
        matches
    }

    /// Cache a contact the user picked from search results.
    pub fn remember(&self, contact: &Contact) {
        self.cache.remember(self.cache.generation(), &contact.name, &contact.email);
    }

    pub async fn resolve_attendees(&self, names: &[String]) -> AttendeeResolution {
        let mut resolution = AttendeeResolution::default();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            match self.resolve_name_to_email(name).await {
                Some(email) => resolution.resolved.push(email),
                None => resolution.unresolved.push(name.to_string()),
            }
        }
        resolution
    }

    fn remember_resolution(&self, generation: u64, query: &str, contact: &Contact) {
        self.cache.put_if_current(generation, query, CacheEntry::Email(contact.email.clone()));
        self.cache.remember(generation, &contact.name, &contact.email);
    }

    pub async fn add_alias(&self, alias: &str, email: &str) -> Result<Saved<AliasChange>, ContactError> {
        self.aliases.add(alias, email).await
    }

    pub async fn delete_alias(&self, alias: &str) -> Result<Saved<String>, ContactError> {
        self.aliases.delete(alias).await
    }

    pub fn list_aliases(&self) -> Vec<AliasEntry> {
        self.aliases.list()
    }

    pub async fn add_fallback_contact(&self, name: &str, email: &str) -> Result<Saved<usize>, ContactError> {
        self.fallback.add(name, email).await
    }

    pub async fn edit_fallback_contact(
        &self,
        id: i64,
        new_name: Option<&str>,
        new_email: Option<&str>,
    ) -> Result<Saved<ContactEdit>, ContactError> {
        let id = self.checked_id(id)?;
        self.fallback.edit(id, new_name, new_email).await
    }

    pub async fn delete_fallback_contact(&self, id: i64) -> Result<Saved<ContactRecord>, ContactError> {
        let id = self.checked_id(id)?;
        self.fallback.delete(id).await
    }

    fn checked_id(&self, id: i64) -> Result<usize, ContactError> {
        usize::try_from(id).map_err(|_| ContactError::OutOfRange { id, len: self.fallback.len() })
    }

    pub fn fallback_contacts(&self) -> Vec<Contact> {
        self.fallback.list()
    }

    pub async fn list_all_contacts(&self) -> ContactListing {
        let directory = match self.directory.list_all().await {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!("Error fetching directory contacts: {}", e);
                Vec::new()
            }
        };
        ContactListing { directory, fallback: self.fallback.list() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::{DirectoryError, MatchStrategy, NoDirectory, StaticDirectory};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    fn kevin() -> ContactRecord {
        ContactRecord::new("Kevin Dai", "kevindai02@gmail.com")
    }

    fn resolver_with(dir: &TempDir, seed: Vec<ContactRecord>, directory: Box<dyn Directory>) -> Resolver {
        Resolver::new(JsonStore::in_dir(dir.path()), JsonStore::in_dir(dir.path()), seed, directory)
    }

    struct CountingDirectory {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Directory for CountingDirectory {
        async fn lookup(&self, _query: &str) -> Result<Option<Contact>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn list_all(&self) -> Result<Vec<Contact>, DirectoryError> {
            Ok(Vec::new())
        }
    }

    struct DownDirectory;

    #[async_trait]
    impl Directory for DownDirectory {
        async fn lookup(&self, _query: &str) -> Result<Option<Contact>, DirectoryError> {
            Err(DirectoryError::Timeout)
        }

        async fn list_all(&self) -> Result<Vec<Contact>, DirectoryError> {
            Err(DirectoryError::Status(503))
        }
    }

    #[tokio::test]
    async fn direct_email_short_circuits() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = resolver_with(&dir, vec![kevin()], Box::new(CountingDirectory { calls: Arc::clone(&calls) }));

        let contact = resolver.resolve_contact("kevindai02@gmail.com").await.unwrap();
        assert_eq!(contact, Contact::new("kevindai02@gmail.com", "kevindai02@gmail.com", ContactSource::DirectEmail));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn alias_then_cache() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(&dir, Vec::new(), Box::new(NoDirectory));
        resolver.add_alias("My Manager", "boss@example.com").await.unwrap();

        let first = resolver.resolve_contact("my manager").await.unwrap();
        assert_eq!((first.source, first.email.as_str()), (ContactSource::Alias, "boss@example.com"));

        let second = resolver.resolve_contact("  MY MANAGER ").await.unwrap();
        assert_eq!((second.source, second.email.as_str()), (ContactSource::Cache, "boss@example.com"));
    }

    #[tokio::test]
    async fn alias_update_is_never_served_stale() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(&dir, Vec::new(), Box::new(NoDirectory));
        resolver.add_alias("X", "y@z.com").await.unwrap();
        assert_eq!(resolver.resolve_contact("X").await.unwrap().email, "y@z.com");
        assert_eq!(resolver.resolve_contact("X").await.unwrap().source, ContactSource::Cache);

        resolver.add_alias("X", "w@z.com").await.unwrap();
        assert_eq!(resolver.resolve_contact("X").await.unwrap().email, "w@z.com");
    }

    #[tokio::test]
    async fn directory_beats_fallback() {
        let dir = tempdir().unwrap();
        let directory = StaticDirectory::new([("Kevin Directory", "kevin@corp.example.com")]);
        let resolver = resolver_with(&dir, vec![kevin()], Box::new(directory));

        let contact = resolver.resolve_contact("kevin").await.unwrap();
        assert_eq!(contact.source, ContactSource::Directory);
        assert_eq!(contact.email, "kevin@corp.example.com");
    }

    #[tokio::test]
    async fn directory_failure_is_a_miss() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(&dir, vec![kevin()], Box::new(DownDirectory));

        let contact = resolver.resolve_contact("kevin").await.unwrap();
        assert_eq!(contact.source, ContactSource::Fallback);
        assert_eq!(contact.id, Some(0));

        let listing = resolver.list_all_contacts().await;
        assert!(listing.directory.is_empty());
        assert_eq!(listing.fallback.len(), 1);
    }

    #[tokio::test]
    async fn fallback_substring_then_cache() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(&dir, vec![kevin()], Box::new(NoDirectory));

        let contact = resolver.resolve_contact("kevin").await.unwrap();
        assert_eq!((contact.source, contact.email.as_str()), (ContactSource::Fallback, "kevindai02@gmail.com"));
        assert_eq!(resolver.resolve_contact("Kevin").await.unwrap().source, ContactSource::Cache);
        assert_eq!(resolver.resolve_contact("kevin dai").await.unwrap().source, ContactSource::Cache);
    }

    #[tokio::test]
    async fn unknown_query_is_none() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(&dir, vec![kevin()], Box::new(NoDirectory));
        assert_eq!(resolver.resolve_contact("zelda").await, None);
        assert_eq!(resolver.resolve_contact("   ").await, None);
    }

    #[tokio::test]
    async fn fallback_edit_invalidates_cache() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(&dir, vec![kevin()], Box::new(NoDirectory));
        resolver.resolve_contact("kevin").await.unwrap();

        resolver.edit_fallback_contact(0, None, Some("kevin@new.example.com")).await.unwrap();
        let contact = resolver.resolve_contact("kevin").await.unwrap();
        assert_eq!((contact.source, contact.email.as_str()), (ContactSource::Fallback, "kevin@new.example.com"));
    }

    #[tokio::test]
    async fn negative_ids_are_out_of_range() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(&dir, vec![kevin()], Box::new(NoDirectory));
        assert_eq!(
            resolver.delete_fallback_contact(-1).await.unwrap_err(),
            ContactError::OutOfRange { id: -1, len: 1 }
        );
    }

    #[tokio::test]
    async fn name_to_email_uses_confident_cached_candidate() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(&dir, Vec::new(), Box::new(NoDirectory));
        resolver.cache().put(
            "jon",
            CacheEntry::Candidates(vec![
                Contact::new("Jon Low", "low@example.com", ContactSource::FuzzyFallback).with_score(60),
                Contact::new("Jon High", "high@example.com", ContactSource::FuzzyFallback).with_score(95),
            ]),
        );
        assert_eq!(resolver.resolve_name_to_email("jon").await, Some("high@example.com".into()));
    }

    #[tokio::test]
    async fn name_to_email_rejects_unconfident_candidate() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(&dir, Vec::new(), Box::new(NoDirectory));
        resolver.cache().put(
            "jon",
            CacheEntry::Candidates(vec![
                Contact::new("Jon Mid", "mid@example.com", ContactSource::FuzzyFallback).with_score(85),
            ]),
        );
        assert_eq!(resolver.resolve_name_to_email("jon").await, None);
    }

    #[tokio::test]
    async fn name_to_email_fuzzy_over_fallback() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(
            &dir,
            vec![ContactRecord::new("John Smith", "john@example.com")],
            Box::new(NoDirectory),
        );
        // No substring hit: the comma breaks containment, token sort still scores 100.
        assert_eq!(resolver.resolve_name_to_email("Smith, John").await, Some("john@example.com".into()));
        // "Jon Smyth" scores below the confident threshold.
        assert_eq!(resolver.resolve_name_to_email("Jon Smyth").await, None);
    }

    #[tokio::test]
    async fn substring_strategy_never_auto_resolves() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(
            &dir,
            vec![ContactRecord::new("John Smith", "john@example.com")],
            Box::new(NoDirectory),
        )
        .with_matcher(FuzzyMatcher::new(MatchStrategy::Substring));
        // Substring matches score 80, below the confident threshold.
        assert_eq!(resolver.resolve_name_to_email("John Smith Jr").await, None);
    }

    #[tokio::test]
    async fn search_caches_fuzzy_candidates() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(
            &dir,
            vec![ContactRecord::new("John Smith", "john@example.com"), ContactRecord::new("Jon Smyth", "jon@example.com")],
            Box::new(NoDirectory),
        );
        let results = resolver.search("Smith, John").await;
        assert_eq!(results[0].email, "john@example.com");
        assert_eq!(results[0].source, ContactSource::FuzzyFallback);
        assert!(matches!(resolver.cache().get("smith, john"), Some(CacheEntry::Candidates(_))));
    }

    #[tokio::test]
    async fn attendees_split_into_resolved_and_unresolved() {
        let dir = tempdir().unwrap();
        let resolver = resolver_with(&dir, vec![kevin()], Box::new(NoDirectory));
        resolver.add_alias("boss", "boss@example.com").await.unwrap();

        let names = vec!["boss".to_string(), "Kevin Dai".to_string(), "Nobody Known".to_string(), " ".to_string()];
        let resolution = resolver.resolve_attendees(&names).await;
        assert_eq!(
            resolution,
            AttendeeResolution {
                resolved: vec!["boss@example.com".into(), "kevindai02@gmail.com".into()],
                unresolved: vec!["Nobody Known".into()],
            }
        );
    }
}
