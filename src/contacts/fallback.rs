//! Locally stored fallback contacts, used when the directory has no answer.
//
// Contacts are addressed by position. Deleting index i shifts every later
// contact down by one, so an id is only meaningful against the snapshot it
// was read from.

use std::sync::{Arc, RwLock};

use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{Contact, ContactError, ContactRecord, ContactSource, ResolutionCache, Saved};
use crate::state::{JsonStore, Persistent, MAX_ITEMS};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactList(Vec<ContactRecord>);

impl ContactList {
    pub fn new(records: Vec<ContactRecord>) -> Self {
        Self(records)
    }

    pub fn records(&self) -> &[ContactRecord] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First contact whose name or email contains `query`, ignoring case.
    pub fn find_substring(&self, query: &str) -> Option<Contact> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        self.0.iter().enumerate().find_map(|(id, record)| {
            let hit = record.name.to_lowercase().contains(&query)
                || record.email.to_lowercase().contains(&query);
            hit.then(|| to_contact(id, record))
        })
    }

    pub fn to_contacts(&self) -> Vec<Contact> {
        self.0.iter().enumerate().map(|(id, record)| to_contact(id, record)).collect()
    }
}

impl Persistent for ContactList {
    fn filename() -> &'static str {
        "fallback-contacts.json"
    }

    fn item_count(&self) -> usize {
        self.len()
    }
}

fn to_contact(id: usize, record: &ContactRecord) -> Contact {
    Contact::new(record.name.clone(), record.email.clone(), ContactSource::Fallback).with_id(id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactEdit {
    pub old_contact: ContactRecord,
    pub updated_contact: ContactRecord,
}

pub struct FallbackStore {
    contacts: RwLock<Arc<ContactList>>,
    writer: Mutex<()>,
    file: JsonStore<ContactList>,
    cache: Arc<ResolutionCache>,
}

impl FallbackStore {
    /// Load contacts from `file`; a missing or corrupt file is reset to `seed`.
    pub fn open(file: JsonStore<ContactList>, seed: Vec<ContactRecord>, cache: Arc<ResolutionCache>) -> Self {
        let contacts = file.load_or(ContactList::new(seed));
        Self { contacts: RwLock::new(Arc::new(contacts)), writer: Mutex::new(()), file, cache }
    }

    pub fn snapshot(&self) -> Arc<ContactList> {
        match self.contacts.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list(&self) -> Vec<Contact> {
        self.snapshot().to_contacts()
    }

    pub fn find_substring(&self, query: &str) -> Option<Contact> {
        self.snapshot().find_substring(query)
    }

    /// Append a contact and return its positional id.
    pub async fn add(&self, name: &str, email: &str) -> Result<Saved<usize>, ContactError> {
        let _guard = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        if next.len() >= MAX_ITEMS {
            return Err(ContactError::StoreFull { kind: "contacts", limit: MAX_ITEMS });
        }
        next.0.push(ContactRecord::new(name, email));
        let id = next.len() - 1;
        let saved_to_file = self.commit(next);
        info!("Added fallback contact {}: {} <{}>", id, name, email);
        Ok(Saved { value: id, saved_to_file })
    }

    /// Replace the provided fields of the contact at `id`.
    pub async fn edit(
        &self,
        id: usize,
        new_name: Option<&str>,
        new_email: Option<&str>,
    ) -> Result<Saved<ContactEdit>, ContactError> {
        let _guard = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        let len = next.len();
        let record = next.0.get_mut(id).ok_or(ContactError::OutOfRange { id: id as i64, len })?;

        let old_contact = record.clone();
        if let Some(name) = new_name {
            record.name = name.to_string();
        }
        if let Some(email) = new_email {
            record.email = email.to_string();
        }
        let updated_contact = record.clone();

        let saved_to_file = self.commit(next);
        info!("Updated fallback contact {}: {:?} -> {:?}", id, old_contact, updated_contact);
        Ok(Saved { value: ContactEdit { old_contact, updated_contact }, saved_to_file })
    }

    /// Remove the contact at `id`; later contacts move down one position.
    pub async fn delete(&self, id: usize) -> Result<Saved<ContactRecord>, ContactError> {
        let _guard = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        if id >= next.len() {
            return Err(ContactError::OutOfRange { id: id as i64, len: next.len() });
        }
        let removed = next.0.remove(id);
        let saved_to_file = self.commit(next);
        info!("Deleted fallback contact {}: {} <{}>", id, removed.name, removed.email);
        Ok(Saved { value: removed, saved_to_file })
    }

    // Caller holds the writer lock.
    fn commit(&self, next: ContactList) -> bool {
        let saved = match self.file.save(&next) {
            Ok(()) => true,
            Err(e) => {
                error!("Error saving fallback contacts: {}", e);
                false
            }
        };
        match self.contacts.write() {
            Ok(mut guard) => *guard = Arc::new(next),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(next),
        }
        self.cache.clear();
        saved
    }
}
