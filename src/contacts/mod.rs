//! Contact resolution for the tool layer.
//
// A free-form query (name, alias or email) is resolved to an address by
// walking, in order: literal email syntax, the resolution cache, the alias
// table, the remote directory and the local fallback contact list.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

mod aliases;
mod cache;
mod directory;
mod fallback;
mod fuzzy;
mod resolver;

pub use aliases::*;
pub use cache::*;
pub use directory::*;
pub use fallback::*;
pub use fuzzy::*;
pub use resolver::*;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern is a valid regex")
});

/// Where a resolved contact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    DirectEmail,
    Cache,
    Alias,
    Directory,
    Fallback,
    FuzzyFallback,
}

impl ContactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactSource::DirectEmail => "direct_email",
            ContactSource::Cache => "cache",
            ContactSource::Alias => "alias",
            ContactSource::Directory => "directory",
            ContactSource::Fallback => "fallback",
            ContactSource::FuzzyFallback => "fuzzy_fallback",
        }
    }
}

/// A resolved contact. Values are built once and handed out by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub source: ContactSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    /// Positional id inside the fallback list, valid only for the snapshot it came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
}

impl Contact {
    pub fn new(name: impl Into<String>, email: impl Into<String>, source: ContactSource) -> Self {
        Self { name: name.into(), email: email.into(), source, score: None, id: None }
    }

    pub fn with_score(mut self, score: u8) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = Some(id);
        self
    }
}

/// A stored fallback contact as it appears on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl ContactRecord {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self { name: name.into(), email: email.into() }
    }
}

/// Recoverable contact-store failures. Callers turn these into structured results.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContactError {
    #[error("Alias '{0}' not found")]
    AliasNotFound(String),
    #[error("Invalid contact ID: {id}. Valid range is 0-{}", .len.saturating_sub(1))]
    OutOfRange { id: i64, len: usize },
    #[error("{0}")]
    InvalidInput(String),
    #[error("Cannot store more than {limit} {kind}")]
    StoreFull { kind: &'static str, limit: usize },
}

/// Result of a store mutation: the in-memory change always applies, the file write may not.
#[derive(Debug, Clone, PartialEq)]
pub struct Saved<T> {
    pub value: T,
    pub saved_to_file: bool,
}

/// Trim and lowercase a query so that cache and alias keys compare equal.
pub fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Standard `local@domain.tld` syntax with a TLD of at least two letters.
pub fn is_email(query: &str) -> bool {
    EMAIL_PATTERN.is_match(query)
}
