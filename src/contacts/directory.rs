//! Remote directory collaborator.
//
// The resolver only needs "find one person" and "list everyone". Failures
// are reported as `DirectoryError` and the resolver treats them as misses.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{Contact, ContactSource};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory request timed out")]
    Timeout,
    #[error("Directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Directory returned HTTP {0}")]
    Status(u16),
    #[error("Invalid directory URL: {0}")]
    InvalidUrl(String),
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// At most one contact for `query`.
    async fn lookup(&self, query: &str) -> Result<Option<Contact>, DirectoryError>;

    async fn list_all(&self) -> Result<Vec<Contact>, DirectoryError>;
}

/// Used when no directory service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDirectory;

#[async_trait]
impl Directory for NoDirectory {
    async fn lookup(&self, _query: &str) -> Result<Option<Contact>, DirectoryError> {
        Ok(None)
    }

    async fn list_all(&self) -> Result<Vec<Contact>, DirectoryError> {
        Ok(Vec::new())
    }
}

/// Fixed in-memory directory.
///
/// Matches an exact email first, then any name word or email starting with
/// the query, mirroring a `name:q* OR email:q*` search.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    people: Vec<(String, String)>,
}

impl StaticDirectory {
    pub fn new<N, E>(people: impl IntoIterator<Item = (N, E)>) -> Self
    where
        N: Into<String>,
        E: Into<String>,
    {
        Self { people: people.into_iter().map(|(n, e)| (n.into(), e.into())).collect() }
    }

    fn contact(name: &str, email: &str) -> Contact {
        Contact::new(name, email, ContactSource::Directory)
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn lookup(&self, query: &str) -> Result<Option<Contact>, DirectoryError> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(None);
        }
        if let Some((name, email)) = self.people.iter().find(|(_, email)| email.to_lowercase() == query) {
            return Ok(Some(Self::contact(name, email)));
        }
        Ok(self
            .people
            .iter()
            .find(|(name, email)| {
                name.to_lowercase().starts_with(&query)
                    || name.split_whitespace().any(|word| word.to_lowercase().starts_with(&query))
                    || email.to_lowercase().starts_with(&query)
            })
            .map(|(name, email)| Self::contact(name, email)))
    }

    async fn list_all(&self) -> Result<Vec<Contact>, DirectoryError> {
        Ok(self.people.iter().map(|(name, email)| Self::contact(name, email)).collect())
    }
}

#[derive(Debug, Deserialize)]
struct UserName {
    #[serde(rename = "fullName")]
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryUser {
    #[serde(rename = "primaryEmail")]
    primary_email: Option<String>,
    name: Option<UserName>,
}

#[derive(Debug, Default, Deserialize)]
struct UserList {
    #[serde(default)]
    users: Vec<DirectoryUser>,
}

impl DirectoryUser {
    fn into_contact(self) -> Option<Contact> {
        let email = self.primary_email.filter(|e| !e.is_empty())?;
        let name = self.name.and_then(|n| n.full_name).unwrap_or_else(|| "Unknown".to_string());
        Some(Contact::new(name, email, ContactSource::Directory))
    }
}

/// Client for a Google Admin Directory style REST endpoint.
pub struct HttpDirectory {
    client: Client,
    base_url: Url,
    customer: String,
    token: SecretString,
}

impl HttpDirectory {
    pub fn new(
        base_url: &str,
        customer: &str,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(base_url).map_err(|e| DirectoryError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url, customer: customer.to_string(), token })
    }

    fn users_url(&self, user_key: Option<&str>) -> Result<Url, DirectoryError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| DirectoryError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().push("users");
            if let Some(key) = user_key {
                segments.push(key);
            }
        }
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, DirectoryError> {
        debug!("Directory request: {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(classify)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<T>().await.map_err(classify)?)),
            status => Err(DirectoryError::Status(status.as_u16())),
        }
    }
}

fn classify(e: reqwest::Error) -> DirectoryError {
    if e.is_timeout() {
        DirectoryError::Timeout
    } else {
        DirectoryError::Http(e)
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn lookup(&self, query: &str) -> Result<Option<Contact>, DirectoryError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        // Exact user key first; any non-success falls through to search.
        match self.get_json::<DirectoryUser>(self.users_url(Some(query))?, &[]).await {
            Ok(Some(user)) => {
                if let Some(contact) = user.into_contact() {
                    return Ok(Some(contact));
                }
            }
            Ok(None) | Err(DirectoryError::Status(_)) => {}
            Err(e) => return Err(e),
        }

        let search = format!("name:{q}* OR email:{q}*", q = query);
        let list = self
            .get_json::<UserList>(
                self.users_url(None)?,
                &[("customer", self.customer.as_str()), ("query", search.as_str()), ("maxResults", "1")],
            )
            .await?
            .unwrap_or_default();
        Ok(list.users.into_iter().find_map(DirectoryUser::into_contact))
    }

    async fn list_all(&self) -> Result<Vec<Contact>, DirectoryError> {
        let list = self
            .get_json::<UserList>(
                self.users_url(None)?,
                &[("customer", self.customer.as_str()), ("maxResults", "100"), ("orderBy", "email")],
            )
            .await?
            .unwrap_or_default();
        let contacts: Vec<Contact> = list.users.into_iter().filter_map(DirectoryUser::into_contact).collect();
        if contacts.is_empty() {
            warn!("Directory listing returned no users with an email address");
        }
        Ok(contacts)
    }
}
