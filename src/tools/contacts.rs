//! Contact tools. Each returns a JSON object; store failures become
//! `"status": "error"` results rather than dispatch errors.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::contacts::{AliasChange, Contact, ContactError, ContactSource, Resolver};

fn status(saved_to_file: bool) -> &'static str {
    if saved_to_file {
        "success"
    } else {
        "warning"
    }
}

fn save_note(saved_to_file: bool) -> &'static str {
    if saved_to_file {
        ""
    } else {
        " but failed to save to file"
    }
}

fn error_result(err: &ContactError) -> Value {
    json!({ "status": "error", "message": err.to_string() })
}

fn invalid(message: &str) -> Value {
    json!({ "status": "error", "message": message })
}

fn looks_like_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.contains('@')
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    #[serde(alias = "name")]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub name: String,
}

pub async fn search_person(resolver: &Resolver, params: SearchParams) -> Value {
    let name = params.name.trim();
    if name.is_empty() {
        return json!({
            "success": false,
            "message": "Please provide a name to search for.",
            "contacts": [],
        });
    }

    let contacts = resolver.search(name).await;
    if contacts.is_empty() {
        return json!({
            "success": false,
            "message": format!("No contacts found matching '{}'.", name),
            "contacts": [],
        });
    }

    let formatted: Vec<Value> = contacts
        .iter()
        .enumerate()
        .map(|(i, contact)| {
            let mut entry = json!({
                "id": i + 1,
                "name": contact.name,
                "email": contact.email,
                "source": contact.source.as_str(),
            });
            if let Some(score) = contact.score {
                entry["score"] = json!(score);
            }
            entry
        })
        .collect();

    json!({
        "success": true,
        "message": format!("Found {} contacts matching '{}'.", formatted.len(), name),
        "contacts": formatted,
    })
}

#[derive(Debug, Deserialize)]
pub struct SelectParams {
    pub contact_id: Value,
    pub search_results: Value,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    contacts: Vec<SelectableContact>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct SelectableContact {
    #[serde(default)]
    id: Option<u64>,
    name: String,
    email: String,
    #[serde(default)]
    source: Option<String>,
}

fn selection_failure(message: &str) -> Value {
    json!({ "success": false, "message": message, "contact": null })
}

/// Pick entry `contact_id` (1-based) out of a previous `search_person` result.
pub fn select_contact(resolver: &Resolver, params: SelectParams) -> Value {
    let results: SearchResults = match serde_json::from_value(params.search_results) {
        Ok(results) => results,
        Err(_) => return selection_failure("No valid search results to select from."),
    };
    if !results.success {
        return selection_failure("No valid search results to select from.");
    }
    if results.contacts.is_empty() {
        return selection_failure("No contacts available to select from.");
    }

    let id = match &params.contact_id {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    let Some(id) = id else {
        return selection_failure("Invalid contact ID. Please provide a number.");
    };
    let count = results.contacts.len();
    if id < 1 || id as usize > count {
        return selection_failure(&format!(
            "Invalid contact ID. Please select a number between 1 and {}.",
            count
        ));
    }

    let selected = results.contacts[id as usize - 1].clone();
    resolver.remember(&Contact::new(selected.name.clone(), selected.email.clone(), ContactSource::Cache));
    json!({
        "success": true,
        "message": format!("Selected contact: {} ({})", selected.name, selected.email),
        "contact": selected,
    })
}

pub async fn resolve_contact(resolver: &Resolver, params: QueryParams) -> Value {
    match resolver.resolve_contact(&params.query).await {
        Some(contact) => json!({ "found": true, "contact": contact }),
        None => json!({
            "found": false,
            "message": format!("No contact found for '{}'.", params.query.trim()),
        }),
    }
}

pub async fn resolve_name_to_email(resolver: &Resolver, params: QueryParams) -> Value {
    let email = resolver.resolve_name_to_email(&params.query).await;
    json!({ "name": params.query.trim(), "email": email })
}

#[derive(Debug, Deserialize)]
pub struct AttendeeParams {
    #[serde(default)]
    pub attendee_names: Vec<String>,
}

pub async fn resolve_attendees(resolver: &Resolver, params: AttendeeParams) -> Value {
    let resolution = resolver.resolve_attendees(&params.attendee_names).await;
    let mut message = format!("Resolved {} attendee(s).", resolution.resolved.len());
    if !resolution.unresolved.is_empty() {
        message.push_str(&format!(
            " Note: {} attendee(s) could not be automatically resolved.",
            resolution.unresolved.len()
        ));
    }
    json!({
        "message": message,
        "resolved_attendees": resolution.resolved,
        "unresolved_attendees": resolution.unresolved,
    })
}

#[derive(Debug, Deserialize)]
pub struct AliasParams {
    pub alias: String,
    pub email: String,
}

pub async fn add_name_alias(resolver: &Resolver, params: AliasParams) -> Value {
    let alias = params.alias.trim();
    let email = params.email.trim();
    if alias.is_empty() {
        return invalid("Please provide a valid alias name.");
    }
    if !looks_like_email(email) {
        return invalid("Please provide a valid email address.");
    }

    match resolver.add_alias(alias, email).await {
        Ok(saved) => match saved.value {
            AliasChange::Unchanged => json!({
                "status": "info",
                "message": format!("Alias '{}' already exists for email {}", alias, email),
                "alias": alias,
                "email": email,
                "saved_to_file": saved.saved_to_file,
            }),
            AliasChange::Updated { old_email } => json!({
                "status": status(saved.saved_to_file),
                "message": format!(
                    "Updated alias '{}' from {} to {}{}",
                    alias,
                    old_email,
                    email,
                    save_note(saved.saved_to_file)
                ),
                "alias": alias,
                "old_email": old_email,
                "new_email": email,
                "saved_to_file": saved.saved_to_file,
            }),
            AliasChange::Added => json!({
                "status": status(saved.saved_to_file),
                "message": format!("Added new alias: '{}' -> {}{}", alias, email, save_note(saved.saved_to_file)),
                "alias": alias,
                "email": email,
                "saved_to_file": saved.saved_to_file,
            }),
        },
        Err(e) => error_result(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteAliasParams {
    pub alias: String,
}

pub async fn delete_name_alias(resolver: &Resolver, params: DeleteAliasParams) -> Value {
    let alias = params.alias.trim();
    match resolver.delete_alias(alias).await {
        Ok(saved) => json!({
            "status": status(saved.saved_to_file),
            "message": format!("Deleted alias: '{}' -> {}{}", alias, saved.value, save_note(saved.saved_to_file)),
            "alias": alias,
            "email": saved.value,
            "saved_to_file": saved.saved_to_file,
        }),
        Err(e) => error_result(&e),
    }
}

pub fn list_name_aliases(resolver: &Resolver) -> Value {
    let aliases = resolver.list_aliases();
    json!({ "count": aliases.len(), "aliases": aliases })
}

#[derive(Debug, Deserialize)]
pub struct AddContactParams {
    pub name: String,
    pub email: String,
}

pub async fn add_contact(resolver: &Resolver, params: AddContactParams) -> Value {
    let name = params.name.trim();
    let email = params.email.trim();
    if name.is_empty() {
        return invalid("Please provide a contact name.");
    }
    if !looks_like_email(email) {
        return invalid("Please provide a valid email address.");
    }

    match resolver.add_fallback_contact(name, email).await {
        Ok(saved) => json!({
            "status": status(saved.saved_to_file),
            "message": format!("Added new contact: {} <{}>{}", name, email, save_note(saved.saved_to_file)),
            "new_contact": { "name": name, "email": email },
            "contact_id": saved.value,
            "saved_to_file": saved.saved_to_file,
        }),
        Err(e) => error_result(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct EditContactParams {
    pub contact_id: i64,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub new_email: Option<String>,
}

pub async fn edit_contact(resolver: &Resolver, params: EditContactParams) -> Value {
    if let Some(name) = params.new_name.as_deref() {
        if name.trim().is_empty() {
            return invalid("Please provide a contact name.");
        }
    }
    if let Some(email) = params.new_email.as_deref() {
        if !looks_like_email(email) {
            return invalid("Please provide a valid email address.");
        }
    }
    let new_name = params.new_name.as_deref().map(str::trim);
    let new_email = params.new_email.as_deref().map(str::trim);

    match resolver.edit_fallback_contact(params.contact_id, new_name, new_email).await {
        Ok(saved) => json!({
            "status": status(saved.saved_to_file),
            "message": format!("Updated contact ID {}{}", params.contact_id, save_note(saved.saved_to_file)),
            "old_contact": saved.value.old_contact,
            "updated_contact": saved.value.updated_contact,
            "contact_id": params.contact_id,
            "saved_to_file": saved.saved_to_file,
        }),
        Err(e) => error_result(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteContactParams {
    pub contact_id: i64,
}

pub async fn delete_contact(resolver: &Resolver, params: DeleteContactParams) -> Value {
    match resolver.delete_fallback_contact(params.contact_id).await {
        Ok(saved) => json!({
            "status": status(saved.saved_to_file),
            "message": format!("Deleted contact ID {}{}", params.contact_id, save_note(saved.saved_to_file)),
            "deleted_contact": saved.value,
            "saved_to_file": saved.saved_to_file,
        }),
        Err(e) => error_result(&e),
    }
}

pub async fn list_contacts(resolver: &Resolver) -> Value {
    let listing = resolver.list_all_contacts().await;
    let total = listing.directory.len() + listing.fallback.len();
    json!({
        "directory": listing.directory,
        "fallback": listing.fallback,
        "total": total,
    })
}
