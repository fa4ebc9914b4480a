use std::sync::Arc;

use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::tempdir;
use test_case::test_case;

use mcp_tools::contacts::{ContactRecord, NoDirectory, Resolver};
use mcp_tools::state::JsonStore;
use mcp_tools::tools::{TimeTools, Toolbox, INVALID_PARAMS, METHOD_NOT_FOUND};

fn toolbox_at(aliases: JsonStore<mcp_tools::contacts::AliasTable>, contacts: JsonStore<mcp_tools::contacts::ContactList>) -> Toolbox {
    let resolver = Resolver::new(
        aliases,
        contacts,
        vec![ContactRecord::new("Kevin Dai", "kevindai02@gmail.com")],
        Box::new(NoDirectory),
    );
    Toolbox::new(Arc::new(resolver), TimeTools::from_name("America/New_York").unwrap())
}

#[tokio::test]
async fn alias_lifecycle_through_tools() -> Result<()> {
    let dir = tempdir()?;
    let tools = toolbox_at(JsonStore::in_dir(dir.path()), JsonStore::in_dir(dir.path()));

    let added = tools.call("add_name_alias", json!({ "alias": "My Manager", "email": "boss@example.com" })).await?;
    assert_eq!(added["status"], json!("success"));
    assert_eq!(added["saved_to_file"], json!(true));

    let again = tools.call("add_name_alias", json!({ "alias": "my manager", "email": "boss@example.com" })).await?;
    assert_eq!(again["status"], json!("info"));

    let updated = tools.call("add_name_alias", json!({ "alias": "my manager", "email": "new@example.com" })).await?;
    assert_eq!(updated["old_email"], json!("boss@example.com"));
    assert_eq!(updated["new_email"], json!("new@example.com"));

    let resolved = tools.call("resolve_contact", json!({ "query": "My Manager" })).await?;
    assert_eq!(resolved["contact"]["email"], json!("new@example.com"));

    let listed = tools.call("list_name_aliases", Value::Null).await?;
    assert_eq!(listed["count"], json!(1));

    let deleted = tools.call("delete_name_alias", json!({ "alias": "my manager" })).await?;
    assert_eq!(deleted["email"], json!("new@example.com"));
    let missing = tools.call("delete_name_alias", json!({ "alias": "my manager" })).await?;
    assert_eq!(missing["status"], json!("error"));
    Ok(())
}

#[test_case(json!({ "alias": "  ", "email": "a@b.com" }); "blank alias")]
#[test_case(json!({ "alias": "boss", "email": "not-an-address" }); "email without at sign")]
#[test_case(json!({ "alias": "boss", "email": "" }); "empty email")]
#[tokio::test]
async fn invalid_alias_input_is_an_error_result(params: Value) {
    let dir = tempdir().unwrap();
    let tools = toolbox_at(JsonStore::in_dir(dir.path()), JsonStore::in_dir(dir.path()));
    let result = tools.call("add_name_alias", params).await.unwrap();
    assert_eq!(result["status"], json!("error"));
    assert_eq!(tools.call("list_name_aliases", Value::Null).await.unwrap()["count"], json!(0));
}

#[tokio::test]
async fn failed_save_still_applies_in_memory() -> Result<()> {
    let dir = tempdir()?;
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory")?;
    let tools = toolbox_at(
        JsonStore::new(blocker.join("name-aliases.json")),
        JsonStore::new(blocker.join("fallback-contacts.json")),
    );

    let added = tools.call("add_name_alias", json!({ "alias": "boss", "email": "boss@example.com" })).await?;
    assert_eq!(added["status"], json!("warning"));
    assert_eq!(added["saved_to_file"], json!(false));
    assert!(added["message"].as_str().unwrap().contains("failed to save"));

    let repeated = tools.call("add_name_alias", json!({ "alias": "boss", "email": "boss@example.com" })).await?;
    assert_eq!(repeated["status"], json!("info"));
    assert_eq!(repeated["saved_to_file"], json!(false));

    let resolved = tools.call("resolve_name_to_email", json!({ "name": "boss" })).await?;
    assert_eq!(resolved["email"], json!("boss@example.com"));

    let contact = tools.call("add_contact", json!({ "name": "Ada Lovelace", "email": "ada@example.com" })).await?;
    assert_eq!(contact["saved_to_file"], json!(false));
    assert_eq!(contact["contact_id"], json!(1));
    Ok(())
}

#[tokio::test]
async fn contact_crud_through_tools() -> Result<()> {
    let dir = tempdir()?;
    let tools = toolbox_at(JsonStore::in_dir(dir.path()), JsonStore::in_dir(dir.path()));

    let added = tools.call("add_contact", json!({ "name": "Ada Lovelace", "email": "ada@example.com" })).await?;
    assert_eq!(added["contact_id"], json!(1));

    let edited = tools.call("edit_contact", json!({ "contact_id": 1, "new_name": "Ada King" })).await?;
    assert_eq!(edited["old_contact"]["name"], json!("Ada Lovelace"));
    assert_eq!(edited["updated_contact"], json!({ "name": "Ada King", "email": "ada@example.com" }));

    let out_of_range = tools.call("edit_contact", json!({ "contact_id": 5, "new_name": "X" })).await?;
    assert_eq!(out_of_range["status"], json!("error"));
    assert_eq!(out_of_range["message"], json!("Invalid contact ID: 5. Valid range is 0-1"));

    let deleted = tools.call("delete_contact", json!({ "contact_id": 0 })).await?;
    assert_eq!(deleted["deleted_contact"]["email"], json!("kevindai02@gmail.com"));

    let listing = tools.call("list_contacts", Value::Null).await?;
    assert_eq!(listing["total"], json!(1));
    assert_eq!(listing["fallback"][0]["name"], json!("Ada King"));
    Ok(())
}

#[test_case(json!({ "contact_id": 0, "new_name": "" }); "empty name")]
#[test_case(json!({ "contact_id": 0, "new_name": "   " }); "blank name")]
#[tokio::test]
async fn edit_contact_rejects_blank_name(params: Value) {
    let dir = tempdir().unwrap();
    let tools = toolbox_at(JsonStore::in_dir(dir.path()), JsonStore::in_dir(dir.path()));

    let result = tools.call("edit_contact", params).await.unwrap();
    assert_eq!(result["status"], json!("error"));
    assert_eq!(result["message"], json!("Please provide a contact name."));
    let listing = tools.call("list_contacts", Value::Null).await.unwrap();
    assert_eq!(listing["fallback"][0]["name"], json!("Kevin Dai"));
}

#[tokio::test]
async fn search_select_and_attendees() -> Result<()> {
    let dir = tempdir()?;
    let tools = toolbox_at(JsonStore::in_dir(dir.path()), JsonStore::in_dir(dir.path()));

    let empty = tools.call("search_person", json!({ "name": "  " })).await?;
    assert_eq!(empty["success"], json!(false));

    let found = tools.call("search_person", json!({ "name": "Dai, Kevin" })).await?;
    assert_eq!(found["contacts"][0]["id"], json!(1));
    assert_eq!(found["contacts"][0]["source"], json!("fuzzy_fallback"));

    let bad = tools.call("select_contact", json!({ "contact_id": 2, "search_results": found.clone() })).await?;
    assert_eq!(bad["success"], json!(false));
    let picked = tools.call("select_contact", json!({ "contact_id": "1", "search_results": found })).await?;
    assert_eq!(picked["contact"]["email"], json!("kevindai02@gmail.com"));

    let attendees =
        tools.call("resolve_attendees", json!({ "attendee_names": ["Kevin Dai", "ada@example.com", "Nobody"] })).await?;
    assert_eq!(attendees["resolved_attendees"], json!(["kevindai02@gmail.com", "ada@example.com"]));
    assert_eq!(attendees["unresolved_attendees"], json!(["Nobody"]));
    Ok(())
}

#[tokio::test]
async fn rpc_envelope_error_codes() -> Result<()> {
    let dir = tempdir()?;
    let tools = toolbox_at(JsonStore::in_dir(dir.path()), JsonStore::in_dir(dir.path()));

    let ok = tools
        .handle_json(r#"{"jsonrpc":"2.0","id":1,"method":"resolve_name_to_email","params":{"name":"kevin"}}"#)
        .await;
    assert_eq!(ok.result, Some(json!({ "name": "kevin", "email": "kevindai02@gmail.com" })));
    assert_eq!(ok.error, None);

    let unknown = tools.handle_json(r#"{"id":2,"method":"nope"}"#).await;
    assert_eq!(unknown.error.map(|e| e.code), Some(METHOD_NOT_FOUND));

    let invalid = tools.handle_json(r#"{"id":3,"method":"edit_contact","params":{"contact_id":"zero"}}"#).await;
    assert_eq!(invalid.error.map(|e| e.code), Some(INVALID_PARAMS));

    let time = tools.handle_json(r#"{"id":4,"method":"current_timezone"}"#).await;
    assert!(time.result.unwrap().as_str().unwrap().starts_with("America/New_York ("));
    Ok(())
}
