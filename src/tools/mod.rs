//! Callable tools and their JSON-RPC shaped dispatch.

use std::sync::Arc;

use log::{debug, error, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::contacts::Resolver;

pub mod contacts;
mod time;

pub use time::TimeTools;

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Method '{0}' not found")]
    UnknownTool(String),
    #[error("Invalid params for '{tool}': {source}")]
    InvalidParams {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ToolError {
    pub fn code(&self) -> i64 {
        match self {
            ToolError::UnknownTool(_) => METHOD_NOT_FOUND,
            ToolError::InvalidParams { .. } => INVALID_PARAMS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [&'static str],
}

const fn tool(name: &'static str, description: &'static str, params: &'static [&'static str]) -> ToolInfo {
    ToolInfo { name, description, params }
}

pub const TOOLS: &[ToolInfo] = &[
    tool("search_person", "Search for a person by name, alias or email.", &["name"]),
    tool("select_contact", "Select a contact from previous search results by 1-based ID.", &["contact_id", "search_results"]),
    tool("resolve_contact", "Resolve a name, alias or email to a single contact.", &["query"]),
    tool("resolve_name_to_email", "Resolve a name to an email only when the match is unambiguous.", &["name"]),
    tool("resolve_attendees", "Resolve attendee names to emails, reporting the ones that could not be resolved.", &["attendee_names"]),
    tool("add_name_alias", "Add or update a personal alias for an email address.", &["alias", "email"]),
    tool("delete_name_alias", "Delete a personal alias.", &["alias"]),
    tool("list_name_aliases", "List all name aliases.", &[]),
    tool("add_contact", "Add a fallback contact.", &["name", "email"]),
    tool("edit_contact", "Edit a fallback contact by ID.", &["contact_id", "new_name?", "new_email?"]),
    tool("delete_contact", "Delete a fallback contact by ID.", &["contact_id"]),
    tool("list_contacts", "List directory and fallback contacts.", &[]),
    tool("current_time", "Get the current date and time.", &[]),
    tool("current_date", "Get the current date.", &[]),
    tool("current_timezone", "Get the configured timezone.", &[]),
];

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Value, code: i64, message: String) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(RpcError { code, message }) }
    }
}

pub struct Toolbox {
    resolver: Arc<Resolver>,
    clock: TimeTools,
}

fn parse<T: DeserializeOwned>(tool: &str, params: Value) -> Result<T, ToolError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|source| ToolError::InvalidParams { tool: tool.to_string(), source })
}

impl Toolbox {
    pub fn new(resolver: Arc<Resolver>, clock: TimeTools) -> Self {
        Self { resolver, clock }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn list_tools(&self) -> &'static [ToolInfo] {
        TOOLS
    }

    /// Run one tool. Domain failures are part of the returned JSON; only an
    /// unknown tool or malformed params are errors.
    pub async fn call(&self, name: &str, params: Value) -> Result<Value, ToolError> {
        debug!("Calling tool '{}' with {}", name, params);
        let resolver = self.resolver.as_ref();
        let result = match name {
            "search_person" => contacts::search_person(resolver, parse(name, params)?).await,
            "select_contact" => contacts::select_contact(resolver, parse(name, params)?),
            "resolve_contact" => contacts::resolve_contact(resolver, parse(name, params)?).await,
            "resolve_name_to_email" => contacts::resolve_name_to_email(resolver, parse(name, params)?).await,
            "resolve_attendees" => contacts::resolve_attendees(resolver, parse(name, params)?).await,
            "add_name_alias" => contacts::add_name_alias(resolver, parse(name, params)?).await,
            "delete_name_alias" => contacts::delete_name_alias(resolver, parse(name, params)?).await,
            "list_name_aliases" => contacts::list_name_aliases(resolver),
            "add_contact" => contacts::add_contact(resolver, parse(name, params)?).await,
            "edit_contact" => contacts::edit_contact(resolver, parse(name, params)?).await,
            "delete_contact" => contacts::delete_contact(resolver, parse(name, params)?).await,
            "list_contacts" => contacts::list_contacts(resolver).await,
            "current_time" => Value::String(self.clock.current_time()),
            "current_date" => Value::String(self.clock.current_date()),
            "current_timezone" => Value::String(self.clock.current_timezone()),
            _ => return Err(ToolError::UnknownTool(name.to_string())),
        };
        Ok(result)
    }

    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest { method, params, id } = request;
        match method.as_str() {
            "get_version" => RpcResponse::ok(
                id,
                json!({ "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") }),
            ),
            "list_tools" => RpcResponse::ok(id, json!(self.list_tools())),
            _ => match self.call(&method, params).await {
                Ok(result) => RpcResponse::ok(id, result),
                Err(e) => {
                    info!("RPC call '{}' rejected: {}", method, e);
                    RpcResponse::err(id, e.code(), e.to_string())
                }
            },
        }
    }

    /// Parse and dispatch a raw JSON-RPC request.
    pub async fn handle_json(&self, body: &str) -> RpcResponse {
        match serde_json::from_str::<RpcRequest>(body) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                error!("Error processing JSON-RPC request: {}", e);
                RpcResponse::err(Value::Null, PARSE_ERROR, "Parse error".to_string())
            }
        }
    }
}
