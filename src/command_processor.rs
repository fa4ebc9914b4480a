use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::tools::Toolbox;

/// Command line arguments structure
#[derive(Debug, Clone, PartialEq)]
pub struct CommandArgs {
    pub command: String,
    pub args: Vec<String>,
    pub flags: HashMap<String, Option<String>>,
    /// Input after the command word, untokenized. `call` reads its JSON payload from here.
    pub rest: String,
}

impl CommandArgs {
    pub fn parse(input: &str) -> Result<Self> {
        // Normalize non-breaking spaces so they split like ordinary ones
        let normalized_input = input.replace('\u{a0}', " ");
        let trimmed = normalized_input.trim();
        debug!("Normalized input: {}", trimmed);

        let mut parts = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut escaped = false;

        for c in trimmed.chars() {
            match c {
                '\\' if !escaped => {
                    escaped = true;
                }
                '"' if !escaped => {
                    in_quotes = !in_quotes;
                    if !in_quotes && !current.is_empty() {
                        parts.push(std::mem::take(&mut current));
                    }
                }
                c if c.is_whitespace() && !in_quotes && !escaped => {
                    if !current.is_empty() {
                        parts.push(std::mem::take(&mut current));
                    }
                }
                _ => {
                    if escaped && c != '"' {
                        current.push('\\');
                    }
                    current.push(c);
                    escaped = false;
                }
            }
        }
        if !current.is_empty() {
            parts.push(current);
        }

        if parts.is_empty() {
            return Err(anyhow!("No command provided"));
        }

        let command = parts.remove(0).to_lowercase();
        let rest = trimmed
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim().to_string())
            .unwrap_or_default();

        let mut args = Vec::new();
        let mut flags = HashMap::new();
        let mut i = 0;
        while i < parts.len() {
            if parts[i].starts_with("--") {
                let flag = parts[i].clone();
                if i + 1 < parts.len() && !parts[i + 1].starts_with("--") {
                    flags.insert(flag, Some(parts[i + 1].clone()));
                    i += 1;
                } else {
                    flags.insert(flag, None);
                }
            } else {
                args.push(parts[i].clone());
            }
            i += 1;
        }

        debug!("Parsed command: {:?}, args: {:?}, flags: {:?}", command, args, flags);
        Ok(CommandArgs { command, args, flags, rest })
    }

    fn joined_args(&self) -> String {
        self.args.join(" ")
    }

    fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).and_then(|v| v.as_deref())
    }
}

/// What the REPL should do with a processed line.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Output(Value),
    Text(String),
    Exit,
}

const HELP: &str = "\
Available commands:
  tools                                   List callable tools
  call <tool> [json params]               Call any tool with raw JSON params
  resolve <query>                         Resolve a name, alias or email
  email <name>                            Resolve a name to an email without guessing
  search <name>                           Search for matching contacts
  select <id>                             Pick a contact from the last search
  attendees <name> [name...]              Resolve several attendee names
  alias add <alias> <email>               Add or update a name alias
  alias delete <alias>                    Delete a name alias
  alias list                              List name aliases
  contacts add <name> <email>             Add a fallback contact
  contacts edit <id> [--name N] [--email E]
  contacts delete <id>                    Delete a fallback contact
  contacts list                           List directory and fallback contacts
  time                                    Show current time, date and timezone
  help                                    Show this help
  exit                                    Exit the application";

pub struct CommandProcessor {
    toolbox: Arc<Toolbox>,
    last_search: Mutex<Option<Value>>,
}

impl CommandProcessor {
    pub fn new(toolbox: Arc<Toolbox>) -> Self {
        Self { toolbox, last_search: Mutex::new(None) }
    }

    pub async fn process(&self, input: &str) -> Result<Outcome> {
        let args = CommandArgs::parse(input)?;
        self.execute(args).await
    }

    pub async fn execute(&self, args: CommandArgs) -> Result<Outcome> {
        info!("Executing command '{}' with arguments: {:?}", args.command, args.args);
        match args.command.as_str() {
            "tools" => Ok(Outcome::Output(json!(self.toolbox.list_tools()))),
            "call" => self.call_raw(&args).await,
            "resolve" => self.query_tool("resolve_contact", "query", &args, "resolve <query>").await,
            "email" => self.query_tool("resolve_name_to_email", "name", &args, "email <name>").await,
            "search" => self.search(&args).await,
            "select" => self.select(&args),
            "attendees" => {
                if args.args.is_empty() {
                    return Ok(usage("attendees <name> [name...]"));
                }
                self.call("resolve_attendees", json!({ "attendee_names": args.args })).await
            }
            "alias" | "aliases" => self.alias(&args).await,
            "contacts" | "contact" => self.contacts(&args).await,
            "time" => self.time().await,
            "help" | "--help" | "-h" => Ok(Outcome::Text(HELP.to_string())),
            "exit" | "quit" => Ok(Outcome::Exit),
            other => {
                warn!("Unrecognized command: {}", other);
                Ok(Outcome::Text("Unrecognized command. Type 'help' for a list of available commands.".to_string()))
            }
        }
    }

    async fn call(&self, tool: &str, params: Value) -> Result<Outcome> {
        let result = self.toolbox.call(tool, params).await?;
        Ok(Outcome::Output(result))
    }

    async fn call_raw(&self, args: &CommandArgs) -> Result<Outcome> {
        let (tool, payload) = match args.rest.split_once(char::is_whitespace) {
            Some((tool, payload)) => (tool, payload.trim()),
            None => (args.rest.as_str(), ""),
        };
        if tool.is_empty() {
            return Ok(usage("call <tool> [json params]"));
        }
        let params = if payload.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(payload).context("Params must be a JSON object")?
        };
        self.call(tool, params).await
    }

    async fn query_tool(&self, tool: &str, field: &str, args: &CommandArgs, usage_line: &str) -> Result<Outcome> {
        let query = args.joined_args();
        if query.is_empty() {
            return Ok(usage(usage_line));
        }
        self.call(tool, json!({ field: query })).await
    }

    async fn search(&self, args: &CommandArgs) -> Result<Outcome> {
        let name = args.joined_args();
        if name.is_empty() {
            return Ok(usage("search <name>"));
        }
        let result = self.toolbox.call("search_person", json!({ "name": name })).await?;
        if let Ok(mut last) = self.last_search.lock() {
            *last = Some(result.clone());
        }
        Ok(Outcome::Output(result))
    }

    fn select(&self, args: &CommandArgs) -> Result<Outcome> {
        let Some(id) = args.args.first() else {
            return Ok(usage("select <id>"));
        };
        let last = self.last_search.lock().ok().and_then(|guard| guard.clone());
        let Some(search_results) = last else {
            return Ok(Outcome::Text("Run 'search <name>' first.".to_string()));
        };
        let result = crate::tools::contacts::select_contact(
            self.toolbox.resolver(),
            crate::tools::contacts::SelectParams { contact_id: json!(id), search_results },
        );
        Ok(Outcome::Output(result))
    }

    async fn alias(&self, args: &CommandArgs) -> Result<Outcome> {
        match args.args.first().map(String::as_str) {
            Some("add") if args.args.len() >= 3 => {
                self.call("add_name_alias", json!({ "alias": args.args[1], "email": args.args[2] })).await
            }
            Some("delete") | Some("remove") if args.args.len() >= 2 => {
                self.call("delete_name_alias", json!({ "alias": args.args[1..].join(" ") })).await
            }
            Some("list") | None => self.call("list_name_aliases", Value::Null).await,
            _ => Ok(usage("alias add <alias> <email> | alias delete <alias> | alias list")),
        }
    }

    async fn contacts(&self, args: &CommandArgs) -> Result<Outcome> {
        match args.args.first().map(String::as_str) {
            Some("add") if args.args.len() >= 3 => {
                self.call("add_contact", json!({ "name": args.args[1], "email": args.args[2] })).await
            }
            Some("edit") if args.args.len() >= 2 => {
                let id = parse_id(&args.args[1])?;
                let mut params = json!({ "contact_id": id });
                if let Some(name) = args.flag("--name") {
                    params["new_name"] = json!(name);
                }
                if let Some(email) = args.flag("--email") {
                    params["new_email"] = json!(email);
                }
                self.call("edit_contact", params).await
            }
            Some("delete") | Some("remove") if args.args.len() >= 2 => {
                let id = parse_id(&args.args[1])?;
                self.call("delete_contact", json!({ "contact_id": id })).await
            }
            Some("list") | None => self.call("list_contacts", Value::Null).await,
            _ => Ok(usage(
                "contacts add <name> <email> | contacts edit <id> [--name N] [--email E] | contacts delete <id> | contacts list",
            )),
        }
    }

    async fn time(&self) -> Result<Outcome> {
        let time = self.toolbox.call("current_time", Value::Null).await?;
        let date = self.toolbox.call("current_date", Value::Null).await?;
        let timezone = self.toolbox.call("current_timezone", Value::Null).await?;
        Ok(Outcome::Output(json!({ "time": time, "date": date, "timezone": timezone })))
    }
}

fn usage(line: &str) -> Outcome {
    Outcome::Text(format!("Usage: {}", line))
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse::<i64>().with_context(|| format!("Invalid contact ID '{}'", raw))
}
