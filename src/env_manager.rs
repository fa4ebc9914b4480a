use log::{info, warn};
use secrecy::SecretString;
use std::env;
use std::path::PathBuf;

/// Bearer token for the directory service.
pub const DIRECTORY_TOKEN_VAR: &str = "MCP_TOOLS_DIRECTORY_TOKEN";
/// Overrides the location of `config.toml`.
pub const CONFIG_PATH_VAR: &str = "MCP_TOOLS_CONFIG";

pub fn load_env_file() {
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) if e.not_found() => info!("No .env file found"),
        Err(e) => warn!("Error loading .env file: {}", e),
    }
}

pub fn config_path_override() -> Option<PathBuf> {
    non_empty_var(CONFIG_PATH_VAR).map(PathBuf::from)
}

pub fn directory_token() -> Option<SecretString> {
    non_empty_var(DIRECTORY_TOKEN_VAR).map(SecretString::from)
}

fn non_empty_var(name: &str) -> Option<String> {
    non_empty(env::var(name).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|val| val.trim().to_string()).filter(|val| !val.is_empty())
}
