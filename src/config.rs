use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::contacts::{
    AliasTable, ContactList, ContactRecord, MatchStrategy, CONFIDENT_MATCH_THRESHOLD, DEFAULT_MATCH_LIMIT,
    FUZZY_MATCH_THRESHOLD,
};
use crate::env_manager;
use crate::state::Persistent;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub contacts: ContactsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the alias and contact files. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    pub aliases_file: String,
    pub contacts_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            aliases_file: AliasTable::filename().to_string(),
            contacts_file: ContactList::filename().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub strategy: MatchStrategy,
    pub threshold: u8,
    pub confident_threshold: u8,
    pub limit: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            strategy: MatchStrategy::TokenSort,
            threshold: FUZZY_MATCH_THRESHOLD,
            confident_threshold: CONFIDENT_MATCH_THRESHOLD,
            limit: DEFAULT_MATCH_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub enabled: bool,
    pub base_url: String,
    pub customer: String,
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://admin.googleapis.com/admin/directory/v1".to_string(),
            customer: "my_customer".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// IANA timezone name used by the time tools.
    pub timezone: String,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self { timezone: "America/New_York".to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactsConfig {
    /// Written to the fallback contacts file when it does not exist yet.
    pub seed: Vec<ContactRecord>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        // If config doesn't exist, create default
        if !config_path.exists() {
            let default_config = Config::default();
            default_config.save_to(config_path)?;
            return Ok(default_config);
        }

        // Read and parse config file
        let content = fs::read_to_string(config_path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Serialize and save config
        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Where the alias and fallback contact files live.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "mcp-tools", "mcp-tools").context("Failed to determine config directory")
}

pub fn get_config_path() -> Result<PathBuf> {
    if let Some(path) = env_manager::config_path_override() {
        return Ok(path);
    }
    Ok(project_dirs()?.config_dir().join("config.toml"))
}
