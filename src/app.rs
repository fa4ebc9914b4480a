use crate::command_processor::{CommandProcessor, Outcome};
use crate::config::{Config, DirectoryConfig};
use crate::contacts::{Directory, FuzzyMatcher, HttpDirectory, NoDirectory, Resolver};
use crate::env_manager;
use crate::state::JsonStore;
use crate::tools::{TimeTools, Toolbox};
use anyhow::{anyhow, Context, Result};
use rustyline::DefaultEditor;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

pub struct Application {
    command_processor: CommandProcessor,
}

impl Application {
    /// Wire stores, matcher, directory and clock together from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let toolbox = build_toolbox(config)?;
        Ok(Self { command_processor: CommandProcessor::new(Arc::new(toolbox)) })
    }

    pub async fn run(&self) -> Result<()> {
        log::info!("Starting mcp-tools terminal");

        let mut rl = DefaultEditor::new()?;
        println!("Welcome to mcp-tools! Type 'help' for commands.");
        let prompt = "mcp> ";

        loop {
            match rl.readline(prompt) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line.as_str());
                    match self.command_processor.process(&line).await {
                        Ok(Outcome::Exit) => {
                            println!("Goodbye!");
                            break;
                        }
                        Ok(outcome) => print_outcome(&outcome),
                        Err(err) => {
                            log::error!("Failed to process command: {:?}", err);
                            println!("Error: {}", err);
                        }
                    }
                }
                Err(rustyline::error::ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(rustyline::error::ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    println!("Error: {:?}", err);
                    break;
                }
            }
        }

        Ok(())
    }
}

pub fn build_toolbox(config: &Config) -> Result<Toolbox> {
    build_toolbox_with_token(config, env_manager::directory_token())
}

/// Same as [`build_toolbox`], with the directory token supplied by the caller.
pub fn build_toolbox_with_token(config: &Config, directory_token: Option<SecretString>) -> Result<Toolbox> {
    let data_dir = config.data_dir()?;
    log::info!("Using data directory {}", data_dir.display());

    let matcher = FuzzyMatcher::new(config.matching.strategy)
        .threshold(config.matching.threshold)
        .limit(config.matching.limit);
    let resolver = Resolver::new(
        JsonStore::new(data_dir.join(&config.storage.aliases_file)),
        JsonStore::new(data_dir.join(&config.storage.contacts_file)),
        config.contacts.seed.clone(),
        build_directory(&config.directory, directory_token),
    )
    .with_matcher(matcher)
    .with_confident_threshold(config.matching.confident_threshold);

    let clock = TimeTools::from_name(&config.time.timezone)
        .map_err(|e| anyhow!(e))
        .context("Invalid [time] timezone in config")?;

    Ok(Toolbox::new(Arc::new(resolver), clock))
}

fn build_directory(config: &DirectoryConfig, token: Option<SecretString>) -> Box<dyn Directory> {
    if !config.enabled {
        log::info!("Directory lookups disabled");
        return Box::new(NoDirectory);
    }
    let Some(token) = token else {
        log::warn!(
            "Directory enabled but {} is not set; continuing without it",
            env_manager::DIRECTORY_TOKEN_VAR
        );
        return Box::new(NoDirectory);
    };
    match HttpDirectory::new(
        &config.base_url,
        &config.customer,
        token,
        Duration::from_secs(config.timeout_secs),
    ) {
        Ok(directory) => {
            log::info!("Using directory at {}", config.base_url);
            Box::new(directory)
        }
        Err(e) => {
            log::warn!("Could not set up directory client, continuing without it: {}", e);
            Box::new(NoDirectory)
        }
    }
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Output(value) => match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", value),
        },
        Outcome::Text(text) => println!("{}", text),
        Outcome::Exit => {}
    }
}
