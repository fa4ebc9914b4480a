pub mod app;
pub mod command_processor;
pub mod config;
pub mod contacts;
pub mod env_manager;
pub mod state;
pub mod tools;

use anyhow::Result;
use log::*;
use std::path::PathBuf;

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = match config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    let app = app::Application::from_config(&config)?;
    info!("Initializing mcp-tools application");
    app.run().await
}

/// Log to stderr at `info` unless `RUST_LOG` says otherwise.
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}

// Re-export commonly used types
pub use config::Config;
pub use contacts::{Contact, ContactSource, Resolver};
pub use tools::Toolbox;
