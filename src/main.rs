use anyhow::Result;
use log::info;
use std::path::PathBuf;

use mcp_tools::env_manager;

#[tokio::main]
async fn main() -> Result<()> {
    mcp_tools::init_logger();
    env_manager::load_env_file();

    // Optional positional argument: path to config.toml
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    info!("Starting mcp-tools v{}", env!("CARGO_PKG_VERSION"));
    mcp_tools::run(config_path).await
}
