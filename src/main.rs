use std::sync::Arc;

use clap::Parser;
use supervisor::cli::Cli;
use supervisor::config::ConfigLoader;
use supervisor::infrastructure::logging;
use supervisor::infrastructure::state_store::{InMemoryStateStore, RedisStateStore};
use supervisor::ports::StateStore;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_dir = std::env::var("SUPERVISOR_CONFIG_DIR").map_or_else(|_| std::path::PathBuf::from("."), std::path::PathBuf::from);
    let config = match ConfigLoader::load(&config_dir) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };

    logging::init(&config.logging);

    let state_store: Arc<dyn StateStore> = if std::env::var("SUPERVISOR_EPHEMERAL").is_ok() {
        Arc::new(InMemoryStateStore::new())
    } else {
        match RedisStateStore::connect(&config.state_store).await {
            Ok(store) => Arc::new(store),
            Err(err) => {
                eprintln!("failed to connect to state store: {err}");
                std::process::exit(2);
            }
        }
    };

    match supervisor::cli::run(cli, config, state_store).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("fatal: {err}");
            std::process::exit(1);
        }
    }
}
