use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use delivery::OutboxDeliverer;
use matcher::SqliteClientDirectory;
use permitflow::{CancelToken, Config, Engine, Scheduler};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "permitflow.yaml".to_string());
    let config = if Path::new(&config_path).exists() {
        match Config::from_yaml_file(&config_path) {
            Ok(config) => config,
            Err(err) => {
                error!(%config_path, error = %err, "could not load configuration");
                std::process::exit(1);
            }
        }
    } else {
        info!(%config_path, "no config file found; using defaults");
        Config::default()
    };

    if let Some(parent) = config.clients_db_path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                error!(error = %err, "could not create data directory");
                std::process::exit(1);
            }
        }
    }
    let directory = match SqliteClientDirectory::open(&config.clients_db_path) {
        Ok(directory) => Arc::new(directory),
        Err(err) => {
            error!(error = %err, "could not open client database");
            std::process::exit(1);
        }
    };

    let outbox = config
        .permits_db_path
        .parent()
        .map(|parent| parent.join("outbox"))
        .unwrap_or_else(|| PathBuf::from("outbox"));
    let deliverer = Arc::new(OutboxDeliverer::new(outbox));

    // City scrapers are deployment plugins registered by name; the stock
    // binary starts with none and sources report as unavailable until one
    // is wired in.
    let scrapers = HashMap::new();

    let engine = match Engine::new(config, directory, deliverer, scrapers) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            error!(error = %err, "engine initialization failed");
            std::process::exit(1);
        }
    };

    let scheduler = Scheduler::new(engine);
    let cancel = CancelToken::new();
    info!("permitflow started");

    tokio::select! {
        _ = scheduler.run(cancel.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            cancel.cancel();
        }
    }
}
