//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! This binary reads `CommandEnvelope` messages as newline-delimited JSON
//! from stdin, dispatches them to the update service, and writes
//! `ResponseEnvelope` and `EventEnvelope` messages to stdout. Background
//! checks run while the bridge is up.
//!
//! The config file is taken from `UPDRAFT_CONFIG`, falling back to the
//! default location. All tracing output goes to stderr so that stdout
//! remains a clean JSON protocol channel.

use std::path::PathBuf;
use std::sync::Arc;
use updraft::host::handler::UpdateCommandHandler;
use updraft::host::stdio::run_stdio_bridge;
use updraft::settings::JsonFileStore;
use updraft::{EventSink, UpdateService, Updater, UpdaterConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("updraft=info")),
        )
        .init();

    tracing::info!("updraft-host starting");

    let path = std::env::var_os("UPDRAFT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(UpdaterConfig::default_config_path);
    let config = if path.exists() {
        UpdaterConfig::from_file(&path)?
    } else {
        UpdaterConfig::default()
    };
    config.validate()?;

    let (events, rx) = EventSink::channel();
    let updater = Updater::builder_from_config(&config)?.events(events).build()?;
    let store = Arc::new(JsonFileStore::open(config.settings_path()));
    let service = Arc::new(UpdateService::from_config(updater, store, &config));
    service.start_background_checks();

    run_stdio_bridge(UpdateCommandHandler::new(Arc::clone(&service)), rx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "updraft-host exited with error");
            anyhow::anyhow!("updraft-host failed: {e}")
        })?;

    service.stop_background_checks();
    tracing::info!("updraft-host shut down cleanly");
    Ok(())
}
