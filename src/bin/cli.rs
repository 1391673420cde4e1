//! CLI binary for updraft.

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use updraft::host::handler::UpdateCommandHandler;
use updraft::host::stdio::run_stdio_bridge;
use updraft::settings::{JsonFileStore, SettingsPatch};
use updraft::{EventSink, UpdateEvent, UpdateService, Updater, UpdaterConfig};

/// Updraft: check for, download and install application updates.
#[derive(Parser)]
#[command(name = "updraft", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Check whether a newer release exists.
    Check,

    /// Check, then download the newer release if there is one.
    Download {
        /// Install the update once the download finishes.
        #[arg(long)]
        install: bool,
    },

    /// Show or change the background check settings.
    Settings(SettingsArgs),

    /// Serve the JSON command bridge on stdin/stdout.
    Bridge,

    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct SettingsArgs {
    /// Turn background checks on.
    #[arg(long, conflicts_with = "disable")]
    enable: bool,

    /// Turn background checks off.
    #[arg(long)]
    disable: bool,

    /// Hours between background checks.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    interval: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so the bridge keeps stdout for JSON.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("updraft=info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(UpdaterConfig::default_config_path);

    let config = if config_path.exists() {
        UpdaterConfig::from_file(&config_path)?
    } else {
        UpdaterConfig::default()
    };

    match cli.command.unwrap_or(Command::Check) {
        Command::InitConfig { force } => init_config(&config_path, force),
        Command::Check => run_check(&config).await,
        Command::Download { install } => run_download(&config, install).await,
        Command::Settings(args) => run_settings(&config, args),
        Command::Bridge => run_bridge(&config).await,
    }
}

fn init_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    UpdaterConfig::default().save_to_file(path)?;
    println!("wrote {}", path.display());
    Ok(())
}

fn build_service(
    config: &UpdaterConfig,
    events: EventSink,
) -> anyhow::Result<UpdateService> {
    config.validate()?;
    let updater = Updater::builder_from_config(config)?.events(events).build()?;
    let store = Arc::new(JsonFileStore::open(config.settings_path()));
    Ok(UpdateService::from_config(updater, store, config))
}

fn download_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
    ) {
        pb.set_style(style);
    }
    pb.set_message("Downloading");
    pb
}

/// Print events as human-readable lines until the channel closes.
fn spawn_printer(mut rx: mpsc::UnboundedReceiver<UpdateEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;
        while let Some(event) = rx.recv().await {
            match event {
                UpdateEvent::CheckingForUpdate => println!("Checking for updates..."),
                UpdateEvent::UpdateAvailable {
                    version,
                    release_name,
                    release_notes,
                    ..
                } => {
                    println!(
                        "Update available: {version}{}",
                        release_name.map(|n| format!(" ({n})")).unwrap_or_default()
                    );
                    if let Some(notes) = release_notes {
                        println!("\n{notes}\n");
                    }
                }
                UpdateEvent::UpdateNotAvailable { version, dev_mode } => {
                    if dev_mode {
                        println!("Development build {version}: update checks are disabled.");
                    } else {
                        println!("{version} is the latest version.");
                    }
                }
                UpdateEvent::DownloadProgress(p) => {
                    let pb = bar.get_or_insert_with(|| download_bar(p.total));
                    if p.total > 0 {
                        pb.set_length(p.total);
                    }
                    pb.set_position(p.transferred);
                }
                UpdateEvent::UpdateDownloaded { artifact_path, .. } => {
                    if let Some(pb) = bar.take() {
                        pb.finish_with_message("Downloaded");
                    }
                    println!("Downloaded to {}", artifact_path.display());
                }
                UpdateEvent::UpdateError { message, .. } => {
                    if let Some(pb) = bar.take() {
                        pb.abandon();
                    }
                    eprintln!("Update failed: {message}");
                }
                UpdateEvent::UpdateAvailableSilent { version, .. } => {
                    println!("Update available: {version}");
                }
            }
        }
    })
}

async fn run_check(config: &UpdaterConfig) -> anyhow::Result<()> {
    let (events, rx) = EventSink::channel();
    let printer = spawn_printer(rx);
    let service = build_service(config, events)?;

    let response = service.check_for_updates().await;
    drop(service);
    let _ = printer.await;

    if let Some(error) = response.error {
        anyhow::bail!(error);
    }
    Ok(())
}

async fn run_download(config: &UpdaterConfig, install: bool) -> anyhow::Result<()> {
    let (events, rx) = EventSink::channel();
    let printer = spawn_printer(rx);
    let service = build_service(config, events)?;

    let check = service.check_for_updates().await;
    if let Some(error) = check.error {
        anyhow::bail!(error);
    }
    if check.update_info.is_none() {
        return Ok(());
    }

    let updater = service.updater().clone();
    let cancel_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, cancelling download...");
            let _ = updater.cancel_download();
        }
    });

    let download = service.download_update().await;
    cancel_handle.abort();
    if let Some(error) = download.error {
        anyhow::bail!(error);
    }

    if install {
        let response = service.install_update().await;
        if let Some(error) = response.error {
            anyhow::bail!(error);
        }
    } else {
        println!("Run `updraft download --install` to install it.");
    }

    drop(service);
    let _ = printer.await;
    Ok(())
}

fn run_settings(config: &UpdaterConfig, args: SettingsArgs) -> anyhow::Result<()> {
    let store = JsonFileStore::open(config.settings_path());
    let enabled = match (args.enable, args.disable) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };

    let settings = if enabled.is_some() || args.interval.is_some() {
        updraft::settings::AutoCheckSettings::apply(
            &store,
            SettingsPatch {
                enabled,
                interval_hours: args.interval,
            },
        )?
    } else {
        updraft::settings::AutoCheckSettings::load(&store)
    };

    println!(
        "Background checks: {} (every {}h)",
        if settings.enabled { "on" } else { "off" },
        settings.interval_hours
    );
    println!("Stored in {}", store.path().display());
    Ok(())
}

async fn run_bridge(config: &UpdaterConfig) -> anyhow::Result<()> {
    info!("updraft bridge starting");
    let (events, rx) = EventSink::channel();
    let service = Arc::new(build_service(config, events)?);
    let status = service.start_background_checks();
    info!("background checks: {status:?}");

    run_stdio_bridge(UpdateCommandHandler::new(Arc::clone(&service)), rx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "bridge exited with error");
            anyhow::anyhow!("bridge failed: {e}")
        })?;

    service.stop_background_checks();
    info!("updraft bridge shut down cleanly");
    Ok(())
}
