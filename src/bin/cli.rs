//! aus-emergency CLI
//!
//! Polls the configured incident feeds and prints lifecycle events as JSON
//! lines.

use std::path::PathBuf;
use std::sync::Arc;

use aus_emergency::{
    error::Result,
    models::Config,
    pipeline::{ChannelBus, Coordinator, Diagnostics, Event, EventType, Scheduler},
    storage::{LocalStorage, ReportStorage},
};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

/// aus-emergency - Australian emergency incident feed reconciler
#[derive(Parser, Debug)]
#[command(
    name = "aus-emergency",
    version,
    about = "Track Australian emergency incidents across agency feeds"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every feed on its schedule until interrupted
    Run {
        /// Write diagnostics.json and events.jsonl here
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Poll every feed once and print the aggregate summary
    Poll,

    /// Poll every feed once and print the diagnostics report
    Diagnostics,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging from the verbosity flag, else the configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Coordinator with every active feed registered, nothing polled yet.
async fn one_shot_coordinator(config: &Config) -> Result<Coordinator> {
    let coordinator = Coordinator::from_config(config, Arc::new(ChannelBus::new()));
    for (feed, adapter, interval) in Coordinator::adapters_from_config(config)? {
        coordinator.register(feed, adapter, interval).await;
    }
    Ok(coordinator)
}

async fn handle_event(event: &Event, storage: Option<&LocalStorage>, config: &Config, coordinator: &Coordinator) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => log::error!("Cannot print event: {}", e),
    }

    let Some(storage) = storage else {
        return;
    };
    if let Err(e) = storage.append_events(std::slice::from_ref(event)).await {
        log::error!("Failed to store event: {}", e);
    }
    if event.event_type == EventType::AggregateUpdated {
        let report = Diagnostics::collect(config, coordinator).await;
        if let Err(e) = storage.write_diagnostics(&report).await {
            log::error!("Failed to write diagnostics: {}", e);
        }
    }
}

async fn run(config: Config, output_dir: Option<PathBuf>) -> Result<()> {
    let bus = Arc::new(ChannelBus::new());
    let mut events = bus.subscribe();

    let coordinator = Arc::new(Coordinator::from_config(&config, bus));
    let scheduler = Scheduler::new(coordinator.clone());
    for (feed, adapter, interval) in Coordinator::adapters_from_config(&config)? {
        scheduler.schedule(feed, adapter, interval).await?;
    }

    let storage = output_dir.map(LocalStorage::new);
    if let Some(storage) = &storage {
        log::info!("Writing output to {}", storage.root_dir().display());
    }
    log::info!("Running; type 'refresh' to poll all feeds now, Ctrl-C to stop");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("Interrupted");
                break;
            }
            Some(event) = events.recv() => {
                handle_event(&event, storage.as_ref(), &config, &coordinator).await;
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().eq_ignore_ascii_case("refresh") => {
                    scheduler.force_refresh().await?;
                }
                Ok(Some(line)) if !line.trim().is_empty() => {
                    log::warn!("Unknown command: {}", line.trim());
                }
                Ok(Some(_)) => {}
                Ok(None) => stdin_open = false,
                Err(e) => {
                    log::warn!("stdin closed: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    scheduler.shutdown().await;
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    let config = match loaded {
        Ok(config) => {
            log::info!("Loaded configuration from {}", cli.config.display());
            config
        }
        Err(e) => {
            log::warn!(
                "Config load failed from {}: {}. Using defaults.",
                cli.config.display(),
                e
            );
            Config::default()
        }
    };

    match cli.command {
        Command::Run { output_dir } => {
            config.validate()?;
            run(config, output_dir).await?;
        }

        Command::Poll => {
            config.validate()?;
            let coordinator = one_shot_coordinator(&config).await?;
            coordinator.poll_all().await;

            let view = coordinator.aggregate().await;
            println!("{}", serde_json::to_string_pretty(&view.summary())?);
        }

        Command::Diagnostics => {
            config.validate()?;
            let coordinator = one_shot_coordinator(&config).await?;
            coordinator.poll_all().await;

            let report = Diagnostics::collect(&config, &coordinator).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            for feed in config.active_feeds() {
                log::info!("✓ {} ({}, {}) {}", feed.name, feed.kind, feed.region, feed.url);
            }
            log::info!("✓ {} zone(s)", config.zones.len());
            log::info!("All validations passed!");
        }
    }

    Ok(())
}
