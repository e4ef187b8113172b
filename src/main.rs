//! beacond - Main entry point
//!
//! Resolves configuration, wires the MQTT transport into the lifecycle
//! controller, and translates SIGINT/SIGTERM into the shutdown sequence.
//! Exit codes: 0 on signal-triggered shutdown, 1 on configuration or
//! connection-setup failure.

use beacond::agent::{ControllerSettings, PresenceController};
use beacond::config::{Config, LogLevel};
use beacond::observability::{init_logging, LogFormat};
use beacond::protocol::{validate_node_id, NodeIdentity, TopicSet};
use beacond::transport::{MqttTransport, Transport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info};

/// MQTT presence and heartbeat agent
#[derive(Parser)]
#[command(name = "beacond")]
#[command(about = "MQTT presence and heartbeat agent for networked devices")]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML); environment variables take precedence
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the presence agent
    Run,
    /// Validate configuration
    Config {
        /// Show the resolved configuration (password redacted)
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Configuration failures are intentionally fatal: a supervising process
    // manager restarts us with corrected settings.
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(LogLevel::Info, LogFormat::from_env());
            error!(error = %e, "failed to resolve configuration");
            process::exit(1);
        }
    };

    init_logging(config.log_level, LogFormat::from_env());
    info!(version = env!("CARGO_PKG_VERSION"), "starting beacond");

    let result = match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        process::exit(1);
    }

    info!("shutdown complete");
}

async fn run_agent(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    validate_node_id(&config.node_id)?;

    let identity = NodeIdentity::from_config(&config);
    let topics = TopicSet::new(&config.topic_prefix, &config.node_id);
    info!(
        node_id = %identity.node_id,
        client_id = %identity.client_id,
        status_topic = %topics.status,
        heartbeat_topic = %topics.heartbeat,
        "node identity derived"
    );

    // Connection setup errors (e.g. an unparseable URL) are fatal; once the
    // event loop is running, broker outages are retried indefinitely.
    let mut transport = MqttTransport::new(&config, &identity, &topics)?;
    let events = transport.connect().await?;

    let settings = ControllerSettings::from_config(&config);
    let controller = PresenceController::new(identity, topics, settings, Arc::new(transport));

    let shutdown_rx = spawn_signal_listener()?;
    controller.run(events, shutdown_rx).await;

    Ok(())
}

/// Forward SIGINT and SIGTERM into the controller's shutdown channel. Both
/// signals, repeats included, feed the same channel; the controller handles
/// at most one shutdown sequence.
fn spawn_signal_listener() -> Result<mpsc::Receiver<()>, std::io::Error> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigint.recv() => info!("received SIGINT, shutting down gracefully"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down gracefully"),
            }
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

fn handle_config_command(config: Config, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Resolved configuration:");
        println!("{}", toml::to_string_pretty(&config.to_file_config())?);
    }

    info!("configuration validation complete");
    Ok(())
}
