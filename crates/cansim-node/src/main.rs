//! cansim - CAN vehicle network simulator
//!
//! Runs the configured nodes, the diagnostic tester and the bus monitor on
//! one bus until interrupted or until `--duration` elapses.
//!
//! # Usage
//!
//! Built-in engine/transmission/ABS vehicle on the virtual bus:
//! ```bash
//! ./cansim
//! ```
//!
//! Custom vehicle, events recorded as JSON lines:
//! ```bash
//! ./cansim --config vehicle.toml --events events.jsonl --duration 30
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cansim_core::{EventSink, FanoutSink, JsonLinesSink, TracingSink};
use cansim_node::{Vehicle, VehicleConfig};
use cansim_uds::{Bus, SocketCanConfig, TransportConfig};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cansim")]
#[command(about = "Simulated CAN vehicle network with fault code diagnostics")]
struct Args {
    /// Vehicle configuration file (TOML format)
    /// Without one, the built-in demo vehicle is used
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds (runs until Ctrl+C otherwise)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Append every simulation event to this file as JSON lines
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// Run on a SocketCAN interface instead of the configured transport
    #[arg(short, long)]
    interface: Option<String>,

    /// Seed for deterministic samples and injected failures
    #[arg(long)]
    seed: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.json_logs);

    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading vehicle config");
            VehicleConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => VehicleConfig::default(),
    };

    if let Some(interface) = &args.interface {
        config.transport = TransportConfig::SocketCan(SocketCanConfig {
            interface: interface.clone(),
            bitrate: config.transport.bitrate(),
        });
    }

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let mut sinks = FanoutSink::new().with(Arc::new(TracingSink));
    if let Some(path) = &args.events {
        let recorder = JsonLinesSink::open(path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;
        sinks = sinks.with(Arc::new(recorder));
    }
    let sink: Arc<dyn EventSink> = Arc::new(sinks);

    let bus = Bus::from_config(&config.transport).context("Failed to open bus")?;
    let vehicle = Vehicle::start(&config, &bus, sink, args.seed)
        .context("Failed to start vehicle")?;

    info!(vehicle = %vehicle.name(), nodes = vehicle.nodes().len(), "Simulation running");
    info!("Press Ctrl+C to stop");

    match args.duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "Duration elapsed, shutting down...")
                }
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, shutting down...");
        }
    }

    for status in vehicle.shutdown().await {
        info!(
            node = %status.node_id,
            state = %status.state,
            tx_errors = status.tx_errors,
            rx_errors = status.rx_errors,
            frames_sent = status.frames_sent,
            frames_received = status.frames_received,
            active_dtc = ?status.active_dtc.map(|code| code.to_string()),
            "Final node status"
        );
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "cansim=debug,cansim_node=debug,cansim_uds=debug,cansim_core=debug"
    } else {
        "cansim=info,cansim_node=info,cansim_uds=info,cansim_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
