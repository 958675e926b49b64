//! OBD-II Adapter Probe
//!
//! Command-line front end over `obd-protocol`: opens an adapter (or the
//! simulated one), runs a single operation and reports the result as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use obd_protocol::{LogSink, MockTransport, ObdClient, SerialTransport, Transport};
use obd_scheduler::LiveDataPoller;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod settings;

pub use settings::{load_settings, ProbeSettings};

#[derive(Debug, Parser)]
#[command(name = "obd-probe", version, about = "Talk to an ELM327 OBD-II adapter")]
pub struct Cli {
    /// TOML settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Serial device, overrides the settings file
    #[arg(long)]
    pub port: Option<String>,

    /// Baud rate, overrides the settings file
    #[arg(long)]
    pub baud: Option<u32>,

    /// Use a simulated adapter instead of a serial port
    #[arg(long)]
    pub mock: bool,

    /// Print the raw protocol exchange on stderr
    #[arg(long)]
    pub trace: bool,

    /// Log as JSON
    #[arg(long)]
    pub json: bool,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Check that the adapter answers `AT`
    Health,
    /// Reset the adapter and select automatic protocol detection
    Init,
    /// Read battery voltage
    Voltage,
    /// Read live data
    Live {
        /// Number of cycles to read
        #[arg(long, default_value_t = 1)]
        count: u64,
    },
    /// Read stored trouble codes
    Dtc,
    /// Clear stored trouble codes
    Clear,
}

/// Initialize logging on stderr, leaving stdout for results
pub fn init_logging(json: bool, verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("Failed to set tracing subscriber")
}

/// Build the client described by the command line and settings
///
/// Port and baud rate come from `settings`, with command-line overrides
/// already applied by [`run`].
pub fn connect(cli: &Cli, settings: &ProbeSettings) -> Result<ObdClient> {
    let transport: Arc<dyn Transport> = if cli.mock {
        info!("Using simulated adapter");
        Arc::new(MockTransport::healthy_vehicle())
    } else {
        let port = &settings.port;
        Arc::new(
            SerialTransport::open(port, settings.baud_rate)
                .with_context(|| format!("Failed to open adapter on {port}"))?,
        )
    };

    let mut client = ObdClient::new(transport, settings.obd.clone());
    if cli.trace {
        client = client.with_log_sink(LogSink::new(|line| eprintln!("obd> {line}")));
    }
    Ok(client)
}

/// Run one command and return its result
pub async fn execute(
    command: Command,
    client: &ObdClient,
    settings: &ProbeSettings,
) -> Result<Value> {
    let result = match command {
        Command::Health => {
            let responsive = client.ensure_adapter_responsive().await;
            json!({ "responsive": responsive })
        }
        Command::Init => {
            client.initialize().await?;
            json!({ "initialized": true })
        }
        Command::Voltage => {
            let voltage = client.fetch_voltage().await;
            json!({ "voltage": voltage })
        }
        Command::Live { count } => {
            let mut config = settings.poller.clone();
            config.max_cycles = Some(count);
            let poller = LiveDataPoller::new(config);

            let (tx, mut rx) = mpsc::channel(16);
            let (delivered, snapshots) = tokio::join!(poller.run(client, tx), async {
                let mut snapshots = Vec::new();
                while let Some(snapshot) = rx.recv().await {
                    snapshots.push(snapshot);
                }
                snapshots
            });
            info!("Collected {} live data snapshots", delivered);
            serde_json::to_value(snapshots)?
        }
        Command::Dtc => {
            let codes = client.get_dtc_codes().await;
            json!({ "codes": codes })
        }
        Command::Clear => {
            let cleared = client.clear_dtc_codes().await;
            json!({ "cleared": cleared })
        }
    };
    Ok(result)
}

/// Full program: settings, adapter, command
pub async fn run(cli: Cli) -> Result<Value> {
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(port) = &cli.port {
        settings.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        settings.baud_rate = baud;
    }

    let client = connect(&cli, &settings)?;
    execute(cli.command, &client, &settings).await
}
