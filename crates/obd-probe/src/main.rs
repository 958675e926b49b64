//! OBD-II Adapter Probe - Main Entry Point

use clap::Parser;
use obd_probe::{init_logging, run, Cli};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json, cli.verbose)?;

    info!("=== OBD Probe v{} ===", env!("CARGO_PKG_VERSION"));

    let result = run(cli).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
