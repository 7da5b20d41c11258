//! Beacon CLI
//!
//! Renders BeaconAgent manifests offline through the composition engine.

use clap::Parser;

use beacon_cli::Cli;
use beacon_common::telemetry::{init_telemetry, TelemetryConfig};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        service_name: "beacon-cli".to_string(),
        format: cli.log_format,
        ..Default::default()
    })?;

    cli.run()
}
