//! Beacon CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

use beacon_common::telemetry::LogFormat;

/// Beacon - compose BeaconAgent manifests into workloads
#[derive(Parser, Debug)]
#[command(name = "beacon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log line format (json or pretty)
    #[arg(long, global = true, env = "BEACON_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the workloads and objects for a BeaconAgent manifest
    Render(commands::render::RenderArgs),
    /// Print the BeaconAgent CustomResourceDefinition
    Crd(commands::crd::CrdArgs),
    /// List the registered features
    Features,
}

impl Cli {
    /// Run the CLI command
    pub fn run(self) -> anyhow::Result<()> {
        let mut stdout = std::io::stdout().lock();
        match self.command {
            Commands::Render(args) => commands::render::run(args, &mut stdout)?,
            Commands::Crd(args) => commands::crd::run(args, &mut stdout)?,
            Commands::Features => commands::features::run(&mut stdout)?,
        }
        Ok(())
    }
}
