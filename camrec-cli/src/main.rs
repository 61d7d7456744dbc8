//! Camrec CLI
//!
//! Camera preview and recording on top of the camrec pipeline.
//!
//! # Usage
//!
//! ```bash
//! # List cameras
//! camrec info
//!
//! # Preview for five seconds
//! camrec preview --duration 5
//!
//! # Record 150 frames of 720p30 into an MPEG-4 file
//! camrec record --output clip.mp4 --container mp4 --preset 720p30 --frames 150
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Camrec - camera capture, encode and mux
#[derive(Parser)]
#[command(name = "camrec")]
#[command(version)]
#[command(about = "Camera preview and recording", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cameras, codecs and containers
    Info(commands::InfoArgs),

    /// Stream the camera to a preview window
    Preview(commands::PreviewArgs),

    /// Record the camera into a file
    #[command(alias = "rec")]
    Record(commands::RecordArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("camrec={}", level).parse()?),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Info(args) => commands::info(args).await?,
        Commands::Preview(args) => commands::preview(args).await?,
        Commands::Record(args) => commands::record(args).await?,
        Commands::Config(args) => commands::config(args).await?,
    }

    Ok(())
}
