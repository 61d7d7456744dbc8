//! Preview command - stream the camera to a window

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use camrec_core::SurfaceId;
use clap::Args;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::{explain, load_config, synthetic_pipeline};

/// Arguments for the preview command
#[derive(Args)]
pub struct PreviewArgs {
    /// Stop after this many seconds (0 = until Ctrl+C)
    #[arg(short, long, default_value = "5")]
    duration: u64,

    /// Configuration file (defaults to the user config)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Run a preview until the duration elapses or Ctrl+C
pub async fn preview(args: PreviewArgs) -> Result<()> {
    let config = load_config(args.config)?;
    println!(
        "Previewing {}x{} @ {}fps\n",
        config.width(),
        config.height(),
        config.fps()
    );

    let mut pipeline = synthetic_pipeline(config, None)?;
    let mut events = pipeline.subscribe();

    pipeline.set_surface(SurfaceId(1)).map_err(explain)?;
    pipeline.open_camera().map_err(explain)?;

    let limit = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let elapsed = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            println!("\nReceived interrupt signal...");
        }
        _ = elapsed => {
            info!("Preview duration reached");
        }
        _ = async {
            loop {
                match events.recv().await {
                    Ok(event) => println!("  event: {}", event),
                    Err(RecvError::Lagged(n)) => warn!("Missed {} camera events", n),
                    Err(RecvError::Closed) => break,
                }
            }
        } => {}
    }

    pipeline.close_camera();
    println!("{}", pipeline.stats());
    pipeline.shutdown();

    println!("Preview stopped.");
    Ok(())
}
