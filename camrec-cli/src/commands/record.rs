//! Record command - encode the camera into a file

use std::fs::File;
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use camrec_core::config::{Codec, ContainerFormat, Preset};
use camrec_core::SurfaceId;
use clap::Args;
use tokio::signal;
use tracing::{info, warn};

use super::{explain, load_config, synthetic_pipeline};

/// Arguments for the record command
#[derive(Args)]
pub struct RecordArgs {
    /// Output file (defaults to recording.<container extension>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Container format (raw, mp4)
    #[arg(long)]
    container: Option<String>,

    /// Output preset (480p15, 720p30, 1080p30 or WxH@fps)
    #[arg(short, long)]
    preset: Option<String>,

    /// Video codec (h264, hevc)
    #[arg(short, long)]
    codec: Option<String>,

    /// Bitrate in kbps (0 = auto)
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// Stop after the camera delivered this many frames
    #[arg(short, long)]
    frames: Option<u64>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Configuration file (defaults to the user config)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Record until the frame count or duration is reached, or Ctrl+C
pub async fn record(args: RecordArgs) -> Result<()> {
    let mut config = load_config(args.config)?;

    if let Some(preset) = &args.preset {
        let preset: Preset = preset.parse().map_err(|e: String| {
            anyhow::anyhow!("{}. Valid options: 480p15, 720p30, 1080p30, WxH@fps", e)
        })?;
        config = config.with_preset(preset);
    }
    if let Some(codec) = &args.codec {
        let codec: Codec = codec.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        config = config.with_codec(codec);
    }
    if let Some(container) = &args.container {
        let container: ContainerFormat =
            container.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        config = config.with_container(container);
    }
    if let Some(bitrate) = args.bitrate {
        config = config.with_bitrate(bitrate);
    }
    config.validate_strict().map_err(explain)?;

    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("recording.{}", config.container.extension())));

    println!("Configuration:");
    println!("  Preset:      {}", config.preset);
    println!("  Resolution:  {}x{}", config.width(), config.height());
    println!("  Framerate:   {} fps", config.fps());
    println!("  Codec:       {}", config.codec);
    println!("  Bitrate:     {} kbps", config.effective_bitrate());
    println!("  Container:   {}", config.container);
    println!("  Output:      {}", path.display());
    println!();

    let file = File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut pipeline = synthetic_pipeline(config, args.frames)?;
    pipeline
        .start_recording(file.as_fd(), SurfaceId(1))
        .map_err(explain)?;
    // The pipeline writes through its own duplicate
    drop(file);

    println!("Recording... press Ctrl+C to stop\n");

    {
        let frames_done = async {
            let Some(frames) = args.frames else {
                return std::future::pending().await;
            };
            loop {
                let stats = pipeline.stats();
                if stats.frames_encoded + stats.frames_dropped + stats.frames_skipped >= frames {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        let elapsed = async {
            match args.duration {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
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
            _ = frames_done => info!("Frame count reached"),
            _ = elapsed => info!("Duration reached"),
        }
    }

    println!("Stopping recording...");
    let summary = pipeline.stop_recording().map_err(explain)?;
    pipeline.shutdown();

    match summary {
        Some(summary) => {
            println!("Recorded {}", summary);
            if !summary.finalized {
                anyhow::bail!("{} was not finalized", path.display());
            }
        }
        None => println!("Nothing was recorded."),
    }

    Ok(())
}
