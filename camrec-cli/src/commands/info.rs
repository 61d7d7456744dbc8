//! Info command - show cameras, codecs and containers

use anyhow::{Context, Result};
use camrec_core::capture::CameraBackend;
use camrec_core::config::{Codec, ContainerFormat, Preset};
use camrec_core::synthetic::{SyntheticCamera, SyntheticCameraOptions};
use camrec_core::types::CameraCharacteristics;
use clap::Args;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Number of synthetic cameras to enumerate
    #[arg(long, default_value = "1")]
    cameras: usize,

    /// Print camera details as JSON
    #[arg(long)]
    json: bool,
}

/// Show cameras and what the pipeline can produce
pub async fn info(args: InfoArgs) -> Result<()> {
    let mut camera = SyntheticCamera::new(SyntheticCameraOptions {
        camera_count: args.cameras,
        ..Default::default()
    });

    let ids = camera.camera_ids().context("Failed to enumerate cameras")?;
    let cameras = ids
        .iter()
        .map(|id| camera.characteristics(id))
        .collect::<camrec_core::Result<Vec<CameraCharacteristics>>>()
        .context("Failed to query camera characteristics")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&cameras)?);
        return Ok(());
    }

    println!("Camrec - System Information\n");

    println!("Cameras:");
    if cameras.is_empty() {
        println!("  No cameras found.");
    }
    for characteristics in &cameras {
        println!("  {}", characteristics);
        for (width, height) in &characteristics.output_sizes {
            println!("    - {}x{}", width, height);
        }
    }
    println!();

    println!("Codecs:");
    for codec in [Codec::H264, Codec::Hevc] {
        println!("  {:<8} {}", codec.display_name(), codec.mime());
    }
    println!();

    println!("Containers:");
    for container in [ContainerFormat::H264AnnexB, ContainerFormat::Mpeg4] {
        let available = match container {
            ContainerFormat::H264AnnexB => true,
            ContainerFormat::Mpeg4 => cfg!(feature = "ffmpeg"),
        };
        println!(
            "  {:<8} .{:<5} {}",
            container.to_string(),
            container.extension(),
            if available { "[OK]" } else { "[--] build with --features ffmpeg" }
        );
    }
    println!();

    println!("Presets:");
    for preset in [Preset::P480_15, Preset::P720_30, Preset::P1080_30] {
        println!(
            "  {:<8} {}x{} @ {}fps, {} kbps",
            preset.to_string(),
            preset.width(),
            preset.height(),
            preset.fps(),
            preset.suggested_bitrate()
        );
    }

    Ok(())
}
