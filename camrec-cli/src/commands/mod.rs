//! CLI command implementations

mod config;
mod info;
mod preview;
mod record;

pub use config::{config, ConfigArgs};
pub use info::{info, InfoArgs};
pub use preview::{preview, PreviewArgs};
pub use record::{record, RecordArgs};

use anyhow::Result;
use camrec_core::synthetic::{
    SyntheticCamera, SyntheticCameraOptions, SyntheticEncoderFactory, SyntheticWindows,
};
use camrec_core::{CameraPipeline, CamrecError, RecordingConfig};

/// Build a pipeline over the software camera, windows and encoder
fn synthetic_pipeline(config: RecordingConfig, frame_limit: Option<u64>) -> Result<CameraPipeline> {
    let camera = SyntheticCamera::new(SyntheticCameraOptions {
        fps: config.fps(),
        frame_limit,
        ..Default::default()
    });
    let windows = SyntheticWindows::new(config.width(), config.height());

    let pipeline = CameraPipeline::builder()
        .with_camera(camera)
        .with_windows(windows)
        .with_encoders(SyntheticEncoderFactory::default())
        .with_config(config)
        .build()?;
    Ok(pipeline)
}

/// Turn a pipeline error into an anyhow error carrying its hint
fn explain(err: CamrecError) -> anyhow::Error {
    match err.user_hint() {
        Some(hint) => anyhow::anyhow!("{}\n  hint: {}", err, hint),
        None => anyhow::Error::new(err),
    }
}

/// Load the recording configuration from `path` or the default location
fn load_config(path: Option<std::path::PathBuf>) -> Result<RecordingConfig> {
    let file = match path {
        Some(path) => camrec_core::config::ConfigFile::load_from(path).map_err(explain)?,
        None => camrec_core::config::ConfigFile::load_or_default(),
    };
    file.to_recording_config().map_err(explain)
}
