//! Configuration types for camrec
//!
//! Provides capture presets, encoder settings and recording configuration.

mod file;

pub use file::{sample_config, ConfigFile};

use serde::{Deserialize, Serialize};

use crate::capture::PoolPolicy;
use crate::encode::{EncoderFormat, MIME_AVC, MIME_HEVC};
use crate::error::{CamrecError, Result};
use crate::types::ColorFormat;

/// Default number of frame slots in the image reader
pub const DEFAULT_POOL_CAPACITY: usize = 5;

/// Default I-frame interval in seconds
pub const DEFAULT_I_FRAME_INTERVAL: u32 = 5;

/// Default timeout for dequeuing an encoder input buffer (µs)
pub const DEFAULT_INPUT_TIMEOUT_US: i64 = 5_000;

/// Video codec for encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 / AVC (most compatible)
    #[default]
    H264,
    /// H.265 / HEVC (better compression)
    Hevc,
}

impl Codec {
    /// MIME type handed to the encoder factory
    pub fn mime(&self) -> &'static str {
        match self {
            Self::H264 => MIME_AVC,
            Self::Hevc => MIME_HEVC,
        }
    }

    /// Get the codec name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::H264 => "H.264",
            Self::Hevc => "HEVC",
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "h264" | "avc" | "264" => Ok(Self::H264),
            "hevc" | "h265" | "265" => Ok(Self::Hevc),
            _ => Err(format!("Unknown codec: {}", s)),
        }
    }
}

/// Container the recording is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// MPEG-4 (needs the `ffmpeg` feature)
    #[default]
    #[serde(alias = "mp4")]
    Mpeg4,
    /// Raw Annex-B elementary stream
    #[serde(rename = "raw", alias = "annexb")]
    H264AnnexB,
}

impl ContainerFormat {
    /// Usual file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mpeg4 => "mp4",
            Self::H264AnnexB => "h264",
        }
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mpeg4 => write!(f, "MPEG-4"),
            Self::H264AnnexB => write!(f, "Annex-B"),
        }
    }
}

impl std::str::FromStr for ContainerFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp4" | "mpeg4" => Ok(Self::Mpeg4),
            "raw" | "annexb" | "h264" | "264" => Ok(Self::H264AnnexB),
            _ => Err(format!("Unknown container: {}", s)),
        }
    }
}

/// Output resolution/framerate preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// 640x480 @ 15fps (default)
    #[default]
    #[serde(rename = "480p15")]
    P480_15,
    /// 1280x720 @ 30fps
    #[serde(rename = "720p30")]
    P720_30,
    /// 1920x1080 @ 30fps
    #[serde(rename = "1080p30")]
    P1080_30,
    /// Custom resolution/framerate
    Custom { width: u32, height: u32, fps: u32 },
}

impl Preset {
    /// Get width in pixels
    pub fn width(&self) -> u32 {
        match self {
            Self::P480_15 => 640,
            Self::P720_30 => 1280,
            Self::P1080_30 => 1920,
            Self::Custom { width, .. } => *width,
        }
    }

    /// Get height in pixels
    pub fn height(&self) -> u32 {
        match self {
            Self::P480_15 => 480,
            Self::P720_30 => 720,
            Self::P1080_30 => 1080,
            Self::Custom { height, .. } => *height,
        }
    }

    /// Get framerate
    pub fn fps(&self) -> u32 {
        match self {
            Self::P480_15 => 15,
            Self::P720_30 | Self::P1080_30 => 30,
            Self::Custom { fps, .. } => *fps,
        }
    }

    /// Get suggested bitrate in kbps
    pub fn suggested_bitrate(&self) -> u32 {
        match self {
            Self::P480_15 => 125,
            Self::P720_30 => 2500,
            Self::P1080_30 => 4500,
            Self::Custom { width, height, fps } => {
                // ~0.027 bits per pixel, the same ratio as 480p15 at 125 kbps
                let pixels_per_second = (*width as u64) * (*height as u64) * (*fps as u64);
                ((pixels_per_second * 27) / 1_000_000).max(1) as u32
            }
        }
    }

    /// Parse from string, returning Option instead of Result
    pub fn from_preset_str(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    /// Get resolution as (width, height) tuple
    pub fn resolution(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P480_15 => write!(f, "480p15"),
            Self::P720_30 => write!(f, "720p30"),
            Self::P1080_30 => write!(f, "1080p30"),
            Self::Custom { width, height, fps } => write!(f, "{}x{}@{}", width, height, fps),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "480p15" | "vga" => Ok(Self::P480_15),
            "720p30" => Ok(Self::P720_30),
            "1080p30" => Ok(Self::P1080_30),
            other => parse_custom(other).ok_or_else(|| format!("Unknown preset: {}", s)),
        }
    }
}

/// Parse `WIDTHxHEIGHT@FPS`
fn parse_custom(s: &str) -> Option<Preset> {
    let (size, fps) = s.split_once('@')?;
    let (width, height) = size.split_once('x')?;
    Some(Preset::Custom {
        width: width.trim().parse().ok()?,
        height: height.trim().parse().ok()?,
        fps: fps.trim().parse().ok()?,
    })
}

/// Complete recording configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Output preset (resolution/framerate)
    pub preset: Preset,
    /// Video codec
    pub codec: Codec,
    /// Bitrate in kbps (0 = auto)
    pub bitrate: u32,
    /// Seconds between key frames
    pub i_frame_interval: u32,
    /// Raw color format handed to the encoder
    pub color_format: ColorFormat,
    /// Output container
    pub container: ContainerFormat,
    /// Frame slots in the image reader
    pub pool_capacity: usize,
    /// Producer behavior when every slot is leased
    pub pool_policy: PoolPolicy,
    /// Encoder input dequeue timeout (µs)
    pub input_timeout_us: i64,
    /// Encoder output dequeue timeout (µs)
    pub output_timeout_us: i64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            preset: Preset::default(),
            codec: Codec::default(),
            bitrate: 0,
            i_frame_interval: DEFAULT_I_FRAME_INTERVAL,
            color_format: ColorFormat::default(),
            container: ContainerFormat::default(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            pool_policy: PoolPolicy::default(),
            input_timeout_us: DEFAULT_INPUT_TIMEOUT_US,
            output_timeout_us: 0,
        }
    }
}

impl RecordingConfig {
    /// Set the output preset
    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        self
    }

    /// Set the codec
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the bitrate in kbps
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Set the I-frame interval in seconds
    pub fn with_i_frame_interval(mut self, seconds: u32) -> Self {
        self.i_frame_interval = seconds;
        self
    }

    /// Set the output container
    pub fn with_container(mut self, container: ContainerFormat) -> Self {
        self.container = container;
        self
    }

    /// Set the image reader capacity and policy
    pub fn with_pool(mut self, capacity: usize, policy: PoolPolicy) -> Self {
        self.pool_capacity = capacity;
        self.pool_policy = policy;
        self
    }

    /// Get the effective bitrate in kbps (uses suggested if 0)
    pub fn effective_bitrate(&self) -> u32 {
        if self.bitrate > 0 {
            self.bitrate
        } else {
            self.preset.suggested_bitrate()
        }
    }

    /// Get output width
    pub fn width(&self) -> u32 {
        self.preset.width()
    }

    /// Get output height
    pub fn height(&self) -> u32 {
        self.preset.height()
    }

    /// Get output framerate
    pub fn fps(&self) -> u32 {
        self.preset.fps()
    }

    /// Encoder parameters derived from this configuration
    pub fn encoder_format(&self) -> EncoderFormat {
        EncoderFormat {
            mime: self.codec.mime().to_string(),
            width: self.width(),
            height: self.height(),
            bit_rate: self.effective_bitrate().saturating_mul(1000),
            frame_rate: self.fps(),
            i_frame_interval: self.i_frame_interval,
            color_format: self.color_format,
        }
    }

    /// Validate the configuration and return any warnings
    ///
    /// An empty list means the configuration looks good.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let effective = self.effective_bitrate();
        let suggested = self.preset.suggested_bitrate();
        if self.bitrate > 0 {
            if effective < suggested / 4 {
                warnings.push(format!(
                    "Bitrate {} kbps is very low for {} (suggested: {} kbps). Quality may suffer.",
                    effective, self.preset, suggested
                ));
            } else if effective > suggested * 10 {
                warnings.push(format!(
                    "Bitrate {} kbps is very high for {} (suggested: {} kbps).",
                    effective, self.preset, suggested
                ));
            }
        }

        if self.pool_capacity < 2 {
            warnings.push(
                "A frame pool with a single slot drops most frames while one is encoding."
                    .to_string(),
            );
        }

        if self.pool_policy == PoolPolicy::Block {
            warnings.push(
                "Blocking pool policy stalls the camera thread when the encoder falls behind."
                    .to_string(),
            );
        }

        if self.container == ContainerFormat::Mpeg4 && !cfg!(feature = "ffmpeg") {
            warnings.push("MPEG-4 output needs the 'ffmpeg' feature.".to_string());
        }

        warnings
    }

    /// Validate and return an error if configuration is invalid
    ///
    /// Unlike `validate()` which returns warnings, this returns hard errors
    /// for configurations that cannot work.
    pub fn validate_strict(&self) -> Result<()> {
        if self.width() == 0 || self.height() == 0 {
            return Err(CamrecError::config("Resolution cannot be zero"));
        }
        if self.width() % 2 != 0 || self.height() % 2 != 0 {
            return Err(CamrecError::config(format!(
                "Resolution {}x{} must be even for YUV 4:2:0",
                self.width(),
                self.height()
            )));
        }
        if self.fps() == 0 {
            return Err(CamrecError::config("Framerate cannot be zero"));
        }
        if self.width() > 7680 || self.height() > 4320 {
            return Err(CamrecError::config(format!(
                "Resolution {}x{} exceeds maximum supported (7680x4320)",
                self.width(),
                self.height()
            )));
        }
        if self.i_frame_interval == 0 {
            return Err(CamrecError::config("I-frame interval cannot be zero"));
        }
        if self.pool_capacity == 0 {
            return Err(CamrecError::config("Frame pool capacity cannot be zero"));
        }
        if self.input_timeout_us < 0 {
            return Err(CamrecError::config(
                "Input timeout must not block while the recorder lock is held",
            ));
        }
        if self.output_timeout_us < 0 {
            return Err(CamrecError::config(
                "Output timeout must not block while the recorder lock is held",
            ));
        }
        Ok(())
    }
}
