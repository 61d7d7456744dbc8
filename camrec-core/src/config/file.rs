//! Configuration file loading
//!
//! Loads user configuration from `~/.config/camrec/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{
    Codec, ContainerFormat, Preset, RecordingConfig, DEFAULT_I_FRAME_INTERVAL,
    DEFAULT_INPUT_TIMEOUT_US, DEFAULT_POOL_CAPACITY,
};
use crate::capture::PoolPolicy;
use crate::error::{CamrecError, Result};
use crate::types::ColorFormat;

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Recording settings
    #[serde(default)]
    pub recording: RecordingSettings,

    /// Encoder settings
    #[serde(default)]
    pub encoder: EncoderSettings,

    /// Frame pool settings
    #[serde(default)]
    pub pool: PoolSettings,
}

/// Default recording settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    /// Output preset (e.g., "480p15" or "800x600@20")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Codec (h264, hevc)
    #[serde(default = "default_codec")]
    pub codec: String,

    /// Bitrate in kbps (0 = auto)
    #[serde(default)]
    pub bitrate: u32,

    /// Seconds between key frames
    #[serde(default = "default_i_frame_interval")]
    pub i_frame_interval: u32,

    /// Container (raw, mp4)
    #[serde(default = "default_container")]
    pub container: String,
}

/// Encoder-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Raw color format (flexible, i420, nv12)
    #[serde(default = "default_color_format")]
    pub color_format: String,

    /// Input dequeue timeout in microseconds (0 = poll)
    #[serde(default = "default_input_timeout")]
    pub input_timeout_us: i64,

    /// Output dequeue timeout in microseconds
    #[serde(default)]
    pub output_timeout_us: i64,
}

/// Frame pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Number of frame slots
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Behavior when every slot is leased (block, reject)
    #[serde(default)]
    pub policy: PoolPolicy,
}

// Default value functions
fn default_preset() -> String {
    "480p15".to_string()
}

fn default_codec() -> String {
    "h264".to_string()
}

fn default_i_frame_interval() -> u32 {
    DEFAULT_I_FRAME_INTERVAL
}

fn default_container() -> String {
    "mp4".to_string()
}

fn default_color_format() -> String {
    "flexible".to_string()
}

fn default_input_timeout() -> i64 {
    DEFAULT_INPUT_TIMEOUT_US
}

fn default_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            codec: default_codec(),
            bitrate: 0,
            i_frame_interval: default_i_frame_interval(),
            container: default_container(),
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            color_format: default_color_format(),
            input_timeout_us: default_input_timeout(),
            output_timeout_us: 0,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            policy: PoolPolicy::default(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("camrec").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("camrec")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/camrec/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| CamrecError::config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| CamrecError::config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CamrecError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CamrecError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| CamrecError::config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Create a default config file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_path();
        if path.exists() {
            return Ok(false);
        }

        Self::default().save_to(path)?;
        Ok(true)
    }

    /// Resolve the string settings into a [`RecordingConfig`]
    pub fn to_recording_config(&self) -> Result<RecordingConfig> {
        let preset: Preset = self.recording.preset.parse().map_err(CamrecError::config)?;
        let codec: Codec = self.recording.codec.parse().map_err(CamrecError::config)?;
        let container: ContainerFormat = self
            .recording
            .container
            .parse()
            .map_err(CamrecError::config)?;
        let color_format: ColorFormat = self
            .encoder
            .color_format
            .parse()
            .map_err(CamrecError::config)?;

        let config = RecordingConfig {
            preset,
            codec,
            bitrate: self.recording.bitrate,
            i_frame_interval: self.recording.i_frame_interval,
            color_format,
            container,
            pool_capacity: self.pool.capacity,
            pool_policy: self.pool.policy,
            input_timeout_us: self.encoder.input_timeout_us,
            output_timeout_us: self.encoder.output_timeout_us,
        };
        config.validate_strict()?;
        Ok(config)
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# camrec configuration

[recording]
# Output preset: 480p15, 720p30, 1080p30, or WIDTHxHEIGHT@FPS
preset = "480p15"

# Video codec: h264, hevc
codec = "h264"

# Bitrate in kbps (0 = automatic based on preset)
bitrate = 0

# Seconds between key frames
i_frame_interval = 5

# Container: mp4 (needs the ffmpeg feature) or raw (Annex-B elementary stream)
container = "mp4"

[encoder]
# Raw color format: flexible, i420, nv12
color_format = "flexible"

# Encoder input dequeue timeout in microseconds (0 = poll)
input_timeout_us = 5000

# Encoder output dequeue timeout in microseconds (0 = poll)
output_timeout_us = 0

[pool]
# Frame slots between the camera and the encoder
capacity = 5

# When every slot is in use: "reject" drops the new frame, "block" waits
policy = "reject"
"#
    .to_string()
}
