//! Video encoding
//!
//! This module provides:
//! - The encoder seam ([`VideoEncoder`]) modelled on index-based codec APIs
//! - [`EncoderStage`], which turns buffer indices into scoped slot leases
//! - Format types shared with the muxer

mod stage;

pub use stage::{EncoderStage, InputSlot, OutputEvent, OutputSlot};

use serde::{Deserialize, Serialize};

use crate::error::{CamrecError, Result};
use crate::types::ColorFormat;

/// MIME type for H.264 / AVC
pub const MIME_AVC: &str = "video/avc";

/// MIME type for H.265 / HEVC
pub const MIME_HEVC: &str = "video/hevc";

/// Parameters the encoder is configured with
///
/// All fields are mandatory; they are fixed for the encoder's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderFormat {
    /// Output MIME type
    pub mime: String,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Bit rate in bits per second
    pub bit_rate: u32,
    /// Frames per second
    pub frame_rate: u32,
    /// I-frame interval
    pub i_frame_interval: u32,
    /// Raw input color format
    pub color_format: ColorFormat,
}

impl EncoderFormat {
    /// Check that every mandatory parameter is present
    pub fn validate(&self) -> Result<()> {
        if self.mime.is_empty() {
            return Err(CamrecError::encoder_config("missing MIME type"));
        }
        let missing = [
            ("width", self.width),
            ("height", self.height),
            ("bit rate", self.bit_rate),
            ("frame rate", self.frame_rate),
            ("I-frame interval", self.i_frame_interval),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);
        if let Some((name, _)) = missing {
            return Err(CamrecError::encoder_config(format!("missing {}", name)));
        }
        Ok(())
    }

    /// Bytes in one raw YUV 4:2:0 input frame
    pub fn input_frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3 / 2
    }
}

/// Output format reported by the encoder once it knows its stream layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    /// MIME type of the compressed stream
    pub mime: String,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frames per second
    pub frame_rate: u32,
    /// Codec-specific data (for AVC: SPS then PPS)
    pub csd: Vec<Vec<u8>>,
}

/// Flags attached to an encoder buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferFlags(u32);

impl BufferFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Buffer holds a key frame
    pub const KEY_FRAME: Self = Self(1);
    /// Buffer holds codec configuration, not media data
    pub const CODEC_CONFIG: Self = Self(2);
    /// Last buffer of the stream
    pub const END_OF_STREAM: Self = Self(4);

    /// Raw bits
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Build from raw bits
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Whether every flag in `other` is set
    pub fn contains(&self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Where the data of an output buffer lives and how to time it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    /// Start of valid data in the buffer
    pub offset: usize,
    /// Length of valid data
    pub size: usize,
    /// Presentation time in microseconds
    pub presentation_time_us: i64,
    /// Buffer flags
    pub flags: BufferFlags,
}

/// Raw result of polling the encoder's output queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderOutput {
    /// The output format is known
    FormatChanged(MediaFormat),
    /// Output buffer `index` holds compressed data
    BufferReady {
        /// Buffer index
        index: usize,
        /// Buffer layout and timing
        info: BufferInfo,
    },
    /// Nothing available within the timeout
    TryAgainLater,
}

/// Hardware or software video encoder with fixed input and output pools
///
/// Timeouts are in microseconds; a negative timeout waits indefinitely.
pub trait VideoEncoder: Send {
    /// Apply the stream parameters
    fn configure(&mut self, format: &EncoderFormat) -> Result<()>;

    /// Begin accepting input
    fn start(&mut self) -> Result<()>;

    /// Take a free input buffer
    fn dequeue_input_buffer(&mut self, timeout_us: i64) -> Result<Option<usize>>;

    /// Backing memory of a dequeued input buffer
    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8]>;

    /// Hand a filled input buffer to the encoder
    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()>;

    /// Poll the output queue
    fn dequeue_output_buffer(&mut self, timeout_us: i64) -> Result<EncoderOutput>;

    /// Backing memory of a dequeued output buffer
    fn output_buffer(&self, index: usize) -> Result<&[u8]>;

    /// Give an output buffer back to the encoder
    fn release_output_buffer(&mut self, index: usize) -> Result<()>;

    /// Stop encoding and free codec resources
    fn stop(&mut self) -> Result<()>;
}

/// Creates encoders by MIME type
pub trait EncoderFactory: Send + Sync {
    /// Create an unconfigured encoder for `mime`
    fn create_encoder(&self, mime: &str) -> Result<Box<dyn VideoEncoder>>;
}
