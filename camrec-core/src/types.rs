//! Core types for camrec
//!
//! These types represent the data that flows between the camera, the frame
//! pool, the encoder and the muxer.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global handle counter for unique pipeline IDs
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying a pipeline instance in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// Host-side reference to a display surface, before it is turned into a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Surface({})", self.0)
    }
}

/// Template a capture request is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestTemplate {
    /// Continuous preview frames
    Preview,
    /// Still capture quality, used for the recording path
    StillCapture,
    /// Video record
    Record,
}

impl RequestTemplate {
    /// Native template id
    pub fn id(&self) -> u32 {
        match self {
            Self::Preview => 1,
            Self::StillCapture => 2,
            Self::Record => 3,
        }
    }
}

/// What a capture target is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetPurpose {
    /// Display window
    Preview,
    /// Frame pool feeding the encoder
    FrameSource,
}

/// Pixel layout of camera frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Planar Y, U, V at 4:2:0
    #[default]
    Yuv420,
    /// Y plane followed by interleaved UV
    Nv12,
    /// Packed 8-bit RGBA
    Rgba8888,
}

impl PixelFormat {
    /// Number of planes a frame carries
    pub fn plane_count(&self) -> usize {
        match self {
            Self::Yuv420 => 3,
            Self::Nv12 => 2,
            Self::Rgba8888 => 1,
        }
    }

    /// Total bytes for a tightly packed frame
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Yuv420 | Self::Nv12 => pixels * 3 / 2,
            Self::Rgba8888 => pixels * 4,
        }
    }
}

/// Color format handed to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorFormat {
    /// Flexible YUV 4:2:0
    #[default]
    Yuv420Flexible,
    /// Planar YUV 4:2:0 (I420)
    Yuv420Planar,
    /// Semi-planar YUV 4:2:0 (NV12)
    Yuv420SemiPlanar,
}

impl ColorFormat {
    /// Native color format constant
    pub fn id(&self) -> u32 {
        match self {
            Self::Yuv420Flexible => 0x7F42_0888,
            Self::Yuv420Planar => 19,
            Self::Yuv420SemiPlanar => 21,
        }
    }
}

impl std::str::FromStr for ColorFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yuv420_flexible" | "flexible" => Ok(Self::Yuv420Flexible),
            "yuv420_planar" | "i420" => Ok(Self::Yuv420Planar),
            "yuv420_semi_planar" | "nv12" => Ok(Self::Yuv420SemiPlanar),
            _ => Err(format!("Unknown color format: {}", s)),
        }
    }
}

/// One plane of an image
#[derive(Debug, Clone)]
pub struct Plane {
    /// Plane bytes
    pub data: Vec<u8>,
    /// Bytes between rows
    pub row_stride: u32,
    /// Bytes between adjacent pixels
    pub pixel_stride: u32,
}

/// Decoded camera frame
#[derive(Debug, Clone)]
pub struct Image {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
    /// Capture timestamp in nanoseconds
    pub timestamp_ns: u64,
    /// Image planes
    pub planes: Vec<Plane>,
}

impl Image {
    /// Get a plane by index
    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index)
    }
}

/// Which way a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    Front,
    Back,
    External,
}

impl std::fmt::Display for LensFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LensFacing::Front => write!(f, "front"),
            LensFacing::Back => write!(f, "back"),
            LensFacing::External => write!(f, "external"),
        }
    }
}

/// Static information about a camera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraCharacteristics {
    /// Camera identifier
    pub id: String,
    /// Lens facing
    pub facing: LensFacing,
    /// Sensor orientation in degrees
    pub sensor_orientation: u32,
    /// Supported output sizes (width, height)
    pub output_sizes: Vec<(u32, u32)>,
}

impl std::fmt::Display for CameraCharacteristics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, {}°, {} sizes)",
            self.id,
            self.facing,
            self.sensor_orientation,
            self.output_sizes.len()
        )
    }
}

/// Asynchronous notification from the camera stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEvent {
    /// The device went away
    DeviceDisconnected {
        /// Camera identifier
        camera_id: String,
    },
    /// The device reported an error
    DeviceError {
        /// Camera identifier
        camera_id: String,
        /// Native error code
        code: i32,
    },
    /// The capture session is configured and idle
    SessionReady,
    /// The capture session is producing frames
    SessionActive,
    /// The capture session was closed
    SessionClosed,
}

impl std::fmt::Display for CameraEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceDisconnected { camera_id } => write!(f, "camera {} disconnected", camera_id),
            Self::DeviceError { camera_id, code } => {
                write!(f, "camera {} error {}", camera_id, code)
            }
            Self::SessionReady => write!(f, "session ready"),
            Self::SessionActive => write!(f, "session active"),
            Self::SessionClosed => write!(f, "session closed"),
        }
    }
}
