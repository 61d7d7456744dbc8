//! Error types for camrec

use thiserror::Error;

/// Result type alias using CamrecError
pub type Result<T> = std::result::Result<T, CamrecError>;

/// Main error type for camrec operations
#[derive(Debug, Error)]
pub enum CamrecError {
    /// No camera was enumerated
    #[error("No camera device available")]
    NoDevice,

    /// The camera device could not be opened
    #[error("Failed to open camera device: {0}")]
    DeviceOpen(String),

    /// The capture request could not be created
    #[error("Failed to create capture request: {0}")]
    RequestCreate(String),

    /// The capture session could not be created
    #[error("Failed to create capture session: {0}")]
    SessionCreate(String),

    /// Any other native camera failure (targets, outputs, repeating requests)
    #[error("Camera error: {0}")]
    Camera(String),

    /// Encoder configuration rejected
    #[error("Encoder configuration error: {0}")]
    EncoderConfig(String),

    /// Encoder runtime error
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Muxer error
    #[error("Muxer error: {0}")]
    Muxer(String),

    /// The muxer already carries the pipeline's video track
    #[error("Muxer track already added")]
    TrackAlreadyAdded,

    /// An operation was called in a state that does not allow it
    #[error("Cannot {operation} while {state}")]
    InvalidSequence {
        /// Operation that was attempted
        operation: &'static str,
        /// State the component was in
        state: String,
    },

    /// Every frame slot is checked out
    #[error("Frame pool exhausted ({capacity} slots in use)")]
    PoolExhausted {
        /// Pool capacity
        capacity: usize,
    },

    /// No display surface has been set
    #[error("No display surface set")]
    NoSurface,

    /// A session is already running on this pipeline
    #[error("Capture session already running")]
    SessionAlreadyRunning,

    /// The output file descriptor is closed or not writable
    #[error("Invalid output descriptor: {0}")]
    InvalidDescriptor(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unsupported operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CamrecError>,
    },
}

impl CamrecError {
    /// Create a device-open error
    pub fn device_open(msg: impl Into<String>) -> Self {
        Self::DeviceOpen(msg.into())
    }

    /// Create a request-create error
    pub fn request_create(msg: impl Into<String>) -> Self {
        Self::RequestCreate(msg.into())
    }

    /// Create a session-create error
    pub fn session_create(msg: impl Into<String>) -> Self {
        Self::SessionCreate(msg.into())
    }

    /// Create a generic camera error
    pub fn camera(msg: impl Into<String>) -> Self {
        Self::Camera(msg.into())
    }

    /// Create an encoder configuration error
    pub fn encoder_config(msg: impl Into<String>) -> Self {
        Self::EncoderConfig(msg.into())
    }

    /// Create an encoder error
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Create a muxer error
    pub fn muxer(msg: impl Into<String>) -> Self {
        Self::Muxer(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid-sequence error
    pub fn invalid_sequence(operation: &'static str, state: impl std::fmt::Debug) -> Self {
        Self::InvalidSequence {
            operation,
            state: format!("{:?}", state),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &CamrecError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Short hint telling the user what to try next
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::NoDevice => Some("Check that a camera is connected and not in use by another application"),
            Self::DeviceOpen(_) => Some("Another application may hold the camera; close it and retry"),
            Self::NoSurface => Some("Set a display surface before opening the camera"),
            Self::SessionAlreadyRunning => {
                Some("Stop the running preview or recording first (camrec stops on Ctrl+C)")
            }
            Self::InvalidDescriptor(_) => Some("Pass a file opened for writing"),
            Self::Config(_) => Some("Check ~/.config/camrec/config.toml or run 'camrec config init'"),
            Self::Unsupported(_) => Some("Rebuild with the 'ffmpeg' feature for MPEG-4 output"),
            _ => None,
        }
    }

    /// Whether the user can fix this without changing code
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::NoDevice
                | Self::DeviceOpen(_)
                | Self::NoSurface
                | Self::SessionAlreadyRunning
                | Self::InvalidDescriptor(_)
                | Self::Config(_)
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for CamrecError {
    fn from(err: ffmpeg_next::Error) -> Self {
        Self::Muxer(err.to_string())
    }
}
