//! Camera capture
//!
//! This module handles:
//! - The native camera seam ([`CameraBackend`]) and its opaque handles
//! - Capture session lifecycle via [`CaptureSessionManager`]
//! - Preview targets and the bounded frame pool that feeds the encoder

pub mod preview;
pub mod reader;
pub mod session;
pub mod window;

pub use preview::PreviewSink;
pub use reader::{ImageConsumer, ImageLease, ImageReader, ImageWriter, PoolPolicy};
pub use session::{CaptureSessionManager, SessionState};
pub use window::{NativeWindow, WindowHandle, WindowSystem};

use std::sync::Arc;

use crate::error::Result;
use crate::types::{CameraCharacteristics, RequestTemplate, TargetPurpose};

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

native_handle!(
    /// An open camera device
    DeviceHandle
);
native_handle!(
    /// A capture request
    RequestHandle
);
native_handle!(
    /// A target attached to a capture request
    TargetHandle
);
native_handle!(
    /// A session output wrapping a surface
    OutputHandle
);
native_handle!(
    /// The container of session outputs
    ContainerHandle
);
native_handle!(
    /// A live capture session
    SessionHandle
);

/// Somewhere the camera can send frames
#[derive(Debug, Clone)]
pub enum Surface {
    /// A display window
    Window(WindowHandle),
    /// The producer side of an [`ImageReader`]
    Reader(ImageWriter),
}

impl Surface {
    /// Whether two surfaces refer to the same native object
    pub fn same_as(&self, other: &Surface) -> bool {
        match (self, other) {
            (Surface::Window(a), Surface::Window(b)) => a == b,
            (Surface::Reader(a), Surface::Reader(b)) => a.same_pool(b),
            _ => false,
        }
    }
}

/// A surface together with what it is used for
#[derive(Debug, Clone)]
pub struct Target {
    /// Destination surface
    pub surface: Surface,
    /// Purpose of the target
    pub purpose: TargetPurpose,
}

impl Target {
    /// Create a preview target
    pub fn preview(window: WindowHandle) -> Self {
        Self {
            surface: Surface::Window(window),
            purpose: TargetPurpose::Preview,
        }
    }

    /// Create a frame-source target
    pub fn frame_source(writer: ImageWriter) -> Self {
        Self {
            surface: Surface::Reader(writer),
            purpose: TargetPurpose::FrameSource,
        }
    }
}

/// Receives device state notifications
///
/// Called from threads owned by the camera stack.
pub trait DeviceStateListener: Send + Sync {
    /// The device was disconnected
    fn on_disconnected(&self, camera_id: &str);
    /// The device reported an error
    fn on_error(&self, camera_id: &str, code: i32);
}

/// Receives capture session state notifications
///
/// Called from threads owned by the camera stack, never synchronously with
/// the call that caused the transition.
pub trait SessionStateListener: Send + Sync {
    /// Session configured, no request running
    fn on_ready(&self);
    /// Session producing frames
    fn on_active(&self);
    /// Session closed
    fn on_closed(&self);
}

/// Native camera API
///
/// Every `create_*`/`open_*` call hands out a handle that must be given back
/// to the matching `free_*`/`close_*` call exactly once.
pub trait CameraBackend: Send {
    /// Identifiers of the available cameras
    fn camera_ids(&mut self) -> Result<Vec<String>>;

    /// Static characteristics of a camera
    fn characteristics(&mut self, camera_id: &str) -> Result<CameraCharacteristics>;

    /// Open a camera
    fn open_device(
        &mut self,
        camera_id: &str,
        listener: Arc<dyn DeviceStateListener>,
    ) -> Result<DeviceHandle>;

    /// Close a camera
    fn close_device(&mut self, device: DeviceHandle) -> Result<()>;

    /// Create a capture request from a template
    fn create_capture_request(
        &mut self,
        device: DeviceHandle,
        template: RequestTemplate,
    ) -> Result<RequestHandle>;

    /// Free a capture request
    fn free_capture_request(&mut self, request: RequestHandle);

    /// Create an empty session output container
    fn create_output_container(&mut self) -> Result<ContainerHandle>;

    /// Free a session output container
    fn free_output_container(&mut self, container: ContainerHandle);

    /// Wrap a surface as a request target
    fn create_output_target(&mut self, surface: &Surface) -> Result<TargetHandle>;

    /// Free a request target
    fn free_output_target(&mut self, target: TargetHandle);

    /// Add a target to a request
    fn add_target(&mut self, request: RequestHandle, target: TargetHandle) -> Result<()>;

    /// Remove a target from a request
    fn remove_target(&mut self, request: RequestHandle, target: TargetHandle) -> Result<()>;

    /// Wrap a surface as a session output
    fn create_session_output(&mut self, surface: &Surface) -> Result<OutputHandle>;

    /// Free a session output
    fn free_session_output(&mut self, output: OutputHandle);

    /// Register a session output in a container
    fn add_session_output(&mut self, container: ContainerHandle, output: OutputHandle)
    -> Result<()>;

    /// Remove a session output from a container
    fn remove_session_output(
        &mut self,
        container: ContainerHandle,
        output: OutputHandle,
    ) -> Result<()>;

    /// Create a capture session; state changes are reported to `listener`
    fn create_session(
        &mut self,
        device: DeviceHandle,
        container: ContainerHandle,
        listener: Arc<dyn SessionStateListener>,
    ) -> Result<SessionHandle>;

    /// Start producing frames for `request` until stopped
    fn set_repeating_request(
        &mut self,
        session: SessionHandle,
        request: RequestHandle,
    ) -> Result<()>;

    /// Stop the repeating request
    fn stop_repeating(&mut self, session: SessionHandle) -> Result<()>;

    /// Close a capture session
    fn close_session(&mut self, session: SessionHandle);
}
