//! Display windows handed to the camera for preview

use crate::error::Result;
use crate::types::SurfaceId;

/// Copyable reference to an acquired window, usable as a capture target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// An acquired native window
///
/// Owned by whoever acquired it and handed back to the [`WindowSystem`] that
/// produced it exactly once. Not `Clone`, so it cannot be released twice.
#[derive(Debug, PartialEq, Eq)]
pub struct NativeWindow {
    handle: WindowHandle,
    width: u32,
    height: u32,
}

impl NativeWindow {
    /// Wrap a native window pointer/id
    pub fn new(id: u64, width: u32, height: u32) -> Self {
        Self {
            handle: WindowHandle(id),
            width,
            height,
        }
    }

    /// Handle used to attach this window as a target
    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    /// Window size (width, height)
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Windowing collaborator turning host surfaces into native windows
pub trait WindowSystem: Send {
    /// Acquire the native window behind a host surface
    fn acquire(&mut self, surface: SurfaceId) -> Result<NativeWindow>;

    /// Release a window acquired from this system
    fn release(&mut self, window: NativeWindow);
}
