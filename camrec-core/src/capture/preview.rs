//! Preview sink: a display window used as a capture target

use tracing::debug;

use super::{CaptureSessionManager, NativeWindow, Target, WindowHandle};
use crate::types::TargetPurpose;

/// Binds a display window as a camera target
///
/// Holds no frames. The native target it wraps is owned by the session
/// manager and has to be released with [`unbind`](Self::unbind) before the
/// window goes back to the window system.
#[derive(Debug)]
pub struct PreviewSink {
    window: WindowHandle,
    bound: bool,
}

impl PreviewSink {
    /// Wrap a window as a preview target
    pub fn bind(window: &NativeWindow) -> Self {
        debug!("Preview bound to window {:?}", window.handle());
        Self {
            window: window.handle(),
            bound: true,
        }
    }

    /// Target to attach to the capture request
    pub fn target(&self) -> Target {
        Target::preview(self.window)
    }

    /// The wrapped window
    pub fn window(&self) -> WindowHandle {
        self.window
    }

    /// Whether the native target has not been released yet
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Release the native preview target(s) held by the session
    pub fn unbind(&mut self, session: &mut CaptureSessionManager) {
        if !self.bound {
            return;
        }
        self.bound = false;
        let released = session.release_targets(TargetPurpose::Preview);
        debug!(
            "Preview unbound from window {:?} ({} target(s) released)",
            self.window, released
        );
    }
}
