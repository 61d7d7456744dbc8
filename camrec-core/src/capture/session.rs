//! Capture session lifecycle
//!
//! [`CaptureSessionManager`] owns the camera device, the capture request,
//! the attached targets and the session output container. Forward
//! transitions follow a fixed order:
//!
//! ```text
//! Closed → Opening → RequestBuilt → TargetsAttached → SessionCreated → Repeating
//! ```
//!
//! Calls made out of order fail with [`CamrecError::InvalidSequence`].
//! [`CaptureSessionManager::close`] returns to `Closed` from any state,
//! including partially opened ones, and may be called repeatedly.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    CameraBackend, ContainerHandle, DeviceHandle, DeviceStateListener, OutputHandle,
    RequestHandle, SessionHandle, SessionStateListener, Surface, Target, TargetHandle,
};
use crate::error::{CamrecError, Result};
use crate::types::{RequestTemplate, TargetPurpose};

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing open
    Closed,
    /// Device open in progress (or failed part-way)
    Opening,
    /// Device open, request and output container allocated
    RequestBuilt,
    /// At least one target attached
    TargetsAttached,
    /// Capture session created
    SessionCreated,
    /// Repeating request running
    Repeating,
}

/// A target registered on both the request and the output container
#[derive(Debug)]
struct AttachedTarget {
    surface: Surface,
    purpose: TargetPurpose,
    target: Option<TargetHandle>,
    output: Option<OutputHandle>,
}

/// Owns one camera device and its capture session
pub struct CaptureSessionManager {
    backend: Box<dyn CameraBackend>,
    device_listener: Arc<dyn DeviceStateListener>,
    state: SessionState,
    camera_id: Option<String>,
    device: Option<DeviceHandle>,
    request: Option<RequestHandle>,
    container: Option<ContainerHandle>,
    targets: Vec<AttachedTarget>,
    session: Option<SessionHandle>,
    repeating: bool,
}

impl CaptureSessionManager {
    /// Create a manager over a camera backend
    pub fn new(
        backend: Box<dyn CameraBackend>,
        device_listener: Arc<dyn DeviceStateListener>,
    ) -> Self {
        Self {
            backend,
            device_listener,
            state: SessionState::Closed,
            camera_id: None,
            device: None,
            request: None,
            container: None,
            targets: Vec::new(),
            session: None,
            repeating: false,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identifier of the open camera
    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    /// Handle of the open device
    pub fn device(&self) -> Option<DeviceHandle> {
        self.device
    }

    /// Number of attached targets
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Whether a surface is already attached
    pub fn is_attached(&self, surface: &Surface) -> bool {
        self.targets.iter().any(|t| t.surface.same_as(surface))
    }

    /// Mutable access to the backend, for queries outside the session
    pub fn backend_mut(&mut self) -> &mut dyn CameraBackend {
        self.backend.as_mut()
    }

    /// Open the first available camera and allocate a request for `template`
    ///
    /// On a native failure after enumeration the partially created handles
    /// are kept so that [`close`](Self::close) can free them.
    pub fn open(&mut self, template: RequestTemplate) -> Result<DeviceHandle> {
        if self.state != SessionState::Closed {
            return Err(CamrecError::invalid_sequence("open camera", self.state));
        }
        self.state = SessionState::Opening;

        let ids = match self.backend.camera_ids() {
            Ok(ids) => ids,
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e);
            }
        };
        let Some(camera_id) = ids.first().cloned() else {
            self.state = SessionState::Closed;
            warn!("No camera devices found");
            return Err(CamrecError::NoDevice);
        };
        info!("Found {} camera(s), using {}", ids.len(), camera_id);

        match self.backend.characteristics(&camera_id) {
            Ok(chars) => debug!("Camera characteristics: {}", chars),
            Err(e) => warn!("Failed to read characteristics of {}: {}", camera_id, e),
        }

        let device = self
            .backend
            .open_device(&camera_id, Arc::clone(&self.device_listener))
            .map_err(|e| match e {
                CamrecError::DeviceOpen(_) => e,
                other => CamrecError::device_open(other.to_string()),
            })?;
        self.camera_id = Some(camera_id);
        self.device = Some(device);

        let request = self
            .backend
            .create_capture_request(device, template)
            .map_err(|e| match e {
                CamrecError::RequestCreate(_) => e,
                other => CamrecError::request_create(other.to_string()),
            })?;
        self.request = Some(request);

        let container = self.backend.create_output_container()?;
        self.container = Some(container);

        self.state = SessionState::RequestBuilt;
        info!(
            "Camera {} opened ({}), {:?} request built",
            self.camera_id.as_deref().unwrap_or("?"),
            device,
            template
        );
        Ok(device)
    }

    /// Add a target to the request and register it as a session output
    ///
    /// Attaching the same surface twice registers it twice.
    pub fn attach_target(&mut self, target: &Target) -> Result<()> {
        let (request, container) = match (self.state, self.request, self.container) {
            (SessionState::RequestBuilt | SessionState::TargetsAttached, Some(r), Some(c)) => {
                (r, c)
            }
            _ => return Err(CamrecError::invalid_sequence("attach target", self.state)),
        };

        // Record the entry first so close() frees whatever gets created below
        self.targets.push(AttachedTarget {
            surface: target.surface.clone(),
            purpose: target.purpose,
            target: None,
            output: None,
        });
        let entry = self.targets.len() - 1;

        let target_handle = self.backend.create_output_target(&target.surface)?;
        self.targets[entry].target = Some(target_handle);
        self.backend.add_target(request, target_handle)?;

        let output = self.backend.create_session_output(&target.surface)?;
        self.targets[entry].output = Some(output);
        self.backend.add_session_output(container, output)?;

        self.state = SessionState::TargetsAttached;
        debug!(
            "Attached {:?} target {} ({})",
            target.purpose, target_handle, output
        );
        Ok(())
    }

    /// Create the capture session; readiness is reported through `listener`
    pub fn create_session(&mut self, listener: Arc<dyn SessionStateListener>) -> Result<()> {
        let (device, container) = match (self.state, self.device, self.container) {
            (SessionState::TargetsAttached, Some(d), Some(c)) if !self.targets.is_empty() => {
                (d, c)
            }
            _ => return Err(CamrecError::invalid_sequence("create session", self.state)),
        };

        let session = self
            .backend
            .create_session(device, container, listener)
            .map_err(|e| match e {
                CamrecError::SessionCreate(_) => e,
                other => CamrecError::session_create(other.to_string()),
            })?;
        self.session = Some(session);
        self.state = SessionState::SessionCreated;
        debug!("Capture session {} created", session);
        Ok(())
    }

    /// Start continuous capture to every attached target
    pub fn set_repeating_request(&mut self) -> Result<()> {
        let (session, request) = match (self.state, self.session, self.request) {
            (SessionState::SessionCreated, Some(s), Some(r)) => (s, r),
            _ => {
                return Err(CamrecError::invalid_sequence(
                    "set repeating request",
                    self.state,
                ));
            }
        };

        self.backend.set_repeating_request(session, request)?;
        self.repeating = true;
        self.state = SessionState::Repeating;
        info!(
            "Repeating request started on {} ({} targets)",
            session,
            self.targets.len()
        );
        Ok(())
    }

    /// Detach and free every target with the given purpose
    ///
    /// Stops the repeating request first; the session can only be closed
    /// afterwards.
    pub fn release_targets(&mut self, purpose: TargetPurpose) -> usize {
        self.stop_repeating();

        let (matching, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.targets)
            .into_iter()
            .partition(|t| t.purpose == purpose);
        self.targets = kept;

        let released = matching.len();
        for entry in matching {
            self.free_target(entry, true);
        }
        if released > 0 {
            debug!("Released {} {:?} target(s)", released, purpose);
        }
        released
    }

    /// Tear everything down and return to `Closed`
    pub fn close(&mut self) {
        if self.state == SessionState::Closed && self.device.is_none() {
            return;
        }

        self.stop_repeating();
        if let Some(session) = self.session.take() {
            self.backend.close_session(session);
            debug!("Capture session {} closed", session);
        }

        if let Some(request) = self.request.take() {
            self.backend.free_capture_request(request);
        }

        for entry in std::mem::take(&mut self.targets) {
            self.free_target(entry, false);
        }

        if let Some(device) = self.device.take() {
            if let Err(e) = self.backend.close_device(device) {
                warn!("Failed to close camera device {}: {}", device, e);
            }
        }

        if let Some(container) = self.container.take() {
            self.backend.free_output_container(container);
        }

        if let Some(id) = self.camera_id.take() {
            info!("Camera {} closed", id);
        }
        self.state = SessionState::Closed;
    }

    fn stop_repeating(&mut self) {
        if !self.repeating {
            return;
        }
        self.repeating = false;
        if let Some(session) = self.session {
            if let Err(e) = self.backend.stop_repeating(session) {
                warn!("Failed to stop repeating request on {}: {}", session, e);
            }
        }
        if self.state == SessionState::Repeating {
            self.state = SessionState::SessionCreated;
        }
    }

    fn free_target(&mut self, entry: AttachedTarget, detach: bool) {
        if let Some(target) = entry.target {
            if detach {
                if let Some(request) = self.request {
                    if let Err(e) = self.backend.remove_target(request, target) {
                        warn!("Failed to remove {} from request: {}", target, e);
                    }
                }
            }
            self.backend.free_output_target(target);
        }
        if let Some(output) = entry.output {
            if detach {
                if let Some(container) = self.container {
                    if let Err(e) = self.backend.remove_session_output(container, output) {
                        warn!("Failed to remove {} from container: {}", output, e);
                    }
                }
            }
            self.backend.free_session_output(output);
        }
    }
}

impl Drop for CaptureSessionManager {
    fn drop(&mut self) {
        self.close();
    }
}
