//! Test-pattern camera
//!
//! Implements [`CameraBackend`] with plain bookkeeping instead of a device.
//! A repeating request spawns one producer thread that writes moving YUV
//! gradients into every frame-pool target and counts frames sent to window
//! targets. Every handle is tracked so tests can check that each one is
//! freed exactly once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::capture::{
    CameraBackend, ContainerHandle, DeviceHandle, DeviceStateListener, ImageWriter, OutputHandle,
    RequestHandle, SessionHandle, SessionStateListener, Surface, TargetHandle,
};
use crate::error::{CamrecError, Result};
use crate::types::{
    CameraCharacteristics, Image, LensFacing, PixelFormat, Plane, RequestTemplate,
};

/// Synthetic camera settings
#[derive(Debug, Clone)]
pub struct SyntheticCameraOptions {
    /// Cameras reported by enumeration
    pub camera_count: usize,
    /// Frames per second produced by a repeating request
    pub fps: u32,
    /// Stop producing after this many captures per repeating request
    pub frame_limit: Option<u64>,
    /// Fail `open_device`
    pub fail_open: bool,
    /// Fail `create_session`
    pub fail_session: bool,
}

impl Default for SyntheticCameraOptions {
    fn default() -> Self {
        Self {
            camera_count: 1,
            fps: 15,
            frame_limit: None,
            fail_open: false,
            fail_session: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Device,
    Request,
    Container,
    Target,
    Output,
    Session,
}

#[derive(Default)]
struct CameraLedger {
    next_id: u64,
    live: HashMap<u64, Kind>,
    double_frees: Vec<String>,
    devices_opened: u64,
    frames_delivered: u64,
    frames_rejected: u64,
    preview_frames: u64,
    repeating_requests: u64,
    targets_detached: u64,
    device_listeners: HashMap<u64, (String, Arc<dyn DeviceStateListener>)>,
}

impl CameraLedger {
    fn alloc(&mut self, kind: Kind) -> u64 {
        self.next_id += 1;
        self.live.insert(self.next_id, kind);
        self.next_id
    }

    fn free(&mut self, kind: Kind, id: u64) {
        match self.live.remove(&id) {
            Some(found) if found == kind => {}
            Some(found) => {
                self.live.insert(id, found);
                self.double_frees
                    .push(format!("{:?} {} freed as {:?}", found, id, kind));
            }
            None => self.double_frees.push(format!("{:?} {} freed twice", kind, id)),
        }
    }

    fn count(&self, kind: Kind) -> usize {
        self.live.values().filter(|k| **k == kind).count()
    }
}

/// Shared view of the synthetic camera's bookkeeping
#[derive(Clone, Default)]
pub struct CameraProbe(Arc<Mutex<CameraLedger>>);

impl CameraProbe {
    /// Handles of any kind not yet freed
    pub fn live_handles(&self) -> usize {
        self.0.lock().live.len()
    }

    /// Devices currently open
    pub fn open_devices(&self) -> usize {
        self.0.lock().count(Kind::Device)
    }

    /// Sessions not yet closed
    pub fn open_sessions(&self) -> usize {
        self.0.lock().count(Kind::Session)
    }

    /// Targets not yet freed
    pub fn live_targets(&self) -> usize {
        self.0.lock().count(Kind::Target)
    }

    /// Total successful `open_device` calls
    pub fn devices_opened(&self) -> u64 {
        self.0.lock().devices_opened
    }

    /// Frees of handles that were not live
    pub fn double_frees(&self) -> Vec<String> {
        self.0.lock().double_frees.clone()
    }

    /// Frames accepted by frame pools
    pub fn frames_delivered(&self) -> u64 {
        self.0.lock().frames_delivered
    }

    /// Frames a full frame pool refused
    pub fn frames_rejected(&self) -> u64 {
        self.0.lock().frames_rejected
    }

    /// Frames sent to window targets
    pub fn preview_frames(&self) -> u64 {
        self.0.lock().preview_frames
    }

    /// Total successful `set_repeating_request` calls
    pub fn repeating_requests(&self) -> u64 {
        self.0.lock().repeating_requests
    }

    /// Targets removed from a live request before being freed
    pub fn targets_detached(&self) -> u64 {
        self.0.lock().targets_detached
    }

    /// Report a disconnect for every open device
    pub fn disconnect_all(&self) {
        self.notify(|id, listener| listener.on_disconnected(id));
    }

    /// Report an error for every open device
    pub fn fail_all(&self, code: i32) {
        self.notify(|id, listener| listener.on_error(id, code));
    }

    fn notify(&self, f: impl Fn(&str, &dyn DeviceStateListener)) {
        let listeners: Vec<_> = self
            .0
            .lock()
            .device_listeners
            .values()
            .map(|(id, l)| (id.clone(), Arc::clone(l)))
            .collect();
        for (id, listener) in listeners {
            f(&id, listener.as_ref());
        }
    }
}

impl std::fmt::Debug for CameraProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ledger = self.0.lock();
        f.debug_struct("CameraProbe")
            .field("live", &ledger.live.len())
            .field("double_frees", &ledger.double_frees.len())
            .field("frames_delivered", &ledger.frames_delivered)
            .finish()
    }
}

struct Producer {
    session: u64,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Test-pattern [`CameraBackend`]
pub struct SyntheticCamera {
    options: SyntheticCameraOptions,
    probe: CameraProbe,
    surfaces: HashMap<u64, Surface>,
    requests: HashMap<u64, Vec<u64>>,
    containers: HashMap<u64, Vec<u64>>,
    sessions: HashMap<u64, Arc<dyn SessionStateListener>>,
    producer: Option<Producer>,
}

impl SyntheticCamera {
    /// Create a camera
    pub fn new(options: SyntheticCameraOptions) -> Self {
        Self {
            options,
            probe: CameraProbe::default(),
            surfaces: HashMap::new(),
            requests: HashMap::new(),
            containers: HashMap::new(),
            sessions: HashMap::new(),
            producer: None,
        }
    }

    /// Bookkeeping shared with this camera
    pub fn probe(&self) -> CameraProbe {
        self.probe.clone()
    }

    fn stop_producer(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.stop.store(true, Ordering::SeqCst);
            if producer.thread.join().is_err() {
                warn!("Synthetic camera thread panicked");
            }
            debug!("Producer for session {} stopped", producer.session);
        }
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(SyntheticCameraOptions::default())
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop_producer();
    }
}

impl CameraBackend for SyntheticCamera {
    fn camera_ids(&mut self) -> Result<Vec<String>> {
        Ok((0..self.options.camera_count).map(|i| i.to_string()).collect())
    }

    fn characteristics(&mut self, camera_id: &str) -> Result<CameraCharacteristics> {
        let index: usize = camera_id
            .parse()
            .map_err(|_| CamrecError::camera(format!("Unknown camera {}", camera_id)))?;
        if index >= self.options.camera_count {
            return Err(CamrecError::camera(format!("Unknown camera {}", camera_id)));
        }
        Ok(CameraCharacteristics {
            id: camera_id.to_string(),
            facing: if index == 0 {
                LensFacing::Back
            } else {
                LensFacing::Front
            },
            sensor_orientation: 90,
            output_sizes: vec![(640, 480), (1280, 720), (1920, 1080)],
        })
    }

    fn open_device(
        &mut self,
        camera_id: &str,
        listener: Arc<dyn DeviceStateListener>,
    ) -> Result<DeviceHandle> {
        if self.options.fail_open {
            return Err(CamrecError::device_open(format!(
                "camera {} is busy",
                camera_id
            )));
        }
        let mut ledger = self.probe.0.lock();
        let id = ledger.alloc(Kind::Device);
        ledger.devices_opened += 1;
        ledger
            .device_listeners
            .insert(id, (camera_id.to_string(), listener));
        info!("Synthetic camera {} opened", camera_id);
        Ok(DeviceHandle(id))
    }

    fn close_device(&mut self, device: DeviceHandle) -> Result<()> {
        let mut ledger = self.probe.0.lock();
        ledger.device_listeners.remove(&device.0);
        ledger.free(Kind::Device, device.0);
        Ok(())
    }

    fn create_capture_request(
        &mut self,
        _device: DeviceHandle,
        template: RequestTemplate,
    ) -> Result<RequestHandle> {
        let id = self.probe.0.lock().alloc(Kind::Request);
        self.requests.insert(id, Vec::new());
        trace!("Request {} from template {}", id, template.id());
        Ok(RequestHandle(id))
    }

    fn free_capture_request(&mut self, request: RequestHandle) {
        self.requests.remove(&request.0);
        self.probe.0.lock().free(Kind::Request, request.0);
    }

    fn create_output_container(&mut self) -> Result<ContainerHandle> {
        let id = self.probe.0.lock().alloc(Kind::Container);
        self.containers.insert(id, Vec::new());
        Ok(ContainerHandle(id))
    }

    fn free_output_container(&mut self, container: ContainerHandle) {
        self.containers.remove(&container.0);
        self.probe.0.lock().free(Kind::Container, container.0);
    }

    fn create_output_target(&mut self, surface: &Surface) -> Result<TargetHandle> {
        let id = self.probe.0.lock().alloc(Kind::Target);
        self.surfaces.insert(id, surface.clone());
        Ok(TargetHandle(id))
    }

    fn free_output_target(&mut self, target: TargetHandle) {
        self.surfaces.remove(&target.0);
        self.probe.0.lock().free(Kind::Target, target.0);
    }

    fn add_target(&mut self, request: RequestHandle, target: TargetHandle) -> Result<()> {
        let targets = self
            .requests
            .get_mut(&request.0)
            .ok_or_else(|| CamrecError::camera(format!("Unknown {}", request)))?;
        targets.push(target.0);
        Ok(())
    }

    fn remove_target(&mut self, request: RequestHandle, target: TargetHandle) -> Result<()> {
        let targets = self
            .requests
            .get_mut(&request.0)
            .ok_or_else(|| CamrecError::camera(format!("Unknown {}", request)))?;
        targets.retain(|t| *t != target.0);
        self.probe.0.lock().targets_detached += 1;
        Ok(())
    }

    fn create_session_output(&mut self, _surface: &Surface) -> Result<OutputHandle> {
        Ok(OutputHandle(self.probe.0.lock().alloc(Kind::Output)))
    }

    fn free_session_output(&mut self, output: OutputHandle) {
        self.probe.0.lock().free(Kind::Output, output.0);
    }

    fn add_session_output(
        &mut self,
        container: ContainerHandle,
        output: OutputHandle,
    ) -> Result<()> {
        let outputs = self
            .containers
            .get_mut(&container.0)
            .ok_or_else(|| CamrecError::camera(format!("Unknown {}", container)))?;
        outputs.push(output.0);
        Ok(())
    }

    fn remove_session_output(
        &mut self,
        container: ContainerHandle,
        output: OutputHandle,
    ) -> Result<()> {
        let outputs = self
            .containers
            .get_mut(&container.0)
            .ok_or_else(|| CamrecError::camera(format!("Unknown {}", container)))?;
        outputs.retain(|o| *o != output.0);
        Ok(())
    }

    fn create_session(
        &mut self,
        _device: DeviceHandle,
        container: ContainerHandle,
        listener: Arc<dyn SessionStateListener>,
    ) -> Result<SessionHandle> {
        if self.options.fail_session {
            return Err(CamrecError::session_create("synthetic session refused"));
        }
        if self.containers.get(&container.0).is_none_or(|o| o.is_empty()) {
            return Err(CamrecError::session_create("output container is empty"));
        }

        let id = self.probe.0.lock().alloc(Kind::Session);
        self.sessions.insert(id, Arc::clone(&listener));
        std::thread::spawn(move || listener.on_ready());
        Ok(SessionHandle(id))
    }

    fn set_repeating_request(
        &mut self,
        session: SessionHandle,
        request: RequestHandle,
    ) -> Result<()> {
        let listener = self
            .sessions
            .get(&session.0)
            .cloned()
            .ok_or_else(|| CamrecError::camera(format!("Unknown {}", session)))?;
        let surfaces: Vec<Surface> = self
            .requests
            .get(&request.0)
            .ok_or_else(|| CamrecError::camera(format!("Unknown {}", request)))?
            .iter()
            .filter_map(|t| self.surfaces.get(t).cloned())
            .collect();

        self.stop_producer();

        let stop = Arc::new(AtomicBool::new(false));
        let producer_stop = Arc::clone(&stop);
        let probe = self.probe.clone();
        let fps = self.options.fps.max(1);
        let limit = self.options.frame_limit;

        let thread = std::thread::Builder::new()
            .name("camrec-synthetic-camera".to_string())
            .spawn(move || produce(surfaces, fps, limit, producer_stop, probe, listener))
            .map_err(|e| CamrecError::camera(format!("Failed to spawn camera thread: {}", e)))?;

        self.producer = Some(Producer {
            session: session.0,
            stop,
            thread,
        });
        self.probe.0.lock().repeating_requests += 1;
        Ok(())
    }

    fn stop_repeating(&mut self, session: SessionHandle) -> Result<()> {
        if self.producer.as_ref().is_some_and(|p| p.session == session.0) {
            self.stop_producer();
        }
        Ok(())
    }

    fn close_session(&mut self, session: SessionHandle) {
        if self.producer.as_ref().is_some_and(|p| p.session == session.0) {
            self.stop_producer();
        }
        if let Some(listener) = self.sessions.remove(&session.0) {
            std::thread::spawn(move || listener.on_closed());
        }
        self.probe.0.lock().free(Kind::Session, session.0);
    }
}

fn produce(
    surfaces: Vec<Surface>,
    fps: u32,
    limit: Option<u64>,
    stop: Arc<AtomicBool>,
    probe: CameraProbe,
    listener: Arc<dyn SessionStateListener>,
) {
    let interval = Duration::from_nanos(1_000_000_000 / fps as u64);
    let mut frame = 0u64;
    debug!(
        "Synthetic camera producing {} fps to {} target(s)",
        fps,
        surfaces.len()
    );

    while !stop.load(Ordering::SeqCst) && limit.is_none_or(|l| frame < l) {
        let timestamp_ns = frame * interval.as_nanos() as u64;
        for surface in &surfaces {
            match surface {
                Surface::Window(_) => probe.0.lock().preview_frames += 1,
                Surface::Reader(writer) => deliver(writer, frame, timestamp_ns, &probe),
            }
        }
        if frame == 0 {
            listener.on_active();
        }
        frame += 1;
        std::thread::sleep(interval);
    }
    debug!("Synthetic camera produced {} frames", frame);
}

fn deliver(writer: &ImageWriter, frame: u64, timestamp_ns: u64, probe: &CameraProbe) {
    if writer.is_closed() {
        return;
    }
    let (width, height) = writer.size();
    let image = test_pattern(width, height, writer.format(), frame, timestamp_ns);
    match writer.queue_image(image) {
        Ok(()) => probe.0.lock().frames_delivered += 1,
        Err(CamrecError::PoolExhausted { .. }) => probe.0.lock().frames_rejected += 1,
        Err(e) => trace!("Frame {} not delivered: {}", frame, e),
    }
}

/// Diagonal luma gradient that scrolls one pixel per frame
pub fn test_pattern(
    width: u32,
    height: u32,
    format: PixelFormat,
    frame: u64,
    timestamp_ns: u64,
) -> Image {
    let (w, h) = (width as usize, height as usize);
    let shift = frame as usize;
    let luma: Vec<u8> = (0..h)
        .flat_map(|y| (0..w).map(move |x| ((x + y + shift) & 0xFF) as u8))
        .collect();
    let chroma_len = w.div_ceil(2) * h.div_ceil(2);

    let planes = match format {
        PixelFormat::Yuv420 => vec![
            Plane {
                data: luma,
                row_stride: width,
                pixel_stride: 1,
            },
            Plane {
                data: vec![128; chroma_len],
                row_stride: width.div_ceil(2),
                pixel_stride: 1,
            },
            Plane {
                data: vec![128; chroma_len],
                row_stride: width.div_ceil(2),
                pixel_stride: 1,
            },
        ],
        PixelFormat::Nv12 => vec![
            Plane {
                data: luma,
                row_stride: width,
                pixel_stride: 1,
            },
            Plane {
                data: vec![128; chroma_len * 2],
                row_stride: width.div_ceil(2) * 2,
                pixel_stride: 2,
            },
        ],
        PixelFormat::Rgba8888 => vec![Plane {
            data: luma.iter().flat_map(|v| [*v, *v, *v, 0xFF]).collect(),
            row_stride: width * 4,
            pixel_stride: 4,
        }],
    };

    Image {
        width,
        height,
        format,
        timestamp_ns,
        planes,
    }
}
