//! Capture → encode → mux pipeline
//!
//! Orchestrates the camera session, the preview window, the frame pool, the
//! encoder and the muxer for three usage patterns:
//!
//! - Preview only: [`set_surface`](CameraPipeline::set_surface) then
//!   [`open_camera`](CameraPipeline::open_camera) /
//!   [`close_camera`](CameraPipeline::close_camera)
//! - Preview with its own window: [`start_preview`](CameraPipeline::start_preview) /
//!   [`stop_preview`](CameraPipeline::stop_preview)
//! - Recording: [`start_recording`](CameraPipeline::start_recording) /
//!   [`stop_recording`](CameraPipeline::stop_recording)
//!
//! Frames reach the encoder on the camera's own thread. The encoder and muxer
//! live in a slot behind one mutex shared by that thread and the teardown
//! path, so a sample is either written before `stop_recording` takes the
//! slot or its frame is dropped.

use parking_lot::Mutex;
use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::capture::{
    CameraBackend, CaptureSessionManager, DeviceStateListener, ImageConsumer, ImageReader,
    NativeWindow, PreviewSink, SessionState, SessionStateListener, Target, WindowSystem,
};
use crate::config::RecordingConfig;
use crate::encode::{BufferFlags, EncoderFactory, EncoderStage, OutputEvent};
use crate::error::{CamrecError, Result};
use crate::output::{duplicate_output_fd, FileMuxerFactory, MuxerFactory, MuxerStage};
use crate::types::{CameraEvent, Handle, Image, PixelFormat, RequestTemplate, SurfaceId, TargetPurpose};

/// Capacity of the camera event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What the pipeline is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// No camera open
    Idle,
    /// Camera streaming to the preview window
    PreviewOnly,
    /// Camera streaming to the preview window and the encoder
    Recording,
}

/// Who acquired the current window and therefore when it goes back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowOrigin {
    /// `set_surface`: kept until `shutdown` or the next `set_surface`
    Surface,
    /// `start_preview` / `start_recording`: released by the matching stop
    Session,
}

#[derive(Debug, Default)]
struct Counters {
    frames_encoded: AtomicU64,
    frames_dropped: AtomicU64,
    frames_skipped: AtomicU64,
    samples_written: AtomicU64,
    samples_before_track: AtomicU64,
}

/// Routes camera callbacks to the log and to subscribers
struct EventDispatcher {
    pipeline: Handle,
    events: broadcast::Sender<CameraEvent>,
    session_active: AtomicBool,
}

impl EventDispatcher {
    fn publish(&self, event: CameraEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl DeviceStateListener for EventDispatcher {
    fn on_disconnected(&self, camera_id: &str) {
        warn!("Pipeline {}: camera {} disconnected", self.pipeline, camera_id);
        self.session_active.store(false, Ordering::SeqCst);
        self.publish(CameraEvent::DeviceDisconnected {
            camera_id: camera_id.to_string(),
        });
    }

    fn on_error(&self, camera_id: &str, code: i32) {
        error!(
            "Pipeline {}: camera {} reported error {}",
            self.pipeline, camera_id, code
        );
        self.publish(CameraEvent::DeviceError {
            camera_id: camera_id.to_string(),
            code,
        });
    }
}

impl SessionStateListener for EventDispatcher {
    fn on_ready(&self) {
        debug!("Pipeline {}: capture session ready", self.pipeline);
        self.publish(CameraEvent::SessionReady);
    }

    fn on_active(&self) {
        debug!("Pipeline {}: capture session active", self.pipeline);
        self.session_active.store(true, Ordering::SeqCst);
        self.publish(CameraEvent::SessionActive);
    }

    fn on_closed(&self) {
        debug!("Pipeline {}: capture session closed", self.pipeline);
        self.session_active.store(false, Ordering::SeqCst);
        self.publish(CameraEvent::SessionClosed);
    }
}

/// Result of a finished recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    /// Frames handed to the encoder
    pub frames_encoded: u64,
    /// Frames dropped (no encoder buffer or encode failure)
    pub frames_dropped: u64,
    /// Samples written to the container
    pub samples_written: u64,
    /// Payload bytes written to the container
    pub bytes_written: u64,
    /// Encoder buffers released unwritten because no track existed yet
    pub samples_before_track: u64,
    /// First and last presentation time written (µs)
    pub pts_range_us: Option<(i64, i64)>,
    /// Whether the container was finalized without error
    pub finalized: bool,
    /// Wall-clock duration of the recording
    pub elapsed: Duration,
}

impl std::fmt::Display for RecordingSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} samples ({} bytes) from {} frames, {} dropped, in {:.1}s{}",
            self.samples_written,
            self.bytes_written,
            self.frames_encoded,
            self.frames_dropped,
            self.elapsed.as_secs_f64(),
            if self.finalized { "" } else { " (not finalized)" }
        )
    }
}

/// Encoder and muxer of one recording, guarded by the pipeline mutex
struct Recorder {
    encoder: EncoderStage,
    muxer: MuxerStage,
    input_timeout_us: i64,
    output_timeout_us: i64,
    counters: Arc<Counters>,
    started: Instant,
    frames_encoded: u64,
    frames_dropped: u64,
    samples_before_track: u64,
    pts_range_us: Option<(i64, i64)>,
}

impl Recorder {
    fn new(
        encoder: EncoderStage,
        muxer: MuxerStage,
        config: &RecordingConfig,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            encoder,
            muxer,
            input_timeout_us: config.input_timeout_us,
            output_timeout_us: config.output_timeout_us,
            counters,
            started: Instant::now(),
            frames_encoded: 0,
            frames_dropped: 0,
            samples_before_track: 0,
            pts_range_us: None,
        }
    }

    fn drop_frame(&mut self) {
        self.frames_dropped += 1;
        self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy plane 0 of `image` into the encoder, then drain its output
    fn encode_frame(&mut self, image: &Image) -> Result<()> {
        let plane = image
            .plane(0)
            .ok_or_else(|| CamrecError::camera("Frame has no planes"))?;
        let presentation_time_us = (image.timestamp_ns / 1_000) as i64;

        let queued = match self.encoder.dequeue_input(self.input_timeout_us)? {
            Some(mut slot) => {
                let size = slot.write(&plane.data)?;
                slot.queue(size, presentation_time_us, BufferFlags::NONE)?;
                true
            }
            None => false,
        };

        if queued {
            self.frames_encoded += 1;
            self.counters.frames_encoded.fetch_add(1, Ordering::Relaxed);
        } else {
            trace!("No encoder input buffer, frame at {}µs dropped", presentation_time_us);
            self.drop_frame();
        }

        self.drain()?;
        Ok(())
    }

    /// Move every available encoder output into the muxer
    fn drain(&mut self) -> Result<usize> {
        let mut written = 0;
        loop {
            match self.encoder.dequeue_output(self.output_timeout_us)? {
                OutputEvent::Empty => return Ok(written),
                OutputEvent::FormatChanged(format) => {
                    if self.muxer.track().is_none() {
                        self.muxer.add_track(&format)?;
                        self.muxer.start()?;
                    }
                }
                OutputEvent::BufferReady(slot) => {
                    let info = slot.info();
                    if info.flags.contains(BufferFlags::CODEC_CONFIG) {
                        // Parameter sets already went out with the format
                        slot.release()?;
                        continue;
                    }
                    let Some(track) = self.muxer.track() else {
                        self.samples_before_track += 1;
                        self.counters
                            .samples_before_track
                            .fetch_add(1, Ordering::Relaxed);
                        warn!("Encoder output before format change, buffer released unwritten");
                        slot.release()?;
                        continue;
                    };

                    let end_of_stream = info.flags.contains(BufferFlags::END_OF_STREAM);
                    if info.size > 0 {
                        self.muxer.write_sample(track, slot.data()?, &info)?;
                        written += 1;
                        self.counters.samples_written.fetch_add(1, Ordering::Relaxed);
                        let pts = info.presentation_time_us;
                        self.pts_range_us = Some(match self.pts_range_us {
                            Some((first, _)) => (first, pts),
                            None => (pts, pts),
                        });
                    }
                    slot.release()?;
                    if end_of_stream {
                        return Ok(written);
                    }
                }
            }
        }
    }

    /// Drain, stop the encoder, then finalize the muxer
    fn finish(mut self) -> RecordingSummary {
        if let Err(e) = self.drain() {
            warn!("Final encoder drain failed: {}", e);
        }
        if let Err(e) = self.encoder.stop() {
            warn!("Failed to stop encoder: {}", e);
        }
        let finalized = match self.muxer.stop() {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to finalize recording: {}", e);
                false
            }
        };

        RecordingSummary {
            frames_encoded: self.frames_encoded,
            frames_dropped: self.frames_dropped,
            samples_written: self.muxer.samples_written(),
            bytes_written: self.muxer.bytes_written(),
            samples_before_track: self.samples_before_track,
            pts_range_us: self.pts_range_us,
            finalized,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Slot shared between the camera thread and the teardown path
type RecorderSlot = Arc<Mutex<Option<Recorder>>>;

fn on_image_available(consumer: &ImageConsumer, slot: &Mutex<Option<Recorder>>, counters: &Counters) {
    let lease = match consumer.acquire_latest_image() {
        Ok(Some(lease)) => lease,
        Ok(None) => return,
        Err(e) => {
            debug!("Could not acquire frame: {}", e);
            counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    {
        let mut guard = slot.lock();
        match guard.as_mut() {
            Some(recorder) => {
                if let Err(e) = recorder.encode_frame(lease.image()) {
                    warn!("Failed to encode frame: {}", e);
                    recorder.drop_frame();
                }
            }
            None => {
                trace!("Recorder gone, frame dropped");
                counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    lease.release();
}

/// Builds a [`CameraPipeline`] from its collaborators
pub struct PipelineBuilder {
    camera: Option<Box<dyn CameraBackend>>,
    windows: Option<Box<dyn WindowSystem>>,
    encoders: Option<Box<dyn EncoderFactory>>,
    muxers: Option<Box<dyn MuxerFactory>>,
    config: RecordingConfig,
}

impl PipelineBuilder {
    /// Start with no collaborators and the default configuration
    pub fn new() -> Self {
        Self {
            camera: None,
            windows: None,
            encoders: None,
            muxers: None,
            config: RecordingConfig::default(),
        }
    }

    /// Set the camera backend
    pub fn with_camera(mut self, camera: impl CameraBackend + 'static) -> Self {
        self.camera = Some(Box::new(camera));
        self
    }

    /// Set the window system
    pub fn with_windows(mut self, windows: impl WindowSystem + 'static) -> Self {
        self.windows = Some(Box::new(windows));
        self
    }

    /// Set the encoder factory
    pub fn with_encoders(mut self, encoders: impl EncoderFactory + 'static) -> Self {
        self.encoders = Some(Box::new(encoders));
        self
    }

    /// Set the muxer factory (defaults to [`FileMuxerFactory`])
    pub fn with_muxers(mut self, muxers: impl MuxerFactory + 'static) -> Self {
        self.muxers = Some(Box::new(muxers));
        self
    }

    /// Set the recording configuration
    pub fn with_config(mut self, config: RecordingConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and create the pipeline
    pub fn build(self) -> Result<CameraPipeline> {
        let camera = self
            .camera
            .ok_or_else(|| CamrecError::config("Pipeline needs a camera backend"))?;
        let windows = self
            .windows
            .ok_or_else(|| CamrecError::config("Pipeline needs a window system"))?;
        let encoders = self
            .encoders
            .ok_or_else(|| CamrecError::config("Pipeline needs an encoder factory"))?;
        let muxers = self.muxers.unwrap_or_else(|| Box::new(FileMuxerFactory));

        self.config.validate_strict()?;
        for warning in self.config.validate() {
            warn!("{}", warning);
        }

        let handle = Handle::new();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let dispatcher = Arc::new(EventDispatcher {
            pipeline: handle,
            events,
            session_active: AtomicBool::new(false),
        });
        let session = CaptureSessionManager::new(camera, Arc::clone(&dispatcher) as _);

        info!(
            "Pipeline {} configured: {} {}x{} @ {}fps, {} kbps, {}",
            handle,
            self.config.codec,
            self.config.width(),
            self.config.height(),
            self.config.fps(),
            self.config.effective_bitrate(),
            self.config.container
        );

        Ok(CameraPipeline {
            handle,
            config: self.config,
            session,
            windows,
            encoders,
            muxers,
            window: None,
            preview: None,
            reader: None,
            recorder: None,
            mode: PipelineMode::Idle,
            dispatcher,
            counters: Arc::new(Counters::default()),
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Camera capture pipeline
///
/// Control methods are meant to be called from one thread. Camera callbacks
/// arrive on collaborator threads and are never awaited.
pub struct CameraPipeline {
    handle: Handle,
    config: RecordingConfig,
    session: CaptureSessionManager,
    windows: Box<dyn WindowSystem>,
    encoders: Box<dyn EncoderFactory>,
    muxers: Box<dyn MuxerFactory>,
    window: Option<(NativeWindow, WindowOrigin)>,
    preview: Option<PreviewSink>,
    reader: Option<ImageReader>,
    recorder: Option<RecorderSlot>,
    mode: PipelineMode,
    dispatcher: Arc<EventDispatcher>,
    counters: Arc<Counters>,
}

impl CameraPipeline {
    /// Start building a pipeline
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Get the pipeline handle
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Current mode
    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    /// Recording configuration
    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Capture session state
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Whether the camera reported the session as producing frames
    pub fn is_session_active(&self) -> bool {
        self.dispatcher.session_active.load(Ordering::SeqCst)
    }

    /// Whether a window is currently held
    pub fn has_window(&self) -> bool {
        self.window.is_some()
    }

    /// Subscribe to camera events
    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.dispatcher.events.subscribe()
    }

    /// Replace the preview window
    pub fn set_surface(&mut self, surface: SurfaceId) -> Result<()> {
        if self.mode != PipelineMode::Idle {
            return Err(CamrecError::invalid_sequence("set surface", self.mode));
        }
        self.release_window();
        let window = self.windows.acquire(surface)?;
        info!(
            "Pipeline {}: window {:?} acquired for {}",
            self.handle,
            window.handle(),
            surface
        );
        self.window = Some((window, WindowOrigin::Surface));
        Ok(())
    }

    /// Open the camera and stream to the window from [`set_surface`](Self::set_surface)
    pub fn open_camera(&mut self) -> Result<()> {
        if self.mode != PipelineMode::Idle {
            return Err(CamrecError::SessionAlreadyRunning);
        }
        if self.window.is_none() {
            return Err(CamrecError::NoSurface);
        }
        self.start_preview_session()
    }

    /// Stop whatever the camera is doing; the `set_surface` window is kept
    pub fn close_camera(&mut self) {
        match self.mode {
            PipelineMode::Recording => {
                self.finish_recording();
            }
            PipelineMode::PreviewOnly => {
                self.teardown_preview();
                if matches!(self.window, Some((_, WindowOrigin::Session))) {
                    self.release_window();
                }
            }
            PipelineMode::Idle => self.session.close(),
        }
    }

    /// Acquire a window for `surface` and start previewing to it
    pub fn start_preview(&mut self, surface: SurfaceId) -> Result<()> {
        if self.mode != PipelineMode::Idle {
            return Err(CamrecError::SessionAlreadyRunning);
        }
        self.acquire_session_window(surface)?;
        if let Err(e) = self.start_preview_session() {
            self.release_window();
            return Err(e);
        }
        Ok(())
    }

    /// Stop the preview and release its window
    pub fn stop_preview(&mut self) {
        match self.mode {
            PipelineMode::Recording => {
                self.finish_recording();
            }
            PipelineMode::PreviewOnly | PipelineMode::Idle => {
                self.teardown_preview();
                self.release_window();
            }
        }
    }

    /// Start recording to `fd` while previewing to `surface`
    ///
    /// `fd` must be open for writing; the pipeline writes to a duplicate and
    /// never closes the caller's descriptor.
    pub fn start_recording(&mut self, fd: BorrowedFd<'_>, surface: SurfaceId) -> Result<()> {
        if self.mode != PipelineMode::Idle {
            return Err(CamrecError::SessionAlreadyRunning);
        }
        let output = duplicate_output_fd(fd)?;

        self.acquire_session_window(surface)?;
        match self.build_recording(output) {
            Ok(()) => {
                self.mode = PipelineMode::Recording;
                info!(
                    "Pipeline {}: recording {} to {}",
                    self.handle, self.config.preset, self.config.container
                );
                Ok(())
            }
            Err(e) => {
                error!("Pipeline {}: failed to start recording: {}", self.handle, e);
                self.teardown_recording();
                self.release_window();
                Err(e)
            }
        }
    }

    /// Stop recording and finalize the container
    ///
    /// Returns `Ok(None)` when nothing was recording.
    pub fn stop_recording(&mut self) -> Result<Option<RecordingSummary>> {
        if self.mode != PipelineMode::Recording {
            debug!("Pipeline {}: stop_recording while {:?}", self.handle, self.mode);
            return Ok(None);
        }
        Ok(self.finish_recording())
    }

    /// Tear down every mode and release any window
    pub fn shutdown(&mut self) {
        self.close_camera();
        self.session.close();
        self.release_window();
        debug!("Pipeline {} shut down", self.handle);
    }

    /// Get pipeline statistics
    pub fn stats(&self) -> PipelineStats {
        let live_skipped = self
            .reader
            .as_ref()
            .map(|r| r.stats().frames_skipped)
            .unwrap_or(0);
        PipelineStats {
            handle: self.handle,
            mode: self.mode,
            session_state: self.session.state(),
            session_active: self.is_session_active(),
            resolution: (self.config.width(), self.config.height()),
            fps: self.config.fps(),
            codec: self.config.codec.display_name().to_string(),
            bitrate: self.config.effective_bitrate(),
            frames_encoded: self.counters.frames_encoded.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
            frames_skipped: self.counters.frames_skipped.load(Ordering::Relaxed) + live_skipped,
            samples_written: self.counters.samples_written.load(Ordering::Relaxed),
            samples_before_track: self.counters.samples_before_track.load(Ordering::Relaxed),
        }
    }

    fn acquire_session_window(&mut self, surface: SurfaceId) -> Result<()> {
        self.release_window();
        let window = self.windows.acquire(surface)?;
        debug!(
            "Pipeline {}: window {:?} acquired for {}",
            self.handle,
            window.handle(),
            surface
        );
        self.window = Some((window, WindowOrigin::Session));
        Ok(())
    }

    fn release_window(&mut self) {
        if let Some((window, _)) = self.window.take() {
            debug!("Pipeline {}: window {:?} released", self.handle, window.handle());
            self.windows.release(window);
        }
    }

    fn start_preview_session(&mut self) -> Result<()> {
        let result = self.build_preview();
        match result {
            Ok(()) => {
                self.mode = PipelineMode::PreviewOnly;
                info!("Pipeline {}: preview running", self.handle);
                Ok(())
            }
            Err(e) => {
                error!("Pipeline {}: failed to start preview: {}", self.handle, e);
                self.teardown_preview();
                Err(e)
            }
        }
    }

    fn build_preview(&mut self) -> Result<()> {
        let (window, _) = self.window.as_ref().ok_or(CamrecError::NoSurface)?;
        let preview = PreviewSink::bind(window);
        let target = preview.target();
        self.preview = Some(preview);

        self.session.open(RequestTemplate::Preview)?;
        self.session.attach_target(&target)?;
        self.session
            .create_session(Arc::clone(&self.dispatcher) as Arc<dyn SessionStateListener>)?;
        self.session.set_repeating_request()?;
        Ok(())
    }

    fn teardown_preview(&mut self) {
        if let Some(mut preview) = self.preview.take() {
            preview.unbind(&mut self.session);
        }
        self.session.close();
        self.mode = PipelineMode::Idle;
    }

    fn build_recording(&mut self, output: std::os::fd::OwnedFd) -> Result<()> {
        let (window, _) = self.window.as_ref().ok_or(CamrecError::NoSurface)?;
        let preview = PreviewSink::bind(window);
        let preview_target = preview.target();
        self.preview = Some(preview);

        self.session.open(RequestTemplate::StillCapture)?;

        let encoder = self.encoders.create_encoder(self.config.codec.mime())?;
        let mut encoder = EncoderStage::configure(encoder, self.config.encoder_format())?;
        let muxer = MuxerStage::new(self.muxers.create(output, self.config.container)?);

        let reader = ImageReader::new(
            self.config.width(),
            self.config.height(),
            PixelFormat::Yuv420,
            self.config.pool_capacity,
            self.config.pool_policy,
        )?;
        let slot: RecorderSlot = Arc::new(Mutex::new(None));
        let listener_slot = Arc::clone(&slot);
        let listener_counters = Arc::clone(&self.counters);
        reader.set_on_image_available(move |consumer| {
            on_image_available(consumer, &listener_slot, &listener_counters)
        });
        let frame_source = Target::frame_source(reader.writer());
        self.reader = Some(reader);
        self.recorder = Some(Arc::clone(&slot));

        self.session.attach_target(&preview_target)?;
        self.session.attach_target(&frame_source)?;
        self.session
            .create_session(Arc::clone(&self.dispatcher) as Arc<dyn SessionStateListener>)?;

        // Early frames wait on the slot until the encoder is running
        let mut guard = slot.lock();
        self.session.set_repeating_request()?;
        encoder.start()?;
        *guard = Some(Recorder::new(
            encoder,
            muxer,
            &self.config,
            Arc::clone(&self.counters),
        ));
        Ok(())
    }

    /// Recording teardown; leaves the window alone
    fn teardown_recording(&mut self) -> Option<RecordingSummary> {
        let summary = self.recorder.as_ref().and_then(|slot| {
            let mut guard = slot.lock();
            guard.take().map(Recorder::finish)
        });

        let released = self.session.release_targets(TargetPurpose::FrameSource);
        trace!("{} frame-source target(s) released", released);

        if let Some(reader) = self.reader.take() {
            self.counters
                .frames_skipped
                .fetch_add(reader.stats().frames_skipped, Ordering::Relaxed);
            reader.close();
        }

        if let Some(mut preview) = self.preview.take() {
            preview.unbind(&mut self.session);
        }
        self.session.close();

        self.recorder = None;
        self.mode = PipelineMode::Idle;
        summary
    }

    fn finish_recording(&mut self) -> Option<RecordingSummary> {
        let summary = self.teardown_recording();
        self.release_window();
        match &summary {
            Some(summary) => info!("Pipeline {}: recording stopped: {}", self.handle, summary),
            None => warn!("Pipeline {}: recording stopped without a recorder", self.handle),
        }
        summary
    }
}

impl Drop for CameraPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Pipeline statistics
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Pipeline handle
    pub handle: Handle,
    /// Current mode
    pub mode: PipelineMode,
    /// Capture session state
    pub session_state: SessionState,
    /// Whether the session reported itself active
    pub session_active: bool,
    /// Output resolution
    pub resolution: (u32, u32),
    /// Target framerate
    pub fps: u32,
    /// Codec name
    pub codec: String,
    /// Target bitrate in kbps
    pub bitrate: u32,
    /// Frames handed to the encoder
    pub frames_encoded: u64,
    /// Frames dropped before the encoder
    pub frames_dropped: u64,
    /// Frames skipped by latest-image acquisition
    pub frames_skipped: u64,
    /// Samples written to the container
    pub samples_written: u64,
    /// Encoder buffers released before the track existed
    pub samples_before_track: u64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline {}: {:?} ({:?}) - {}x{} @ {}fps, {} @ {}kbps, {} frames encoded, {} dropped, {} skipped, {} samples",
            self.handle,
            self.mode,
            self.session_state,
            self.resolution.0,
            self.resolution.1,
            self.fps,
            self.codec,
            self.bitrate,
            self.frames_encoded,
            self.frames_dropped,
            self.frames_skipped,
            self.samples_written
        )
    }
}
