//! Mock infrastructure for testing
//!
//! Provides a muxer that logs what it receives, an encoder that misbehaves
//! on purpose, and pipeline builders over the synthetic collaborators.

#![allow(dead_code)]

use camrec_core::capture::PoolPolicy;
use camrec_core::config::{ContainerFormat, RecordingConfig};
use camrec_core::encode::{
    BufferFlags, BufferInfo, EncoderFactory, EncoderFormat, EncoderOutput, MediaFormat,
    VideoEncoder,
};
use camrec_core::output::{Muxer, MuxerFactory, TrackIndex};
use camrec_core::synthetic::{
    CameraProbe, EncoderProbe, SyntheticCamera, SyntheticCameraOptions, SyntheticEncoderFactory,
    SyntheticEncoderOptions, SyntheticWindows, WindowProbe,
};
use camrec_core::{CameraPipeline, CamrecError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a [`LoggingMuxer`] was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxEvent {
    AddTrack(MediaFormat),
    Start,
    Sample {
        track: TrackIndex,
        presentation_time_us: i64,
        size: usize,
        key_frame: bool,
    },
    Stop,
}

/// Shared log of muxer calls
#[derive(Debug, Clone, Default)]
pub struct MuxLog(Arc<Mutex<Vec<MuxEvent>>>);

impl MuxLog {
    pub fn events(&self) -> Vec<MuxEvent> {
        self.0.lock().clone()
    }

    pub fn tracks(&self) -> usize {
        self.count(|e| matches!(e, MuxEvent::AddTrack(_)))
    }

    pub fn samples(&self) -> Vec<i64> {
        self.0
            .lock()
            .iter()
            .filter_map(|e| match e {
                MuxEvent::Sample {
                    presentation_time_us,
                    ..
                } => Some(*presentation_time_us),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> usize {
        self.count(|e| matches!(e, MuxEvent::Stop))
    }

    fn count(&self, f: impl Fn(&MuxEvent) -> bool) -> usize {
        self.0.lock().iter().filter(|e| f(e)).count()
    }

    fn push(&self, event: MuxEvent) {
        self.0.lock().push(event);
    }
}

/// Muxer that records calls instead of writing a container
pub struct LoggingMuxer {
    log: MuxLog,
    write_delay: Duration,
    _fd: OwnedFd,
}

impl Muxer for LoggingMuxer {
    fn add_track(&mut self, format: &MediaFormat) -> Result<TrackIndex> {
        self.log.push(MuxEvent::AddTrack(format.clone()));
        Ok(TrackIndex(0))
    }

    fn start(&mut self) -> Result<()> {
        self.log.push(MuxEvent::Start);
        Ok(())
    }

    fn write_sample(&mut self, track: TrackIndex, data: &[u8], info: &BufferInfo) -> Result<()> {
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        self.log.push(MuxEvent::Sample {
            track,
            presentation_time_us: info.presentation_time_us,
            size: data.len(),
            key_frame: info.flags.contains(BufferFlags::KEY_FRAME),
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.log.push(MuxEvent::Stop);
        Ok(())
    }
}

/// Factory handing out [`LoggingMuxer`]s that share one log
#[derive(Debug, Clone, Default)]
pub struct LoggingMuxerFactory {
    log: MuxLog,
    write_delay: Duration,
}

impl LoggingMuxerFactory {
    /// Muxers that sleep in every `write_sample`, like a slow disk
    pub fn slow(write_delay: Duration) -> Self {
        Self {
            log: MuxLog::default(),
            write_delay,
        }
    }

    pub fn log(&self) -> MuxLog {
        self.log.clone()
    }
}

impl MuxerFactory for LoggingMuxerFactory {
    fn create(&self, fd: OwnedFd, _format: ContainerFormat) -> Result<Box<dyn Muxer>> {
        Ok(Box::new(LoggingMuxer {
            log: self.log.clone(),
            write_delay: self.write_delay,
            _fd: fd,
        }))
    }
}

/// AVC encoder whose first output arrives before its format change
pub struct EarlyBufferEncoder {
    input: Vec<u8>,
    outputs: Vec<Vec<u8>>,
    pending: VecDeque<EncoderOutput>,
    format: Option<EncoderFormat>,
    format_sent: bool,
    frames: u64,
}

impl EarlyBufferEncoder {
    pub fn new() -> Self {
        Self {
            input: Vec::new(),
            outputs: Vec::new(),
            pending: VecDeque::new(),
            format: None,
            format_sent: false,
            frames: 0,
        }
    }
}

impl VideoEncoder for EarlyBufferEncoder {
    fn configure(&mut self, format: &EncoderFormat) -> Result<()> {
        format.validate()?;
        self.input = vec![0; format.input_frame_size()];
        self.format = Some(format.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout_us: i64) -> Result<Option<usize>> {
        Ok(Some(0))
    }

    fn input_buffer(&mut self, _index: usize) -> Result<&mut [u8]> {
        Ok(&mut self.input)
    }

    fn queue_input_buffer(
        &mut self,
        _index: usize,
        _size: usize,
        presentation_time_us: i64,
        _flags: BufferFlags,
    ) -> Result<()> {
        self.frames += 1;
        if self.frames > 1 && !self.format_sent {
            let format = self
                .format
                .as_ref()
                .ok_or_else(|| CamrecError::encoder("not configured"))?;
            self.pending.push_back(EncoderOutput::FormatChanged(MediaFormat {
                mime: format.mime.clone(),
                width: format.width,
                height: format.height,
                frame_rate: format.frame_rate,
                csd: vec![vec![0, 0, 0, 1, 0x67, 0x42], vec![0, 0, 0, 1, 0x68, 0xCE]],
            }));
            self.format_sent = true;
        }

        let index = self.outputs.len();
        self.outputs.push(vec![0, 0, 0, 1, 0x65, self.frames as u8]);
        self.pending.push_back(EncoderOutput::BufferReady {
            index,
            info: BufferInfo {
                offset: 0,
                size: 6,
                presentation_time_us,
                flags: BufferFlags::KEY_FRAME,
            },
        });
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout_us: i64) -> Result<EncoderOutput> {
        Ok(self.pending.pop_front().unwrap_or(EncoderOutput::TryAgainLater))
    }

    fn output_buffer(&self, index: usize) -> Result<&[u8]> {
        self.outputs
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| CamrecError::encoder(format!("no output buffer {}", index)))
    }

    fn release_output_buffer(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Factory for [`EarlyBufferEncoder`]
pub struct EarlyBufferEncoderFactory;

impl EncoderFactory for EarlyBufferEncoderFactory {
    fn create_encoder(&self, _mime: &str) -> Result<Box<dyn VideoEncoder>> {
        Ok(Box::new(EarlyBufferEncoder::new()))
    }
}

/// Synthetic encoder that notes how many repeating requests were live at
/// `start()`, and can be told to never free an input buffer
pub struct InspectingEncoder {
    inner: Box<dyn VideoEncoder>,
    camera: CameraProbe,
    starts: Arc<Mutex<Vec<u64>>>,
    starved: bool,
}

impl VideoEncoder for InspectingEncoder {
    fn configure(&mut self, format: &EncoderFormat) -> Result<()> {
        self.inner.configure(format)
    }

    fn start(&mut self) -> Result<()> {
        self.starts.lock().push(self.camera.repeating_requests());
        self.inner.start()
    }

    fn dequeue_input_buffer(&mut self, timeout_us: i64) -> Result<Option<usize>> {
        if self.starved {
            return Ok(None);
        }
        self.inner.dequeue_input_buffer(timeout_us)
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8]> {
        self.inner.input_buffer(index)
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        self.inner
            .queue_input_buffer(index, size, presentation_time_us, flags)
    }

    fn dequeue_output_buffer(&mut self, timeout_us: i64) -> Result<EncoderOutput> {
        self.inner.dequeue_output_buffer(timeout_us)
    }

    fn output_buffer(&self, index: usize) -> Result<&[u8]> {
        self.inner.output_buffer(index)
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        self.inner.release_output_buffer(index)
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.stop()
    }
}

/// Factory wrapping synthetic encoders in [`InspectingEncoder`]
pub struct InspectingEncoderFactory {
    inner: SyntheticEncoderFactory,
    camera: CameraProbe,
    starts: Arc<Mutex<Vec<u64>>>,
    starved: bool,
}

impl InspectingEncoderFactory {
    pub fn new(camera: CameraProbe) -> Self {
        Self {
            inner: SyntheticEncoderFactory::default(),
            camera,
            starts: Arc::default(),
            starved: false,
        }
    }

    /// Encoders whose input pool is always empty
    pub fn starved(mut self) -> Self {
        self.starved = true;
        self
    }

    /// Repeating requests seen by each `start()`
    pub fn starts(&self) -> Arc<Mutex<Vec<u64>>> {
        Arc::clone(&self.starts)
    }
}

impl EncoderFactory for InspectingEncoderFactory {
    fn create_encoder(&self, mime: &str) -> Result<Box<dyn VideoEncoder>> {
        Ok(Box::new(InspectingEncoder {
            inner: self.inner.create_encoder(mime)?,
            camera: self.camera.clone(),
            starts: Arc::clone(&self.starts),
            starved: self.starved,
        }))
    }
}

/// Probes for everything a test pipeline touches
pub struct Harness {
    pub pipeline: CameraPipeline,
    pub camera: CameraProbe,
    pub windows: WindowProbe,
    pub encoder: EncoderProbe,
    pub mux: MuxLog,
}

/// Small, fast configuration for pipeline tests
pub fn test_config() -> RecordingConfig {
    RecordingConfig::default()
        .with_preset("64x48@30".parse().unwrap())
        .with_pool(5, PoolPolicy::Reject)
}

/// Pipeline over a synthetic camera producing `frame_limit` frames
pub fn harness(camera: SyntheticCameraOptions, encoder: SyntheticEncoderOptions) -> Harness {
    harness_with_muxers(camera, encoder, LoggingMuxerFactory::default())
}

/// Like [`harness`], with the given muxer factory
pub fn harness_with_muxers(
    camera: SyntheticCameraOptions,
    encoder: SyntheticEncoderOptions,
    muxers: LoggingMuxerFactory,
) -> Harness {
    let camera = SyntheticCamera::new(camera);
    let windows = SyntheticWindows::new(64, 48);
    let encoders = SyntheticEncoderFactory::new(encoder);

    let probes = (camera.probe(), windows.probe(), encoders.probe(), muxers.log());
    let pipeline = CameraPipeline::builder()
        .with_camera(camera)
        .with_windows(windows)
        .with_encoders(encoders)
        .with_muxers(muxers)
        .with_config(test_config())
        .build()
        .unwrap();

    Harness {
        pipeline,
        camera: probes.0,
        windows: probes.1,
        encoder: probes.2,
        mux: probes.3,
    }
}

/// Camera options for a fast camera stopping after `frames`
pub fn fast_camera(frames: Option<u64>) -> SyntheticCameraOptions {
    SyntheticCameraOptions {
        fps: 200,
        frame_limit: frames,
        ..Default::default()
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// A writable temporary file
pub fn output_file() -> std::fs::File {
    tempfile::tempfile().unwrap()
}
