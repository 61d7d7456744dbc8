//! Container output
//!
//! Supports two containers:
//! - Annex-B H.264/H.265 elementary streams (always available)
//! - MPEG-4 via FFmpeg (`ffmpeg` feature)
//!
//! [`MuxerStage`] enforces the track → start → write → stop order on top of
//! whichever [`Muxer`] the [`MuxerFactory`] produced.

mod annexb;
#[cfg(feature = "ffmpeg")]
mod mp4;

pub use annexb::AnnexBMuxer;
#[cfg(feature = "ffmpeg")]
pub use mp4::Mp4Muxer;

pub use crate::config::ContainerFormat;

use std::fs::File;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use tracing::{debug, info, warn};

use crate::encode::{BufferInfo, MediaFormat};
use crate::error::{CamrecError, Result};

/// Index of a track inside a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackIndex(pub usize);

impl std::fmt::Display for TrackIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track {}", self.0)
    }
}

/// Container writer
///
/// Implementations may assume calls arrive in the order enforced by
/// [`MuxerStage`].
pub trait Muxer: Send {
    /// Add a track described by the encoder's output format
    fn add_track(&mut self, format: &MediaFormat) -> Result<TrackIndex>;

    /// Write the container header
    fn start(&mut self) -> Result<()>;

    /// Write one compressed sample
    fn write_sample(&mut self, track: TrackIndex, data: &[u8], info: &BufferInfo) -> Result<()>;

    /// Finalize the container
    fn stop(&mut self) -> Result<()>;
}

/// Creates muxers writing to a file descriptor
pub trait MuxerFactory: Send + Sync {
    /// Create a muxer that owns `fd`
    fn create(&self, fd: OwnedFd, format: ContainerFormat) -> Result<Box<dyn Muxer>>;
}

/// Muxer stage state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerState {
    /// No track yet
    Created,
    /// Track added, header not written
    TrackAdded,
    /// Accepting samples
    Started,
    /// Finalized
    Stopped,
}

/// A muxer with a single video track and a strict call order
pub struct MuxerStage {
    muxer: Box<dyn Muxer>,
    state: MuxerState,
    track: Option<TrackIndex>,
    samples_written: u64,
    bytes_written: u64,
}

impl MuxerStage {
    /// Wrap a freshly created muxer
    pub fn new(muxer: Box<dyn Muxer>) -> Self {
        Self {
            muxer,
            state: MuxerState::Created,
            track: None,
            samples_written: 0,
            bytes_written: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> MuxerState {
        self.state
    }

    /// The video track, once added
    pub fn track(&self) -> Option<TrackIndex> {
        self.track
    }

    /// Samples written so far
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Payload bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Add the video track; only one is accepted
    pub fn add_track(&mut self, format: &MediaFormat) -> Result<TrackIndex> {
        if self.track.is_some() {
            return Err(CamrecError::TrackAlreadyAdded);
        }
        if self.state != MuxerState::Created {
            return Err(CamrecError::invalid_sequence("add track", self.state));
        }
        let track = self.muxer.add_track(format)?;
        self.track = Some(track);
        self.state = MuxerState::TrackAdded;
        info!(
            "Muxer {} added: {} {}x{}",
            track, format.mime, format.width, format.height
        );
        Ok(track)
    }

    /// Write the header and start accepting samples
    pub fn start(&mut self) -> Result<()> {
        if self.state != MuxerState::TrackAdded {
            return Err(CamrecError::invalid_sequence("start muxer", self.state));
        }
        self.muxer.start()?;
        self.state = MuxerState::Started;
        debug!("Muxer started");
        Ok(())
    }

    /// Write one sample to `track`
    pub fn write_sample(&mut self, track: TrackIndex, data: &[u8], info: &BufferInfo) -> Result<()> {
        if self.state != MuxerState::Started {
            return Err(CamrecError::invalid_sequence("write sample", self.state));
        }
        if self.track != Some(track) {
            return Err(CamrecError::muxer(format!("Unknown {}", track)));
        }
        self.muxer.write_sample(track, data, info)?;
        self.samples_written += 1;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Finalize the container; later calls are no-ops
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            MuxerState::Stopped => Ok(()),
            MuxerState::Started => {
                self.state = MuxerState::Stopped;
                self.muxer.stop()?;
                info!(
                    "Muxer stopped: {} samples, {} bytes",
                    self.samples_written, self.bytes_written
                );
                Ok(())
            }
            MuxerState::Created | MuxerState::TrackAdded => {
                self.state = MuxerState::Stopped;
                warn!("Muxer stopped before any sample could be written");
                Ok(())
            }
        }
    }
}

impl Drop for MuxerStage {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop muxer: {}", e);
        }
    }
}

/// Muxer factory writing Annex-B or (with the `ffmpeg` feature) MPEG-4
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMuxerFactory;

impl MuxerFactory for FileMuxerFactory {
    fn create(&self, fd: OwnedFd, format: ContainerFormat) -> Result<Box<dyn Muxer>> {
        debug!("Creating {} muxer on fd {}", format, fd.as_raw_fd());
        match format {
            ContainerFormat::H264AnnexB => Ok(Box::new(AnnexBMuxer::new(File::from(fd)))),
            #[cfg(feature = "ffmpeg")]
            ContainerFormat::Mpeg4 => Ok(Box::new(Mp4Muxer::from_fd(fd)?)),
            #[cfg(not(feature = "ffmpeg"))]
            ContainerFormat::Mpeg4 => Err(CamrecError::Unsupported(
                "MPEG-4 output requires the 'ffmpeg' feature".to_string(),
            )),
        }
    }
}

/// Check that `fd` is open for writing and duplicate it
///
/// The caller keeps ownership of `fd`; the returned descriptor belongs to
/// the muxer.
pub fn duplicate_output_fd(fd: BorrowedFd<'_>) -> Result<OwnedFd> {
    let raw = fd.as_raw_fd();

    // SAFETY: F_GETFL only reads descriptor flags; `fd` is borrowed and open.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(CamrecError::InvalidDescriptor(format!(
            "fd {}: {}",
            raw,
            std::io::Error::last_os_error()
        )));
    }
    let access = flags & libc::O_ACCMODE;
    if access != libc::O_WRONLY && access != libc::O_RDWR {
        return Err(CamrecError::InvalidDescriptor(format!(
            "fd {} is not open for writing",
            raw
        )));
    }

    // SAFETY: lseek with SEEK_CUR does not move the offset.
    let offset = unsafe { libc::lseek(raw, 0, libc::SEEK_CUR) };
    if offset > 0 {
        warn!("Output fd {} is at offset {}, not at the start", raw, offset);
    }

    Ok(fd.try_clone_to_owned()?)
}

/// Whether `data` begins with an Annex-B start code
pub(crate) fn has_start_code(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 0, 1]) || data.starts_with(&[0, 0, 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        tracks: usize,
        samples: Vec<i64>,
        stopped: usize,
    }

    struct LogMuxer(Arc<Mutex<Log>>);

    impl Muxer for LogMuxer {
        fn add_track(&mut self, _format: &MediaFormat) -> Result<TrackIndex> {
            let mut log = self.0.lock().unwrap();
            log.tracks += 1;
            Ok(TrackIndex(log.tracks - 1))
        }

        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn write_sample(&mut self, _track: TrackIndex, _data: &[u8], info: &BufferInfo) -> Result<()> {
            self.0.lock().unwrap().samples.push(info.presentation_time_us);
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.0.lock().unwrap().stopped += 1;
            Ok(())
        }
    }

    fn media_format() -> MediaFormat {
        MediaFormat {
            mime: crate::encode::MIME_AVC.to_string(),
            width: 640,
            height: 480,
            frame_rate: 15,
            csd: vec![],
        }
    }

    fn stage() -> (MuxerStage, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        (MuxerStage::new(Box::new(LogMuxer(Arc::clone(&log)))), log)
    }

    #[test]
    fn test_single_track() {
        let (mut stage, log) = stage();
        let track = stage.add_track(&media_format()).unwrap();
        assert_eq!(track, TrackIndex(0));
        assert!(matches!(
            stage.add_track(&media_format()),
            Err(CamrecError::TrackAlreadyAdded)
        ));
        assert_eq!(log.lock().unwrap().tracks, 1);
    }

    #[test]
    fn test_call_order_enforced() {
        let (mut stage, _log) = stage();
        assert!(matches!(stage.start(), Err(CamrecError::InvalidSequence { .. })));
        let track = stage.add_track(&media_format()).unwrap();
        assert!(matches!(
            stage.write_sample(track, &[1], &BufferInfo::default()),
            Err(CamrecError::InvalidSequence { .. })
        ));
        stage.start().unwrap();
        assert!(stage.write_sample(TrackIndex(7), &[1], &BufferInfo::default()).is_err());
        stage.write_sample(track, &[1, 2], &BufferInfo::default()).unwrap();
        assert_eq!(stage.samples_written(), 1);
        assert_eq!(stage.bytes_written(), 2);
    }

    #[test]
    fn test_stop_idempotent_and_final() {
        let (mut stage, log) = stage();
        let track = stage.add_track(&media_format()).unwrap();
        stage.start().unwrap();
        stage.stop().unwrap();
        stage.stop().unwrap();
        assert!(stage.write_sample(track, &[1], &BufferInfo::default()).is_err());
        drop(stage);
        assert_eq!(log.lock().unwrap().stopped, 1);
    }

    #[test]
    fn test_start_code_detection() {
        assert!(has_start_code(&[0, 0, 0, 1, 0x67]));
        assert!(has_start_code(&[0, 0, 1, 0x68]));
        assert!(!has_start_code(&[0x67, 0x42]));
    }

    #[test]
    fn test_duplicate_rejects_read_only_fd() {
        let file = tempfile::tempfile().unwrap();
        let path = format!("/proc/self/fd/{}", file.as_raw_fd());
        let read_only = File::open(path).unwrap();
        let err = duplicate_output_fd(std::os::fd::AsFd::as_fd(&read_only)).unwrap_err();
        assert!(matches!(err, CamrecError::InvalidDescriptor(_)));

        let dup = duplicate_output_fd(std::os::fd::AsFd::as_fd(&file)).unwrap();
        assert_ne!(dup.as_raw_fd(), file.as_raw_fd());
    }
}
