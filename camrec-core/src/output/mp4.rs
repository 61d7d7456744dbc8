//! MPEG-4 output via FFmpeg

use std::os::fd::{AsRawFd, OwnedFd};
use tracing::{debug, error, info};

use ffmpeg::codec::Id;
use ffmpeg::format::{context::Output, output_as};
use ffmpeg::Rational;
use ffmpeg_next as ffmpeg;

use super::{Muxer, TrackIndex};
use crate::encode::{BufferFlags, BufferInfo, MediaFormat, MIME_AVC, MIME_HEVC};
use crate::error::{CamrecError, Result};

/// Encoder timestamps are microseconds
const SAMPLE_TIME_BASE: Rational = Rational(1, 1_000_000);

/// MPEG-4 writer for a single video track
pub struct Mp4Muxer {
    /// Keeps the descriptor FFmpeg reopened through /proc alive
    fd: OwnedFd,
    output: Output,
    stream_index: Option<usize>,
    stream_time_base: Rational,
    header_written: bool,
    finalized: bool,
    packets_written: u64,
}

impl Mp4Muxer {
    /// Create a muxer writing to `fd`
    pub fn from_fd(fd: OwnedFd) -> Result<Self> {
        ffmpeg::init()?;

        let path = format!("/proc/self/fd/{}", fd.as_raw_fd());
        let output = output_as(&path, "mp4")
            .map_err(|e| CamrecError::muxer(format!("Failed to create MPEG-4 output: {}", e)))?;
        info!("MPEG-4 muxer created on {}", path);

        Ok(Self {
            fd,
            output,
            stream_index: None,
            stream_time_base: SAMPLE_TIME_BASE,
            header_written: false,
            finalized: false,
            packets_written: 0,
        })
    }
}

impl Muxer for Mp4Muxer {
    fn add_track(&mut self, format: &MediaFormat) -> Result<TrackIndex> {
        if self.stream_index.is_some() {
            return Err(CamrecError::TrackAlreadyAdded);
        }

        let codec_id = match format.mime.as_str() {
            MIME_AVC => Id::H264,
            MIME_HEVC => Id::HEVC,
            other => {
                return Err(CamrecError::Unsupported(format!(
                    "No MPEG-4 mapping for {}",
                    other
                )));
            }
        };
        let extradata: Vec<u8> = format.csd.concat();

        {
            let mut stream = self
                .output
                .add_stream(codec_id)
                .map_err(|e| CamrecError::muxer(format!("Failed to add video stream: {}", e)))?;

            let codec_par = stream.parameters();
            // SAFETY: rust-ffmpeg has no setters for these fields. The pointer
            // comes from the stream created above and stays valid while it
            // lives; extradata is allocated with av_mallocz so FFmpeg frees it.
            unsafe {
                let ptr = codec_par.as_ptr() as *mut ffmpeg::ffi::AVCodecParameters;
                (*ptr).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
                (*ptr).codec_id = codec_id.into();
                (*ptr).width = format.width as i32;
                (*ptr).height = format.height as i32;

                if !extradata.is_empty() {
                    let padded = extradata.len() + ffmpeg::ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
                    let buf = ffmpeg::ffi::av_mallocz(padded) as *mut u8;
                    if buf.is_null() {
                        return Err(CamrecError::muxer("Failed to allocate codec extradata"));
                    }
                    std::ptr::copy_nonoverlapping(extradata.as_ptr(), buf, extradata.len());
                    (*ptr).extradata = buf;
                    (*ptr).extradata_size = extradata.len() as i32;
                }
            }

            stream.set_time_base(SAMPLE_TIME_BASE);
        }

        let index = self.output.nb_streams() as usize - 1;
        self.stream_index = Some(index);
        debug!(
            "MPEG-4 video stream {} added: {:?} {}x{}",
            index, codec_id, format.width, format.height
        );
        Ok(TrackIndex(index))
    }

    fn start(&mut self) -> Result<()> {
        let Some(index) = self.stream_index else {
            return Err(CamrecError::invalid_sequence("start muxer", "no track"));
        };
        self.output
            .write_header()
            .map_err(|e| CamrecError::muxer(format!("Failed to write file header: {}", e)))?;
        self.header_written = true;

        // The header may pick its own time base
        self.stream_time_base = self
            .output
            .stream(index)
            .map(|s| s.time_base())
            .unwrap_or(SAMPLE_TIME_BASE);
        debug!("MPEG-4 header written, time base {}", self.stream_time_base);
        Ok(())
    }

    fn write_sample(&mut self, track: TrackIndex, data: &[u8], info: &BufferInfo) -> Result<()> {
        if self.stream_index != Some(track.0) {
            return Err(CamrecError::muxer(format!("Unknown {}", track)));
        }

        let mut pkt = ffmpeg::Packet::copy(data);
        pkt.set_stream(track.0);
        pkt.set_pts(Some(info.presentation_time_us));
        pkt.set_dts(Some(info.presentation_time_us));
        if info.flags.contains(BufferFlags::KEY_FRAME) {
            pkt.set_flags(ffmpeg::packet::Flags::KEY);
        }
        pkt.rescale_ts(SAMPLE_TIME_BASE, self.stream_time_base);

        pkt.write_interleaved(&mut self.output)
            .map_err(|e| CamrecError::muxer(format!("Failed to write video packet: {}", e)))?;

        self.packets_written += 1;
        if self.packets_written % 1000 == 0 {
            debug!("Written {} video packets", self.packets_written);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.finalized || !self.header_written {
            return Ok(());
        }
        self.finalized = true;
        self.output
            .write_trailer()
            .map_err(|e| CamrecError::muxer(format!("Failed to write file trailer: {}", e)))?;
        info!(
            "MPEG-4 file complete on fd {} ({} packets)",
            self.fd.as_raw_fd(),
            self.packets_written
        );
        Ok(())
    }
}

impl Drop for Mp4Muxer {
    fn drop(&mut self) {
        if self.header_written && !self.finalized {
            if let Err(e) = self.output.write_trailer() {
                error!("Failed to write file trailer on drop: {}", e);
            }
        }
    }
}
