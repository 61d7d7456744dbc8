//! Annex-B elementary stream output
//!
//! Writes the codec-specific data (SPS/PPS) once, then every access unit in
//! decode order. The result plays with `ffplay -f h264`.

use std::io::{BufWriter, Write};
use tracing::debug;

use super::{has_start_code, Muxer, TrackIndex};
use crate::encode::{BufferInfo, MediaFormat};
use crate::error::{CamrecError, Result};

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Raw H.264/H.265 stream writer
pub struct AnnexBMuxer<W: Write + Send> {
    writer: BufWriter<W>,
    csd: Vec<Vec<u8>>,
    has_track: bool,
    finished: bool,
}

impl<W: Write + Send> AnnexBMuxer<W> {
    /// Create a muxer writing to `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            csd: Vec::new(),
            has_track: false,
            finished: false,
        }
    }

    /// The underlying writer
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    fn write_nal(&mut self, data: &[u8]) -> Result<()> {
        if !has_start_code(data) {
            self.writer.write_all(&START_CODE)?;
        }
        self.writer.write_all(data)?;
        Ok(())
    }
}

impl<W: Write + Send> Muxer for AnnexBMuxer<W> {
    fn add_track(&mut self, format: &MediaFormat) -> Result<TrackIndex> {
        if self.has_track {
            return Err(CamrecError::TrackAlreadyAdded);
        }
        self.csd = format.csd.clone();
        self.has_track = true;
        Ok(TrackIndex(0))
    }

    fn start(&mut self) -> Result<()> {
        let csd = std::mem::take(&mut self.csd);
        for nal in &csd {
            self.write_nal(nal)?;
        }
        debug!("Annex-B stream started ({} parameter sets)", csd.len());
        Ok(())
    }

    fn write_sample(&mut self, track: TrackIndex, data: &[u8], _info: &BufferInfo) -> Result<()> {
        if track != TrackIndex(0) {
            return Err(CamrecError::muxer(format!("Unknown {}", track)));
        }
        self.write_nal(data)
    }

    fn stop(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writer.flush()?;
        Ok(())
    }
}
