//! Encoder stage: buffer slots as scoped leases
//!
//! An encoder buffer index belongs to the pipeline between dequeue and the
//! matching queue/release call. [`InputSlot`] and [`OutputSlot`] borrow the
//! stage for exactly that window and hand the index back when dropped, so a
//! forgotten slot cannot starve the encoder's fixed pools.

use tracing::{debug, info, trace, warn};

use super::{BufferFlags, BufferInfo, EncoderFormat, EncoderOutput, MediaFormat, VideoEncoder};
use crate::error::{CamrecError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageState {
    Configured,
    Started,
    Stopped,
}

/// A configured encoder
pub struct EncoderStage {
    encoder: Box<dyn VideoEncoder>,
    format: EncoderFormat,
    state: StageState,
    output_format: Option<MediaFormat>,
    inputs_queued: u64,
    outputs_released: u64,
}

impl EncoderStage {
    /// Configure `encoder` with `format`
    pub fn configure(mut encoder: Box<dyn VideoEncoder>, format: EncoderFormat) -> Result<Self> {
        format.validate()?;
        encoder.configure(&format).map_err(|e| match e {
            CamrecError::EncoderConfig(_) => e,
            other => CamrecError::encoder_config(other.to_string()),
        })?;

        info!(
            "Encoder configured: {} {}x{} @ {}fps, {} bps, I-frame interval {}",
            format.mime,
            format.width,
            format.height,
            format.frame_rate,
            format.bit_rate,
            format.i_frame_interval
        );

        Ok(Self {
            encoder,
            format,
            state: StageState::Configured,
            output_format: None,
            inputs_queued: 0,
            outputs_released: 0,
        })
    }

    /// Start the encoder
    pub fn start(&mut self) -> Result<()> {
        if self.state != StageState::Configured {
            return Err(CamrecError::invalid_sequence("start encoder", self.state));
        }
        self.encoder.start()?;
        self.state = StageState::Started;
        debug!("Encoder started");
        Ok(())
    }

    /// Whether the encoder accepts input
    pub fn is_started(&self) -> bool {
        self.state == StageState::Started
    }

    /// Configured input format
    pub fn format(&self) -> &EncoderFormat {
        &self.format
    }

    /// Output format, once the encoder has reported it
    pub fn output_format(&self) -> Option<&MediaFormat> {
        self.output_format.as_ref()
    }

    /// Input buffers handed back to the encoder
    pub fn inputs_queued(&self) -> u64 {
        self.inputs_queued
    }

    /// Output buffers returned to the encoder
    pub fn outputs_released(&self) -> u64 {
        self.outputs_released
    }

    /// Lease a free input buffer
    pub fn dequeue_input(&mut self, timeout_us: i64) -> Result<Option<InputSlot<'_>>> {
        if self.state != StageState::Started {
            return Err(CamrecError::invalid_sequence("dequeue input", self.state));
        }
        Ok(self
            .encoder
            .dequeue_input_buffer(timeout_us)?
            .map(|index| InputSlot {
                stage: self,
                index,
                queued: false,
            }))
    }

    /// Poll for the next output event
    pub fn dequeue_output(&mut self, timeout_us: i64) -> Result<OutputEvent<'_>> {
        if self.state != StageState::Started {
            return Err(CamrecError::invalid_sequence("dequeue output", self.state));
        }
        match self.encoder.dequeue_output_buffer(timeout_us)? {
            EncoderOutput::FormatChanged(format) => {
                if self.output_format.is_some() {
                    warn!("Encoder reported a second format change: {:?}", format);
                } else {
                    info!(
                        "Encoder output format: {} {}x{} ({} csd buffers)",
                        format.mime,
                        format.width,
                        format.height,
                        format.csd.len()
                    );
                }
                self.output_format = Some(format.clone());
                Ok(OutputEvent::FormatChanged(format))
            }
            EncoderOutput::BufferReady { index, info } => Ok(OutputEvent::BufferReady(OutputSlot {
                stage: self,
                index,
                info,
                released: false,
            })),
            EncoderOutput::TryAgainLater => Ok(OutputEvent::Empty),
        }
    }

    /// Stop the encoder; later calls are no-ops
    pub fn stop(&mut self) -> Result<()> {
        if self.state == StageState::Stopped {
            return Ok(());
        }
        self.state = StageState::Stopped;
        self.encoder.stop()?;
        info!(
            "Encoder stopped ({} inputs queued, {} outputs released)",
            self.inputs_queued, self.outputs_released
        );
        Ok(())
    }
}

impl Drop for EncoderStage {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop encoder: {}", e);
        }
    }
}

/// Result of polling the encoder output
pub enum OutputEvent<'a> {
    /// Output format known; create the muxer track now
    FormatChanged(MediaFormat),
    /// Compressed data ready
    BufferReady(OutputSlot<'a>),
    /// Nothing available
    Empty,
}

/// A leased encoder input buffer
///
/// Dropping an unqueued slot hands it back to the encoder empty.
#[must_use = "an input slot must be queued or it is returned empty"]
pub struct InputSlot<'a> {
    stage: &'a mut EncoderStage,
    index: usize,
    queued: bool,
}

impl InputSlot<'_> {
    /// Buffer index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Backing memory
    pub fn buffer_mut(&mut self) -> Result<&mut [u8]> {
        self.stage.encoder.input_buffer(self.index)
    }

    /// Copy `data` into the buffer, truncating to its capacity
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let buffer = self.buffer_mut()?;
        let len = buffer.len().min(data.len());
        buffer[..len].copy_from_slice(&data[..len]);
        if len < data.len() {
            trace!(
                "Input buffer {} holds {} of {} bytes",
                self.index,
                len,
                data.len()
            );
        }
        Ok(len)
    }

    /// Hand the filled buffer to the encoder
    pub fn queue(mut self, size: usize, presentation_time_us: i64, flags: BufferFlags) -> Result<()> {
        self.queued = true;
        self.stage
            .encoder
            .queue_input_buffer(self.index, size, presentation_time_us, flags)?;
        self.stage.inputs_queued += 1;
        Ok(())
    }
}

impl Drop for InputSlot<'_> {
    fn drop(&mut self) {
        if self.queued {
            return;
        }
        debug!("Input buffer {} returned unfilled", self.index);
        if let Err(e) = self
            .stage
            .encoder
            .queue_input_buffer(self.index, 0, 0, BufferFlags::NONE)
        {
            warn!("Failed to return input buffer {}: {}", self.index, e);
        }
    }
}

/// A leased encoder output buffer
///
/// Released back to the encoder by [`release`](Self::release) or on drop.
#[must_use = "an output slot holds an encoder buffer until released"]
pub struct OutputSlot<'a> {
    stage: &'a mut EncoderStage,
    index: usize,
    info: BufferInfo,
    released: bool,
}

impl OutputSlot<'_> {
    /// Buffer index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Buffer layout and timing
    pub fn info(&self) -> BufferInfo {
        self.info
    }

    /// The valid bytes of the buffer
    pub fn data(&self) -> Result<&[u8]> {
        let buffer = self.stage.encoder.output_buffer(self.index)?;
        let end = self.info.offset + self.info.size;
        buffer.get(self.info.offset..end).ok_or_else(|| {
            CamrecError::encoder(format!(
                "Output buffer {} range {}..{} exceeds {} bytes",
                self.index,
                self.info.offset,
                end,
                buffer.len()
            ))
        })
    }

    /// Give the buffer back to the encoder
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.stage.encoder.release_output_buffer(self.index)?;
        self.stage.outputs_released += 1;
        Ok(())
    }
}

impl Drop for OutputSlot<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!("Failed to release output buffer {}: {}", self.index, e);
        }
    }
}
