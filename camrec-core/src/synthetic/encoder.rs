//! Software stand-in for a hardware AVC encoder
//!
//! Produces Annex-B access units that carry a digest of the input frame
//! instead of real compressed video. The buffer protocol matches a real
//! codec: fixed input and output pools, one format change before the first
//! output buffer, key frames every `i_frame_interval` seconds.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::encode::{
    BufferFlags, BufferInfo, EncoderFactory, EncoderFormat, EncoderOutput, MediaFormat,
    VideoEncoder, MIME_AVC,
};
use crate::error::{CamrecError, Result};

const OUTPUT_BUFFER_SIZE: usize = 1024;
const NAL_IDR: u8 = 0x65;
const NAL_SLICE: u8 = 0x41;

/// Synthetic encoder settings
#[derive(Debug, Clone)]
pub struct SyntheticEncoderOptions {
    /// Input buffer pool size
    pub input_slots: usize,
    /// Output buffer pool size
    pub output_slots: usize,
    /// Emit SPS/PPS as a CODEC_CONFIG buffer after the format change
    pub emit_codec_config: bool,
    /// Fail `configure`
    pub fail_configure: bool,
}

impl Default for SyntheticEncoderOptions {
    fn default() -> Self {
        Self {
            input_slots: 4,
            output_slots: 4,
            emit_codec_config: false,
            fail_configure: false,
        }
    }
}

#[derive(Debug, Default)]
struct EncoderCounters {
    encoders_created: u64,
    inputs_queued: u64,
    empty_inputs: u64,
    frames_encoded: u64,
    format_changes: u64,
    outputs_emitted: u64,
    outputs_released: u64,
    bad_releases: u64,
    stop_calls: u64,
}

/// Shared view of what synthetic encoders have done
#[derive(Debug, Clone, Default)]
pub struct EncoderProbe(Arc<Mutex<EncoderCounters>>);

impl EncoderProbe {
    /// Encoders handed out by a factory
    pub fn encoders_created(&self) -> u64 {
        self.0.lock().encoders_created
    }

    /// Input buffers that carried frame data
    pub fn frames_encoded(&self) -> u64 {
        self.0.lock().frames_encoded
    }

    /// Input buffers returned without data
    pub fn empty_inputs(&self) -> u64 {
        self.0.lock().empty_inputs
    }

    /// Format change events emitted
    pub fn format_changes(&self) -> u64 {
        self.0.lock().format_changes
    }

    /// Output buffers handed out
    pub fn outputs_emitted(&self) -> u64 {
        self.0.lock().outputs_emitted
    }

    /// Output buffers given back
    pub fn outputs_released(&self) -> u64 {
        self.0.lock().outputs_released
    }

    /// Releases of buffers that were not dequeued
    pub fn bad_releases(&self) -> u64 {
        self.0.lock().bad_releases
    }

    /// Calls to `stop`
    pub fn stop_calls(&self) -> u64 {
        self.0.lock().stop_calls
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Configured,
    Running,
    Stopped,
}

struct Pending {
    data: Vec<u8>,
    presentation_time_us: i64,
    flags: BufferFlags,
}

/// Fake AVC encoder implementing [`VideoEncoder`]
pub struct SyntheticEncoder {
    options: SyntheticEncoderOptions,
    probe: EncoderProbe,
    phase: Phase,
    format: Option<EncoderFormat>,
    inputs: Vec<Vec<u8>>,
    free_inputs: VecDeque<usize>,
    leased_inputs: Vec<bool>,
    outputs: Vec<Vec<u8>>,
    free_outputs: VecDeque<usize>,
    leased_outputs: Vec<bool>,
    pending: VecDeque<Pending>,
    format_sent: bool,
    config_sent: bool,
    frames_encoded: u64,
}

impl SyntheticEncoder {
    /// Create an unconfigured encoder
    pub fn new(options: SyntheticEncoderOptions) -> Self {
        Self::with_probe(options, EncoderProbe::default())
    }

    fn with_probe(options: SyntheticEncoderOptions, probe: EncoderProbe) -> Self {
        probe.0.lock().encoders_created += 1;
        Self {
            options,
            probe,
            phase: Phase::Idle,
            format: None,
            inputs: Vec::new(),
            free_inputs: VecDeque::new(),
            leased_inputs: Vec::new(),
            outputs: Vec::new(),
            free_outputs: VecDeque::new(),
            leased_outputs: Vec::new(),
            pending: VecDeque::new(),
            format_sent: false,
            config_sent: false,
            frames_encoded: 0,
        }
    }

    /// Counters shared with this encoder
    pub fn probe(&self) -> EncoderProbe {
        self.probe.clone()
    }

    fn require_running(&self, operation: &'static str) -> Result<&EncoderFormat> {
        match (&self.phase, &self.format) {
            (Phase::Running, Some(format)) => Ok(format),
            _ => Err(CamrecError::invalid_sequence(operation, self.phase)),
        }
    }

    fn parameter_sets(format: &EncoderFormat) -> (Vec<u8>, Vec<u8>) {
        let sps = vec![
            0,
            0,
            0,
            1,
            0x67,
            0x42,
            0x00,
            0x1E,
            (format.width / 16).min(255) as u8,
            (format.height / 16).min(255) as u8,
        ];
        let pps = vec![0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80];
        (sps, pps)
    }

    fn encode(&mut self, index: usize, size: usize, presentation_time_us: i64) -> Result<()> {
        let format = self.require_running("encode")?;
        let gop = (format.frame_rate as u64 * format.i_frame_interval as u64).max(1);
        let key = self.frames_encoded % gop == 0;

        let digest = fnv1a(&self.inputs[index][..size]);
        let mut data = vec![0, 0, 0, 1, if key { NAL_IDR } else { NAL_SLICE }];
        data.extend_from_slice(&digest.to_be_bytes());
        data.extend_from_slice(&(size as u32).to_be_bytes());

        self.pending.push_back(Pending {
            data,
            presentation_time_us,
            flags: if key {
                BufferFlags::KEY_FRAME
            } else {
                BufferFlags::NONE
            },
        });
        self.frames_encoded += 1;
        self.probe.0.lock().frames_encoded += 1;
        trace!(
            "Encoded frame {} ({} bytes in, key={})",
            self.frames_encoded,
            size,
            key
        );
        Ok(())
    }

    fn emit(&mut self, pending: Pending) -> EncoderOutput {
        let Some(index) = self.free_outputs.pop_front() else {
            self.pending.push_front(pending);
            return EncoderOutput::TryAgainLater;
        };
        let size = pending.data.len().min(OUTPUT_BUFFER_SIZE);
        self.outputs[index][..size].copy_from_slice(&pending.data[..size]);
        self.leased_outputs[index] = true;
        self.probe.0.lock().outputs_emitted += 1;
        EncoderOutput::BufferReady {
            index,
            info: BufferInfo {
                offset: 0,
                size,
                presentation_time_us: pending.presentation_time_us,
                flags: pending.flags,
            },
        }
    }
}

impl VideoEncoder for SyntheticEncoder {
    fn configure(&mut self, format: &EncoderFormat) -> Result<()> {
        if self.phase != Phase::Idle {
            return Err(CamrecError::invalid_sequence("configure", self.phase));
        }
        if self.options.fail_configure {
            return Err(CamrecError::encoder_config("synthetic encoder refused format"));
        }
        if format.mime != MIME_AVC {
            return Err(CamrecError::encoder_config(format!(
                "Unsupported MIME type {}",
                format.mime
            )));
        }
        format.validate()?;

        let input_size = format.input_frame_size();
        self.inputs = vec![vec![0; input_size]; self.options.input_slots];
        self.free_inputs = (0..self.options.input_slots).collect();
        self.leased_inputs = vec![false; self.options.input_slots];
        self.outputs = vec![vec![0; OUTPUT_BUFFER_SIZE]; self.options.output_slots];
        self.free_outputs = (0..self.options.output_slots).collect();
        self.leased_outputs = vec![false; self.options.output_slots];
        self.format = Some(format.clone());
        self.phase = Phase::Configured;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.phase != Phase::Configured {
            return Err(CamrecError::invalid_sequence("start", self.phase));
        }
        self.phase = Phase::Running;
        debug!("Synthetic encoder running");
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout_us: i64) -> Result<Option<usize>> {
        self.require_running("dequeue input buffer")?;
        let index = self.free_inputs.pop_front();
        if let Some(index) = index {
            self.leased_inputs[index] = true;
        }
        Ok(index)
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8]> {
        if !self.leased_inputs.get(index).copied().unwrap_or(false) {
            return Err(CamrecError::encoder(format!(
                "Input buffer {} is not dequeued",
                index
            )));
        }
        Ok(&mut self.inputs[index])
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        self.require_running("queue input buffer")?;
        if !self.leased_inputs.get(index).copied().unwrap_or(false) {
            return Err(CamrecError::encoder(format!(
                "Input buffer {} is not dequeued",
                index
            )));
        }
        if size > self.inputs[index].len() {
            return Err(CamrecError::encoder(format!(
                "Input size {} exceeds buffer capacity {}",
                size,
                self.inputs[index].len()
            )));
        }

        self.leased_inputs[index] = false;
        self.probe.0.lock().inputs_queued += 1;
        let result = if size > 0 {
            self.encode(index, size, presentation_time_us)
        } else {
            self.probe.0.lock().empty_inputs += 1;
            Ok(())
        };
        self.free_inputs.push_back(index);

        if flags.contains(BufferFlags::END_OF_STREAM) {
            self.pending.push_back(Pending {
                data: Vec::new(),
                presentation_time_us,
                flags: BufferFlags::END_OF_STREAM,
            });
        }
        result
    }

    fn dequeue_output_buffer(&mut self, _timeout_us: i64) -> Result<EncoderOutput> {
        let format = self.require_running("dequeue output buffer")?.clone();
        if self.pending.is_empty() {
            return Ok(EncoderOutput::TryAgainLater);
        }

        let (sps, pps) = Self::parameter_sets(&format);
        if !self.format_sent {
            self.format_sent = true;
            self.probe.0.lock().format_changes += 1;
            return Ok(EncoderOutput::FormatChanged(MediaFormat {
                mime: format.mime.clone(),
                width: format.width,
                height: format.height,
                frame_rate: format.frame_rate,
                csd: vec![sps, pps],
            }));
        }

        if self.options.emit_codec_config && !self.config_sent {
            self.config_sent = true;
            let config = Pending {
                data: [sps, pps].concat(),
                presentation_time_us: 0,
                flags: BufferFlags::CODEC_CONFIG,
            };
            return Ok(self.emit(config));
        }

        match self.pending.pop_front() {
            Some(next) => Ok(self.emit(next)),
            None => Ok(EncoderOutput::TryAgainLater),
        }
    }

    fn output_buffer(&self, index: usize) -> Result<&[u8]> {
        if !self.leased_outputs.get(index).copied().unwrap_or(false) {
            return Err(CamrecError::encoder(format!(
                "Output buffer {} is not dequeued",
                index
            )));
        }
        Ok(&self.outputs[index])
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        if !self.leased_outputs.get(index).copied().unwrap_or(false) {
            self.probe.0.lock().bad_releases += 1;
            return Err(CamrecError::encoder(format!(
                "Output buffer {} released twice",
                index
            )));
        }
        self.leased_outputs[index] = false;
        self.free_outputs.push_back(index);
        self.probe.0.lock().outputs_released += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.probe.0.lock().stop_calls += 1;
        self.phase = Phase::Stopped;
        let dropped = self.pending.len();
        self.pending.clear();
        debug!(
            "Synthetic encoder stopped after {} frames ({} pending dropped)",
            self.frames_encoded, dropped
        );
        Ok(())
    }
}

/// 32-bit FNV-1a
fn fnv1a(data: &[u8]) -> u32 {
    data.iter().fold(0x811C_9DC5u32, |hash, byte| {
        (hash ^ *byte as u32).wrapping_mul(0x0100_0193)
    })
}

/// Factory handing out [`SyntheticEncoder`]s that share one probe
#[derive(Debug, Clone, Default)]
pub struct SyntheticEncoderFactory {
    options: SyntheticEncoderOptions,
    probe: EncoderProbe,
}

impl SyntheticEncoderFactory {
    /// Create a factory
    pub fn new(options: SyntheticEncoderOptions) -> Self {
        Self {
            options,
            probe: EncoderProbe::default(),
        }
    }

    /// Counters of every encoder this factory created
    pub fn probe(&self) -> EncoderProbe {
        self.probe.clone()
    }
}

impl EncoderFactory for SyntheticEncoderFactory {
    fn create_encoder(&self, mime: &str) -> Result<Box<dyn VideoEncoder>> {
        if mime != MIME_AVC {
            return Err(CamrecError::Unsupported(format!(
                "No synthetic encoder for {}",
                mime
            )));
        }
        Ok(Box::new(SyntheticEncoder::with_probe(
            self.options.clone(),
            self.probe.clone(),
        )))
    }
}
