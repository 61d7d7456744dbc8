//! Camrec Core Library
//!
//! Camera capture, hardware-style encoding and container muxing.
//!
//! This library provides:
//! - A capture session manager that owns every native camera handle
//! - A bounded frame pool between the camera and the encoder
//! - An encoder stage with scoped input/output buffer leases
//! - Annex-B and MPEG-4 muxers writing to a caller-provided descriptor
//! - Synthetic collaborators for running the whole pipeline in software
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────┐    ┌──────────────┐    ┌───────────────┐
//! │ Camera Session  │───▶│ Frame Pool   │───▶│ Encoder      │───▶│ Muxer         │
//! │ (preview + src) │    │ (ImageReader)│    │ (EncoderStage│    │ (fd, 1 track) │
//! └─────────────────┘    └──────────────┘    └──────────────┘    └───────────────┘
//!          │
//!          └──▶ Preview window
//! ```

pub mod capture;
pub mod config;
pub mod encode;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod synthetic;
pub mod types;

pub use config::{Codec, ContainerFormat, Preset, RecordingConfig};
pub use error::{CamrecError, Result};
pub use pipeline::{CameraPipeline, PipelineBuilder, PipelineMode, PipelineStats, RecordingSummary};
pub use types::{CameraEvent, Handle, SurfaceId};
