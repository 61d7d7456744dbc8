//! Synthetic collaborators
//!
//! Software implementations of the camera, encoder and window-system seams.
//! They follow the same buffer and callback protocols as native stacks
//! (callbacks from their own threads, fixed buffer pools, handles that must
//! be freed once) and expose probes for counting what happened.

mod camera;
mod encoder;
mod window;

pub use camera::{test_pattern, CameraProbe, SyntheticCamera, SyntheticCameraOptions};
pub use encoder::{EncoderProbe, SyntheticEncoder, SyntheticEncoderFactory, SyntheticEncoderOptions};
pub use window::{SyntheticWindows, WindowProbe};
