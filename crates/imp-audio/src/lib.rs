//! Audio output backends for the impulse module player.

mod cpal_backend;
mod traits;

pub use cpal_backend::CpalOutput;
pub use traits::{AudioError, AudioOutput, OutputConfig, PcmSource};
