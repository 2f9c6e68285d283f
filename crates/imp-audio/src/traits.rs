//! Audio output traits and error types.

use thiserror::Error;

/// Error type for audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    /// No output device available
    #[error("no audio output device available")]
    NoDevice,
    /// Failed to query or initialize the device
    #[error("device init error: {0}")]
    DeviceInit(String),
    /// Failed to create the output stream
    #[error("stream create error: {0}")]
    StreamCreate(String),
    /// Failed to start or pause the stream
    #[error("playback error: {0}")]
    Playback(String),
    /// The device cannot play the requested layout
    #[error("device does not support {channels} channel(s) at {sample_rate} Hz")]
    UnsupportedConfig { sample_rate: u32, channels: u16 },
}

/// Something the output callback can pull interleaved PCM from.
///
/// `fill` runs on the audio thread: it must not block, and it must write
/// every sample of `out` (silence included).
pub trait PcmSource: Send + 'static {
    fn fill(&mut self, out: &mut [i16]);
}

/// Requested output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { sample_rate: 44100, channels: 2 }
    }
}

/// Trait for audio output backends.
pub trait AudioOutput {
    /// Get the sample rate.
    fn sample_rate(&self) -> u32;

    /// Interleaved channels per frame.
    fn channels(&self) -> u16;

    /// Start (or resume) pulling from the source.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop pulling. The source keeps its state.
    fn pause(&mut self) -> Result<(), AudioError>;
}
