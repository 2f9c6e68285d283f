//! Headless playback for the impulse module player.
//!
//! [`Player`] is the control-side handle for one playback session and
//! [`PlaybackSource`] the half an audio callback pulls from. [`Controller`]
//! wraps both around a loaded module and a cpal output, and renders offline
//! to WAV.

mod config;
mod controller;
mod player;
mod wav;

use thiserror::Error;

pub use config::{ConfigError, PlayerConfig, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
pub use controller::Controller;
pub use player::{PlaybackSource, Player};
pub use wav::{samples_to_wav, write_wav};

// Re-export common types so callers don't need the lower crates directly.
pub use imp_audio::AudioError;
pub use imp_engine::{PlaybackPosition, SeekError, StateUpdate, Transport};
pub use imp_formats::{FormatError, LoadWarning};
pub use imp_ir::{Format, Module, OrderEntry};

/// Error type for playback control.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("invalid player config: {0}")]
    Config(#[from] ConfigError),
    #[error("command queue is full")]
    QueueFull,
    #[error("seek refused: {0}")]
    Seek(#[from] SeekError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("could not load module: {0}")]
    Format(#[from] FormatError),
}
