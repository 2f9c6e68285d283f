//! Player configuration.

use thiserror::Error;

use imp_engine::UNITY_MASTER;

pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// A rejected [`PlayerConfig`] field.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate {0} Hz is outside 8000..=192000")]
    SampleRate(u32),
    #[error("output must have 1 or 2 channels, not {0}")]
    Channels(u16),
    #[error("volume {0} is outside 0.0..=1.0")]
    Volume(f32),
    #[error("{0} queue capacity must be nonzero")]
    Capacity(&'static str),
}

/// Output and queue settings for one playback session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerConfig {
    pub sample_rate: u32,
    /// 1 (mono) or 2 (stereo).
    pub channels: u16,
    /// Master volume, 0.0..=1.0.
    pub volume: f32,
    pub command_capacity: usize,
    pub update_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            volume: 1.0,
            command_capacity: 64,
            update_capacity: 256,
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(ConfigError::Channels(self.channels));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(ConfigError::Volume(self.volume));
        }
        if self.command_capacity == 0 {
            return Err(ConfigError::Capacity("command"));
        }
        if self.update_capacity == 0 {
            return Err(ConfigError::Capacity("update"));
        }
        Ok(())
    }

    /// Volume as a Q8 master gain.
    pub fn master_gain(&self) -> u16 {
        (self.volume.clamp(0.0, 1.0) * UNITY_MASTER as f32).round() as u16
    }
}
