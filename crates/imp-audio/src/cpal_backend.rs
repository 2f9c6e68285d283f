//! CPAL-based audio output backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfig};

use crate::traits::{AudioError, AudioOutput, OutputConfig, PcmSource};

/// Samples converted per pass inside the callback. Divisible by 1 and 2.
const SCRATCH_LEN: usize = 2048;

/// CPAL-based audio output.
///
/// The stream is closed when this value is dropped.
pub struct CpalOutput {
    config: OutputConfig,
    stream: Stream,
}

impl CpalOutput {
    /// Open the default output device and build a paused stream that pulls
    /// from `source`.
    pub fn open<S: PcmSource>(config: OutputConfig, source: S) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        if let Ok(name) = device.name() {
            tracing::debug!(device = %name, "opening audio output");
        }

        let supported = pick_config(&device, config)?;
        let format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();

        let stream = match format {
            SampleFormat::F32 => build_f32(&device, &stream_config, source)?,
            SampleFormat::I16 => build_i16(&device, &stream_config, source)?,
            _ => {
                return Err(AudioError::UnsupportedConfig {
                    sample_rate: config.sample_rate,
                    channels: config.channels,
                })
            }
        };
        if let Err(err) = stream.pause() {
            tracing::debug!(%err, "stream cannot start paused");
        }

        tracing::info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            format = ?format,
            "audio output ready"
        );
        Ok(Self { config, stream })
    }
}

/// First supported layout matching the request, preferring `f32`.
fn pick_config(device: &Device, config: OutputConfig) -> Result<SupportedStreamConfig, AudioError> {
    let ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::DeviceInit(e.to_string()))?
        .filter(|range| {
            range.channels() == config.channels
                && range.min_sample_rate().0 <= config.sample_rate
                && range.max_sample_rate().0 >= config.sample_rate
        })
        .collect();

    [SampleFormat::F32, SampleFormat::I16]
        .iter()
        .find_map(|&format| ranges.iter().find(|range| range.sample_format() == format))
        .map(|range| range.clone().with_sample_rate(SampleRate(config.sample_rate)))
        .ok_or(AudioError::UnsupportedConfig {
            sample_rate: config.sample_rate,
            channels: config.channels,
        })
}

fn build_f32<S: PcmSource>(
    device: &Device,
    config: &StreamConfig,
    mut source: S,
) -> Result<Stream, AudioError> {
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut scratch = [0i16; SCRATCH_LEN];
                for chunk in data.chunks_mut(SCRATCH_LEN) {
                    let pcm = &mut scratch[..chunk.len()];
                    source.fill(pcm);
                    for (sample, &value) in chunk.iter_mut().zip(pcm.iter()) {
                        *sample = value as f32 / 32768.0;
                    }
                }
            },
            |err| tracing::error!(%err, "audio stream error"),
            None,
        )
        .map_err(|e| AudioError::StreamCreate(e.to_string()))
}

fn build_i16<S: PcmSource>(
    device: &Device,
    config: &StreamConfig,
    mut source: S,
) -> Result<Stream, AudioError> {
    device
        .build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| source.fill(data),
            |err| tracing::error!(%err, "audio stream error"),
            None,
        )
        .map_err(|e| AudioError::StreamCreate(e.to_string()))
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn channels(&self) -> u16 {
        self.config.channels
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.stream.play().map_err(|e| AudioError::Playback(e.to_string()))
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        self.stream.pause().map_err(|e| AudioError::Playback(e.to_string()))
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        tracing::debug!("closing audio output");
    }
}
