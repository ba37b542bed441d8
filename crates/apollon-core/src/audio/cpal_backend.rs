//! CPAL output stream
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │ Control Thread   │───send()───────────►│   Command Queue     │
//! │                  │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         │                                           │
//!         │ Relaxed atomics                           │ pop()
//!         ▼                                           ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │ TransportAtomics │◄────────────────────│  CPAL Audio Thread  │
//! │   (lock-free)    │     sync writes     │  (owns AudioEngine) │
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! The engine is moved into the data callback, so the audio thread owns it
//! outright and never takes a lock.
//!
//! Opening is split in two: `AudioOutput::open` negotiates the device and
//! stream config (so the engine can be built at the device's sample rate),
//! then `AudioOutput::start` moves the engine into the stream.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::device::select_output_device;
use super::error::{AudioError, AudioResult, DeviceError, DeviceStatus};
use crate::engine::AudioEngine;
use crate::types::{StereoBuffer, StereoSample};

/// A negotiated but not yet running output
pub struct AudioOutput {
    device: cpal::Device,
    device_name: String,
    stream_config: StreamConfig,
    buffer_size: u32,
}

impl AudioOutput {
    /// Pick the device and stream configuration for `config`
    pub fn open(config: &AudioConfig) -> AudioResult<Self> {
        let device = select_output_device(config.device.as_ref())?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let (supported, buffer_size) = get_output_config(&device, config)?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} (only f32 output is supported)",
                supported.sample_format()
            )));
        }

        let mut stream_config: StreamConfig = supported.into();
        stream_config.buffer_size = CpalBufferSize::Fixed(buffer_size);

        log::info!(
            "Audio output: {} @ {} Hz, {} channel(s), {} frames ({:.1} ms)",
            device_name,
            stream_config.sample_rate.0,
            stream_config.channels,
            buffer_size,
            buffer_size as f32 / stream_config.sample_rate.0 as f32 * 1000.0
        );

        Ok(Self {
            device,
            device_name,
            stream_config,
            buffer_size,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate.0
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Move `engine` onto the audio thread and start the stream
    pub fn start(self, engine: AudioEngine, status: Arc<DeviceStatus>) -> AudioResult<StreamHandle> {
        let stream = build_output_stream(&self.device, &self.stream_config, engine, status)?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        log::info!("Audio stream started on {}", self.device_name);

        Ok(StreamHandle {
            _stream: stream,
            device_name: self.device_name,
            sample_rate: self.stream_config.sample_rate.0,
            buffer_size: self.buffer_size,
        })
    }
}

/// Keeps the output stream alive. Drop this to stop audio.
pub struct StreamHandle {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
    buffer_size: u32,
}

impl StreamHandle {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        log::info!("Audio stream on {} stopped", self.device_name);
    }
}

/// Best output configuration for a device
///
/// Prefers f32, at least two channels and the requested sample rate, falling
/// back to the device's highest rate. Returns the config and buffer size.
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = config.target_sample_rate();
    let in_range = |c: &cpal::SupportedStreamConfigRange| {
        target_sample_rate >= c.min_sample_rate().0 && target_sample_rate <= c.max_sample_rate().0
    };

    let best_config = supported_configs
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2 && in_range(c))
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32)
        })
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    let sample_rate = if in_range(best_config) {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (files will be resampled)",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    Ok((
        best_config.clone().with_sample_rate(sample_rate),
        config.buffer_size.as_frames(),
    ))
}

/// Build the output stream; the callback owns the engine
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: AudioEngine,
    status: Arc<DeviceStatus>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let mut buffer = StereoBuffer::silence(MAX_BUFFER_SIZE);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(MAX_BUFFER_SIZE * channels.max(1)) {
                    let n_frames = chunk.len() / channels.max(1);
                    buffer.set_len_from_capacity(n_frames);
                    engine.process(&mut buffer);
                    write_frames(buffer.as_slice(), chunk, channels);
                }
            },
            move |err| {
                let error = match err {
                    cpal::StreamError::DeviceNotAvailable => DeviceError::DeviceLost,
                    other => DeviceError::Underrun(other.to_string()),
                };
                log::error!("{}", error);
                status.record(&error);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}

/// Copy stereo frames into an interleaved device buffer
///
/// Mono devices get the average of both channels; channels beyond the
/// first two are silenced. Frames without a source sample are silence.
fn write_frames(samples: &[StereoSample], data: &mut [f32], channels: usize) {
    if channels == 0 {
        return;
    }
    if channels == 2 {
        // Same layout as the device buffer: straight copy
        let interleaved: &[f32] = bytemuck::cast_slice(samples);
        let len = interleaved.len().min(data.len());
        data[..len].copy_from_slice(&interleaved[..len]);
        data[len..].fill(0.0);
        return;
    }
    for (i, frame) in data.chunks_mut(channels).enumerate() {
        let sample = samples.get(i).copied().unwrap_or_default();
        match frame {
            [mono] => *mono = (sample.left + sample.right) * 0.5,
            [left, right, rest @ ..] => {
                *left = sample.left;
                *right = sample.right;
                rest.fill(0.0);
            }
            [] => {}
        }
    }
}
