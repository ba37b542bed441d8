//! Audio backend configuration
//!
//! Device selection, sample rate and buffer size for the output stream.
//! Serialized as part of the player's YAML config.

use serde::{Deserialize, Serialize};

pub use crate::engine::MAX_BUFFER_SIZE;

/// Smallest buffer size accepted for a fixed request (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Default buffer size when no preference is specified (frames)
/// 512 frames @ 44.1kHz is ~11.6ms, safe on most systems
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default sample rate requested from the device
pub const DEFAULT_SAMPLE_RATE: u32 = crate::types::DEFAULT_SAMPLE_RATE;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Use `DEFAULT_BUFFER_SIZE`
    #[default]
    Default,
    /// Request a specific size in frames (clamped to 64..=8192)
    Fixed(u32),
}

impl BufferSize {
    /// Buffer size in frames after clamping
    pub fn as_frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE as u32),
        }
    }

    /// Latency in milliseconds at `sample_rate`
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        (self.as_frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// Includes the host backend (ALSA, PulseAudio, CoreAudio, ...) so devices
/// with the same name on different hosts can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host name; None searches every host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = system default)
    pub device: Option<DeviceId>,

    /// Preferred sample rate (None = 44.1kHz)
    pub sample_rate: Option<u32>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,
}

impl AudioConfig {
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    /// Sample rate to request from the device
    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}
