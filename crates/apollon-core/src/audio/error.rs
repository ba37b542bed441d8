//! Audio backend error types

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;

/// Errors that can occur while opening or starting the output
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio output devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Unsupported sample format
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

/// Faults reported by a running output stream
///
/// These never propagate into the render callback. They are recorded in
/// `DeviceStatus` and the control thread reacts (stops the transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The stream glitched (xrun or backend error) but is still running
    #[error("Audio stream error: {0}")]
    Underrun(String),

    /// The device disappeared; the stream will produce nothing more
    #[error("Audio device lost")]
    DeviceLost,
}

/// Lock-free record of stream faults
#[derive(Debug, Default)]
pub struct DeviceStatus {
    errors: AtomicU64,
    device_lost: AtomicBool,
}

impl DeviceStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fault (called from the stream's error callback)
    pub fn record(&self, error: &DeviceError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if *error == DeviceError::DeviceLost {
            self.device_lost.store(true, Ordering::Relaxed);
        }
    }

    /// Total faults since the stream started
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Relaxed)
    }
}
