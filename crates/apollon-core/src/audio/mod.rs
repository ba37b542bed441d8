//! Cross-platform audio output for Apollon
//!
//! Uses CPAL on every platform (ALSA/PipeWire/JACK on Linux, WASAPI on
//! Windows, CoreAudio on macOS).
//!
//! # Architecture
//!
//! The audio system follows a lock-free design for real-time safety:
//!
//! - **Control thread**: sends commands via a lock-free ringbuffer
//! - **Audio thread**: owns the `AudioEngine` exclusively, processes commands
//! - **Atomics**: the control thread reads transport state via relaxed atomics
//!
//! # Example Usage
//!
//! ```ignore
//! use apollon_core::audio::{AudioConfig, AudioOutput, DeviceStatus};
//!
//! let output = AudioOutput::open(&AudioConfig::default())?;
//! let (controller, engine) = Controller::with_engine(output.sample_rate(), gc.handle(), options);
//! let stream = output.start(engine, controller.device_status())?;
//! ```

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
    MIN_BUFFER_SIZE,
};
pub use cpal_backend::{AudioOutput, StreamHandle};
pub use device::{get_available_output_devices, get_output_devices, OutputDevice};
pub use error::{AudioError, AudioResult, DeviceError, DeviceStatus};
