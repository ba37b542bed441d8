//! Apollon Core - real-time playback, looping and pitch-shift engine
//!
//! - `audio_file`: decoding, block reads and sample-rate conversion
//! - `waveform`: multi-resolution peak summaries for display
//! - `pitch`: phase-vocoder pitch shifter
//! - `engine`: transport state machine and the audio-thread engine
//! - `audio`: cpal output, devices and audio config
//! - `loader`, `control`, `context`: the control side that drives the engine

pub mod audio;
pub mod audio_file;
pub mod config;
pub mod context;
pub mod control;
pub mod engine;
pub mod loader;
pub mod pitch;
pub mod render;
pub mod types;
pub mod waveform;

pub use types::*;
