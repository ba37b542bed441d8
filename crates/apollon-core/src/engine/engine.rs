//! Main audio engine - command handling, transport and pitch parameter
//!
//! Owned exclusively by the audio thread. Each callback drains the command
//! queue, latches the pitch parameter and renders one block through the
//! transport.

use std::sync::Arc;

use basedrop::Shared;

use crate::audio_file::AudioHandle;
use crate::pitch::PitchParameter;
use crate::types::StereoBuffer;

use super::{EngineCommand, PlaybackTransport, TransportAtomics};

/// Maximum buffer size to pre-allocate for real-time safety
///
/// Callbacks larger than this are rendered in several passes.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// The audio engine
pub struct AudioEngine {
    transport: PlaybackTransport,
    pitch: Arc<PitchParameter>,
    commands: rtrb::Consumer<EngineCommand>,
    sample_rate: u32,
    /// Files replaced on this thread; dropped here so `Shared` defers the free
    retired: Option<Shared<AudioHandle>>,
}

impl AudioEngine {
    /// Create a new engine rendering at `sample_rate`
    pub fn new(
        sample_rate: u32,
        commands: rtrb::Consumer<EngineCommand>,
        pitch: Arc<PitchParameter>,
        atomics: Arc<TransportAtomics>,
    ) -> Self {
        Self {
            transport: PlaybackTransport::new(atomics),
            pitch,
            commands,
            sample_rate,
            retired: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn transport(&self) -> &PlaybackTransport {
        &self.transport
    }

    /// Apply all queued commands (lock-free, called at the block boundary)
    pub fn process_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                EngineCommand::LoadFile { file } => {
                    self.retired = self.transport.load(file);
                }
                EngineCommand::Unload => {
                    self.retired = self.transport.unload();
                }
                EngineCommand::Play => self.transport.play(),
                EngineCommand::Stop => self.transport.stop(),
                EngineCommand::TogglePlay => self.transport.toggle(),
                EngineCommand::Seek { position } => self.transport.seek(position),
                EngineCommand::SetLoopRange { start, end } => {
                    self.transport.set_loop_range(start, end)
                }
                EngineCommand::SetLoopEnabled(enabled) => {
                    self.transport.set_loop_enabled(enabled)
                }
            }
        }
        // Dropping a Shared only enqueues it for the collector thread
        self.retired = None;
    }

    /// Process commands and render one callback's worth of audio
    ///
    /// `output` must be sized to the callback length and is overwritten.
    pub fn process(&mut self, output: &mut StereoBuffer) {
        self.process_commands();

        let semitones = self.pitch.get();
        for block in output.as_mut_slice().chunks_mut(MAX_BUFFER_SIZE) {
            self.transport.process(block, semitones);
        }
    }
}
