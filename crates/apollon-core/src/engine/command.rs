//! Lock-free command queue for real-time engine control
//!
//! The control thread pushes commands into an `rtrb` ring buffer and the
//! audio thread drains it at the start of every callback, before rendering.
//! Both ends are wait-free, so the audio thread never blocks on the UI.
//!
//! ```ignore
//! let (mut tx, rx) = command_channel();
//! tx.send(EngineCommand::Play)?;
//! // audio thread: engine.process_commands()
//! ```

use basedrop::Shared;

use crate::audio_file::AudioHandle;

/// Commands sent from the control thread to the audio thread
///
/// Each variant is applied atomically at a block boundary.
pub enum EngineCommand {
    /// Replace the current file (Stopped, position 0, loop = whole file)
    LoadFile { file: Shared<AudioHandle> },
    /// Drop the current file
    Unload,
    Play,
    Stop,
    TogglePlay,
    /// Jump to a frame position (clamped to the file)
    Seek { position: usize },
    /// Set the loop range in frames (clamped to the file)
    SetLoopRange { start: usize, end: usize },
    SetLoopEnabled(bool),
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineCommand::LoadFile { file } => f
                .debug_struct("LoadFile")
                .field("path", &file.path())
                .field("frames", &file.len())
                .finish(),
            EngineCommand::Unload => write!(f, "Unload"),
            EngineCommand::Play => write!(f, "Play"),
            EngineCommand::Stop => write!(f, "Stop"),
            EngineCommand::TogglePlay => write!(f, "TogglePlay"),
            EngineCommand::Seek { position } => {
                f.debug_struct("Seek").field("position", position).finish()
            }
            EngineCommand::SetLoopRange { start, end } => f
                .debug_struct("SetLoopRange")
                .field("start", start)
                .field("end", end)
                .finish(),
            EngineCommand::SetLoopEnabled(enabled) => {
                f.debug_tuple("SetLoopEnabled").field(enabled).finish()
            }
        }
    }
}

/// Command queue capacity
///
/// A load is followed by at most a handful of commands (loop range, loop
/// flag, seek, play); 256 leaves room for bursts of seeks from dragging.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a new command channel (producer/consumer pair)
///
/// - Producer: send side, owned by the control thread
/// - Consumer: receive side, owned by the audio engine
pub fn command_channel() -> (CommandSender, rtrb::Consumer<EngineCommand>) {
    let (producer, consumer) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
    (CommandSender { producer }, consumer)
}

/// Command sender for the control thread
///
/// Wraps the lock-free producer. All operations are non-blocking.
pub struct CommandSender {
    producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    /// Queue a command for the audio thread
    ///
    /// Returns `Err(cmd)` with the command if the queue is full.
    pub fn send(&mut self, cmd: EngineCommand) -> Result<(), EngineCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    /// Free slots in the queue
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_roundtrip() {
        let (mut tx, mut rx) = command_channel();

        tx.send(EngineCommand::Seek { position: 42 }).unwrap();

        let cmd = rx.pop().unwrap();
        assert!(matches!(cmd, EngineCommand::Seek { position: 42 }));
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_full_queue_returns_command() {
        let (mut tx, _rx) = command_channel();
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            tx.send(EngineCommand::Play).unwrap();
        }
        assert_eq!(tx.slots(), 0);

        let rejected = tx.send(EngineCommand::Stop).unwrap_err();
        assert!(matches!(rejected, EngineCommand::Stop));
    }

    #[test]
    fn test_command_size() {
        // Keep the enum small for the ring buffer
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 24, "EngineCommand is {} bytes, expected <= 24", size);
    }
}
