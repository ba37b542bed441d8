//! Audio engine - transport, command queue and RT-safe deallocation
//!
//! - `PlaybackTransport`: position, loop range and play/stop state machine
//! - `EngineCommand` / `command_channel`: lock-free control → audio queue
//! - `AudioEngine`: owns the transport on the audio thread
//! - `GcThread`: collector for `basedrop::Shared` audio buffers

mod command;
#[allow(clippy::module_inception)]
mod engine;
mod gc;
mod transport;

pub use command::{command_channel, CommandSender, EngineCommand, COMMAND_QUEUE_CAPACITY};
pub use engine::{AudioEngine, MAX_BUFFER_SIZE};
pub use gc::GcThread;
pub use transport::{LoopRange, PlaybackTransport, TransportAtomics};
