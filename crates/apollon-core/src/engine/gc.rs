//! RT-safe garbage collection for audio buffers
//!
//! Decoded files are shared with the audio thread as `basedrop::Shared`.
//! When the last reference is dropped on the audio thread (a file is replaced
//! or unloaded), the memory is not freed there: the pointer is queued and a
//! collector thread frees it later, where latency does not matter.
//!
//! The collector thread is owned by a `GcThread` value. Dropping it stops the
//! thread after a final collection pass.
//!
//! ```ignore
//! let gc = GcThread::spawn()?;
//! let file = Shared::new(&gc.handle(), handle);
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use basedrop::{Collector, Handle};

/// How often the collector runs
const COLLECT_INTERVAL: Duration = Duration::from_millis(50);

/// A running collector thread
pub struct GcThread {
    handle: Handle,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl GcThread {
    /// Spawn the collector thread and wait for its handle
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let thread = thread::Builder::new()
            .name("audio-gc".to_string())
            .spawn(move || {
                // Collector is !Sync, so it is created on this thread
                let mut collector = Collector::new();
                if tx.send(collector.handle()).is_err() {
                    return;
                }
                log::info!("Audio GC thread started");

                while !thread_stop.load(Ordering::Relaxed) {
                    collector.collect();
                    thread::park_timeout(COLLECT_INTERVAL);
                }

                collector.collect();
                log::info!("Audio GC thread stopped");
            })?;

        let handle = rx.recv().map_err(|_| {
            io::Error::new(io::ErrorKind::Other, "audio GC thread exited during startup")
        })?;

        Ok(Self {
            handle,
            stop,
            thread: Some(thread),
        })
    }

    /// Handle for creating `Shared<T>` allocations
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }
}

impl Drop for GcThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                log::error!("Audio GC thread panicked");
            }
        }
    }
}
