//! Waveform summary for display
//!
//! Downsamples decoded PCM into (min, max) pairs per fixed-size window, one
//! sequence per zoom level. The summary is produced lazily in chunks so a UI
//! can draw partial progress while the background worker keeps going.
//!
//! # Example
//!
//! ```ignore
//! let mut summary = WaveformSummary::build(&handle, &DEFAULT_WINDOW_SIZES);
//! match summary.run(&cancel, |step| view.apply(&step.chunks)) {
//!     SummaryOutcome::Complete(peaks) => { /* keep peaks */ }
//!     SummaryOutcome::Cancelled => { /* file was replaced */ }
//! }
//! ```

mod builder;

pub use builder::PeakBuilder;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio_file::AudioHandle;

/// Zoom levels built by default (frames per peak)
pub const DEFAULT_WINDOW_SIZES: [usize; 4] = [256, 1024, 4096, 16384];

/// Frames summarized per step
pub const CHUNK_FRAMES: usize = 65536;

/// Peaks for one zoom level
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeakLevel {
    /// Frames per peak
    pub window_size: usize,
    pub peaks: Vec<(f32, f32)>,
}

/// Multi-resolution waveform peaks, read-only once complete
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WaveformPeaks {
    pub levels: Vec<PeakLevel>,
    pub total_frames: usize,
}

impl WaveformPeaks {
    /// Empty peaks with the given zoom levels, for assembling from chunks
    pub fn with_window_sizes(window_sizes: &[usize]) -> Self {
        PeakBuilder::new(window_sizes).finish()
    }

    pub fn level(&self, window_size: usize) -> Option<&PeakLevel> {
        self.levels.iter().find(|l| l.window_size == window_size)
    }

    /// The coarsest level that still has at least one peak per pixel
    pub fn level_for_width(&self, width_px: usize) -> Option<&PeakLevel> {
        if width_px == 0 {
            return self.levels.first();
        }
        let frames_per_px = self.total_frames / width_px;
        self.levels
            .iter()
            .rev()
            .find(|l| l.window_size <= frames_per_px)
            .or_else(|| self.levels.first())
    }

    /// Merge a chunk produced by a `PeakBuilder` or `WaveformSummary`
    ///
    /// Chunks for unknown levels are ignored. Returns true if anything changed.
    pub fn apply(&mut self, chunk: &PeaksChunk) -> bool {
        let Some(level) = self
            .levels
            .iter_mut()
            .find(|l| l.window_size == chunk.window_size)
        else {
            return false;
        };
        let end = chunk.first_index + chunk.peaks.len();
        if level.peaks.len() < end {
            level.peaks.resize(end, (0.0, 0.0));
        }
        level.peaks[chunk.first_index..end].copy_from_slice(&chunk.peaks);
        self.total_frames = self.total_frames.max(end * chunk.window_size);
        true
    }
}

/// Peaks newly completed for one zoom level
#[derive(Debug, Clone, PartialEq)]
pub struct PeaksChunk {
    pub window_size: usize,
    /// Index of the first peak in the level
    pub first_index: usize,
    pub peaks: Vec<(f32, f32)>,
}

/// One step of a summary build
#[derive(Debug, Clone)]
pub struct SummaryStep {
    /// Fraction of the file summarized, reaching 1.0 on the final step
    pub progress: f32,
    pub chunks: Vec<PeaksChunk>,
}

/// How a summary build ended
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    Complete(WaveformPeaks),
    /// Stopped by a cancellation request; partial peaks were discarded
    Cancelled,
}

/// Cooperative cancellation flag shared with a background build
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Lazy, restartable summary of a decoded file
///
/// Iterating yields one `SummaryStep` per `CHUNK_FRAMES` frames. After the
/// final step (progress 1.0) the iterator is exhausted; `restart` begins a
/// fresh pass over the same handle.
pub struct WaveformSummary<'a> {
    handle: &'a AudioHandle,
    window_sizes: Vec<usize>,
    builder: PeakBuilder,
    cursor: usize,
    done: bool,
}

impl<'a> WaveformSummary<'a> {
    pub fn build(handle: &'a AudioHandle, window_sizes: &[usize]) -> Self {
        Self {
            handle,
            window_sizes: window_sizes.to_vec(),
            builder: PeakBuilder::new(window_sizes),
            cursor: 0,
            done: false,
        }
    }

    /// Discard all progress and start again from the first frame
    pub fn restart(&mut self) {
        self.builder = PeakBuilder::new(&self.window_sizes);
        self.cursor = 0;
        self.done = false;
    }

    /// Fraction of the file summarized so far
    pub fn progress(&self) -> f32 {
        if self.done {
            return 1.0;
        }
        if self.handle.is_empty() {
            return 0.0;
        }
        (self.cursor as f64 / self.handle.len() as f64).min(1.0) as f32
    }

    pub fn is_complete(&self) -> bool {
        self.done
    }

    /// Peaks built so far (complete once `is_complete`)
    pub fn peaks(&self) -> WaveformPeaks {
        self.builder.clone().finish()
    }

    /// Drive the build to the end, checking `cancel` between chunks
    pub fn run(
        &mut self,
        cancel: &CancelToken,
        mut on_step: impl FnMut(&SummaryStep),
    ) -> SummaryOutcome {
        loop {
            if cancel.is_cancelled() {
                log::debug!("Waveform summary of {:?} cancelled", self.handle.path());
                self.restart();
                return SummaryOutcome::Cancelled;
            }
            match self.next() {
                Some(step) => on_step(&step),
                None => return SummaryOutcome::Complete(self.peaks()),
            }
        }
    }
}

impl Iterator for WaveformSummary<'_> {
    type Item = SummaryStep;

    fn next(&mut self) -> Option<SummaryStep> {
        if self.done {
            return None;
        }

        let frames = self.handle.frames();
        let end = (self.cursor + CHUNK_FRAMES).min(frames.len());
        let mut chunks = self.builder.push(&frames[self.cursor..end]);
        self.cursor = end;

        if self.cursor >= frames.len() {
            chunks.extend(self.builder.flush());
            self.done = true;
        }

        Some(SummaryStep {
            progress: self.progress(),
            chunks,
        })
    }
}
