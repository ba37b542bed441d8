//! Incremental multi-resolution peak builder

use rayon::prelude::*;

use super::{PeakLevel, PeaksChunk, WaveformPeaks};
use crate::types::StereoSample;

/// Running (min, max) accumulator for one zoom level
#[derive(Debug, Clone)]
struct LevelState {
    window_size: usize,
    peaks: Vec<(f32, f32)>,
    /// Peaks already handed out as chunks
    emitted: usize,
    min: f32,
    max: f32,
    count: usize,
}

impl LevelState {
    fn new(window_size: usize) -> Self {
        Self {
            window_size,
            peaks: Vec::new(),
            emitted: 0,
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            count: 0,
        }
    }

    fn feed(&mut self, frames: &[StereoSample]) {
        for frame in frames {
            self.min = self.min.min(frame.min_channel());
            self.max = self.max.max(frame.max_channel());
            self.count += 1;
            if self.count == self.window_size {
                self.close_window();
            }
        }
    }

    fn close_window(&mut self) {
        if self.count > 0 {
            self.peaks.push((self.min, self.max));
        }
        self.min = f32::INFINITY;
        self.max = f32::NEG_INFINITY;
        self.count = 0;
    }

    /// Peaks completed since the last call
    fn take_chunk(&mut self) -> Option<PeaksChunk> {
        if self.emitted == self.peaks.len() {
            return None;
        }
        let chunk = PeaksChunk {
            window_size: self.window_size,
            first_index: self.emitted,
            peaks: self.peaks[self.emitted..].to_vec(),
        };
        self.emitted = self.peaks.len();
        Some(chunk)
    }
}

/// Builds `WaveformPeaks` from frames pushed in order
///
/// Each level keeps its own partial window, so the result does not depend on
/// how the input is split into pushes. Levels are independent and are fed in
/// parallel.
#[derive(Debug, Clone)]
pub struct PeakBuilder {
    levels: Vec<LevelState>,
    total_frames: usize,
}

impl PeakBuilder {
    /// Create a builder for the given window sizes
    ///
    /// Sizes are sorted and de-duplicated; zero is ignored.
    pub fn new(window_sizes: &[usize]) -> Self {
        let mut sizes: Vec<usize> = window_sizes.iter().copied().filter(|&s| s > 0).collect();
        sizes.sort_unstable();
        sizes.dedup();
        Self {
            levels: sizes.into_iter().map(LevelState::new).collect(),
            total_frames: 0,
        }
    }

    pub fn window_sizes(&self) -> Vec<usize> {
        self.levels.iter().map(|l| l.window_size).collect()
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Feed the next frames and return the peaks they completed
    pub fn push(&mut self, frames: &[StereoSample]) -> Vec<PeaksChunk> {
        if frames.is_empty() {
            return Vec::new();
        }
        self.total_frames += frames.len();
        self.levels
            .par_iter_mut()
            .filter_map(|level| {
                level.feed(frames);
                level.take_chunk()
            })
            .collect()
    }

    /// Close trailing partial windows and return the final chunks
    pub fn flush(&mut self) -> Vec<PeaksChunk> {
        self.levels
            .iter_mut()
            .filter_map(|level| {
                level.close_window();
                level.take_chunk()
            })
            .collect()
    }

    /// Finish and return the complete peaks
    pub fn finish(mut self) -> WaveformPeaks {
        self.flush();
        WaveformPeaks {
            levels: self
                .levels
                .into_iter()
                .map(|l| PeakLevel {
                    window_size: l.window_size,
                    peaks: l.peaks,
                })
                .collect(),
            total_frames: self.total_frames,
        }
    }
}
