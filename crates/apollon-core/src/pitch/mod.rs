//! Real-time pitch shifting
//!
//! `PitchShiftProcessor` shifts a stream of stereo blocks by a number of
//! semitones without changing their duration. It is stateful across calls:
//! overlapping analysis frames carry history from one block to the next, so
//! the owner must `reset` it whenever the playback position jumps.
//!
//! The semitone value is latched once per block. It is usually read from a
//! `PitchParameter`, which the control thread writes and the audio thread
//! reads without locking.
//!
//! At exactly 0 semitones the processor is bypassed and the output is the
//! input, bit for bit. When a shift is active the output lags the input by
//! `LATENCY` frames.
//!
//! The shifter keeps running at unity ratio while bypassed, so its history
//! is always warm. Moving between bypass and a shift crossfades between the
//! dry and the shifted signal over `CROSSFADE_FRAMES` instead of jumping.

mod vocoder;

pub use vocoder::{FRAME_SIZE, HOP_SIZE, LATENCY};

use std::sync::atomic::{AtomicU32, Ordering};

use vocoder::ChannelShifter;

use crate::types::{AudioBuffer, StereoSample};

/// Lowest accepted shift in semitones
pub const MIN_SEMITONES: f32 = -4.0;

/// Highest accepted shift in semitones
pub const MAX_SEMITONES: f32 = 4.0;

/// Default shift (no change)
pub const DEFAULT_SEMITONES: f32 = 0.0;

/// Length of the dry/shifted crossfade when entering or leaving bypass
pub const CROSSFADE_FRAMES: usize = HOP_SIZE;

/// Clamp a requested shift into the supported range
///
/// NaN maps to the default, so a bad value from a UI can never reach the DSP.
#[inline]
pub fn clamp_semitones(semitones: f32) -> f32 {
    if semitones.is_nan() {
        return DEFAULT_SEMITONES;
    }
    semitones.clamp(MIN_SEMITONES, MAX_SEMITONES)
}

/// Frequency ratio for a shift in semitones
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    2.0f32.powf(semitones / 12.0)
}

/// Lock-free pitch parameter shared between threads
///
/// Stores the f32 bit pattern in an `AtomicU32`. Writes are clamped, so a
/// reader never observes an out-of-range value.
#[derive(Debug)]
pub struct PitchParameter {
    bits: AtomicU32,
}

impl PitchParameter {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(DEFAULT_SEMITONES.to_bits()),
        }
    }

    /// Set the shift, returning the effective (clamped) value
    pub fn set(&self, semitones: f32) -> f32 {
        let value = clamp_semitones(semitones);
        self.bits.store(value.to_bits(), Ordering::Relaxed);
        value
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn reset_to_default(&self) {
        self.set(DEFAULT_SEMITONES);
    }
}

impl Default for PitchParameter {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateful stereo pitch shifter
pub struct PitchShiftProcessor {
    left: ChannelShifter,
    right: ChannelShifter,
    /// Shift latched for the current block
    semitones: f32,
    /// Frames left in the current dry/shifted crossfade
    fade_remaining: usize,
    reset_count: u64,
}

impl PitchShiftProcessor {
    /// Create a processor (allocates all analysis buffers)
    pub fn new() -> Self {
        Self {
            left: ChannelShifter::new(),
            right: ChannelShifter::new(),
            semitones: DEFAULT_SEMITONES,
            fade_remaining: 0,
            reset_count: 0,
        }
    }

    /// Shift of the most recently processed block
    pub fn semitones(&self) -> f32 {
        self.semitones
    }

    /// Number of explicit `reset` calls since construction
    pub fn reset_count(&self) -> u64 {
        self.reset_count
    }

    /// Output delay in frames while a shift is active
    pub fn latency(&self) -> usize {
        if self.semitones == 0.0 {
            0
        } else {
            LATENCY
        }
    }

    /// Drop all history after a playback discontinuity (seek, loop wrap)
    pub fn reset(&mut self) {
        self.clear();
        self.reset_count += 1;
    }

    /// Drop all history without counting a reset (new or removed file)
    ///
    /// Afterwards the processor behaves exactly like a new one.
    pub fn clear(&mut self) {
        self.left.reset();
        self.right.reset();
        self.semitones = DEFAULT_SEMITONES;
        self.fade_remaining = 0;
    }

    /// Shift `block` in place (real-time safe)
    ///
    /// `semitones` is clamped and applies to the whole block.
    pub fn process_in_place(&mut self, block: &mut [StereoSample], semitones: f32) {
        let semitones = clamp_semitones(semitones);
        let bypass = semitones == 0.0;
        if bypass != (self.semitones == 0.0) {
            // A reversal mid-fade continues from the current mix
            self.fade_remaining = CROSSFADE_FRAMES - self.fade_remaining;
        }
        self.semitones = semitones;

        let ratio = semitones_to_ratio(semitones);
        for frame in block.iter_mut() {
            let dry = *frame;
            let wet = StereoSample::new(
                self.left.process_sample(dry.left, ratio),
                self.right.process_sample(dry.right, ratio),
            );

            *frame = if self.fade_remaining > 0 {
                let progress = 1.0 - self.fade_remaining as f32 / CROSSFADE_FRAMES as f32;
                let wet_gain = if bypass { 1.0 - progress } else { progress };
                self.fade_remaining -= 1;
                StereoSample::new(
                    dry.left + (wet.left - dry.left) * wet_gain,
                    dry.right + (wet.right - dry.right) * wet_gain,
                )
            } else if bypass {
                dry
            } else {
                wet
            };
        }
    }

    /// Shift `input` into `output` (real-time safe)
    ///
    /// Processes `min(input.len(), output.len())` frames.
    pub fn process(&mut self, input: &[StereoSample], output: &mut [StereoSample], semitones: f32) {
        let len = input.len().min(output.len());
        output[..len].copy_from_slice(&input[..len]);
        self.process_in_place(&mut output[..len], semitones);
    }

    /// Shift a block by value, returning a block of the same length and rate
    pub fn process_block(&mut self, mut block: AudioBuffer, semitones: f32) -> AudioBuffer {
        self.process_in_place(block.samples_mut().as_mut_slice(), semitones);
        block
    }
}

impl Default for PitchShiftProcessor {
    fn default() -> Self {
        Self::new()
    }
}
