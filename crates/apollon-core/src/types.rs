//! Common types for Apollon
//!
//! This module contains the fundamental audio types used throughout the
//! engine: stereo samples, pre-allocatable stereo buffers and the
//! sample-rate-tagged `AudioBuffer` that flows from the reader to the
//! processor to the transport.

/// Default sample rate used when the device does not dictate one (44.1kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// Stereo device buffers are written from `&[StereoSample]` through a
/// zero-copy bytemuck cast to interleaved `&[f32]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Smallest of the two channel values
    #[inline]
    pub fn min_channel(&self) -> Sample {
        self.left.min(self.right)
    }

    /// Largest of the two channel values
    #[inline]
    pub fn max_channel(&self) -> Sample {
        self.left.max(self.right)
    }
}

/// A buffer of stereo samples
///
/// The working buffer type of the real-time path. Buffers are allocated
/// once at `MAX_BUFFER_SIZE` capacity and then resized within that capacity
/// from the audio callback, which never allocates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a new empty buffer with the specified capacity (in stereo samples)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from an existing Vec of StereoSamples
    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    /// Get the number of stereo samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Allocated capacity in stereo samples
    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Fills any newly exposed elements with silence. Never allocates as long
    /// as `new_len` does not exceed the capacity.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        debug_assert!(
            new_len <= self.samples.capacity(),
            "set_len_from_capacity called with len > capacity"
        );
        if new_len > self.samples.len() {
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }
}

/// A block of stereo audio at a known sample rate
///
/// Produced by the reader, transformed by the pitch shifter and consumed by
/// the transport. Blocks are handed over by value and never shared mutably.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: StereoBuffer,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Wrap an existing stereo buffer
    pub fn new(samples: StereoBuffer, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Create a silent block
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(StereoBuffer::silence(len), sample_rate)
    }

    /// Number of frames in the block
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut StereoBuffer {
        &mut self.samples
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        self.samples.as_slice()
    }
}

/// Playback state of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
}

impl PlayState {
    /// Encoding used by the lock-free atomics
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            PlayState::Stopped => 0,
            PlayState::Playing => 1,
        }
    }

    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PlayState::Playing,
            _ => PlayState::Stopped,
        }
    }
}
