//! Playback transport - position, loop range and play/stop state
//!
//! The transport lives on the audio thread. Each callback it renders one
//! block from the current position, runs it through the pitch shifter and
//! then either advances the position by the block length or, when the loop
//! end was crossed, sets it to `loop start + overshoot`.
//!
//! Every discontinuity (seek, loop wrap, new file) resets the pitch shifter
//! at the exact frame where the jump happens. A seek while stopped is
//! remembered and the reset happens when playback resumes.
//!
//! State is published to the control thread through `TransportAtomics`.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use basedrop::Shared;

use crate::audio_file::AudioHandle;
use crate::pitch::PitchShiftProcessor;
use crate::types::{PlayState, StereoSample};

/// Loop range in frames, always inside `[0, file_length]` with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopRange {
    start: usize,
    end: usize,
}

impl LoopRange {
    /// Build a range clamped to a file of `file_length` frames
    ///
    /// Reversed bounds are swapped.
    pub fn new(start: usize, end: usize, file_length: usize) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let end = end.min(file_length);
        Self {
            start: start.min(end),
            end,
        }
    }

    /// The whole file
    pub fn whole(file_length: usize) -> Self {
        Self {
            start: 0,
            end: file_length,
        }
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Ranges shorter than one frame cannot loop
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transport state readable from the control thread (lock-free)
///
/// Written by the audio thread after every command and every block.
#[derive(Debug, Default)]
pub struct TransportAtomics {
    position: AtomicU64,
    state: AtomicU8,
    loop_enabled: AtomicBool,
    loop_start: AtomicU64,
    loop_end: AtomicU64,
    file_length: AtomicU64,
    sample_rate: AtomicU32,
    /// Incremented each time a file is loaded or unloaded
    file_generation: AtomicU64,
    loaded: AtomicBool,
    wrap_count: AtomicU64,
    reset_count: AtomicU64,
}

impl TransportAtomics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current playhead in frames
    #[inline]
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Relaxed) as usize
    }

    #[inline]
    pub fn play_state(&self) -> PlayState {
        PlayState::from_u8(self.state.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.play_state() == PlayState::Playing
    }

    #[inline]
    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled.load(Ordering::Relaxed)
    }

    pub fn loop_range(&self) -> (usize, usize) {
        (
            self.loop_start.load(Ordering::Relaxed) as usize,
            self.loop_end.load(Ordering::Relaxed) as usize,
        )
    }

    #[inline]
    pub fn file_length(&self) -> usize {
        self.file_length.load(Ordering::Relaxed) as usize
    }

    /// Sample rate of the loaded file (0 when nothing is loaded)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn file_generation(&self) -> u64 {
        self.file_generation.load(Ordering::Relaxed)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Relaxed)
    }

    /// Loop wraps since the transport was created
    pub fn wrap_count(&self) -> u64 {
        self.wrap_count.load(Ordering::Relaxed)
    }

    /// Pitch shifter resets since the transport was created
    pub fn reset_count(&self) -> u64 {
        self.reset_count.load(Ordering::Relaxed)
    }
}

/// Playback state machine (audio thread)
pub struct PlaybackTransport {
    file: Option<Shared<AudioHandle>>,
    processor: PitchShiftProcessor,
    state: PlayState,
    position: usize,
    loop_range: LoopRange,
    loop_enabled: bool,
    /// A discontinuity is waiting for the next rendered frame
    pending_reset: bool,
    wrap_count: u64,
    atomics: std::sync::Arc<TransportAtomics>,
}

impl PlaybackTransport {
    pub fn new(atomics: std::sync::Arc<TransportAtomics>) -> Self {
        let transport = Self {
            file: None,
            processor: PitchShiftProcessor::new(),
            state: PlayState::Stopped,
            position: 0,
            loop_range: LoopRange::default(),
            loop_enabled: false,
            pending_reset: false,
            wrap_count: 0,
            atomics,
        };
        transport.publish();
        transport
    }

    pub fn atomics(&self) -> &std::sync::Arc<TransportAtomics> {
        &self.atomics
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn loop_range(&self) -> LoopRange {
        self.loop_range
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn file_length(&self) -> usize {
        self.file.as_ref().map_or(0, |f| f.len())
    }

    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn processor(&self) -> &PitchShiftProcessor {
        &self.processor
    }

    /// Install a new file: Stopped, position 0, loop range = whole file
    ///
    /// Returns the previous file so the caller decides where it is dropped
    /// (with `Shared` the memory is reclaimed by the collector thread).
    pub fn load(&mut self, file: Shared<AudioHandle>) -> Option<Shared<AudioHandle>> {
        self.loop_range = LoopRange::whole(file.len());
        let previous = self.file.replace(file);
        self.state = PlayState::Stopped;
        self.position = 0;
        // A new file is not a discontinuity of the old one: no reset counted
        self.processor.clear();
        self.pending_reset = false;
        self.atomics.file_generation.fetch_add(1, Ordering::Relaxed);
        self.publish();
        previous
    }

    pub fn unload(&mut self) -> Option<Shared<AudioHandle>> {
        let previous = self.file.take();
        self.state = PlayState::Stopped;
        self.position = 0;
        self.loop_range = LoopRange::default();
        self.processor.clear();
        self.pending_reset = false;
        self.atomics.file_generation.fetch_add(1, Ordering::Relaxed);
        self.publish();
        previous
    }

    /// Start playback from the current position (no-op without a file)
    ///
    /// At the end of the file playback restarts from the beginning.
    pub fn play(&mut self) {
        let len = self.file_length();
        if self.file.is_none() {
            return;
        }
        if self.position >= len {
            self.position = 0;
            self.pending_reset = true;
        }
        self.state = PlayState::Playing;
        self.publish();
    }

    /// Halt playback, keeping the position
    pub fn stop(&mut self) {
        self.state = PlayState::Stopped;
        self.publish();
    }

    pub fn toggle(&mut self) {
        match self.state {
            PlayState::Playing => self.stop(),
            PlayState::Stopped => self.play(),
        }
    }

    /// Jump to `position`, clamped to the file
    pub fn seek(&mut self, position: usize) {
        let len = self.file_length();
        self.position = position.min(len.saturating_sub(1));
        self.pending_reset = true;
        self.publish();
    }

    pub fn set_loop_range(&mut self, start: usize, end: usize) {
        self.loop_range = LoopRange::new(start, end, self.file_length());
        self.publish();
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
        self.publish();
    }

    #[inline]
    fn is_looping(&self) -> bool {
        self.loop_enabled && !self.loop_range.is_empty()
    }

    /// Render one block into `out` (real-time safe)
    ///
    /// `semitones` applies to the whole block. Outputs silence while stopped
    /// or without a file.
    pub fn process(&mut self, out: &mut [StereoSample], semitones: f32) {
        let Some(file) = self.file.as_ref().filter(|_| self.state == PlayState::Playing) else {
            out.fill(StereoSample::silence());
            return;
        };

        if self.is_looping() {
            let start = self.loop_range.start();
            let end = self.loop_range.end();
            let mut pos = self.position;
            if pos >= end {
                pos = start;
                self.pending_reset = true;
            }

            let mut written = 0;
            while written < out.len() {
                let take = (end - pos).min(out.len() - written);
                let segment = &mut out[written..written + take];
                file.read_into(pos, segment);
                if self.pending_reset {
                    self.processor.reset();
                    self.pending_reset = false;
                }
                self.processor.process_in_place(segment, semitones);

                written += take;
                pos += take;
                if pos >= end {
                    pos = start;
                    self.wrap_count += 1;
                    self.pending_reset = true;
                }
            }
            self.position = pos;
        } else {
            let len = file.len();
            file.read_into(self.position, out);
            if self.pending_reset {
                self.processor.reset();
                self.pending_reset = false;
            }
            self.processor.process_in_place(out, semitones);

            self.position = (self.position + out.len()).min(len);
            if self.position >= len {
                self.state = PlayState::Stopped;
            }
        }

        self.publish();
    }

    fn publish(&self) {
        let a = &self.atomics;
        a.position.store(self.position as u64, Ordering::Relaxed);
        a.state.store(self.state.as_u8(), Ordering::Relaxed);
        a.loop_enabled.store(self.loop_enabled, Ordering::Relaxed);
        a.loop_start.store(self.loop_range.start() as u64, Ordering::Relaxed);
        a.loop_end.store(self.loop_range.end() as u64, Ordering::Relaxed);
        a.file_length.store(self.file_length() as u64, Ordering::Relaxed);
        a.sample_rate.store(
            self.file.as_ref().map_or(0, |f| f.sample_rate()),
            Ordering::Relaxed,
        );
        a.loaded.store(self.file.is_some(), Ordering::Relaxed);
        a.wrap_count.store(self.wrap_count, Ordering::Relaxed);
        a.reset_count.store(self.processor.reset_count(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoBuffer;
    use basedrop::Collector;
    use std::sync::Arc;

    const BLOCK: usize = 512;

    /// A file whose sample values encode their frame index
    fn indexed_file(collector: &Collector, frames: usize) -> Shared<AudioHandle> {
        let samples = (0..frames).map(|i| StereoSample::mono(i as f32)).collect();
        Shared::new(
            &collector.handle(),
            AudioHandle::new("indexed.wav", StereoBuffer::from_vec(samples), 44100),
        )
    }

    fn transport_with(collector: &Collector, frames: usize) -> PlaybackTransport {
        let mut transport = PlaybackTransport::new(Arc::new(TransportAtomics::new()));
        transport.load(indexed_file(collector, frames));
        transport
    }

    fn tick(transport: &mut PlaybackTransport) -> Vec<StereoSample> {
        let mut out = vec![StereoSample::silence(); BLOCK];
        transport.process(&mut out, 0.0);
        out
    }

    #[test]
    fn test_loop_range_is_clamped() {
        assert_eq!(LoopRange::new(100, 50_000, 1000), LoopRange::new(100, 1000, 1000));
        assert_eq!(LoopRange::new(900, 10, 1000).start(), 10);
        assert_eq!(LoopRange::new(900, 10, 1000).end(), 900);

        let beyond = LoopRange::new(5000, 6000, 1000);
        assert_eq!((beyond.start(), beyond.end()), (1000, 1000));
        assert!(beyond.is_empty());
    }

    #[test]
    fn test_load_starts_stopped_at_zero() {
        let collector = Collector::new();
        let transport = transport_with(&collector, 1000);

        assert_eq!(transport.state(), PlayState::Stopped);
        assert_eq!(transport.position(), 0);
        assert_eq!(transport.loop_range(), LoopRange::whole(1000));
        assert_eq!(transport.atomics().file_length(), 1000);
        assert!(transport.atomics().is_loaded());
    }

    #[test]
    fn test_stopped_outputs_silence_and_keeps_position() {
        let collector = Collector::new();
        let mut transport = transport_with(&collector, 10_000);
        transport.play();
        tick(&mut transport);
        transport.stop();

        let out = tick(&mut transport);
        assert!(out.iter().all(|s| *s == StereoSample::silence()));
        assert_eq!(transport.position(), BLOCK);
    }

    #[test]
    fn test_play_without_file_is_noop() {
        let mut transport = PlaybackTransport::new(Arc::new(TransportAtomics::new()));
        transport.play();
        assert_eq!(transport.state(), PlayState::Stopped);
        transport.toggle();
        assert_eq!(transport.state(), PlayState::Stopped);
    }

    #[test]
    fn test_playback_reads_consecutive_blocks() {
        let collector = Collector::new();
        let mut transport = transport_with(&collector, 10_000);
        transport.play();

        let first = tick(&mut transport);
        let second = tick(&mut transport);
        assert_eq!(first[0].left, 0.0);
        assert_eq!(first[BLOCK - 1].left, (BLOCK - 1) as f32);
        assert_eq!(second[0].left, BLOCK as f32);
        assert_eq!(transport.position(), 2 * BLOCK);
    }

    #[test]
    fn test_five_second_file_auto_stops_at_end() {
        let collector = Collector::new();
        let length = 5 * 44100;
        let mut transport = transport_with(&collector, length);
        transport.play();

        let ticks = length.div_ceil(BLOCK);
        for _ in 0..ticks {
            tick(&mut transport);
        }

        assert_eq!(transport.state(), PlayState::Stopped);
        assert_eq!(transport.position(), length);
        assert_eq!(transport.atomics().position(), length);
        assert_eq!(transport.atomics().play_state(), PlayState::Stopped);
    }

    #[test]
    fn test_play_at_end_restarts_from_zero() {
        let collector = Collector::new();
        let mut transport = transport_with(&collector, 1000);
        transport.play();
        tick(&mut transport);
        tick(&mut transport);
        assert_eq!(transport.position(), 1000);

        transport.play();
        assert_eq!(transport.position(), 0);
        assert_eq!(transport.state(), PlayState::Playing);
    }

    #[test]
    fn test_tail_block_is_zero_padded() {
        let collector = Collector::new();
        let mut transport = transport_with(&collector, 700);
        transport.play();
        tick(&mut transport);
        let out = tick(&mut transport);

        assert_eq!(out[187].left, 699.0);
        assert!(out[188..].iter().all(|s| *s == StereoSample::silence()));
    }

    #[test]
    fn test_one_second_loop_wraps_once_in_one_and_a_half_seconds() {
        let collector = Collector::new();
        let mut transport = transport_with(&collector, 5 * 44100);
        transport.set_loop_range(0, 44100);
        transport.set_loop_enabled(true);
        transport.play();

        let ticks = (44100 * 3 / 2) / BLOCK;
        let mut out = vec![StereoSample::silence(); BLOCK];
        for _ in 0..ticks {
            transport.process(&mut out, 2.0);
            assert!(transport.position() < 44100);
        }

        assert_eq!(transport.atomics().wrap_count(), 1);
        assert_eq!(transport.processor().reset_count(), 1);
        assert_eq!(transport.atomics().reset_count(), 1);
        assert_eq!(transport.position(), ticks * BLOCK - 44100);
    }

    #[test]
    fn test_loop_wrap_is_sample_continuous() {
        let collector = Collector::new();
        let mut transport = transport_with(&collector, 10_000);
        transport.set_loop_range(1000, 1300);
        transport.set_loop_enabled(true);
        transport.seek(1200);
        transport.play();

        let out = tick(&mut transport);
        // 100 frames to the loop end, then around the 300-frame loop
        let expected: Vec<f32> = (1200..1300)
            .chain((1000..1300).cycle())
            .take(BLOCK)
            .map(|i| i as f32)
            .collect();
        let actual: Vec<f32> = out.iter().map(|s| s.left).collect();
        assert_eq!(actual, expected);
        assert_eq!(transport.atomics().wrap_count(), 2);
        assert_eq!(transport.position(), 1000 + (BLOCK - 100 - 300));
    }

    #[test]
    fn test_position_past_loop_end_wraps_to_start() {
        let collector = Collector::new();
        let mut transport = transport_with(&collector, 10_000);
        transport.seek(5000);
        transport.set_loop_range(0, 2000);
        transport.set_loop_enabled(true);
        transport.play();

        let out = tick(&mut transport);
        assert_eq!(out[0].left, 0.0);
        assert_eq!(transport.position(), BLOCK);
    }

    #[test]
    fn test_empty_loop_behaves_as_disabled() {
        let collector = Collector::new();
        let mut transport = transport_with(&collector, 10_000);
        transport.set_loop_range(300, 300);
        transport.set_loop_enabled(true);
        transport.play();

        tick(&mut transport);
        assert_eq!(transport.position(), BLOCK);
        assert_eq!(transport.atomics().wrap_count(), 0);
    }

    #[test]
    fn test_seek_matches_cold_read() {
        let collector = Collector::new();
        let file = indexed_file(&collector, 10_000);
        let mut transport = PlaybackTransport::new(Arc::new(TransportAtomics::new()));
        transport.load(file.clone());
        transport.play();
        tick(&mut transport);

        transport.seek(4321);
        let out = tick(&mut transport);
        assert_eq!(out, file.read_block(4321, BLOCK).as_slice());
    }

    #[test]
    fn test_seek_resets_processor() {
        let collector = Collector::new();
        let mut transport = transport_with(&collector, 10_000);
        transport.play();
        tick(&mut transport);
        let before = transport.processor().reset_count();

        // Playing: reset on the next block
        transport.seek(100);
        tick(&mut transport);
        assert_eq!(transport.processor().reset_count(), before + 1);

        // Stopped: remembered until playback resumes
        transport.stop();
        transport.seek(200);
        transport.seek(300);
        tick(&mut transport);
        assert_eq!(transport.processor().reset_count(), before + 1);
        transport.play();
        tick(&mut transport);
        assert_eq!(transport.processor().reset_count(), before + 2);
    }

    #[test]
    fn test_new_file_clears_history_without_counting_reset() {
        let collector = Collector::new();
        let mut transport = transport_with(&collector, 10_000);
        transport.play();
        let mut out = vec![StereoSample::silence(); BLOCK];
        transport.process(&mut out, 3.0);

        transport.load(indexed_file(&collector, 10_000));
        transport.play();
        transport.process(&mut out, 3.0);
        transport.unload();
        assert_eq!(transport.processor().reset_count(), 0);

        // Same output as a processor that never saw the first file
        let mut fresh = PitchShiftProcessor::new();
        let file = indexed_file(&collector, 10_000);
        let mut expected = file.read_block(0, BLOCK);
        fresh.process_in_place(expected.samples_mut().as_mut_slice(), 3.0);
        transport.load(file);
        transport.play();
        transport.process(&mut out, 3.0);
        assert_eq!(out, expected.as_slice());
    }

    #[test]
    fn test_seek_is_clamped_to_file() {
        let collector = Collector::new();
        let mut transport = transport_with(&collector, 1000);
        transport.seek(50_000);
        assert_eq!(transport.position(), 999);
    }
}
