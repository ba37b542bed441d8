//! Control context
//!
//! `Controller` is the single entry point for user gestures (play, seek,
//! pitch, loop, load). It never touches the engine directly: transport
//! changes go through the lock-free command queue, the pitch through an
//! atomic parameter, and state comes back through `TransportAtomics`.
//!
//! File loads are delegated to the background `FileLoader`. `poll` drains
//! its events on the control thread and hands finished files to the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use basedrop::Shared;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::DeviceStatus;
use crate::audio_file::{AudioHandle, DecodeError};
use crate::engine::{command_channel, AudioEngine, CommandSender, EngineCommand, LoopRange, TransportAtomics};
use crate::loader::{FileLoader, LoadId, LoaderEvent};
use crate::pitch::PitchParameter;
use crate::types::PlayState;
use crate::waveform::WaveformPeaks;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The audio thread is not draining commands (stalled or stopped)
    #[error("Engine command queue is full")]
    QueueFull,
}

/// What happens once a file finishes loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackOptions {
    /// Loop the whole file
    pub loop_on_load: bool,
    /// Start playing immediately
    pub autoplay_on_load: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            loop_on_load: true,
            autoplay_on_load: true,
        }
    }
}

/// Notifications produced by `Controller::poll`
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Decode progress of the pending load in [0.0, 1.0]
    LoadProgress(f32),
    /// A new file was handed to the engine
    FileLoaded {
        path: PathBuf,
        frames: usize,
        sample_rate: u32,
    },
    /// The pending load failed; the previous file (if any) is untouched
    LoadFailed { path: PathBuf, error: DecodeError },
    /// The file decoded but the engine queue was full; nothing was loaded
    EngineBusy { path: PathBuf },
    /// The waveform summary of the current file is complete
    WaveformReady,
    /// The output device disappeared; playback was stopped
    DeviceLost,
}

/// Snapshot of the transport for display
#[derive(Debug, Clone, PartialEq)]
pub struct TransportStatus {
    pub state: PlayState,
    pub position: usize,
    pub file_length: usize,
    pub sample_rate: u32,
    pub loop_enabled: bool,
    pub loop_range: LoopRange,
    pub semitones: f32,
    /// Playhead as a fraction of the loop range
    pub cursor_fraction: f32,
    pub wrap_count: u64,
    pub reset_count: u64,
    /// Decode progress while a load is pending
    pub load_progress: Option<f32>,
    pub file_name: Option<String>,
    pub device_errors: u64,
}

impl TransportStatus {
    pub fn position_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.position as f64 / self.sample_rate as f64
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.file_length as f64 / self.sample_rate as f64
    }
}

/// Playhead as a fraction of `range`; 0 when the range is empty
pub fn cursor_fraction(position: usize, range: LoopRange) -> f32 {
    if range.is_empty() {
        return 0.0;
    }
    let offset = position.saturating_sub(range.start()).min(range.len());
    (offset as f64 / range.len() as f64) as f32
}

/// Control-thread side of the player
pub struct Controller {
    commands: CommandSender,
    atomics: Arc<TransportAtomics>,
    pitch: Arc<PitchParameter>,
    device: Arc<DeviceStatus>,
    loader: FileLoader,
    options: PlaybackOptions,
    window_sizes: Vec<usize>,
    /// File currently installed in the engine
    current: Option<Shared<AudioHandle>>,
    current_load: Option<LoadId>,
    pending_load: Option<(LoadId, PathBuf)>,
    load_progress: Option<f32>,
    waveform: WaveformPeaks,
    waveform_complete: bool,
    /// Peaks of the pending load received so far
    loading_waveform: Option<WaveformPeaks>,
    device_lost_handled: bool,
}

impl Controller {
    /// Build a controller and the engine it drives
    ///
    /// The engine goes to the audio thread (`AudioOutput::start`) or, for
    /// offline use, is driven by the caller.
    pub fn with_engine(
        sample_rate: u32,
        gc: basedrop::Handle,
        window_sizes: &[usize],
        options: PlaybackOptions,
    ) -> std::io::Result<(Self, AudioEngine)> {
        let (commands, consumer) = command_channel();
        let atomics = Arc::new(TransportAtomics::new());
        let pitch = Arc::new(PitchParameter::new());
        let engine = AudioEngine::new(sample_rate, consumer, pitch.clone(), atomics.clone());
        let loader = FileLoader::spawn(sample_rate, window_sizes, gc)?;

        let controller = Self {
            commands,
            atomics,
            pitch,
            device: Arc::new(DeviceStatus::new()),
            loader,
            options,
            window_sizes: window_sizes.to_vec(),
            current: None,
            current_load: None,
            pending_load: None,
            load_progress: None,
            waveform: WaveformPeaks::with_window_sizes(window_sizes),
            waveform_complete: false,
            loading_waveform: None,
            device_lost_handled: false,
        };
        Ok((controller, engine))
    }

    fn send(&mut self, cmd: EngineCommand) -> Result<(), ControlError> {
        self.commands.send(cmd).map_err(|cmd| {
            log::warn!("Engine command queue full, dropped {:?}", cmd);
            ControlError::QueueFull
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Gestures
    // ─────────────────────────────────────────────────────────────────────────

    /// Start loading `path` in the background
    ///
    /// `None` ("no file chosen") does nothing. The current file keeps
    /// playing until the new one is ready.
    pub fn load(&mut self, path: Option<PathBuf>) -> Option<LoadId> {
        let path = path?;
        let id = self.loader.load(path.clone());
        self.pending_load = Some((id, path));
        self.load_progress = Some(0.0);
        self.loading_waveform = Some(WaveformPeaks::with_window_sizes(&self.window_sizes));
        Some(id)
    }

    /// Drop the current file
    pub fn unload(&mut self) -> Result<(), ControlError> {
        self.loader.cancel();
        self.pending_load = None;
        self.load_progress = None;
        self.loading_waveform = None;
        self.send(EngineCommand::Unload)?;
        self.current = None;
        self.current_load = None;
        self.waveform = WaveformPeaks::with_window_sizes(&self.window_sizes);
        self.waveform_complete = false;
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), ControlError> {
        self.send(EngineCommand::Play)
    }

    pub fn stop(&mut self) -> Result<(), ControlError> {
        self.send(EngineCommand::Stop)
    }

    /// Play/pause (no-op while no file is loaded)
    pub fn toggle_play(&mut self) -> Result<(), ControlError> {
        if self.current.is_none() {
            return Ok(());
        }
        self.send(EngineCommand::TogglePlay)
    }

    /// Jump to a frame position (clamped by the engine)
    pub fn seek(&mut self, position: usize) -> Result<(), ControlError> {
        self.send(EngineCommand::Seek { position })
    }

    pub fn seek_seconds(&mut self, seconds: f64) -> Result<(), ControlError> {
        let rate = self.current.as_ref().map_or(0, |f| f.sample_rate());
        let position = (seconds.max(0.0) * rate as f64) as usize;
        self.seek(position)
    }

    /// Seek to a fraction of the loop range while looping, else of the file
    pub fn seek_fraction(&mut self, fraction: f32) -> Result<(), ControlError> {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0) as f64
        };
        let (start, end) = self.atomics.loop_range();
        let range = LoopRange::new(start, end, self.atomics.file_length());

        let position = if self.atomics.loop_enabled() && !range.is_empty() {
            range.start() + (fraction * range.len() as f64) as usize
        } else {
            (fraction * self.atomics.file_length() as f64) as usize
        };
        self.seek(position)
    }

    /// Set the shift; returns the effective (clamped) value
    pub fn set_pitch(&mut self, semitones: f32) -> f32 {
        let value = self.pitch.set(semitones);
        log::debug!("Pitch set to {:+.2} st (requested {})", value, semitones);
        value
    }

    pub fn reset_pitch(&mut self) {
        self.pitch.reset_to_default();
    }

    pub fn set_loop_range(&mut self, start: usize, end: usize) -> Result<(), ControlError> {
        self.send(EngineCommand::SetLoopRange { start, end })
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) -> Result<(), ControlError> {
        self.send(EngineCommand::SetLoopEnabled(enabled))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply loader results and device faults; call regularly
    pub fn poll(&mut self) -> Vec<ControlEvent> {
        let mut events = Vec::new();

        while let Some(event) = self.loader.try_recv() {
            self.handle_loader_event(event, &mut events);
        }

        if self.device.is_device_lost() && !self.device_lost_handled {
            self.device_lost_handled = true;
            log::error!("Output device lost, stopping playback");
            if let Err(e) = self.send(EngineCommand::Stop) {
                log::warn!("Could not stop transport: {}", e);
            }
            events.push(ControlEvent::DeviceLost);
        }

        events
    }

    fn is_pending(&self, id: LoadId) -> bool {
        self.pending_load.as_ref().is_some_and(|(pending, _)| *pending == id)
    }

    fn handle_loader_event(&mut self, event: LoaderEvent, events: &mut Vec<ControlEvent>) {
        match event {
            LoaderEvent::Progress { id, fraction } if self.is_pending(id) => {
                self.load_progress = Some(fraction);
                events.push(ControlEvent::LoadProgress(fraction));
            }
            LoaderEvent::Loaded { id, handle, .. } if self.is_pending(id) => {
                self.install(id, handle, events);
            }
            LoaderEvent::PeaksChunk { id, chunk } if self.is_pending(id) => {
                if let Some(waveform) = self.loading_waveform.as_mut() {
                    waveform.apply(&chunk);
                }
            }
            LoaderEvent::PeaksChunk { id, chunk } if self.current_load == Some(id) => {
                self.waveform.apply(&chunk);
            }
            LoaderEvent::SummaryComplete { id, peaks } if self.current_load == Some(id) => {
                self.waveform = peaks;
                self.waveform_complete = true;
                events.push(ControlEvent::WaveformReady);
            }
            LoaderEvent::Failed { id, path, error, .. } if self.is_pending(id) => {
                self.pending_load = None;
                self.load_progress = None;
                self.loading_waveform = None;
                events.push(ControlEvent::LoadFailed { path, error });
            }
            LoaderEvent::Cancelled { id } if self.is_pending(id) => {
                self.pending_load = None;
                self.load_progress = None;
                self.loading_waveform = None;
            }
            stale => log::trace!("Ignoring stale loader event {:?}", stale),
        }
    }

    /// Hand a decoded file to the engine and apply the load options
    fn install(&mut self, id: LoadId, handle: Shared<AudioHandle>, events: &mut Vec<ControlEvent>) {
        let path = handle.path().to_path_buf();
        let frames = handle.len();
        let sample_rate = handle.sample_rate();

        self.pending_load = None;
        self.load_progress = None;
        let loading_waveform = self.loading_waveform.take();

        if self
            .send(EngineCommand::LoadFile {
                file: handle.clone(),
            })
            .is_err()
        {
            log::error!("Could not hand {:?} to the engine", path);
            events.push(ControlEvent::EngineBusy { path });
            return;
        }

        self.current = Some(handle);
        self.current_load = Some(id);
        self.waveform = loading_waveform
            .unwrap_or_else(|| WaveformPeaks::with_window_sizes(&self.window_sizes));
        self.waveform_complete = false;

        let mut result = Ok(());
        if self.options.loop_on_load {
            result = result
                .and_then(|_| self.send(EngineCommand::SetLoopRange { start: 0, end: frames }))
                .and_then(|_| self.send(EngineCommand::SetLoopEnabled(true)));
        }
        if self.options.autoplay_on_load {
            result = result.and_then(|_| self.send(EngineCommand::Play));
        }
        if let Err(e) = result {
            log::warn!("Load options for {:?} not applied: {}", path, e);
        }

        events.push(ControlEvent::FileLoaded {
            path,
            frames,
            sample_rate,
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────

    pub fn status(&self) -> TransportStatus {
        let atomics = &self.atomics;
        let (start, end) = atomics.loop_range();
        let loop_range = LoopRange::new(start, end, atomics.file_length());
        let position = atomics.position();

        TransportStatus {
            state: atomics.play_state(),
            position,
            file_length: atomics.file_length(),
            sample_rate: atomics.sample_rate(),
            loop_enabled: atomics.loop_enabled(),
            loop_range,
            semitones: self.pitch.get(),
            cursor_fraction: cursor_fraction(position, loop_range),
            wrap_count: atomics.wrap_count(),
            reset_count: atomics.reset_count(),
            load_progress: self.load_progress,
            file_name: self.current.as_ref().map(|f| f.name()),
            device_errors: self.device.error_count(),
        }
    }

    /// File currently handed to the engine
    pub fn current_file(&self) -> Option<&Shared<AudioHandle>> {
        self.current.as_ref()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|f| f.path())
    }

    /// Waveform of the current file (partial until `waveform_complete`)
    pub fn waveform(&self) -> &WaveformPeaks {
        &self.waveform
    }

    pub fn waveform_complete(&self) -> bool {
        self.waveform_complete
    }

    /// Partial waveform of the file being loaded, drawn before it plays
    pub fn loading_waveform(&self) -> Option<&WaveformPeaks> {
        self.loading_waveform.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    pub fn options(&self) -> PlaybackOptions {
        self.options
    }

    pub fn set_options(&mut self, options: PlaybackOptions) {
        self.options = options;
    }

    pub fn pitch(&self) -> &Arc<PitchParameter> {
        &self.pitch
    }

    pub fn atomics(&self) -> &Arc<TransportAtomics> {
        &self.atomics
    }

    /// Fault record to pass to the output stream
    pub fn device_status(&self) -> Arc<DeviceStatus> {
        self.device.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DeviceError;
    use crate::audio_file::test_util::write_sine;
    use crate::engine::GcThread;
    use crate::types::StereoBuffer;
    use crate::waveform::DEFAULT_WINDOW_SIZES;
    use std::time::{Duration, Instant};

    const BLOCK: usize = 512;

    struct Rig {
        controller: Controller,
        engine: AudioEngine,
        out: StereoBuffer,
        // Dropped last so shared files are collected
        _gc: GcThread,
    }

    impl Rig {
        fn new(options: PlaybackOptions) -> Self {
            let gc = GcThread::spawn().unwrap();
            let (controller, engine) =
                Controller::with_engine(44100, gc.handle(), &DEFAULT_WINDOW_SIZES, options).unwrap();
            Self {
                controller,
                engine,
                out: StereoBuffer::silence(BLOCK),
                _gc: gc,
            }
        }

        /// Run one audio callback
        fn tick(&mut self) {
            self.engine.process(&mut self.out);
        }

        /// Poll until `done` matches an event, ticking the engine once per poll
        fn poll_until(&mut self, done: impl Fn(&ControlEvent) -> bool) -> Vec<ControlEvent> {
            let deadline = Instant::now() + Duration::from_secs(30);
            let mut seen = Vec::new();
            loop {
                let events = self.controller.poll();
                self.tick();
                let finished = events.iter().any(&done);
                seen.extend(events);
                if finished {
                    return seen;
                }
                assert!(Instant::now() < deadline, "timed out; saw {:?}", seen);
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }

    fn is_loaded(e: &ControlEvent) -> bool {
        matches!(e, ControlEvent::FileLoaded { .. })
    }

    #[test]
    fn test_load_none_is_noop() {
        let mut rig = Rig::new(PlaybackOptions::default());
        assert_eq!(rig.controller.load(None), None);
        assert!(!rig.controller.is_loading());
        assert!(rig.controller.poll().is_empty());
    }

    #[test]
    fn test_load_and_loop_with_autoplay() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 44100);
        let mut rig = Rig::new(PlaybackOptions::default());

        rig.controller.load(Some(path.clone()));
        let events = rig.poll_until(is_loaded);
        assert!(events.contains(&ControlEvent::FileLoaded {
            path,
            frames: 44100,
            sample_rate: 44100,
        }));

        let status = rig.controller.status();
        assert_eq!(status.state, PlayState::Playing);
        assert!(status.loop_enabled);
        assert_eq!(status.loop_range, LoopRange::whole(44100));
        assert_eq!(status.file_length, 44100);
        assert_eq!(status.file_name.as_deref(), Some("sine.wav"));
        assert_eq!(status.load_progress, None);
    }

    #[test]
    fn test_load_and_loop_resets_once_per_wrap() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 44100);
        let mut rig = Rig::new(PlaybackOptions::default());
        rig.controller.set_pitch(2.0);

        rig.controller.load(Some(path));
        // The tick after install renders the first block
        rig.poll_until(is_loaded);
        for _ in 1..(44100 * 3 / 2) / BLOCK {
            rig.tick();
        }

        let status = rig.controller.status();
        assert_eq!(status.state, PlayState::Playing);
        assert_eq!(status.wrap_count, 1);
        assert_eq!(status.reset_count, 1);
    }

    #[test]
    fn test_full_queue_reports_busy_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 4410);
        let mut rig = Rig::new(PlaybackOptions::default());
        while rig.controller.stop().is_ok() {}

        rig.controller.load(Some(path.clone()));
        let deadline = Instant::now() + Duration::from_secs(30);
        let events = loop {
            // No ticks: the engine never drains the queue
            let events = rig.controller.poll();
            if events.iter().any(|e| matches!(e, ControlEvent::EngineBusy { .. })) {
                break events;
            }
            assert!(Instant::now() < deadline, "load never finished");
            std::thread::sleep(Duration::from_millis(5));
        };

        assert!(events.contains(&ControlEvent::EngineBusy { path }));
        assert!(!events.iter().any(is_loaded));
        assert!(!rig.controller.is_loading());
        assert_eq!(rig.controller.status().load_progress, None);
        assert!(rig.controller.current_file().is_none());

        rig.tick();
        assert!(!rig.controller.atomics().is_loaded());
    }

    #[test]
    fn test_load_without_autoplay_stays_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 10_000);
        let mut rig = Rig::new(PlaybackOptions {
            loop_on_load: false,
            autoplay_on_load: false,
        });

        rig.controller.load(Some(path));
        rig.poll_until(is_loaded);

        let status = rig.controller.status();
        assert_eq!(status.state, PlayState::Stopped);
        assert!(!status.loop_enabled);
        assert_eq!(status.position, 0);
    }

    #[test]
    fn test_waveform_is_assembled_for_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 200_000);
        let mut rig = Rig::new(PlaybackOptions::default());

        rig.controller.load(Some(path));
        rig.poll_until(|e| *e == ControlEvent::WaveformReady);

        assert!(rig.controller.waveform_complete());
        let level = rig.controller.waveform().level(1024).unwrap();
        assert_eq!(level.peaks.len(), 200_000usize.div_ceil(1024));
    }

    #[test]
    fn test_waveform_of_pending_load_is_installed_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 200_000);
        let mut rig = Rig::new(PlaybackOptions::default());

        rig.controller.load(Some(path));
        assert!(rig.controller.loading_waveform().is_some());
        rig.poll_until(is_loaded);

        assert!(rig.controller.loading_waveform().is_none());
        // Decoded at the device rate: peaks were drawn before the file played
        let level = rig.controller.waveform().level(256).unwrap();
        assert!(!level.peaks.is_empty());
    }

    #[test]
    fn test_failed_load_keeps_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 20_000);
        let mut rig = Rig::new(PlaybackOptions::default());

        rig.controller.load(Some(path.clone()));
        rig.poll_until(is_loaded);
        let generation = rig.controller.atomics().file_generation();

        rig.controller
            .load(Some(PathBuf::from("/nonexistent/apollon/missing.wav")));
        let events = rig.poll_until(|e| matches!(e, ControlEvent::LoadFailed { .. }));
        assert!(events.iter().any(|e| matches!(
            e,
            ControlEvent::LoadFailed {
                error: DecodeError::NotFound(_),
                ..
            }
        )));

        assert_eq!(rig.controller.atomics().file_generation(), generation);
        assert_eq!(rig.controller.current_path(), Some(path.as_path()));
        assert_eq!(rig.controller.status().state, PlayState::Playing);
        assert!(!rig.controller.is_loading());
    }

    #[test]
    fn test_toggle_without_file_is_noop() {
        let mut rig = Rig::new(PlaybackOptions::default());
        rig.controller.toggle_play().unwrap();
        assert_eq!(
            rig.controller.commands.slots(),
            crate::engine::COMMAND_QUEUE_CAPACITY
        );
        rig.tick();
        assert_eq!(rig.controller.status().state, PlayState::Stopped);
    }

    #[test]
    fn test_toggle_play_pauses_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 44100);
        let mut rig = Rig::new(PlaybackOptions::default());
        rig.controller.load(Some(path));
        rig.poll_until(is_loaded);

        rig.controller.toggle_play().unwrap();
        rig.tick();
        let paused_at = rig.controller.status().position;
        assert_eq!(rig.controller.status().state, PlayState::Stopped);
        rig.tick();
        assert_eq!(rig.controller.status().position, paused_at);

        rig.controller.toggle_play().unwrap();
        rig.tick();
        assert_eq!(rig.controller.status().state, PlayState::Playing);
        assert_eq!(rig.controller.status().position, paused_at + BLOCK);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut rig = Rig::new(PlaybackOptions::default());
        assert_eq!(rig.controller.set_pitch(4.0), 4.0);
        assert_eq!(rig.controller.set_pitch(-10.0), -4.0);
        assert_eq!(rig.controller.status().semitones, -4.0);

        rig.controller.reset_pitch();
        assert_eq!(rig.controller.status().semitones, 0.0);
    }

    #[test]
    fn test_seek_fraction_maps_onto_loop_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 10_000);
        let mut rig = Rig::new(PlaybackOptions {
            loop_on_load: true,
            autoplay_on_load: false,
        });
        rig.controller.load(Some(path));
        rig.poll_until(is_loaded);

        rig.controller.set_loop_range(1000, 3000).unwrap();
        rig.tick();
        rig.controller.seek_fraction(0.5).unwrap();
        rig.tick();
        let status = rig.controller.status();
        assert_eq!(status.position, 2000);
        assert!((status.cursor_fraction - 0.5).abs() < 1e-6);

        rig.controller.set_loop_enabled(false).unwrap();
        rig.tick();
        rig.controller.seek_fraction(0.25).unwrap();
        rig.tick();
        assert_eq!(rig.controller.status().position, 2500);

        rig.controller.seek_fraction(f32::NAN).unwrap();
        rig.tick();
        assert_eq!(rig.controller.status().position, 0);
    }

    #[test]
    fn test_cursor_fraction() {
        let range = LoopRange::new(100, 300, 1000);
        assert_eq!(cursor_fraction(100, range), 0.0);
        assert_eq!(cursor_fraction(200, range), 0.5);
        assert_eq!(cursor_fraction(50, range), 0.0);
        assert_eq!(cursor_fraction(900, range), 1.0);
        assert_eq!(cursor_fraction(200, LoopRange::new(5, 5, 1000)), 0.0);
    }

    #[test]
    fn test_device_loss_stops_playback() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 44100);
        let mut rig = Rig::new(PlaybackOptions::default());
        rig.controller.load(Some(path));
        rig.poll_until(is_loaded);
        assert_eq!(rig.controller.status().state, PlayState::Playing);

        rig.controller
            .device_status()
            .record(&DeviceError::DeviceLost);
        let events = rig.poll_until(|e| *e == ControlEvent::DeviceLost);
        assert_eq!(
            events.iter().filter(|e| **e == ControlEvent::DeviceLost).count(),
            1
        );
        assert_eq!(rig.controller.status().state, PlayState::Stopped);
        assert_eq!(rig.controller.status().device_errors, 1);

        // Reported once
        assert!(!rig.controller.poll().contains(&ControlEvent::DeviceLost));
    }

    #[test]
    fn test_unload_clears_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 4410);
        let mut rig = Rig::new(PlaybackOptions::default());
        rig.controller.load(Some(path));
        rig.poll_until(is_loaded);

        rig.controller.unload().unwrap();
        rig.tick();
        assert!(rig.controller.current_file().is_none());
        assert!(!rig.controller.atomics().is_loaded());
        assert_eq!(rig.controller.status().file_length, 0);
    }
}
