//! Owned engine context
//!
//! Everything the player needs at runtime, constructed explicitly and torn
//! down in a fixed order when dropped:
//!
//! 1. the controller (loader thread joined, its file reference released)
//! 2. the output stream (engine dropped with the audio thread)
//! 3. the GC thread (final collection of every shared buffer)
//! 4. the work directory holding rendered proxies (deleted)
//!
//! There is no process-wide engine; two contexts are independent.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;

use crate::audio::{AudioConfig, AudioError, AudioOutput, StreamHandle};
use crate::control::{Controller, PlaybackOptions};
use crate::engine::{AudioEngine, GcThread, LoopRange};
use crate::render::{render_range, RenderError, RenderedProxy};

#[derive(Error, Debug)]
pub enum ContextError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("Failed to start engine context: {0}")]
    Io(#[from] std::io::Error),
}

pub struct EngineContext {
    // Field order is drop order
    controller: Controller,
    stream: Option<StreamHandle>,
    gc: GcThread,
    work_dir: TempDir,
    renders: usize,
}

impl EngineContext {
    /// Open the output device and start the engine on it
    pub fn start(
        config: &AudioConfig,
        window_sizes: &[usize],
        options: PlaybackOptions,
    ) -> Result<Self, ContextError> {
        let output = AudioOutput::open(config)?;
        let (mut context, engine) = Self::build(output.sample_rate(), window_sizes, options)?;
        let stream = output.start(engine, context.controller.device_status())?;
        context.stream = Some(stream);
        Ok(context)
    }

    /// A context without an output device
    ///
    /// The caller drives the returned engine (tests, offline rendering).
    pub fn offline(
        sample_rate: u32,
        window_sizes: &[usize],
        options: PlaybackOptions,
    ) -> Result<(Self, AudioEngine), ContextError> {
        Self::build(sample_rate, window_sizes, options)
    }

    fn build(
        sample_rate: u32,
        window_sizes: &[usize],
        options: PlaybackOptions,
    ) -> Result<(Self, AudioEngine), ContextError> {
        let work_dir = tempfile::Builder::new().prefix("apollon-").tempdir()?;
        let gc = GcThread::spawn()?;
        let (controller, engine) =
            Controller::with_engine(sample_rate, gc.handle(), window_sizes, options)?;

        log::info!(
            "Engine context ready at {} Hz, work dir {:?}",
            sample_rate,
            work_dir.path()
        );

        Ok((
            Self {
                controller,
                stream: None,
                gc,
                work_dir,
                renders: 0,
            },
            engine,
        ))
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    /// The running output stream, if started on a device
    pub fn stream(&self) -> Option<&StreamHandle> {
        self.stream.as_ref()
    }

    /// Handle for allocating buffers shared with the audio thread
    pub fn gc_handle(&self) -> basedrop::Handle {
        self.gc.handle()
    }

    /// Temporary directory owned by this context
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Render the loop range (or the whole file) at the current pitch
    ///
    /// The proxy lives in the work directory and is deleted with the context.
    pub fn render_proxy(&mut self) -> Result<RenderedProxy, RenderError> {
        let file = self.controller.current_file().ok_or(RenderError::NoFile)?;
        let status = self.controller.status();

        let range = if status.loop_enabled && !status.loop_range.is_empty() {
            status.loop_range
        } else {
            LoopRange::whole(file.len())
        };

        self.renders += 1;
        let path: PathBuf = self
            .work_dir
            .path()
            .join(format!("proxy-{:03}.wav", self.renders));
        render_range(file, range, status.semitones, &path)
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        log::info!(
            "Shutting down engine context, removing work dir {:?}",
            self.work_dir.path()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file::test_util::write_sine;
    use crate::control::ControlEvent;
    use crate::types::StereoBuffer;
    use crate::waveform::DEFAULT_WINDOW_SIZES;
    use std::time::{Duration, Instant};

    fn load(context: &mut EngineContext, engine: &mut AudioEngine, path: PathBuf) {
        let mut out = StereoBuffer::silence(256);
        context.controller_mut().load(Some(path));
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            let events = context.controller_mut().poll();
            engine.process(&mut out);
            if events
                .iter()
                .any(|e| matches!(e, ControlEvent::FileLoaded { .. }))
            {
                return;
            }
            assert!(Instant::now() < deadline, "file never loaded");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_render_without_file_fails() {
        let (mut context, _engine) =
            EngineContext::offline(44100, &DEFAULT_WINDOW_SIZES, PlaybackOptions::default())
                .unwrap();
        assert!(matches!(context.render_proxy(), Err(RenderError::NoFile)));
    }

    #[test]
    fn test_render_proxy_uses_loop_range_and_pitch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 44100);
        let (mut context, mut engine) = EngineContext::offline(
            44100,
            &DEFAULT_WINDOW_SIZES,
            PlaybackOptions {
                loop_on_load: true,
                autoplay_on_load: false,
            },
        )
        .unwrap();
        load(&mut context, &mut engine, path);

        context.controller_mut().set_loop_range(0, 22050).unwrap();
        context.controller_mut().set_pitch(2.0);
        engine.process(&mut StereoBuffer::silence(256));

        let proxy = context.render_proxy().unwrap();
        assert_eq!(proxy.frames, 22050);
        assert_eq!(proxy.semitones, 2.0);
        assert!(proxy.path.starts_with(context.work_dir()));
        assert!(proxy.path.exists());

        let second = context.render_proxy().unwrap();
        assert_ne!(proxy.path, second.path);
    }

    #[test]
    fn test_drop_removes_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 4410);
        let (mut context, mut engine) =
            EngineContext::offline(44100, &DEFAULT_WINDOW_SIZES, PlaybackOptions::default())
                .unwrap();
        load(&mut context, &mut engine, path);

        let proxy = context.render_proxy().unwrap();
        let work_dir = context.work_dir().to_path_buf();
        assert!(work_dir.exists());

        drop(engine);
        drop(context);
        assert!(!work_dir.exists());
        assert!(!proxy.path.exists());
    }
}
