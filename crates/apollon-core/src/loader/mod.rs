//! Background file loader
//!
//! Moves expensive work (disk I/O, decoding, resampling and waveform peaks)
//! off the control thread. Results come back as `LoaderEvent`s over a
//! crossbeam channel; the loader never touches transport state itself.
//!
//! Every request gets a `LoadId`. Starting a new load cancels the previous
//! one: the worker checks the request's `CancelToken` between decode,
//! resample and waveform chunks, and reports `Cancelled` instead of a result.
//!
//! Files already at the device rate are summarized while they decode, so
//! `PeaksChunk`s arrive before `Loaded`. Rate-converted files are summarized
//! after conversion.
//!
//! ```text
//! load(path) ──► [apollon-loader] decode + PeaksChunk ... ─► Loaded ─► SummaryComplete
//!                                 decode ─► resample ─► Loaded ─► PeaksChunk ... SummaryComplete
//! ```

use std::io;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use basedrop::Shared;
use crossbeam::channel::{self, Receiver, Sender};

use crate::audio_file::{resample_to, AudioHandle, DecodeError, Decoder};
use crate::waveform::{
    CancelToken, PeakBuilder, PeaksChunk, SummaryOutcome, WaveformPeaks, WaveformSummary,
    CHUNK_FRAMES,
};

/// Identifies one load request
pub type LoadId = u64;

/// Progress and results reported by the loader thread
pub enum LoaderEvent {
    /// Decode progress in [0.0, 1.0]
    Progress { id: LoadId, fraction: f32 },
    /// The file is decoded (and resampled) and ready for the engine
    Loaded {
        id: LoadId,
        handle: Shared<AudioHandle>,
        elapsed: Duration,
    },
    /// Part of the waveform summary
    PeaksChunk { id: LoadId, chunk: PeaksChunk },
    /// The waveform summary is finished
    SummaryComplete { id: LoadId, peaks: WaveformPeaks },
    /// The load failed; nothing was handed to the engine
    Failed {
        id: LoadId,
        path: PathBuf,
        error: DecodeError,
        summary_complete: bool,
    },
    /// The request was superseded or cancelled
    Cancelled { id: LoadId },
}

impl LoaderEvent {
    pub fn id(&self) -> LoadId {
        match self {
            LoaderEvent::Progress { id, .. }
            | LoaderEvent::Loaded { id, .. }
            | LoaderEvent::PeaksChunk { id, .. }
            | LoaderEvent::SummaryComplete { id, .. }
            | LoaderEvent::Failed { id, .. }
            | LoaderEvent::Cancelled { id } => *id,
        }
    }
}

impl std::fmt::Debug for LoaderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderEvent::Progress { id, fraction } => f
                .debug_struct("Progress")
                .field("id", id)
                .field("fraction", fraction)
                .finish(),
            LoaderEvent::Loaded { id, handle, elapsed } => f
                .debug_struct("Loaded")
                .field("id", id)
                .field("path", &handle.path())
                .field("frames", &handle.len())
                .field("elapsed", elapsed)
                .finish(),
            LoaderEvent::PeaksChunk { id, chunk } => f
                .debug_struct("PeaksChunk")
                .field("id", id)
                .field("window_size", &chunk.window_size)
                .field("first_index", &chunk.first_index)
                .field("peaks", &chunk.peaks.len())
                .finish(),
            LoaderEvent::SummaryComplete { id, peaks } => f
                .debug_struct("SummaryComplete")
                .field("id", id)
                .field("levels", &peaks.levels.len())
                .finish(),
            LoaderEvent::Failed {
                id,
                path,
                error,
                summary_complete,
            } => f
                .debug_struct("Failed")
                .field("id", id)
                .field("path", path)
                .field("error", error)
                .field("summary_complete", summary_complete)
                .finish(),
            LoaderEvent::Cancelled { id } => f.debug_struct("Cancelled").field("id", id).finish(),
        }
    }
}

struct LoadRequest {
    id: LoadId,
    path: PathBuf,
    cancel: CancelToken,
}

/// Settings the worker needs for every request
struct WorkerContext {
    sample_rate: u32,
    window_sizes: Vec<usize>,
    gc: basedrop::Handle,
    events: Sender<LoaderEvent>,
}

/// Handle to the background loader thread
///
/// Dropping it cancels any in-flight request and joins the thread.
pub struct FileLoader {
    request_tx: Option<Sender<LoadRequest>>,
    event_rx: Receiver<LoaderEvent>,
    current: Option<(LoadId, CancelToken)>,
    next_id: LoadId,
    thread: Option<JoinHandle<()>>,
}

impl FileLoader {
    /// Spawn the loader thread
    ///
    /// Files are resampled to `sample_rate`; decoded handles are allocated
    /// through `gc` so the audio thread can drop them safely.
    pub fn spawn(
        sample_rate: u32,
        window_sizes: &[usize],
        gc: basedrop::Handle,
    ) -> io::Result<Self> {
        let (request_tx, request_rx) = channel::unbounded::<LoadRequest>();
        let (event_tx, event_rx) = channel::unbounded::<LoaderEvent>();

        let ctx = WorkerContext {
            sample_rate,
            window_sizes: window_sizes.to_vec(),
            gc,
            events: event_tx,
        };

        let thread = thread::Builder::new()
            .name("apollon-loader".to_string())
            .spawn(move || loader_thread(request_rx, ctx))?;

        log::info!("FileLoader spawned with sample rate: {} Hz", sample_rate);

        Ok(Self {
            request_tx: Some(request_tx),
            event_rx,
            current: None,
            next_id: 1,
            thread: Some(thread),
        })
    }

    /// Queue `path` for loading, cancelling the previous request
    pub fn load(&mut self, path: PathBuf) -> LoadId {
        self.cancel();

        let id = self.next_id;
        self.next_id += 1;
        let cancel = CancelToken::new();

        let request = LoadRequest {
            id,
            path,
            cancel: cancel.clone(),
        };
        match &self.request_tx {
            Some(tx) => {
                if let Err(e) = tx.send(request) {
                    log::error!("Failed to queue file load: {}", e);
                }
            }
            None => log::error!("File loader is shut down"),
        }

        self.current = Some((id, cancel));
        id
    }

    /// Cancel the in-flight request, if any
    pub fn cancel(&mut self) {
        if let Some((id, cancel)) = self.current.take() {
            log::debug!("Cancelling load {}", id);
            cancel.cancel();
        }
    }

    /// ID of the most recent request
    pub fn current_id(&self) -> Option<LoadId> {
        self.current.as_ref().map(|(id, _)| *id)
    }

    /// Receive one event without blocking
    pub fn try_recv(&self) -> Option<LoaderEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for an event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<LoaderEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Clonable receiver for select loops
    pub fn events(&self) -> Receiver<LoaderEvent> {
        self.event_rx.clone()
    }
}

impl Drop for FileLoader {
    fn drop(&mut self) {
        self.cancel();
        // Closing the request channel ends the worker loop
        self.request_tx = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("File loader thread panicked");
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Background Thread
// ────────────────────────────────────────────────────────────────────────────────

fn loader_thread(rx: Receiver<LoadRequest>, ctx: WorkerContext) {
    log::info!("File loader thread started");

    while let Ok(request) = rx.recv() {
        handle_load(request, &ctx);
    }

    log::info!("File loader thread exiting");
}

/// Outcome of the decode stage
enum Decoded {
    /// `peaks` is set when the summary was built while decoding
    Ready {
        handle: AudioHandle,
        peaks: Option<WaveformPeaks>,
    },
    Cancelled,
}

fn handle_load(request: LoadRequest, ctx: &WorkerContext) {
    let LoadRequest { id, path, cancel } = request;
    let send = |event: LoaderEvent| {
        // The receiver only disappears during shutdown
        let _ = ctx.events.send(event);
    };

    if cancel.is_cancelled() {
        send(LoaderEvent::Cancelled { id });
        return;
    }

    log::info!("Loading {:?}", path);
    let start = Instant::now();

    let (handle, peaks) = match decode_file(id, &path, &cancel, ctx) {
        Ok(Decoded::Ready { handle, peaks }) => (handle, peaks),
        Ok(Decoded::Cancelled) => {
            log::debug!("Load {} of {:?} cancelled during decode", id, path);
            send(LoaderEvent::Cancelled { id });
            return;
        }
        Err(error) => {
            log::error!("Failed to load {:?}: {}", path, error);
            send(LoaderEvent::Failed {
                id,
                path,
                error,
                summary_complete: false,
            });
            return;
        }
    };

    if cancel.is_cancelled() {
        send(LoaderEvent::Cancelled { id });
        return;
    }

    let elapsed = start.elapsed();
    log::info!(
        "Loaded {:?}: {} frames @ {} Hz (source {} ch, {} Hz) in {:?}",
        path,
        handle.len(),
        handle.sample_rate(),
        handle.source_channels(),
        handle.source_sample_rate(),
        elapsed
    );

    let handle = Shared::new(&ctx.gc, handle);
    send(LoaderEvent::Progress { id, fraction: 1.0 });
    send(LoaderEvent::Loaded {
        id,
        handle: handle.clone(),
        elapsed,
    });

    if let Some(peaks) = peaks {
        log::debug!("Waveform summary of {:?} complete", path);
        send(LoaderEvent::SummaryComplete { id, peaks });
        return;
    }

    // Rate-converted files are summarized from the converted frames
    let mut summary = WaveformSummary::build(&handle, &ctx.window_sizes);
    let outcome = summary.run(&cancel, |step| {
        for chunk in &step.chunks {
            send(LoaderEvent::PeaksChunk {
                id,
                chunk: chunk.clone(),
            });
        }
    });

    match outcome {
        SummaryOutcome::Complete(peaks) => {
            log::debug!("Waveform summary of {:?} complete", path);
            send(LoaderEvent::SummaryComplete { id, peaks });
        }
        SummaryOutcome::Cancelled => send(LoaderEvent::Cancelled { id }),
    }
}

/// Decode `path` chunk by chunk, reporting progress and honouring `cancel`
///
/// When the file is already at the device rate, waveform peaks are built and
/// sent as decoding proceeds.
fn decode_file(
    id: LoadId,
    path: &std::path::Path,
    cancel: &CancelToken,
    ctx: &WorkerContext,
) -> Result<Decoded, DecodeError> {
    let mut decoder = Decoder::open(path)?;
    let mut samples = Vec::with_capacity(decoder.total_frames().unwrap_or(0) as usize);
    let mut last_percent = 0u32;

    let mut peaks = (decoder.sample_rate() == ctx.sample_rate)
        .then(|| PeakBuilder::new(&ctx.window_sizes));
    let mut summarized = 0;
    let send_chunks = |chunks: Vec<PeaksChunk>| {
        for chunk in chunks {
            let _ = ctx.events.send(LoaderEvent::PeaksChunk { id, chunk });
        }
    };

    let _ = ctx.events.send(LoaderEvent::Progress { id, fraction: 0.0 });

    while let Some(chunk) = decoder.next_chunk()? {
        if cancel.is_cancelled() {
            return Ok(Decoded::Cancelled);
        }
        samples.extend_from_slice(&chunk.frames);

        if let Some(builder) = peaks.as_mut() {
            if samples.len() - summarized >= CHUNK_FRAMES {
                send_chunks(builder.push(&samples[summarized..]));
                summarized = samples.len();
            }
        }

        let fraction = decoder.progress();
        let percent = (fraction * 100.0) as u32;
        if percent > last_percent {
            last_percent = percent;
            let _ = ctx.events.send(LoaderEvent::Progress { id, fraction });
        }
    }

    let peaks = peaks.map(|mut builder| {
        send_chunks(builder.push(&samples[summarized..]));
        send_chunks(builder.flush());
        builder.finish()
    });

    let handle = decoder.into_handle(samples);
    if cancel.is_cancelled() {
        return Ok(Decoded::Cancelled);
    }
    match resample_to(handle, ctx.sample_rate, cancel)? {
        Some(handle) => Ok(Decoded::Ready { handle, peaks }),
        None => Ok(Decoded::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file::test_util::write_sine;
    use crate::engine::GcThread;
    use crate::waveform::DEFAULT_WINDOW_SIZES;

    const TIMEOUT: Duration = Duration::from_secs(30);

    /// Collect events for `id` until a terminal one arrives
    fn events_until_done(loader: &FileLoader, id: LoadId) -> Vec<LoaderEvent> {
        let mut events = Vec::new();
        loop {
            let event = loader
                .recv_timeout(TIMEOUT)
                .expect("loader produced no terminal event");
            if event.id() != id {
                continue;
            }
            let terminal = matches!(
                event,
                LoaderEvent::SummaryComplete { .. }
                    | LoaderEvent::Failed { .. }
                    | LoaderEvent::Cancelled { .. }
            );
            events.push(event);
            if terminal {
                return events;
            }
        }
    }

    #[test]
    fn test_load_reports_progress_file_and_peaks() {
        let gc = GcThread::spawn().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 100_000);

        let mut loader = FileLoader::spawn(44100, &DEFAULT_WINDOW_SIZES, gc.handle()).unwrap();
        let id = loader.load(path.clone());
        let events = events_until_done(&loader, id);

        let fractions: Vec<f32> = events
            .iter()
            .filter_map(|e| match e {
                LoaderEvent::Progress { fraction, .. } => Some(*fraction),
                _ => None,
            })
            .collect();
        assert!(!fractions.is_empty());
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
        assert_eq!(fractions.last().copied(), Some(1.0));

        let loaded = events
            .iter()
            .find_map(|e| match e {
                LoaderEvent::Loaded { handle, .. } => Some(handle.clone()),
                _ => None,
            })
            .expect("no Loaded event");
        assert_eq!(loaded.len(), 100_000);
        assert_eq!(loaded.path(), path.as_path());

        let mut assembled = WaveformPeaks::with_window_sizes(&DEFAULT_WINDOW_SIZES);
        for event in &events {
            if let LoaderEvent::PeaksChunk { chunk, .. } = event {
                assert!(assembled.apply(chunk));
            }
        }
        match events.last() {
            Some(LoaderEvent::SummaryComplete { peaks, .. }) => {
                assert_eq!(peaks.total_frames, 100_000);
                for level in &peaks.levels {
                    let assembled_level = assembled.level(level.window_size).unwrap();
                    assert_eq!(assembled_level.peaks, level.peaks);
                }
            }
            other => panic!("expected SummaryComplete, got {:?}", other),
        }

        drop(loaded);
        drop(events);
    }

    #[test]
    fn test_peaks_stream_while_decoding() {
        let gc = GcThread::spawn().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "long.wav", 44100, CHUNK_FRAMES * 3 + 500);

        let mut loader = FileLoader::spawn(44100, &DEFAULT_WINDOW_SIZES, gc.handle()).unwrap();
        let id = loader.load(path);
        let events = events_until_done(&loader, id);

        let loaded_at = events
            .iter()
            .position(|e| matches!(e, LoaderEvent::Loaded { .. }))
            .expect("no Loaded event");
        let first_chunk_at = events
            .iter()
            .position(|e| matches!(e, LoaderEvent::PeaksChunk { .. }))
            .expect("no PeaksChunk event");
        assert!(first_chunk_at < loaded_at);

        // Chunks sent during decoding still add up to the final summary
        let mut assembled = WaveformPeaks::with_window_sizes(&DEFAULT_WINDOW_SIZES);
        for event in &events {
            if let LoaderEvent::PeaksChunk { chunk, .. } = event {
                assembled.apply(chunk);
            }
        }
        match events.last() {
            Some(LoaderEvent::SummaryComplete { peaks, .. }) => {
                assert_eq!(peaks.total_frames, CHUNK_FRAMES * 3 + 500);
                assert_eq!(assembled.levels, peaks.levels);
            }
            other => panic!("expected SummaryComplete, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_fails_without_summary() {
        let gc = GcThread::spawn().unwrap();
        let mut loader = FileLoader::spawn(44100, &DEFAULT_WINDOW_SIZES, gc.handle()).unwrap();

        let id = loader.load(PathBuf::from("/nonexistent/apollon/missing.wav"));
        let events = events_until_done(&loader, id);

        match events.last() {
            Some(LoaderEvent::Failed {
                error,
                summary_complete,
                ..
            }) => {
                assert!(matches!(error, DecodeError::NotFound(_)));
                assert!(!summary_complete);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(!events.iter().any(|e| matches!(e, LoaderEvent::Loaded { .. })));
    }

    #[test]
    fn test_load_resamples_to_device_rate() {
        let gc = GcThread::spawn().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 44100);

        let mut loader = FileLoader::spawn(48000, &DEFAULT_WINDOW_SIZES, gc.handle()).unwrap();
        let id = loader.load(path);
        let events = events_until_done(&loader, id);

        let handle = events
            .iter()
            .find_map(|e| match e {
                LoaderEvent::Loaded { handle, .. } => Some(handle.clone()),
                _ => None,
            })
            .expect("no Loaded event");
        assert_eq!(handle.sample_rate(), 48000);
        assert_eq!(handle.source_sample_rate(), 44100);
        assert_eq!(handle.len(), 48000);

        // Peaks describe the converted frames
        match events.last() {
            Some(LoaderEvent::SummaryComplete { peaks, .. }) => {
                assert_eq!(peaks.total_frames, 48000);
            }
            other => panic!("expected SummaryComplete, got {:?}", other),
        }

        drop(handle);
        drop(events);
    }

    #[test]
    fn test_new_load_supersedes_previous() {
        let gc = GcThread::spawn().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let first = write_sine(dir.path(), "first.wav", 44100, 441_000);
        let second = write_sine(dir.path(), "second.wav", 44100, 4410);

        let mut loader = FileLoader::spawn(44100, &DEFAULT_WINDOW_SIZES, gc.handle()).unwrap();
        let first_id = loader.load(first);
        let second_id = loader.load(second);
        assert_ne!(first_id, second_id);
        assert_eq!(loader.current_id(), Some(second_id));

        // Requests run in order, so every event of the first load arrives
        // before the second load finishes
        let mut events = Vec::new();
        loop {
            let event = loader.recv_timeout(TIMEOUT).expect("loader stalled");
            let done = event.id() == second_id
                && matches!(
                    event,
                    LoaderEvent::SummaryComplete { .. }
                        | LoaderEvent::Failed { .. }
                        | LoaderEvent::Cancelled { .. }
                );
            events.push(event);
            if done {
                break;
            }
        }

        assert!(matches!(
            events.last(),
            Some(LoaderEvent::SummaryComplete { .. })
        ));
        assert!(events.iter().any(|e| e.id() == first_id
            && matches!(e, LoaderEvent::Cancelled { .. })));
        assert!(!events.iter().any(|e| e.id() == first_id
            && matches!(e, LoaderEvent::SummaryComplete { .. })));
        drop(events);
    }
}
