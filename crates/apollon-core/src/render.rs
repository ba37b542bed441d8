//! Offline proxy render
//!
//! Renders a range of a decoded file through a fresh `PitchShiftProcessor`
//! into a 32-bit float stereo WAV. The shifter's latency is compensated, so
//! the proxy lines up sample-for-sample with the source range.

use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;

use crate::audio_file::AudioHandle;
use crate::engine::{LoopRange, MAX_BUFFER_SIZE};
use crate::pitch::{clamp_semitones, PitchShiftProcessor, LATENCY};
use crate::types::StereoSample;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No file loaded")]
    NoFile,

    #[error("Failed to write WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A finished proxy file
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedProxy {
    pub path: PathBuf,
    pub frames: usize,
    pub sample_rate: u32,
    /// Effective (clamped) shift
    pub semitones: f32,
}

/// Render `range` of `file` shifted by `semitones` into `path`
pub fn render_range(
    file: &AudioHandle,
    range: LoopRange,
    semitones: f32,
    path: &Path,
) -> Result<RenderedProxy, RenderError> {
    let range = LoopRange::new(range.start(), range.end(), file.len());
    let semitones = clamp_semitones(semitones);
    let latency = if semitones == 0.0 { 0 } else { LATENCY };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = WavSpec {
        channels: 2,
        sample_rate: file.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;

    let source = &file.frames()[range.start()..range.end()];
    let total = source.len() + latency;
    let mut processor = PitchShiftProcessor::new();
    let mut block = vec![StereoSample::silence(); MAX_BUFFER_SIZE];
    let mut rendered = 0;

    while rendered < total {
        let n = (total - rendered).min(MAX_BUFFER_SIZE);
        let block = &mut block[..n];

        // Past the range end the shifter is flushed with silence
        let available = source.len().saturating_sub(rendered).min(n);
        block[..available].copy_from_slice(&source[rendered..rendered + available]);
        block[available..].fill(StereoSample::silence());

        processor.process_in_place(block, semitones);

        let skip = latency.saturating_sub(rendered).min(n);
        for frame in &block[skip..] {
            writer.write_sample(frame.left)?;
            writer.write_sample(frame.right)?;
        }
        rendered += n;
    }
    writer.finalize()?;

    log::info!(
        "Rendered proxy {:?}: {} frames at {:+.2} st",
        path,
        range.len(),
        semitones
    );

    Ok(RenderedProxy {
        path: path.to_path_buf(),
        frames: range.len(),
        sample_rate: file.sample_rate(),
        semitones,
    })
}
