//! Sample rate conversion using rubato
//!
//! Files whose rate differs from the output device are converted once, on
//! the loader thread, so the real-time path only ever plays at device rate.

use rubato::{FftFixedIn, Resampler};

use super::{AudioHandle, DecodeError};
use crate::types::{StereoBuffer, StereoSample};
use crate::waveform::CancelToken;

/// Input frames per resampler call
const CHUNK_SIZE: usize = 1024;

/// FFT sub-chunks (quality/latency trade-off, see rubato docs)
const SUB_CHUNKS: usize = 2;

/// Convert `handle` to `target_rate`
///
/// Returns the handle unchanged when the rates already match. The result is
/// delay-compensated and has exactly `ceil(len * target / source)` frames.
/// `cancel` is checked between chunks; `Ok(None)` means the work was dropped.
pub fn resample_to(
    handle: AudioHandle,
    target_rate: u32,
    cancel: &CancelToken,
) -> Result<Option<AudioHandle>, DecodeError> {
    let source_rate = handle.sample_rate();
    if source_rate == target_rate || target_rate == 0 || handle.is_empty() {
        return Ok(Some(handle));
    }

    let start = std::time::Instant::now();
    let input_frames = handle.len();
    let expected_output_frames =
        (input_frames as f64 * target_rate as f64 / source_rate as f64).ceil() as usize;

    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        2,
    )
    .map_err(|e| DecodeError::UnsupportedFormat(format!("Cannot resample: {}", e)))?;

    let delay = resampler.output_delay();
    let wanted = expected_output_frames + delay;

    let mut left = Vec::with_capacity(wanted + CHUNK_SIZE);
    let mut right = Vec::with_capacity(wanted + CHUNK_SIZE);
    let mut input = vec![vec![0.0f32; CHUNK_SIZE]; 2];

    let frames = handle.frames();
    let mut pos = 0;
    // Past the end of the input the chunks are zero-filled to flush the delay line
    while left.len() < wanted {
        if cancel.is_cancelled() {
            log::debug!("Resampling {:?} cancelled", handle.path());
            return Ok(None);
        }
        let needed = resampler.input_frames_next();
        for ch in input.iter_mut() {
            ch.resize(needed, 0.0);
        }
        for i in 0..needed {
            let frame = frames.get(pos + i).copied().unwrap_or_default();
            input[0][i] = frame.left;
            input[1][i] = frame.right;
        }

        let output = resampler
            .process(&input, None)
            .map_err(|e| DecodeError::Corrupt(format!("Resampling failed: {}", e)))?;
        left.extend_from_slice(&output[0]);
        right.extend_from_slice(&output[1]);
        pos += needed;
    }

    let samples: Vec<StereoSample> = left
        .iter()
        .zip(right.iter())
        .skip(delay)
        .take(expected_output_frames)
        .map(|(&l, &r)| StereoSample::new(l, r))
        .collect();

    log::info!(
        "Resampled {:?} from {} Hz to {} Hz ({} -> {} frames) in {:?}",
        handle.path(),
        source_rate,
        target_rate,
        input_frames,
        samples.len(),
        start.elapsed()
    );

    let channels = handle.source_channels();
    Ok(Some(
        AudioHandle::new(handle.path(), StereoBuffer::from_vec(samples), target_rate)
            .with_source(channels, source_rate),
    ))
}
