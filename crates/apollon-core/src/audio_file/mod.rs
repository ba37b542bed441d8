//! Audio file decoding
//!
//! Decodes any format symphonia can probe (WAV, FLAC, MP3, AAC/M4A, OGG)
//! into a stereo f32 `AudioHandle`. Mono sources are duplicated into both
//! channels; sources with more than two channels keep the first pair.
//!
//! The handle owns the decoded PCM and is immutable once built. Block reads
//! past the end of the file are zero-padded so loop-boundary reads need no
//! special-casing by the caller.

mod decode;
mod resample;

pub use decode::{Decoder, DecodedChunk};
pub use resample::resample_to;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{AudioBuffer, StereoBuffer, StereoSample};

/// Errors that can occur while opening or decoding an audio file
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The path does not exist
    #[error("Audio file not found: {0}")]
    NotFound(PathBuf),

    /// No format reader or codec understands the file
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The container or stream could not be parsed
    #[error("Corrupt audio file: {0}")]
    Corrupt(String),

    /// The file exists but could not be read (permissions etc.)
    #[error("IO error: {0}")]
    Io(String),
}

/// A fully decoded audio file
///
/// Holds interleaved-as-stereo PCM at `sample_rate`. `source_channels` and
/// `source_sample_rate` describe the file as it was on disk (before any
/// channel mapping or resampling).
#[derive(Debug, Clone)]
pub struct AudioHandle {
    path: PathBuf,
    samples: StereoBuffer,
    sample_rate: u32,
    source_channels: u16,
    source_sample_rate: u32,
}

impl AudioHandle {
    /// Build a handle from already decoded stereo PCM
    pub fn new(path: impl Into<PathBuf>, samples: StereoBuffer, sample_rate: u32) -> Self {
        Self {
            path: path.into(),
            samples,
            sample_rate,
            source_channels: 2,
            source_sample_rate: sample_rate,
        }
    }

    pub(crate) fn with_source(mut self, channels: u16, sample_rate: u32) -> Self {
        self.source_channels = channels;
        self.source_sample_rate = sample_rate;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name (file name without directories)
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Length of the file in frames
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

    pub fn source_channels(&self) -> u16 {
        self.source_channels
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// All decoded frames
    #[inline]
    pub fn frames(&self) -> &[StereoSample] {
        self.samples.as_slice()
    }

    /// Read `block_size` frames starting at `start`, zero-padded past the end
    pub fn read_block(&self, start: usize, block_size: usize) -> AudioBuffer {
        let mut block = StereoBuffer::silence(block_size);
        self.read_into(start, block.as_mut_slice());
        AudioBuffer::new(block, self.sample_rate)
    }

    /// Fill `out` with frames starting at `start` (real-time safe)
    ///
    /// Frames past the end of the file are written as silence. Returns the
    /// number of frames that came from the file.
    #[inline]
    pub fn read_into(&self, start: usize, out: &mut [StereoSample]) -> usize {
        let frames = self.samples.as_slice();
        let available = frames.len().saturating_sub(start).min(out.len());
        if available > 0 {
            out[..available].copy_from_slice(&frames[start..start + available]);
        }
        out[available..].fill(StereoSample::silence());
        available
    }
}

/// Opens audio files and reads blocks from decoded handles
///
/// Stateless: the reader only exists so that the open/read contract has a
/// single home. The open file is released as soon as decoding finishes, on
/// every exit path including decode failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioFileReader;

impl AudioFileReader {
    /// Decode the whole file at `path`
    pub fn open(path: &Path) -> Result<AudioHandle, DecodeError> {
        let start = std::time::Instant::now();
        let handle = Decoder::open(path)?.decode_all()?;
        log::info!(
            "Decoded {:?}: {} frames @ {} Hz, {} channel(s) in {:?}",
            path,
            handle.len(),
            handle.sample_rate(),
            handle.source_channels(),
            start.elapsed()
        );
        Ok(handle)
    }

    /// Read a zero-padded block from an open handle
    pub fn read_block(handle: &AudioHandle, start: usize, block_size: usize) -> AudioBuffer {
        handle.read_block(start, block_size)
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[test]
    fn test_open_missing_file_is_not_found() {
        let err = AudioFileReader::open(Path::new("/nonexistent/apollon/track.wav")).unwrap_err();
        assert!(matches!(err, DecodeError::NotFound(_)));
    }

    #[test]
    fn test_open_garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not a riff header, just text").unwrap();

        let err = AudioFileReader::open(&path).unwrap_err();
        assert!(
            matches!(err, DecodeError::UnsupportedFormat(_) | DecodeError::Corrupt(_)),
            "unexpected error: {:?}",
            err
        );
    }

    #[test]
    fn test_mono_is_duplicated_to_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "mono.wav", 1, 44100, 1000, |i, _| i as f32 / 1000.0);

        let handle = AudioFileReader::open(&path).unwrap();
        assert_eq!(handle.len(), 1000);
        assert_eq!(handle.sample_rate(), 44100);
        assert_eq!(handle.source_channels(), 1);
        for (i, frame) in handle.frames().iter().enumerate() {
            assert_eq!(frame.left, i as f32 / 1000.0);
            assert_eq!(frame.left, frame.right);
        }
    }

    #[test]
    fn test_multichannel_keeps_first_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "quad.wav", 4, 48000, 64, |_, ch| ch as f32 * 0.25);

        let handle = AudioFileReader::open(&path).unwrap();
        assert_eq!(handle.source_channels(), 4);
        assert!(handle.frames().iter().all(|f| f.left == 0.0 && f.right == 0.25));
    }

    #[test]
    fn test_read_block_past_end_is_zero_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "short.wav", 2, 44100, 100, |_, _| 0.5);
        let handle = AudioFileReader::open(&path).unwrap();

        let block = AudioFileReader::read_block(&handle, 90, 32);
        assert_eq!(block.len(), 32);
        assert_eq!(block.sample_rate(), 44100);
        assert!(block.as_slice()[..10].iter().all(|s| s.left == 0.5));
        assert!(block.as_slice()[10..].iter().all(|s| *s == StereoSample::silence()));

        let beyond = handle.read_block(10_000, 16);
        assert!(beyond.as_slice().iter().all(|s| *s == StereoSample::silence()));
    }

    #[test]
    fn test_blocks_concatenate_to_full_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine(dir.path(), "sine.wav", 44100, 5000);
        let handle = AudioFileReader::open(&path).unwrap();

        let mut joined = Vec::new();
        let mut start = 0;
        while start < handle.len() {
            let block = handle.read_block(start, 512);
            let take = (handle.len() - start).min(512);
            joined.extend_from_slice(&block.as_slice()[..take]);
            start += 512;
        }
        assert_eq!(joined.as_slice(), handle.frames());
    }
}
