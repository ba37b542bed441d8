//! Streaming symphonia decoder
//!
//! Decodes one packet at a time so callers (the background loader) can report
//! progress and check for cancellation between chunks.

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioHandle, DecodeError};
use crate::types::{StereoBuffer, StereoSample};

/// A run of decoded stereo frames
#[derive(Debug, Clone)]
pub struct DecodedChunk {
    /// Frame index of the first frame in the chunk
    pub first_frame: usize,
    pub frames: Vec<StereoSample>,
}

/// Packet-by-packet decoder over an open file
///
/// The file stays open for the lifetime of the decoder and is closed when it
/// is dropped.
pub struct Decoder {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    codec: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    total_frames: Option<u64>,
    decoded_frames: usize,
    skipped_packets: usize,
    sample_buf: Option<(SampleBuffer<f32>, SignalSpec, u64)>,
    finished: bool,
}

impl Decoder {
    /// Open and probe `path`
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DecodeError::NotFound(path.to_path_buf()),
            _ => DecodeError::Io(format!("{}: {}", path.display(), e)),
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(map_probe_error)?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::UnsupportedFormat("No audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::Corrupt("Unknown sample rate".to_string()))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);
        let total_frames = track.codec_params.n_frames;

        let codec = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(map_probe_error)?;

        log::debug!(
            "Opened {:?}: {} Hz, {} channel(s), {:?} frames",
            path,
            sample_rate,
            channels,
            total_frames
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            codec,
            track_id,
            sample_rate,
            channels,
            total_frames,
            decoded_frames: 0,
            skipped_packets: 0,
            sample_buf: None,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total frames announced by the container, if any
    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    pub fn decoded_frames(&self) -> usize {
        self.decoded_frames
    }

    /// Decode progress in [0.0, 1.0]
    ///
    /// Stays below 1.0 until the stream is exhausted. Streams without a
    /// frame count report 0.0 until they finish.
    pub fn progress(&self) -> f32 {
        if self.finished {
            return 1.0;
        }
        match self.total_frames {
            Some(total) if total > 0 => {
                (self.decoded_frames as f64 / total as f64).min(0.99) as f32
            }
            _ => 0.0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode the next packet
    ///
    /// Returns `Ok(None)` once the stream is exhausted. Packets that fail to
    /// decode are skipped; a stream where nothing decodes is `Corrupt`.
    pub fn next_chunk(&mut self) -> Result<Option<DecodedChunk>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return self.finish();
                }
                Err(SymphoniaError::ResetRequired) => {
                    return self.finish();
                }
                Err(e) => {
                    self.finished = true;
                    return Err(DecodeError::Corrupt(e.to_string()));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.codec.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping undecodable packet in {:?}: {}", self.path, e);
                    self.skipped_packets += 1;
                    continue;
                }
                Err(e) => {
                    self.finished = true;
                    return Err(DecodeError::Corrupt(e.to_string()));
                }
            };

            let spec = *decoded.spec();
            let capacity = decoded.capacity() as u64;
            let needs_new = match &self.sample_buf {
                Some((_, buf_spec, buf_capacity)) => *buf_spec != spec || *buf_capacity < capacity,
                None => true,
            };
            if needs_new {
                self.sample_buf = Some((SampleBuffer::new(capacity, spec), spec, capacity));
            }

            let Some((buf, _, _)) = self.sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            let frames = to_stereo(buf.samples(), spec.channels.count());
            if frames.is_empty() {
                continue;
            }

            let first_frame = self.decoded_frames;
            self.decoded_frames += frames.len();
            return Ok(Some(DecodedChunk { first_frame, frames }));
        }
    }

    fn finish(&mut self) -> Result<Option<DecodedChunk>, DecodeError> {
        self.finished = true;
        if self.decoded_frames == 0 && self.skipped_packets > 0 {
            return Err(DecodeError::Corrupt(format!(
                "No decodable audio ({} packets failed)",
                self.skipped_packets
            )));
        }
        Ok(None)
    }

    /// Decode the remainder of the stream into a handle
    pub fn decode_all(mut self) -> Result<AudioHandle, DecodeError> {
        let capacity = self.total_frames.unwrap_or(0) as usize;
        let mut samples = Vec::with_capacity(capacity);
        while let Some(chunk) = self.next_chunk()? {
            samples.extend_from_slice(&chunk.frames);
        }
        Ok(self.into_handle(samples))
    }

    /// Wrap frames decoded by this decoder into a handle
    pub fn into_handle(self, samples: Vec<StereoSample>) -> AudioHandle {
        AudioHandle::new(self.path, StereoBuffer::from_vec(samples), self.sample_rate)
            .with_source(self.channels, self.sample_rate)
    }
}

fn map_probe_error(e: SymphoniaError) -> DecodeError {
    match e {
        SymphoniaError::Unsupported(msg) => DecodeError::UnsupportedFormat(msg.to_string()),
        other => DecodeError::Corrupt(other.to_string()),
    }
}

/// Map interleaved samples with `channels` channels onto stereo frames
fn to_stereo(interleaved: &[f32], channels: usize) -> Vec<StereoSample> {
    match channels {
        0 => Vec::new(),
        1 => interleaved.iter().map(|&s| StereoSample::mono(s)).collect(),
        n => interleaved
            .chunks_exact(n)
            .map(|frame| StereoSample::new(frame[0], frame[1]))
            .collect(),
    }
}
