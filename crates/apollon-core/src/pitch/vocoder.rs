//! Streaming phase vocoder for one channel
//!
//! Classic analysis / bin-shift / resynthesis design: samples are queued into
//! an input FIFO, and every `HOP_SIZE` samples a Hann-windowed frame of
//! `FRAME_SIZE` samples is analyzed. Each bin's true frequency is estimated
//! from its phase advance, the spectrum is moved to `bin * ratio`, and the
//! frame is resynthesized with accumulated phases and overlap-added.
//!
//! All buffers are allocated up front; `process_sample` never allocates.

use std::f32::consts::PI;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

/// Analysis frame length in samples
pub const FRAME_SIZE: usize = 2048;

/// Overlap factor (frames per `FRAME_SIZE`)
pub const OVERSAMPLING: usize = 4;

/// Samples between successive frames
pub const HOP_SIZE: usize = FRAME_SIZE / OVERSAMPLING;

/// Delay between a sample entering and its processed counterpart leaving
pub const LATENCY: usize = FRAME_SIZE - HOP_SIZE;

const NUM_BINS: usize = FRAME_SIZE / 2 + 1;

pub struct ChannelShifter {
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    window: Vec<f32>,
    /// Overlap-add normalisation for window², hop and the unscaled inverse FFT
    output_gain: f32,

    in_fifo: Vec<f32>,
    out_fifo: Vec<f32>,
    output_accum: Vec<f32>,
    rover: usize,

    fft_input: Vec<f32>,
    fft_output: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch_forward: Vec<Complex<f32>>,
    scratch_inverse: Vec<Complex<f32>>,

    last_phase: Vec<f32>,
    sum_phase: Vec<f32>,
    ana_magn: Vec<f32>,
    ana_freq: Vec<f32>,
    syn_magn: Vec<f32>,
    syn_freq: Vec<f32>,
}

impl ChannelShifter {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(FRAME_SIZE);
        let fft_inverse = planner.plan_fft_inverse(FRAME_SIZE);

        // Periodic Hann, so the overlapped squares sum to a constant
        let window: Vec<f32> = (0..FRAME_SIZE)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / FRAME_SIZE as f32).cos()))
            .collect();
        let window_sq_sum: f32 = (0..OVERSAMPLING)
            .map(|j| window[j * HOP_SIZE].powi(2))
            .sum();
        let output_gain = 1.0 / (window_sq_sum * FRAME_SIZE as f32);

        let scratch_forward = fft_forward.make_scratch_vec();
        let scratch_inverse = fft_inverse.make_scratch_vec();

        Self {
            fft_forward,
            fft_inverse,
            window,
            output_gain,
            in_fifo: vec![0.0; FRAME_SIZE],
            out_fifo: vec![0.0; FRAME_SIZE],
            output_accum: vec![0.0; FRAME_SIZE],
            rover: LATENCY,
            fft_input: vec![0.0; FRAME_SIZE],
            fft_output: vec![0.0; FRAME_SIZE],
            spectrum: vec![Complex::new(0.0, 0.0); NUM_BINS],
            scratch_forward,
            scratch_inverse,
            last_phase: vec![0.0; NUM_BINS],
            sum_phase: vec![0.0; NUM_BINS],
            ana_magn: vec![0.0; NUM_BINS],
            ana_freq: vec![0.0; NUM_BINS],
            syn_magn: vec![0.0; NUM_BINS],
            syn_freq: vec![0.0; NUM_BINS],
        }
    }

    /// Clear all history (FIFOs, overlap-add tail and phase accumulators)
    pub fn reset(&mut self) {
        self.in_fifo.fill(0.0);
        self.out_fifo.fill(0.0);
        self.output_accum.fill(0.0);
        self.last_phase.fill(0.0);
        self.sum_phase.fill(0.0);
        self.rover = LATENCY;
    }

    /// Push one input sample and pop one output sample
    #[inline]
    pub fn process_sample(&mut self, input: f32, ratio: f32) -> f32 {
        self.in_fifo[self.rover] = input;
        let output = self.out_fifo[self.rover - LATENCY];
        self.rover += 1;

        if self.rover >= FRAME_SIZE {
            self.rover = LATENCY;
            self.process_frame(ratio);
        }
        output
    }

    fn process_frame(&mut self, ratio: f32) {
        let expected = 2.0 * PI * HOP_SIZE as f32 / FRAME_SIZE as f32;

        for ((dst, &x), &w) in self.fft_input.iter_mut().zip(&self.in_fifo).zip(&self.window) {
            *dst = x * w;
        }
        // Lengths are fixed at construction
        let forward = self.fft_forward.process_with_scratch(
            &mut self.fft_input,
            &mut self.spectrum,
            &mut self.scratch_forward,
        );
        debug_assert!(forward.is_ok(), "forward FFT length mismatch");

        // Analysis: magnitude and true frequency (in bins) per bin
        for k in 0..NUM_BINS {
            let bin = self.spectrum[k];
            let phase = bin.im.atan2(bin.re);

            let mut delta = phase - self.last_phase[k];
            self.last_phase[k] = phase;
            delta -= k as f32 * expected;
            delta = wrap_phase(delta);

            self.ana_magn[k] = bin.norm();
            self.ana_freq[k] = k as f32 + OVERSAMPLING as f32 * delta / (2.0 * PI);
        }

        // Move each bin to bin * ratio
        self.syn_magn.fill(0.0);
        self.syn_freq.fill(0.0);
        for k in 0..NUM_BINS {
            let index = (k as f32 * ratio).round() as usize;
            if index < NUM_BINS {
                self.syn_magn[index] += self.ana_magn[k];
                self.syn_freq[index] = self.ana_freq[k] * ratio;
            }
        }

        // Synthesis: accumulate phase at each bin's shifted frequency
        for k in 0..NUM_BINS {
            let deviation = self.syn_freq[k] - k as f32;
            self.sum_phase[k] += 2.0 * PI * deviation / OVERSAMPLING as f32 + k as f32 * expected;
            self.sum_phase[k] = wrap_phase(self.sum_phase[k]);
            self.spectrum[k] = Complex::from_polar(self.syn_magn[k], self.sum_phase[k]);
        }
        self.spectrum[0].im = 0.0;
        self.spectrum[NUM_BINS - 1].im = 0.0;

        let inverse = self.fft_inverse.process_with_scratch(
            &mut self.spectrum,
            &mut self.fft_output,
            &mut self.scratch_inverse,
        );
        debug_assert!(inverse.is_ok(), "inverse FFT length mismatch");

        for ((acc, &y), &w) in self.output_accum.iter_mut().zip(&self.fft_output).zip(&self.window) {
            *acc += y * w * self.output_gain;
        }

        self.out_fifo[..HOP_SIZE].copy_from_slice(&self.output_accum[..HOP_SIZE]);
        self.output_accum.copy_within(HOP_SIZE.., 0);
        self.output_accum[FRAME_SIZE - HOP_SIZE..].fill(0.0);
        self.in_fifo.copy_within(HOP_SIZE.., 0);
    }
}

impl Default for ChannelShifter {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a phase into [-PI, PI]
#[inline]
fn wrap_phase(phase: f32) -> f32 {
    phase - (phase / (2.0 * PI)).round() * 2.0 * PI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_phase_range() {
        for &p in &[0.0f32, 3.0, -3.0, 7.0, -7.0, 100.0, -100.0] {
            let w = wrap_phase(p);
            assert!(w >= -PI - 1e-4 && w <= PI + 1e-4, "{} wrapped to {}", p, w);
            let turns = (p - w) / (2.0 * PI);
            assert!((turns - turns.round()).abs() < 1e-3);
        }
    }

    #[test]
    fn test_unity_ratio_reproduces_delayed_input() {
        let mut shifter = ChannelShifter::new();
        let input: Vec<f32> = (0..FRAME_SIZE * 8)
            .map(|i| 0.5 * (2.0 * PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let output: Vec<f32> = input.iter().map(|&x| shifter.process_sample(x, 1.0)).collect();

        // Once the overlap-add has filled up, output is input delayed by LATENCY
        for i in FRAME_SIZE * 2..input.len() {
            assert!(
                (output[i] - input[i - LATENCY]).abs() < 1e-2,
                "sample {}: {} vs {}",
                i,
                output[i],
                input[i - LATENCY]
            );
        }
    }
}
