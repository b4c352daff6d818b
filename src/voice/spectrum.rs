//! Byte frequency spectrum
//!
//! Computes the 0–255 energy snapshot used by the voice-activity gate.
//! Blackman window over the most recent `fft_size` samples, magnitude scaled
//! by `1/fft_size`, exponential smoothing across snapshots, then decibels
//! mapped linearly from `[MIN_DECIBELS, MAX_DECIBELS]` onto `[0, 255]`.
//! Only the lowest `buckets` bins are reported, so a 2048-point transform
//! yields a 256-bucket snapshot covering the speech band.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Default transform size
pub const DEFAULT_FFT_SIZE: usize = 2048;

/// Default number of reported buckets
pub const DEFAULT_BUCKETS: usize = 256;

/// Default smoothing constant (80% previous, 20% new)
pub const DEFAULT_SMOOTHING: f32 = 0.8;

/// Level mapped to byte 0
pub const MIN_DECIBELS: f32 = -100.0;

/// Level mapped to byte 255
pub const MAX_DECIBELS: f32 = -30.0;

/// Running frequency analyser over a mono sample stream
pub struct SpectrumAnalyser {
    fft_size: usize,
    buckets: usize,
    smoothing: f32,
    /// Ring of the last `fft_size` samples
    history: Vec<f32>,
    write_pos: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    fft_buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyser {
    /// Create an analyser with the given transform size and smoothing constant
    ///
    /// Reports `DEFAULT_BUCKETS` bins, or `fft_size / 2` if that is fewer.
    #[must_use]
    pub fn new(fft_size: usize, smoothing: f32) -> Self {
        Self::with_buckets(fft_size, DEFAULT_BUCKETS, smoothing)
    }

    /// Create an analyser reporting the lowest `buckets` bins
    ///
    /// `buckets` is clamped to `1..=fft_size / 2`.
    #[must_use]
    pub fn with_buckets(fft_size: usize, buckets: usize, smoothing: f32) -> Self {
        let fft_size = fft_size.max(2);
        let buckets = buckets.clamp(1, fft_size / 2);
        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        Self {
            fft_size,
            buckets,
            smoothing: smoothing.clamp(0.0, 1.0),
            history: vec![0.0; fft_size],
            write_pos: 0,
            window: blackman_window(fft_size),
            fft,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; buckets],
        }
    }

    /// Number of frequency buckets per snapshot
    #[must_use]
    pub const fn bucket_count(&self) -> usize {
        self.buckets
    }

    /// Feed samples into the analysis window
    pub fn push(&mut self, samples: &[f32]) {
        // Only the tail can survive in the ring
        let start = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[start..] {
            self.history[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Take a smoothed byte spectrum snapshot
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let n = self.fft_size;

        // Oldest sample first
        for i in 0..n {
            let sample = self.history[(self.write_pos + i) % n];
            self.fft_buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        let scale = 1.0 / n as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        let tau = self.smoothing;

        self.smoothed
            .iter_mut()
            .zip(&self.fft_buffer)
            .map(|(prev, bin)| {
                let magnitude = bin.norm() * scale;
                *prev = tau.mul_add(*prev, (1.0 - tau) * magnitude);

                if *prev <= 0.0 || !prev.is_finite() {
                    return 0;
                }

                let db = 20.0 * prev.log10();
                let scaled = (255.0 / range) * (db - MIN_DECIBELS);
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Clear the sample history and smoothing state
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
    }
}

impl std::fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("fft_size", &self.fft_size)
            .field("buckets", &self.buckets)
            .field("smoothing", &self.smoothing)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_precision_loss)]
fn blackman_window(n: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5_f32 * (1.0 - alpha);
    let a1 = 0.5_f32;
    let a2 = 0.5_f32 * alpha;

    (0..n)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
            a2.mul_add((2.0 * x).cos(), a1.mul_add(-x.cos(), a0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(len: usize, amplitude: f32) -> Vec<f32> {
        let mut state = 0x2545_f491_u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                #[allow(clippy::cast_precision_loss)]
                let unit = state as f32 / u32::MAX as f32;
                (unit * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    #[test]
    fn test_silence_is_all_zero() {
        let mut analyser = SpectrumAnalyser::new(DEFAULT_FFT_SIZE, DEFAULT_SMOOTHING);
        analyser.push(&vec![0.0; 4096]);

        let spectrum = analyser.byte_frequency_data();
        assert_eq!(spectrum.len(), DEFAULT_BUCKETS);
        assert!(spectrum.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bucket_count_clamped_to_half_transform() {
        assert_eq!(SpectrumAnalyser::new(2048, 0.8).bucket_count(), 256);
        assert_eq!(SpectrumAnalyser::new(256, 0.8).bucket_count(), 128);
        assert_eq!(SpectrumAnalyser::with_buckets(2048, 4096, 0.8).bucket_count(), 1024);
        assert_eq!(SpectrumAnalyser::with_buckets(2048, 0, 0.8).bucket_count(), 1);

        let mut analyser = SpectrumAnalyser::with_buckets(2048, 64, 0.0);
        analyser.push(&noise(2048, 0.5));
        assert_eq!(analyser.byte_frequency_data().len(), 64);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_low_tone_lands_in_reported_buckets() {
        // 200Hz at 16kHz sits near bin 26 of a 2048-point transform
        let tone: Vec<f32> = (0..2048)
            .map(|i| 0.01 * (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 16000.0).sin())
            .collect();
        let mut analyser = SpectrumAnalyser::new(DEFAULT_FFT_SIZE, 0.0);
        analyser.push(&tone);

        let spectrum = analyser.byte_frequency_data();
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by_key(|&(_, &b)| b)
            .map(|(i, _)| i);
        assert_eq!(peak.map(|i| i.abs_diff(26) <= 1), Some(true));
    }

    #[test]
    fn test_noise_raises_energy() {
        let mut analyser = SpectrumAnalyser::new(DEFAULT_FFT_SIZE, DEFAULT_SMOOTHING);
        analyser.push(&noise(2048, 0.5));

        let spectrum = analyser.byte_frequency_data();
        let mean = spectrum.iter().map(|&b| f32::from(b)).sum::<f32>() / spectrum.len() as f32;
        assert!(mean > 50.0, "mean was {mean}");
    }

    #[test]
    fn test_smoothing_blends_snapshots() {
        let mut smoothed = SpectrumAnalyser::new(512, 0.8);
        let mut raw = SpectrumAnalyser::new(512, 0.0);
        let loud = noise(512, 0.5);
        smoothed.push(&loud);
        raw.push(&loud);

        let s: u32 = smoothed.byte_frequency_data().iter().map(|&b| u32::from(b)).sum();
        let r: u32 = raw.byte_frequency_data().iter().map(|&b| u32::from(b)).sum();

        // First smoothed reading carries only 20% of the new magnitude
        assert!(s < r);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut analyser = SpectrumAnalyser::new(256, 0.8);
        analyser.push(&noise(256, 0.5));
        analyser.reset();

        assert!(analyser.byte_frequency_data().iter().all(|&b| b == 0));
        assert_eq!(analyser.bucket_count(), 128);
    }
}
