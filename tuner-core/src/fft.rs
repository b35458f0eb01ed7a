//! # Fast Fourier Transform (FFT) Module
//!
//! Turns a block of samples into a noise-gated magnitude spectrum.
//!
//! ## Features
//! - FFT planned once with RustFFT; work buffers are reused for every block
//! - Optional DC offset removal and Hann windowing to confine spectral leakage
//! - Magnitudes scaled to sample amplitude units, then noise floor clamping
//!
//! Only the non-redundant, non-DC half of the transform is kept: index `k` of
//! a magnitude spectrum holds bin `k + 1`, for bins `1..=N/2`.
//!
//! A sine of amplitude `A` centred on a bin reads about `A` in that bin
//! whatever the block size or window, so the noise floor is an amplitude on
//! the same scale as the input samples.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::config::WindowKind;

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f64]) {
    let len = signal.len();
    if len == 0 { return; }
    let avg = signal.iter().sum::<f64>() / len as f64;
    if avg.abs() > 1e-9 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Precomputes Hann window coefficients for a block of `n` samples.
fn hann_window(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f64;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n_minus_1).cos()))
        .collect()
}

/// Spectral analyzer for fixed-size blocks.
///
/// Owns the FFT plan and its work buffers. They are sized once in [`new`]
/// and released when the analyzer is dropped.
///
/// [`new`]: SpectralAnalyzer::new
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f64>>,
    block_size: usize,
    noise_floor: f64,
    window_kind: WindowKind,
    window: Vec<f64>,
    /// `2 / sum(window)`, mapping FFT moduli to amplitude units.
    scale: f64,
    samples: Vec<f64>,
    fft_buffer: Vec<Complex<f64>>,
    scratch_buffer: Vec<Complex<f64>>,
}

impl SpectralAnalyzer {
    pub fn new(block_size: usize, noise_floor: f64, window_kind: WindowKind) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(block_size);
        let scratch_len = fft.get_inplace_scratch_len();

        let window = match window_kind {
            WindowKind::Hann => hann_window(block_size),
            WindowKind::Rectangular => Vec::new(),
        };
        let gain = match window_kind {
            WindowKind::Hann => window.iter().sum::<f64>(),
            WindowKind::Rectangular => block_size as f64,
        };
        let scale = if gain > 0.0 { 2.0 / gain } else { 1.0 };

        Self {
            fft,
            block_size,
            noise_floor,
            window_kind,
            window,
            scale,
            samples: vec![0.0; block_size],
            fft_buffer: vec![Complex::new(0.0, 0.0); block_size],
            scratch_buffer: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of entries in every magnitude spectrum this analyzer produces.
    pub fn bin_count(&self) -> usize {
        self.block_size / 2
    }

    /// Computes the magnitude spectrum of `block` into `magnitudes`.
    ///
    /// `block` must hold exactly `block_size` samples; partial reads are the
    /// caller's to discard. `magnitudes` is resized to [`bin_count`].
    ///
    /// [`bin_count`]: SpectralAnalyzer::bin_count
    pub fn analyze_into(&mut self, block: &[f32], magnitudes: &mut Vec<f64>) {
        assert_eq!(
            block.len(),
            self.block_size,
            "analyzer requires a full block"
        );

        for (dst, &src) in self.samples.iter_mut().zip(block) {
            *dst = src as f64;
        }
        if self.window_kind == WindowKind::Hann {
            remove_dc_offset(&mut self.samples);
            for (sample, w) in self.samples.iter_mut().zip(&self.window) {
                *sample *= w;
            }
        }

        for (dst, &sample) in self.fft_buffer.iter_mut().zip(&self.samples) {
            *dst = Complex::new(sample, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch_buffer);

        let bins = self.bin_count();
        magnitudes.clear();
        magnitudes.extend(self.fft_buffer[1..=bins].iter().map(|c| {
            let magnitude = c.norm() * self.scale;
            if magnitude < self.noise_floor { 0.0 } else { magnitude }
        }));
    }

    /// Allocating convenience wrapper around [`analyze_into`].
    ///
    /// [`analyze_into`]: SpectralAnalyzer::analyze_into
    pub fn analyze(&mut self, block: &[f32]) -> Vec<f64> {
        let mut magnitudes = Vec::with_capacity(self.bin_count());
        self.analyze_into(block, &mut magnitudes);
        magnitudes
    }
}
