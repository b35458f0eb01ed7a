//! # Detection Loop
//!
//! [`Tuner`] is the engine context: it owns the configuration, the FFT work
//! buffers and the cancellation flag. [`Tuner::run`] drives a
//! [`CaptureBackend`] until cancelled, turning every full block into one
//! [`Detection`].
//!
//! The loop is single-threaded; the only place it waits is the blocking
//! block read. Cancellation is checked once per iteration, so a cancel takes
//! effect within one block duration and never interrupts a pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, error, info, trace, warn};

use crate::Detection;
use crate::audio::CaptureBackend;
use crate::config::{OverrunPolicy, TunerConfig};
use crate::error::TunerError;
use crate::fft::SpectralAnalyzer;
use crate::output::DetectionSink;
use crate::pitch::{bin_to_frequency, harmonic_product_spectrum_into, peak_bin};
use crate::tuning::classify;

/// Cooperative cancellation flag shared with whoever stops the loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Analyzer plus the spectra of the most recent pass.
struct Pipeline {
    analyzer: SpectralAnalyzer,
    magnitudes: Vec<f64>,
    hps: Vec<f64>,
}

impl Pipeline {
    fn process(&mut self, config: &TunerConfig, block: &[f32]) -> Detection {
        self.analyzer.analyze_into(block, &mut self.magnitudes);
        harmonic_product_spectrum_into(
            &self.magnitudes,
            config.harmonics,
            config.harmonic_epsilon,
            &mut self.hps,
        );

        // Both spectra hold block_size / 2 >= 1 bins.
        let fundamental_bin = peak_bin(&self.hps).unwrap_or(1);
        let peak = peak_bin(&self.magnitudes).unwrap_or(1);

        let frequency = bin_to_frequency(fundamental_bin, config.sample_rate, config.block_size);
        let peak_frequency = bin_to_frequency(peak, config.sample_rate, config.block_size);
        let matched = classify(frequency, config.min_frequency, config.tolerance_hz);

        Detection {
            frequency,
            peak_frequency,
            fundamental_bin,
            peak_bin: peak,
            note: matched.note,
            direction: matched.direction,
            cents: matched.cents,
        }
    }
}

/// The pitch detection engine.
pub struct Tuner {
    config: TunerConfig,
    pipeline: Pipeline,
    block: Vec<f32>,
    cancel: CancelToken,
}

impl Tuner {
    /// Validates `config` and allocates every buffer the loop will use.
    pub fn new(config: TunerConfig) -> Result<Self, TunerError> {
        config.validate()?;

        let analyzer = SpectralAnalyzer::new(config.block_size, config.noise_floor, config.window);
        let bins = analyzer.bin_count();

        debug!(
            "Tuner created: sample_rate={}, block_size={}, bin_width={:.3} Hz, noise_floor={}, harmonics={}",
            config.sample_rate,
            config.block_size,
            config.bin_width(),
            config.noise_floor,
            config.harmonics
        );

        Ok(Self {
            pipeline: Pipeline {
                analyzer,
                magnitudes: Vec::with_capacity(bins),
                hps: Vec::with_capacity(bins),
            },
            block: vec![0.0; config.block_size],
            cancel: CancelToken::new(),
            config,
        })
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// A handle that stops [`run`](Tuner::run) at the next iteration boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs one analysis pass over a full block.
    ///
    /// # Panics
    /// If `block` does not hold exactly `block_size` samples.
    pub fn analyze(&mut self, block: &[f32]) -> Detection {
        self.pipeline.process(&self.config, block)
    }

    /// Magnitude spectrum of the most recent pass (index `k` is bin `k + 1`).
    pub fn magnitudes(&self) -> &[f64] {
        &self.pipeline.magnitudes
    }

    /// Harmonic product spectrum of the most recent pass.
    pub fn harmonic_product(&self) -> &[f64] {
        &self.pipeline.hps
    }

    /// Reads, analyzes and reports blocks until cancelled.
    ///
    /// Overruns are retried per the configured [`OverrunPolicy`]; partial
    /// blocks are dropped unanalyzed. Fatal capture errors, an exhausted
    /// overrun policy and sink failures end the loop with an error.
    pub fn run<B, S>(&mut self, backend: &mut B, sink: &mut S) -> Result<(), TunerError>
    where
        B: CaptureBackend + ?Sized,
        S: DetectionSink + ?Sized,
    {
        info!("Detection loop started");

        while !self.cancel.is_cancelled() {
            let read = read_with_recovery(&self.config.overrun, backend, &mut self.block)?;
            if read < self.block.len() {
                debug!("Discarding partial block ({} of {} samples)", read, self.block.len());
                continue;
            }

            let detection = self.pipeline.process(&self.config, &self.block);
            trace!(
                "Detected {} {:?} at {:.2} Hz (peak {:.2} Hz)",
                detection.note.name,
                detection.direction,
                detection.frequency,
                detection.peak_frequency
            );
            sink.emit(&detection)?;
        }

        info!("Detection loop cancelled");
        Ok(())
    }
}

/// Reads one block, re-preparing the backend after each overrun.
fn read_with_recovery<B>(
    policy: &OverrunPolicy,
    backend: &mut B,
    buf: &mut [f32],
) -> Result<usize, TunerError>
where
    B: CaptureBackend + ?Sized,
{
    let mut attempts = 0;
    loop {
        match backend.read_block(buf) {
            Ok(read) => return Ok(read),
            Err(err) if err.is_transient() => {
                attempts += 1;
                if attempts > policy.max_retries {
                    error!("Capture overran {} times in a row, giving up", attempts);
                    return Err(TunerError::OverrunLimit { attempts });
                }
                warn!("Capture overrun (attempt {}), re-preparing device", attempts);
                backend.prepare()?;

                let delay = policy.backoff(attempts);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
            Err(err) => {
                error!("Fatal capture error: {}", err);
                return Err(err.into());
            }
        }
    }
}
