//! # Configuration
//!
//! Every tunable of the detection engine lives in [`TunerConfig`]. Defaults
//! match the reference setup: 8192-sample blocks at 8 kHz, a noise floor of 30
//! on the 16-bit amplitude scale and five harmonics for the product spectrum.
//!
//! Configs can be loaded from JSON; missing fields fall back to the defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Sample rate requested from the capture backend, in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Samples per analysis block.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Errors raised while loading or validating a [`TunerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Window applied to each block before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// DC removal followed by a Hann taper.
    Hann,
    /// The raw block, untouched.
    Rectangular,
}

/// Retry policy for capture overruns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrunPolicy {
    /// Consecutive overruns tolerated for a single block request.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds. Doubles on each retry.
    pub initial_backoff_ms: u64,
    /// Upper bound for the retry delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for OverrunPolicy {
    fn default() -> Self {
        Self {
            max_retries: 8,
            initial_backoff_ms: 5,
            max_backoff_ms: 250,
        }
    }
}

impl OverrunPolicy {
    /// Delay to wait before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Configuration for the detection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Sample rate handed to the capture backend, in Hz.
    pub sample_rate: u32,
    /// Samples per analysis block.
    pub block_size: usize,
    /// Magnitudes below this amplitude (16-bit sample scale) are treated as silence.
    pub noise_floor: f64,
    /// Highest harmonic multiplied into the product spectrum.
    pub harmonics: usize,
    /// Harmonic magnitudes at or below this are skipped instead of multiplied.
    pub harmonic_epsilon: f64,
    /// Frequencies below this classify as the unknown note, in Hz.
    pub min_frequency: f32,
    /// Distance from the reference frequency still reported as in tune, in Hz.
    pub tolerance_hz: f32,
    pub window: WindowKind,
    pub overrun: OverrunPolicy,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            noise_floor: 30.0,
            harmonics: 5,
            harmonic_epsilon: 1e-5,
            min_frequency: 10.0,
            tolerance_hz: 1.5,
            window: WindowKind::Hann,
            overrun: OverrunPolicy::default(),
        }
    }
}

impl TunerConfig {
    /// Parses and validates a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TunerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &'static str) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid { field, reason })
        }

        if self.sample_rate == 0 {
            return invalid("sample_rate", "must be positive");
        }
        if self.block_size < 2 {
            return invalid("block_size", "must be at least 2");
        }
        if self.harmonics == 0 {
            return invalid("harmonics", "must be at least 1");
        }
        if !(self.noise_floor >= 0.0) {
            return invalid("noise_floor", "must be non-negative");
        }
        if !(self.harmonic_epsilon >= 0.0) {
            return invalid("harmonic_epsilon", "must be non-negative");
        }
        if !(self.tolerance_hz >= 0.0) {
            return invalid("tolerance_hz", "must be non-negative");
        }
        if !(self.min_frequency >= 0.0) {
            return invalid("min_frequency", "must be non-negative");
        }
        if self.overrun.initial_backoff_ms > self.overrun.max_backoff_ms {
            return invalid("overrun.initial_backoff_ms", "must not exceed max_backoff_ms");
        }
        Ok(())
    }

    /// Width of one FFT bin in Hz.
    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.block_size as f32
    }

    /// Number of non-DC bins in the half spectrum.
    pub fn bin_count(&self) -> usize {
        self.block_size / 2
    }

    /// Wall-clock length of one block.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_setup() {
        let config = TunerConfig::default();
        assert_eq!(config.sample_rate, 8000);
        assert_eq!(config.block_size, 8192);
        assert_eq!(config.bin_count(), 4096);
        assert!((config.bin_width() - 0.9765625).abs() < 1e-6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = TunerConfig::from_json(r#"{ "noise_floor": 12.5, "window": "rectangular" }"#)
            .unwrap();
        assert_eq!(config.noise_floor, 12.5);
        assert_eq!(config.window, WindowKind::Rectangular);
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.overrun, OverrunPolicy::default());
    }

    #[test]
    fn rejects_invalid_values() {
        let err = TunerConfig::from_json(r#"{ "block_size": 1 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "block_size", .. }));

        let err = TunerConfig::from_json(r#"{ "noise_floor": -1.0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "noise_floor", .. }));

        let err = TunerConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = OverrunPolicy {
            max_retries: 10,
            initial_backoff_ms: 5,
            max_backoff_ms: 30,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(5));
        assert_eq!(policy.backoff(2), Duration::from_millis(10));
        assert_eq!(policy.backoff(3), Duration::from_millis(20));
        assert_eq!(policy.backoff(4), Duration::from_millis(30));
        assert_eq!(policy.backoff(40), Duration::from_millis(30));
    }
}
