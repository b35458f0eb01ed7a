// tuner-core/src/lib.rs

//! The core logic for the spectral pitch tuner.
//! This crate is responsible for audio capture, spectral analysis,
//! harmonic reinforcement and note classification. It is completely
//! headless and only talks to the outside world through the
//! [`audio::CaptureBackend`] and [`output::DetectionSink`] traits.

pub mod audio;
pub mod config;
pub mod detector;
pub mod error;
pub mod fft;
pub mod output;
pub mod pitch;
pub mod tuning;

pub use config::TunerConfig;
pub use detector::{CancelToken, Tuner};
pub use error::{CaptureError, TunerError};
pub use tuning::{Direction, Note};

/// Represents the result of a single analysis pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// The fundamental picked from the harmonic product spectrum, in Hz.
    pub frequency: f32,
    /// The loudest component of the magnitude spectrum, in Hz. Informational;
    /// may be a harmonic of `frequency`.
    pub peak_frequency: f32,
    /// Bin index behind `frequency`.
    pub fundamental_bin: usize,
    /// Bin index behind `peak_frequency`.
    pub peak_bin: usize,
    /// The nearest note, or the `unknown` sentinel.
    pub note: &'static Note,
    pub direction: Direction,
    /// The deviation from the matched note in cents.
    pub cents: Option<f32>,
}
