//! # Error Types
//!
//! Failures the detection engine can report. Transient capture conditions
//! (overruns) are recovered inside the detection loop; everything else
//! propagates to the caller.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors reported by a capture backend.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device dropped samples and must be re-prepared before reading again.
    #[error("capture overrun")]
    Overrun,

    /// No input device is available.
    #[error("no input device available")]
    NoDevice,

    /// The device cannot deliver the requested rate or format.
    #[error("unsupported capture configuration: {0}")]
    UnsupportedConfig(String),

    /// The audio stream failed.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// The stream stopped delivering blocks altogether.
    #[error("capture stream disconnected")]
    Disconnected,
}

impl CaptureError {
    /// Whether the detection loop may recover from this error by re-preparing the backend.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Overrun)
    }
}

/// Errors that terminate the detection loop.
#[derive(Debug, Error)]
pub enum TunerError {
    #[error("fatal capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Overruns kept coming after every retry the policy allows.
    #[error("capture overran {attempts} times in a row")]
    OverrunLimit { attempts: u32 },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to write detection: {0}")]
    Output(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_overrun_is_transient() {
        assert!(CaptureError::Overrun.is_transient());
        assert!(!CaptureError::NoDevice.is_transient());
        assert!(!CaptureError::Disconnected.is_transient());
        assert!(!CaptureError::Stream("boom".into()).is_transient());
    }

    #[test]
    fn overrun_limit_message_names_attempts() {
        let err = TunerError::OverrunLimit { attempts: 9 };
        assert_eq!(err.to_string(), "capture overran 9 times in a row");
    }
}
