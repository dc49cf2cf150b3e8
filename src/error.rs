//! Error type shared by every engine in the crate.
//!
//! Errors only ever come out of construction, `set_config`, `set_sample_rate`
//! and buffer-shape checks. Numeric trouble inside `process*` is absorbed
//! with clamps and epsilon floors and never reaches the caller.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoiseError {
    #[error("invalid sample rate {0} Hz (expected 8000..=192000)")]
    InvalidSampleRate(f32),

    #[error("invalid channel count {0} (expected 1 or 2)")]
    InvalidChannels(usize),

    #[error("invalid FFT size {0} (expected a power of two in 64..=8192)")]
    InvalidFftSize(usize),

    #[error("invalid hop size {hop} for FFT size {fft_size}")]
    InvalidHopSize { hop: usize, fft_size: usize },

    #[error("parameter `{name}` = {value} out of range [{min}, {max}]")]
    InvalidParameter {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("buffer length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("empty sample buffer")]
    EmptyBuffer,

    #[error("invalid configuration document: {0}")]
    Json(String),
}

impl From<serde_json::Error> for NoiseError {
    fn from(err: serde_json::Error) -> Self {
        NoiseError::Json(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NoiseError>;

/// Range check used by every `validate()` in the crate. Both bounds inclusive;
/// NaN is always rejected.
pub(crate) fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<()> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(NoiseError::InvalidParameter {
            name,
            value,
            min,
            max,
        })
    }
}

pub(crate) fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(NoiseError::LengthMismatch { expected, actual })
    }
}
