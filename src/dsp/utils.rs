use crate::error::{NoiseError, Result};
use std::f32::consts::PI;

/// Division guard for every power/SNR ratio in the spectral engines.
pub const EPS: f32 = 1e-10;
/// Floor used before taking logs of linear levels.
pub const DB_EPS: f32 = 1e-10;

pub const MIN_SAMPLE_RATE: f32 = 8000.0;
pub const MAX_SAMPLE_RATE: f32 = 192000.0;
pub const MIN_FFT_SIZE: usize = 64;
pub const MAX_FFT_SIZE: usize = 8192;

// ln(0.001): coefficients reach -60 dB after the given time.
const LN_MINUS_60_DB: f32 = -6.907_755;
// Guard for zero/negative time constants.
const MIN_MS_FOR_COEFF: f32 = 0.001;

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

pub fn db_to_lin(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

pub fn lin_to_db(lin: f32) -> f32 {
    20.0 * lin.max(DB_EPS).log10()
}

/// One-pole smoothing coefficient for a time constant in milliseconds,
/// defined as the time to decay by 60 dB.
#[inline]
pub fn time_constant_coeff(ms: f32, sample_rate: f32) -> f32 {
    let seconds = ms.max(MIN_MS_FOR_COEFF) / 1000.0;
    (LN_MINUS_60_DB / (seconds * sample_rate.max(1.0))).exp()
}

/// Symmetric Hann window `0.5 * (1 - cos(2πn/(N-1)))`.
pub fn make_hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / denom).cos()))
        .collect()
}

/// Periodic sqrt-Hann window, used as matched analysis/synthesis pair.
pub fn make_sqrt_hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos())).sqrt())
        .collect()
}

pub fn frame_rms(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    (s / (x.len().max(1) as f32)).sqrt()
}

pub fn validate_sample_rate(sample_rate: f32) -> Result<()> {
    if (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        Ok(())
    } else {
        Err(NoiseError::InvalidSampleRate(sample_rate))
    }
}

pub fn validate_fft_size(fft_size: usize) -> Result<()> {
    if fft_size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
        Ok(())
    } else {
        Err(NoiseError::InvalidFftSize(fft_size))
    }
}

pub fn validate_hop_size(hop: usize, fft_size: usize) -> Result<()> {
    if hop >= 1 && hop <= fft_size {
        Ok(())
    } else {
        Err(NoiseError::InvalidHopSize { hop, fft_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_constant_reaches_minus_60_db() {
        let sr = 48000.0;
        let c = time_constant_coeff(10.0, sr);
        let samples = (0.010 * sr) as i32;
        let residual = c.powi(samples);
        assert!((residual - 0.001).abs() < 1e-4);
    }

    #[test]
    fn test_hann_endpoints() {
        let w = make_hann_window(16);
        assert!(w[0].abs() < 1e-7);
        assert!(w[15].abs() < 1e-7);
        assert!(w.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_fft_size_validation() {
        assert!(validate_fft_size(64).is_ok());
        assert!(validate_fft_size(8192).is_ok());
        assert!(validate_fft_size(32).is_err());
        assert!(validate_fft_size(16384).is_err());
        assert!(validate_fft_size(1000).is_err());
    }

    #[test]
    fn test_db_round_trip() {
        let lin = db_to_lin(-12.0);
        assert!((lin_to_db(lin) + 12.0).abs() < 1e-4);
    }
}
