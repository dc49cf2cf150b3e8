//! IMCRA noise tracker (Improved Minima-Controlled Recursive Averaging)
//!
//! Estimates the per-bin noise power spectrum and the speech-presence
//! probability from a stream of magnitude spectra, one call per hop.
//!
//! # Tracking Contract
//! - Noise follows the minimum of the smoothed power over a sliding window
//!   made of `window_length / sub_window_length` sub-window minima
//! - The recursive average only advances where speech is unlikely
//!   (`alpha_d~ = alpha_d + (1 - alpha_d) * p`)
//! - The minimum-statistics bias `b` scales the published estimate only; the
//!   recursion itself stays unbiased so the estimate cannot run away
//!
//! # Lifecycle
//! - First frame seeds every state vector from `|Y|²`
//! - `reset()` returns to the pre-first-frame state
//! - `set_config()` validates before touching any state

use crate::dsp::utils::{validate_fft_size, validate_sample_rate, EPS};
use crate::error::{check_len, check_range, NoiseError, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

// Bias growth per frame since the last minimum decrease.
const BIAS_AGE_SLOPE: f32 = 0.025;
const BIAS_SPAN: f32 = 2.12;
// Cap on the likelihood exponent.
const MAX_LIKELIHOOD_EXP: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImcraConfig {
    pub fft_size: usize,
    pub sample_rate: f32,
    /// Power smoothing.
    pub alpha_s: f32,
    /// Noise recursion base coefficient.
    pub alpha_d: f32,
    /// Decision-directed a priori SNR weight.
    pub alpha_d2: f32,
    pub beta_max: f32,
    pub gamma0: f32,
    pub gamma1: f32,
    pub zeta0: f32,
    pub q_min: f32,
    pub q_max: f32,
    pub xi_min: f32,
    pub g_min: f32,
    /// Frames covered by the minimum search.
    pub window_length: usize,
    /// Frames per sub-window.
    pub sub_window_length: usize,
}

impl Default for ImcraConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            sample_rate: 48000.0,
            alpha_s: 0.95,
            alpha_d: 0.95,
            alpha_d2: 0.9,
            beta_max: 0.96,
            gamma0: 4.6,
            gamma1: 3.0,
            zeta0: 1.67,
            q_min: 0.3,
            q_max: 0.95,
            xi_min: 0.001,
            g_min: 0.001,
            window_length: 80,
            sub_window_length: 8,
        }
    }
}

impl ImcraConfig {
    pub fn validate(&self) -> Result<()> {
        validate_fft_size(self.fft_size)?;
        validate_sample_rate(self.sample_rate)?;
        check_open_unit("alpha_s", self.alpha_s)?;
        check_open_unit("alpha_d", self.alpha_d)?;
        check_open_unit("alpha_d2", self.alpha_d2)?;
        check_range("beta_max", self.beta_max, f32::MIN_POSITIVE, 1.0)?;
        check_range("q_min", self.q_min, 0.0, 1.0)?;
        check_range("q_max", self.q_max, self.q_min.max(0.0), 1.0)?;
        check_range("xi_min", self.xi_min, f32::MIN_POSITIVE, 1.0)?;
        check_range("g_min", self.g_min, f32::MIN_POSITIVE, 1.0)?;
        check_range("gamma0", self.gamma0, f32::MIN_POSITIVE, f32::MAX)?;
        check_range("gamma1", self.gamma1, f32::MIN_POSITIVE, f32::MAX)?;
        check_range("zeta0", self.zeta0, f32::MIN_POSITIVE, f32::MAX)?;

        let sub = self.sub_window_length;
        if sub == 0 || self.window_length < sub || self.window_length % sub != 0 {
            return Err(NoiseError::InvalidParameter {
                name: "window_length",
                value: self.window_length as f32,
                min: sub.max(1) as f32,
                max: f32::MAX,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    fn num_sub_windows(&self) -> usize {
        self.window_length / self.sub_window_length
    }
}

// [0, 1) with the upper bound excluded.
fn check_open_unit(name: &'static str, value: f32) -> Result<()> {
    check_range(name, value, 0.0, 1.0)?;
    if value >= 1.0 {
        return Err(NoiseError::InvalidParameter {
            name,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

pub struct Imcra {
    config: ImcraConfig,
    num_bins: usize,
    num_sub: usize,

    s: Vec<f32>,
    s_min: Vec<f32>,
    s_tmp: Vec<f32>,
    // Sub-window minima, `num_sub` rows of `num_bins`.
    min_ring: Vec<f32>,
    ring_pos: usize,
    sub_count: usize,
    age: Vec<u32>,
    bias: Vec<f32>,

    lambda_tilde: Vec<f32>,
    lambda_d: Vec<f32>,
    xi: Vec<f32>,
    gamma: Vec<f32>,
    gh1: Vec<f32>,
    q: Vec<f32>,
    p: Vec<f32>,

    frame_count: u64,
}

impl Imcra {
    pub fn new(config: ImcraConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            warn!("Rejected IMCRA config: {}", e);
            return Err(e);
        }
        let mut imcra = Self {
            config,
            num_bins: 0,
            num_sub: 0,
            s: Vec::new(),
            s_min: Vec::new(),
            s_tmp: Vec::new(),
            min_ring: Vec::new(),
            ring_pos: 0,
            sub_count: 0,
            age: Vec::new(),
            bias: Vec::new(),
            lambda_tilde: Vec::new(),
            lambda_d: Vec::new(),
            xi: Vec::new(),
            gamma: Vec::new(),
            gh1: Vec::new(),
            q: Vec::new(),
            p: Vec::new(),
            frame_count: 0,
        };
        imcra.allocate();
        info!(
            "IMCRA initialized: fft={} bins={} sub-windows={}",
            config.fft_size, imcra.num_bins, imcra.num_sub
        );
        Ok(imcra)
    }

    fn allocate(&mut self) {
        let n = self.config.num_bins();
        self.num_bins = n;
        self.num_sub = self.config.num_sub_windows();
        self.s = vec![0.0; n];
        self.s_min = vec![0.0; n];
        self.s_tmp = vec![0.0; n];
        self.min_ring = vec![0.0; n * self.num_sub];
        self.age = vec![1; n];
        self.bias = vec![1.0; n];
        self.lambda_tilde = vec![0.0; n];
        self.lambda_d = vec![0.0; n];
        self.xi = vec![self.config.xi_min; n];
        self.gamma = vec![1.0; n];
        self.gh1 = vec![1.0; n];
        self.q = vec![1.0; n];
        self.p = vec![0.0; n];
        self.ring_pos = 0;
        self.sub_count = 0;
        self.frame_count = 0;
    }

    pub fn reset(&mut self) {
        self.s.fill(0.0);
        self.s_min.fill(0.0);
        self.s_tmp.fill(0.0);
        self.min_ring.fill(0.0);
        self.age.fill(1);
        self.bias.fill(1.0);
        self.lambda_tilde.fill(0.0);
        self.lambda_d.fill(0.0);
        self.xi.fill(self.config.xi_min);
        self.gamma.fill(1.0);
        self.gh1.fill(1.0);
        self.q.fill(1.0);
        self.p.fill(0.0);
        self.ring_pos = 0;
        self.sub_count = 0;
        self.frame_count = 0;
    }

    pub fn config(&self) -> &ImcraConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ImcraConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            warn!("Rejected IMCRA config: {}", e);
            return Err(e);
        }
        self.config = config;
        self.allocate();
        info!("IMCRA reconfigured: fft={}", config.fft_size);
        Ok(())
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// One hop. `magnitude`, `noise_out` and `speech_prob_out` are all
    /// `num_bins` long. `noise_out` receives the noise magnitude
    /// `sqrt(lambda_d)`.
    pub fn process_frame(
        &mut self,
        magnitude: &[f32],
        noise_out: &mut [f32],
        speech_prob_out: &mut [f32],
    ) -> Result<()> {
        check_len(self.num_bins, noise_out.len())?;
        check_len(self.num_bins, speech_prob_out.len())?;
        self.update(magnitude)?;

        for k in 0..self.num_bins {
            noise_out[k] = self.lambda_d[k].max(0.0).sqrt();
            speech_prob_out[k] = self.p[k];
        }
        Ok(())
    }

    /// Same as `process_frame` without copying the results out; read them
    /// back through `noise_psd()` / `speech_presence()`.
    pub fn update(&mut self, magnitude: &[f32]) -> Result<()> {
        check_len(self.num_bins, magnitude.len())?;
        let c = self.config;
        let first = self.frame_count == 0;
        let n = self.num_bins;

        if first {
            for k in 0..n {
                let y2 = magnitude[k] * magnitude[k];
                self.s[k] = y2;
                self.s_min[k] = y2;
                self.s_tmp[k] = y2;
                self.lambda_tilde[k] = y2;
                self.lambda_d[k] = y2;
            }
            for row in self.min_ring.chunks_exact_mut(n) {
                row.copy_from_slice(&self.s);
            }
        } else {
            for k in 0..n {
                let y2 = magnitude[k] * magnitude[k];
                self.s[k] = c.alpha_s * self.s[k] + (1.0 - c.alpha_s) * y2;
                self.s_tmp[k] = self.s_tmp[k].min(self.s[k]);
            }
            self.sub_count += 1;
            if self.sub_count >= c.sub_window_length {
                self.rotate_minima();
            }
        }

        for k in 0..n {
            let y2 = magnitude[k] * magnitude[k];

            // A posteriori / a priori SNR, decision-directed.
            let gamma = y2 / self.lambda_d[k].max(EPS);
            let g_prev = self.gh1[k];
            let xi = (c.alpha_d2 * g_prev * g_prev * gamma
                + (1.0 - c.alpha_d2) * (gamma - 1.0).max(0.0))
            .max(c.xi_min);
            self.gamma[k] = gamma;
            self.xi[k] = xi;
            self.gh1[k] = (xi / (1.0 + xi)).max(c.g_min);

            // Speech presence from the minimum-normalised power.
            let gamma_min = self.s[k] / (self.bias[k] * self.s_min[k]).max(EPS);
            let xi_local = (gamma_min - 1.0).max(0.0);
            let likelihood = (xi_local * gamma_min / (1.0 + xi_local))
                .min(MAX_LIKELIHOOD_EXP)
                .exp();
            let q = (1.0 / (1.0 + likelihood)).clamp(c.q_min, c.q_max);
            let mut p = 1.0 - q;
            if gamma > c.gamma0 && xi > c.zeta0 {
                p = 1.0;
            } else if gamma < c.gamma1 {
                p = 0.0;
            }
            self.q[k] = 1.0 - p;
            self.p[k] = p;

            // Bias scales the output only. Fed back into the recursion it
            // would grow without bound once `bias * alpha > 1`.
            let alpha = c.alpha_d + (1.0 - c.alpha_d) * p;
            self.lambda_tilde[k] = alpha * self.lambda_tilde[k] + (1.0 - alpha) * y2;
            self.lambda_d[k] = self.bias[k] * self.lambda_tilde[k];
        }

        self.frame_count += 1;
        Ok(())
    }

    fn rotate_minima(&mut self) {
        let n = self.num_bins;
        let row = self.ring_pos * n;
        self.min_ring[row..row + n].copy_from_slice(&self.s_tmp);
        self.ring_pos = (self.ring_pos + 1) % self.num_sub;
        self.sub_count = 0;

        let bias_cap = 1.0 / self.config.beta_max;
        for k in 0..n {
            let mut m = f32::MAX;
            for j in 0..self.num_sub {
                m = m.min(self.min_ring[j * n + k]);
            }
            if m < self.s_min[k] {
                self.age[k] = 1;
            } else {
                self.age[k] = self.age[k].saturating_add(1);
            }
            self.s_min[k] = m;
            self.s_tmp[k] = self.s[k];

            let age = (self.age[k] - 1) as f32;
            let b = 1.0 + (1.0 - 1.0 / (1.0 + age * BIAS_AGE_SLOPE)) * BIAS_SPAN;
            self.bias[k] = b.min(bias_cap);
        }
        debug!("IMCRA minima rotated at frame {}", self.frame_count);
    }

    /// Noise power `lambda_d` per bin.
    pub fn noise_psd(&self) -> &[f32] {
        &self.lambda_d
    }

    pub fn speech_presence(&self) -> &[f32] {
        &self.p
    }

    /// `1 - speech_presence()` per bin.
    pub fn speech_absence(&self) -> &[f32] {
        &self.q
    }

    pub fn a_priori_snr(&self) -> &[f32] {
        &self.xi
    }

    pub fn a_posteriori_snr(&self) -> &[f32] {
        &self.gamma
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::fft::FftEngine;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn noise_magnitudes(
        engine: &mut FftEngine,
        rng: &mut SmallRng,
        amp: f32,
        mag: &mut [f32],
    ) {
        let n = engine.size();
        let x: Vec<f32> = (0..n).map(|_| rng.gen_range(-amp..amp)).collect();
        let mut p = vec![0.0; n / 2 + 1];
        engine.forward_polar(&x, mag, &mut p);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ImcraConfig::default().validate().is_ok());
    }

    #[test]
    fn test_boundary_validation() {
        let ok = ImcraConfig::default();
        type Field = fn(&mut ImcraConfig, f32);
        // (field, lowest, highest, just below, just above)
        let cases: [(&str, Field, f32, f32, f32, f32); 12] = [
            ("alpha_s", |c, v| c.alpha_s = v, 0.0, 0.999, -0.01, 1.0),
            ("alpha_d", |c, v| c.alpha_d = v, 0.0, 0.999, -0.01, 1.0),
            ("alpha_d2", |c, v| c.alpha_d2 = v, 0.0, 0.999, -0.01, 1.0),
            ("beta_max", |c, v| c.beta_max = v, 1e-6, 1.0, 0.0, 1.01),
            ("q_min", |c, v| c.q_min = v, 0.0, 0.95, -0.01, 0.96),
            ("q_max", |c, v| c.q_max = v, 0.3, 1.0, 0.29, 1.01),
            ("xi_min", |c, v| c.xi_min = v, 1e-6, 1.0, 0.0, 1.01),
            ("g_min", |c, v| c.g_min = v, 1e-6, 1.0, 0.0, 1.01),
            ("gamma0", |c, v| c.gamma0 = v, 1e-6, 1e6, 0.0, f32::INFINITY),
            ("gamma1", |c, v| c.gamma1 = v, 1e-6, 1e6, 0.0, f32::INFINITY),
            ("zeta0", |c, v| c.zeta0 = v, 1e-6, 1e6, 0.0, f32::INFINITY),
            ("sample_rate", |c, v| c.sample_rate = v, 8000.0, 192000.0, 7999.0, 192001.0),
        ];
        for (name, set, lo, hi, below, above) in cases {
            for v in [lo, hi] {
                let mut c = ok;
                set(&mut c, v);
                assert!(c.validate().is_ok(), "{} = {} rejected", name, v);
            }
            for v in [below, above, f32::NAN] {
                let mut c = ok;
                set(&mut c, v);
                assert!(c.validate().is_err(), "{} = {} accepted", name, v);
            }
        }

        let c = ImcraConfig {
            fft_size: 1000,
            ..ok
        };
        assert_eq!(c.validate(), Err(NoiseError::InvalidFftSize(1000)));
        for fft_size in [64, 8192] {
            assert!(ImcraConfig { fft_size, ..ok }.validate().is_ok());
        }

        // (window_length, sub_window_length, accepted)
        let windows = [(8, 8, true), (80, 1, true), (81, 8, false), (4, 8, false), (80, 0, false)];
        for (window_length, sub_window_length, accepted) in windows {
            let c = ImcraConfig {
                window_length,
                sub_window_length,
                ..ok
            };
            assert_eq!(c.validate().is_ok(), accepted, "{}/{}", window_length, sub_window_length);
        }
    }

    #[test]
    fn test_first_frame_seeds_noise() {
        let cfg = ImcraConfig {
            fft_size: 64,
            ..Default::default()
        };
        let mut imcra = Imcra::new(cfg).unwrap();
        let mag = vec![2.0; 33];
        let mut noise = vec![0.0; 33];
        let mut p = vec![0.0; 33];
        imcra.process_frame(&mag, &mut noise, &mut p).unwrap();
        for &v in &noise {
            assert!((v - 2.0).abs() < 1e-4);
        }
        assert_eq!(imcra.frame_count(), 1);
    }

    #[test]
    fn test_converges_to_stationary_noise() {
        let n = 512;
        let amp = 0.1f32;
        let cfg = ImcraConfig {
            fft_size: n,
            ..Default::default()
        };
        let mut imcra = Imcra::new(cfg).unwrap();
        let mut engine = FftEngine::new(n).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        let bins = n / 2 + 1;
        let mut mag = vec![0.0; bins];
        let mut noise = vec![0.0; bins];
        let mut p = vec![0.0; bins];

        for _ in 0..400 {
            noise_magnitudes(&mut engine, &mut rng, amp, &mut mag);
            imcra.process_frame(&mag, &mut noise, &mut p).unwrap();
        }

        // Uniform noise: E|Y|² = N * amp² / 3 per bin.
        let expected = n as f32 * amp * amp / 3.0;
        let mean: f32 = imcra.noise_psd()[1..bins - 1].iter().sum::<f32>() / (bins - 2) as f32;
        let ratio = mean / expected;
        assert!((0.75..=1.25).contains(&ratio), "ratio = {}", ratio);
    }

    #[test]
    fn test_detects_tone_over_noise() {
        let n = 512;
        let cfg = ImcraConfig {
            fft_size: n,
            ..Default::default()
        };
        let mut imcra = Imcra::new(cfg).unwrap();
        let mut engine = FftEngine::new(n).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let bins = n / 2 + 1;
        let mut mag = vec![0.0; bins];
        let mut noise = vec![0.0; bins];
        let mut p = vec![0.0; bins];

        for _ in 0..200 {
            noise_magnitudes(&mut engine, &mut rng, 0.01, &mut mag);
            imcra.process_frame(&mag, &mut noise, &mut p).unwrap();
        }

        let tone_bin = 40;
        let floor = noise[tone_bin];
        for _ in 0..5 {
            noise_magnitudes(&mut engine, &mut rng, 0.01, &mut mag);
            mag[tone_bin] = floor * 30.0;
            imcra.process_frame(&mag, &mut noise, &mut p).unwrap();
        }
        assert!(p[tone_bin] > 0.9, "p = {}", p[tone_bin]);
        assert!(imcra.speech_absence()[tone_bin] < 0.1);
        assert!(imcra.a_posteriori_snr()[tone_bin] > imcra.config().gamma0);

        let mean_p: f32 = p.iter().sum::<f32>() / bins as f32;
        assert!(mean_p < 0.3, "mean p = {}", mean_p);
        // The tone must not drag the noise estimate up with it.
        assert!(noise[tone_bin] < floor * 3.0);

        // Back to noise only: presence at the tone bin falls away.
        let frames = 40;
        let mut p_after = 0.0;
        for _ in 0..frames {
            noise_magnitudes(&mut engine, &mut rng, 0.01, &mut mag);
            imcra.process_frame(&mag, &mut noise, &mut p).unwrap();
            p_after += p[tone_bin];
        }
        p_after /= frames as f32;
        assert!(p_after < 0.3, "p after burst = {}", p_after);
        assert!(noise[tone_bin] < floor * 3.0);
    }

    #[test]
    fn test_speech_presence_stays_low_on_noise() {
        let n = 512;
        let mut imcra = Imcra::new(ImcraConfig {
            fft_size: n,
            ..Default::default()
        })
        .unwrap();
        let mut engine = FftEngine::new(n).unwrap();
        let mut rng = SmallRng::seed_from_u64(17);
        let bins = n / 2 + 1;
        let mut mag = vec![0.0; bins];
        let mut noise = vec![0.0; bins];
        let mut p = vec![0.0; bins];

        for _ in 0..200 {
            noise_magnitudes(&mut engine, &mut rng, 0.05, &mut mag);
            imcra.process_frame(&mag, &mut noise, &mut p).unwrap();
        }
        let frames = 100;
        let mut total = 0.0;
        for _ in 0..frames {
            noise_magnitudes(&mut engine, &mut rng, 0.05, &mut mag);
            imcra.process_frame(&mag, &mut noise, &mut p).unwrap();
            total += p.iter().sum::<f32>() / bins as f32;
            for (&pk, &qk) in p.iter().zip(imcra.speech_absence()) {
                assert!((pk + qk - 1.0).abs() < 1e-6);
            }
        }
        let mean_p = total / frames as f32;
        assert!(mean_p < 0.15, "mean p on noise = {}", mean_p);
    }

    #[test]
    fn test_bias_does_not_feed_back() {
        // A constant input never lowers the minimum, so the bias climbs to
        // its cap of 1 / beta_max = 2.
        let mut imcra = Imcra::new(ImcraConfig {
            fft_size: 64,
            beta_max: 0.5,
            ..Default::default()
        })
        .unwrap();
        let mag = vec![1.0; 33];
        for _ in 0..2000 {
            imcra.update(&mag).unwrap();
        }
        for &lambda in imcra.noise_psd() {
            assert!((lambda - 2.0).abs() < 1e-3, "lambda = {}", lambda);
        }
    }

    #[test]
    fn test_rejected_config_leaves_state() {
        let mut imcra = Imcra::new(ImcraConfig {
            fft_size: 64,
            ..Default::default()
        })
        .unwrap();
        let mag = vec![1.0; 33];
        let mut noise = vec![0.0; 33];
        let mut p = vec![0.0; 33];
        imcra.process_frame(&mag, &mut noise, &mut p).unwrap();

        let bad = ImcraConfig {
            fft_size: 100,
            ..Default::default()
        };
        assert!(imcra.set_config(bad).is_err());
        assert_eq!(imcra.config().fft_size, 64);
        assert_eq!(imcra.frame_count(), 1);
    }

    #[test]
    fn test_length_mismatch() {
        let mut imcra = Imcra::new(ImcraConfig::default()).unwrap();
        let mag = vec![1.0; 10];
        let mut noise = vec![0.0; 513];
        let mut p = vec![0.0; 513];
        assert!(matches!(
            imcra.process_frame(&mag, &mut noise, &mut p),
            Err(NoiseError::LengthMismatch { .. })
        ));
        assert!(matches!(imcra.update(&mag), Err(NoiseError::LengthMismatch { .. })));
        assert_eq!(imcra.frame_count(), 0);
    }

    #[test]
    fn test_reset_restarts_seeding() {
        let mut imcra = Imcra::new(ImcraConfig {
            fft_size: 64,
            ..Default::default()
        })
        .unwrap();
        let mut noise = vec![0.0; 33];
        let mut p = vec![0.0; 33];
        imcra.process_frame(&vec![1.0; 33], &mut noise, &mut p).unwrap();
        imcra.reset();
        assert_eq!(imcra.frame_count(), 0);
        imcra.process_frame(&vec![3.0; 33], &mut noise, &mut p).unwrap();
        assert!((noise[5] - 3.0).abs() < 1e-4);
    }
}
