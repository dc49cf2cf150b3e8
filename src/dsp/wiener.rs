//! Wiener / MMSE gain stage
//!
//! Turns a magnitude spectrum plus a noise power estimate into per-bin
//! suppression gains:
//! - a posteriori SNR `gamma = |Y|² / lambda`
//! - decision-directed a priori SNR `xi` from the previous frame's gain
//! - a selectable gain rule (Wiener, MMSE-LSA, MMSE-STSA, parametric Wiener)
//! - optional A-weighting shaped perceptual weighting
//! - temporal then 3-tap frequency smoothing against musical noise
//!
//! The noise estimate comes either from the built-in energy VAD tracker, an
//! owned `Imcra`, or from the caller (`process_with_estimates`).
//!
//! `TwoStepNoiseReduction` chains two of these (conservative, then
//! aggressive) and tracks what the pair removed.

use crate::dsp::imcra::{Imcra, ImcraConfig};
use crate::dsp::special::{bessel_i0_scaled, bessel_i1_scaled, expint_e1};
use crate::dsp::utils::{lerp, validate_fft_size, validate_sample_rate, EPS};
use crate::error::{check_len, check_range, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

// Energy VAD tracker.
const SIMPLE_NOISE_ALPHA: f32 = 0.98;
const VAD_THRESHOLD_FACTOR: f32 = 3.0;

// Below this `v` the LSA exponent blows up; use the Wiener ratio.
const LSA_SMALL_V: f32 = 0.001;

// A-weighting pole frequencies (Hz).
const A_WEIGHT_F1: f32 = 20.6;
const A_WEIGHT_F2: f32 = 107.7;
const A_WEIGHT_F3: f32 = 737.9;
const A_WEIGHT_F4: f32 = 12194.0;
const PERCEPTUAL_WEIGHT_MIN: f32 = 0.5;
const PERCEPTUAL_WEIGHT_MAX: f32 = 2.0;

const FREQ_SMOOTH_WEIGHT: f32 = 0.25;

// sqrt(pi) / 2
const STSA_SCALE: f32 = 0.886_226_9;

/// Parameters of the SNR-adaptive (parametric) Wiener rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParametricParams {
    /// Over-subtraction in the `xi / (xi + beta)` term.
    pub beta: f32,
    pub low_snr_db: f32,
    pub high_snr_db: f32,
    /// Suppression depth at or below `low_snr_db`.
    pub aggressive_low: f32,
    /// Suppression depth at or above `high_snr_db`.
    pub gentle_high: f32,
    pub music_noise_floor: f32,
}

impl Default for ParametricParams {
    fn default() -> Self {
        Self {
            beta: 1.5,
            low_snr_db: -5.0,
            high_snr_db: 20.0,
            aggressive_low: 0.9,
            gentle_high: 0.3,
            music_noise_floor: 0.01,
        }
    }
}

impl ParametricParams {
    pub fn validate(&self) -> Result<()> {
        check_range("beta", self.beta, 0.5, 5.0)?;
        check_range("low_snr_db", self.low_snr_db, -50.0, 50.0)?;
        check_range("high_snr_db", self.high_snr_db, self.low_snr_db, 50.0)?;
        check_range("aggressive_low", self.aggressive_low, 0.0, 1.0)?;
        check_range("gentle_high", self.gentle_high, 0.0, 1.0)?;
        check_range("music_noise_floor", self.music_noise_floor, 0.0, 0.1)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GainRule {
    Wiener,
    MmseLsa,
    MmseStsa,
    Parametric(ParametricParams),
}

impl GainRule {
    /// Raw gain for one bin, before weighting, clamping and smoothing.
    pub fn gain(&self, xi: f32, gamma: f32) -> f32 {
        let wiener = xi / (1.0 + xi);
        match self {
            GainRule::Wiener => wiener,
            GainRule::MmseLsa => {
                let v = wiener * gamma;
                if v < LSA_SMALL_V {
                    wiener
                } else {
                    wiener * (0.5 * expint_e1(v)).exp()
                }
            }
            GainRule::MmseStsa => {
                let gamma = gamma.max(EPS);
                let v = wiener * gamma;
                let half = 0.5 * v;
                let g = STSA_SCALE
                    * (v.sqrt() / gamma)
                    * ((1.0 + v) * bessel_i0_scaled(half) + v * bessel_i1_scaled(half));
                if g.is_finite() {
                    g
                } else {
                    wiener
                }
            }
            GainRule::Parametric(p) => {
                let snr_db = 10.0 * xi.max(EPS).log10();
                let span = (p.high_snr_db - p.low_snr_db).max(EPS);
                let t = (snr_db - p.low_snr_db) / span;
                let depth = lerp(p.aggressive_low, p.gentle_high, t);
                let g = 1.0 - depth * (1.0 - xi / (xi + p.beta));
                g.max(p.music_noise_floor)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseEstimator {
    /// Recursive averaging gated by a 3x energy VAD.
    Simple,
    Imcra,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WienerConfig {
    pub fft_size: usize,
    pub sample_rate: f32,
    /// Decision-directed weight.
    pub alpha: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    pub xi_min: f32,
    pub xi_max: f32,
    pub gain_smoothing: f32,
    pub frequency_smoothing: f32,
    pub perceptual_factor: f32,
    pub use_perceptual_weighting: bool,
    pub rule: GainRule,
    pub estimator: NoiseEstimator,
}

impl Default for WienerConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            sample_rate: 48000.0,
            alpha: 0.98,
            min_gain: 0.1,
            max_gain: 1.0,
            xi_min: 0.001,
            xi_max: 1000.0,
            gain_smoothing: 0.7,
            frequency_smoothing: 0.3,
            perceptual_factor: 0.5,
            use_perceptual_weighting: false,
            rule: GainRule::Wiener,
            estimator: NoiseEstimator::Imcra,
        }
    }
}

impl WienerConfig {
    pub fn validate(&self) -> Result<()> {
        validate_fft_size(self.fft_size)?;
        validate_sample_rate(self.sample_rate)?;
        check_range("alpha", self.alpha, 0.0, 1.0)?;
        check_range("min_gain", self.min_gain, 0.0, 2.0)?;
        check_range("max_gain", self.max_gain, self.min_gain, 2.0)?;
        check_range("xi_min", self.xi_min, 1e-6, 1e6)?;
        check_range("xi_max", self.xi_max, self.xi_min, 1e6)?;
        check_range("gain_smoothing", self.gain_smoothing, 0.0, 1.0)?;
        check_range("frequency_smoothing", self.frequency_smoothing, 0.0, 1.0)?;
        check_range("perceptual_factor", self.perceptual_factor, 0.0, 2.0)?;
        if let GainRule::Parametric(p) = &self.rule {
            p.validate()?;
        }
        Ok(())
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    fn imcra_config(&self) -> ImcraConfig {
        ImcraConfig {
            fft_size: self.fft_size,
            sample_rate: self.sample_rate,
            ..ImcraConfig::default()
        }
    }
}

/// A-weighting response (linear) at `freq` Hz, unnormalised.
pub fn a_weighting(freq: f32) -> f32 {
    let f2 = freq * freq;
    let f4 = f2 * f2;
    let num = A_WEIGHT_F4 * A_WEIGHT_F4 * f4;
    let den = (f2 + A_WEIGHT_F1 * A_WEIGHT_F1)
        * ((f2 + A_WEIGHT_F2 * A_WEIGHT_F2) * (f2 + A_WEIGHT_F3 * A_WEIGHT_F3)).sqrt()
        * (f2 + A_WEIGHT_F4 * A_WEIGHT_F4);
    num / den.max(EPS)
}

pub struct WienerFilter {
    config: WienerConfig,
    num_bins: usize,
    imcra: Option<Imcra>,

    noise_psd: Vec<f32>,
    xi: Vec<f32>,
    gamma: Vec<f32>,
    gains: Vec<f32>,
    perceptual: Vec<f32>,
    mag: Vec<f32>,
    smooth_buf: Vec<f32>,
    noise_initialized: bool,
}

impl WienerFilter {
    pub fn new(config: WienerConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            warn!("Rejected Wiener config: {}", e);
            return Err(e);
        }
        let imcra = match config.estimator {
            NoiseEstimator::Imcra => Some(Imcra::new(config.imcra_config())?),
            NoiseEstimator::Simple => None,
        };
        let mut filter = Self {
            config,
            num_bins: 0,
            imcra,
            noise_psd: Vec::new(),
            xi: Vec::new(),
            gamma: Vec::new(),
            gains: Vec::new(),
            perceptual: Vec::new(),
            mag: Vec::new(),
            smooth_buf: Vec::new(),
            noise_initialized: false,
        };
        filter.allocate();
        info!(
            "Wiener filter initialized: fft={} rule={:?} estimator={:?}",
            config.fft_size, config.rule, config.estimator
        );
        Ok(filter)
    }

    fn allocate(&mut self) {
        let n = self.config.num_bins();
        self.num_bins = n;
        self.noise_psd = vec![0.0; n];
        self.xi = vec![1.0; n];
        self.gamma = vec![1.0; n];
        self.gains = vec![1.0; n];
        self.mag = vec![0.0; n];
        self.smooth_buf = vec![0.0; n];
        self.noise_initialized = false;

        let nyquist = self.config.sample_rate * 0.5;
        let pf = self.config.perceptual_factor;
        self.perceptual = (0..n)
            .map(|k| {
                let freq = k as f32 * nyquist / (n - 1).max(1) as f32;
                (1.0 + pf * (a_weighting(freq) - 1.0))
                    .clamp(PERCEPTUAL_WEIGHT_MIN, PERCEPTUAL_WEIGHT_MAX)
            })
            .collect();
        debug!(
            "Perceptual weights: {:.3} at 1 kHz",
            1.0 + pf * (a_weighting(1000.0) - 1.0)
        );
    }

    pub fn reset(&mut self) {
        self.noise_psd.fill(0.0);
        self.xi.fill(1.0);
        self.gamma.fill(1.0);
        self.gains.fill(1.0);
        self.noise_initialized = false;
        if let Some(imcra) = self.imcra.as_mut() {
            imcra.reset();
        }
    }

    pub fn config(&self) -> &WienerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: WienerConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            warn!("Rejected Wiener config: {}", e);
            return Err(e);
        }
        let imcra = match config.estimator {
            NoiseEstimator::Imcra => Some(Imcra::new(config.imcra_config())?),
            NoiseEstimator::Simple => None,
        };
        self.config = config;
        self.imcra = imcra;
        self.allocate();
        info!("Wiener filter reconfigured: rule={:?}", config.rule);
        Ok(())
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Current per-bin gains (after smoothing).
    pub fn gains(&self) -> &[f32] {
        &self.gains
    }

    /// Noise power used for the last frame.
    pub fn noise_psd(&self) -> &[f32] {
        &self.noise_psd
    }

    pub fn a_priori_snr(&self) -> &[f32] {
        &self.xi
    }

    /// Complex path over bins `[0, n/2]`; phase is preserved.
    pub fn process_spectrum(
        &mut self,
        real_in: &[f32],
        imag_in: &[f32],
        real_out: &mut [f32],
        imag_out: &mut [f32],
    ) -> Result<()> {
        let n = self.num_bins;
        check_len(n, real_in.len())?;
        check_len(n, imag_in.len())?;
        check_len(n, real_out.len())?;
        check_len(n, imag_out.len())?;

        for k in 0..n {
            self.mag[k] = (real_in[k] * real_in[k] + imag_in[k] * imag_in[k]).sqrt();
        }
        self.estimate_noise_from_mag()?;
        self.compute_gains_from_mag();

        for k in 0..n {
            real_out[k] = real_in[k] * self.gains[k];
            imag_out[k] = imag_in[k] * self.gains[k];
        }
        Ok(())
    }

    /// Gain-only path. `phase` is not used and may be empty.
    pub fn process_magnitude_phase(
        &mut self,
        magnitude: &[f32],
        _phase: &[f32],
        out_magnitude: &mut [f32],
    ) -> Result<()> {
        let n = self.num_bins;
        check_len(n, magnitude.len())?;
        check_len(n, out_magnitude.len())?;

        self.mag.copy_from_slice(magnitude);
        self.estimate_noise_from_mag()?;
        self.compute_gains_from_mag();

        for k in 0..n {
            out_magnitude[k] = magnitude[k] * self.gains[k];
        }
        Ok(())
    }

    /// Gain stage driven by an external noise power estimate.
    pub fn process_with_estimates(
        &mut self,
        magnitude: &[f32],
        noise_psd: &[f32],
        out_magnitude: &mut [f32],
    ) -> Result<()> {
        let n = self.num_bins;
        check_len(n, magnitude.len())?;
        check_len(n, noise_psd.len())?;
        check_len(n, out_magnitude.len())?;

        self.mag.copy_from_slice(magnitude);
        self.noise_psd.copy_from_slice(noise_psd);
        self.compute_gains_from_mag();

        for k in 0..n {
            out_magnitude[k] = magnitude[k] * self.gains[k];
        }
        Ok(())
    }

    fn estimate_noise_from_mag(&mut self) -> Result<()> {
        match self.imcra.as_mut() {
            Some(imcra) => {
                imcra.update(&self.mag)?;
                self.noise_psd.copy_from_slice(imcra.noise_psd());
            }
            None => {
                if !self.noise_initialized {
                    for k in 0..self.num_bins {
                        self.noise_psd[k] = self.mag[k] * self.mag[k];
                    }
                    self.noise_initialized = true;
                    return Ok(());
                }
                for k in 0..self.num_bins {
                    let y2 = self.mag[k] * self.mag[k];
                    let lambda = self.noise_psd[k];
                    if y2 < VAD_THRESHOLD_FACTOR * lambda || lambda <= 0.0 {
                        self.noise_psd[k] =
                            SIMPLE_NOISE_ALPHA * lambda + (1.0 - SIMPLE_NOISE_ALPHA) * y2;
                    }
                }
            }
        }
        Ok(())
    }

    fn compute_gains_from_mag(&mut self) {
        let c = self.config;
        for k in 0..self.num_bins {
            let y2 = self.mag[k] * self.mag[k];
            let gamma = (y2 / self.noise_psd[k].max(EPS)).min(c.xi_max + 1.0);
            let g_prev = self.gains[k];
            let xi = (c.alpha * g_prev * g_prev * gamma
                + (1.0 - c.alpha) * (gamma - 1.0).max(0.0))
            .clamp(c.xi_min, c.xi_max);
            self.gamma[k] = gamma;
            self.xi[k] = xi;

            let mut g = c.rule.gain(xi, gamma);
            if c.use_perceptual_weighting {
                g *= self.perceptual[k];
            }
            let g = g.clamp(c.min_gain, c.max_gain);
            self.gains[k] = c.gain_smoothing * g_prev + (1.0 - c.gain_smoothing) * g;
        }

        let fs = c.frequency_smoothing;
        let n = self.num_bins;
        if fs > 0.0 && n >= 3 {
            self.smooth_buf.copy_from_slice(&self.gains);
            for k in 1..n - 1 {
                let avg = FREQ_SMOOTH_WEIGHT
                    * (self.smooth_buf[k - 1] + 2.0 * self.smooth_buf[k] + self.smooth_buf[k + 1]);
                self.gains[k] = fs * avg + (1.0 - fs) * self.smooth_buf[k];
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoStepConfig {
    pub fft_size: usize,
    pub sample_rate: f32,
    pub step1_min_gain: f32,
    pub step1_alpha: f32,
    pub step2_min_gain: f32,
    pub step2_alpha: f32,
    pub residual_threshold: f32,
    pub residual_smoothing: f32,
    pub estimator: NoiseEstimator,
}

impl Default for TwoStepConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            sample_rate: 48000.0,
            step1_min_gain: 0.3,
            step1_alpha: 0.95,
            step2_min_gain: 0.1,
            step2_alpha: 0.98,
            residual_threshold: 0.5,
            residual_smoothing: 0.9,
            estimator: NoiseEstimator::Imcra,
        }
    }
}

impl TwoStepConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("step1_min_gain", self.step1_min_gain, 0.0, 1.0)?;
        check_range("step1_alpha", self.step1_alpha, 0.0, 1.0)?;
        check_range("step2_min_gain", self.step2_min_gain, 0.0, 1.0)?;
        check_range("step2_alpha", self.step2_alpha, 0.0, 1.0)?;
        check_range("residual_threshold", self.residual_threshold, 0.0, 1.0)?;
        check_range("residual_smoothing", self.residual_smoothing, 0.0, 1.0)?;
        self.step_config(self.step1_min_gain, self.step1_alpha)
            .validate()
    }

    fn step_config(&self, min_gain: f32, alpha: f32) -> WienerConfig {
        WienerConfig {
            fft_size: self.fft_size,
            sample_rate: self.sample_rate,
            alpha,
            min_gain,
            rule: GainRule::MmseLsa,
            estimator: self.estimator,
            ..WienerConfig::default()
        }
    }
}

pub struct TwoStepNoiseReduction {
    config: TwoStepConfig,
    step1: WienerFilter,
    step2: WienerFilter,
    residual: Vec<f32>,
    mid_mag: Vec<f32>,
    step2_noise: Vec<f32>,
}

impl TwoStepNoiseReduction {
    pub fn new(config: TwoStepConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            warn!("Rejected two-step config: {}", e);
            return Err(e);
        }
        let step1 =
            WienerFilter::new(config.step_config(config.step1_min_gain, config.step1_alpha))?;
        let step2 =
            WienerFilter::new(config.step_config(config.step2_min_gain, config.step2_alpha))?;
        let n = step1.num_bins();
        Ok(Self {
            config,
            step1,
            step2,
            residual: vec![0.0; n],
            mid_mag: vec![0.0; n],
            step2_noise: vec![0.0; n],
        })
    }

    pub fn config(&self) -> &TwoStepConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TwoStepConfig) -> Result<()> {
        let fresh = Self::new(config)?;
        *self = fresh;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.step1.reset();
        self.step2.reset();
        self.residual.fill(0.0);
    }

    pub fn num_bins(&self) -> usize {
        self.step1.num_bins()
    }

    /// Both steps with their own noise estimators; step 2 sees step 1's
    /// output.
    pub fn process_magnitude(
        &mut self,
        magnitude: &[f32],
        out_magnitude: &mut [f32],
    ) -> Result<()> {
        check_len(self.num_bins(), out_magnitude.len())?;
        self.step1
            .process_magnitude_phase(magnitude, &[], &mut self.mid_mag)?;
        self.track_residual(magnitude);
        self.step2
            .process_magnitude_phase(&self.mid_mag, &[], out_magnitude)?;
        Ok(())
    }

    /// Both steps driven by one external noise estimate; step 2 sees the
    /// noise left after step 1's attenuation.
    pub fn process_with_estimates(
        &mut self,
        magnitude: &[f32],
        noise_psd: &[f32],
        out_magnitude: &mut [f32],
    ) -> Result<()> {
        check_len(self.num_bins(), out_magnitude.len())?;
        self.step1
            .process_with_estimates(magnitude, noise_psd, &mut self.mid_mag)?;
        self.track_residual(magnitude);
        for (k, v) in self.step2_noise.iter_mut().enumerate() {
            let g = self.step1.gains()[k];
            *v = noise_psd[k] * g * g;
        }
        self.step2
            .process_with_estimates(&self.mid_mag, &self.step2_noise, out_magnitude)?;
        Ok(())
    }

    /// What step 1 took out of `original`; step 2 does not count.
    fn track_residual(&mut self, original: &[f32]) {
        let th = self.config.residual_threshold;
        let rs = self.config.residual_smoothing;
        for k in 0..self.residual.len() {
            let diff = (original[k] - self.mid_mag[k]).abs();
            if diff > th * self.residual[k] {
                self.residual[k] = rs * self.residual[k] + (1.0 - rs) * diff;
            }
        }
    }

    pub fn step_gains(&self) -> (&[f32], &[f32]) {
        (self.step1.gains(), self.step2.gains())
    }

    pub fn residual_noise(&self) -> &[f32] {
        &self.residual
    }
}
