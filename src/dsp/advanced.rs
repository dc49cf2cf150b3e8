//! Algorithm-selectable spectral noise reduction
//!
//! One STFT framer (sqrt-Hann analysis and synthesis) and one `Imcra` feed a
//! swappable gain stage. The stage is chosen by `Algorithm`:
//! - `SpectralSubtraction`: over-subtraction against the IMCRA noise magnitude
//! - `Wiener` / `MmseLsa`: decision-directed gain rules
//! - `TwoStep`: conservative then aggressive MMSE-LSA
//! - `Multiband`: Bark-band Wiener gains
//!
//! # Aggressiveness
//! `a` in `[0, 3]` maps to a depth scale `s = 0.5 + 0.5 * a` (1.0 at the
//! default of 1). The noise estimate handed to the gain stage is multiplied
//! by `s`, and minimum gains are raised to the power `s`.
//!
//! # Lifecycle
//! - `set_algorithm()` / `set_aggressiveness()` rebuild only the gain stage;
//!   noise tracking and framing continue uninterrupted
//! - FFT geometry changes go through `set_config()` and restart everything

use crate::dsp::imcra::{Imcra, ImcraConfig};
use crate::dsp::multiband::{BandScale, MultibandConfig, MultibandProcessor};
use crate::dsp::stft::StftFramer;
use crate::dsp::utils::{
    make_sqrt_hann_window, validate_fft_size, validate_hop_size, validate_sample_rate,
};
use crate::dsp::wiener::{
    GainRule, NoiseEstimator, TwoStepConfig, TwoStepNoiseReduction, WienerConfig, WienerFilter,
};
use crate::error::{check_len, check_range, NoiseError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WienerParams {
    pub alpha: f32,
    pub min_gain: f32,
    pub gain_smoothing: f32,
    pub frequency_smoothing: f32,
    pub use_perceptual_weighting: bool,
}

impl Default for WienerParams {
    fn default() -> Self {
        Self {
            alpha: 0.98,
            min_gain: 0.1,
            gain_smoothing: 0.7,
            frequency_smoothing: 0.3,
            use_perceptual_weighting: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoStepParams {
    pub step1_min_gain: f32,
    pub step2_min_gain: f32,
    pub residual_threshold: f32,
    pub residual_smoothing: f32,
}

impl Default for TwoStepParams {
    fn default() -> Self {
        Self {
            step1_min_gain: 0.3,
            step2_min_gain: 0.1,
            residual_threshold: 0.5,
            residual_smoothing: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultibandParams {
    pub num_bands: usize,
    pub scale: BandScale,
    pub min_gain: f32,
    pub smoothing: f32,
}

impl Default for MultibandParams {
    fn default() -> Self {
        Self {
            num_bands: 24,
            scale: BandScale::Bark,
            min_gain: 0.1,
            smoothing: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Algorithm {
    SpectralSubtraction { beta: f32, floor_gain: f32 },
    Wiener(WienerParams),
    MmseLsa(WienerParams),
    TwoStep(TwoStepParams),
    Multiband(MultibandParams),
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::MmseLsa(WienerParams::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedConfig {
    pub sample_rate: f32,
    pub fft_size: usize,
    pub hop_size: usize,
    pub algorithm: Algorithm,
    pub aggressiveness: f32,
    pub enabled: bool,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            fft_size: 2048,
            hop_size: 512,
            algorithm: Algorithm::default(),
            aggressiveness: 1.0,
            enabled: true,
        }
    }
}

impl AdvancedConfig {
    pub fn validate(&self) -> Result<()> {
        validate_sample_rate(self.sample_rate)?;
        validate_fft_size(self.fft_size)?;
        validate_hop_size(self.hop_size, self.fft_size)?;
        check_range("aggressiveness", self.aggressiveness, 0.0, 3.0)?;
        // Building the stage runs every sub-config's own validation.
        GainStage::build(self).map(|_| ())
    }

    fn depth_scale(&self) -> f32 {
        0.5 + 0.5 * self.aggressiveness
    }
}

enum GainStage {
    Subtraction { beta: f32, floor_gain: f32 },
    Wiener(WienerFilter),
    TwoStep(TwoStepNoiseReduction),
    Multiband(MultibandProcessor),
}

impl GainStage {
    fn build(config: &AdvancedConfig) -> Result<Self> {
        let s = config.depth_scale();
        let wiener = |p: &WienerParams, rule: GainRule| WienerConfig {
            fft_size: config.fft_size,
            sample_rate: config.sample_rate,
            alpha: p.alpha,
            min_gain: p.min_gain.powf(s),
            gain_smoothing: p.gain_smoothing,
            frequency_smoothing: p.frequency_smoothing,
            use_perceptual_weighting: p.use_perceptual_weighting,
            rule,
            estimator: NoiseEstimator::Simple,
            ..WienerConfig::default()
        };

        Ok(match &config.algorithm {
            Algorithm::SpectralSubtraction { beta, floor_gain } => {
                check_range("beta", *beta, 0.5, 5.0)?;
                check_range("floor_gain", *floor_gain, 0.0, 1.0)?;
                GainStage::Subtraction {
                    beta: *beta,
                    floor_gain: *floor_gain,
                }
            }
            Algorithm::Wiener(p) => {
                GainStage::Wiener(WienerFilter::new(wiener(p, GainRule::Wiener))?)
            }
            Algorithm::MmseLsa(p) => {
                GainStage::Wiener(WienerFilter::new(wiener(p, GainRule::MmseLsa))?)
            }
            Algorithm::TwoStep(p) => {
                GainStage::TwoStep(TwoStepNoiseReduction::new(TwoStepConfig {
                    fft_size: config.fft_size,
                    sample_rate: config.sample_rate,
                    step1_min_gain: p.step1_min_gain.powf(s),
                    step2_min_gain: p.step2_min_gain.powf(s),
                    residual_threshold: p.residual_threshold,
                    residual_smoothing: p.residual_smoothing,
                    estimator: NoiseEstimator::Simple,
                    ..TwoStepConfig::default()
                })?)
            }
            Algorithm::Multiband(p) => {
                GainStage::Multiband(MultibandProcessor::new(MultibandConfig {
                    fft_size: config.fft_size,
                    sample_rate: config.sample_rate,
                    num_bands: p.num_bands,
                    scale: p.scale,
                    min_gain: p.min_gain.powf(s),
                    smoothing: p.smoothing,
                    ..MultibandConfig::default()
                })?)
            }
        })
    }

    /// Fills `out` with the suppressed magnitude.
    fn apply(&mut self, mag: &[f32], noise_psd: &[f32], out: &mut [f32]) -> Result<()> {
        match self {
            GainStage::Subtraction { beta, floor_gain } => {
                for k in 0..out.len() {
                    let nm = noise_psd[k].sqrt();
                    out[k] = (mag[k] - *beta * nm).max(*floor_gain * nm).min(mag[k]);
                }
                Ok(())
            }
            GainStage::Wiener(f) => f.process_with_estimates(mag, noise_psd, out),
            GainStage::TwoStep(t) => t.process_with_estimates(mag, noise_psd, out),
            GainStage::Multiband(m) => {
                m.process(mag, noise_psd, out)?;
                for (o, &y) in out.iter_mut().zip(mag) {
                    *o *= y;
                }
                Ok(())
            }
        }
    }
}

pub struct AdvancedSpectralNr {
    config: AdvancedConfig,
    framer: StftFramer,
    imcra: Imcra,
    stage: GainStage,
    noise_scaled: Vec<f32>,
    out_mag: Vec<f32>,
}

impl AdvancedSpectralNr {
    pub fn new(config: AdvancedConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            warn!("Rejected advanced NR config: {}", e);
            return Err(e);
        }
        let framer = StftFramer::new(
            config.fft_size,
            config.hop_size,
            make_sqrt_hann_window(config.fft_size),
            make_sqrt_hann_window(config.fft_size),
        )?;
        let imcra = Imcra::new(ImcraConfig {
            fft_size: config.fft_size,
            sample_rate: config.sample_rate,
            ..ImcraConfig::default()
        })?;
        let stage = GainStage::build(&config)?;
        let bins = framer.num_bins();
        info!(
            "Advanced NR initialized: fft={} hop={} algorithm={:?}",
            config.fft_size, config.hop_size, config.algorithm
        );
        Ok(Self {
            config,
            framer,
            imcra,
            stage,
            noise_scaled: vec![0.0; bins],
            out_mag: vec![0.0; bins],
        })
    }

    pub fn config(&self) -> &AdvancedConfig {
        &self.config
    }

    /// Full reconfiguration; all state restarts.
    pub fn set_config(&mut self, config: AdvancedConfig) -> Result<()> {
        *self = Self::new(config)?;
        Ok(())
    }

    pub fn algorithm(&self) -> &Algorithm {
        &self.config.algorithm
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) -> Result<()> {
        let next = AdvancedConfig {
            algorithm,
            ..self.config
        };
        self.stage = Self::build_stage(&next)?;
        self.config = next;
        info!("Advanced NR algorithm set to {:?}", algorithm);
        Ok(())
    }

    pub fn aggressiveness(&self) -> f32 {
        self.config.aggressiveness
    }

    pub fn set_aggressiveness(&mut self, aggressiveness: f32) -> Result<()> {
        let next = AdvancedConfig {
            aggressiveness,
            ..self.config
        };
        self.stage = Self::build_stage(&next)?;
        self.config = next;
        Ok(())
    }

    fn build_stage(config: &AdvancedConfig) -> Result<GainStage> {
        if let Err(e) = check_range("aggressiveness", config.aggressiveness, 0.0, 3.0) {
            warn!("Rejected advanced NR aggressiveness: {}", e);
            return Err(e);
        }
        GainStage::build(config).map_err(|e| {
            warn!("Rejected advanced NR algorithm: {}", e);
            e
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn latency(&self) -> usize {
        if self.config.enabled {
            self.framer.latency()
        } else {
            0
        }
    }

    pub fn reset(&mut self) {
        self.framer.reset();
        self.imcra.reset();
        match &mut self.stage {
            GainStage::Subtraction { .. } => {}
            GainStage::Wiener(f) => f.reset(),
            GainStage::TwoStep(t) => t.reset(),
            GainStage::Multiband(m) => m.reset(),
        }
    }

    /// Noise power tracked by the shared IMCRA.
    pub fn noise_psd(&self) -> &[f32] {
        self.imcra.noise_psd()
    }

    pub fn speech_presence(&self) -> &[f32] {
        self.imcra.speech_presence()
    }

    pub fn process_mono(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        check_len(input.len(), output.len())?;
        output.copy_from_slice(input);
        self.process_mono_in_place(output)
    }

    pub fn process_mono_in_place(&mut self, buf: &mut [f32]) -> Result<()> {
        if buf.is_empty() {
            return Err(NoiseError::EmptyBuffer);
        }
        if !self.config.enabled {
            return Ok(());
        }

        let scale = self.config.depth_scale();
        let imcra = &mut self.imcra;
        let stage = &mut self.stage;
        let noise_scaled = &mut self.noise_scaled;
        let out_mag = &mut self.out_mag;
        let mut status = Ok(());

        self.framer.process_in_place(buf, |mag, _phase| {
            if let Err(e) = imcra.update(mag) {
                status = Err(e);
                return;
            }
            for (d, &s) in noise_scaled.iter_mut().zip(imcra.noise_psd()) {
                *d = s * scale;
            }
            match stage.apply(mag, noise_scaled, out_mag) {
                Ok(()) => mag.copy_from_slice(out_mag),
                Err(e) => status = Err(e),
            }
        });
        status
    }
}
