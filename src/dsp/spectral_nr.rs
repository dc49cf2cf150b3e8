//! Spectral Subtraction Noise Reduction
//!
//! Self-contained STFT engine: a Hann-windowed analysis frame per hop, an
//! exponential noise-magnitude tracker, over-subtraction with a spectral
//! floor, and overlap-add resynthesis with the original phase.
//!
//! # Perceptual Contract
//! - Never boosts: output magnitude <= input magnitude per bin
//! - Residual never drops below `floor_gain * noise` (no spectral holes)
//! - Silence in, silence out
//!
//! # Lifecycle
//! - The first analysed frame seeds the noise estimate
//! - Reconfiguring FFT geometry rebuilds the framer and restarts tracking;
//!   changing only `beta`/`floor_gain`/`noise_update` keeps the estimate

use crate::dsp::stft::StftFramer;
use crate::dsp::utils::{
    make_hann_window, validate_fft_size, validate_hop_size, validate_sample_rate,
};
use crate::error::{check_len, check_range, NoiseError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralNrConfig {
    pub sample_rate: f32,
    pub fft_size: usize,
    pub hop_size: usize,
    /// Over-subtraction factor.
    pub beta: f32,
    /// Residual floor relative to the noise estimate.
    pub floor_gain: f32,
    /// Noise tracker smoothing per frame.
    pub noise_update: f32,
    pub enabled: bool,
}

impl Default for SpectralNrConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            fft_size: 1024,
            hop_size: 256,
            beta: 1.5,
            floor_gain: 0.05,
            noise_update: 0.98,
            enabled: true,
        }
    }
}

impl SpectralNrConfig {
    pub fn validate(&self) -> Result<()> {
        validate_sample_rate(self.sample_rate)?;
        validate_fft_size(self.fft_size)?;
        validate_hop_size(self.hop_size, self.fft_size)?;
        check_range("beta", self.beta, 1.0, 3.0)?;
        check_range("floor_gain", self.floor_gain, 0.01, 0.1)?;
        check_range("noise_update", self.noise_update, 0.9, 0.99)?;
        Ok(())
    }
}

pub struct SpectralNr {
    config: SpectralNrConfig,
    framer: StftFramer,
    noise: Vec<f32>,
    noise_initialized: bool,
}

impl SpectralNr {
    pub fn new(config: SpectralNrConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            warn!("Rejected spectral NR config: {}", e);
            return Err(e);
        }
        let framer = Self::build_framer(&config)?;
        info!(
            "Spectral NR initialized: fft={} hop={} beta={:.2}",
            config.fft_size, config.hop_size, config.beta
        );
        Ok(Self {
            config,
            noise: vec![0.0; framer.num_bins()],
            framer,
            noise_initialized: false,
        })
    }

    fn build_framer(config: &SpectralNrConfig) -> Result<StftFramer> {
        StftFramer::new(
            config.fft_size,
            config.hop_size,
            make_hann_window(config.fft_size),
            vec![1.0; config.fft_size],
        )
    }

    pub fn config(&self) -> &SpectralNrConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SpectralNrConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            warn!("Rejected spectral NR config: {}", e);
            return Err(e);
        }
        if config.fft_size != self.config.fft_size || config.hop_size != self.config.hop_size {
            self.framer = Self::build_framer(&config)?;
            self.noise = vec![0.0; self.framer.num_bins()];
            self.noise_initialized = false;
        }
        self.config = config;
        info!(
            "Spectral NR reconfigured: beta={:.2} floor={:.3} update={:.3}",
            config.beta, config.floor_gain, config.noise_update
        );
        Ok(())
    }

    pub fn reset(&mut self) {
        self.framer.reset();
        self.noise.fill(0.0);
        self.noise_initialized = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// Samples of delay introduced while enabled.
    pub fn latency(&self) -> usize {
        if self.config.enabled {
            self.framer.latency()
        } else {
            0
        }
    }

    /// Tracked noise magnitude per bin.
    pub fn noise_magnitude(&self) -> &[f32] {
        &self.noise
    }

    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        check_len(input.len(), output.len())?;
        output.copy_from_slice(input);
        self.process_in_place(output)
    }

    pub fn process_in_place(&mut self, buf: &mut [f32]) -> Result<()> {
        if buf.is_empty() {
            return Err(NoiseError::EmptyBuffer);
        }
        if !self.config.enabled {
            return Ok(());
        }

        let c = self.config;
        let noise = &mut self.noise;
        let initialized = &mut self.noise_initialized;

        self.framer.process_in_place(buf, |mag, _phase| {
            if !*initialized {
                noise.copy_from_slice(mag);
                *initialized = true;
            } else {
                for (nk, &m) in noise.iter_mut().zip(mag.iter()) {
                    *nk = c.noise_update * *nk + (1.0 - c.noise_update) * m;
                }
            }
            for (m, &nk) in mag.iter_mut().zip(noise.iter()) {
                let floor = c.floor_gain * nk;
                *m = (*m - c.beta * nk).max(floor);
            }
        });
        Ok(())
    }
}
