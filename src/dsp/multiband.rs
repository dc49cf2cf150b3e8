//! Band-grouped Wiener gains.
//!
//! Bins are grouped into `num_bands` bands spaced evenly on a perceptual
//! (Bark, Mel) or linear frequency axis. Each band gets one Wiener gain from
//! its summed SNR, smoothed over time, and every bin in the band takes it.
//! Coarser gains trade frequency resolution for far less musical noise.

use crate::dsp::utils::{validate_fft_size, validate_sample_rate, EPS};
use crate::error::{check_len, check_range, NoiseError, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandScale {
    Bark,
    Mel,
    Linear,
}

impl BandScale {
    pub fn warp(self, hz: f32) -> f32 {
        match self {
            // Traunmüller
            BandScale::Bark => 26.81 * hz / (1960.0 + hz) - 0.53,
            BandScale::Mel => 2595.0 * (1.0 + hz / 700.0).log10(),
            BandScale::Linear => hz,
        }
    }

    pub fn unwarp(self, v: f32) -> f32 {
        match self {
            BandScale::Bark => 1960.0 * (v + 0.53) / (26.28 - v),
            BandScale::Mel => 700.0 * (10.0f32.powf(v / 2595.0) - 1.0),
            BandScale::Linear => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultibandConfig {
    pub fft_size: usize,
    pub sample_rate: f32,
    pub num_bands: usize,
    pub scale: BandScale,
    pub low_freq: f32,
    /// Capped at Nyquist.
    pub high_freq: f32,
    pub min_gain: f32,
    /// Band gain smoothing across frames.
    pub smoothing: f32,
}

impl Default for MultibandConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            sample_rate: 48000.0,
            num_bands: 24,
            scale: BandScale::Bark,
            low_freq: 20.0,
            high_freq: 20000.0,
            min_gain: 0.1,
            smoothing: 0.7,
        }
    }
}

impl MultibandConfig {
    pub fn validate(&self) -> Result<()> {
        validate_fft_size(self.fft_size)?;
        validate_sample_rate(self.sample_rate)?;
        if !(4..=128).contains(&self.num_bands) {
            return Err(NoiseError::InvalidParameter {
                name: "num_bands",
                value: self.num_bands as f32,
                min: 4.0,
                max: 128.0,
            });
        }
        let high = self.effective_high_freq();
        check_range("high_freq", self.high_freq, 1.0, f32::MAX)?;
        check_range("low_freq", self.low_freq, 0.0, high - 1.0)?;
        check_range("min_gain", self.min_gain, 0.0, 1.0)?;
        check_range("smoothing", self.smoothing, 0.0, 0.999)?;
        Ok(())
    }

    pub fn effective_high_freq(&self) -> f32 {
        self.high_freq.min(self.sample_rate * 0.5)
    }
}

pub struct MultibandProcessor {
    config: MultibandConfig,
    num_bins: usize,
    /// `num_bands + 1` edges in Hz.
    edges: Vec<f32>,
    band_of_bin: Vec<usize>,
    signal: Vec<f32>,
    noise: Vec<f32>,
    band_gains: Vec<f32>,
}

impl MultibandProcessor {
    pub fn new(config: MultibandConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            warn!("Rejected multiband config: {}", e);
            return Err(e);
        }
        let nb = config.num_bands;
        let lo = config.scale.warp(config.low_freq);
        let hi = config.scale.warp(config.effective_high_freq());
        let edges: Vec<f32> = (0..=nb)
            .map(|i| config.scale.unwarp(lo + (hi - lo) * i as f32 / nb as f32))
            .collect();

        let num_bins = config.fft_size / 2 + 1;
        let bin_hz = config.sample_rate / config.fft_size as f32;
        let band_of_bin = (0..num_bins)
            .map(|k| {
                let f = k as f32 * bin_hz;
                edges[1..nb].iter().take_while(|&&e| e <= f).count()
            })
            .collect();

        debug!(
            "Multiband layout: {} {:?} bands, {:.1}..{:.1} Hz",
            nb,
            config.scale,
            edges[0],
            edges[nb]
        );
        Ok(Self {
            config,
            num_bins,
            edges,
            band_of_bin,
            signal: vec![0.0; nb],
            noise: vec![0.0; nb],
            band_gains: vec![1.0; nb],
        })
    }

    pub fn config(&self) -> &MultibandConfig {
        &self.config
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn band_edges(&self) -> &[f32] {
        &self.edges
    }

    pub fn band_of_bin(&self, bin: usize) -> Option<usize> {
        self.band_of_bin.get(bin).copied()
    }

    pub fn band_gains(&self) -> &[f32] {
        &self.band_gains
    }

    pub fn reset(&mut self) {
        self.band_gains.fill(1.0);
    }

    /// `magnitude`, `noise_psd` (power) and `gains_out` are `num_bins` long.
    pub fn process(
        &mut self,
        magnitude: &[f32],
        noise_psd: &[f32],
        gains_out: &mut [f32],
    ) -> Result<()> {
        check_len(self.num_bins, magnitude.len())?;
        check_len(self.num_bins, noise_psd.len())?;
        check_len(self.num_bins, gains_out.len())?;

        self.signal.fill(0.0);
        self.noise.fill(0.0);
        for k in 0..self.num_bins {
            let b = self.band_of_bin[k];
            self.signal[b] += magnitude[k] * magnitude[k];
            self.noise[b] += noise_psd[k];
        }

        let s = self.config.smoothing;
        let min_gain = self.config.min_gain;
        for b in 0..self.config.num_bands {
            let snr = self.signal[b] / self.noise[b].max(EPS);
            let xi = (snr - 1.0).max(0.0);
            let g = xi / (1.0 + xi);
            self.band_gains[b] = (s * self.band_gains[b] + (1.0 - s) * g).clamp(min_gain, 1.0);
        }

        for k in 0..self.num_bins {
            gains_out[k] = self.band_gains[self.band_of_bin[k]];
        }
        Ok(())
    }
}
