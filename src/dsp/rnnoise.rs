//! Aggressiveness-driven suppressor: noise gate followed by spectral
//! subtraction, both steered by one knob in `[0, 3]`.
//!
//! # Mapping (`t = aggressiveness / 3`)
//! - gate: threshold `-45 - 25t` dB, ratio `1.5 + 6.5t`, floor `-12 - 23t` dB,
//!   attack `3 + 7t` ms, release `30 + 120t` ms, high-pass `60 + 60t` Hz
//! - spectral: beta `1.2 + 1.6t`, floor `0.10 - 0.07t`, noise update
//!   `0.95 + 0.035t`, FFT 1024 / hop 256
//!
//! # Stereo
//! The gate runs per channel. The spectral stage runs once on the `0.5 * (L + R)`
//! downmix and the result is written to both outputs.

use crate::dsp::noise_reducer::{NoiseReducer, NoiseReducerConfig};
use crate::dsp::spectral_nr::{SpectralNr, SpectralNrConfig};
use crate::dsp::utils::{lerp, validate_sample_rate};
use crate::error::{check_len, NoiseError, Result};
use log::info;

pub const MIN_AGGRESSIVENESS: f32 = 0.0;
pub const MAX_AGGRESSIVENESS: f32 = 3.0;
pub const DEFAULT_AGGRESSIVENESS: f32 = 1.0;

const SPECTRAL_FFT_SIZE: usize = 1024;
const SPECTRAL_HOP_SIZE: usize = 256;
// Stereo downmix scratch; longer blocks are processed in pieces.
const MAX_STEREO_CHUNK: usize = 4096;

/// Gate settings for a given aggressiveness (clamped to `[0, 3]`).
pub fn gate_config_for(aggressiveness: f32) -> NoiseReducerConfig {
    let t = normalized(aggressiveness);
    NoiseReducerConfig {
        threshold_db: lerp(-45.0, -70.0, t),
        ratio: lerp(1.5, 8.0, t),
        floor_db: lerp(-12.0, -35.0, t),
        attack_ms: lerp(3.0, 10.0, t),
        release_ms: lerp(30.0, 150.0, t),
        high_pass_hz: lerp(60.0, 120.0, t),
        enable_high_pass: true,
        enabled: true,
    }
}

/// Spectral settings for a given aggressiveness (clamped to `[0, 3]`).
pub fn spectral_config_for(aggressiveness: f32, sample_rate: f32) -> SpectralNrConfig {
    let t = normalized(aggressiveness);
    SpectralNrConfig {
        sample_rate,
        fft_size: SPECTRAL_FFT_SIZE,
        hop_size: SPECTRAL_HOP_SIZE,
        beta: lerp(1.2, 2.8, t),
        floor_gain: lerp(0.10, 0.03, t),
        noise_update: lerp(0.95, 0.985, t),
        enabled: true,
    }
}

fn normalized(aggressiveness: f32) -> f32 {
    let a = if aggressiveness.is_nan() {
        DEFAULT_AGGRESSIVENESS
    } else {
        aggressiveness
    };
    a.clamp(MIN_AGGRESSIVENESS, MAX_AGGRESSIVENESS) / MAX_AGGRESSIVENESS
}

pub struct RnNoiseSuppressor {
    sample_rate: f32,
    channels: usize,
    aggressiveness: f32,
    enabled: bool,
    gate: NoiseReducer,
    spectral: SpectralNr,
    mono: Vec<f32>,
}

impl RnNoiseSuppressor {
    pub fn new(sample_rate: f32, channels: usize) -> Result<Self> {
        Self::with_aggressiveness(sample_rate, channels, DEFAULT_AGGRESSIVENESS)
    }

    pub fn with_aggressiveness(
        sample_rate: f32,
        channels: usize,
        aggressiveness: f32,
    ) -> Result<Self> {
        validate_sample_rate(sample_rate)?;
        let a = normalized(aggressiveness) * MAX_AGGRESSIVENESS;
        let gate = NoiseReducer::with_config(sample_rate, channels, gate_config_for(a))?;
        let spectral = SpectralNr::new(spectral_config_for(a, sample_rate))?;
        info!(
            "RNNoise suppressor initialized: {} Hz, {} channel(s), aggressiveness {:.2}",
            sample_rate, channels, a
        );
        Ok(Self {
            sample_rate,
            channels,
            aggressiveness: a,
            enabled: true,
            gate,
            spectral,
            mono: vec![0.0; if channels == 2 { MAX_STEREO_CHUNK } else { 0 }],
        })
    }

    pub fn aggressiveness(&self) -> f32 {
        self.aggressiveness
    }

    /// Values outside `[0, 3]` are clamped.
    pub fn set_aggressiveness(&mut self, aggressiveness: f32) -> Result<()> {
        let a = normalized(aggressiveness) * MAX_AGGRESSIVENESS;
        self.gate.set_config(gate_config_for(a))?;
        self.spectral
            .set_config(spectral_config_for(a, self.sample_rate))?;
        self.aggressiveness = a;
        Ok(())
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) -> Result<()> {
        validate_sample_rate(sample_rate)?;
        if sample_rate == self.sample_rate {
            return Ok(());
        }
        self.gate.set_sample_rate(sample_rate)?;
        self.spectral
            .set_config(spectral_config_for(self.aggressiveness, sample_rate))?;
        self.spectral.reset();
        self.sample_rate = sample_rate;
        Ok(())
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn latency(&self) -> usize {
        if self.enabled {
            self.spectral.latency()
        } else {
            0
        }
    }

    pub fn reset(&mut self) {
        self.gate.reset();
        self.spectral.reset();
    }

    pub fn gate(&self) -> &NoiseReducer {
        &self.gate
    }

    pub fn spectral(&self) -> &SpectralNr {
        &self.spectral
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
        if !self.enabled {
            return Ok(());
        }
        self.gate.process_mono_in_place(buf)?;
        self.spectral.process_in_place(buf)
    }

    pub fn process_stereo(
        &mut self,
        in_l: &[f32],
        in_r: &[f32],
        out_l: &mut [f32],
        out_r: &mut [f32],
    ) -> Result<()> {
        self.check_stereo(in_l.len(), in_r.len())?;
        check_len(in_l.len(), out_l.len())?;
        check_len(in_l.len(), out_r.len())?;
        out_l.copy_from_slice(in_l);
        out_r.copy_from_slice(in_r);
        self.process_stereo_in_place(out_l, out_r)
    }

    pub fn process_stereo_in_place(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<()> {
        self.check_stereo(left.len(), right.len())?;
        if !self.enabled {
            return Ok(());
        }

        self.gate.process_stereo_in_place(left, right)?;

        for (l_chunk, r_chunk) in left
            .chunks_mut(MAX_STEREO_CHUNK)
            .zip(right.chunks_mut(MAX_STEREO_CHUNK))
        {
            let mono = &mut self.mono[..l_chunk.len()];
            for ((m, &l), &r) in mono.iter_mut().zip(l_chunk.iter()).zip(r_chunk.iter()) {
                *m = 0.5 * (l + r);
            }
            self.spectral.process_in_place(mono)?;
            l_chunk.copy_from_slice(mono);
            r_chunk.copy_from_slice(mono);
        }
        Ok(())
    }

    fn check_stereo(&self, left: usize, right: usize) -> Result<()> {
        if self.channels != 2 {
            return Err(NoiseError::InvalidChannels(self.channels));
        }
        check_len(left, right)?;
        if left == 0 {
            return Err(NoiseError::EmptyBuffer);
        }
        Ok(())
    }
}
