//! Time-Domain Noise Gate (Downward Expander)
//!
//! Per channel, per sample:
//! 1. optional Butterworth high-pass to strip rumble
//! 2. envelope follower on `|x|`
//! 3. below threshold: `gain = (env / threshold)^(1 / ratio)`, floored
//! 4. gain smoothing (opening uses `attack_ms * 0.5`, closing
//!    `max(5, release_ms)`) against pumping
//! 5. `y = x * gain`
//!
//! One `ChannelState` per channel; mono and stereo reducers share all
//! coefficients.

use crate::dsp::biquad::{Biquad, BUTTERWORTH_Q};
use crate::dsp::envelope::AttackRelease;
use crate::dsp::utils::{db_to_lin, validate_sample_rate};
use crate::error::{check_len, check_range, NoiseError, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

// Gain smoothing never releases faster than this.
const MIN_GAIN_RELEASE_MS: f32 = 5.0;
const GAIN_ATTACK_SCALE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseReducerConfig {
    pub threshold_db: f32,
    pub ratio: f32,
    pub floor_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub high_pass_hz: f32,
    pub enable_high_pass: bool,
    pub enabled: bool,
}

impl Default for NoiseReducerConfig {
    fn default() -> Self {
        Self {
            threshold_db: -30.0,
            ratio: 2.0,
            floor_db: -40.0,
            attack_ms: 10.0,
            release_ms: 50.0,
            high_pass_hz: 100.0,
            enable_high_pass: true,
            enabled: true,
        }
    }
}

impl NoiseReducerConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("threshold_db", self.threshold_db, -80.0, 0.0)?;
        check_range("ratio", self.ratio, 1.0, 20.0)?;
        check_range("floor_db", self.floor_db, -60.0, 0.0)?;
        check_range("attack_ms", self.attack_ms, 0.1, 100.0)?;
        check_range("release_ms", self.release_ms, 1.0, 1000.0)?;
        check_range("high_pass_hz", self.high_pass_hz, 20.0, 1000.0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    hpf: Biquad,
    env: AttackRelease,
    gain: AttackRelease,
}

pub struct NoiseReducer {
    config: NoiseReducerConfig,
    sample_rate: f32,
    channels: usize,
    states: [ChannelState; 2],
    thresh_lin: f32,
    floor_lin: f32,
    inv_ratio: f32,
}

impl NoiseReducer {
    pub fn new(sample_rate: f32, channels: usize) -> Result<Self> {
        Self::with_config(sample_rate, channels, NoiseReducerConfig::default())
    }

    pub fn with_config(
        sample_rate: f32,
        channels: usize,
        config: NoiseReducerConfig,
    ) -> Result<Self> {
        validate_sample_rate(sample_rate)?;
        if !(1..=2).contains(&channels) {
            return Err(NoiseError::InvalidChannels(channels));
        }
        if let Err(e) = config.validate() {
            warn!("Rejected noise gate config: {}", e);
            return Err(e);
        }

        let state = ChannelState {
            hpf: Biquad::new(),
            env: AttackRelease::new(config.attack_ms, config.release_ms, sample_rate, 0.0),
            gain: AttackRelease::new(1.0, 1.0, sample_rate, 1.0),
        };
        let mut reducer = Self {
            config,
            sample_rate,
            channels,
            states: [state; 2],
            thresh_lin: 1.0,
            floor_lin: 0.0,
            inv_ratio: 1.0,
        };
        reducer.update_coefficients();
        info!(
            "Noise gate initialized: {} Hz, {} channel(s), threshold {:.1} dB",
            sample_rate, channels, config.threshold_db
        );
        Ok(reducer)
    }

    fn update_coefficients(&mut self) {
        let c = self.config;
        let sr = self.sample_rate;
        self.thresh_lin = db_to_lin(c.threshold_db);
        self.floor_lin = db_to_lin(c.floor_db);
        self.inv_ratio = 1.0 / c.ratio;

        let gain_attack = c.attack_ms * GAIN_ATTACK_SCALE;
        let gain_release = c.release_ms.max(MIN_GAIN_RELEASE_MS);
        for st in self.states.iter_mut() {
            st.hpf.update_hpf(c.high_pass_hz, BUTTERWORTH_Q, sr);
            st.env.set_times(c.attack_ms, c.release_ms, sr);
            st.gain.set_times(gain_attack, gain_release, sr);
        }
        debug!(
            "Noise gate coefficients: thresh={:.5} floor={:.5} 1/ratio={:.3}",
            self.thresh_lin, self.floor_lin, self.inv_ratio
        );
    }

    pub fn config(&self) -> &NoiseReducerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: NoiseReducerConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            warn!("Rejected noise gate config: {}", e);
            return Err(e);
        }
        self.config = config;
        self.update_coefficients();
        Ok(())
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) -> Result<()> {
        validate_sample_rate(sample_rate)?;
        if sample_rate == self.sample_rate {
            return Ok(());
        }
        self.sample_rate = sample_rate;
        self.update_coefficients();
        info!("Noise gate sample rate set to {} Hz", sample_rate);
        Ok(())
    }

    pub fn reset(&mut self) {
        for st in self.states.iter_mut() {
            st.hpf.reset();
            st.env.reset(0.0);
            st.gain.reset(1.0);
        }
    }

    /// Smoothed gain currently applied on `channel`.
    pub fn current_gain(&self, channel: usize) -> Option<f32> {
        if channel < self.channels {
            Some(self.states[channel].gain.value())
        } else {
            None
        }
    }

    pub fn process_mono(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        check_len(input.len(), output.len())?;
        if input.is_empty() {
            return Err(NoiseError::EmptyBuffer);
        }
        output.copy_from_slice(input);
        self.process_mono_in_place(output)
    }

    pub fn process_mono_in_place(&mut self, buf: &mut [f32]) -> Result<()> {
        if buf.is_empty() {
            return Err(NoiseError::EmptyBuffer);
        }
        if self.config.enabled {
            self.run_channel(0, buf);
        }
        Ok(())
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
        if self.config.enabled {
            self.run_channel(0, left);
            self.run_channel(1, right);
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

    fn run_channel(&mut self, ch: usize, buf: &mut [f32]) {
        let hp = self.config.enable_high_pass;
        let thresh = self.thresh_lin;
        let floor = self.floor_lin;
        let inv_ratio = self.inv_ratio;
        let st = &mut self.states[ch];

        for x in buf.iter_mut() {
            let s = if hp { st.hpf.process(*x) } else { *x };
            let env = st.env.process(s.abs());

            let target = if env < thresh {
                (env / thresh).powf(inv_ratio).max(floor)
            } else {
                1.0
            };
            let g = st.gain.process(target);
            *x = s * g;
        }
    }
}
