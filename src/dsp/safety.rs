//! Output Safety Stage
//!
//! # Perceptual Contract
//! - **Target Source**: Final output of the noise-reduction chain.
//! - **Intended Effect**: Never hand the host a sample that is non-finite,
//!   offset, or above the ceiling.
//! - **Failure Modes**:
//!   - Audible flattening if the chain upstream is driven far past the ceiling.
//!   - Tonal music can raise the feedback score; it is a hint, not a verdict.
//! - **Will Not Do**:
//!   - Smooth gain over time (the limiter law is instantaneous).
//!   - Act on detected feedback (it is only reported).
//!
//! # Lifecycle
//! - **Active**: Scrub, measure, remove DC, limit, score feedback.
//! - **Disabled**: Measures and reports, leaves the buffer untouched.

use crate::dsp::utils::{db_to_lin, lin_to_db};
use crate::error::{check_len, check_range, NoiseError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

const FEEDBACK_MIN_LAG: usize = 32;
const FEEDBACK_MAX_LAG: usize = 512;
// Below this energy the correlation is meaningless.
const FEEDBACK_MIN_ENERGY: f32 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub enabled: bool,
    pub dc_removal_enabled: bool,
    /// Block mean above which DC is removed.
    pub dc_threshold: f32,
    pub limiter_enabled: bool,
    pub limiter_threshold_db: f32,
    pub soft_knee_limiter: bool,
    pub knee_db: f32,
    pub feedback_detect_enabled: bool,
    pub feedback_threshold: f32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dc_removal_enabled: true,
            dc_threshold: 0.002,
            limiter_enabled: true,
            limiter_threshold_db: -1.0,
            soft_knee_limiter: true,
            knee_db: 6.0,
            feedback_detect_enabled: true,
            feedback_threshold: 0.95,
        }
    }
}

impl SafetyConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("dc_threshold", self.dc_threshold, 0.0, 0.05)?;
        check_range("limiter_threshold_db", self.limiter_threshold_db, -20.0, 0.0)?;
        check_range("knee_db", self.knee_db, 0.0, 24.0)?;
        check_range("feedback_threshold", self.feedback_threshold, 0.0, 1.0)?;
        Ok(())
    }
}

/// Measurements of one processed block. Level figures describe the block as
/// it arrived (after NaN scrubbing), before any correction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub peak: f32,
    pub rms: f32,
    pub dc_offset: f32,
    /// Samples at or beyond full scale.
    pub clipped_samples: usize,
    /// The limiter reduced at least one sample.
    pub overload_active: bool,
    pub feedback_score: f32,
    pub feedback_likely: bool,
    pub has_nan: bool,
}

impl SafetyReport {
    /// Combines the reports of two channels of the same block.
    pub fn merge(&self, other: &SafetyReport) -> SafetyReport {
        SafetyReport {
            peak: self.peak.max(other.peak),
            rms: (0.5 * (self.rms * self.rms + other.rms * other.rms)).sqrt(),
            dc_offset: 0.5 * (self.dc_offset + other.dc_offset),
            clipped_samples: self.clipped_samples + other.clipped_samples,
            overload_active: self.overload_active || other.overload_active,
            feedback_score: self.feedback_score.max(other.feedback_score),
            feedback_likely: self.feedback_likely || other.feedback_likely,
            has_nan: self.has_nan || other.has_nan,
        }
    }
}

/// Replaces NaN and infinities with silence. Returns whether any were found.
pub fn scrub_non_finite(buf: &mut [f32]) -> bool {
    let mut found = false;
    for x in buf.iter_mut() {
        if !x.is_finite() {
            *x = 0.0;
            found = true;
        }
    }
    found
}

/// Soft-knee gain in dB for a level `over_db` above the threshold.
fn knee_reduction_db(over_db: f32, knee_db: f32) -> f32 {
    if knee_db <= 0.0 {
        return over_db.max(0.0);
    }
    if over_db <= -knee_db * 0.5 {
        0.0
    } else if over_db >= knee_db * 0.5 {
        over_db
    } else {
        let x = over_db + knee_db * 0.5;
        (x * x) / (2.0 * knee_db)
    }
}

/// Highest normalised autocorrelation over the feedback lag range.
fn feedback_score(buf: &[f32]) -> f32 {
    let max_lag = FEEDBACK_MAX_LAG.min(buf.len().saturating_sub(1));
    let mut best = 0.0f32;
    for lag in FEEDBACK_MIN_LAG..=max_lag {
        let a = &buf[..buf.len() - lag];
        let b = &buf[lag..];
        let mut xy = 0.0f32;
        let mut xx = 0.0f32;
        let mut yy = 0.0f32;
        for (&x, &y) in a.iter().zip(b) {
            xy += x * y;
            xx += x * x;
            yy += y * y;
        }
        let energy = (xx * yy).sqrt();
        if energy > FEEDBACK_MIN_ENERGY {
            best = best.max(xy / energy);
        }
    }
    best.clamp(0.0, 1.0)
}

pub struct AudioSafetyEngine {
    config: SafetyConfig,
}

impl AudioSafetyEngine {
    pub fn new(config: SafetyConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            warn!("Rejected safety config: {}", e);
            return Err(e);
        }
        info!(
            "Safety stage initialized: limiter {} dBFS (knee {} dB), dc {}",
            config.limiter_threshold_db, config.knee_db, config.dc_threshold
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SafetyConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            warn!("Rejected safety config: {}", e);
            return Err(e);
        }
        self.config = config;
        Ok(())
    }

    pub fn process_mono(&mut self, buf: &mut [f32]) -> Result<SafetyReport> {
        if buf.is_empty() {
            return Err(NoiseError::EmptyBuffer);
        }
        let c = self.config;
        let mut report = SafetyReport::default();

        if c.enabled {
            report.has_nan = scrub_non_finite(buf);
        } else {
            report.has_nan = buf.iter().any(|x| !x.is_finite());
        }

        let mut sum = 0.0f32;
        let mut sum_sq = 0.0f32;
        for &x in buf.iter() {
            let a = x.abs();
            // max() drops NaN when the stage is disabled
            report.peak = report.peak.max(a);
            if a >= 1.0 {
                report.clipped_samples += 1;
            }
            if x.is_finite() {
                sum += x;
                sum_sq += x * x;
            }
        }
        let n = buf.len() as f32;
        report.dc_offset = sum / n;
        report.rms = (sum_sq / n).sqrt();

        if !c.enabled {
            return Ok(report);
        }

        if c.dc_removal_enabled && report.dc_offset.abs() > c.dc_threshold {
            let dc = report.dc_offset;
            for x in buf.iter_mut() {
                *x -= dc;
            }
        }

        if c.feedback_detect_enabled {
            report.feedback_score = feedback_score(buf);
            report.feedback_likely = report.feedback_score >= c.feedback_threshold;
        }

        if c.limiter_enabled {
            let ceiling = db_to_lin(c.limiter_threshold_db);
            let knee = if c.soft_knee_limiter { c.knee_db } else { 0.0 };
            for x in buf.iter_mut() {
                let over_db = lin_to_db(x.abs()) - c.limiter_threshold_db;
                let red = knee_reduction_db(over_db, knee);
                if red > 0.0 {
                    *x *= db_to_lin(-red);
                    report.overload_active = true;
                }
                // Rounding in the dB round trip can leave a hair over.
                *x = x.clamp(-ceiling, ceiling);
            }
        }

        Ok(report)
    }

    pub fn process_stereo(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<SafetyReport> {
        check_len(left.len(), right.len())?;
        let l = self.process_mono(left)?;
        let r = self.process_mono(right)?;
        Ok(l.merge(&r))
    }
}
