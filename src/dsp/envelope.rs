//! Attack/Release One-Pole Followers
//!
//! The time-domain gate needs two of these per channel: one tracking the
//! rectified signal level and one smoothing the applied gain. Both share the
//! same law `state = coeff * state + (1 - coeff) * target`, with the attack
//! coefficient chosen while the target rises above the state.
//!
//! # Time Constants
//! Coefficients come from `time_constant_coeff`, i.e. the time to decay by
//! 60 dB. A coefficient of 0 follows the target instantly.
//!
//! # Design Notes
//! - **No Allocations**: plain `Copy` state, safe on the audio thread
//! - Coefficients can be re-derived without disturbing the state

use crate::dsp::utils::time_constant_coeff;

// =============================================================================
// Data Structures
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct AttackRelease {
    attack_coeff: f32,
    release_coeff: f32,
    state: f32,
}

impl AttackRelease {
    pub fn new(attack_ms: f32, release_ms: f32, sample_rate: f32, initial: f32) -> Self {
        let mut f = Self {
            attack_coeff: 0.0,
            release_coeff: 0.0,
            state: initial,
        };
        f.set_times(attack_ms, release_ms, sample_rate);
        f
    }

    /// Re-derive both coefficients; the current state is kept.
    pub fn set_times(&mut self, attack_ms: f32, release_ms: f32, sample_rate: f32) {
        self.attack_coeff = time_constant_coeff(attack_ms, sample_rate);
        self.release_coeff = time_constant_coeff(release_ms, sample_rate);
    }

    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        let coeff = if target > self.state {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.state = coeff * self.state + (1.0 - coeff) * target;
        self.state
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.state
    }

    pub fn reset(&mut self, value: f32) {
        self.state = value;
    }
}

// =============================================================================
// Tests
// =============================================================================
