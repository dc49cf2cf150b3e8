//! Biquad Filter (IIR 2nd Order)
//!
//! Second-order recursive filter used as the rumble-removal pre-filter of the
//! time-domain noise gate. Only the high-pass design is needed by the noise
//! core; the equalizer chain that used the other shapes lives elsewhere.
//!
//! # Design Notes
//! - Transposed direct form II, one instance per channel
//! - Coefficient updates do NOT clear the delay line
//! - All operations are safe for the audio thread (no allocations)

use std::f32::consts::PI;

/// Butterworth Q used for the gate's high-pass pre-filter.
pub const BUTTERWORTH_Q: f32 = 0.707;

#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

impl Biquad {
    /// Identity filter.
    pub fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn high_pass(cutoff: f32, q: f32, sr: f32) -> Self {
        let mut f = Self::new();
        f.update_hpf(cutoff, q, sr);
        f
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = input * self.b0 + self.z1;

        // Anti-denormal: tiny DC offset
        self.z1 = input * self.b1 + self.z2 - self.a1 * out + 1e-25;
        self.z2 = input * self.b2 - self.a2 * out + 1e-25;

        out
    }

    /// Clear the delay line; coefficients are kept.
    #[inline]
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// RBJ cookbook high-pass. Cutoff is kept strictly below Nyquist.
    pub fn update_hpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let cutoff = cutoff.clamp(1.0, sr * 0.499);
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let inv_a0 = 1.0 / (1.0 + alpha);

        self.b0 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.b1 = -(1.0 + cw0) * inv_a0;
        self.b2 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.a1 = (-2.0 * cw0) * inv_a0;
        self.a2 = (1.0 - alpha) * inv_a0;
    }
}
