//! Real-signal FFT engine.
//!
//! Thin wrapper over a pair of `rustfft` plans (forward + inverse) of one fixed
//! power-of-two size. Spectra are exchanged as split real/imaginary slices of
//! the full length `n` (Hermitian symmetric for real input) and the inverse
//! applies the `1/n` normalisation, so `inverse_c2r(forward_r2c(x)) == x`.
//!
//! All scratch is allocated in `new()`; the transforms themselves never
//! allocate.

use crate::error::{check_len, NoiseError, Result};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

const MAX_ENGINE_SIZE: usize = 65536;

pub struct FftEngine {
    n: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    buf: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    ifft_scratch: Vec<Complex<f32>>,
}

impl FftEngine {
    pub fn new(n: usize) -> Result<Self> {
        if !n.is_power_of_two() || !(2..=MAX_ENGINE_SIZE).contains(&n) {
            return Err(NoiseError::InvalidFftSize(n));
        }
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);
        let fft_scratch_len = fft.get_inplace_scratch_len();
        let ifft_scratch_len = ifft.get_inplace_scratch_len();

        Ok(Self {
            n,
            fft,
            ifft,
            buf: vec![Complex::default(); n],
            fft_scratch: vec![Complex::default(); fft_scratch_len],
            ifft_scratch: vec![Complex::default(); ifft_scratch_len],
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.n / 2 + 1
    }

    /// Forward transform of a real signal into the full split spectrum.
    pub fn forward_r2c(&mut self, time: &[f32], real: &mut [f32], imag: &mut [f32]) -> Result<()> {
        check_len(self.n, time.len())?;
        check_len(self.n, real.len())?;
        check_len(self.n, imag.len())?;

        for (c, &x) in self.buf.iter_mut().zip(time) {
            *c = Complex::new(x, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buf, &mut self.fft_scratch);
        for (i, c) in self.buf.iter().enumerate() {
            real[i] = c.re;
            imag[i] = c.im;
        }
        Ok(())
    }

    /// Inverse transform; only the real part is returned, scaled by `1/n`.
    pub fn inverse_c2r(&mut self, real: &[f32], imag: &[f32], time: &mut [f32]) -> Result<()> {
        check_len(self.n, real.len())?;
        check_len(self.n, imag.len())?;
        check_len(self.n, time.len())?;

        for (i, c) in self.buf.iter_mut().enumerate() {
            *c = Complex::new(real[i], imag[i]);
        }
        self.ifft
            .process_with_scratch(&mut self.buf, &mut self.ifft_scratch);
        let norm = 1.0 / self.n as f32;
        for (t, c) in time.iter_mut().zip(&self.buf) {
            *t = c.re * norm;
        }
        Ok(())
    }

    /// Forward transform straight into magnitude/phase for bins `[0, n/2]`.
    /// `time` must be `n` long, the outputs `n/2 + 1`.
    pub(crate) fn forward_polar(&mut self, time: &[f32], mag: &mut [f32], phase: &mut [f32]) {
        for (c, &x) in self.buf.iter_mut().zip(time) {
            *c = Complex::new(x, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buf, &mut self.fft_scratch);
        for k in 0..mag.len().min(phase.len()) {
            let c = self.buf[k];
            mag[k] = c.norm();
            phase[k] = c.im.atan2(c.re);
        }
    }

    /// Inverse transform from half-spectrum magnitude/phase, rebuilding the
    /// Hermitian half. DC and Nyquist bins are forced real.
    pub(crate) fn inverse_polar(&mut self, mag: &[f32], phase: &[f32], time: &mut [f32]) {
        let n = self.n;
        let nyq = n / 2;
        for k in 0..=nyq {
            self.buf[k] = Complex::from_polar(mag[k], phase[k]);
        }
        self.buf[0].im = 0.0;
        self.buf[nyq].im = 0.0;
        for k in 1..nyq {
            self.buf[n - k] = self.buf[k].conj();
        }
        self.ifft
            .process_with_scratch(&mut self.buf, &mut self.ifft_scratch);
        let norm = 1.0 / n as f32;
        for (t, c) in time.iter_mut().zip(&self.buf) {
            *t = c.re * norm;
        }
    }
}
