//! Streaming STFT framer (analysis -> per-frame callback -> overlap-add).
//!
//! Accepts arbitrary block sizes. Input samples are staged in a `SampleRing`;
//! each time a full hop is available the analysis buffer slides left by one
//! hop, the hop is appended, and the windowed frame is transformed. The
//! callback edits magnitudes in place (phase is read-only), then the frame is
//! resynthesised and overlap-added.
//!
//! # Latency
//! Output is delayed by exactly `fft_size - hop_size` samples when blocks are
//! whole multiples of `hop_size`. Other block sizes underflow the output ring
//! at startup (silence is emitted), which adds that shortfall once.
//!
//! # Normalisation
//! Each emitted sample is divided by the steady-state sum of
//! `analysis * synthesis` over all frames covering it, so an identity
//! callback reconstructs the input at unity gain.

use crate::dsp::fft::FftEngine;
use crate::dsp::ring::SampleRing;
use crate::dsp::utils::{validate_fft_size, validate_hop_size};
use crate::error::{check_len, Result};

// Positions whose window overlap sums below this are emitted as silence.
const OLA_NORM_MIN: f32 = 1e-3;

pub struct StftFramer {
    fft_size: usize,
    hop_size: usize,
    engine: FftEngine,
    analysis: Vec<f32>,
    synthesis: Vec<f32>,
    inv_norm: Vec<f32>,

    frame: Vec<f32>,
    windowed: Vec<f32>,
    time: Vec<f32>,
    mag: Vec<f32>,
    phase: Vec<f32>,
    overlap: Vec<f32>,

    input: SampleRing,
    output: SampleRing,
    frames: u64,
}

impl StftFramer {
    /// `analysis` and `synthesis` must both be `fft_size` long; pass a
    /// vector of ones for an analysis-only scheme.
    pub fn new(
        fft_size: usize,
        hop_size: usize,
        analysis: Vec<f32>,
        synthesis: Vec<f32>,
    ) -> Result<Self> {
        validate_fft_size(fft_size)?;
        validate_hop_size(hop_size, fft_size)?;
        check_len(fft_size, analysis.len())?;
        check_len(fft_size, synthesis.len())?;

        let mut inv_norm = vec![0.0; hop_size];
        for (i, inv) in inv_norm.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            let mut j = i;
            while j < fft_size {
                sum += analysis[j] * synthesis[j];
                j += hop_size;
            }
            *inv = if sum > OLA_NORM_MIN { 1.0 / sum } else { 0.0 };
        }

        let bins = fft_size / 2 + 1;
        Ok(Self {
            fft_size,
            hop_size,
            engine: FftEngine::new(fft_size)?,
            analysis,
            synthesis,
            inv_norm,
            frame: vec![0.0; fft_size],
            windowed: vec![0.0; fft_size],
            time: vec![0.0; fft_size],
            mag: vec![0.0; bins],
            phase: vec![0.0; bins],
            overlap: vec![0.0; fft_size],
            input: SampleRing::new(2 * hop_size),
            output: SampleRing::new(2 * fft_size),
            frames: 0,
        })
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    #[inline]
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    #[inline]
    pub fn latency(&self) -> usize {
        self.fft_size - self.hop_size
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn reset(&mut self) {
        self.frame.fill(0.0);
        self.overlap.fill(0.0);
        self.input.clear();
        self.output.clear();
        self.frames = 0;
    }

    /// Stream `input` through the framer into `output` (same length). The
    /// callback runs once per completed hop with `(magnitude, phase)` for
    /// bins `[0, fft_size/2]`.
    pub fn process<F>(&mut self, input: &[f32], output: &mut [f32], on_frame: F) -> Result<()>
    where
        F: FnMut(&mut [f32], &[f32]),
    {
        check_len(input.len(), output.len())?;
        output.copy_from_slice(input);
        self.process_in_place(output, on_frame);
        Ok(())
    }

    pub fn process_in_place<F>(&mut self, buf: &mut [f32], mut on_frame: F)
    where
        F: FnMut(&mut [f32], &[f32]),
    {
        let hop = self.hop_size;
        for chunk in buf.chunks_mut(hop) {
            for &x in chunk.iter() {
                self.input.push(x);
            }
            while self.input.len() >= hop {
                self.run_frame(&mut on_frame);
            }
            for y in chunk.iter_mut() {
                *y = self.output.pop_oldest();
            }
        }
    }

    fn run_frame<F>(&mut self, on_frame: &mut F)
    where
        F: FnMut(&mut [f32], &[f32]),
    {
        let n = self.fft_size;
        let hop = self.hop_size;

        self.frame.copy_within(hop..n, 0);
        for i in (n - hop)..n {
            self.frame[i] = self.input.pop_oldest();
        }

        for i in 0..n {
            self.windowed[i] = self.frame[i] * self.analysis[i];
        }
        self.engine
            .forward_polar(&self.windowed, &mut self.mag, &mut self.phase);

        on_frame(&mut self.mag, &self.phase);

        self.engine
            .inverse_polar(&self.mag, &self.phase, &mut self.time);
        for i in 0..n {
            self.overlap[i] += self.time[i] * self.synthesis[i];
        }
        for i in 0..hop {
            self.output.push(self.overlap[i] * self.inv_norm[i]);
        }
        self.overlap.copy_within(hop..n, 0);
        for v in &mut self.overlap[n - hop..] {
            *v = 0.0;
        }
        self.frames += 1;
    }
}
