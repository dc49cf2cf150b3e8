//! Top-level processing chain: gate → spectral engine → safety.
//!
//! `PipelineConfig` is the one serialisable document describing the whole
//! chain. Every field has a default, so partial JSON is accepted.
//!
//! # Stereo
//! The gate and the `SpectralSubtraction` / `Advanced` engines run one
//! instance per channel. `RnNoise` keeps its shared mono analysis and writes
//! the same signal to both channels.
//!
//! # Statistics
//! `NoiseStatistics` accumulates from construction (or `reset_statistics`).
//! Levels describe the last block; energy ratios cover everything since the
//! last reset.

use crate::dsp::advanced::{AdvancedConfig, AdvancedSpectralNr, Algorithm};
use crate::dsp::noise_reducer::{NoiseReducer, NoiseReducerConfig};
use crate::dsp::rnnoise::{spectral_config_for, RnNoiseSuppressor};
use crate::dsp::safety::{scrub_non_finite, AudioSafetyEngine, SafetyConfig, SafetyReport};
use crate::dsp::spectral_nr::SpectralNr;
use crate::dsp::utils::{validate_fft_size, validate_hop_size, validate_sample_rate};
use crate::error::{check_len, check_range, NoiseError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

// Input peak treated as certain speech by the level heuristic.
const SPEECH_REFERENCE_PEAK: f32 = 0.1;
// Keeps the energy ratios finite on silence.
const ENERGY_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineAlgorithm {
    /// Time-domain gate only.
    Gate,
    /// Gate followed by `SpectralNr`, depth from `aggressiveness`.
    SpectralSubtraction,
    /// `RnNoiseSuppressor`; its own gate mapping replaces `gate`.
    #[default]
    RnNoise,
    /// Gate followed by `AdvancedSpectralNr`.
    Advanced(Algorithm),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sample_rate: f32,
    pub channels: usize,
    pub algorithm: PipelineAlgorithm,
    pub aggressiveness: f32,
    /// STFT size for `SpectralSubtraction` and `Advanced`. `None` keeps the
    /// engine default; `RnNoise` always uses its own framing.
    pub fft_size: Option<usize>,
    pub hop_size: Option<usize>,
    pub gate: NoiseReducerConfig,
    pub safety: SafetyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            channels: 1,
            algorithm: PipelineAlgorithm::default(),
            aggressiveness: 1.0,
            fft_size: None,
            hop_size: None,
            gate: NoiseReducerConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Field-level checks. Algorithm parameters, and a hop size given
    /// without an FFT size, are checked when the pipeline is built.
    pub fn validate(&self) -> Result<()> {
        validate_sample_rate(self.sample_rate)?;
        if self.channels != 1 && self.channels != 2 {
            return Err(NoiseError::InvalidChannels(self.channels));
        }
        check_range("aggressiveness", self.aggressiveness, 0.0, 3.0)?;
        if let Some(fft_size) = self.fft_size {
            validate_fft_size(fft_size)?;
            if let Some(hop) = self.hop_size {
                validate_hop_size(hop, fft_size)?;
            }
        }
        self.gate.validate()?;
        self.safety.validate()
    }
}

/// Running figures for a `NoisePipeline`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseStatistics {
    /// Peak of the last input block, all channels.
    pub input_level: f32,
    /// Peak of the last output block, all channels.
    pub output_level: f32,
    /// Kept energy over removed energy, in dB.
    pub estimated_snr_db: f32,
    /// Input energy over output energy, in dB. Positive means quieter.
    pub noise_reduction_db: f32,
    /// Blocks processed.
    pub processed_frames: u64,
    /// Samples processed, counting every channel.
    pub processed_samples: u64,
    pub duration_ms: f64,
    /// Mean IMCRA presence for `Advanced`, an input-level estimate otherwise.
    pub speech_probability: f32,
    /// `input_level - output_level`, floored at zero.
    pub musical_noise_level: f32,
}

fn ratio_db(num: f64, den: f64) -> f32 {
    (10.0 * ((num + ENERGY_FLOOR) / (den + ENERGY_FLOOR)).log10()) as f32
}

fn peak_and_energy(buf: &[f32]) -> (f32, f64) {
    buf.iter().fold((0.0f32, 0.0f64), |(peak, energy), &x| {
        (peak.max(x.abs()), energy + (x as f64) * (x as f64))
    })
}

enum Stage {
    GateOnly,
    /// One engine per channel.
    Subtraction(Vec<SpectralNr>),
    Advanced(Vec<AdvancedSpectralNr>),
    RnNoise(RnNoiseSuppressor),
}

impl Stage {
    fn build(config: &PipelineConfig) -> Result<Self> {
        let sr = config.sample_rate;
        let ch = config.channels;
        Ok(match config.algorithm {
            PipelineAlgorithm::Gate => Stage::GateOnly,
            PipelineAlgorithm::SpectralSubtraction => {
                let mut spectral = spectral_config_for(config.aggressiveness, sr);
                spectral.fft_size = config.fft_size.unwrap_or(spectral.fft_size);
                spectral.hop_size = config.hop_size.unwrap_or(spectral.hop_size);
                let engines = (0..ch)
                    .map(|_| SpectralNr::new(spectral))
                    .collect::<Result<Vec<_>>>()?;
                Stage::Subtraction(engines)
            }
            PipelineAlgorithm::Advanced(algorithm) => {
                let defaults = AdvancedConfig::default();
                let advanced = AdvancedConfig {
                    sample_rate: sr,
                    fft_size: config.fft_size.unwrap_or(defaults.fft_size),
                    hop_size: config.hop_size.unwrap_or(defaults.hop_size),
                    algorithm,
                    aggressiveness: config.aggressiveness,
                    ..defaults
                };
                let engines = (0..ch)
                    .map(|_| AdvancedSpectralNr::new(advanced))
                    .collect::<Result<Vec<_>>>()?;
                Stage::Advanced(engines)
            }
            PipelineAlgorithm::RnNoise => Stage::RnNoise(
                RnNoiseSuppressor::with_aggressiveness(sr, ch, config.aggressiveness)?,
            ),
        })
    }

    fn latency(&self) -> usize {
        match self {
            Stage::GateOnly => 0,
            Stage::Subtraction(s) => s.first().map_or(0, |e| e.latency()),
            Stage::Advanced(a) => a.first().map_or(0, |e| e.latency()),
            Stage::RnNoise(r) => r.latency(),
        }
    }

    /// Spectral part for one channel; `RnNoise` runs its gate here too.
    fn process_channel(&mut self, ch: usize, buf: &mut [f32]) -> Result<()> {
        match self {
            Stage::GateOnly => Ok(()),
            Stage::Subtraction(s) => match s.get_mut(ch) {
                Some(e) => e.process_in_place(buf),
                None => Err(NoiseError::InvalidChannels(ch + 1)),
            },
            Stage::Advanced(a) => match a.get_mut(ch) {
                Some(e) => e.process_mono_in_place(buf),
                None => Err(NoiseError::InvalidChannels(ch + 1)),
            },
            Stage::RnNoise(r) => r.process_mono_in_place(buf),
        }
    }

    fn reset(&mut self) {
        match self {
            Stage::GateOnly => {}
            Stage::Subtraction(s) => s.iter_mut().for_each(|e| e.reset()),
            Stage::Advanced(a) => a.iter_mut().for_each(|e| e.reset()),
            Stage::RnNoise(r) => r.reset(),
        }
    }

    /// IMCRA presence averaged over bins and channels, when tracked.
    fn speech_presence(&self) -> Option<f32> {
        let Stage::Advanced(engines) = self else {
            return None;
        };
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for e in engines {
            sum += e.speech_presence().iter().sum::<f32>();
            count += e.speech_presence().len();
        }
        (count > 0).then(|| sum / count as f32)
    }
}

pub struct NoisePipeline {
    config: PipelineConfig,
    /// Absent when the stage carries its own gate.
    gate: Option<NoiseReducer>,
    stage: Stage,
    safety: AudioSafetyEngine,
    last_report: Option<SafetyReport>,
    stats: NoiseStatistics,
    input_energy: f64,
    output_energy: f64,
}

impl NoisePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            warn!("Rejected pipeline config: {}", e);
            return Err(e);
        }
        let sr = config.sample_rate;
        let ch = config.channels;

        let gate = match config.algorithm {
            PipelineAlgorithm::RnNoise => None,
            _ => Some(NoiseReducer::with_config(sr, ch, config.gate)?),
        };
        let stage = Stage::build(&config)?;
        let safety = AudioSafetyEngine::new(config.safety)?;

        info!(
            "Noise pipeline initialized: {} Hz, {} channel(s), {:?}, latency {} samples",
            sr,
            ch,
            config.algorithm,
            stage.latency()
        );
        Ok(Self {
            config,
            gate,
            stage,
            safety,
            last_report: None,
            stats: NoiseStatistics::default(),
            input_energy: 0.0,
            output_energy: 0.0,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Rebuilds the chain and clears the statistics. On error the running
    /// chain is untouched.
    pub fn set_config(&mut self, config: PipelineConfig) -> Result<()> {
        *self = Self::new(config)?;
        Ok(())
    }

    pub fn latency(&self) -> usize {
        self.stage.latency()
    }

    pub fn last_safety_report(&self) -> Option<&SafetyReport> {
        self.last_report.as_ref()
    }

    pub fn statistics(&self) -> &NoiseStatistics {
        &self.stats
    }

    pub fn reset_statistics(&mut self) {
        self.stats = NoiseStatistics::default();
        self.input_energy = 0.0;
        self.output_energy = 0.0;
    }

    pub fn process_mono(&mut self, buf: &mut [f32]) -> Result<()> {
        if self.config.channels != 1 {
            return Err(NoiseError::InvalidChannels(self.config.channels));
        }
        if buf.is_empty() {
            return Err(NoiseError::EmptyBuffer);
        }
        // Recursive state upstream would never recover from a NaN.
        let had_nan = scrub_non_finite(buf);
        let input = peak_and_energy(buf);

        if let Some(gate) = self.gate.as_mut() {
            gate.process_mono_in_place(buf)?;
        }
        self.stage.process_channel(0, buf)?;

        let mut report = self.safety.process_mono(buf)?;
        report.has_nan |= had_nan;
        self.last_report = Some(report);
        self.update_statistics(input, peak_and_energy(buf), buf.len(), 1);
        Ok(())
    }

    pub fn process_stereo(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<()> {
        if self.config.channels != 2 {
            return Err(NoiseError::InvalidChannels(self.config.channels));
        }
        check_len(left.len(), right.len())?;
        if left.is_empty() {
            return Err(NoiseError::EmptyBuffer);
        }
        let had_nan = scrub_non_finite(left) | scrub_non_finite(right);
        let input = merge_levels(peak_and_energy(left), peak_and_energy(right));

        match &mut self.stage {
            Stage::RnNoise(r) => r.process_stereo_in_place(left, right)?,
            stage => {
                if let Some(gate) = self.gate.as_mut() {
                    gate.process_stereo_in_place(left, right)?;
                }
                stage.process_channel(0, left)?;
                stage.process_channel(1, right)?;
            }
        }

        let mut report = self.safety.process_stereo(left, right)?;
        report.has_nan |= had_nan;
        self.last_report = Some(report);
        let output = merge_levels(peak_and_energy(left), peak_and_energy(right));
        self.update_statistics(input, output, left.len(), 2);
        Ok(())
    }

    fn update_statistics(
        &mut self,
        (in_peak, in_energy): (f32, f64),
        (out_peak, out_energy): (f32, f64),
        frames: usize,
        channels: usize,
    ) {
        self.input_energy += in_energy;
        self.output_energy += out_energy;
        let removed = (self.input_energy - self.output_energy).max(0.0);

        let s = &mut self.stats;
        s.input_level = in_peak;
        s.output_level = out_peak;
        s.estimated_snr_db = ratio_db(self.output_energy, removed);
        s.noise_reduction_db = ratio_db(self.input_energy, self.output_energy);
        s.processed_frames += 1;
        s.processed_samples += (frames * channels) as u64;
        s.duration_ms += frames as f64 * 1000.0 / self.config.sample_rate as f64;
        s.speech_probability = self
            .stage
            .speech_presence()
            .unwrap_or_else(|| (in_peak / SPEECH_REFERENCE_PEAK).min(1.0));
        s.musical_noise_level = (in_peak - out_peak).max(0.0);
    }

    /// Clears processing state. Statistics are kept; see
    /// `reset_statistics`.
    pub fn reset(&mut self) {
        if let Some(gate) = self.gate.as_mut() {
            gate.reset();
        }
        self.stage.reset();
        self.last_report = None;
    }
}

fn merge_levels(a: (f32, f64), b: (f32, f64)) -> (f32, f64) {
    (a.0.max(b.0), a.1 + b.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::advanced::WienerParams;
    use crate::dsp::utils::frame_rms;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn noise(len: usize, seed: u64, amp: f32) -> Vec<f32> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-amp..amp)).collect()
    }

    fn all_algorithms() -> Vec<PipelineAlgorithm> {
        vec![
            PipelineAlgorithm::Gate,
            PipelineAlgorithm::SpectralSubtraction,
            PipelineAlgorithm::RnNoise,
            PipelineAlgorithm::Advanced(Algorithm::MmseLsa(WienerParams::default())),
        ]
    }

    #[test]
    fn test_json_round_trip() {
        let config = PipelineConfig {
            channels: 2,
            algorithm: PipelineAlgorithm::Advanced(Algorithm::SpectralSubtraction {
                beta: 2.0,
                floor_gain: 0.05,
            }),
            aggressiveness: 2.5,
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(PipelineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "channels": 2, "gate": { "threshold_db": -50.0 } }"#;
        let config = PipelineConfig::from_json(json).unwrap();
        assert_eq!(config.channels, 2);
        assert_eq!(config.gate.threshold_db, -50.0);
        assert_eq!(config.gate.ratio, NoiseReducerConfig::default().ratio);
        assert_eq!(config.algorithm, PipelineAlgorithm::RnNoise);
        assert_eq!(config.safety, SafetyConfig::default());

        let config = PipelineConfig::from_json(r#"{ "algorithm": "gate" }"#).unwrap();
        assert_eq!(config.algorithm, PipelineAlgorithm::Gate);
    }

    #[test]
    fn test_bad_json_is_rejected() {
        assert!(matches!(
            PipelineConfig::from_json("{ not json"),
            Err(NoiseError::Json(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json(r#"{ "channels": 3 }"#),
            Err(NoiseError::InvalidChannels(3))
        ));
        assert!(PipelineConfig::from_json(r#"{ "aggressiveness": 4.0 }"#).is_err());
    }

    #[test]
    fn test_every_algorithm_runs_mono() {
        for algorithm in all_algorithms() {
            let mut p = NoisePipeline::new(PipelineConfig {
                algorithm,
                ..Default::default()
            })
            .unwrap();
            let input = noise(48000, 8, 0.02);
            let mut out = input.clone();
            for chunk in out.chunks_mut(480) {
                p.process_mono(chunk).unwrap();
            }
            assert!(out.iter().all(|x| x.is_finite() && x.abs() <= 1.0));
            assert!(
                frame_rms(&out[24000..]) < frame_rms(&input[24000..]),
                "{:?}",
                algorithm
            );
            assert!(p.last_safety_report().is_some());
        }
    }

    #[test]
    fn test_rnnoise_stereo_outputs_match() {
        let mut p = NoisePipeline::new(PipelineConfig {
            channels: 2,
            algorithm: PipelineAlgorithm::RnNoise,
            ..Default::default()
        })
        .unwrap();
        let mut l = noise(9600, 1, 0.1);
        let mut r = noise(9600, 2, 0.1);
        p.process_stereo(&mut l, &mut r).unwrap();
        assert!(l.iter().all(|x| x.is_finite()));
        assert_eq!(l, r);
    }

    #[test]
    fn test_stereo_channels_are_processed_separately() {
        for algorithm in all_algorithms() {
            if algorithm == PipelineAlgorithm::RnNoise {
                continue;
            }
            let mut p = NoisePipeline::new(PipelineConfig {
                channels: 2,
                algorithm,
                ..Default::default()
            })
            .unwrap();
            let input = noise(9600, 1, 0.1);
            let mut l = input.clone();
            let mut r = vec![0.0; input.len()];
            for (lc, rc) in l.chunks_mut(480).zip(r.chunks_mut(480)) {
                p.process_stereo(lc, rc).unwrap();
            }
            assert!(l.iter().any(|x| x.abs() > 1e-3), "{:?}", algorithm);
            assert!(r.iter().all(|x| x.abs() < 1e-6), "{:?} leaked into R", algorithm);

            // Same input on both sides gives the same output on both sides.
            let mut mono = NoisePipeline::new(PipelineConfig {
                algorithm,
                ..Default::default()
            })
            .unwrap();
            let mut stereo = NoisePipeline::new(PipelineConfig {
                channels: 2,
                algorithm,
                ..Default::default()
            })
            .unwrap();
            let mut m = input.clone();
            let mut l = input.clone();
            let mut r = input.clone();
            let blocks = m
                .chunks_mut(480)
                .zip(l.chunks_mut(480))
                .zip(r.chunks_mut(480));
            for ((mc, lc), rc) in blocks {
                mono.process_mono(mc).unwrap();
                stereo.process_stereo(lc, rc).unwrap();
            }
            assert_eq!(l, r, "{:?}", algorithm);
            assert_eq!(l, m, "{:?}", algorithm);
        }
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let mut mono = NoisePipeline::new(PipelineConfig::default()).unwrap();
        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        assert!(matches!(
            mono.process_stereo(&mut l, &mut r),
            Err(NoiseError::InvalidChannels(1))
        ));
        let mut stereo = NoisePipeline::new(PipelineConfig {
            channels: 2,
            ..Default::default()
        })
        .unwrap();
        assert!(stereo.process_mono(&mut l).is_err());
    }

    #[test]
    fn test_nan_input_reported_and_silenced() {
        let mut p = NoisePipeline::new(PipelineConfig::default()).unwrap();
        let mut buf = vec![0.0; 512];
        buf[7] = f32::NAN;
        p.process_mono(&mut buf).unwrap();
        assert!(p.last_safety_report().unwrap().has_nan);
        assert!(buf.iter().all(|x| x.is_finite()));

        let mut clean = noise(512, 3, 0.1);
        p.process_mono(&mut clean).unwrap();
        assert!(!p.last_safety_report().unwrap().has_nan);
        assert!(clean.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_set_config_is_all_or_nothing() {
        let mut p = NoisePipeline::new(PipelineConfig::default()).unwrap();
        let before = *p.config();
        let bad = PipelineConfig {
            algorithm: PipelineAlgorithm::Advanced(Algorithm::SpectralSubtraction {
                beta: 9.0,
                floor_gain: 0.05,
            }),
            ..Default::default()
        };
        assert!(p.set_config(bad).is_err());
        assert_eq!(*p.config(), before);
        assert_eq!(p.latency(), 1024 - 256);

        p.set_config(PipelineConfig {
            algorithm: PipelineAlgorithm::Advanced(Algorithm::default()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(p.latency(), 2048 - 512);
    }

    #[test]
    fn test_gate_only_has_no_latency() {
        let p = NoisePipeline::new(PipelineConfig {
            algorithm: PipelineAlgorithm::Gate,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(p.latency(), 0);
    }

    #[test]
    fn test_fft_size_reaches_spectral_engines() {
        for algorithm in [
            PipelineAlgorithm::SpectralSubtraction,
            PipelineAlgorithm::Advanced(Algorithm::default()),
        ] {
            let p = NoisePipeline::new(PipelineConfig {
                algorithm,
                fft_size: Some(512),
                hop_size: Some(128),
                ..Default::default()
            })
            .unwrap();
            assert_eq!(p.latency(), 512 - 128, "{:?}", algorithm);
        }
        // RnNoise keeps its own framing.
        let p = NoisePipeline::new(PipelineConfig {
            fft_size: Some(512),
            hop_size: Some(128),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(p.latency(), 1024 - 256);

        let bad = PipelineConfig {
            fft_size: Some(500),
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(NoiseError::InvalidFftSize(500)));
        let bad = PipelineConfig {
            fft_size: Some(256),
            hop_size: Some(512),
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let json = r#"{ "fft_size": 4096, "hop_size": 1024 }"#;
        let config = PipelineConfig::from_json(json).unwrap();
        assert_eq!(config.fft_size, Some(4096));
        assert_eq!(config.hop_size, Some(1024));
    }

    #[test]
    fn test_statistics_count_blocks_and_samples() {
        let mut p = NoisePipeline::new(PipelineConfig {
            channels: 2,
            algorithm: PipelineAlgorithm::Gate,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(*p.statistics(), NoiseStatistics::default());

        let mut l = noise(4800, 4, 0.1);
        let mut r = noise(4800, 5, 0.1);
        for (lc, rc) in l.chunks_mut(480).zip(r.chunks_mut(480)) {
            p.process_stereo(lc, rc).unwrap();
        }
        let s = *p.statistics();
        assert_eq!(s.processed_frames, 10);
        assert_eq!(s.processed_samples, 9600);
        assert!((s.duration_ms - 100.0).abs() < 1e-9);
        assert!(s.input_level > 0.0 && s.input_level <= 0.1);
        assert!((0.0..=1.0).contains(&s.speech_probability));

        p.reset_statistics();
        assert_eq!(*p.statistics(), NoiseStatistics::default());
    }

    #[test]
    fn test_statistics_report_noise_reduction() {
        for algorithm in all_algorithms() {
            let mut p = NoisePipeline::new(PipelineConfig {
                algorithm,
                ..Default::default()
            })
            .unwrap();
            let mut buf = noise(48000, 6, 0.02);
            for chunk in buf.chunks_mut(480) {
                p.process_mono(chunk).unwrap();
            }
            let s = *p.statistics();
            assert!(s.noise_reduction_db > 1.0, "{:?}: {:?}", algorithm, s);
            assert!(s.estimated_snr_db.is_finite());
            assert!((0.0..=1.0).contains(&s.speech_probability));
            assert!(s.musical_noise_level >= 0.0);
            assert_eq!(s.musical_noise_level, (s.input_level - s.output_level).max(0.0));
        }
    }

    #[test]
    fn test_statistics_survive_reset_but_not_set_config() {
        let mut p = NoisePipeline::new(PipelineConfig::default()).unwrap();
        let mut buf = noise(480, 7, 0.1);
        p.process_mono(&mut buf).unwrap();
        p.reset();
        assert_eq!(p.statistics().processed_frames, 1);
        assert!(p.last_safety_report().is_none());

        p.set_config(PipelineConfig::default()).unwrap();
        assert_eq!(p.statistics().processed_frames, 0);
    }

    #[test]
    fn test_silence_gives_finite_statistics() {
        let mut p = NoisePipeline::new(PipelineConfig::default()).unwrap();
        let mut buf = vec![0.0; 480];
        p.process_mono(&mut buf).unwrap();
        let s = p.statistics();
        assert_eq!(s.noise_reduction_db, 0.0);
        assert!(s.estimated_snr_db.is_finite());
        assert_eq!(s.speech_probability, 0.0);
    }
}
