//! Steady-state processing must not touch the allocator.
//!
//! Every engine is built (allocating freely), warmed up, and then driven
//! inside `assert_no_alloc`, which aborts the test binary on any allocation.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};
use audionr::dsp::advanced::{MultibandParams, TwoStepParams, WienerParams};
use audionr::dsp::imcra::{Imcra, ImcraConfig};
use audionr::dsp::wiener::{GainRule, NoiseEstimator, WienerConfig, WienerFilter};
use audionr::{
    AdvancedConfig, AdvancedSpectralNr, Algorithm, AudioSafetyEngine, NoisePipeline,
    NoiseReducer, PipelineAlgorithm, PipelineConfig, RnNoiseSuppressor, SafetyConfig, SpectralNr,
    SpectralNrConfig,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

const BLOCK: usize = 480;

fn noise(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-0.2..0.2)).collect()
}

#[test]
fn gate_does_not_allocate() {
    let mut gate = NoiseReducer::new(48000.0, 2).unwrap();
    let input = noise(BLOCK, 1);
    let mut l = vec![0.0; BLOCK];
    let mut r = vec![0.0; BLOCK];
    assert_no_alloc(|| {
        for _ in 0..20 {
            gate.process_stereo(&input, &input, &mut l, &mut r).unwrap();
        }
    });
}

#[test]
fn spectral_subtraction_does_not_allocate() {
    let mut nr = SpectralNr::new(SpectralNrConfig::default()).unwrap();
    let mut buf = noise(BLOCK, 2);
    assert_no_alloc(|| {
        for _ in 0..20 {
            nr.process_in_place(&mut buf).unwrap();
        }
    });
}

#[test]
fn rnnoise_does_not_allocate() {
    let mut mono = RnNoiseSuppressor::with_aggressiveness(48000.0, 1, 2.0).unwrap();
    let mut stereo = RnNoiseSuppressor::with_aggressiveness(48000.0, 2, 2.0).unwrap();
    let mut a = noise(BLOCK, 3);
    let mut l = noise(BLOCK, 4);
    let mut r = noise(BLOCK, 5);
    assert_no_alloc(|| {
        for _ in 0..20 {
            mono.process_mono_in_place(&mut a).unwrap();
            stereo.process_stereo_in_place(&mut l, &mut r).unwrap();
        }
    });
}

#[test]
fn imcra_and_wiener_do_not_allocate() {
    let mut imcra = Imcra::new(ImcraConfig::default()).unwrap();
    let n = imcra.num_bins();
    let mut wiener = WienerFilter::new(WienerConfig {
        rule: GainRule::MmseStsa,
        estimator: NoiseEstimator::Imcra,
        use_perceptual_weighting: true,
        ..WienerConfig::default()
    })
    .unwrap();
    let mag: Vec<f32> = noise(n, 6).iter().map(|x| x.abs()).collect();
    let mut noise_out = vec![0.0; n];
    let mut spp = vec![0.0; n];
    let mut out = vec![0.0; n];
    assert_no_alloc(|| {
        for _ in 0..50 {
            imcra.process_frame(&mag, &mut noise_out, &mut spp).unwrap();
            wiener.process_magnitude_phase(&mag, &[], &mut out).unwrap();
        }
    });
}

#[test]
fn advanced_algorithms_do_not_allocate() {
    let algorithms = [
        Algorithm::SpectralSubtraction {
            beta: 1.5,
            floor_gain: 0.05,
        },
        Algorithm::Wiener(WienerParams::default()),
        Algorithm::MmseLsa(WienerParams::default()),
        Algorithm::TwoStep(TwoStepParams::default()),
        Algorithm::Multiband(MultibandParams::default()),
    ];
    for algorithm in algorithms {
        let mut nr = AdvancedSpectralNr::new(AdvancedConfig {
            algorithm,
            ..AdvancedConfig::default()
        })
        .unwrap();
        let mut buf = noise(BLOCK, 7);
        assert_no_alloc(|| {
            for _ in 0..20 {
                nr.process_mono_in_place(&mut buf).unwrap();
            }
        });
    }
}

#[test]
fn safety_does_not_allocate() {
    let mut safety = AudioSafetyEngine::new(SafetyConfig::default()).unwrap();
    let mut l = noise(BLOCK, 8);
    let mut r = noise(BLOCK, 9);
    l[3] = f32::NAN;
    assert_no_alloc(|| {
        safety.process_stereo(&mut l, &mut r).unwrap();
    });
}

#[test]
fn pipeline_does_not_allocate() {
    let algorithms = [
        PipelineAlgorithm::Gate,
        PipelineAlgorithm::SpectralSubtraction,
        PipelineAlgorithm::RnNoise,
        PipelineAlgorithm::Advanced(Algorithm::default()),
    ];
    for algorithm in algorithms {
        let mut p = NoisePipeline::new(PipelineConfig {
            channels: 2,
            algorithm,
            ..PipelineConfig::default()
        })
        .unwrap();
        let mut l = noise(BLOCK, 10);
        let mut r = noise(BLOCK, 11);
        assert_no_alloc(|| {
            for _ in 0..10 {
                p.process_stereo(&mut l, &mut r).unwrap();
            }
        });
        assert!(p.last_safety_report().is_some());
    }
}
