pub mod advanced;
pub mod biquad;
pub mod envelope;
pub mod fft;
pub mod imcra;
pub mod multiband;
pub mod noise_reducer;
pub mod ring;
pub mod rnnoise;
pub mod safety;
pub mod special;
pub mod spectral_nr;
pub mod stft;
pub mod utils;
pub mod wiener;

pub use advanced::{
    AdvancedConfig, AdvancedSpectralNr, Algorithm, MultibandParams, TwoStepParams, WienerParams,
};
pub use biquad::Biquad;
pub use envelope::AttackRelease;
pub use fft::FftEngine;
pub use imcra::{Imcra, ImcraConfig};
pub use multiband::{BandScale, MultibandConfig, MultibandProcessor};
pub use noise_reducer::{NoiseReducer, NoiseReducerConfig};
pub use ring::SampleRing;
pub use rnnoise::RnNoiseSuppressor;
pub use safety::{AudioSafetyEngine, SafetyConfig, SafetyReport};
pub use spectral_nr::{SpectralNr, SpectralNrConfig};
pub use stft::StftFramer;
pub use wiener::{
    GainRule, NoiseEstimator, ParametricParams, TwoStepConfig, TwoStepNoiseReduction, WienerConfig,
    WienerFilter,
};
