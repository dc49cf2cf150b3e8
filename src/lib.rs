//! Real-time noise reduction for voice and music capture.
//!
//! The crate is a set of block-processing engines that can be used on their
//! own or chained through [`NoisePipeline`]:
//!
//! - [`NoiseReducer`]: time-domain downward expander with a high-pass pre-filter
//! - [`SpectralNr`]: spectral subtraction with an exponential noise tracker
//! - [`RnNoiseSuppressor`]: gate plus spectral subtraction behind one
//!   aggressiveness knob
//! - [`AdvancedSpectralNr`]: IMCRA noise tracking feeding a selectable gain
//!   rule (subtraction, Wiener, MMSE-LSA, two-step, Bark bands)
//! - [`AudioSafetyEngine`]: NaN scrubbing, DC removal, limiting and a
//!   feedback score
//!
//! Engines are configured once and then fed blocks of `f32` samples. Nothing
//! on the processing path allocates, locks or logs.

pub mod dsp;
pub mod error;
pub mod pipeline;

pub use dsp::{
    AdvancedConfig, AdvancedSpectralNr, Algorithm, AudioSafetyEngine, FftEngine, Imcra, ImcraConfig,
    NoiseReducer, NoiseReducerConfig, RnNoiseSuppressor, SafetyConfig, SafetyReport, SpectralNr,
    SpectralNrConfig, WienerConfig, WienerFilter,
};
pub use error::{NoiseError, Result};
pub use pipeline::{NoisePipeline, NoiseStatistics, PipelineAlgorithm, PipelineConfig};
