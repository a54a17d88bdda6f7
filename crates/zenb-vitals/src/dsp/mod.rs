//! Signal-processing building blocks.

pub mod biquad;
pub mod spectrum;
pub mod stats;

pub use biquad::{BandpassFilter, Biquad, BiquadCoeffs};
pub use spectrum::{
    dominant_frequency, goertzel_energy_fraction, hamming_window, SpectralPeak, Spectrum,
};
