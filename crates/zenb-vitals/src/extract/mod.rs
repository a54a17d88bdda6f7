//! Metric extractors.
//!
//! Every extractor is a pure function of detected events (or a window) and
//! configuration. None of them log or allocate state between calls; the
//! session decides what to emit.

pub mod breathing;
pub mod heart_rate;
pub mod hrv;
pub mod spo2;

pub use breathing::{estimate_breathing, BreathingEstimate};
pub use heart_rate::{estimate_heart_rate, HeartRateEstimate};
pub use hrv::{compute_hrv, frequency_domain, HrvMetrics};
pub use spo2::{estimate_spo2, Spo2Estimate};

/// Result of a metric extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Value(T),
    /// Not enough events or samples; try again on a later tick.
    Insufficient,
    /// A value was computed but lies outside physiological bounds.
    OutOfRange(f32),
}

impl<T> Extracted<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Extracted::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Extracted::Value(_))
    }
}

/// Regularity × count × SNR confidence shared by the rate extractors.
pub(crate) fn rate_confidence(
    cv: f32,
    intervals: usize,
    full_intervals: usize,
    snr_score: f32,
) -> f32 {
    let regularity = (1.0 - cv).clamp(0.0, 1.0);
    let count = (intervals as f32 / full_intervals.max(1) as f32).min(1.0);
    (regularity * count * snr_score.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}
