use super::{rate_confidence, Extracted};
use crate::config::{BreathingConfig, DetectorConfig};
use crate::detector::{intervals_ms, DetectedEvent};
use crate::dsp::stats;
use crate::measurement::BreathingPattern;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreathingEstimate {
    pub bpm: f32,
    pub pattern: BreathingPattern,
    /// Mean cycle amplitude.
    pub amplitude: f32,
    pub interval_cv: f32,
    pub confidence: f32,
}

/// Breathing rate and pattern from breath onsets.
///
/// The pattern is irregular when the interval CV exceeds `irregular_cv`;
/// otherwise shallow or deep relative to `amplitude_baseline` (the session's
/// rolling amplitude EMA), else regular. Without a baseline, only regular
/// and irregular are reported.
pub fn estimate_breathing(
    events: &[DetectedEvent],
    amplitude_baseline: Option<f32>,
    snr_score: f32,
    config: &BreathingConfig,
    detector: &DetectorConfig,
) -> Extracted<BreathingEstimate> {
    if events.len() < 2 {
        return Extracted::Insufficient;
    }
    let intervals = intervals_ms(events);
    let Some(mean_ms) = stats::mean(&intervals) else {
        return Extracted::Insufficient;
    };
    if mean_ms <= 0.0 {
        return Extracted::Insufficient;
    }

    let bpm = 60_000.0 / mean_ms;
    if !(detector.min_breathing_bpm..=detector.max_breathing_bpm).contains(&bpm) {
        return Extracted::OutOfRange(bpm);
    }

    let cv = stats::coefficient_of_variation(&intervals).unwrap_or(1.0);
    // The first event's cycle starts at the window edge and may be partial
    let amplitudes: Vec<f32> = if events.len() > 2 {
        events[1..].iter().map(|e| e.amplitude).collect()
    } else {
        events.iter().map(|e| e.amplitude).collect()
    };
    let amplitude = stats::mean(&amplitudes).unwrap_or(0.0);

    let pattern = if cv > config.irregular_cv {
        BreathingPattern::Irregular
    } else {
        match amplitude_baseline.filter(|b| *b > 0.0) {
            Some(base) if amplitude < config.shallow_ratio * base => BreathingPattern::Shallow,
            Some(base) if amplitude > config.deep_ratio * base => BreathingPattern::Deep,
            _ => BreathingPattern::Regular,
        }
    };

    Extracted::Value(BreathingEstimate {
        bpm,
        pattern,
        amplitude,
        interval_cv: cv,
        confidence: rate_confidence(
            cv,
            intervals.len(),
            detector.full_confidence_intervals,
            snr_score,
        ),
    })
}

/// Exponential moving average update for the amplitude baseline.
pub fn update_amplitude_baseline(baseline: Option<f32>, amplitude: f32, alpha: f32) -> Option<f32> {
    if !(amplitude.is_finite() && amplitude > 0.0) {
        return baseline;
    }
    Some(match baseline {
        Some(b) => b + alpha * (amplitude - b),
        None => amplitude,
    })
}
