use super::{rate_confidence, Extracted};
use crate::config::DetectorConfig;
use crate::detector::{intervals_ms, DetectedEvent};
use crate::dsp::stats;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartRateEstimate {
    pub bpm: f32,
    pub confidence: f32,
    pub interval_count: usize,
    /// Coefficient of variation of the inter-beat intervals.
    pub interval_cv: f32,
}

/// Heart rate from the mean inter-peak interval.
///
/// Needs at least two peaks. Rates outside `[min_heart_bpm, max_heart_bpm]`
/// come back as [`Extracted::OutOfRange`].
pub fn estimate_heart_rate(
    peaks: &[DetectedEvent],
    snr_score: f32,
    config: &DetectorConfig,
) -> Extracted<HeartRateEstimate> {
    if peaks.len() < 2 {
        return Extracted::Insufficient;
    }
    let intervals = intervals_ms(peaks);
    let Some(mean_ms) = stats::mean(&intervals) else {
        return Extracted::Insufficient;
    };
    if mean_ms <= 0.0 {
        return Extracted::Insufficient;
    }

    let bpm = 60_000.0 / mean_ms;
    if !(config.min_heart_bpm..=config.max_heart_bpm).contains(&bpm) {
        return Extracted::OutOfRange(bpm);
    }

    let cv = stats::coefficient_of_variation(&intervals).unwrap_or(1.0);
    Extracted::Value(HeartRateEstimate {
        bpm,
        confidence: rate_confidence(
            cv,
            intervals.len(),
            config.full_confidence_intervals,
            snr_score,
        ),
        interval_count: intervals.len(),
        interval_cv: cv,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn beats(times_ms: &[i64]) -> Vec<DetectedEvent> {
        times_ms
            .iter()
            .enumerate()
            .map(|(i, &t)| DetectedEvent {
                index: i,
                ts_us: t * 1000,
                amplitude: 1.0,
            })
            .collect()
    }

    #[test]
    fn regular_beats() {
        let peaks = beats(&[0, 1000, 2000, 3000, 4000]);
        let est = estimate_heart_rate(&peaks, 1.0, &DetectorConfig::default())
            .value()
            .unwrap();
        assert_relative_eq!(est.bpm, 60.0, epsilon = 1e-3);
        assert_relative_eq!(est.confidence, 1.0, epsilon = 1e-6);
        assert_eq!(est.interval_count, 4);
    }

    #[test]
    fn fewer_than_two_peaks_is_insufficient() {
        let cfg = DetectorConfig::default();
        assert_eq!(estimate_heart_rate(&[], 1.0, &cfg), Extracted::Insufficient);
        assert_eq!(estimate_heart_rate(&beats(&[0]), 1.0, &cfg), Extracted::Insufficient);
    }

    #[test]
    fn implausible_rate_is_flagged() {
        let cfg = DetectorConfig::default();
        match estimate_heart_rate(&beats(&[0, 3000, 6000]), 1.0, &cfg) {
            Extracted::OutOfRange(bpm) => assert_relative_eq!(bpm, 20.0, epsilon = 1e-3),
            other => panic!("expected out of range, got {other:?}"),
        }
    }

    #[test]
    fn confidence_scales_with_count_regularity_and_snr() {
        let cfg = DetectorConfig::default();
        let two = estimate_heart_rate(&beats(&[0, 800]), 1.0, &cfg).value().unwrap();
        assert_relative_eq!(two.confidence, 1.0 / 3.0, epsilon = 1e-5);

        let irregular = estimate_heart_rate(&beats(&[0, 600, 1600, 2200, 3200]), 1.0, &cfg)
            .value()
            .unwrap();
        assert!(irregular.confidence < 0.9);

        let noisy = estimate_heart_rate(&beats(&[0, 1000, 2000, 3000]), 0.4, &cfg).value().unwrap();
        assert_relative_eq!(noisy.confidence, 0.4, epsilon = 1e-5);
    }
}
