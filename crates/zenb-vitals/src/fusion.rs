//! Stress fusion: baseline-relative combination of heart rate, HRV and
//! breathing into a 0-100 score.

use crate::config::{Baseline, FusionConfig};
use crate::measurement::{StressFactor, StressFactorKind, StressLevel, StressSample};

/// A metric value with the confidence it was measured at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionInput {
    pub value: f32,
    pub confidence: f32,
}

impl FusionInput {
    pub fn new(value: f32, confidence: f32) -> Self {
        Self { value, confidence }
    }
}

/// Inputs available on a tick. Absent or zero-confidence inputs are left out
/// of both the weighted sum and its normalisation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FusionInputs {
    pub heart_rate_bpm: Option<FusionInput>,
    pub rmssd_ms: Option<FusionInput>,
    pub breathing_bpm: Option<FusionInput>,
}

#[derive(Debug, Clone)]
pub struct StressFusion {
    config: FusionConfig,
    baseline: Baseline,
}

impl StressFusion {
    pub fn new(config: FusionConfig, baseline: Baseline) -> Self {
        Self { config, baseline }
    }

    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    /// Fuse the available inputs, or `None` when there are none.
    pub fn fuse(&self, ts_us: i64, inputs: &FusionInputs) -> Option<StressSample> {
        let c = &self.config;
        let b = &self.baseline;

        let candidates = [
            (
                StressFactorKind::HrvDepression,
                inputs.rmssd_ms,
                c.hrv_weight,
                inputs
                    .rmssd_ms
                    .map(|i| (b.rmssd_ms - i.value) / b.rmssd_ms),
            ),
            (
                StressFactorKind::HeartRateElevation,
                inputs.heart_rate_bpm,
                c.heart_rate_weight,
                inputs
                    .heart_rate_bpm
                    .map(|i| (i.value - b.heart_rate_bpm) / c.hr_span_bpm),
            ),
            (
                StressFactorKind::BreathingElevation,
                inputs.breathing_bpm,
                c.breathing_weight,
                inputs
                    .breathing_bpm
                    .map(|i| (i.value - b.breathing_bpm) / c.breathing_span_bpm),
            ),
        ];

        let present: Vec<(StressFactorKind, FusionInput, f32, f32)> = candidates
            .into_iter()
            .filter_map(|(kind, input, weight, raw)| {
                let input = input.filter(|i| i.confidence > 0.0 && i.value.is_finite())?;
                let deviation = raw?.clamp(0.0, 1.0);
                (weight > 0.0).then_some((kind, input, weight, deviation))
            })
            .collect();

        let total_weight: f32 = present.iter().map(|(_, _, w, _)| w).sum();
        if present.is_empty() || total_weight <= 0.0 {
            return None;
        }

        let mut score = 0.0f32;
        let mut confidence = 0.0f32;
        let factors: Vec<StressFactor> = present
            .iter()
            .map(|&(kind, input, weight, deviation)| {
                let weight = weight / total_weight;
                let contribution = 100.0 * weight * deviation;
                score += contribution;
                confidence += weight * input.confidence.clamp(0.0, 1.0);
                StressFactor {
                    kind,
                    value: input.value,
                    deviation,
                    weight,
                    contribution,
                }
            })
            .collect();

        let score = score.clamp(0.0, 100.0);
        let level = StressLevel::from_score(score);
        Some(StressSample {
            ts_us,
            score,
            factors,
            level,
            recommendation: level.recommendation().to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fusion() -> StressFusion {
        StressFusion::new(FusionConfig::default(), Baseline::POPULATION)
    }

    fn all(hr: f32, rmssd: f32, br: f32) -> FusionInputs {
        FusionInputs {
            heart_rate_bpm: Some(FusionInput::new(hr, 1.0)),
            rmssd_ms: Some(FusionInput::new(rmssd, 1.0)),
            breathing_bpm: Some(FusionInput::new(br, 1.0)),
        }
    }

    #[test]
    fn at_baseline_is_relaxed() {
        let s = fusion().fuse(0, &all(70.0, 40.0, 14.0)).unwrap();
        assert_relative_eq!(s.score, 0.0);
        assert_eq!(s.level, StressLevel::Relaxed);
        assert_eq!(s.factors.len(), 3);
    }

    #[test]
    fn fully_deviated_is_high() {
        let s = fusion().fuse(0, &all(110.0, 0.0, 30.0)).unwrap();
        assert_relative_eq!(s.score, 100.0, epsilon = 1e-3);
        assert_eq!(s.level, StressLevel::High);
    }

    #[test]
    fn weighted_contributions() {
        // HR +15 bpm → 0.5 deviation, weight 0.3
        let s = fusion().fuse(0, &all(85.0, 40.0, 14.0)).unwrap();
        assert_relative_eq!(s.score, 15.0, epsilon = 1e-3);
        let hr = s
            .factors
            .iter()
            .find(|f| f.kind == StressFactorKind::HeartRateElevation)
            .unwrap();
        assert_relative_eq!(hr.deviation, 0.5, epsilon = 1e-5);
        assert_relative_eq!(hr.contribution, 15.0, epsilon = 1e-3);
    }

    #[test]
    fn missing_input_renormalises() {
        let inputs = FusionInputs {
            heart_rate_bpm: Some(FusionInput::new(100.0, 0.8)),
            rmssd_ms: None,
            breathing_bpm: Some(FusionInput::new(14.0, 0.6)),
        };
        let s = fusion().fuse(0, &inputs).unwrap();
        // HR weight 0.3/0.6 = 0.5, fully elevated
        assert_relative_eq!(s.score, 50.0, epsilon = 1e-3);
        assert_relative_eq!(s.confidence, 0.7, epsilon = 1e-5);
        let weights: f32 = s.factors.iter().map(|f| f.weight).sum();
        assert_relative_eq!(weights, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_confidence_counts_as_missing() {
        let inputs = FusionInputs {
            heart_rate_bpm: Some(FusionInput::new(100.0, 0.0)),
            ..FusionInputs::default()
        };
        assert!(fusion().fuse(0, &inputs).is_none());
        assert!(fusion().fuse(0, &FusionInputs::default()).is_none());
    }

    #[test]
    fn user_baseline_shifts_score() {
        let user = Baseline {
            heart_rate_bpm: 55.0,
            rmssd_ms: 60.0,
            breathing_bpm: 12.0,
        };
        let pop = fusion().fuse(0, &all(70.0, 40.0, 14.0)).unwrap();
        let personal = StressFusion::new(FusionConfig::default(), user)
            .fuse(0, &all(70.0, 40.0, 14.0))
            .unwrap();
        assert!(personal.score > pop.score);
    }

    #[test]
    fn monotone_in_heart_rate() {
        let f = fusion();
        let mut prev = -1.0;
        for hr in (40..=180).step_by(5) {
            let s = f.fuse(0, &all(hr as f32, 35.0, 15.0)).unwrap().score;
            assert!(s >= prev);
            prev = s;
        }
    }
}
