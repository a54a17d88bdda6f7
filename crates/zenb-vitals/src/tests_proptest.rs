use proptest::prelude::*;

/// Property-based tests for pipeline invariants under random inputs.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ChannelKind, Sample, SampleBuffer};
    use crate::conditioner::SignalConditioner;
    use crate::config::{
        Band, Baseline, ConditionerConfig, DetectorConfig, FusionConfig, HrvConfig, MotionConfig,
        QualityConfig,
    };
    use crate::detector::detect_peaks;
    use crate::dsp::BandpassFilter;
    use crate::extract::{compute_hrv, estimate_heart_rate, Extracted};
    use crate::fusion::{FusionInput, FusionInputs, StressFusion};
    use crate::quality::QualityScorer;

    // =========================================================================
    // Conditioner output stays aligned with its input
    // =========================================================================
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn conditioned_length_matches_input(
            raw in prop::collection::vec(prop_oneof![
                8 => -1000.0f32..1000.0,
                1 => Just(f32::NAN),
                1 => Just(f32::INFINITY),
            ], 0..400),
            outliers in any::<bool>(),
        ) {
            let cfg = ConditionerConfig {
                outlier_rejection: outliers,
                ..ConditionerConfig::default()
            };
            let conditioner = SignalConditioner::new(cfg, MotionConfig::default());
            let ts: Vec<i64> = (0..raw.len() as i64).map(|i| i * 33_333).collect();
            let out = conditioner.condition_values(ts.clone(), &raw, 30.0, Band::HEART, None);
            prop_assert_eq!(out.len(), raw.len());
            prop_assert_eq!(out.timestamps, ts);
            prop_assert!(out.values.iter().all(|v| v.is_finite()));
        }

        #[test]
        fn filtfilt_preserves_length(signal in prop::collection::vec(-10.0f32..10.0, 0..300)) {
            let out = BandpassFilter::new(Band::BREATHING, 20.0).filtfilt(&signal);
            prop_assert_eq!(out.len(), signal.len());
        }
    }

    // =========================================================================
    // Buffer keeps strictly increasing timestamps
    // =========================================================================
    proptest! {
        #[test]
        fn buffer_rejects_out_of_order(ts in prop::collection::vec(0i64..10_000_000, 1..200)) {
            let mut buf = SampleBuffer::new(ChannelKind::PulseIntensity, 5.0, 30.0);
            for &t in &ts {
                buf.push(Sample::scalar(t, 1.0));
            }
            let window = buf.snapshot();
            let stamps = window.timestamps();
            prop_assert!(stamps.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(window.span_us() <= 5_000_000);
        }
    }

    // =========================================================================
    // Heart rate and HRV never panic, stay in range
    // =========================================================================
    proptest! {
        #[test]
        fn heart_rate_within_bounds_or_reported(
            values in prop::collection::vec(-5.0f32..5.0, 0..300),
            snr in 0.0f32..1.0,
        ) {
            let detector = DetectorConfig::default();
            let ts: Vec<i64> = (0..values.len() as i64).map(|i| i * 33_333).collect();
            let peaks = detect_peaks(&ts, &values, detector.threshold_c, 272_727);
            match estimate_heart_rate(&peaks, snr, &detector) {
                Extracted::Value(est) => {
                    prop_assert!(
                        est.bpm >= detector.min_heart_bpm && est.bpm <= detector.max_heart_bpm
                    );
                    prop_assert!((0.0..=1.0).contains(&est.confidence));
                }
                Extracted::OutOfRange(bpm) => {
                    prop_assert!(bpm < detector.min_heart_bpm || bpm > detector.max_heart_bpm);
                }
                Extracted::Insufficient => prop_assert!(peaks.len() < 2),
            }
        }

        #[test]
        fn hrv_metrics_non_negative(intervals in prop::collection::vec(200.0f32..2000.0, 0..80)) {
            let hrv = compute_hrv(&intervals, &HrvConfig::default(), &DetectorConfig::default());
            if let Extracted::Value(m) = hrv {
                prop_assert!(m.rmssd_ms >= 0.0);
                prop_assert!(m.sdnn_ms >= 0.0);
                prop_assert!((0.0..=100.0).contains(&m.pnn50));
                prop_assert!((0.0..=1.0).contains(&m.confidence));
            }
        }
    }

    // =========================================================================
    // Stress and quality bounds and monotonicity
    // =========================================================================
    proptest! {
        #[test]
        fn stress_score_bounded_and_monotone_in_hr(
            hr in 30.0f32..200.0,
            bump in 0.0f32..50.0,
            rmssd in 1.0f32..150.0,
            br in 4.0f32..40.0,
            conf in 0.01f32..1.0,
        ) {
            let fusion = StressFusion::new(FusionConfig::default(), Baseline::POPULATION);
            let inputs = |hr: f32| FusionInputs {
                heart_rate_bpm: Some(FusionInput::new(hr, conf)),
                rmssd_ms: Some(FusionInput::new(rmssd, conf)),
                breathing_bpm: Some(FusionInput::new(br, conf)),
            };
            let lo = fusion.fuse(0, &inputs(hr)).unwrap();
            let hi = fusion.fuse(0, &inputs(hr + bump)).unwrap();
            prop_assert!((0.0..=100.0).contains(&lo.score));
            prop_assert!(hi.score >= lo.score - 1e-4);
            prop_assert!((lo.confidence - conf).abs() < 1e-4);
        }

        #[test]
        fn composite_quality_in_unit_range_and_monotone(
            snr in -30.0f32..50.0,
            motion in 0.0f32..1.0,
            extra in 0.0f32..1.0,
            adequacy in 0.0f32..1.0,
        ) {
            let scorer = QualityScorer::new(QualityConfig::default());
            let a = scorer.composite_score(snr, motion, adequacy);
            let b = scorer.composite_score(snr, (motion + extra).min(1.0), adequacy);
            prop_assert!((0.0..=1.0).contains(&a));
            prop_assert!(b <= a + 1e-6);
        }
    }
}
