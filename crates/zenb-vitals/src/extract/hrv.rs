//! Time- and frequency-domain heart-rate variability.

use super::Extracted;
use crate::config::{DetectorConfig, HrvConfig};
use crate::dsp::{stats, Spectrum};
use crate::measurement::FrequencyDomainHrv;

const LF_BAND: (f32, f32) = (0.04, 0.15);
const HF_BAND: (f32, f32) = (0.15, 0.40);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HrvMetrics {
    pub rmssd_ms: f32,
    /// Population standard deviation of the intervals.
    pub sdnn_ms: f32,
    /// Percentage of successive differences above 50 ms.
    pub pnn50: f32,
    /// Intervals used after range filtering.
    pub interval_count: usize,
    /// Intervals excluded as physiologically implausible.
    pub rejected: usize,
    pub confidence: f32,
}

/// Plausible RR interval range (ms) from the heart-rate bounds.
pub fn interval_range_ms(detector: &DetectorConfig) -> (f32, f32) {
    (60_000.0 / detector.max_heart_bpm, 60_000.0 / detector.min_heart_bpm)
}

/// RMSSD, SDNN and pNN50 over successive RR intervals.
///
/// Intervals outside the plausible range are dropped first. At least two
/// remaining intervals are required. Below `min_intervals` the confidence is
/// scaled by `count / min_intervals`.
pub fn compute_hrv(
    intervals_ms: &[f32],
    config: &HrvConfig,
    detector: &DetectorConfig,
) -> Extracted<HrvMetrics> {
    let (lo, hi) = interval_range_ms(detector);
    let valid: Vec<f32> = intervals_ms
        .iter()
        .copied()
        .filter(|v| v.is_finite() && (lo..=hi).contains(v))
        .collect();
    let rejected = intervals_ms.len() - valid.len();
    if valid.len() < 2 {
        return Extracted::Insufficient;
    }

    let diffs: Vec<f32> = valid.windows(2).map(|w| w[1] - w[0]).collect();
    let rmssd_ms = (diffs.iter().map(|d| d * d).sum::<f32>() / diffs.len() as f32).sqrt();
    let sdnn_ms = stats::std_dev(&valid).unwrap_or(0.0);
    let over_50 = diffs.iter().filter(|d| d.abs() > 50.0).count();
    let pnn50 = 100.0 * over_50 as f32 / diffs.len() as f32;

    let confidence = (valid.len() as f32 / config.min_intervals.max(1) as f32).min(1.0);

    Extracted::Value(HrvMetrics {
        rmssd_ms,
        sdnn_ms,
        pnn50,
        interval_count: valid.len(),
        rejected,
        confidence,
    })
}

/// LF/HF powers of the RR tachogram.
///
/// `beat_times_s[i]` is the time of the beat that ends `intervals_ms[i]`.
/// Returns `None` until the series spans `min_spectral_span_sec`, or when
/// the HF power vanishes.
pub fn frequency_domain(
    beat_times_s: &[f32],
    intervals_ms: &[f32],
    config: &HrvConfig,
) -> Option<FrequencyDomainHrv> {
    let n = beat_times_s.len().min(intervals_ms.len());
    if n < 4 {
        return None;
    }
    let span = beat_times_s[n - 1] - beat_times_s[0];
    if span < config.min_spectral_span_sec {
        return None;
    }

    let tachogram =
        stats::resample_uniform(&beat_times_s[..n], &intervals_ms[..n], config.resample_hz);
    let spectrum = Spectrum::compute(&tachogram, config.resample_hz)?;
    let lf_power = spectrum.band_power(LF_BAND.0, LF_BAND.1);
    let hf_power = spectrum.band_power(HF_BAND.0, HF_BAND.1);
    if !(hf_power > 1e-6) {
        return None;
    }
    Some(FrequencyDomainHrv {
        lf_power,
        hf_power,
        lf_hf_ratio: lf_power / hf_power,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn cfgs() -> (HrvConfig, DetectorConfig) {
        (HrvConfig::default(), DetectorConfig::default())
    }

    #[test]
    fn fixed_sequence_matches_hand_computation() {
        let (h, d) = cfgs();
        let m = compute_hrv(&[800.0, 810.0, 790.0, 820.0, 800.0], &h, &d).value().unwrap();
        // diffs 10, -20, 30, -20
        assert_relative_eq!(m.rmssd_ms, 450.0f32.sqrt(), epsilon = 1e-3);
        // mean 804, squared deviations sum to 520 over 5
        assert_relative_eq!(m.sdnn_ms, 104.0f32.sqrt(), epsilon = 1e-3);
        assert_relative_eq!(m.pnn50, 0.0);
        assert_eq!(m.interval_count, 5);
        assert_relative_eq!(m.confidence, 5.0 / 30.0, epsilon = 1e-6);
    }

    #[test]
    fn pnn50_counts_large_differences() {
        let (h, d) = cfgs();
        let m = compute_hrv(&[800.0, 900.0, 780.0, 800.0], &h, &d).value().unwrap();
        // |100|, |120|, |20|
        assert_relative_eq!(m.pnn50, 200.0 / 3.0, epsilon = 1e-3);
    }

    #[test]
    fn excludes_implausible_intervals() {
        let (h, d) = cfgs();
        let m = compute_hrv(&[800.0, 5000.0, 810.0, 100.0, 790.0], &h, &d).value().unwrap();
        assert_eq!(m.interval_count, 3);
        assert_eq!(m.rejected, 2);
    }

    #[test]
    fn needs_two_intervals() {
        let (h, d) = cfgs();
        assert_eq!(compute_hrv(&[800.0], &h, &d), Extracted::Insufficient);
        assert_eq!(compute_hrv(&[800.0, 5000.0], &h, &d), Extracted::Insufficient);
    }

    #[test]
    fn full_confidence_at_min_intervals() {
        let (h, d) = cfgs();
        let rr: Vec<f32> = (0..40).map(|i| 800.0 + (i % 2) as f32 * 20.0).collect();
        let m = compute_hrv(&rr, &h, &d).value().unwrap();
        assert_relative_eq!(m.confidence, 1.0);
        assert_relative_eq!(m.rmssd_ms, 20.0, epsilon = 1e-3);
    }

    #[test]
    fn respiratory_modulation_shows_up_as_hf() {
        // RR modulated at 0.25 Hz (HF band) over 120 s
        let mut t = 0.0f32;
        let mut times = Vec::new();
        let mut rr = Vec::new();
        while t < 120.0 {
            let v = 850.0 + 40.0 * (2.0 * PI * 0.25 * t).sin();
            t += v / 1000.0;
            times.push(t);
            rr.push(v);
        }
        let f = frequency_domain(&times, &rr, &HrvConfig::default()).unwrap();
        assert!(f.hf_power > f.lf_power * 3.0, "lf {} hf {}", f.lf_power, f.hf_power);
        assert!(f.lf_hf_ratio < 0.34);
    }

    #[test]
    fn short_series_has_no_spectrum() {
        let times: Vec<f32> = (1..=30).map(|i| i as f32 * 0.8).collect();
        let rr = vec![800.0; 30];
        assert!(frequency_domain(&times, &rr, &HrvConfig::default()).is_none());
    }
}
