//! Advisory SpO2 proxy from RGB camera samples.
//!
//! Smartphone cameras have no infrared channel, so blue stands in for IR in
//! the ratio of ratios. The result is a rough indication, never a medical
//! reading, and its confidence is capped accordingly.

use super::Extracted;
use crate::buffer::SampleWindow;
use crate::config::{Band, Spo2Config};
use crate::dsp::{stats, BandpassFilter};

const SPO2_MIN: f32 = 70.0;
const SPO2_MAX: f32 = 100.0;
/// Raw estimates below this are treated as a bad reading, not clamped.
const SPO2_IMPLAUSIBLE: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spo2Estimate {
    pub percent: f32,
    pub ratio: f32,
    pub confidence: f32,
}

/// AC (RMS of the band-passed signal) and DC (mean) of one colour component.
pub fn ac_dc(component: &[f32], band: Band, sample_rate_hz: f32) -> (f32, f32) {
    let Some(dc) = stats::mean(component) else {
        return (0.0, 0.0);
    };
    let centred: Vec<f32> = component.iter().map(|v| v - dc).collect();
    let pulsatile = BandpassFilter::new(band, sample_rate_hz).filtfilt(&centred);
    let ac = (pulsatile.iter().map(|v| v * v).sum::<f32>() / pulsatile.len().max(1) as f32).sqrt();
    (ac, dc)
}

/// R = (AC_red / DC_red) / (AC_blue / DC_blue), SpO2 = 110 - 25 R.
pub fn ratio_of_ratios(red: (f32, f32), blue: (f32, f32)) -> Option<f32> {
    let ((red_ac, red_dc), (blue_ac, blue_dc)) = (red, blue);
    if red_dc.abs() < 1e-6 || blue_dc.abs() < 1e-6 || blue_ac.abs() < 1e-9 {
        return None;
    }
    let r = (red_ac / red_dc) / (blue_ac / blue_dc);
    r.is_finite().then_some(r)
}

/// SpO2 proxy for an optical window of RGB samples.
///
/// `quality_score` (the pulse channel's composite quality) scales the
/// confidence, which never exceeds `max_confidence`.
pub fn estimate_spo2(
    window: &SampleWindow,
    band: Band,
    sample_rate_hz: f32,
    quality_score: f32,
    config: &Spo2Config,
) -> Extracted<Spo2Estimate> {
    if window.len() < config.min_samples {
        return Extracted::Insufficient;
    }
    let (Some(red), Some(blue)) = (window.component(0), window.component(2)) else {
        return Extracted::Insufficient;
    };
    let red = ac_dc(&red.to_vec(), band, sample_rate_hz);
    let blue = ac_dc(&blue.to_vec(), band, sample_rate_hz);
    let Some(ratio) = ratio_of_ratios(red, blue) else {
        return Extracted::Insufficient;
    };

    let raw = 110.0 - 25.0 * ratio;
    if raw < SPO2_IMPLAUSIBLE {
        return Extracted::OutOfRange(raw);
    }
    Extracted::Value(Spo2Estimate {
        percent: raw.clamp(SPO2_MIN, SPO2_MAX),
        ratio,
        confidence: (config.max_confidence * quality_score).clamp(0.0, config.max_confidence),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ChannelKind, Sample, SampleBuffer};
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn rgb_window(red_mod: f32, blue_mod: f32, n: usize) -> SampleWindow {
        let mut buf = SampleBuffer::new(ChannelKind::PulseIntensity, 60.0, 30.0);
        for i in 0..n {
            let p = (2.0 * PI * 1.2 * i as f32 / 30.0).sin();
            buf.push(Sample::triple(
                i as i64 * 33_333,
                [
                    150.0 * (1.0 + red_mod * p),
                    120.0 * (1.0 + 0.02 * p),
                    80.0 * (1.0 + blue_mod * p),
                ],
            ));
        }
        buf.snapshot()
    }

    #[test]
    fn ratio_formula() {
        assert_relative_eq!(ratio_of_ratios((1.0, 100.0), (1.0, 100.0)).unwrap(), 1.0);
        assert!(ratio_of_ratios((1.0, 0.0), (1.0, 100.0)).is_none());
        assert!(ratio_of_ratios((1.0, 100.0), (0.0, 100.0)).is_none());
    }

    #[test]
    fn equal_modulation_reads_85_percent() {
        let w = rgb_window(0.01, 0.01, 300);
        let est = estimate_spo2(&w, Band::HEART, 30.0, 1.0, &Spo2Config::default())
            .value()
            .unwrap();
        assert_relative_eq!(est.ratio, 1.0, epsilon = 0.02);
        assert_relative_eq!(est.percent, 85.0, epsilon = 0.6);
        assert!(est.confidence <= 0.5);
    }

    #[test]
    fn weak_red_modulation_clamps_high() {
        let w = rgb_window(0.002, 0.01, 300);
        let est = estimate_spo2(&w, Band::HEART, 30.0, 1.0, &Spo2Config::default())
            .value()
            .unwrap();
        assert_eq!(est.percent, 100.0);
    }

    #[test]
    fn strong_red_modulation_is_implausible() {
        let w = rgb_window(0.05, 0.01, 300);
        assert!(matches!(
            estimate_spo2(&w, Band::HEART, 30.0, 1.0, &Spo2Config::default()),
            Extracted::OutOfRange(_)
        ));
    }

    #[test]
    fn scalar_samples_are_insufficient() {
        let mut buf = SampleBuffer::new(ChannelKind::PulseIntensity, 60.0, 30.0);
        for i in 0..200 {
            buf.push(Sample::scalar(i * 33_333, 100.0));
        }
        assert_eq!(
            estimate_spo2(&buf.snapshot(), Band::HEART, 30.0, 1.0, &Spo2Config::default()),
            Extracted::Insufficient
        );
    }
}
