//! Values the pipeline emits.
//!
//! A measurement with confidence 0 means "not computable"; measurements that
//! cannot be computed at all are simply not emitted.

use serde::{Deserialize, Serialize};

use crate::aggregate::SessionAggregate;
use crate::buffer::ChannelKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl OverallQuality {
    /// Band a composite score in [0, 1].
    pub fn from_score(score: f32) -> Self {
        let pct = score * 100.0;
        if pct >= 90.0 {
            OverallQuality::Excellent
        } else if pct >= 75.0 {
            OverallQuality::Good
        } else if pct >= 60.0 {
            OverallQuality::Fair
        } else {
            OverallQuality::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub ts_us: i64,
    pub bpm: f32,
    pub confidence: f32,
    pub source: ChannelKind,
    pub quality: OverallQuality,
}

/// LF/HF spectral powers of the RR tachogram (ms²).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDomainHrv {
    pub lf_power: f32,
    pub hf_power: f32,
    pub lf_hf_ratio: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvSample {
    pub ts_us: i64,
    pub rmssd_ms: f32,
    pub sdnn_ms: f32,
    /// Percentage (0-100) of successive differences above 50 ms.
    pub pnn50: f32,
    pub interval_count: usize,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<FrequencyDomainHrv>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreathingPattern {
    Regular,
    Irregular,
    Shallow,
    Deep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreathingSample {
    pub ts_us: i64,
    pub bpm: f32,
    pub pattern: BreathingPattern,
    /// Mean peak-to-trough amplitude of the detected cycles.
    pub amplitude: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressFactorKind {
    HeartRateElevation,
    HrvDepression,
    BreathingElevation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressFactor {
    pub kind: StressFactorKind,
    /// Input metric value (bpm, ms, or brpm).
    pub value: f32,
    /// Baseline-relative deviation in [0, 1].
    pub deviation: f32,
    /// Weight after renormalising over the available inputs.
    pub weight: f32,
    /// Points contributed to the 0-100 score.
    pub contribution: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    Relaxed,
    Low,
    Moderate,
    High,
}

impl StressLevel {
    pub fn from_score(score: f32) -> Self {
        if score < 25.0 {
            StressLevel::Relaxed
        } else if score < 50.0 {
            StressLevel::Low
        } else if score < 75.0 {
            StressLevel::Moderate
        } else {
            StressLevel::High
        }
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            StressLevel::Relaxed => "You are relaxed. Keep your current breathing rhythm.",
            StressLevel::Low => "Mild tension. Slow your exhale to settle further.",
            StressLevel::Moderate => {
                "Moderate stress. Try paced breathing at six breaths per minute."
            }
            StressLevel::High => {
                "High stress. Pause and breathe slowly: inhale 4 s, exhale 6 s."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressSample {
    pub ts_us: i64,
    /// 0 (relaxed) to 100.
    pub score: f32,
    pub factors: Vec<StressFactor>,
    pub level: StressLevel,
    pub recommendation: String,
    pub confidence: f32,
}

/// Advisory blood-oxygen estimate from the optical channel. Not medical grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spo2Sample {
    pub ts_us: i64,
    pub percent: f32,
    /// Ratio of ratios (AC/DC red over AC/DC blue).
    pub ratio: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum Measurement {
    HeartRate(HeartRateSample),
    Hrv(HrvSample),
    Breathing(BreathingSample),
    Stress(StressSample),
    Spo2(Spo2Sample),
}

impl Measurement {
    pub fn ts_us(&self) -> i64 {
        match self {
            Measurement::HeartRate(m) => m.ts_us,
            Measurement::Hrv(m) => m.ts_us,
            Measurement::Breathing(m) => m.ts_us,
            Measurement::Stress(m) => m.ts_us,
            Measurement::Spo2(m) => m.ts_us,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Measurement::HeartRate(m) => m.confidence,
            Measurement::Hrv(m) => m.confidence,
            Measurement::Breathing(m) => m.confidence,
            Measurement::Stress(m) => m.confidence,
            Measurement::Spo2(m) => m.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub ts_us: i64,
    pub channel: ChannelKind,
    pub snr_db: f32,
    /// 0 (still) to 1 (heavy motion).
    pub motion_level: f32,
    /// Exposure adequacy in [0, 1]; 1 for channels without an exposure notion.
    pub lighting_level: f32,
    /// Share of the window usable after outlier and motion handling.
    pub contact_quality: f32,
    pub composite_score: f32,
    pub overall: OverallQuality,
    pub usable_for_analysis: bool,
    pub stalled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HeartRateOutOfRange,
    BreathingRateOutOfRange,
    /// Some or all RR intervals fell outside the plausible range.
    IntervalsRejected,
    Spo2OutOfRange,
    /// Processing for a channel panicked and the cycle was skipped.
    ProcessingFault,
}

/// A computed value that was discarded instead of emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub ts_us: i64,
    pub channel: ChannelKind,
    pub kind: AnomalyKind,
    pub value: Option<f32>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PipelineEvent {
    Measurement(Measurement),
    Quality(QualityAssessment),
    Anomaly(Anomaly),
    SessionEnded(SessionAggregate),
}

impl PipelineEvent {
    pub fn as_measurement(&self) -> Option<&Measurement> {
        match self {
            PipelineEvent::Measurement(m) => Some(m),
            _ => None,
        }
    }

    /// Single-line JSON encoding.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_bands() {
        assert_eq!(OverallQuality::from_score(0.95), OverallQuality::Excellent);
        assert_eq!(OverallQuality::from_score(0.9), OverallQuality::Excellent);
        assert_eq!(OverallQuality::from_score(0.8), OverallQuality::Good);
        assert_eq!(OverallQuality::from_score(0.6), OverallQuality::Fair);
        assert_eq!(OverallQuality::from_score(0.59), OverallQuality::Poor);
        assert_eq!(OverallQuality::from_score(0.0), OverallQuality::Poor);
    }

    #[test]
    fn stress_levels_are_ordered() {
        assert_eq!(StressLevel::from_score(0.0), StressLevel::Relaxed);
        assert_eq!(StressLevel::from_score(30.0), StressLevel::Low);
        assert_eq!(StressLevel::from_score(60.0), StressLevel::Moderate);
        assert_eq!(StressLevel::from_score(100.0), StressLevel::High);
        assert!(StressLevel::Relaxed < StressLevel::High);
    }

    #[test]
    fn event_json_shape() {
        let ev = PipelineEvent::Measurement(Measurement::HeartRate(HeartRateSample {
            ts_us: 1_000_000,
            bpm: 72.0,
            confidence: 0.9,
            source: ChannelKind::PulseIntensity,
            quality: OverallQuality::Good,
        }));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "measurement");
        assert_eq!(json["data"]["metric"], "heart_rate");
        assert_eq!(json["data"]["source"], "pulse_intensity");
        let back: PipelineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }
}
