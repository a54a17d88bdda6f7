//! ZenB vitals: real-time heart rate, HRV, breathing, SpO2 proxy and stress
//! estimation from smartphone sensor streams.
//!
//! Samples from the camera (pulse intensity), microphone (breath envelope)
//! and accelerometer (motion) are windowed per channel, conditioned,
//! reduced to beat/breath events and turned into [`Measurement`]s with a
//! confidence and a per-channel [`QualityAssessment`].
//!
//! [`Session`] is the synchronous core and is driven by an explicit clock.
//! [`MonitoringHandle`] runs the same session on a worker thread with
//! bounded queues on both sides.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::new_without_default)]

pub mod aggregate;
pub mod buffer;
pub mod conditioner;
pub mod config;
pub mod detector;
pub mod dsp;
pub mod error;
pub mod extract;
pub mod fusion;
pub mod measurement;
pub mod quality;
pub mod runtime;
pub mod session;
pub mod source;

#[cfg(test)]
mod tests_proptest;

pub use aggregate::{MetricSummary, SessionAggregate, SessionAggregator, TrendDirection};
pub use buffer::{ChannelKind, Sample, SampleBuffer, SampleValue, SampleWindow};
pub use conditioner::{ConditionedSignal, MotionContext, SignalConditioner};
pub use config::{Band, Baseline, ProcessingConfig};
pub use detector::{DetectedEvent, EventDetector};
pub use error::{AcquisitionError, ConfigError, SessionError, VitalsError};
pub use fusion::{FusionInput, FusionInputs, StressFusion};
pub use measurement::{
    Anomaly, AnomalyKind, BreathingPattern, BreathingSample, HeartRateSample, HrvSample,
    Measurement, OverallQuality, PipelineEvent, QualityAssessment, Spo2Sample, StressLevel,
    StressSample,
};
pub use quality::QualityScorer;
pub use runtime::{MetricsSnapshot, MonitoringHandle, SampleSender, SessionClock};
pub use session::{LatestValues, Session, SessionState};
pub use source::{
    ReplaySource, SignalSource, SourceCursor, SyntheticBreath, SyntheticMotion, SyntheticPulse,
};
