//! Per-channel sample windows.
//!
//! A [`SampleBuffer`] is a duration-bounded FIFO owned by exactly one writer.
//! Readers only ever see a [`SampleWindow`], an immutable `Arc`-backed copy
//! taken at snapshot time, so a snapshot stays valid while the buffer keeps
//! moving.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Sensor channel feeding the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Camera pixel intensity over a fingertip or face region.
    PulseIntensity,
    /// Amplitude envelope of breath sound from the microphone.
    AudioEnvelope,
    /// Accelerometer (or accelerometer magnitude) samples.
    Motion,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::PulseIntensity,
        ChannelKind::AudioEnvelope,
        ChannelKind::Motion,
    ];

    pub fn index(self) -> usize {
        match self {
            ChannelKind::PulseIntensity => 0,
            ChannelKind::AudioEnvelope => 1,
            ChannelKind::Motion => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleValue {
    Scalar(f32),
    /// RGB for the optical channel, XYZ for the accelerometer.
    Triple([f32; 3]),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Capture timestamp in microseconds.
    pub ts_us: i64,
    pub value: SampleValue,
}

impl Sample {
    pub fn scalar(ts_us: i64, value: f32) -> Self {
        Self {
            ts_us,
            value: SampleValue::Scalar(value),
        }
    }

    pub fn triple(ts_us: i64, value: [f32; 3]) -> Self {
        Self {
            ts_us,
            value: SampleValue::Triple(value),
        }
    }

    /// Scalar view of the sample for a channel.
    ///
    /// The optical channel uses the green component (strongest pulsatile
    /// signal); motion and audio vectors collapse to their magnitude.
    pub fn project(&self, kind: ChannelKind) -> f32 {
        match (self.value, kind) {
            (SampleValue::Scalar(v), _) => v,
            (SampleValue::Triple(rgb), ChannelKind::PulseIntensity) => rgb[1],
            (SampleValue::Triple([x, y, z]), _) => (x * x + y * y + z * z).sqrt(),
        }
    }
}

/// Immutable snapshot of a channel window.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    kind: ChannelKind,
    samples: Arc<[Sample]>,
}

impl SampleWindow {
    pub fn new(kind: ChannelKind, samples: Vec<Sample>) -> Self {
        Self {
            kind,
            samples: samples.into(),
        }
    }

    pub fn empty(kind: ChannelKind) -> Self {
        Self::new(kind, Vec::new())
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn first_ts(&self) -> Option<i64> {
        self.samples.first().map(|s| s.ts_us)
    }

    pub fn last_ts(&self) -> Option<i64> {
        self.samples.last().map(|s| s.ts_us)
    }

    pub fn span_us(&self) -> i64 {
        match (self.first_ts(), self.last_ts()) {
            (Some(a), Some(b)) => b - a,
            _ => 0,
        }
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.samples.iter().map(|s| s.ts_us).collect()
    }

    /// Projected scalar values (see [`Sample::project`]).
    pub fn values(&self) -> Array1<f32> {
        self.samples.iter().map(|s| s.project(self.kind)).collect()
    }

    /// One component of vector samples, or `None` if any sample is scalar.
    pub fn component(&self, idx: usize) -> Option<Array1<f32>> {
        if idx > 2 || self.is_empty() {
            return None;
        }
        self.samples
            .iter()
            .map(|s| match s.value {
                SampleValue::Triple(v) => Some(v[idx]),
                SampleValue::Scalar(_) => None,
            })
            .collect::<Option<Vec<f32>>>()
            .map(Array1::from)
    }

    /// Effective sample rate estimated from the timestamps.
    pub fn sample_rate_hz(&self) -> Option<f32> {
        let n = self.len();
        let span = self.span_us();
        if n < 2 || span <= 0 {
            return None;
        }
        Some((n - 1) as f32 * 1_000_000.0 / span as f32)
    }
}

/// Highest sample rate the length cap grows to follow.
pub const MAX_SAMPLE_RATE_HZ: f32 = 2_000.0;

/// Duration-bounded FIFO for one channel.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    kind: ChannelKind,
    window_us: i64,
    max_len: usize,
    samples: VecDeque<Sample>,
    rejected: u64,
    evicted_in_window: u64,
}

impl SampleBuffer {
    /// `nominal_rate_hz` sizes the initial length cap (twice the expected
    /// sample count). The cap follows the observed rate of a faster producer
    /// up to [`MAX_SAMPLE_RATE_HZ`].
    pub fn new(kind: ChannelKind, window_sec: f32, nominal_rate_hz: f32) -> Self {
        let max_len = Self::max_len_for(window_sec, nominal_rate_hz);
        Self {
            kind,
            window_us: (window_sec.max(0.0) * 1_000_000.0) as i64,
            max_len,
            samples: VecDeque::with_capacity(max_len.min(1 << 16)),
            rejected: 0,
            evicted_in_window: 0,
        }
    }

    fn max_len_for(window_sec: f32, rate_hz: f32) -> usize {
        let rate_hz = rate_hz.clamp(1.0, MAX_SAMPLE_RATE_HZ);
        ((window_sec.max(0.0) * rate_hz * 2.0).ceil() as usize).max(16)
    }

    fn window_sec(&self) -> f32 {
        self.window_us as f32 / 1_000_000.0
    }

    /// Raise the cap to fit the rate the producer actually delivers.
    fn follow_observed_rate(&mut self) {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return;
        };
        let span_us = last.ts_us - first.ts_us;
        if span_us <= 0 {
            return;
        }
        let observed_hz = (self.samples.len() - 1) as f32 * 1_000_000.0 / span_us as f32;
        let wanted = Self::max_len_for(self.window_sec(), observed_hz);
        if wanted > self.max_len {
            log::info!(
                "{:?} buffer cap raised from {} to {} samples ({observed_hz:.0} Hz observed)",
                self.kind,
                self.max_len,
                wanted
            );
            self.max_len = wanted;
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Append a sample, evicting anything older than the window.
    ///
    /// Returns `false` (and keeps the buffer unchanged) for a timestamp that
    /// does not strictly increase or a non-finite value.
    pub fn push(&mut self, sample: Sample) -> bool {
        if let Some(last) = self.samples.back() {
            if sample.ts_us <= last.ts_us {
                self.rejected += 1;
                return false;
            }
        }
        let finite = match sample.value {
            SampleValue::Scalar(v) => v.is_finite(),
            SampleValue::Triple(v) => v.iter().all(|x| x.is_finite()),
        };
        if !finite {
            self.rejected += 1;
            return false;
        }

        self.samples.push_back(sample);
        while let Some(front) = self.samples.front() {
            if sample.ts_us - front.ts_us > self.window_us {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        if self.samples.len() > self.max_len {
            self.follow_observed_rate();
        }
        while self.samples.len() > self.max_len {
            self.samples.pop_front();
            self.evicted_in_window += 1;
            if self.evicted_in_window.is_power_of_two() {
                log::warn!(
                    "{:?} buffer full at {} samples; {} in-window samples evicted so far",
                    self.kind,
                    self.max_len,
                    self.evicted_in_window
                );
            }
        }
        true
    }

    pub fn snapshot(&self) -> SampleWindow {
        SampleWindow::new(self.kind, self.samples.iter().copied().collect())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest_ts(&self) -> Option<i64> {
        self.samples.back().map(|s| s.ts_us)
    }

    /// Samples dropped for ordering or finiteness violations.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Samples still inside the window that the length cap pushed out.
    pub fn evicted_in_window(&self) -> u64 {
        self.evicted_in_window
    }

    /// Resize the window. Existing samples outside the new window are evicted
    /// on the next push.
    pub fn set_window(&mut self, window_sec: f32, nominal_rate_hz: f32) {
        self.window_us = (window_sec.max(0.0) * 1_000_000.0) as i64;
        self.max_len = Self::max_len_for(window_sec, nominal_rate_hz);
        self.follow_observed_rate();
        while self.samples.len() > self.max_len {
            self.samples.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_by_duration() {
        let mut buf = SampleBuffer::new(ChannelKind::PulseIntensity, 1.0, 30.0);
        for i in 0..90 {
            assert!(buf.push(Sample::scalar(i * 33_333, i as f32)));
        }
        let snap = buf.snapshot();
        assert!(snap.span_us() <= 1_000_000);
        assert_eq!(snap.last_ts(), Some(89 * 33_333));
        assert!(snap.len() >= 30 && snap.len() <= 31);
    }

    #[test]
    fn hard_cap_limits_bursty_producer() {
        let mut buf = SampleBuffer::new(ChannelKind::Motion, 1.0, 10.0);
        // 10000 samples 1 µs apart all fit the duration window
        for i in 0..10_000 {
            buf.push(Sample::scalar(i, 0.0));
        }
        let cap = (2.0 * MAX_SAMPLE_RATE_HZ) as usize;
        assert_eq!(buf.len(), cap);
        assert_eq!(buf.evicted_in_window(), 10_000 - cap as u64);
    }

    #[test]
    fn faster_producer_keeps_the_whole_window() {
        // Nominal 20 Hz, delivered at 1 kHz
        let mut buf = SampleBuffer::new(ChannelKind::AudioEnvelope, 10.0, 20.0);
        for i in 0..20_000i64 {
            assert!(buf.push(Sample::scalar(i * 1_000, 0.5)));
        }
        let snap = buf.snapshot();
        assert!(snap.span_us() >= 9_990_000, "span {}", snap.span_us());
        assert!(snap.len() >= 10_000);
        assert_eq!(buf.evicted_in_window(), 0);
        assert_eq!(buf.rejected(), 0);
    }

    #[test]
    fn rejects_non_monotonic_and_non_finite() {
        let mut buf = SampleBuffer::new(ChannelKind::AudioEnvelope, 10.0, 20.0);
        assert!(buf.push(Sample::scalar(100, 1.0)));
        assert!(!buf.push(Sample::scalar(100, 2.0)));
        assert!(!buf.push(Sample::scalar(50, 2.0)));
        assert!(!buf.push(Sample::scalar(200, f32::NAN)));
        assert!(buf.push(Sample::scalar(200, 3.0)));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.rejected(), 3);
    }

    #[test]
    fn snapshot_is_independent_of_later_pushes() {
        let mut buf = SampleBuffer::new(ChannelKind::PulseIntensity, 10.0, 30.0);
        buf.push(Sample::scalar(0, 1.0));
        let snap = buf.snapshot();
        buf.push(Sample::scalar(10, 2.0));
        assert_eq!(snap.len(), 1);
        assert_eq!(buf.snapshot().len(), 2);
    }

    #[test]
    fn empty_snapshot_is_valid() {
        let buf = SampleBuffer::new(ChannelKind::Motion, 10.0, 50.0);
        let snap = buf.snapshot();
        assert!(snap.is_empty());
        assert_eq!(snap.sample_rate_hz(), None);
        assert_eq!(snap.values().len(), 0);
    }

    #[test]
    fn projection_per_channel() {
        let s = Sample::triple(0, [3.0, 4.0, 12.0]);
        assert_eq!(s.project(ChannelKind::PulseIntensity), 4.0);
        assert_eq!(s.project(ChannelKind::Motion), 13.0);
    }

    #[test]
    fn estimates_sample_rate() {
        let mut buf = SampleBuffer::new(ChannelKind::PulseIntensity, 10.0, 30.0);
        for i in 0..31 {
            buf.push(Sample::scalar(i * 33_333, 0.0));
        }
        let fs = buf.snapshot().sample_rate_hz().unwrap();
        assert!((fs - 30.0).abs() < 0.01);
    }

    #[test]
    fn component_requires_vector_samples() {
        let mut buf = SampleBuffer::new(ChannelKind::PulseIntensity, 10.0, 30.0);
        buf.push(Sample::triple(0, [1.0, 2.0, 3.0]));
        buf.push(Sample::triple(1, [4.0, 5.0, 6.0]));
        let red = buf.snapshot().component(0).unwrap();
        assert_eq!(red.to_vec(), vec![1.0, 4.0]);
        buf.push(Sample::scalar(2, 0.0));
        assert!(buf.snapshot().component(0).is_none());
    }
}
