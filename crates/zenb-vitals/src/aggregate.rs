//! Session-lifetime statistics, trends and breathing/heart-rate coherence.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::AggregateConfig;
use crate::dsp::{goertzel_energy_fraction, stats};
use crate::measurement::Measurement;

/// Trend direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Stable,
    Decreasing,
    /// Fewer than three estimates so far.
    Unknown,
}

/// Welford running mean/variance with min and max.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f32,
    max: f32,
}

impl RunningStats {
    pub fn push(&mut self, x: f32) {
        if !x.is_finite() {
            return;
        }
        if self.count == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.count += 1;
        let delta = x as f64 - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x as f64 - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f32> {
        (self.count > 0).then_some(self.mean as f32)
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.m2 / self.count as f64).sqrt() as f32)
    }

    pub fn min(&self) -> Option<f32> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f32> {
        (self.count > 0).then_some(self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count: u64,
    pub mean: f32,
    pub std_dev: f32,
    pub min: f32,
    pub max: f32,
    pub last: f32,
    pub trend: TrendDirection,
}

/// Running statistics plus a recent-value window for one metric.
#[derive(Debug, Clone)]
pub struct MetricTracker {
    stats: RunningStats,
    recent: VecDeque<f32>,
    window: usize,
    dead_band: f32,
}

impl MetricTracker {
    pub fn new(config: &AggregateConfig) -> Self {
        Self {
            stats: RunningStats::default(),
            recent: VecDeque::with_capacity(config.trend_window),
            window: config.trend_window.max(3),
            dead_band: config.trend_dead_band,
        }
    }

    pub fn push(&mut self, x: f32) {
        if !x.is_finite() {
            return;
        }
        self.stats.push(x);
        self.recent.push_back(x);
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }
    }

    /// Least-squares slope over the recent window, relative to its mean,
    /// compared against the dead band.
    pub fn trend(&self) -> TrendDirection {
        if self.recent.len() < 3 {
            return TrendDirection::Unknown;
        }
        let recent: Vec<f32> = self.recent.iter().copied().collect();
        let (Some(slope), Some(mean)) = (stats::linear_slope(&recent), stats::mean(&recent)) else {
            return TrendDirection::Unknown;
        };
        let relative = slope / mean.abs().max(1e-6);
        if relative > self.dead_band {
            TrendDirection::Increasing
        } else if relative < -self.dead_band {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }

    pub fn summary(&self) -> Option<MetricSummary> {
        Some(MetricSummary {
            count: self.stats.count(),
            mean: self.stats.mean()?,
            std_dev: self.stats.std_dev()?,
            min: self.stats.min()?,
            max: self.stats.max()?,
            last: *self.recent.back()?,
            trend: self.trend(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceSummary {
    pub last: f32,
    pub mean: f32,
    pub samples: u64,
}

/// Final report of a monitoring session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAggregate {
    pub started_at_us: i64,
    pub ended_at_us: i64,
    pub duration_sec: f32,
    pub heart_rate: Option<MetricSummary>,
    pub rmssd: Option<MetricSummary>,
    pub breathing_rate: Option<MetricSummary>,
    pub stress: Option<MetricSummary>,
    pub spo2: Option<MetricSummary>,
    pub coherence: Option<CoherenceSummary>,
    pub measurement_count: u64,
    pub anomaly_count: u64,
}

/// Accumulates measurements for the lifetime of one session.
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    started_at_us: i64,
    heart_rate: MetricTracker,
    rmssd: MetricTracker,
    breathing_rate: MetricTracker,
    stress: MetricTracker,
    spo2: MetricTracker,
    coherence: RunningStats,
    last_coherence: Option<f32>,
    measurement_count: u64,
    anomaly_count: u64,
}

impl SessionAggregator {
    pub fn new(started_at_us: i64, config: &AggregateConfig) -> Self {
        Self {
            started_at_us,
            heart_rate: MetricTracker::new(config),
            rmssd: MetricTracker::new(config),
            breathing_rate: MetricTracker::new(config),
            stress: MetricTracker::new(config),
            spo2: MetricTracker::new(config),
            coherence: RunningStats::default(),
            last_coherence: None,
            measurement_count: 0,
            anomaly_count: 0,
        }
    }

    pub fn record(&mut self, measurement: &Measurement) {
        self.measurement_count += 1;
        match measurement {
            Measurement::HeartRate(m) => self.heart_rate.push(m.bpm),
            Measurement::Hrv(m) => self.rmssd.push(m.rmssd_ms),
            Measurement::Breathing(m) => self.breathing_rate.push(m.bpm),
            Measurement::Stress(m) => self.stress.push(m.score),
            Measurement::Spo2(m) => self.spo2.push(m.percent),
        }
    }

    pub fn record_anomaly(&mut self) {
        self.anomaly_count += 1;
    }

    pub fn record_coherence(&mut self, ratio: f32) {
        if ratio.is_finite() {
            self.coherence.push(ratio);
            self.last_coherence = Some(ratio);
        }
    }

    pub fn last_coherence(&self) -> Option<f32> {
        self.last_coherence
    }

    pub fn finish(&self, ended_at_us: i64) -> SessionAggregate {
        let coherence = match (self.last_coherence, self.coherence.mean()) {
            (Some(last), Some(mean)) => Some(CoherenceSummary {
                last,
                mean,
                samples: self.coherence.count(),
            }),
            _ => None,
        };
        SessionAggregate {
            started_at_us: self.started_at_us,
            ended_at_us,
            duration_sec: (ended_at_us - self.started_at_us).max(0) as f32 / 1e6,
            heart_rate: self.heart_rate.summary(),
            rmssd: self.rmssd.summary(),
            breathing_rate: self.breathing_rate.summary(),
            stress: self.stress.summary(),
            spo2: self.spo2.summary(),
            coherence,
            measurement_count: self.measurement_count,
            anomaly_count: self.anomaly_count,
        }
    }
}

/// Coherence between breathing and heart-rate oscillation.
///
/// Beat times are turned into an instantaneous heart-rate series, resampled
/// at `resample_hz`, and the share of its oscillation energy at the
/// breathing frequency is returned. Needs at least two breathing periods of
/// beats.
pub fn coherence_ratio(beat_ts_us: &[i64], breathing_hz: f32, resample_hz: f32) -> Option<f32> {
    if beat_ts_us.len() < 4 || !(breathing_hz > 0.0) {
        return None;
    }
    let mut t = Vec::with_capacity(beat_ts_us.len() - 1);
    let mut hr = Vec::with_capacity(beat_ts_us.len() - 1);
    for w in beat_ts_us.windows(2) {
        let dt_us = w[1] - w[0];
        if dt_us <= 0 {
            continue;
        }
        t.push(w[1] as f32 / 1e6);
        hr.push(60.0e6 / dt_us as f32);
    }
    let (Some(&first), Some(&last)) = (t.first(), t.last()) else {
        return None;
    };
    if last - first < 2.0 / breathing_hz {
        return None;
    }
    // Re-base to keep f32 precision on long sessions
    let t: Vec<f32> = t.iter().map(|x| x - first).collect();
    let series = stats::resample_uniform(&t, &hr, resample_hz);
    Some(goertzel_energy_fraction(&series, resample_hz, breathing_hz))
}
