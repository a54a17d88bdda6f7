//! Event detection on conditioned signals.
//!
//! Pulse peaks use an adaptive amplitude threshold with a refractory interval.
//! Breath events are hysteresis crossings of the breathing waveform.

use serde::{Deserialize, Serialize};

use crate::conditioner::ConditionedSignal;
use crate::config::{BreathingConfig, DetectorConfig};
use crate::dsp::stats;

/// A detected beat or breath onset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedEvent {
    /// Index of the sample nearest to the event.
    pub index: usize,
    /// Event time refined between samples, in microseconds.
    pub ts_us: i64,
    /// Peak height above the window mean (pulse) or peak-to-trough amplitude
    /// of the completed cycle (breathing).
    pub amplitude: f32,
}

#[derive(Debug, Clone)]
pub struct EventDetector {
    config: DetectorConfig,
    hysteresis: f32,
}

impl EventDetector {
    pub fn new(config: DetectorConfig, breathing: &BreathingConfig) -> Self {
        Self {
            config,
            hysteresis: breathing.hysteresis,
        }
    }

    /// Minimum spacing between beats, from the maximum plausible heart rate.
    pub fn pulse_refractory_us(&self) -> i64 {
        (60.0 / self.config.max_heart_bpm * 1_000_000.0) as i64
    }

    pub fn breath_refractory_us(&self) -> i64 {
        (60.0 / self.config.max_breathing_bpm * 1_000_000.0) as i64
    }

    pub fn detect_peaks(&self, signal: &ConditionedSignal) -> Vec<DetectedEvent> {
        let values = signal.values.as_slice().unwrap_or(&[]);
        detect_peaks(
            &signal.timestamps,
            values,
            self.config.threshold_c,
            self.pulse_refractory_us(),
        )
    }

    pub fn detect_breaths(&self, signal: &ConditionedSignal) -> Vec<DetectedEvent> {
        let values = signal.values.as_slice().unwrap_or(&[]);
        detect_breaths(
            &signal.timestamps,
            values,
            self.hysteresis,
            self.breath_refractory_us(),
        )
    }
}

/// Local maxima above `mean + c * std`, at least `refractory_us` apart.
///
/// When two candidates fall within the refractory interval the taller one
/// is kept. Peak times are refined by parabolic interpolation.
pub fn detect_peaks(
    timestamps: &[i64],
    values: &[f32],
    threshold_c: f32,
    refractory_us: i64,
) -> Vec<DetectedEvent> {
    let n = values.len().min(timestamps.len());
    if n < 3 {
        return Vec::new();
    }
    let x = &values[..n];
    let (Some(mean), Some(std)) = (stats::mean(x), stats::std_dev(x)) else {
        return Vec::new();
    };
    if !(std > 1e-9) {
        return Vec::new();
    }
    let thr = mean + threshold_c * std;

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..n - 1 {
        if !(x[i] > thr && x[i] > x[i - 1] && x[i] >= x[i + 1]) {
            continue;
        }
        match peaks.last().copied() {
            Some(last) if timestamps[i] - timestamps[last] < refractory_us => {
                if x[i] > x[last] {
                    if let Some(slot) = peaks.last_mut() {
                        *slot = i;
                    }
                }
            }
            _ => peaks.push(i),
        }
    }

    peaks
        .into_iter()
        .map(|i| DetectedEvent {
            index: i,
            ts_us: refine_peak_time(timestamps, x, i),
            amplitude: x[i] - mean,
        })
        .collect()
}

fn refine_peak_time(ts: &[i64], x: &[f32], i: usize) -> i64 {
    let (y_m1, y_0, y_p1) = (x[i - 1], x[i], x[i + 1]);
    let denom = y_m1 - 2.0 * y_0 + y_p1;
    if denom.abs() <= 1e-12 {
        return ts[i];
    }
    let delta = (0.5 * (y_m1 - y_p1) / denom).clamp(-0.5, 0.5);
    let step = if delta >= 0.0 {
        ts[i + 1] - ts[i]
    } else {
        ts[i] - ts[i - 1]
    };
    ts[i] + (delta as f64 * step as f64).round() as i64
}

/// Upward crossings of `mean + h * std` after the signal has been below
/// `mean - h * std`.
///
/// Crossing times are linearly interpolated. The amplitude of an event is
/// the peak-to-trough range since the previous event.
pub fn detect_breaths(
    timestamps: &[i64],
    values: &[f32],
    hysteresis: f32,
    refractory_us: i64,
) -> Vec<DetectedEvent> {
    let n = values.len().min(timestamps.len());
    if n < 3 {
        return Vec::new();
    }
    let x = &values[..n];
    let (Some(mean), Some(std)) = (stats::mean(x), stats::std_dev(x)) else {
        return Vec::new();
    };
    if !(std > 1e-9) {
        return Vec::new();
    }
    let upper = mean + hysteresis * std;
    let lower = mean - hysteresis * std;

    let mut events: Vec<DetectedEvent> = Vec::new();
    let mut armed = x[0] < lower;
    let mut cycle_min = x[0];
    let mut cycle_max = x[0];

    for i in 1..n {
        cycle_min = cycle_min.min(x[i]);
        cycle_max = cycle_max.max(x[i]);
        if x[i] < lower {
            armed = true;
            continue;
        }
        if !(armed && x[i - 1] < upper && x[i] >= upper) {
            continue;
        }

        let frac = ((upper - x[i - 1]) / (x[i] - x[i - 1])).clamp(0.0, 1.0);
        let ts = timestamps[i - 1]
            + (frac as f64 * (timestamps[i] - timestamps[i - 1]) as f64).round() as i64;
        armed = false;

        if let Some(prev) = events.last() {
            if ts - prev.ts_us < refractory_us {
                continue;
            }
        }
        events.push(DetectedEvent {
            index: if frac < 0.5 { i - 1 } else { i },
            ts_us: ts,
            amplitude: cycle_max - cycle_min,
        });
        cycle_min = x[i];
        cycle_max = x[i];
    }
    events
}

/// Intervals between consecutive events, in milliseconds.
pub fn intervals_ms(events: &[DetectedEvent]) -> Vec<f32> {
    events
        .windows(2)
        .map(|w| (w[1].ts_us - w[0].ts_us) as f32 / 1000.0)
        .collect()
}
