//! Signal conditioning: detrend, outlier rejection, motion gating, band-pass.
//!
//! Conditioning is a pure function of a window snapshot. The output is always
//! aligned sample-for-sample with its input and is recomputed from scratch on
//! every tick.

use ndarray::Array1;
use serde::Serialize;

use crate::buffer::SampleWindow;
use crate::config::{Band, ConditionerConfig, MotionConfig};
use crate::dsp::spectrum::{dominant_frequency, SNR_FLOOR_DB};
use crate::dsp::{stats, BandpassFilter};

/// Samples further than this from the nearest motion sample get no motion
/// information.
const MOTION_MATCH_US: i64 = 250_000;

/// Band-limited signal aligned to a window snapshot.
#[derive(Debug, Clone)]
pub struct ConditionedSignal {
    pub timestamps: Vec<i64>,
    pub values: Array1<f32>,
    pub sample_rate_hz: f32,
    pub band: Band,
    /// Mean of the raw input (exposure level for the optical channel).
    pub dc_level: f32,
    pub snr_db: f32,
    /// Dominant in-band frequency, if any.
    pub dominant_hz: Option<f32>,
    /// Share of samples down-weighted because of concurrent motion.
    pub motion_gated_fraction: f32,
    /// Samples replaced by the neighbourhood outlier test or because they
    /// were non-finite.
    pub outliers_replaced: usize,
    /// Non-finite samples (sensor dropouts) among `outliers_replaced`.
    pub invalid_samples: usize,
    /// `false` when the input was too short to band-pass.
    pub filtered: bool,
}

impl ConditionedSignal {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Accelerometer activity over the motion window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MotionContext {
    timestamps: Vec<i64>,
    /// |magnitude - mean magnitude| per sample, in m/s².
    deviations: Vec<f32>,
    level: f32,
}

impl MotionContext {
    pub fn from_window(window: &SampleWindow, config: &MotionConfig) -> Self {
        if window.is_empty() {
            return Self::default();
        }
        let mags = window.values().to_vec();
        let mean = stats::mean(&mags).unwrap_or(0.0);
        let std = stats::std_dev(&mags).unwrap_or(0.0);
        Self {
            timestamps: window.timestamps(),
            deviations: mags.iter().map(|m| (m - mean).abs()).collect(),
            level: (std / config.full_scale).clamp(0.0, 1.0),
        }
    }

    /// Motion level in [0, 1]: magnitude std relative to the full-scale value.
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Deviation of the motion sample nearest to `ts_us`.
    pub fn deviation_at(&self, ts_us: i64) -> Option<f32> {
        if self.timestamps.is_empty() {
            return None;
        }
        let idx = match self.timestamps.binary_search(&ts_us) {
            Ok(i) => i,
            Err(i) => {
                if i == 0 {
                    0
                } else if i >= self.timestamps.len() {
                    self.timestamps.len() - 1
                } else if ts_us - self.timestamps[i - 1] <= self.timestamps[i] - ts_us {
                    i - 1
                } else {
                    i
                }
            }
        };
        if (self.timestamps[idx] - ts_us).abs() > MOTION_MATCH_US {
            return None;
        }
        Some(self.deviations[idx])
    }
}

#[derive(Debug, Clone)]
pub struct SignalConditioner {
    config: ConditionerConfig,
    motion: MotionConfig,
}

impl SignalConditioner {
    pub fn new(config: ConditionerConfig, motion: MotionConfig) -> Self {
        Self { config, motion }
    }

    pub fn condition(
        &self,
        window: &SampleWindow,
        band: Band,
        nominal_rate_hz: f32,
        motion: Option<&MotionContext>,
    ) -> ConditionedSignal {
        let fs = window
            .sample_rate_hz()
            .filter(|fs| fs.is_finite() && *fs > 0.0)
            .unwrap_or(nominal_rate_hz);
        self.condition_values(window.timestamps(), &window.values().to_vec(), fs, band, motion)
    }

    /// Condition raw values with explicit timestamps and sample rate.
    pub fn condition_values(
        &self,
        timestamps: Vec<i64>,
        raw: &[f32],
        sample_rate_hz: f32,
        band: Band,
        motion: Option<&MotionContext>,
    ) -> ConditionedSignal {
        let n = raw.len();

        let finite: Vec<f32> = raw.iter().copied().filter(|v| v.is_finite()).collect();
        let dc_level = stats::mean(&finite).unwrap_or(0.0);

        let invalid_samples = n - finite.len();
        let mut outliers_replaced = invalid_samples;
        // Non-finite samples sit at the mean and count as outliers
        let mut values: Vec<f32> = raw
            .iter()
            .map(|&v| if v.is_finite() { v - dc_level } else { 0.0 })
            .collect();

        if self.config.outlier_rejection && n > 2 {
            outliers_replaced += self.reject_outliers(&mut values);
        }

        let mut gated = 0usize;
        if let Some(ctx) = motion {
            if n == timestamps.len() {
                for (v, &ts) in values.iter_mut().zip(timestamps.iter()) {
                    if ctx.deviation_at(ts).is_some_and(|d| d > self.motion.gate_threshold) {
                        *v *= self.motion.down_weight;
                        gated += 1;
                    }
                }
            }
        }

        let can_filter = n >= self.config.min_samples_to_filter
            && sample_rate_hz.is_finite()
            && band.high_hz < sample_rate_hz * 0.5;
        let filtered_values = if can_filter {
            BandpassFilter::new(band, sample_rate_hz).filtfilt(&values)
        } else {
            values
        };

        let peak = if can_filter {
            dominant_frequency(&filtered_values, sample_rate_hz, band)
        } else {
            None
        };

        ConditionedSignal {
            timestamps,
            values: Array1::from(filtered_values),
            sample_rate_hz,
            band,
            dc_level,
            snr_db: peak.map(|p| p.snr_db).unwrap_or(SNR_FLOOR_DB),
            dominant_hz: peak.map(|p| p.freq_hz),
            motion_gated_fraction: if n == 0 { 0.0 } else { gated as f32 / n as f32 },
            outliers_replaced,
            invalid_samples,
            filtered: can_filter,
        }
    }

    /// Replace samples more than k local deviations from the mean of their
    /// neighbours with that mean. Neighbour statistics use the unmodified
    /// input.
    fn reject_outliers(&self, values: &mut [f32]) -> usize {
        let n = values.len();
        let h = self.config.neighborhood;
        let k = self.config.outlier_k;
        let global_std = stats::std_dev(values).unwrap_or(0.0);
        let floor = (global_std * 0.05).max(1e-6);
        let original = values.to_vec();

        let mut replaced = 0;
        let mut neighbours = Vec::with_capacity(2 * h);
        for i in 0..n {
            neighbours.clear();
            let lo = i.saturating_sub(h);
            let hi = (i + h).min(n - 1);
            neighbours.extend((lo..=hi).filter(|&j| j != i).map(|j| original[j]));
            let (Some(m), Some(s)) = (stats::mean(&neighbours), stats::std_dev(&neighbours)) else {
                continue;
            };
            if (original[i] - m).abs() > k * s.max(floor) {
                values[i] = m;
                replaced += 1;
            }
        }
        if replaced > 0 {
            log::debug!("conditioner replaced {replaced} outliers of {n} samples");
        }
        replaced
    }
}
