//! Per-channel signal quality.
//!
//! The composite score is a weighted sum of an SNR score (logistic on dB),
//! inverse motion level, and lighting/contact adequacy. Every term is in
//! [0, 1] and the weights sum to 1, so the composite is too.

use crate::buffer::ChannelKind;
use crate::conditioner::ConditionedSignal;
use crate::config::QualityConfig;
use crate::dsp::spectrum::SNR_CEIL_DB;
use crate::measurement::{OverallQuality, QualityAssessment};

#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Logistic map of SNR (dB) to [0, 1], 0.5 at `snr_mid_db`.
    pub fn snr_score(&self, snr_db: f32) -> f32 {
        let x = self.config.snr_k * (snr_db - self.config.snr_mid_db);
        (1.0 / (1.0 + (-x).exp())).clamp(0.0, 1.0)
    }

    /// Exposure adequacy of a raw intensity level.
    ///
    /// 1 inside the acceptable range, falling linearly to 0 at full dark or
    /// full saturation.
    pub fn lighting_level(&self, dc_level: f32) -> f32 {
        let c = &self.config;
        let e = (dc_level / c.lighting_full_scale).clamp(0.0, 1.0);
        let level = if e < c.lighting_min {
            e / c.lighting_min.max(1e-6)
        } else if e > c.lighting_max {
            (1.0 - e) / (1.0 - c.lighting_max).max(1e-6)
        } else {
            1.0
        };
        level.clamp(0.0, 1.0)
    }

    /// Weighted composite in [0, 1]. Non-increasing in `motion_level`.
    pub fn composite_score(&self, snr_db: f32, motion_level: f32, adequacy: f32) -> f32 {
        let c = &self.config;
        let score = c.snr_weight * self.snr_score(snr_db)
            + c.motion_weight * (1.0 - motion_level.clamp(0.0, 1.0))
            + c.adequacy_weight * adequacy.clamp(0.0, 1.0);
        score.clamp(0.0, 1.0)
    }

    /// Assess a conditioned channel window.
    ///
    /// `min_samples` is the sample count at which the window counts as fully
    /// populated; shorter windows lower contact quality proportionally.
    pub fn assess(
        &self,
        channel: ChannelKind,
        ts_us: i64,
        signal: &ConditionedSignal,
        motion_level: f32,
        min_samples: usize,
    ) -> QualityAssessment {
        let n = signal.len();
        let sufficiency = if min_samples == 0 {
            1.0
        } else {
            (n as f32 / min_samples as f32).min(1.0)
        };
        // Dropouts, not local outliers: noise is already in the SNR term
        let invalid_fraction = if n == 0 {
            0.0
        } else {
            signal.invalid_samples as f32 / n as f32
        };
        let contact_quality = (sufficiency * (1.0 - invalid_fraction)).clamp(0.0, 1.0);

        let lighting_level = match channel {
            ChannelKind::PulseIntensity if n > 0 => self.lighting_level(signal.dc_level),
            ChannelKind::PulseIntensity => 0.0,
            _ => 1.0,
        };
        self.finish(
            channel,
            ts_us,
            signal.snr_db,
            motion_level,
            lighting_level,
            contact_quality,
        )
    }

    /// Assessment for a context channel (the accelerometer), which has no
    /// SNR or exposure of its own.
    pub fn assess_context(
        &self,
        channel: ChannelKind,
        ts_us: i64,
        sample_count: usize,
        min_samples: usize,
        motion_level: f32,
    ) -> QualityAssessment {
        let contact_quality = if min_samples == 0 {
            1.0
        } else {
            (sample_count as f32 / min_samples as f32).min(1.0)
        };
        self.finish(channel, ts_us, SNR_CEIL_DB, motion_level, 1.0, contact_quality)
    }

    /// Assessment for a channel that stopped delivering samples.
    pub fn stalled(&self, channel: ChannelKind, ts_us: i64) -> QualityAssessment {
        QualityAssessment {
            ts_us,
            channel,
            snr_db: 0.0,
            motion_level: 0.0,
            lighting_level: 0.0,
            contact_quality: 0.0,
            composite_score: 0.0,
            overall: OverallQuality::Poor,
            usable_for_analysis: false,
            stalled: true,
        }
    }

    fn finish(
        &self,
        channel: ChannelKind,
        ts_us: i64,
        snr_db: f32,
        motion_level: f32,
        lighting_level: f32,
        contact_quality: f32,
    ) -> QualityAssessment {
        let adequacy = lighting_level * contact_quality;
        let composite_score = self.composite_score(snr_db, motion_level, adequacy);
        QualityAssessment {
            ts_us,
            channel,
            snr_db,
            motion_level: motion_level.clamp(0.0, 1.0),
            lighting_level,
            contact_quality,
            composite_score,
            overall: OverallQuality::from_score(composite_score),
            usable_for_analysis: composite_score > self.config.usable_cutoff,
            stalled: false,
        }
    }
}
