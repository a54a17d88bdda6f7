//! Processing configuration.
//!
//! Every numeric constant the pipeline uses lives here with a `Default`. The
//! defaults are working values for smartphone-grade sensors, not clinical
//! constants. Configuration is validated synchronously before any processing
//! happens, both at session start and on live updates.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub session: SessionConfig,
    pub pulse: PulseConfig,
    pub breathing: BreathingConfig,
    pub motion: MotionConfig,
    pub conditioner: ConditionerConfig,
    pub detector: DetectorConfig,
    pub hrv: HrvConfig,
    pub quality: QualityConfig,
    pub fusion: FusionConfig,
    pub baseline: BaselineConfig,
    pub spo2: Spo2Config,
    pub aggregate: AggregateConfig,
}

/// Frequency band in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low_hz: f32,
    pub high_hz: f32,
}

impl Band {
    pub const HEART: Band = Band { low_hz: 0.7, high_hz: 3.5 };
    pub const BREATHING: Band = Band { low_hz: 0.13, high_hz: 0.5 };

    pub fn center_hz(&self) -> f32 {
        (self.low_hz * self.high_hz).sqrt()
    }

    fn validate(&self, name: &str, nominal_rate_hz: f32) -> Result<(), ConfigError> {
        if !(self.low_hz > 0.0 && self.low_hz < self.high_hz) {
            return Err(ConfigError::Validation(format!(
                "{name}: band must satisfy 0 < low_hz < high_hz (got {} .. {})",
                self.low_hz, self.high_hz
            )));
        }
        if self.high_hz >= nominal_rate_hz * 0.5 {
            return Err(ConfigError::Validation(format!(
                "{name}: high_hz {} must be below Nyquist ({} Hz)",
                self.high_hz,
                nominal_rate_hz * 0.5
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cadence of the conditioning/extraction tick.
    pub tick_interval_ms: u64,
    /// A channel without new samples for this long is reported as stalled.
    pub stall_timeout_ms: u64,
    /// Capacity of each producer queue in the threaded runtime.
    pub sample_queue_capacity: usize,
    /// Capacity of the outgoing event queue in the threaded runtime.
    pub event_queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub window_sec: f32,
    /// Expected camera frame rate; sizes buffers and bounds the filter band.
    pub nominal_rate_hz: f32,
    pub min_samples: usize,
    pub band: Band,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreathingConfig {
    pub window_sec: f32,
    pub nominal_rate_hz: f32,
    pub min_samples: usize,
    pub band: Band,
    /// Crossing hysteresis in units of the conditioned signal's std.
    pub hysteresis: f32,
    /// Interval coefficient of variation above which the pattern is irregular.
    pub irregular_cv: f32,
    /// Amplitude ratio to baseline below which breathing is shallow.
    pub shallow_ratio: f32,
    /// Amplitude ratio to baseline above which breathing is deep.
    pub deep_ratio: f32,
    /// EMA weight of the rolling amplitude baseline.
    pub amplitude_baseline_alpha: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub window_sec: f32,
    pub nominal_rate_hz: f32,
    /// Accelerometer magnitude deviation (m/s²) above which a concurrent
    /// pulse or audio sample is down-weighted.
    pub gate_threshold: f32,
    /// Multiplier applied to gated samples (0 removes them entirely).
    pub down_weight: f32,
    /// Magnitude std (m/s²) that maps to motion level 1.0.
    pub full_scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionerConfig {
    pub outlier_rejection: bool,
    /// Deviation, in local standard deviations, beyond which a sample is an outlier.
    pub outlier_k: f32,
    /// Half width of the outlier neighbourhood in samples.
    pub neighborhood: usize,
    /// Below this many samples the band-pass is skipped.
    pub min_samples_to_filter: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Peak threshold = mean + threshold_c * std.
    pub threshold_c: f32,
    /// Sets the pulse refractory interval (60 / max_heart_bpm seconds).
    pub max_heart_bpm: f32,
    pub min_heart_bpm: f32,
    pub max_breathing_bpm: f32,
    pub min_breathing_bpm: f32,
    /// Intervals needed before heart-rate confidence saturates.
    pub full_confidence_intervals: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HrvConfig {
    /// Intervals needed before HRV confidence is considered usable.
    pub min_intervals: usize,
    /// Length of the beat history HRV is computed over.
    pub history_sec: f32,
    /// Minimum history span before LF/HF power is reported.
    pub min_spectral_span_sec: f32,
    /// Tachogram resampling rate for spectral analysis.
    pub resample_hz: f32,
    /// Beats this close to the newest sample are committed on a later tick.
    pub edge_guard_sec: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub snr_weight: f32,
    pub motion_weight: f32,
    pub adequacy_weight: f32,
    /// Composite score above which a channel is usable for analysis.
    pub usable_cutoff: f32,
    /// SNR (dB) mapping to a 0.5 SNR score.
    pub snr_mid_db: f32,
    /// Slope of the SNR logistic.
    pub snr_k: f32,
    /// Raw intensity that corresponds to full exposure.
    pub lighting_full_scale: f32,
    /// Acceptable normalized exposure range.
    pub lighting_min: f32,
    pub lighting_max: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub hrv_weight: f32,
    pub heart_rate_weight: f32,
    pub breathing_weight: f32,
    /// Heart-rate elevation (bpm) that saturates the heart-rate factor.
    pub hr_span_bpm: f32,
    /// Breathing-rate elevation (brpm) that saturates the breathing factor.
    pub breathing_span_bpm: f32,
}

/// Resting reference values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub heart_rate_bpm: f32,
    pub rmssd_ms: f32,
    pub breathing_bpm: f32,
}

impl Baseline {
    pub const POPULATION: Baseline = Baseline {
        heart_rate_bpm: 70.0,
        rmssd_ms: 40.0,
        breathing_bpm: 14.0,
    };
}

impl Default for Baseline {
    fn default() -> Self {
        Self::POPULATION
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub population: Baseline,
    /// User-specific baseline; takes precedence when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Baseline>,
}

impl BaselineConfig {
    pub fn effective(&self) -> Baseline {
        self.user.unwrap_or(self.population)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spo2Config {
    pub enabled: bool,
    pub max_confidence: f32,
    pub min_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Number of recent estimates the trend slope is fitted over.
    pub trend_window: usize,
    /// Slope per estimate, relative to the metric mean, treated as flat.
    pub trend_dead_band: f32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            pulse: PulseConfig::default(),
            breathing: BreathingConfig::default(),
            motion: MotionConfig::default(),
            conditioner: ConditionerConfig::default(),
            detector: DetectorConfig::default(),
            hrv: HrvConfig::default(),
            quality: QualityConfig::default(),
            fusion: FusionConfig::default(),
            baseline: BaselineConfig::default(),
            spo2: Spo2Config::default(),
            aggregate: AggregateConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            stall_timeout_ms: 3_000,
            sample_queue_capacity: 4_096,
            event_queue_capacity: 1_024,
        }
    }
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            window_sec: 10.0,
            nominal_rate_hz: 30.0,
            min_samples: 60,
            band: Band::HEART,
        }
    }
}

impl Default for BreathingConfig {
    fn default() -> Self {
        Self {
            window_sec: 60.0,
            nominal_rate_hz: 20.0,
            min_samples: 100,
            band: Band::BREATHING,
            hysteresis: 0.3,
            irregular_cv: 0.25,
            shallow_ratio: 0.6,
            deep_ratio: 1.6,
            amplitude_baseline_alpha: 0.2,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            window_sec: 10.0,
            nominal_rate_hz: 50.0,
            gate_threshold: 1.5,
            down_weight: 0.2,
            full_scale: 3.0,
        }
    }
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            outlier_rejection: true,
            outlier_k: 3.0,
            neighborhood: 5,
            min_samples_to_filter: 16,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_c: 0.5,
            max_heart_bpm: 220.0,
            min_heart_bpm: 40.0,
            max_breathing_bpm: 60.0,
            min_breathing_bpm: 4.0,
            full_confidence_intervals: 3,
        }
    }
}

impl Default for HrvConfig {
    fn default() -> Self {
        Self {
            min_intervals: 30,
            history_sec: 120.0,
            min_spectral_span_sec: 60.0,
            resample_hz: 4.0,
            edge_guard_sec: 0.5,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            snr_weight: 0.5,
            motion_weight: 0.3,
            adequacy_weight: 0.2,
            usable_cutoff: 0.7,
            snr_mid_db: 3.0,
            snr_k: 0.6,
            lighting_full_scale: 255.0,
            lighting_min: 0.15,
            lighting_max: 0.95,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            hrv_weight: 0.4,
            heart_rate_weight: 0.3,
            breathing_weight: 0.3,
            hr_span_bpm: 30.0,
            breathing_span_bpm: 10.0,
        }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            population: Baseline::POPULATION,
            user: None,
        }
    }
}

impl Default for Spo2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            max_confidence: 0.5,
            min_samples: 90,
        }
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            trend_window: 10,
            trend_dead_band: 0.005,
        }
    }
}

impl ProcessingConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: ProcessingConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Variables are prefixed with `ZENB_VITALS_`, e.g.
    /// `ZENB_VITALS_TICK_INTERVAL_MS=500`.
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from multiple sources, later layers winning:
    /// built-in defaults, default file, user file, environment.
    pub fn load_layered(
        default_path: Option<&Path>,
        user_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut config = ProcessingConfig::default();

        if let Some(path) = default_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        }

        // Missing keys in the user file fall back to built-in defaults, not to
        // the default file.
        if let Some(path) = user_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        env_override("ZENB_VITALS_TICK_INTERVAL_MS", &mut self.session.tick_interval_ms)?;
        env_override("ZENB_VITALS_STALL_TIMEOUT_MS", &mut self.session.stall_timeout_ms)?;
        env_override("ZENB_VITALS_PULSE_WINDOW_SEC", &mut self.pulse.window_sec)?;
        env_override("ZENB_VITALS_PULSE_RATE_HZ", &mut self.pulse.nominal_rate_hz)?;
        env_override("ZENB_VITALS_BREATHING_WINDOW_SEC", &mut self.breathing.window_sec)?;
        env_override("ZENB_VITALS_OUTLIER_REJECTION", &mut self.conditioner.outlier_rejection)?;
        env_override("ZENB_VITALS_OUTLIER_K", &mut self.conditioner.outlier_k)?;
        env_override("ZENB_VITALS_FUSION_HRV_WEIGHT", &mut self.fusion.hrv_weight)?;
        env_override("ZENB_VITALS_FUSION_HR_WEIGHT", &mut self.fusion.heart_rate_weight)?;
        env_override("ZENB_VITALS_FUSION_BREATHING_WEIGHT", &mut self.fusion.breathing_weight)?;
        env_override("ZENB_VITALS_USABLE_CUTOFF", &mut self.quality.usable_cutoff)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.tick_interval_ms == 0 {
            return Err(invalid("session.tick_interval_ms must be > 0"));
        }
        if self.session.stall_timeout_ms == 0 {
            return Err(invalid("session.stall_timeout_ms must be > 0"));
        }
        if self.session.sample_queue_capacity == 0 || self.session.event_queue_capacity == 0 {
            return Err(invalid("session queue capacities must be > 0"));
        }

        for (name, window, rate) in [
            ("pulse", self.pulse.window_sec, self.pulse.nominal_rate_hz),
            ("breathing", self.breathing.window_sec, self.breathing.nominal_rate_hz),
            ("motion", self.motion.window_sec, self.motion.nominal_rate_hz),
        ] {
            if !(window > 0.0 && window.is_finite()) {
                return Err(invalid(&format!("{name}.window_sec must be positive")));
            }
            if !(rate > 0.0 && rate.is_finite()) {
                return Err(invalid(&format!("{name}.nominal_rate_hz must be positive")));
            }
        }
        self.pulse.band.validate("pulse.band", self.pulse.nominal_rate_hz)?;
        self.breathing.band.validate("breathing.band", self.breathing.nominal_rate_hz)?;

        if self.breathing.hysteresis <= 0.0 {
            return Err(invalid("breathing.hysteresis must be positive"));
        }
        if self.breathing.shallow_ratio <= 0.0
            || self.breathing.shallow_ratio >= 1.0
            || self.breathing.deep_ratio <= 1.0
        {
            return Err(invalid(
                "breathing amplitude ratios must satisfy 0 < shallow_ratio < 1 < deep_ratio",
            ));
        }
        if !(0.0..=1.0).contains(&self.breathing.amplitude_baseline_alpha) {
            return Err(invalid("breathing.amplitude_baseline_alpha must be in [0, 1]"));
        }

        if self.motion.gate_threshold <= 0.0 || self.motion.full_scale <= 0.0 {
            return Err(invalid("motion thresholds must be positive"));
        }
        if !(0.0..=1.0).contains(&self.motion.down_weight) {
            return Err(invalid("motion.down_weight must be in [0, 1]"));
        }

        if self.conditioner.outlier_k <= 0.0 {
            return Err(invalid("conditioner.outlier_k must be positive"));
        }
        if self.conditioner.neighborhood == 0 {
            return Err(invalid("conditioner.neighborhood must be > 0"));
        }

        if self.detector.threshold_c < 0.0 {
            return Err(invalid("detector.threshold_c must be >= 0"));
        }
        if self.detector.min_heart_bpm <= 0.0
            || self.detector.min_heart_bpm >= self.detector.max_heart_bpm
        {
            return Err(invalid("detector heart-rate bounds must satisfy 0 < min < max"));
        }
        if self.detector.min_breathing_bpm <= 0.0
            || self.detector.min_breathing_bpm >= self.detector.max_breathing_bpm
        {
            return Err(invalid("detector breathing bounds must satisfy 0 < min < max"));
        }
        if self.detector.full_confidence_intervals == 0 {
            return Err(invalid("detector.full_confidence_intervals must be > 0"));
        }

        if self.hrv.min_intervals < 2 {
            return Err(invalid("hrv.min_intervals must be >= 2"));
        }
        if self.hrv.history_sec <= 0.0 || self.hrv.resample_hz <= 0.0 {
            return Err(invalid("hrv.history_sec and hrv.resample_hz must be positive"));
        }
        if self.hrv.edge_guard_sec < 0.0 {
            return Err(invalid("hrv.edge_guard_sec must be >= 0"));
        }

        let q = &self.quality;
        if [q.snr_weight, q.motion_weight, q.adequacy_weight].iter().any(|&w| w < 0.0) {
            return Err(invalid("quality weights must be non-negative"));
        }
        let q_sum = q.snr_weight + q.motion_weight + q.adequacy_weight;
        if (q_sum - 1.0).abs() > 1e-3 {
            return Err(invalid(&format!("quality weights must sum to 1 (got {q_sum})")));
        }
        if !(q.usable_cutoff > 0.0 && q.usable_cutoff < 1.0) {
            return Err(invalid("quality.usable_cutoff must be in (0, 1)"));
        }
        if q.snr_k <= 0.0 || q.lighting_full_scale <= 0.0 {
            return Err(invalid("quality.snr_k and quality.lighting_full_scale must be positive"));
        }
        if !(0.0 <= q.lighting_min && q.lighting_min < q.lighting_max && q.lighting_max <= 1.0) {
            return Err(invalid("quality lighting range must satisfy 0 <= min < max <= 1"));
        }

        let f = &self.fusion;
        if [f.hrv_weight, f.heart_rate_weight, f.breathing_weight].iter().any(|&w| w < 0.0) {
            return Err(invalid("fusion weights must be non-negative"));
        }
        if f.hrv_weight + f.heart_rate_weight + f.breathing_weight <= 0.0 {
            return Err(invalid("at least one fusion weight must be positive"));
        }
        if f.hr_span_bpm <= 0.0 || f.breathing_span_bpm <= 0.0 {
            return Err(invalid("fusion spans must be positive"));
        }

        let baselines = [
            ("population", Some(self.baseline.population)),
            ("user", self.baseline.user),
        ];
        for (name, b) in baselines {
            if let Some(b) = b {
                if b.heart_rate_bpm <= 0.0 || b.rmssd_ms <= 0.0 || b.breathing_bpm <= 0.0 {
                    return Err(invalid(&format!("baseline.{name} values must be positive")));
                }
            }
        }

        if !(0.0..=1.0).contains(&self.spo2.max_confidence) {
            return Err(invalid("spo2.max_confidence must be in [0, 1]"));
        }
        if self.aggregate.trend_window < 3 {
            return Err(invalid("aggregate.trend_window must be >= 3"));
        }
        if self.aggregate.trend_dead_band < 0.0 {
            return Err(invalid("aggregate.trend_dead_band must be >= 0"));
        }

        Ok(())
    }

    /// Export configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Validation(msg.to_string())
}

fn env_override<T: FromStr>(var: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(val) = std::env::var(var) {
        *target = val
            .parse()
            .map_err(|_| ConfigError::Validation(format!("Invalid {var}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ProcessingConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_band() {
        let mut cfg = ProcessingConfig::default();
        cfg.pulse.band = Band { low_hz: 3.0, high_hz: 1.0 };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_band_above_nyquist() {
        let mut cfg = ProcessingConfig::default();
        cfg.pulse.nominal_rate_hz = 5.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_quality_weights_not_summing_to_one() {
        let mut cfg = ProcessingConfig::default();
        cfg.quality.snr_weight = 0.9;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1"));
    }

    #[test]
    fn rejects_negative_fusion_weight() {
        let mut cfg = ProcessingConfig::default();
        cfg.fusion.hrv_weight = -0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_all_zero_fusion_weights() {
        let mut cfg = ProcessingConfig::default();
        cfg.fusion.hrv_weight = 0.0;
        cfg.fusion.heart_rate_weight = 0.0;
        cfg.fusion.breathing_weight = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn user_baseline_takes_precedence() {
        let mut cfg = BaselineConfig::default();
        assert_eq!(cfg.effective(), Baseline::POPULATION);
        let user = Baseline {
            heart_rate_bpm: 58.0,
            rmssd_ms: 65.0,
            breathing_bpm: 11.0,
        };
        cfg.user = Some(user);
        assert_eq!(cfg.effective(), user);
    }

    #[test]
    fn toml_round_trip() {
        let mut cfg = ProcessingConfig::default();
        cfg.conditioner.outlier_rejection = false;
        cfg.baseline.user = Some(Baseline {
            heart_rate_bpm: 62.0,
            rmssd_ms: 55.0,
            breathing_bpm: 12.0,
        });
        let text = cfg.to_toml_string().unwrap();
        let parsed: ProcessingConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let parsed: ProcessingConfig = toml::from_str(
            r#"
            [fusion]
            hrv_weight = 0.5
            heart_rate_weight = 0.25
            breathing_weight = 0.25
            "#,
        )
        .unwrap();
        assert_eq!(parsed.fusion.hrv_weight, 0.5);
        assert_eq!(parsed.pulse, PulseConfig::default());
        parsed.validate().unwrap();
    }

    #[test]
    fn env_override_parses_and_rejects() {
        let mut cfg = ProcessingConfig::default();
        std::env::set_var("ZENB_VITALS_OUTLIER_K", "2.5");
        cfg.apply_env_overrides().unwrap();
        assert_eq!(cfg.conditioner.outlier_k, 2.5);

        std::env::set_var("ZENB_VITALS_OUTLIER_K", "not-a-number");
        assert!(cfg.apply_env_overrides().is_err());
        std::env::remove_var("ZENB_VITALS_OUTLIER_K");
    }
}
