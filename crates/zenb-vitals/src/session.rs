//! Monitoring session: owns the channel buffers and runs the pipeline on
//! every tick.
//!
//! `Session` is synchronous and deterministic: callers push samples and call
//! [`Session::tick`] with their own clock. The threaded runtime in
//! [`crate::runtime`] drives the same type from a worker thread.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::aggregate::{coherence_ratio, SessionAggregate, SessionAggregator};
use crate::buffer::{ChannelKind, Sample, SampleBuffer};
use crate::conditioner::{MotionContext, SignalConditioner};
use crate::config::{ConfigError, ProcessingConfig};
use crate::detector::{DetectedEvent, EventDetector};
use crate::error::{SessionError, VitalsError};
use crate::extract::breathing::update_amplitude_baseline;
use crate::extract::hrv::interval_range_ms;
use crate::extract::{
    compute_hrv, estimate_breathing, estimate_heart_rate, estimate_spo2, frequency_domain,
    Extracted,
};
use crate::fusion::{FusionInput, FusionInputs, StressFusion};
use crate::measurement::{
    Anomaly, AnomalyKind, BreathingSample, HeartRateSample, HrvSample, Measurement,
    PipelineEvent, QualityAssessment, Spo2Sample, StressSample,
};
use crate::quality::QualityScorer;
use crate::source::SignalSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Monitoring,
    Stopped,
}

/// Most recent value of every metric, as of the last tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatestValues {
    pub ts_us: Option<i64>,
    pub heart_rate: Option<HeartRateSample>,
    pub hrv: Option<HrvSample>,
    pub breathing: Option<BreathingSample>,
    pub stress: Option<StressSample>,
    pub spo2: Option<Spo2Sample>,
    pub quality: Vec<QualityAssessment>,
    pub coherence: Option<f32>,
}

#[derive(Debug)]
struct ChannelSlot {
    buffer: SampleBuffer,
    /// Samples arrived since the previous tick.
    fresh: bool,
    /// Tick time at which samples were last seen.
    last_arrival_us: i64,
}

/// Per-channel output of one tick.
#[derive(Debug, Default)]
struct ChannelOutput {
    events: Vec<PipelineEvent>,
    heart_rate: Option<FusionInput>,
    rmssd: Option<FusionInput>,
    breathing: Option<FusionInput>,
    breathing_hz: Option<f32>,
}

impl ChannelOutput {
    fn anomaly(
        &mut self,
        ts_us: i64,
        channel: ChannelKind,
        kind: AnomalyKind,
        value: Option<f32>,
        detail: String,
    ) {
        log::warn!("{channel:?}: {detail}");
        self.events.push(PipelineEvent::Anomaly(Anomaly {
            ts_us,
            channel,
            kind,
            value,
            detail,
        }));
    }
}

pub struct Session {
    config: ProcessingConfig,
    state: SessionState,
    channels: BTreeMap<ChannelKind, ChannelSlot>,
    conditioner: SignalConditioner,
    detector: EventDetector,
    scorer: QualityScorer,
    fusion: StressFusion,
    /// Committed beat times, bounded by `hrv.history_sec`.
    beats: VecDeque<i64>,
    amplitude_baseline: Option<f32>,
    last_breath_us: Option<i64>,
    aggregator: Option<SessionAggregator>,
    last_tick_us: Option<i64>,
    latest: LatestValues,
    #[cfg(test)]
    fault: Option<ChannelKind>,
}

impl Session {
    pub fn new(config: ProcessingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            conditioner: SignalConditioner::new(config.conditioner.clone(), config.motion.clone()),
            detector: EventDetector::new(config.detector.clone(), &config.breathing),
            scorer: QualityScorer::new(config.quality.clone()),
            fusion: StressFusion::new(config.fusion.clone(), config.baseline.effective()),
            config,
            state: SessionState::Idle,
            channels: BTreeMap::new(),
            beats: VecDeque::new(),
            amplitude_baseline: None,
            last_breath_us: None,
            aggregator: None,
            last_tick_us: None,
            latest: LatestValues::default(),
            #[cfg(test)]
            fault: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn latest(&self) -> &LatestValues {
        &self.latest
    }

    pub fn open_channels(&self) -> Vec<ChannelKind> {
        self.channels.keys().copied().collect()
    }

    /// Samples the channel's buffer refused (out of order or non-finite).
    pub fn rejected_samples(&self, kind: ChannelKind) -> u64 {
        self.channels.get(&kind).map_or(0, |slot| slot.buffer.rejected())
    }

    /// In-window samples the channel's buffer dropped at its length cap.
    pub fn evicted_samples(&self, kind: ChannelKind) -> u64 {
        self.channels.get(&kind).map_or(0, |slot| slot.buffer.evicted_in_window())
    }

    /// Open `source` and enable its channel.
    ///
    /// An acquisition failure only affects this channel; the session stays
    /// usable with whatever else is open.
    pub fn open_channel(&mut self, source: &mut dyn SignalSource) -> Result<(), VitalsError> {
        if self.state == SessionState::Stopped {
            return Err(SessionError::Stopped.into());
        }
        let kind = source.kind();
        if self.channels.contains_key(&kind) {
            return Err(crate::error::AcquisitionError::AlreadyOpen(kind).into());
        }
        if let Err(err) = source.open() {
            log::warn!("failed to open {kind:?} channel: {err}");
            return Err(err.into());
        }
        self.enable_channel(kind)
    }

    /// Enable a channel whose samples will be pushed directly.
    pub fn enable_channel(&mut self, kind: ChannelKind) -> Result<(), VitalsError> {
        if self.state == SessionState::Stopped {
            return Err(SessionError::Stopped.into());
        }
        if self.channels.contains_key(&kind) {
            return Err(crate::error::AcquisitionError::AlreadyOpen(kind).into());
        }
        let (window_sec, rate) = self.window_for(kind);
        self.channels.insert(
            kind,
            ChannelSlot {
                buffer: SampleBuffer::new(kind, window_sec, rate),
                fresh: false,
                last_arrival_us: self.last_tick_us.unwrap_or(0),
            },
        );
        log::debug!("{kind:?} channel enabled");
        Ok(())
    }

    fn window_for(&self, kind: ChannelKind) -> (f32, f32) {
        match kind {
            ChannelKind::PulseIntensity => {
                (self.config.pulse.window_sec, self.config.pulse.nominal_rate_hz)
            }
            ChannelKind::AudioEnvelope => {
                (self.config.breathing.window_sec, self.config.breathing.nominal_rate_hz)
            }
            ChannelKind::Motion => {
                (self.config.motion.window_sec, self.config.motion.nominal_rate_hz)
            }
        }
    }

    /// `Idle -> Monitoring`. Needs at least one enabled channel.
    pub fn start(&mut self, now_us: i64) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Monitoring => {
                return Err(SessionError::InvalidTransition {
                    from: SessionState::Monitoring,
                    to: SessionState::Monitoring,
                })
            }
            SessionState::Stopped => return Err(SessionError::Stopped),
        }
        if self.channels.is_empty() {
            return Err(SessionError::NoChannels);
        }
        for slot in self.channels.values_mut() {
            slot.last_arrival_us = now_us;
            slot.fresh = false;
        }
        self.aggregator = Some(SessionAggregator::new(now_us, &self.config.aggregate));
        self.last_tick_us = Some(now_us);
        self.state = SessionState::Monitoring;
        log::info!("Monitoring started with channels {:?}", self.open_channels());
        Ok(())
    }

    /// Append a sample to its channel buffer.
    ///
    /// Returns `false` when the session is not monitoring, the channel is not
    /// enabled, or the buffer refused the sample.
    pub fn push(&mut self, kind: ChannelKind, sample: Sample) -> bool {
        if self.state != SessionState::Monitoring {
            return false;
        }
        let Some(slot) = self.channels.get_mut(&kind) else {
            return false;
        };
        let accepted = slot.buffer.push(sample);
        slot.fresh |= accepted;
        accepted
    }

    /// Validate and apply a new configuration. Buffers keep their samples.
    pub fn update_config(&mut self, config: ProcessingConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.conditioner =
            SignalConditioner::new(config.conditioner.clone(), config.motion.clone());
        self.detector = EventDetector::new(config.detector.clone(), &config.breathing);
        self.scorer = QualityScorer::new(config.quality.clone());
        self.fusion = StressFusion::new(config.fusion.clone(), config.baseline.effective());
        self.config = config;
        let kinds: Vec<ChannelKind> = self.channels.keys().copied().collect();
        for kind in kinds {
            let (window_sec, rate) = self.window_for(kind);
            if let Some(slot) = self.channels.get_mut(&kind) {
                slot.buffer.set_window(window_sec, rate);
            }
        }
        log::info!("Processing configuration updated");
        Ok(())
    }

    /// Run the pipeline over the current windows.
    ///
    /// Does nothing unless monitoring. A panic while processing one channel
    /// is logged, reported as an anomaly, and only skips that channel.
    pub fn tick(&mut self, now_us: i64) -> Vec<PipelineEvent> {
        if self.state != SessionState::Monitoring {
            return Vec::new();
        }
        self.last_tick_us = Some(now_us);
        let stall_us = self.config.session.stall_timeout_ms as i64 * 1_000;

        let mut stalled = Vec::new();
        for (&kind, slot) in self.channels.iter_mut() {
            if slot.fresh {
                slot.last_arrival_us = now_us;
                slot.fresh = false;
            }
            if now_us - slot.last_arrival_us > stall_us {
                stalled.push(kind);
            }
        }

        let motion = match self.channels.get(&ChannelKind::Motion) {
            Some(slot) if !stalled.contains(&ChannelKind::Motion) => Some(
                MotionContext::from_window(&slot.buffer.snapshot(), &self.config.motion),
            ),
            _ => None,
        };
        let motion_level = motion.as_ref().map_or(0.0, |m| m.level());

        let mut events = Vec::new();
        let mut inputs = FusionInputs::default();
        let mut breathing_hz = None;

        let kinds: Vec<ChannelKind> = self.channels.keys().copied().collect();
        for kind in kinds {
            if stalled.contains(&kind) {
                log::warn!("{kind:?} channel stalled: no samples for over {stall_us} us");
                events.push(PipelineEvent::Quality(self.scorer.stalled(kind, now_us)));
                continue;
            }

            let result = catch_unwind(AssertUnwindSafe(|| {
                self.process_channel(kind, now_us, motion.as_ref(), motion_level)
            }));
            match result {
                Ok(out) => {
                    events.extend(out.events);
                    inputs.heart_rate_bpm = inputs.heart_rate_bpm.or(out.heart_rate);
                    inputs.rmssd_ms = inputs.rmssd_ms.or(out.rmssd);
                    inputs.breathing_bpm = inputs.breathing_bpm.or(out.breathing);
                    breathing_hz = breathing_hz.or(out.breathing_hz);
                }
                Err(_) => {
                    log::error!("{kind:?} processing panicked; skipping this cycle");
                    events.push(PipelineEvent::Anomaly(Anomaly {
                        ts_us: now_us,
                        channel: kind,
                        kind: AnomalyKind::ProcessingFault,
                        value: None,
                        detail: "channel processing panicked".to_string(),
                    }));
                }
            }
        }

        if let Some(stress) = self.fusion.fuse(now_us, &inputs) {
            events.push(PipelineEvent::Measurement(Measurement::Stress(stress)));
        }

        let coherence = breathing_hz.and_then(|hz| {
            let beats: Vec<i64> = self.beats.iter().copied().collect();
            coherence_ratio(&beats, hz, self.config.hrv.resample_hz)
        });

        if let Some(agg) = self.aggregator.as_mut() {
            for ev in &events {
                match ev {
                    PipelineEvent::Measurement(m) => agg.record(m),
                    PipelineEvent::Anomaly(_) => agg.record_anomaly(),
                    _ => {}
                }
            }
            if let Some(c) = coherence {
                agg.record_coherence(c);
            }
        }

        self.publish_latest(now_us, &events, coherence);
        log::debug!("tick at {now_us} us produced {} events", events.len());
        events
    }

    /// Stop the session. Idempotent.
    ///
    /// From `Monitoring` the buffers and beat history are discarded and the
    /// session aggregate is returned. From `Idle` or `Stopped` nothing is
    /// returned.
    pub fn stop(&mut self, now_us: i64) -> Option<SessionAggregate> {
        let previous = self.state;
        self.state = SessionState::Stopped;
        for slot in self.channels.values_mut() {
            slot.buffer.clear();
            slot.fresh = false;
        }
        self.beats.clear();

        match previous {
            SessionState::Monitoring => {
                let aggregate = self.aggregator.take().map(|agg| agg.finish(now_us));
                log::info!("Monitoring stopped");
                aggregate
            }
            SessionState::Idle => {
                log::info!("Session stopped before monitoring started");
                None
            }
            SessionState::Stopped => None,
        }
    }

    fn process_channel(
        &mut self,
        kind: ChannelKind,
        now_us: i64,
        motion: Option<&MotionContext>,
        motion_level: f32,
    ) -> ChannelOutput {
        #[cfg(test)]
        if self.fault == Some(kind) {
            panic!("injected fault on {kind:?}");
        }
        match kind {
            ChannelKind::PulseIntensity => self.process_pulse(now_us, motion, motion_level),
            ChannelKind::AudioEnvelope => self.process_breathing(now_us, motion, motion_level),
            ChannelKind::Motion => self.process_motion(now_us, motion_level),
        }
    }

    fn process_pulse(
        &mut self,
        now_us: i64,
        motion: Option<&MotionContext>,
        motion_level: f32,
    ) -> ChannelOutput {
        let kind = ChannelKind::PulseIntensity;
        let mut out = ChannelOutput::default();
        let Some(slot) = self.channels.get(&kind) else {
            return out;
        };
        let window = slot.buffer.snapshot();
        let cfg = &self.config;

        let signal = self
            .conditioner
            .condition(&window, cfg.pulse.band, cfg.pulse.nominal_rate_hz, motion);
        let quality = self
            .scorer
            .assess(kind, now_us, &signal, motion_level, cfg.pulse.min_samples);
        out.events.push(PipelineEvent::Quality(quality.clone()));
        if window.len() < cfg.pulse.min_samples {
            log::debug!(
                "pulse window has {} samples, waiting for {}",
                window.len(),
                cfg.pulse.min_samples
            );
            return out;
        }

        let peaks = self.detector.detect_peaks(&signal);
        let snr_score = self.scorer.snr_score(signal.snr_db);
        match estimate_heart_rate(&peaks, snr_score, &cfg.detector) {
            Extracted::Value(est) if est.confidence > 0.0 => {
                out.heart_rate = Some(FusionInput::new(est.bpm, est.confidence));
                out.events.push(PipelineEvent::Measurement(Measurement::HeartRate(HeartRateSample {
                    ts_us: now_us,
                    bpm: est.bpm,
                    confidence: est.confidence,
                    source: kind,
                    quality: quality.overall,
                })));
            }
            Extracted::OutOfRange(bpm) => out.anomaly(
                now_us,
                kind,
                AnomalyKind::HeartRateOutOfRange,
                Some(bpm),
                format!("heart rate {bpm:.1} bpm outside physiological range"),
            ),
            _ => log::debug!("no heart rate from {} peaks", peaks.len()),
        }

        let spo2 = if cfg.spo2.enabled {
            Some(estimate_spo2(
                &window,
                cfg.pulse.band,
                signal.sample_rate_hz,
                quality.composite_score,
                &cfg.spo2,
            ))
        } else {
            None
        };

        let window_end = window.last_ts().unwrap_or(now_us);
        self.commit_beats(&peaks, window_end, now_us, &mut out);
        self.emit_hrv(now_us, &mut out);

        match spo2 {
            Some(Extracted::Value(est)) => {
                out.events.push(PipelineEvent::Measurement(Measurement::Spo2(Spo2Sample {
                    ts_us: now_us,
                    percent: est.percent,
                    ratio: est.ratio,
                    confidence: est.confidence,
                })));
            }
            Some(Extracted::OutOfRange(v)) => out.anomaly(
                now_us,
                kind,
                AnomalyKind::Spo2OutOfRange,
                Some(v),
                format!("SpO2 proxy {v:.1}% is implausible"),
            ),
            _ => {}
        }
        out
    }

    /// Append newly detected beats to the history.
    ///
    /// A beat is new when it is more than one refractory interval after the
    /// last committed beat. Beats within the edge guard of the window end
    /// wait for a later tick, when their position is settled.
    fn commit_beats(
        &mut self,
        peaks: &[DetectedEvent],
        window_end_us: i64,
        now_us: i64,
        out: &mut ChannelOutput,
    ) {
        let refractory = self.detector.pulse_refractory_us();
        let guard = (self.config.hrv.edge_guard_sec * 1e6) as i64;
        let (lo, hi) = interval_range_ms(&self.config.detector);

        for peak in peaks {
            if peak.ts_us > window_end_us - guard {
                break;
            }
            if let Some(&last) = self.beats.back() {
                if peak.ts_us <= last + refractory {
                    continue;
                }
                let interval_ms = (peak.ts_us - last) as f32 / 1000.0;
                if !(lo..=hi).contains(&interval_ms) {
                    out.anomaly(
                        now_us,
                        ChannelKind::PulseIntensity,
                        AnomalyKind::IntervalsRejected,
                        Some(interval_ms),
                        format!("RR interval {interval_ms:.0} ms excluded from HRV"),
                    );
                }
            }
            self.beats.push_back(peak.ts_us);
        }

        let horizon = (self.config.hrv.history_sec * 1e6) as i64;
        if let Some(&newest) = self.beats.back() {
            while self.beats.front().is_some_and(|&t| newest - t > horizon) {
                self.beats.pop_front();
            }
        }
    }

    fn emit_hrv(&mut self, now_us: i64, out: &mut ChannelOutput) {
        if self.beats.len() < 3 {
            return;
        }
        let first = self.beats[0];
        let beats: Vec<i64> = self.beats.iter().copied().collect();
        let intervals: Vec<f32> = beats.windows(2).map(|w| (w[1] - w[0]) as f32 / 1000.0).collect();
        let ends_s: Vec<f32> = beats[1..].iter().map(|&t| (t - first) as f32 / 1e6).collect();

        let metrics = compute_hrv(&intervals, &self.config.hrv, &self.config.detector);
        if let Extracted::Value(m) = metrics {
            // Spectral analysis only over plausible intervals
            let (lo, hi) = interval_range_ms(&self.config.detector);
            let (t_ok, rr_ok): (Vec<f32>, Vec<f32>) = ends_s
                .iter()
                .zip(intervals.iter())
                .filter(|(_, rr)| (lo..=hi).contains(*rr))
                .map(|(t, rr)| (*t, *rr))
                .unzip();
            let frequency = frequency_domain(&t_ok, &rr_ok, &self.config.hrv);
            out.rmssd = Some(FusionInput::new(m.rmssd_ms, m.confidence));
            out.events.push(PipelineEvent::Measurement(Measurement::Hrv(HrvSample {
                ts_us: now_us,
                rmssd_ms: m.rmssd_ms,
                sdnn_ms: m.sdnn_ms,
                pnn50: m.pnn50,
                interval_count: m.interval_count,
                confidence: m.confidence,
                frequency,
            })));
        }
    }

    fn process_breathing(
        &mut self,
        now_us: i64,
        motion: Option<&MotionContext>,
        motion_level: f32,
    ) -> ChannelOutput {
        let kind = ChannelKind::AudioEnvelope;
        let mut out = ChannelOutput::default();
        let Some(slot) = self.channels.get(&kind) else {
            return out;
        };
        let window = slot.buffer.snapshot();
        let cfg = &self.config;

        let signal = self.conditioner.condition(
            &window,
            cfg.breathing.band,
            cfg.breathing.nominal_rate_hz,
            motion,
        );
        let quality = self
            .scorer
            .assess(kind, now_us, &signal, motion_level, cfg.breathing.min_samples);
        out.events.push(PipelineEvent::Quality(quality));
        if window.len() < cfg.breathing.min_samples {
            return out;
        }

        let breaths = self.detector.detect_breaths(&signal);
        let snr_score = self.scorer.snr_score(signal.snr_db);
        let estimate = estimate_breathing(
            &breaths,
            self.amplitude_baseline,
            snr_score,
            &cfg.breathing,
            &cfg.detector,
        );
        match estimate {
            Extracted::Value(est) if est.confidence > 0.0 => {
                out.breathing = Some(FusionInput::new(est.bpm, est.confidence));
                out.breathing_hz = Some(est.bpm / 60.0);
                out.events.push(PipelineEvent::Measurement(Measurement::Breathing(BreathingSample {
                    ts_us: now_us,
                    bpm: est.bpm,
                    pattern: est.pattern,
                    amplitude: est.amplitude,
                    confidence: est.confidence,
                })));
            }
            Extracted::OutOfRange(bpm) => out.anomaly(
                now_us,
                kind,
                AnomalyKind::BreathingRateOutOfRange,
                Some(bpm),
                format!("breathing rate {bpm:.1} brpm outside physiological range"),
            ),
            _ => log::debug!("no breathing rate from {} events", breaths.len()),
        }

        // Baseline advances once per completed breath; the first event's
        // cycle may be cut by the window edge.
        let alpha = self.config.breathing.amplitude_baseline_alpha;
        for ev in breaths.iter().skip(1) {
            if self.last_breath_us.is_some_and(|t| ev.ts_us <= t) {
                continue;
            }
            self.amplitude_baseline =
                update_amplitude_baseline(self.amplitude_baseline, ev.amplitude, alpha);
            self.last_breath_us = Some(ev.ts_us);
        }
        out
    }

    fn process_motion(&mut self, now_us: i64, motion_level: f32) -> ChannelOutput {
        let kind = ChannelKind::Motion;
        let mut out = ChannelOutput::default();
        let Some(slot) = self.channels.get(&kind) else {
            return out;
        };
        let min_samples = self.config.motion.nominal_rate_hz.ceil() as usize;
        out.events.push(PipelineEvent::Quality(self.scorer.assess_context(
            kind,
            now_us,
            slot.buffer.len(),
            min_samples,
            motion_level,
        )));
        out
    }

    fn publish_latest(&mut self, now_us: i64, events: &[PipelineEvent], coherence: Option<f32>) {
        let mut latest = LatestValues {
            ts_us: Some(now_us),
            coherence: coherence.or(self.latest.coherence),
            ..LatestValues::default()
        };
        for ev in events {
            match ev {
                PipelineEvent::Measurement(m) => match m {
                    Measurement::HeartRate(m) => latest.heart_rate = Some(m.clone()),
                    Measurement::Hrv(m) => latest.hrv = Some(m.clone()),
                    Measurement::Breathing(m) => latest.breathing = Some(m.clone()),
                    Measurement::Stress(m) => latest.stress = Some(m.clone()),
                    Measurement::Spo2(m) => latest.spo2 = Some(m.clone()),
                },
                PipelineEvent::Quality(q) => latest.quality.push(q.clone()),
                _ => {}
            }
        }
        self.latest = latest;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("channels", &self.open_channels())
            .field("beats", &self.beats.len())
            .finish()
    }
}
