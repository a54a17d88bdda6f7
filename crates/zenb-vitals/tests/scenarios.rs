//! End-to-end scenarios over the synchronous session with synthetic sources.

use zenb_vitals::{
    BreathingPattern, ChannelKind, Measurement, OverallQuality, PipelineEvent, ProcessingConfig,
    QualityAssessment, Session, SessionState, SignalSource, SourceCursor, StressLevel,
    SyntheticBreath, SyntheticMotion, SyntheticPulse,
};

const SEC: i64 = 1_000_000;

/// Runs a session over the given sources, ticking once per second, and
/// returns every event including the final aggregate.
fn run<S: SignalSource>(
    config: ProcessingConfig,
    sources: Vec<S>,
    seconds: i64,
) -> (Session, Vec<PipelineEvent>) {
    let mut session = Session::new(config).unwrap();
    let mut cursors: Vec<SourceCursor<S>> = sources.into_iter().map(SourceCursor::new).collect();
    for c in cursors.iter_mut() {
        c.open().unwrap();
        session.enable_channel(c.kind()).unwrap();
    }
    session.start(0).unwrap();

    let mut events = Vec::new();
    for sec in 1..=seconds {
        let now = sec * SEC;
        for c in cursors.iter_mut() {
            let kind = c.kind();
            for s in c.take_until(now) {
                session.push(kind, s);
            }
        }
        events.extend(session.tick(now));
    }
    (session, events)
}

fn measurements(events: &[PipelineEvent]) -> impl Iterator<Item = &Measurement> {
    events.iter().filter_map(PipelineEvent::as_measurement)
}

fn quality_for(events: &[PipelineEvent], kind: ChannelKind) -> Vec<QualityAssessment> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Quality(q) if q.channel == kind => Some(q.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn five_seconds_of_clean_pulse_gives_sixty_bpm() {
    // 150 samples at 30 Hz
    let (_, events) = run(
        ProcessingConfig::default(),
        vec![SyntheticPulse::new(60.0, 30.0, 1)],
        5,
    );
    let hr = measurements(&events)
        .filter_map(|m| match m {
            Measurement::HeartRate(h) => Some(h),
            _ => None,
        })
        .last()
        .expect("heart rate after 5 s");
    assert!((hr.bpm - 60.0).abs() <= 2.0, "bpm {}", hr.bpm);
    assert!(hr.confidence > 0.7, "confidence {}", hr.confidence);
}

#[test]
fn noisy_pulse_still_tracks_rate_with_lower_confidence() {
    let (_, clean) = run(ProcessingConfig::default(), vec![SyntheticPulse::new(84.0, 30.0, 3)], 12);
    let (_, noisy) = run(
        ProcessingConfig::default(),
        vec![SyntheticPulse::new(84.0, 30.0, 3).with_noise(1.0)],
        12,
    );
    let last_hr = |events: &[PipelineEvent]| {
        measurements(events)
            .filter_map(|m| match m {
                Measurement::HeartRate(h) => Some(h.clone()),
                _ => None,
            })
            .last()
    };
    let clean = last_hr(&clean).unwrap();
    assert!((clean.bpm - 84.0).abs() <= 2.0);
    if let Some(noisy) = last_hr(&noisy) {
        assert!(noisy.confidence <= clean.confidence);
    }
}

#[test]
fn fifteen_breaths_per_minute_is_regular() {
    let (_, events) = run(
        ProcessingConfig::default(),
        vec![SyntheticBreath::new(15.0, 20.0, 7)],
        60,
    );
    let br = measurements(&events)
        .filter_map(|m| match m {
            Measurement::Breathing(b) => Some(b.clone()),
            _ => None,
        })
        .last()
        .expect("breathing after 60 s");
    assert!((br.bpm - 15.0).abs() <= 1.0, "bpm {}", br.bpm);
    assert_eq!(br.pattern, BreathingPattern::Regular);
}

#[test]
fn kilohertz_envelope_keeps_the_full_breathing_window() {
    // Nominal audio rate is 20 Hz; the producer delivers 1 kHz
    let (session, events) = run(
        ProcessingConfig::default(),
        vec![SyntheticBreath::new(15.0, 1_000.0, 7)],
        60,
    );
    let br = measurements(&events)
        .filter_map(|m| match m {
            Measurement::Breathing(b) => Some(b.clone()),
            _ => None,
        })
        .last()
        .expect("breathing from a 1 kHz envelope");
    assert!((br.bpm - 15.0).abs() <= 1.0, "bpm {}", br.bpm);
    assert_eq!(session.evicted_samples(ChannelKind::AudioEnvelope), 0);
}

#[test]
fn breathing_and_pulse_together_give_coherence() {
    let mut session = Session::new(ProcessingConfig::default()).unwrap();
    let mut pulse = SourceCursor::new(SyntheticPulse::new(66.0, 30.0, 1).with_rsa(0.15, 6.0));
    let mut breath = SourceCursor::new(SyntheticBreath::new(9.0, 20.0, 2));
    pulse.open().unwrap();
    breath.open().unwrap();
    session.enable_channel(ChannelKind::PulseIntensity).unwrap();
    session.enable_channel(ChannelKind::AudioEnvelope).unwrap();
    session.start(0).unwrap();

    for sec in 1..=60 {
        let now = sec * SEC;
        for s in pulse.take_until(now) {
            session.push(ChannelKind::PulseIntensity, s);
        }
        for s in breath.take_until(now) {
            session.push(ChannelKind::AudioEnvelope, s);
        }
        session.tick(now);
    }
    let latest = session.latest().clone();
    let breathing = latest.breathing.expect("breathing");
    assert!((breathing.bpm - 9.0).abs() < 1.0, "bpm {}", breathing.bpm);
    let coherence = latest.coherence.expect("coherence");
    assert!((0.0..=1.0).contains(&coherence));

    let agg = session.stop(60 * SEC).unwrap();
    assert!(agg.coherence.is_some());
    assert!(agg.breathing_rate.is_some());
}

#[test]
fn motion_burst_lowers_pulse_quality() {
    let config = ProcessingConfig::default();
    let mut session = Session::new(config).unwrap();
    let mut pulse = SourceCursor::new(SyntheticPulse::new(70.0, 30.0, 5));
    let mut motion = SourceCursor::new(SyntheticMotion::new(50.0, 6).with_burst(20.0, 30.0, 6.0));
    pulse.open().unwrap();
    motion.open().unwrap();
    session.enable_channel(ChannelKind::PulseIntensity).unwrap();
    session.enable_channel(ChannelKind::Motion).unwrap();
    session.start(0).unwrap();

    let mut still = None;
    let mut shaking = None;
    for sec in 1..=30 {
        let now = sec * SEC;
        for s in pulse.take_until(now) {
            session.push(ChannelKind::PulseIntensity, s);
        }
        for s in motion.take_until(now) {
            session.push(ChannelKind::Motion, s);
        }
        let events = session.tick(now);
        let q = quality_for(&events, ChannelKind::PulseIntensity).pop();
        match sec {
            15 => still = q,
            30 => shaking = q,
            _ => {}
        }
    }
    let (still, shaking) = (still.unwrap(), shaking.unwrap());
    assert!(shaking.motion_level > still.motion_level);
    assert!(shaking.composite_score < still.composite_score);
}

#[test]
fn elevated_heart_rate_raises_stress() {
    let calm_pulse = SyntheticPulse::new(66.0, 30.0, 1);
    let tense_pulse = SyntheticPulse::new(105.0, 30.0, 1);
    let (_, calm) = run(ProcessingConfig::default(), vec![calm_pulse], 10);
    let (_, tense) = run(ProcessingConfig::default(), vec![tense_pulse], 10);
    let last_stress = |events: &[PipelineEvent]| {
        measurements(events)
            .filter_map(|m| match m {
                Measurement::Stress(s) => Some(s.clone()),
                _ => None,
            })
            .last()
            .unwrap()
    };
    let (calm, tense) = (last_stress(&calm), last_stress(&tense));
    assert!(tense.score > calm.score);
    assert_ne!(tense.level, StressLevel::Relaxed);
    assert!(!tense.recommendation.is_empty());
}

#[test]
fn hrv_appears_once_enough_beats_are_committed() {
    let (session, events) = run(
        ProcessingConfig::default(),
        vec![SyntheticPulse::new(60.0, 30.0, 2).with_rsa(0.1, 6.0)],
        90,
    );
    let hrv: Vec<_> = measurements(&events)
        .filter_map(|m| match m {
            Measurement::Hrv(h) => Some(h.clone()),
            _ => None,
        })
        .collect();
    let last = hrv.last().expect("hrv");
    assert!(last.interval_count >= 30);
    assert!(last.rmssd_ms > 0.0 && last.sdnn_ms > 0.0);
    assert!((last.confidence - 1.0).abs() < 1e-6);
    assert!(last.frequency.is_some());
    assert!(session.latest().hrv.is_some());
}

#[test]
fn rgb_pulse_gives_capped_spo2() {
    let (_, events) = run(
        ProcessingConfig::default(),
        vec![SyntheticPulse::new(72.0, 30.0, 9).with_rgb(97.0)],
        10,
    );
    let spo2 = measurements(&events)
        .filter_map(|m| match m {
            Measurement::Spo2(s) => Some(s.clone()),
            _ => None,
        })
        .last()
        .expect("spo2");
    assert!((spo2.percent - 97.0).abs() < 2.0, "spo2 {}", spo2.percent);
    assert!(spo2.confidence <= 0.5);
}

#[test]
fn stop_twice_yields_one_aggregate() {
    let (mut session, events) = run(
        ProcessingConfig::default(),
        vec![SyntheticPulse::new(75.0, 30.0, 4)],
        20,
    );
    let agg = session.stop(20 * SEC).expect("aggregate");
    assert!(session.stop(21 * SEC).is_none());
    assert_eq!(session.state(), SessionState::Stopped);

    let hr = agg.heart_rate.expect("heart rate summary");
    assert!((hr.mean - 75.0).abs() < 2.0);
    assert!(hr.min <= hr.mean && hr.mean <= hr.max);
    assert_eq!(agg.duration_sec, 20.0);
    let emitted = measurements(&events).count() as u64;
    assert_eq!(agg.measurement_count, emitted);
}

#[test]
fn events_serialise_as_json_lines() {
    let (mut session, events) = run(
        ProcessingConfig::default(),
        vec![SyntheticPulse::new(70.0, 30.0, 8)],
        6,
    );
    for e in &events {
        let line = e.to_json_line().unwrap();
        assert!(!line.contains('\n'));
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert!(v.get("event").is_some());
    }
    let agg = session.stop(6 * SEC).unwrap();
    let line = PipelineEvent::SessionEnded(agg).to_json_line().unwrap();
    assert!(line.contains("session_ended"));
}

#[test]
fn dark_frames_lower_quality() {
    let last_quality = |dc: f32| {
        let (_, events) = run(
            ProcessingConfig::default(),
            vec![SyntheticPulse::new(70.0, 30.0, 1).with_dc(dc).with_noise(0.5)],
            10,
        );
        quality_for(&events, ChannelKind::PulseIntensity).pop().unwrap()
    };
    let bright = last_quality(120.0);
    let dark = last_quality(2.0);
    assert!(dark.lighting_level < 0.2);
    assert!(dark.composite_score < bright.composite_score);
    assert!(dark.overall < OverallQuality::Excellent);
}
