//! Sample producers.
//!
//! Device capture lives outside this crate; anything that yields timestamped
//! samples implements [`SignalSource`]. The synthetic sources here are
//! deterministic for a given seed and drive the tests, benches and the CLI.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::f32::consts::PI;

use crate::buffer::{ChannelKind, Sample};
use crate::error::AcquisitionError;

const GRAVITY: f32 = 9.81;

pub trait SignalSource: Send {
    fn kind(&self) -> ChannelKind;

    /// Acquire the underlying sensor. Samples are only produced once open.
    fn open(&mut self) -> Result<(), AcquisitionError>;

    /// Next sample, or `None` when the source is exhausted or not open.
    fn next_sample(&mut self) -> Option<Sample>;

    /// Nominal rate in Hz.
    fn sample_rate_hz(&self) -> f32;
}

impl<S: SignalSource + ?Sized> SignalSource for Box<S> {
    fn kind(&self) -> ChannelKind {
        (**self).kind()
    }

    fn open(&mut self) -> Result<(), AcquisitionError> {
        (**self).open()
    }

    fn next_sample(&mut self) -> Option<Sample> {
        (**self).next_sample()
    }

    fn sample_rate_hz(&self) -> f32 {
        (**self).sample_rate_hz()
    }
}

pub(crate) fn gaussian(rng: &mut StdRng) -> f32 {
    // Box-Muller
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn step_us(rate_hz: f32) -> i64 {
    (1_000_000.0 / rate_hz.max(1e-3)).round() as i64
}

/// Camera intensity over a fingertip: a pulse wave with optional
/// respiratory sinus arrhythmia, noise and RGB output.
#[derive(Debug, Clone)]
pub struct SyntheticPulse {
    heart_bpm: f32,
    rate_hz: f32,
    dc: f32,
    amplitude: f32,
    noise_std: f32,
    rsa: Option<(f32, f32)>,
    spo2_percent: Option<f32>,
    start_us: i64,
    index: u64,
    phase: f32,
    rng: StdRng,
    opened: bool,
}

impl SyntheticPulse {
    pub fn new(heart_bpm: f32, rate_hz: f32, seed: u64) -> Self {
        Self {
            heart_bpm,
            rate_hz,
            dc: 120.0,
            amplitude: 2.0,
            noise_std: 0.0,
            rsa: None,
            spo2_percent: None,
            start_us: 0,
            index: 0,
            phase: 0.0,
            rng: StdRng::seed_from_u64(seed),
            opened: false,
        }
    }

    /// Additive Gaussian noise, in intensity units.
    pub fn with_noise(mut self, std: f32) -> Self {
        self.noise_std = std.max(0.0);
        self
    }

    /// Heart rate oscillating by `depth_bpm` at `breath_hz`.
    pub fn with_rsa(mut self, breath_hz: f32, depth_bpm: f32) -> Self {
        self.rsa = Some((breath_hz, depth_bpm));
        self
    }

    /// Emit RGB triples whose red/blue modulation encodes `spo2_percent`.
    pub fn with_rgb(mut self, spo2_percent: f32) -> Self {
        self.spo2_percent = Some(spo2_percent);
        self
    }

    pub fn with_start(mut self, start_us: i64) -> Self {
        self.start_us = start_us;
        self
    }

    pub fn with_dc(mut self, dc: f32) -> Self {
        self.dc = dc;
        self
    }

    fn instantaneous_bpm(&self, t: f32) -> f32 {
        match self.rsa {
            Some((f, depth)) => self.heart_bpm + depth * (2.0 * PI * f * t).sin(),
            None => self.heart_bpm,
        }
    }
}

impl SignalSource for SyntheticPulse {
    fn kind(&self) -> ChannelKind {
        ChannelKind::PulseIntensity
    }

    fn open(&mut self) -> Result<(), AcquisitionError> {
        self.opened = true;
        Ok(())
    }

    fn next_sample(&mut self) -> Option<Sample> {
        if !self.opened {
            return None;
        }
        let t = self.index as f32 / self.rate_hz;
        let ts_us = self.start_us + self.index as i64 * step_us(self.rate_hz);
        self.index += 1;

        // Fundamental plus a small second harmonic for a pulse-like shape
        let wave = self.phase.sin() + 0.2 * (2.0 * self.phase - 0.5).sin();
        self.phase = (self.phase + 2.0 * PI * self.instantaneous_bpm(t) / 60.0 / self.rate_hz)
            % (2.0 * PI);
        let noise = if self.noise_std > 0.0 {
            self.noise_std * gaussian(&mut self.rng)
        } else {
            0.0
        };

        let green = self.dc + self.amplitude * wave + noise;
        match self.spo2_percent {
            None => Some(Sample::scalar(ts_us, green)),
            Some(spo2) => {
                let blue_mod = 0.01;
                let red_mod = blue_mod * ((110.0 - spo2.clamp(0.0, 100.0)) / 25.0);
                let red = 150.0 * (1.0 + red_mod * wave) + noise;
                let blue = 80.0 * (1.0 + blue_mod * wave) + noise;
                Some(Sample::triple(ts_us, [red, green, blue]))
            }
        }
    }

    fn sample_rate_hz(&self) -> f32 {
        self.rate_hz
    }
}

/// Breath-sound amplitude envelope.
#[derive(Debug, Clone)]
pub struct SyntheticBreath {
    breath_bpm: f32,
    rate_hz: f32,
    base: f32,
    amplitude: f32,
    noise_std: f32,
    /// Relative jitter of each cycle's length.
    jitter: f32,
    start_us: i64,
    index: u64,
    phase: f32,
    cycle_bpm: f32,
    rng: StdRng,
    opened: bool,
}

impl SyntheticBreath {
    pub fn new(breath_bpm: f32, rate_hz: f32, seed: u64) -> Self {
        Self {
            breath_bpm,
            rate_hz,
            base: 0.2,
            amplitude: 1.0,
            noise_std: 0.0,
            jitter: 0.0,
            start_us: 0,
            index: 0,
            phase: 0.0,
            cycle_bpm: breath_bpm,
            rng: StdRng::seed_from_u64(seed),
            opened: false,
        }
    }

    pub fn with_noise(mut self, std: f32) -> Self {
        self.noise_std = std.max(0.0);
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Randomise each cycle's rate by up to `fraction` of the nominal rate.
    pub fn with_jitter(mut self, fraction: f32) -> Self {
        self.jitter = fraction.clamp(0.0, 0.9);
        self
    }

    pub fn with_start(mut self, start_us: i64) -> Self {
        self.start_us = start_us;
        self
    }
}

impl SignalSource for SyntheticBreath {
    fn kind(&self) -> ChannelKind {
        ChannelKind::AudioEnvelope
    }

    fn open(&mut self) -> Result<(), AcquisitionError> {
        self.opened = true;
        Ok(())
    }

    fn next_sample(&mut self) -> Option<Sample> {
        if !self.opened {
            return None;
        }
        let ts_us = self.start_us + self.index as i64 * step_us(self.rate_hz);
        self.index += 1;

        let envelope = self.base + self.amplitude * 0.5 * (1.0 + self.phase.sin());
        let next = self.phase + 2.0 * PI * self.cycle_bpm / 60.0 / self.rate_hz;
        if next >= 2.0 * PI {
            if self.jitter > 0.0 {
                let j = self.rng.gen_range(-self.jitter..=self.jitter);
                self.cycle_bpm = self.breath_bpm * (1.0 + j);
            }
            self.phase = next - 2.0 * PI;
        } else {
            self.phase = next;
        }
        let noise = if self.noise_std > 0.0 {
            self.noise_std * gaussian(&mut self.rng)
        } else {
            0.0
        };
        Some(Sample::scalar(ts_us, (envelope + noise).max(0.0)))
    }

    fn sample_rate_hz(&self) -> f32 {
        self.rate_hz
    }
}

/// Accelerometer at rest with optional shaking bursts.
#[derive(Debug, Clone)]
pub struct SyntheticMotion {
    rate_hz: f32,
    noise_std: f32,
    /// (start s, end s, peak acceleration m/s²)
    bursts: Vec<(f32, f32, f32)>,
    start_us: i64,
    index: u64,
    rng: StdRng,
    opened: bool,
}

impl SyntheticMotion {
    pub fn new(rate_hz: f32, seed: u64) -> Self {
        Self {
            rate_hz,
            noise_std: 0.02,
            bursts: Vec::new(),
            start_us: 0,
            index: 0,
            rng: StdRng::seed_from_u64(seed),
            opened: false,
        }
    }

    pub fn with_burst(mut self, start_sec: f32, end_sec: f32, peak: f32) -> Self {
        self.bursts.push((start_sec, end_sec, peak));
        self
    }

    pub fn with_start(mut self, start_us: i64) -> Self {
        self.start_us = start_us;
        self
    }
}

impl SignalSource for SyntheticMotion {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Motion
    }

    fn open(&mut self) -> Result<(), AcquisitionError> {
        self.opened = true;
        Ok(())
    }

    fn next_sample(&mut self) -> Option<Sample> {
        if !self.opened {
            return None;
        }
        let t = self.index as f32 / self.rate_hz;
        let ts_us = self.start_us + self.index as i64 * step_us(self.rate_hz);
        self.index += 1;

        let shake: f32 = self
            .bursts
            .iter()
            .filter(|(s, e, _)| t >= *s && t < *e)
            .map(|(_, _, peak)| peak * (2.0 * PI * 3.0 * t).sin())
            .sum();
        let mut axis = || self.noise_std * gaussian(&mut self.rng);
        let xyz = [axis() + shake, axis() + 0.5 * shake, GRAVITY + axis() + shake];
        Some(Sample::triple(ts_us, xyz))
    }

    fn sample_rate_hz(&self) -> f32 {
        self.rate_hz
    }
}

/// Replays recorded samples.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    kind: ChannelKind,
    rate_hz: f32,
    samples: VecDeque<Sample>,
    open_error: Option<AcquisitionError>,
    opened: bool,
}

impl ReplaySource {
    pub fn new(kind: ChannelKind, rate_hz: f32, samples: Vec<Sample>) -> Self {
        Self {
            kind,
            rate_hz,
            samples: samples.into(),
            open_error: None,
            opened: false,
        }
    }

    /// A source whose `open` fails, standing in for a missing or denied sensor.
    pub fn failing(kind: ChannelKind, error: AcquisitionError) -> Self {
        Self {
            kind,
            rate_hz: 1.0,
            samples: VecDeque::new(),
            open_error: Some(error),
            opened: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl SignalSource for ReplaySource {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn open(&mut self) -> Result<(), AcquisitionError> {
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        self.opened = true;
        Ok(())
    }

    fn next_sample(&mut self) -> Option<Sample> {
        if !self.opened {
            return None;
        }
        self.samples.pop_front()
    }

    fn sample_rate_hz(&self) -> f32 {
        self.rate_hz
    }
}

/// Wraps a source with one sample of look-ahead so callers can pull
/// everything up to a point in time.
pub struct SourceCursor<S> {
    source: S,
    pending: Option<Sample>,
}

impl<S: SignalSource> SourceCursor<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            pending: None,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.source.kind()
    }

    pub fn open(&mut self) -> Result<(), AcquisitionError> {
        self.source.open()
    }

    /// Samples with `ts_us < until_us`, in order.
    pub fn take_until(&mut self, until_us: i64) -> Vec<Sample> {
        let mut out = Vec::new();
        loop {
            let next = match self.pending.take() {
                Some(s) => Some(s),
                None => self.source.next_sample(),
            };
            match next {
                Some(s) if s.ts_us < until_us => out.push(s),
                Some(s) => {
                    self.pending = Some(s);
                    break;
                }
                None => break,
            }
        }
        out
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}
