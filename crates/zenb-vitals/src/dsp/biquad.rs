//! Second-order IIR sections and the zero-phase band-pass built from them.
//!
//! Coefficients are Butterworth designs via the bilinear transform. State and
//! coefficients are kept in f64: the breathing band sits below 1% of the
//! sample rate, where f32 biquads lose most of their precision.

use std::f64::consts::{PI, SQRT_2};

use crate::config::Band;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Second-order Butterworth low-pass at `cutoff_hz`.
    pub fn lowpass(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let k = (PI * nyquist_clamp(cutoff_hz, sample_rate_hz) / sample_rate_hz).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + SQRT_2 * k + k2);
        let b0 = k2 * norm;
        Self {
            b0,
            b1: 2.0 * b0,
            b2: b0,
            a1: 2.0 * (k2 - 1.0) * norm,
            a2: (1.0 - SQRT_2 * k + k2) * norm,
        }
    }

    /// Second-order Butterworth high-pass at `cutoff_hz`.
    pub fn highpass(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let k = (PI * nyquist_clamp(cutoff_hz, sample_rate_hz) / sample_rate_hz).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + SQRT_2 * k + k2);
        Self {
            b0: norm,
            b1: -2.0 * norm,
            b2: norm,
            a1: 2.0 * (k2 - 1.0) * norm,
            a2: (1.0 - SQRT_2 * k + k2) * norm,
        }
    }

    /// Gain at DC.
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

fn nyquist_clamp(freq_hz: f64, sample_rate_hz: f64) -> f64 {
    freq_hz.clamp(1e-4, sample_rate_hz * 0.5 * 0.999)
}

#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Set the state to the steady state for a constant input `x0`.
    pub fn prime(&mut self, x0: f64) {
        let c = self.coeffs;
        let y0 = c.dc_gain() * x0;
        self.z1 = y0 - c.b0 * x0;
        self.z2 = c.b2 * x0 - c.a2 * y0;
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        // Transposed direct form II
        let c = self.coeffs;
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }
}

/// High-pass + low-pass cascade applied forward and backward.
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    band: Band,
    sample_rate_hz: f32,
    sections: [BiquadCoeffs; 2],
}

impl BandpassFilter {
    pub fn new(band: Band, sample_rate_hz: f32) -> Self {
        let fs = sample_rate_hz as f64;
        Self {
            band,
            sample_rate_hz,
            sections: [
                BiquadCoeffs::highpass(band.low_hz as f64, fs),
                BiquadCoeffs::lowpass(band.high_hz as f64, fs),
            ],
        }
    }

    pub fn band(&self) -> Band {
        self.band
    }

    /// Zero-phase filtering. The output has the same length as the input.
    ///
    /// The input is extended at both ends by odd reflection (one period of
    /// the low cutoff, capped at `n - 1`) so the start-up transient falls
    /// into the padding.
    pub fn filtfilt(&self, signal: &[f32]) -> Vec<f32> {
        let n = signal.len();
        if n < 3 {
            return signal.to_vec();
        }

        let period = (self.sample_rate_hz / self.band.low_hz.max(1e-3)).ceil() as usize;
        let pad = period.clamp(1, n - 1);

        let first = signal[0] as f64;
        let last = signal[n - 1] as f64;
        let mut ext: Vec<f64> = Vec::with_capacity(n + 2 * pad);
        for i in (1..=pad).rev() {
            ext.push(2.0 * first - signal[i] as f64);
        }
        ext.extend(signal.iter().map(|&v| v as f64));
        for i in 1..=pad {
            ext.push(2.0 * last - signal[n - 1 - i] as f64);
        }

        self.run(&mut ext);
        ext.reverse();
        self.run(&mut ext);
        ext.reverse();

        ext[pad..pad + n].iter().map(|&v| v as f32).collect()
    }

    fn run(&self, data: &mut [f64]) {
        for coeffs in &self.sections {
            let mut section = Biquad::new(*coeffs);
            if let Some(&x0) = data.first() {
                section.prime(x0);
            }
            for v in data.iter_mut() {
                *v = section.process(*v);
            }
        }
    }
}
