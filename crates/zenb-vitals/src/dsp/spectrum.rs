//! FFT power spectrum, dominant-frequency search and Goertzel coherence.

use ndarray::Array1;
use num_complex::Complex32;
use rustfft::FftPlanner;
use std::f32::consts::{LN_2, PI};

use crate::config::Band;
use crate::dsp::stats;

/// SNR values are clamped to this range (dB).
pub const SNR_FLOOR_DB: f32 = -20.0;
pub const SNR_CEIL_DB: f32 = 40.0;

/// Create Hamming window coefficients.
pub fn hamming_window(size: usize) -> Array1<f32> {
    if size < 2 {
        return Array1::ones(size);
    }
    Array1::from_shape_fn(size, |i| {
        0.54 - 0.46 * ((2.0 * PI * i as f32) / ((size - 1) as f32)).cos()
    })
}

/// One-sided power spectral density of a Hamming-windowed signal.
///
/// The signal is zero-padded to at least twice its length (and at least 256
/// points) for a finer frequency grid. Density is scaled so that summing
/// `psd * bin_hz` over a band gives the signal variance in that band.
#[derive(Debug, Clone)]
pub struct Spectrum {
    psd: Vec<f32>,
    bin_hz: f32,
    /// Length of the signal before padding.
    len: usize,
    sample_rate_hz: f32,
}

/// Dominant in-band component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    /// Peak frequency refined by parabolic interpolation.
    pub freq_hz: f32,
    pub snr_db: f32,
}

impl Spectrum {
    pub fn compute(signal: &[f32], sample_rate_hz: f32) -> Option<Self> {
        let n = signal.len();
        if n < 4 || !(sample_rate_hz > 0.0) {
            return None;
        }

        let mean = signal.iter().sum::<f32>() / n as f32;
        let window = hamming_window(n);
        let nfft = (2 * n).next_power_of_two().max(256);

        let mut buffer: Vec<Complex32> = signal
            .iter()
            .zip(window.iter())
            .map(|(s, w)| Complex32::new((s - mean) * w, 0.0))
            .collect();
        buffer.resize(nfft, Complex32::new(0.0, 0.0));

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(nfft);
        fft.process(&mut buffer);

        let window_energy: f32 = window.iter().map(|w| w * w).sum();
        let scale = 1.0 / (sample_rate_hz * window_energy.max(1e-12));
        let half = nfft / 2;
        let psd = buffer
            .iter()
            .take(half + 1)
            .enumerate()
            .map(|(k, c)| {
                let p = c.norm_sqr() * scale;
                if k == 0 || k == half {
                    p
                } else {
                    2.0 * p
                }
            })
            .collect();

        Some(Self {
            psd,
            bin_hz: sample_rate_hz / nfft as f32,
            len: n,
            sample_rate_hz,
        })
    }

    pub fn bin_hz(&self) -> f32 {
        self.bin_hz
    }

    fn bin_range(&self, low_hz: f32, high_hz: f32) -> std::ops::RangeInclusive<usize> {
        let last = self.psd.len().saturating_sub(1);
        let lo = ((low_hz / self.bin_hz).ceil().max(0.0) as usize).min(last);
        let hi = ((high_hz / self.bin_hz).floor().max(0.0) as usize).min(last);
        lo..=hi
    }

    /// Integrated power between `low_hz` and `high_hz`.
    pub fn band_power(&self, low_hz: f32, high_hz: f32) -> f32 {
        let range = self.bin_range(low_hz, high_hz);
        if range.is_empty() {
            return 0.0;
        }
        self.psd[range].iter().sum::<f32>() * self.bin_hz
    }

    /// Strongest in-band frequency and its SNR.
    ///
    /// Signal regions sit around the peak and its second harmonic (when the
    /// harmonic is in band). Their half width is the larger of 0.25 Hz scaled
    /// to the band width and the Hamming main lobe. The noise floor is the
    /// median density of the remaining in-band bins, so isolated spurs do not
    /// move it. Signal power is the region power above that floor; noise
    /// power is the floor spread over the whole band.
    pub fn dominant(&self, band: Band) -> Option<SpectralPeak> {
        let range = self.bin_range(band.low_hz, band.high_hz);
        if range.is_empty() {
            return None;
        }

        let (peak_bin, peak_power) = range
            .clone()
            .map(|k| (k, self.psd[k]))
            .fold((0usize, f32::MIN), |acc, (k, p)| if p > acc.1 { (k, p) } else { acc });
        if !(peak_power > 0.0) {
            return None;
        }

        let refined = parabolic_offset(&self.psd, peak_bin);
        let freq_hz = (peak_bin as f32 + refined) * self.bin_hz;

        let main_lobe = 2.0 * self.sample_rate_hz / self.len as f32;
        let heart_width = Band::HEART.high_hz - Band::HEART.low_hz;
        let width_scaled = 0.25 * (band.high_hz - band.low_hz) / heart_width;
        let half_width = main_lobe.max(width_scaled);
        let in_signal = |k: usize| {
            let f = k as f32 * self.bin_hz;
            (f - freq_hz).abs() <= half_width || (f - 2.0 * freq_hz).abs() <= half_width
        };

        let band_bins = range.clone().count();
        let mut region_power = 0.0f32;
        let mut region_bins = 0usize;
        let mut rest = Vec::with_capacity(band_bins);
        for k in range {
            if in_signal(k) {
                region_power += self.psd[k];
                region_bins += 1;
            } else {
                rest.push(self.psd[k]);
            }
        }

        // Median of exponentially distributed bin powers is ln 2 of the mean
        let floor = stats::median(&rest).map_or(0.0, |m| m / LN_2);
        let signal = (region_power - floor * region_bins as f32).max(0.0);
        let noise = floor * band_bins as f32;

        let snr_db = if signal <= 0.0 {
            SNR_FLOOR_DB
        } else if noise <= signal * 1e-4 {
            SNR_CEIL_DB
        } else {
            (10.0 * (signal / noise).log10()).clamp(SNR_FLOOR_DB, SNR_CEIL_DB)
        };

        Some(SpectralPeak { freq_hz, snr_db })
    }
}

/// Sub-bin offset of a spectral peak, in bins.
fn parabolic_offset(power: &[f32], peak: usize) -> f32 {
    if peak == 0 || peak + 1 >= power.len() {
        return 0.0;
    }
    let y_m1 = power[peak - 1];
    let y_0 = power[peak];
    let y_p1 = power[peak + 1];
    let denom = y_m1 - 2.0 * y_0 + y_p1;
    if denom.abs() <= 1e-12 {
        return 0.0;
    }
    let delta = 0.5 * (y_m1 - y_p1) / denom;
    if delta.is_finite() && delta.abs() <= 1.0 {
        delta
    } else {
        0.0
    }
}

/// Dominant frequency of `signal` in `band`, or `None` for a flat or too
/// short signal.
pub fn dominant_frequency(signal: &[f32], sample_rate_hz: f32, band: Band) -> Option<SpectralPeak> {
    Spectrum::compute(signal, sample_rate_hz)?.dominant(band)
}

/// Fraction of the signal's oscillation energy at `target_hz`, in [0, 1].
///
/// Single-bin Goertzel power against total energy of the mean-removed signal.
/// A pure tone at `target_hz` scores close to 1.
pub fn goertzel_energy_fraction(x: &[f32], sample_rate_hz: f32, target_hz: f32) -> f32 {
    let n = x.len();
    if n < 4 || !(sample_rate_hz > 0.0) || !(target_hz > 0.0) {
        return 0.0;
    }
    let mean = x.iter().sum::<f32>() / n as f32;
    let omega = 2.0 * PI * (target_hz / sample_rate_hz);
    let coeff = 2.0 * omega.cos();

    let mut s_prev = 0.0f32;
    let mut s_prev2 = 0.0f32;
    let mut energy = 0.0f32;
    for &raw in x {
        let v = raw - mean;
        let s = v + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
        energy += v * v;
    }

    let re = s_prev - s_prev2 * omega.cos();
    let im = s_prev2 * omega.sin();
    let mag_sq = re * re + im * im;

    let eps = 1e-9f32;
    (2.0 * mag_sq / (n as f32 * energy + eps)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq_hz: f32, fs: f32, n: usize, amp: f32) -> Vec<f32> {
        (0..n)
            .map(|i| amp * (2.0 * PI * freq_hz * i as f32 / fs).sin())
            .collect()
    }

    #[test]
    fn hamming_endpoints() {
        let w = hamming_window(64);
        assert_relative_eq!(w[0], 0.08, epsilon = 1e-5);
        assert_relative_eq!(w[63], 0.08, epsilon = 1e-5);
        assert!(w[32] > 0.99);
    }

    #[test]
    fn finds_dominant_heart_frequency() {
        let x = sine(1.2, 30.0, 300, 1.0);
        let peak = dominant_frequency(&x, 30.0, Band::HEART).unwrap();
        assert_relative_eq!(peak.freq_hz, 1.2, epsilon = 0.03);
        assert!(peak.snr_db > 10.0, "snr {}", peak.snr_db);
    }

    #[test]
    fn finds_breathing_frequency() {
        let x = sine(0.25, 20.0, 1200, 1.0);
        let peak = dominant_frequency(&x, 20.0, Band::BREATHING).unwrap();
        assert_relative_eq!(peak.freq_hz, 0.25, epsilon = 0.01);
    }

    #[test]
    fn noise_lowers_snr() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(7);
        let clean = sine(1.0, 30.0, 300, 1.0);
        let noisy: Vec<f32> = clean.iter().map(|v| v + rng.gen_range(-2.0..2.0)).collect();
        let a = dominant_frequency(&clean, 30.0, Band::HEART).unwrap();
        let b = dominant_frequency(&noisy, 30.0, Band::HEART).unwrap();
        assert!(a.snr_db > b.snr_db);
    }

    #[test]
    fn flat_signal_has_no_peak() {
        assert!(dominant_frequency(&[1.0; 200], 30.0, Band::HEART).is_none());
        assert!(dominant_frequency(&[1.0, 2.0], 30.0, Band::HEART).is_none());
    }

    #[test]
    fn band_power_matches_variance_of_tone() {
        // Variance of a unit sine is 0.5
        let x = sine(1.0, 30.0, 600, 1.0);
        let spec = Spectrum::compute(&x, 30.0).unwrap();
        let p = spec.band_power(0.5, 1.5);
        assert_relative_eq!(p, 0.5, epsilon = 0.05);
        assert!(spec.band_power(5.0, 10.0) < 0.01);
    }

    #[test]
    fn goertzel_pure_tone_near_one() {
        // 0.25 Hz over exactly 15 cycles at 4 Hz
        let x = sine(0.25, 4.0, 240, 3.0);
        let frac = goertzel_energy_fraction(&x, 4.0, 0.25);
        assert!(frac > 0.95, "fraction {frac}");
        let off = goertzel_energy_fraction(&x, 4.0, 0.1);
        assert!(off < 0.1, "off-target fraction {off}");
    }

    #[test]
    fn goertzel_degenerate_inputs() {
        assert_eq!(goertzel_energy_fraction(&[], 4.0, 0.25), 0.0);
        assert_eq!(goertzel_energy_fraction(&[1.0; 64], 4.0, 0.25), 0.0);
    }
}
