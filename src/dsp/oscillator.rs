//! Phase-accumulator oscillators.
//!
//! Two families of waveform are provided. The additive `*_band_limited`
//! methods sum a caller-chosen number of harmonics (skipping any at or above
//! Nyquist), trading CPU for aliasing. The PolyBLEP methods (`saw`,
//! `square`, `pulse`) correct the naive discontinuity and are cheap enough
//! for every audio-rate voice.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::params::ParamChoice;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
    Pulse,
    Noise,
}

impl ParamChoice for Waveform {
    const OPTIONS: &'static [&'static str] =
        &["sine", "square", "sawtooth", "triangle", "pulse", "noise"];

    fn from_index(index: usize) -> Self {
        match index {
            1 => Waveform::Square,
            2 => Waveform::Sawtooth,
            3 => Waveform::Triangle,
            4 => Waveform::Pulse,
            5 => Waveform::Noise,
            _ => Waveform::Sine,
        }
    }
}

/// A phase-accumulator oscillator.
///
/// `phase` always stays in [0, 1). Every waveform method produces the sample
/// for the current phase and then advances by `increment`.
#[derive(Debug, Clone)]
pub struct Oscillator {
    phase: f64,
    increment: f64,
    rng: fastrand::Rng,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new()
    }
}

impl Oscillator {
    pub fn new() -> Self {
        Self::with_seed(0x05C1_11A7)
    }

    /// An oscillator whose `noise()` stream is reproducible from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Oscillator {
            phase: 0.0,
            increment: 0.0,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Set the frequency. Negative or non-finite frequencies stop the
    /// oscillator; anything above Nyquist is clamped to it.
    pub fn set_frequency(&mut self, freq: f64, sample_rate: f64) {
        self.increment = if freq.is_finite() && freq > 0.0 && sample_rate > 0.0 {
            (freq / sample_rate).min(0.5)
        } else {
            0.0
        };
    }

    /// Phase increment per sample.
    pub fn increment(&self) -> f64 {
        self.increment
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase.rem_euclid(1.0);
    }

    /// Reset oscillator phase.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = fastrand::Rng::with_seed(seed);
    }

    #[inline]
    fn advance(&mut self) {
        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
    }

    #[inline]
    pub fn sine(&mut self) -> f64 {
        let s = (TAU * self.phase).sin();
        self.advance();
        s
    }

    /// Sine with an added phase offset in radians (phase modulation).
    #[inline]
    pub fn sine_pm(&mut self, offset: f64) -> f64 {
        let s = (TAU * self.phase + offset).sin();
        self.advance();
        s
    }

    /// Piecewise linear, -1→+1 over the first half, +1→-1 over the second.
    #[inline]
    pub fn triangle(&mut self) -> f64 {
        let value = if self.phase < 0.5 {
            4.0 * self.phase - 1.0
        } else {
            3.0 - 4.0 * self.phase
        };
        self.advance();
        value
    }

    /// Additive square: the first `harmonics` odd partials.
    pub fn square_band_limited(&mut self, harmonics: usize) -> f64 {
        let x = TAU * self.phase;
        let mut sum = 0.0;
        let mut k = 1usize;
        let mut used = 0usize;
        let (sin_x, cos_x) = x.sin_cos();
        // sin(kx) by Chebyshev recurrence over all k, summing the odd ones
        let (mut s_prev, mut s_cur) = (0.0, sin_x);
        while used < harmonics && (k as f64) * self.increment < 0.5 {
            if k % 2 == 1 {
                sum += s_cur / k as f64;
                used += 1;
            }
            let s_next = 2.0 * cos_x * s_cur - s_prev;
            s_prev = s_cur;
            s_cur = s_next;
            k += 1;
        }
        self.advance();
        sum * 4.0 / PI
    }

    /// Additive sawtooth rising from -1 to +1: the first `harmonics` partials.
    pub fn saw_band_limited(&mut self, harmonics: usize) -> f64 {
        let x = TAU * self.phase;
        let (sin_x, cos_x) = x.sin_cos();
        let (mut s_prev, mut s_cur) = (0.0, sin_x);
        let mut sum = 0.0;
        let mut k = 1usize;
        while k <= harmonics && (k as f64) * self.increment < 0.5 {
            sum += s_cur / k as f64;
            let s_next = 2.0 * cos_x * s_cur - s_prev;
            s_prev = s_cur;
            s_cur = s_next;
            k += 1;
        }
        self.advance();
        -sum * 2.0 / PI
    }

    /// PolyBLEP sawtooth.
    #[inline]
    pub fn saw(&mut self) -> f64 {
        let naive = 2.0 * self.phase - 1.0;
        let value = naive - poly_blep(self.phase, self.increment);
        self.advance();
        value
    }

    /// PolyBLEP square (50% duty).
    #[inline]
    pub fn square(&mut self) -> f64 {
        self.pulse(0.5)
    }

    /// PolyBLEP pulse with duty cycle in (0, 1).
    #[inline]
    pub fn pulse(&mut self, duty: f64) -> f64 {
        let duty = duty.clamp(0.01, 0.99);
        let inc = self.increment;
        let mut value = if self.phase < duty { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, inc);
        value -= poly_blep((self.phase - duty + 1.0) % 1.0, inc);
        self.advance();
        value
    }

    /// White noise in [-1, 1). Still advances phase so a voice can switch
    /// waveform without a phase jump.
    #[inline]
    pub fn noise(&mut self) -> f64 {
        let value = self.rng.f64() * 2.0 - 1.0;
        self.advance();
        value
    }

    /// Generate the next sample for `waveform` using the cheap variants.
    #[inline]
    pub fn next(&mut self, waveform: Waveform) -> f64 {
        match waveform {
            Waveform::Sine => self.sine(),
            Waveform::Square => self.square(),
            Waveform::Sawtooth => self.saw(),
            Waveform::Triangle => self.triangle(),
            Waveform::Pulse => self.pulse(0.25),
            Waveform::Noise => self.noise(),
        }
    }
}

/// PolyBLEP (Polynomial Band-Limited Step) anti-aliasing correction.
///
/// `t` is the phase [0, 1), `dt` is the phase increment per sample.
/// Returns a correction value to subtract from the naive waveform
/// at discontinuities.
#[inline]
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        // Just after the discontinuity
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        // Just before the next discontinuity
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn osc_at(freq: f64) -> Oscillator {
        let mut osc = Oscillator::new();
        osc.set_frequency(freq, 44100.0);
        osc
    }

    #[test]
    fn sine_zero_at_start() {
        let mut osc = osc_at(440.0);
        let sample = osc.sine();
        assert!(sample.abs() < 1e-10, "Sine should start near 0, got {sample}");
    }

    #[test]
    fn sine_range() {
        let mut osc = osc_at(440.0);
        for _ in 0..44100 {
            let s = osc.sine();
            assert!((-1.0..=1.0).contains(&s), "Sine out of range: {s}");
        }
    }

    #[test]
    fn phase_stays_in_unit_interval() {
        let mut osc = osc_at(21_000.0);
        for _ in 0..10_000 {
            osc.saw();
            assert!((0.0..1.0).contains(&osc.phase()));
        }
    }

    #[test]
    fn increment_is_frequency_over_rate() {
        let osc = osc_at(441.0);
        assert_abs_diff_eq!(osc.increment(), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn band_limited_single_harmonic_is_sine() {
        let mut a = osc_at(220.0);
        let mut b = osc_at(220.0);
        for _ in 0..1000 {
            let sq = a.square_band_limited(1);
            let s = b.sine();
            assert_abs_diff_eq!(sq, s * 4.0 / PI, epsilon = 1e-9);
        }
    }

    #[test]
    fn band_limited_skips_harmonics_above_nyquist() {
        // At 15 kHz only the fundamental fits below 22.05 kHz.
        let mut a = osc_at(15_000.0);
        let mut b = osc_at(15_000.0);
        for _ in 0..200 {
            assert_abs_diff_eq!(a.saw_band_limited(32), b.saw_band_limited(1), epsilon = 1e-9);
        }
    }

    #[test]
    fn band_limited_saw_approaches_ramp() {
        let mut osc = osc_at(100.0);
        osc.set_phase(0.25);
        let s = osc.saw_band_limited(64);
        // The ideal ramp is -0.5 at a quarter period
        assert_abs_diff_eq!(s, -0.5, epsilon = 0.02);
    }

    #[test]
    fn sawtooth_range() {
        let mut osc = osc_at(440.0);
        for _ in 0..44100 {
            let s = osc.saw();
            assert!((-1.5..=1.5).contains(&s), "Saw out of range: {s}");
        }
    }

    #[test]
    fn square_range() {
        let mut osc = osc_at(440.0);
        for _ in 0..44100 {
            let s = osc.square();
            assert!((-1.5..=1.5).contains(&s), "Square out of range: {s}");
        }
    }

    #[test]
    fn triangle_range() {
        let mut osc = osc_at(440.0);
        for _ in 0..44100 {
            let s = osc.triangle();
            assert!((-1.0..=1.0).contains(&s), "Triangle out of range: {s}");
        }
    }

    #[test]
    fn noise_is_reproducible_per_seed() {
        let mut a = Oscillator::with_seed(7);
        let mut b = Oscillator::with_seed(7);
        for _ in 0..64 {
            let s = a.noise();
            assert_eq!(s, b.noise());
            assert!((-1.0..1.0).contains(&s));
        }
    }

    #[test]
    fn non_finite_frequency_stops_oscillator() {
        let mut osc = Oscillator::new();
        osc.set_frequency(f64::NAN, 44100.0);
        assert_eq!(osc.increment(), 0.0);
        assert_eq!(osc.sine(), 0.0);
    }
}
