//! Biquad, one-pole and first-order all-pass filters.
//!
//! Biquad coefficient formulas follow the Audio EQ Cookbook (Robert
//! Bristow-Johnson). The biquad runs in Direct Form I so that coefficients
//! can be swapped between blocks (or mid-block under modulation) without the
//! state blowing up.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::params::ParamChoice;

/// Lowest cutoff any filter accepts.
pub const MIN_CUTOFF_HZ: f64 = 20.0;
/// Highest cutoff as a fraction of the sample rate.
pub const MAX_CUTOFF_RATIO: f64 = 0.45;

const MIN_Q: f64 = 0.1;
const MAX_Q: f64 = 40.0;
const MAX_GAIN_DB: f64 = 48.0;

/// Clamp a cutoff to `[20 Hz, 0.45·sr]`.
#[inline]
pub fn clamp_cutoff(freq: f64, sample_rate: f64) -> f64 {
    let max = (sample_rate * MAX_CUTOFF_RATIO).max(MIN_CUTOFF_HZ);
    if freq.is_finite() {
        freq.clamp(MIN_CUTOFF_HZ, max)
    } else {
        max
    }
}

#[inline]
fn clamp_q(q: f64) -> f64 {
    if q.is_finite() { q.clamp(MIN_Q, MAX_Q) } else { 0.707 }
}

#[inline]
fn clamp_gain(gain_db: f64) -> f64 {
    if gain_db.is_finite() {
        gain_db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB)
    } else {
        0.0
    }
}

/// Filter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Peaking,
    LowShelf,
    HighShelf,
    Allpass,
}

impl ParamChoice for FilterType {
    const OPTIONS: &'static [&'static str] = &[
        "lowpass", "highpass", "bandpass", "notch", "peaking", "lowshelf", "highshelf", "allpass",
    ];

    fn from_index(index: usize) -> Self {
        match index {
            1 => FilterType::Highpass,
            2 => FilterType::Bandpass,
            3 => FilterType::Notch,
            4 => FilterType::Peaking,
            5 => FilterType::LowShelf,
            6 => FilterType::HighShelf,
            7 => FilterType::Allpass,
            _ => FilterType::Lowpass,
        }
    }
}

/// A biquad IIR filter (2nd order).
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    // Coefficients, normalized by a0
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form I)
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl BiquadFilter {
    /// A pass-through filter until one of the `set_*` methods is called.
    pub fn new() -> Self {
        BiquadFilter {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn lowpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = Self::new();
        f.set_lowpass(freq, q, sample_rate);
        f
    }

    pub fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = Self::new();
        f.set_highpass(freq, q, sample_rate);
        f
    }

    pub fn bandpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = Self::new();
        f.set_bandpass(freq, q, sample_rate);
        f
    }

    pub fn peaking(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let mut f = Self::new();
        f.set_peaking(freq, q, gain_db, sample_rate);
        f
    }

    #[inline]
    fn omega(freq: f64, sample_rate: f64) -> (f64, f64) {
        let w0 = 2.0 * PI * clamp_cutoff(freq, sample_rate) / sample_rate;
        (w0.cos(), w0.sin())
    }

    fn set_normalized(&mut self, b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) {
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    pub fn set_lowpass(&mut self, freq: f64, q: f64, sample_rate: f64) {
        let (cos_w0, sin_w0) = Self::omega(freq, sample_rate);
        let alpha = sin_w0 / (2.0 * clamp_q(q));
        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        self.set_normalized(b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha);
    }

    pub fn set_highpass(&mut self, freq: f64, q: f64, sample_rate: f64) {
        let (cos_w0, sin_w0) = Self::omega(freq, sample_rate);
        let alpha = sin_w0 / (2.0 * clamp_q(q));
        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        self.set_normalized(b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha);
    }

    /// Band-pass with 0 dB peak gain at the centre frequency.
    pub fn set_bandpass(&mut self, freq: f64, q: f64, sample_rate: f64) {
        let (cos_w0, sin_w0) = Self::omega(freq, sample_rate);
        let alpha = sin_w0 / (2.0 * clamp_q(q));
        self.set_normalized(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha);
    }

    pub fn set_notch(&mut self, freq: f64, q: f64, sample_rate: f64) {
        let (cos_w0, sin_w0) = Self::omega(freq, sample_rate);
        let alpha = sin_w0 / (2.0 * clamp_q(q));
        self.set_normalized(1.0, -2.0 * cos_w0, 1.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha);
    }

    pub fn set_allpass(&mut self, freq: f64, q: f64, sample_rate: f64) {
        let (cos_w0, sin_w0) = Self::omega(freq, sample_rate);
        let alpha = sin_w0 / (2.0 * clamp_q(q));
        self.set_normalized(
            1.0 - alpha,
            -2.0 * cos_w0,
            1.0 + alpha,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        );
    }

    pub fn set_peaking(&mut self, freq: f64, q: f64, gain_db: f64, sample_rate: f64) {
        let (cos_w0, sin_w0) = Self::omega(freq, sample_rate);
        let alpha = sin_w0 / (2.0 * clamp_q(q));
        let a = 10.0_f64.powf(clamp_gain(gain_db) / 40.0);
        self.set_normalized(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        );
    }

    /// Low shelf with slope S = 1.
    pub fn set_low_shelf(&mut self, freq: f64, gain_db: f64, sample_rate: f64) {
        let (cos_w0, sin_w0) = Self::omega(freq, sample_rate);
        let a = 10.0_f64.powf(clamp_gain(gain_db) / 40.0);
        let alpha = sin_w0 / 2.0 * 2.0_f64.sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
        self.set_normalized(
            a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
            a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
            (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
        );
    }

    /// High shelf with slope S = 1.
    pub fn set_high_shelf(&mut self, freq: f64, gain_db: f64, sample_rate: f64) {
        let (cos_w0, sin_w0) = Self::omega(freq, sample_rate);
        let a = 10.0_f64.powf(clamp_gain(gain_db) / 40.0);
        let alpha = sin_w0 / 2.0 * 2.0_f64.sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
        self.set_normalized(
            a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
            a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
            (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
        );
    }

    /// Configure by type. `q` is ignored by the shelves, `gain_db` only used
    /// by peaking and shelves.
    pub fn configure(&mut self, filter_type: FilterType, freq: f64, q: f64, gain_db: f64, sample_rate: f64) {
        match filter_type {
            FilterType::Lowpass => self.set_lowpass(freq, q, sample_rate),
            FilterType::Highpass => self.set_highpass(freq, q, sample_rate),
            FilterType::Bandpass => self.set_bandpass(freq, q, sample_rate),
            FilterType::Notch => self.set_notch(freq, q, sample_rate),
            FilterType::Peaking => self.set_peaking(freq, q, gain_db, sample_rate),
            FilterType::LowShelf => self.set_low_shelf(freq, gain_db, sample_rate),
            FilterType::HighShelf => self.set_high_shelf(freq, gain_db, sample_rate),
            FilterType::Allpass => self.set_allpass(freq, q, sample_rate),
        }
    }

    /// Process a single sample through the filter.
    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        // Flush denormals and anything that escaped
        self.y1 = if y.is_finite() && y.abs() > 1e-30 { y } else { 0.0 };
        self.y1
    }

    /// Zero the state; coefficients are kept.
    pub fn clear(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// Magnitude response at `freq`, from the current coefficients.
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

/// One-pole smoother / tone filter.
#[derive(Debug, Clone, Default)]
pub struct OnePoleFilter {
    a: f64,
    z: f64,
}

impl OnePoleFilter {
    pub fn new(cutoff: f64, sample_rate: f64) -> Self {
        let mut f = OnePoleFilter { a: 1.0, z: 0.0 };
        f.set_cutoff(cutoff, sample_rate);
        f
    }

    pub fn set_cutoff(&mut self, cutoff: f64, sample_rate: f64) {
        let fc = clamp_cutoff(cutoff, sample_rate);
        self.a = 1.0 - (-2.0 * PI * fc / sample_rate).exp();
    }

    /// Set the smoothing coefficient directly (0 = frozen, 1 = pass-through).
    pub fn set_coefficient(&mut self, a: f64) {
        self.a = a.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn lowpass(&mut self, x: f64) -> f64 {
        self.z += self.a * (x - self.z);
        self.z
    }

    #[inline]
    pub fn highpass(&mut self, x: f64) -> f64 {
        x - self.lowpass(x)
    }

    pub fn value(&self) -> f64 {
        self.z
    }

    pub fn clear(&mut self) {
        self.z = 0.0;
    }
}

/// First-order all-pass: unity gain, 90° phase shift at the break frequency.
#[derive(Debug, Clone, Default)]
pub struct AllPassFilter {
    a: f64,
    x1: f64,
    y1: f64,
}

impl AllPassFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the 90° point at `freq`.
    pub fn set_frequency(&mut self, freq: f64, sample_rate: f64) {
        let t = (PI * clamp_cutoff(freq, sample_rate) / sample_rate).tan();
        self.a = (t - 1.0) / (t + 1.0);
    }

    pub fn set_coefficient(&mut self, a: f64) {
        self.a = a.clamp(-0.999, 0.999);
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.a * x + self.x1 - self.a * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }

    pub fn clear(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44100.0;

    fn sine_peak(filter: &mut BiquadFilter, freq: f64) -> f64 {
        let mut max_out = 0.0_f64;
        for i in 0..8820 {
            let t = i as f64 / SR;
            let out = filter.process((2.0 * PI * freq * t).sin());
            if i > 4410 {
                max_out = max_out.max(out.abs());
            }
        }
        max_out
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut f = BiquadFilter::lowpass(5000.0, 0.707, SR);
        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!((output - 1.0).abs() < 0.001, "Lowpass should pass DC, got {output}");
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut f = BiquadFilter::highpass(1000.0, 0.707, SR);
        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!(output.abs() < 0.001, "Highpass should block DC, got {output}");
    }

    #[test]
    fn lowpass_attenuates_high_freq() {
        let mut f = BiquadFilter::lowpass(200.0, 0.707, SR);
        let amp = sine_peak(&mut f, 10_000.0);
        assert!(amp < 0.01, "Lowpass@200Hz should strongly attenuate 10kHz, got amplitude {amp}");
    }

    #[test]
    fn bandpass_unity_at_centre() {
        let f = BiquadFilter::bandpass(1000.0, 2.0, SR);
        assert!((f.magnitude_at(1000.0, SR) - 1.0).abs() < 1e-6);
        assert!(f.magnitude_at(100.0, SR) < 0.1);
    }

    #[test]
    fn peaking_gain_at_centre() {
        let f = BiquadFilter::peaking(2000.0, 1.0, 6.0, SR);
        let db = 20.0 * f.magnitude_at(2000.0, SR).log10();
        assert!((db - 6.0).abs() < 0.01, "got {db} dB");
    }

    #[test]
    fn opposite_peaks_cancel() {
        let mut boost = BiquadFilter::peaking(730.0, 4.0, 9.0, SR);
        let mut cut = BiquadFilter::peaking(730.0, 4.0, -9.0, SR);
        for i in 0..2000 {
            let x = ((i * 7919) % 113) as f64 / 113.0 - 0.5;
            let y = cut.process(boost.process(x));
            assert!((y - x).abs() < 1e-9);
        }
    }

    #[test]
    fn shelves_reach_gain() {
        let mut f = BiquadFilter::new();
        f.set_low_shelf(200.0, 12.0, SR);
        assert!((20.0 * f.magnitude_at(20.0, SR).log10() - 12.0).abs() < 0.3);
        assert!(20.0 * f.magnitude_at(10_000.0, SR).log10() < 0.5);
        f.set_high_shelf(4000.0, -12.0, SR);
        assert!((20.0 * f.magnitude_at(20_000.0, SR).log10() + 12.0).abs() < 0.5);
    }

    #[test]
    fn cutoff_clamped_below_nyquist() {
        let mut f = BiquadFilter::lowpass(1.0e9, 50.0, SR);
        for i in 0..10000 {
            let out = f.process(if i == 0 { 1.0 } else { 0.0 });
            assert!(out.is_finite());
        }
        assert_eq!(clamp_cutoff(1.0e9, SR), SR * MAX_CUTOFF_RATIO);
        assert_eq!(clamp_cutoff(-5.0, SR), MIN_CUTOFF_HZ);
    }

    #[test]
    fn impulse_response_decays_for_all_types() {
        let types = [
            FilterType::Lowpass,
            FilterType::Highpass,
            FilterType::Bandpass,
            FilterType::Notch,
            FilterType::Peaking,
            FilterType::LowShelf,
            FilterType::HighShelf,
            FilterType::Allpass,
        ];
        for &t in &types {
            for &freq in &[20.0, 440.0, 5000.0, 19_000.0] {
                for &q in &[0.1, 0.707, 10.0, 40.0] {
                    let mut f = BiquadFilter::new();
                    f.configure(t, freq, q, 24.0, SR);
                    let mut tail = 0.0_f64;
                    for i in 0..(SR as usize * 2) {
                        let out = f.process(if i == 0 { 1.0 } else { 0.0 });
                        assert!(out.is_finite());
                        if i > SR as usize * 2 - 100 {
                            tail = tail.max(out.abs());
                        }
                    }
                    assert!(tail < 1e-3, "{t:?} {freq}Hz Q{q} did not decay: {tail}");
                }
            }
        }
    }

    #[test]
    fn one_pole_converges() {
        let mut f = OnePoleFilter::new(100.0, SR);
        let mut y = 0.0;
        for _ in 0..44100 {
            y = f.lowpass(1.0);
        }
        assert!((y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn allpass_keeps_magnitude() {
        let mut ap = AllPassFilter::new();
        ap.set_frequency(1000.0, SR);
        let mut energy_in = 0.0;
        let mut energy_out = 0.0;
        for i in 0..44100 {
            let x = (2.0 * PI * 3000.0 * i as f64 / SR).sin();
            let y = ap.process(x);
            if i > 1000 {
                energy_in += x * x;
                energy_out += y * y;
            }
        }
        assert!((energy_out / energy_in - 1.0).abs() < 0.01);
    }
}
