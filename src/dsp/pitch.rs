//! Pitch analysis: offline YIN estimation, a streaming autocorrelation
//! tracker, and scale quantization for pitch correction.

use serde::{Deserialize, Serialize};

use crate::params::ParamChoice;

use super::util::freq_to_midi;

/// Result of pitch detection on a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchEstimate {
    /// Estimated fundamental in Hz, 0 when nothing was found.
    pub frequency: f64,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Nearest MIDI note number.
    pub midi_note: u8,
    /// Offset in cents from `midi_note`.
    pub fine_tune_cents: f64,
    /// The buffer looks non-melodic (noise, percussion).
    pub is_noise: bool,
}

impl PitchEstimate {
    fn unpitched() -> Self {
        PitchEstimate {
            frequency: 0.0,
            confidence: 0.0,
            midi_note: 0,
            fine_tune_cents: 0.0,
            is_noise: true,
        }
    }
}

/// Estimate the fundamental of a mono buffer with YIN.
///
/// Searches `min_freq..=max_freq`. Allocates its scratch space, so it is
/// meant for sample analysis at load time, not for the render path.
pub fn detect_pitch(samples: &[f64], sample_rate: f64, min_freq: f64, max_freq: f64) -> PitchEstimate {
    if sample_rate <= 0.0 || min_freq <= 0.0 || max_freq <= min_freq {
        return PitchEstimate::unpitched();
    }
    let min_lag = (sample_rate / max_freq).ceil().max(2.0) as usize;
    let max_lag = (sample_rate / min_freq).floor() as usize;
    if samples.is_empty() || samples.len() < max_lag * 2 {
        return PitchEstimate::unpitched();
    }

    let window = max_lag.min(samples.len() / 2);

    // Difference function
    let mut diff = vec![0.0f64; window + 1];
    for tau in 1..=window {
        diff[tau] = (0..window)
            .map(|j| {
                let d = samples[j] - samples[j + tau];
                d * d
            })
            .sum();
    }

    // Cumulative mean normalized difference
    let mut cmnd = vec![1.0f64; window + 1];
    let mut running = 0.0;
    for tau in 1..=window {
        running += diff[tau];
        if running > 0.0 {
            cmnd[tau] = diff[tau] * tau as f64 / running;
        }
    }

    let upper = window.min(max_lag);
    let threshold = 0.15;
    let mut best_tau = 0usize;
    let mut best_val = 1.0f64;
    for tau in min_lag..=upper {
        if cmnd[tau] < threshold {
            let mut t = tau;
            while t < upper && cmnd[t + 1] < cmnd[t] {
                t += 1;
            }
            best_tau = t;
            best_val = cmnd[t];
            break;
        }
    }
    if best_tau == 0 {
        for tau in min_lag..=upper {
            if cmnd[tau] < best_val {
                best_val = cmnd[tau];
                best_tau = tau;
            }
        }
    }
    if best_tau == 0 {
        return PitchEstimate::unpitched();
    }

    let refined = parabolic_peak(&cmnd, best_tau);
    let frequency = sample_rate / refined;
    let confidence = (1.0 - best_val).clamp(0.0, 1.0);
    let (midi_note, fine_tune_cents) = freq_to_midi_cents(frequency);

    PitchEstimate {
        frequency,
        confidence,
        midi_note,
        fine_tune_cents,
        is_noise: confidence < 0.5,
    }
}

/// Sub-sample position of the extremum around `i`.
fn parabolic_peak(values: &[f64], i: usize) -> f64 {
    if i == 0 || i + 1 >= values.len() {
        return i as f64;
    }
    let (a, b, c) = (values[i - 1], values[i], values[i + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() > 1e-12 {
        i as f64 + 0.5 * (a - c) / denom
    } else {
        i as f64
    }
}

/// Nearest MIDI note and the remaining offset in cents.
pub fn freq_to_midi_cents(freq: f64) -> (u8, f64) {
    if freq <= 0.0 || !freq.is_finite() {
        return (0, 0.0);
    }
    let midi = freq_to_midi(freq);
    let note = midi.round();
    ((note as i32).clamp(0, 127) as u8, (midi - note) * 100.0)
}

/// Streaming pitch tracker based on normalized autocorrelation.
///
/// Samples are pushed one at a time; every `hop` samples the last window is
/// analysed over the lag range of `min_freq..=max_freq`. A period is only
/// reported when its correlation exceeds the threshold.
#[derive(Debug, Clone)]
pub struct AutocorrelationDetector {
    ring: Vec<f64>,
    ring_pos: usize,
    scratch: Vec<f64>,
    window: usize,
    min_lag: usize,
    max_lag: usize,
    hop: usize,
    since_analysis: usize,
    threshold: f64,
    sample_rate: f64,
    frequency: Option<f64>,
    correlation: f64,
}

impl AutocorrelationDetector {
    pub fn new(sample_rate: f64, min_freq: f64, max_freq: f64) -> Self {
        let min_lag = (sample_rate / max_freq).floor().max(2.0) as usize;
        let max_lag = (sample_rate / min_freq).ceil().max(min_lag as f64 + 1.0) as usize;
        let window = (2 * max_lag).max(1024);
        let total = window + max_lag + 1;
        AutocorrelationDetector {
            ring: vec![0.0; total],
            ring_pos: 0,
            scratch: vec![0.0; total],
            window,
            min_lag,
            max_lag,
            hop: 256,
            since_analysis: 0,
            threshold: 0.5,
            sample_rate,
            frequency: None,
            correlation: 0.0,
        }
    }

    /// The 80–500 Hz voice range.
    pub fn for_voice(sample_rate: f64) -> Self {
        Self::new(sample_rate, 80.0, 500.0)
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold.clamp(0.0, 1.0);
    }

    pub fn set_hop(&mut self, hop: usize) {
        self.hop = hop.max(1);
    }

    /// Push one sample. Returns true when a new analysis ran.
    #[inline]
    pub fn push(&mut self, x: f64) -> bool {
        self.ring[self.ring_pos] = if x.is_finite() { x } else { 0.0 };
        self.ring_pos = (self.ring_pos + 1) % self.ring.len();
        self.since_analysis += 1;
        if self.since_analysis >= self.hop {
            self.since_analysis = 0;
            self.analyse();
            true
        } else {
            false
        }
    }

    /// Last accepted fundamental, if the most recent analysis found one.
    pub fn frequency(&self) -> Option<f64> {
        self.frequency
    }

    /// Correlation of the most recent best lag.
    pub fn correlation(&self) -> f64 {
        self.correlation
    }

    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.ring_pos = 0;
        self.since_analysis = 0;
        self.frequency = None;
        self.correlation = 0.0;
    }

    fn normalized_correlation(&self, lag: usize) -> f64 {
        let x = &self.scratch;
        let mut num = 0.0;
        let mut e0 = 0.0;
        let mut e1 = 0.0;
        for n in 0..self.window {
            let a = x[n];
            let b = x[n + lag];
            num += a * b;
            e0 += a * a;
            e1 += b * b;
        }
        let denom = (e0 * e1).sqrt();
        if denom > 1e-12 { num / denom } else { 0.0 }
    }

    fn analyse(&mut self) {
        // Oldest sample first
        let len = self.ring.len();
        for i in 0..len {
            self.scratch[i] = self.ring[(self.ring_pos + i) % len];
        }

        let mut best = f64::MIN;
        for lag in self.min_lag..=self.max_lag {
            best = best.max(self.normalized_correlation(lag));
        }
        if best < self.threshold {
            self.frequency = None;
            self.correlation = best.max(0.0);
            return;
        }

        // The shortest local peak close to the best avoids octave-down errors
        let mut chosen = self.max_lag;
        let mut prev = self.normalized_correlation(self.min_lag);
        let mut cur = self.normalized_correlation(self.min_lag + 1);
        for lag in (self.min_lag + 1)..self.max_lag {
            let next = self.normalized_correlation(lag + 1);
            if cur >= prev && cur >= next && cur >= 0.9 * best {
                chosen = lag;
                break;
            }
            prev = cur;
            cur = next;
        }

        let period = if chosen > self.min_lag && chosen < self.max_lag {
            let a = self.normalized_correlation(chosen - 1);
            let b = self.normalized_correlation(chosen);
            let c = self.normalized_correlation(chosen + 1);
            let denom = a - 2.0 * b + c;
            if denom.abs() > 1e-12 {
                chosen as f64 + 0.5 * (a - c) / denom
            } else {
                chosen as f64
            }
        } else {
            chosen as f64
        };
        self.correlation = best;
        self.frequency = Some(self.sample_rate / period);
    }
}

/// Scales available to pitch correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Chromatic,
    Major,
    Minor,
    Pentatonic,
    Blues,
}

impl Scale {
    /// Semitone degrees above the key, in listed order.
    pub fn degrees(self) -> &'static [u8] {
        match self {
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::Pentatonic => &[0, 2, 4, 7, 9],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
        }
    }
}

impl ParamChoice for Scale {
    const OPTIONS: &'static [&'static str] = &["chromatic", "major", "minor", "pentatonic", "blues"];

    fn from_index(index: usize) -> Self {
        match index {
            1 => Scale::Major,
            2 => Scale::Minor,
            3 => Scale::Pentatonic,
            4 => Scale::Blues,
            _ => Scale::Chromatic,
        }
    }
}

/// Snap a fractional MIDI note to the nearest degree of `scale` rooted at
/// pitch class `key` (0 = C).
///
/// Distance is measured around the pitch-class circle; on a tie the degree
/// listed first wins.
pub fn quantize_to_scale(midi: f64, scale: Scale, key: u8) -> f64 {
    if !midi.is_finite() {
        return midi;
    }
    let pc = (midi - key as f64).rem_euclid(12.0);
    let mut best_delta = 0.0;
    let mut best_dist = f64::MAX;
    for &degree in scale.degrees() {
        // Signed shift to this degree, wrapped into [-6, 6)
        let delta = (degree as f64 - pc + 6.0).rem_euclid(12.0) - 6.0;
        let dist = delta.abs();
        if dist < best_dist - 1e-9 {
            best_dist = dist;
            best_delta = delta;
        }
    }
    (midi + best_delta).round()
}
