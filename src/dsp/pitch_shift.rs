//! Two-grain delay-line pitch shifter.
//!
//! Two read taps sweep through a short window at a speed set by the pitch
//! ratio, half a window apart. Each tap's gain is `sin²` of its position in
//! the window, so the taps fade out exactly where they wrap and the two
//! gains always sum to one.

use std::f64::consts::PI;

use super::delay_line::DelayLine;

#[derive(Debug, Clone)]
pub struct PitchShifter {
    line: DelayLine,
    window: f64,
    phase: f64,
    /// Crossfade towards the dry signal while the ratio is exactly 1.
    unity: f64,
    unity_step: f64,
}

impl PitchShifter {
    /// `window_ms` sets the grain length; 30–60 ms suits voices.
    pub fn new(window_ms: f64, sample_rate: f64) -> Self {
        let window = (window_ms.max(5.0) * 0.001 * sample_rate).max(16.0);
        PitchShifter {
            line: DelayLine::new(window.ceil() as usize + 2),
            window,
            phase: 0.0,
            unity: 1.0,
            unity_step: 1.0 / (0.01 * sample_rate).max(1.0),
        }
    }

    /// Window length in samples.
    pub fn window(&self) -> f64 {
        self.window
    }

    /// Shift one sample by `ratio` (2 = up an octave).
    #[inline]
    pub fn process(&mut self, x: f64, ratio: f64) -> f64 {
        let ratio = if ratio.is_finite() { ratio.clamp(0.25, 4.0) } else { 1.0 };
        self.line.write(x);

        let target = if (ratio - 1.0).abs() < 1e-9 { 1.0 } else { 0.0 };
        if self.unity < target {
            self.unity = (self.unity + self.unity_step).min(1.0);
        } else if self.unity > target {
            self.unity = (self.unity - self.unity_step).max(0.0);
        }

        let shifted = if self.unity < 1.0 {
            let p0 = self.phase;
            let p1 = (self.phase + 0.5) % 1.0;
            let g0 = (PI * p0).sin().powi(2);
            let g1 = (PI * p1).sin().powi(2);
            self.line.read_interpolated(p0 * self.window) * g0
                + self.line.read_interpolated(p1 * self.window) * g1
        } else {
            0.0
        };

        self.phase = (self.phase + (1.0 - ratio) / self.window).rem_euclid(1.0);
        self.unity * x + (1.0 - self.unity) * shifted
    }

    pub fn clear(&mut self) {
        self.line.clear();
        self.phase = 0.0;
        self.unity = 1.0;
    }
}
