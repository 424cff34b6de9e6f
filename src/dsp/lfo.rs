//! Low-frequency oscillator.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::params::ParamChoice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LfoShape {
    #[default]
    Sine,
    Triangle,
    Square,
    Sawtooth,
    SampleHold,
}

impl ParamChoice for LfoShape {
    const OPTIONS: &'static [&'static str] = &["sine", "triangle", "square", "sawtooth", "samplehold"];

    fn from_index(index: usize) -> Self {
        match index {
            1 => LfoShape::Triangle,
            2 => LfoShape::Square,
            3 => LfoShape::Sawtooth,
            4 => LfoShape::SampleHold,
            _ => LfoShape::Sine,
        }
    }
}

/// Bipolar LFO in [-1, 1]. Sample-and-hold draws a new value each cycle
/// from a seeded generator.
#[derive(Debug, Clone)]
pub struct Lfo {
    phase: f64,
    increment: f64,
    held: f64,
    rng: fastrand::Rng,
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new()
    }
}

impl Lfo {
    pub fn new() -> Self {
        Self::with_seed(0x1F0_5EED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Lfo {
            phase: 0.0,
            increment: 0.0,
            held: 0.0,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    pub fn set_rate(&mut self, hz: f64, sample_rate: f64) {
        self.increment = if hz.is_finite() && hz > 0.0 && sample_rate > 0.0 {
            (hz / sample_rate).min(0.5)
        } else {
            0.0
        };
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase.rem_euclid(1.0);
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.held = 0.0;
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = fastrand::Rng::with_seed(seed);
    }

    /// Value at the current phase without advancing.
    #[inline]
    pub fn value(&self, shape: LfoShape) -> f64 {
        let p = self.phase;
        match shape {
            LfoShape::Sine => (TAU * p).sin(),
            LfoShape::Triangle => {
                let q = p * 4.0;
                if q < 1.0 {
                    q
                } else if q < 3.0 {
                    2.0 - q
                } else {
                    q - 4.0
                }
            }
            LfoShape::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoShape::Sawtooth => p * 2.0 - 1.0,
            LfoShape::SampleHold => self.held,
        }
    }

    /// Current value, then advance one sample.
    #[inline]
    pub fn next(&mut self, shape: LfoShape) -> f64 {
        let v = self.value(shape);
        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
            self.held = self.rng.f64() * 2.0 - 1.0;
        }
        v
    }

    #[inline]
    pub fn sine(&mut self) -> f64 {
        self.next(LfoShape::Sine)
    }

    #[inline]
    pub fn triangle(&mut self) -> f64 {
        self.next(LfoShape::Triangle)
    }

    #[inline]
    pub fn square(&mut self) -> f64 {
        self.next(LfoShape::Square)
    }

    #[inline]
    pub fn sample_hold(&mut self) -> f64 {
        self.next(LfoShape::SampleHold)
    }

    /// Unipolar [0, 1] sine, convenient for delay-time sweeps.
    #[inline]
    pub fn unipolar(&mut self) -> f64 {
        0.5 + 0.5 * self.sine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_stay_bipolar() {
        for shape in [LfoShape::Sine, LfoShape::Triangle, LfoShape::Square, LfoShape::Sawtooth, LfoShape::SampleHold] {
            let mut lfo = Lfo::new();
            lfo.set_rate(7.0, 1000.0);
            for _ in 0..5000 {
                let v = lfo.next(shape);
                assert!((-1.0..=1.0).contains(&v), "{shape:?} gave {v}");
            }
        }
    }

    #[test]
    fn one_cycle_per_period() {
        let mut lfo = Lfo::new();
        lfo.set_rate(25.0, 100.0);
        let first = lfo.square();
        for _ in 0..3 {
            lfo.square();
        }
        assert_eq!(lfo.square(), first);
    }

    #[test]
    fn sample_hold_changes_once_per_cycle() {
        let mut lfo = Lfo::with_seed(3);
        lfo.set_rate(10.0, 1000.0);
        let mut changes = 0;
        let mut last = lfo.sample_hold();
        for _ in 0..999 {
            let v = lfo.sample_hold();
            if v != last {
                changes += 1;
            }
            last = v;
        }
        assert!((9..=10).contains(&changes), "got {changes}");
    }
}
