//! Attack/release envelope follower for sidechain detection.

use super::util::time_to_coeff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FollowerMode {
    #[default]
    Peak,
    /// Tracks the square of the signal and returns its root.
    Rms,
}

#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    mode: FollowerMode,
    envelope: f64,
    attack_coeff: f64,
    release_coeff: f64,
}

impl EnvelopeFollower {
    /// Times in seconds.
    pub fn new(attack: f64, release: f64, sample_rate: f64) -> Self {
        let mut f = EnvelopeFollower {
            mode: FollowerMode::Peak,
            envelope: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
        };
        f.set_times(attack, release, sample_rate);
        f
    }

    pub fn with_mode(mut self, mode: FollowerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_times(&mut self, attack: f64, release: f64, sample_rate: f64) {
        self.attack_coeff = time_to_coeff(attack, sample_rate);
        self.release_coeff = time_to_coeff(release, sample_rate);
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let level = match self.mode {
            FollowerMode::Peak => input.abs(),
            FollowerMode::Rms => input * input,
        };
        let level = if level.is_finite() { level } else { 0.0 };
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * level;
        self.value()
    }

    pub fn value(&self) -> f64 {
        match self.mode {
            FollowerMode::Peak => self.envelope,
            FollowerMode::Rms => self.envelope.sqrt(),
        }
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}
