//! ADSR envelope generator.

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdsrStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope with linear segments.
///
/// Each timed stage counts a whole number of samples, so the sustain level
/// is hit exactly at the end of decay and a release of `r` seconds is idle
/// after `round(r * sr)` samples.
#[derive(Debug, Clone)]
pub struct Adsr {
    /// Attack time in seconds.
    pub attack: f64,
    /// Decay time in seconds.
    pub decay: f64,
    /// Sustain level [0, 1].
    pub sustain: f64,
    /// Release time in seconds.
    pub release: f64,

    stage: AdsrStage,
    level: f64,
    sample_rate: f64,
    stage_samples: usize,
    stage_counter: usize,
    /// Level at the start of the current stage.
    start_level: f64,
}

impl Adsr {
    pub fn new(sample_rate: f64) -> Self {
        Adsr {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
            stage: AdsrStage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            start_level: 0.0,
        }
    }

    /// Set all four segments at once. Times are clamped at zero and the
    /// sustain level into [0, 1].
    pub fn set(&mut self, attack: f64, decay: f64, sustain: f64, release: f64) {
        self.attack = non_negative(attack);
        self.decay = non_negative(decay);
        self.sustain = if sustain.is_finite() { sustain.clamp(0.0, 1.0) } else { 0.0 };
        self.release = non_negative(release);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn samples_for(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate).round() as usize
    }

    /// Enter attack, continuing from the current level on a retrigger.
    pub fn trigger(&mut self) {
        self.stage = AdsrStage::Attack;
        self.stage_samples = self.samples_for(self.attack);
        self.stage_counter = 0;
        self.start_level = self.level;
    }

    /// Enter release from any active stage.
    pub fn release(&mut self) {
        if self.stage == AdsrStage::Idle {
            return;
        }
        self.stage = AdsrStage::Release;
        self.stage_samples = self.samples_for(self.release);
        self.stage_counter = 0;
        self.start_level = self.level;
    }

    /// Advance one sample and return the level in [0, 1].
    pub fn process(&mut self) -> f64 {
        match self.stage {
            AdsrStage::Idle => {
                self.level = 0.0;
            }
            AdsrStage::Attack => {
                self.stage_counter += 1;
                if self.stage_counter >= self.stage_samples {
                    self.level = 1.0;
                    self.enter(AdsrStage::Decay);
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = self.start_level + (1.0 - self.start_level) * t;
                }
            }
            AdsrStage::Decay => {
                self.stage_counter += 1;
                if self.stage_counter >= self.stage_samples {
                    self.level = self.sustain;
                    self.stage = AdsrStage::Sustain;
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = 1.0 - (1.0 - self.sustain) * t;
                }
            }
            AdsrStage::Sustain => {
                self.level = self.sustain;
            }
            AdsrStage::Release => {
                self.stage_counter += 1;
                if self.stage_counter >= self.stage_samples {
                    self.level = 0.0;
                    self.stage = AdsrStage::Idle;
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = self.start_level * (1.0 - t);
                }
            }
        }
        self.level
    }

    /// False only once release has decayed fully (or before any trigger).
    pub fn is_active(&self) -> bool {
        self.stage != AdsrStage::Idle
    }

    pub fn stage(&self) -> AdsrStage {
        self.stage
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    /// Back to idle at zero, keeping the segment settings.
    pub fn reset(&mut self) {
        self.stage = AdsrStage::Idle;
        self.level = 0.0;
        self.stage_counter = 0;
        self.stage_samples = 0;
        self.start_level = 0.0;
    }

    fn enter(&mut self, stage: AdsrStage) {
        self.stage = stage;
        self.stage_samples = match stage {
            AdsrStage::Decay => self.samples_for(self.decay),
            AdsrStage::Release => self.samples_for(self.release),
            _ => 0,
        };
        self.stage_counter = 0;
    }
}

fn non_negative(seconds: f64) -> f64 {
    if seconds.is_finite() { seconds.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let env = Adsr::new(44100.0);
        assert!(!env.is_active());
        assert_eq!(env.stage(), AdsrStage::Idle);
    }

    #[test]
    fn attack_reaches_one() {
        let mut env = Adsr::new(44100.0);
        env.attack = 0.01;
        env.trigger();

        let mut max_level = 0.0_f64;
        for _ in 0..500 {
            max_level = max_level.max(env.process());
        }
        assert_eq!(max_level, 1.0);
    }

    #[test]
    fn sustain_reached_exactly() {
        let mut env = Adsr::new(44100.0);
        env.set(0.001, 0.003, 0.6, 0.1);
        env.trigger();
        for _ in 0..1000 {
            env.process();
        }
        assert_eq!(env.stage(), AdsrStage::Sustain);
        assert_eq!(env.process(), 0.6);
    }

    #[test]
    fn zero_attack_is_immediate() {
        let mut env = Adsr::new(44100.0);
        env.set(0.0, 0.5, 0.5, 0.1);
        env.trigger();
        assert_eq!(env.process(), 1.0);
    }

    #[test]
    fn release_time_ends_activity() {
        let mut env = Adsr::new(1000.0);
        env.set(0.005, 0.005, 0.7, 0.02);
        env.trigger();
        for _ in 0..100 {
            env.process();
        }
        env.release();
        assert!(env.is_active());
        for _ in 0..20 {
            env.process();
        }
        assert!(!env.is_active());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn release_from_attack_starts_at_current_level() {
        let mut env = Adsr::new(1000.0);
        env.set(0.1, 0.1, 0.5, 0.1);
        env.trigger();
        for _ in 0..50 {
            env.process();
        }
        let before = env.level();
        env.release();
        let after = env.process();
        assert!(after < before && after > 0.0);
    }

    #[test]
    fn full_cycle_range() {
        let mut env = Adsr::new(44100.0);
        env.set(0.01, 0.05, 0.5, 0.1);
        env.trigger();
        for _ in 0..10000 {
            let s = env.process();
            assert!((0.0..=1.0).contains(&s), "Envelope out of range: {s}");
        }
        env.release();
        for _ in 0..10000 {
            let s = env.process();
            assert!((0.0..=1.0).contains(&s), "Envelope out of range after release: {s}");
        }
        assert!(!env.is_active());
    }
}
