//! One-pole glide for block-rate control values (delay times, ratios).

use super::util::time_to_coeff;

#[derive(Debug, Clone)]
pub struct Smoother {
    value: f64,
    target: f64,
    coeff: f64,
    primed: bool,
}

impl Smoother {
    /// `time` is the one-pole time constant in seconds.
    pub fn new(time: f64, sample_rate: f64) -> Self {
        Smoother {
            value: 0.0,
            target: 0.0,
            coeff: time_to_coeff(time, sample_rate),
            primed: false,
        }
    }

    pub fn set_time(&mut self, time: f64, sample_rate: f64) {
        self.coeff = time_to_coeff(time, sample_rate);
    }

    /// The first target after construction or `reset` is taken immediately.
    pub fn set_target(&mut self, target: f64) {
        if !target.is_finite() {
            return;
        }
        self.target = target;
        if !self.primed {
            self.value = target;
            self.primed = true;
        }
    }

    #[inline]
    pub fn next(&mut self) -> f64 {
        self.value = self.target + self.coeff * (self.value - self.target);
        if (self.value - self.target).abs() < 1e-9 {
            self.value = self.target;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn reset(&mut self) {
        self.primed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_target_is_immediate() {
        let mut s = Smoother::new(0.05, 44100.0);
        s.set_target(3.0);
        assert_eq!(s.next(), 3.0);
    }

    #[test]
    fn glides_then_settles_exactly() {
        let mut s = Smoother::new(0.01, 1000.0);
        s.set_target(0.0);
        s.set_target(1.0);
        let first = s.next();
        assert!(first > 0.0 && first < 1.0);
        for _ in 0..1000 {
            s.next();
        }
        assert_eq!(s.value(), 1.0);
    }
}
