//! Feedback comb and Schroeder all-pass delay loops.
//!
//! Both keep a fixed-capacity buffer and an adjustable active length, so a
//! resonator can be retuned per note without reallocating.

/// A feedback comb filter with a one-pole low-pass in the loop.
#[derive(Debug, Clone)]
pub struct CombFilter {
    buffer: Vec<f64>,
    len: usize,
    index: usize,
    feedback: f64,
    damp1: f64,
    damp2: f64,
    filterstore: f64,
}

impl CombFilter {
    /// `capacity` is the longest loop length this comb can be tuned to.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        CombFilter {
            buffer: vec![0.0; capacity],
            len: capacity,
            index: 0,
            feedback: 0.5,
            damp1: 0.0,
            damp2: 1.0,
            filterstore: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Loop length in samples, clamped to `[1, capacity]`.
    pub fn set_delay(&mut self, samples: usize) {
        self.len = samples.clamp(1, self.buffer.len());
        if self.index >= self.len {
            self.index = 0;
        }
    }

    /// Tune the loop so it resonates at `freq`.
    pub fn tune(&mut self, freq: f64, sample_rate: f64) {
        if freq > 0.0 && freq.is_finite() {
            self.set_delay((sample_rate / freq).round() as usize);
        }
    }

    /// Loop gain, kept below 1 for stability.
    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(-0.999, 0.999);
    }

    /// High-frequency damping in the loop, 0 = bright, 1 = dark.
    pub fn set_damp(&mut self, damp: f64) {
        self.damp1 = damp.clamp(0.0, 1.0);
        self.damp2 = 1.0 - self.damp1;
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.buffer[self.index];
        self.filterstore = output * self.damp2 + self.filterstore * self.damp1;
        self.buffer[self.index] = input + self.filterstore * self.feedback;
        self.index += 1;
        if self.index >= self.len {
            self.index = 0;
        }
        output
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filterstore = 0.0;
        self.index = 0;
    }
}

/// Schroeder all-pass used for diffusion in the reverb tail.
#[derive(Debug, Clone)]
pub struct Diffuser {
    buffer: Vec<f64>,
    index: usize,
    feedback: f64,
}

impl Diffuser {
    pub fn new(size: usize) -> Self {
        Diffuser {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback: 0.5,
        }
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(-0.95, 0.95);
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let bufout = self.buffer[self.index];
        let output = bufout - input;
        self.buffer[self.index] = input + bufout * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comb_echoes_at_loop_length() {
        let mut c = CombFilter::new(100);
        c.set_delay(10);
        c.set_feedback(0.5);
        let mut out = Vec::new();
        for i in 0..31 {
            out.push(c.process(if i == 0 { 1.0 } else { 0.0 }));
        }
        assert_eq!(out[10], 1.0);
        assert_eq!(out[20], 0.5);
        assert_eq!(out[30], 0.25);
        assert_eq!(out[5], 0.0);
    }

    #[test]
    fn comb_tune_clamps_to_capacity() {
        let mut c = CombFilter::new(64);
        c.tune(1.0, 44100.0);
        c.set_feedback(0.9);
        for i in 0..1000 {
            assert!(c.process(if i == 0 { 1.0 } else { 0.0 }).is_finite());
        }
    }

    #[test]
    fn comb_decays_with_damping() {
        let mut c = CombFilter::new(441);
        c.set_feedback(0.95);
        c.set_damp(0.4);
        let mut tail = 0.0_f64;
        for i in 0..88_200 {
            let y = c.process(if i == 0 { 1.0 } else { 0.0 });
            if i > 88_000 {
                tail = tail.max(y.abs());
            }
        }
        assert!(tail < 1e-3);
    }

    #[test]
    fn diffuser_is_finite_and_clears() {
        let mut d = Diffuser::new(225);
        let mut any = false;
        for i in 0..2000 {
            let y = d.process(if i == 0 { 1.0 } else { 0.0 });
            any |= y.abs() > 0.0;
        }
        assert!(any);
        d.clear();
        assert_eq!(d.process(0.0), 0.0);
    }
}
