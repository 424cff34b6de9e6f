//! State-variable and ladder filters for the analog voices.
//!
//! The SVF is the trapezoidal (TPT) form: all four responses come out of one
//! pass and the cutoff can be swept at audio rate without zipper artifacts.

use std::f64::consts::PI;

use super::filter::clamp_cutoff;

/// The four simultaneous SVF outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvfOutputs {
    pub lowpass: f64,
    pub bandpass: f64,
    pub highpass: f64,
    pub notch: f64,
}

/// Which SVF output a voice listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvfMode {
    Lowpass,
    Bandpass,
    Highpass,
    Notch,
}

#[derive(Debug, Clone)]
pub struct StateVariableFilter {
    ic1eq: f64,
    ic2eq: f64,
    g: f64,
    k: f64,
}

impl Default for StateVariableFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl StateVariableFilter {
    pub fn new() -> Self {
        StateVariableFilter {
            ic1eq: 0.0,
            ic2eq: 0.0,
            g: 0.0,
            k: 2.0,
        }
    }

    /// `resonance` in [0, 1): 0 is critically damped, towards 1 self-oscillates.
    pub fn set(&mut self, cutoff: f64, resonance: f64, sample_rate: f64) {
        let fc = clamp_cutoff(cutoff, sample_rate);
        self.g = (PI * fc / sample_rate).tan();
        self.k = 2.0 - 2.0 * resonance.clamp(0.0, 0.98);
    }

    #[inline]
    pub fn tick(&mut self, x: f64) -> SvfOutputs {
        let h = 1.0 / (1.0 + self.g * (self.g + self.k));
        let v3 = x - self.ic2eq;
        let v1 = h * (self.ic1eq + self.g * v3);
        let v2 = self.ic2eq + self.g * v1;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        if !self.ic1eq.is_finite() || !self.ic2eq.is_finite() {
            self.clear();
        }

        SvfOutputs {
            lowpass: v2,
            bandpass: v1,
            highpass: x - self.k * v1 - v2,
            notch: x - self.k * v1,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f64, mode: SvfMode) -> f64 {
        let out = self.tick(x);
        match mode {
            SvfMode::Lowpass => out.lowpass,
            SvfMode::Bandpass => out.bandpass,
            SvfMode::Highpass => out.highpass,
            SvfMode::Notch => out.notch,
        }
    }

    pub fn clear(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

/// Four cascaded one-pole stages with global feedback and a tanh in the
/// loop, the usual 24 dB/oct transistor ladder approximation.
#[derive(Debug, Clone, Default)]
pub struct LadderFilter {
    stages: [f64; 4],
    g: f64,
    resonance: f64,
    drive: f64,
}

impl LadderFilter {
    pub fn new() -> Self {
        LadderFilter {
            stages: [0.0; 4],
            g: 0.0,
            resonance: 0.0,
            drive: 1.0,
        }
    }

    /// `resonance` in [0, 1]; near 1 the filter starts to ring.
    pub fn set(&mut self, cutoff: f64, resonance: f64, sample_rate: f64) {
        let fc = clamp_cutoff(cutoff, sample_rate);
        let wc = (PI * fc / sample_rate).tan();
        self.g = wc / (1.0 + wc);
        self.resonance = resonance.clamp(0.0, 1.0) * 3.9;
    }

    pub fn set_drive(&mut self, drive: f64) {
        self.drive = drive.clamp(0.1, 10.0);
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        // Passband gain loss from feedback is partially compensated
        let input = (self.drive * x - self.resonance * self.stages[3]).tanh();
        let mut stage_in = input;
        for s in self.stages.iter_mut() {
            let v = self.g * (stage_in - *s);
            let y = v + *s;
            *s = y + v;
            stage_in = y;
        }
        if !stage_in.is_finite() {
            self.clear();
            return 0.0;
        }
        stage_in * (1.0 + self.resonance * 0.25)
    }

    pub fn clear(&mut self) {
        self.stages = [0.0; 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48_000.0;

    #[test]
    fn svf_lowpass_passes_dc() {
        let mut f = StateVariableFilter::new();
        f.set(500.0, 0.0, SR);
        let mut y = 0.0;
        for _ in 0..4096 {
            y = f.process(1.0, SvfMode::Lowpass);
        }
        assert!(y > 0.99, "got {y}");
    }

    #[test]
    fn svf_highpass_blocks_dc() {
        let mut f = StateVariableFilter::new();
        f.set(500.0, 0.0, SR);
        let mut y = 1.0;
        for _ in 0..4096 {
            y = f.process(1.0, SvfMode::Highpass);
        }
        assert!(y.abs() < 1e-3, "got {y}");
    }

    #[test]
    fn svf_impulse_decays_at_high_resonance() {
        let mut f = StateVariableFilter::new();
        f.set(2000.0, 0.95, SR);
        let mut tail = 0.0_f64;
        for i in 0..(SR as usize) {
            let y = f.process(if i == 0 { 1.0 } else { 0.0 }, SvfMode::Bandpass);
            if i > SR as usize - 100 {
                tail = tail.max(y.abs());
            }
        }
        assert!(tail < 1e-4);
    }

    #[test]
    fn ladder_stays_bounded_when_driven() {
        let mut f = LadderFilter::new();
        f.set(800.0, 1.0, SR);
        f.set_drive(4.0);
        for i in 0..48_000 {
            let x = if (i / 50) % 2 == 0 { 1.0 } else { -1.0 };
            let y = f.process(x);
            assert!(y.is_finite() && y.abs() < 4.0);
        }
    }

    #[test]
    fn ladder_attenuates_above_cutoff() {
        let mut f = LadderFilter::new();
        f.set(200.0, 0.0, SR);
        let mut peak = 0.0_f64;
        for i in 0..9600 {
            let x = 0.5 * (2.0 * PI * 8000.0 * i as f64 / SR).sin();
            let y = f.process(x);
            if i > 4800 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.01, "got {peak}");
    }
}
