//! Per-sample dry/wet blend at the block's mix.

/// Mix amount for the current block. `0` passes the dry signal untouched
/// and `1` passes only the wet signal, whatever the previous block used.
#[derive(Debug, Clone, Default)]
pub struct DryWet {
    mix: f64,
}

impl DryWet {
    pub fn new() -> Self {
        DryWet::default()
    }

    /// Set the mix for the coming block. Non-finite values read as dry.
    pub fn set(&mut self, mix: f64) {
        self.mix = if mix.is_finite() { mix.clamp(0.0, 1.0) } else { 0.0 };
    }

    /// Blend one stereo frame. A non-finite wet sample counts as silence.
    #[inline]
    pub fn blend(&self, dry: (f32, f32), wet: (f64, f64)) -> (f32, f32) {
        let m = self.mix;
        if m == 0.0 {
            return dry;
        }
        let clean = |w: f64| if w.is_finite() { w.clamp(-4.0, 4.0) } else { 0.0 };
        let l = dry.0 as f64 * (1.0 - m) + clean(wet.0) * m;
        let r = dry.1 as f64 * (1.0 - m) + clean(wet.1) * m;
        (l as f32, r as f32)
    }

    pub fn value(&self) -> f64 {
        self.mix
    }

    pub fn reset(&mut self) {
        self.mix = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mix_is_exact_dry() {
        let mut m = DryWet::new();
        m.set(0.0);
        assert_eq!(m.blend((0.3, -0.7), (123.0, f64::NAN)), (0.3, -0.7));
    }

    #[test]
    fn full_mix_is_wet() {
        let mut m = DryWet::new();
        m.set(1.0);
        assert_eq!(m.blend((0.3, -0.7), (0.25, 0.5)), (0.25, 0.5));
    }

    #[test]
    fn changes_apply_from_the_first_frame() {
        let mut m = DryWet::new();
        m.set(0.5);
        assert_eq!(m.blend((0.0, 0.0), (1.0, 1.0)), (0.5, 0.5));
        m.set(0.0);
        assert_eq!(m.blend((0.2, 0.1), (1.0, 1.0)), (0.2, 0.1));
        m.set(1.0);
        assert_eq!(m.blend((0.2, 0.1), (0.75, -0.25)), (0.75, -0.25));
        assert_eq!(m.value(), 1.0);
    }
}
