//! Pitch correction towards the nearest note of a scale.

use crate::dsp::util::{freq_to_midi, semitones_to_ratio};
use crate::dsp::{
    AudioBuffer, AutocorrelationDetector, DryWet, DspContext, PitchShifter, Scale, Smoother, quantize_to_scale,
};
use crate::params::{ParamChoice, ParamSnapshot, ParamSpec, mix_spec};
use crate::unit::EffectProcessor;

use super::run_frames;

pub const KEYS: &[&str] = &["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

const KEY: ParamSpec = ParamSpec::choice("key", KEYS, 0);
const SCALE: ParamSpec = ParamSpec::choice("scale", Scale::OPTIONS, 0);
const SPEED: ParamSpec = ParamSpec::float("speed", 0.0, 500.0, 50.0);
const AMOUNT: ParamSpec = ParamSpec::float("amount", 0.0, 1.0, 1.0);
const MIX: ParamSpec = mix_spec(1.0);

pub const PARAMS: &[ParamSpec] = &[KEY, SCALE, SPEED, AMOUNT, MIX];

/// Corrections smaller than this (in semitones) are left alone.
const DEAD_BAND: f64 = 0.01;
const WINDOW_MS: f64 = 40.0;

#[derive(Debug, Clone, Copy)]
struct AutotuneConfig {
    key: u8,
    scale: Scale,
    amount: f64,
}

impl AutotuneConfig {
    fn from_params(params: &ParamSnapshot) -> Self {
        AutotuneConfig {
            key: params.choice_index(&KEY).min(11) as u8,
            scale: params.choice(&SCALE),
            amount: params.float(&AMOUNT),
        }
    }

    /// Shift ratio that moves `freq` onto the scale.
    fn correction(&self, freq: Option<f64>) -> f64 {
        let Some(freq) = freq else {
            return 1.0;
        };
        let midi = freq_to_midi(freq);
        let semis = (quantize_to_scale(midi, self.scale, self.key) - midi) * self.amount;
        if semis.abs() < DEAD_BAND {
            1.0
        } else {
            semitones_to_ratio(semis)
        }
    }
}

/// Detects the fundamental of the mono sum, snaps it to the chosen scale
/// and resamples both channels by the smoothed correction ratio.
#[derive(Debug, Clone)]
pub struct Autotune {
    sample_rate: f64,
    detector: AutocorrelationDetector,
    ratio: Smoother,
    shifter_l: PitchShifter,
    shifter_r: PitchShifter,
    mix: DryWet,
}

impl Autotune {
    pub fn new(sample_rate: f64) -> Self {
        let mut ratio = Smoother::new(0.05, sample_rate);
        ratio.set_target(1.0);
        Autotune {
            sample_rate,
            detector: AutocorrelationDetector::for_voice(sample_rate),
            ratio,
            shifter_l: PitchShifter::new(WINDOW_MS, sample_rate),
            shifter_r: PitchShifter::new(WINDOW_MS, sample_rate),
            mix: DryWet::new(),
        }
    }

    /// Ratio the corrector is currently gliding towards.
    pub fn target_ratio(&self) -> f64 {
        self.ratio.target()
    }
}

impl EffectProcessor for Autotune {
    fn name(&self) -> &'static str {
        "autotune"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let cfg = AutotuneConfig::from_params(params);
        self.ratio.set_time(params.float(&SPEED) * 0.001, sr);
        self.mix.set(params.float(&MIX));

        let Self {
            detector,
            ratio,
            shifter_l,
            shifter_r,
            mix,
            ..
        } = self;
        run_frames(input, output, mix, |l, r| {
            if detector.push(0.5 * (l + r)) {
                ratio.set_target(cfg.correction(detector.frequency()));
            }
            let k = ratio.next();
            (shifter_l.process(l, k), shifter_r.process(r, k))
        });
    }

    fn reset(&mut self) {
        self.detector.reset();
        self.ratio.reset();
        self.ratio.set_target(1.0);
        self.shifter_l.clear();
        self.shifter_r.clear();
        self.mix.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_util::{SR, sine};

    #[test]
    fn pulls_flat_note_to_nearest_semitone() {
        let mut fx = Autotune::new(SR);
        let params = ParamSnapshot::new().with("speed", 0.0);
        fx.process(&sine(420.0, 22050, 0.5), &params, &DspContext::new(SR));
        // 420 Hz sits nearest G#4 (415.30 Hz)
        let expected = 415.3047 / 420.0;
        assert!((fx.target_ratio() - expected).abs() < 0.002, "ratio {}", fx.target_ratio());
    }

    #[test]
    fn key_and_scale_restrict_targets() {
        let mut fx = Autotune::new(SR);
        // 460 Hz is between A and A#; A minor has no A#, so it lands on A
        let params = ParamSnapshot::new()
            .with("speed", 0.0)
            .with("key", "A")
            .with("scale", "minor");
        fx.process(&sine(460.0, 22050, 0.5), &params, &DspContext::new(SR));
        assert!((fx.target_ratio() - 440.0 / 460.0).abs() < 0.003, "ratio {}", fx.target_ratio());
    }

    #[test]
    fn zero_amount_is_transparent() {
        let mut fx = Autotune::new(SR);
        let params = ParamSnapshot::new().with("amount", 0.0);
        let input = sine(420.0, 8192, 0.5);
        let out = fx.process(&input, &params, &DspContext::new(SR));
        assert_eq!(out, input);
    }

    #[test]
    fn silence_leaves_ratio_at_unity() {
        let mut fx = Autotune::new(SR);
        let out = fx.process(&AudioBuffer::silence(4096, SR), &ParamSnapshot::new(), &DspContext::new(SR));
        assert_eq!(fx.target_ratio(), 1.0);
        assert_eq!(out.peak(), 0.0);
    }
}
