//! Interval-based pitch effects built on the two-grain shifter.

use crate::dsp::util::{balance_pan, semitones_to_ratio};
use crate::dsp::{AudioBuffer, DryWet, DspContext, PitchShifter};
use crate::params::{ParamSnapshot, ParamSpec, mix_spec};
use crate::unit::EffectProcessor;

use super::run_frames;

const WINDOW_MS: f64 = 50.0;

const VOICES: ParamSpec = ParamSpec::float("voices", 1.0, 2.0, 2.0).fixed();
const INTERVAL_1: ParamSpec = ParamSpec::float("interval1", -12.0, 12.0, 4.0);
const INTERVAL_2: ParamSpec = ParamSpec::float("interval2", -12.0, 12.0, 7.0);
const SPREAD: ParamSpec = ParamSpec::float("spread", 0.0, 1.0, 0.5);
const HARMONY_MIX: ParamSpec = mix_spec(0.5);

pub const HARMONY_PARAMS: &[ParamSpec] = &[VOICES, INTERVAL_1, INTERVAL_2, SPREAD, HARMONY_MIX];

/// Up to two shifted copies of the mono input, panned apart.
#[derive(Debug, Clone)]
pub struct Harmony {
    sample_rate: f64,
    voices: [PitchShifter; 2],
    mix: DryWet,
}

impl Harmony {
    pub fn new(sample_rate: f64) -> Self {
        Harmony {
            sample_rate,
            voices: [
                PitchShifter::new(WINDOW_MS, sample_rate),
                PitchShifter::new(WINDOW_MS, sample_rate),
            ],
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for Harmony {
    fn name(&self) -> &'static str {
        "harmony"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let count = params.count(&VOICES).clamp(1, 2);
        let ratios = [
            semitones_to_ratio(params.float(&INTERVAL_1)),
            semitones_to_ratio(params.float(&INTERVAL_2)),
        ];
        let spread = params.float(&SPREAD);
        let pans = if count == 1 {
            [balance_pan(0.0), balance_pan(0.0)]
        } else {
            [balance_pan(-spread), balance_pan(spread)]
        };
        let level = 1.0 / count as f64;
        self.mix.set(params.float(&HARMONY_MIX));

        let voices = &mut self.voices[..count];
        run_frames(input, output, &mut self.mix, |l, r| {
            let mono = 0.5 * (l + r);
            let mut out = (0.0, 0.0);
            for (i, voice) in voices.iter_mut().enumerate() {
                let y = voice.process(mono, ratios[i]) * level;
                out.0 += y * pans[i].0;
                out.1 += y * pans[i].1;
            }
            out
        });
    }

    fn reset(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.clear();
        }
        self.mix.reset();
    }
}

const SEMITONES: ParamSpec = ParamSpec::float("semitones", -24.0, 24.0, 0.0);
const CENTS: ParamSpec = ParamSpec::float("cents", -100.0, 100.0, 0.0);
const SHIFT_MIX: ParamSpec = mix_spec(1.0);

pub const PITCH_SHIFT_PARAMS: &[ParamSpec] = &[SEMITONES, CENTS, SHIFT_MIX];

/// Stereo transposition by a fixed interval.
#[derive(Debug, Clone)]
pub struct PitchShift {
    sample_rate: f64,
    left: PitchShifter,
    right: PitchShifter,
    mix: DryWet,
}

impl PitchShift {
    pub fn new(sample_rate: f64) -> Self {
        PitchShift {
            sample_rate,
            left: PitchShifter::new(WINDOW_MS, sample_rate),
            right: PitchShifter::new(WINDOW_MS, sample_rate),
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for PitchShift {
    fn name(&self) -> &'static str {
        "pitch-shift"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let ratio = semitones_to_ratio(params.float(&SEMITONES) + params.float(&CENTS) / 100.0);
        self.mix.set(params.float(&SHIFT_MIX));

        let (left, right) = (&mut self.left, &mut self.right);
        run_frames(input, output, &mut self.mix, |l, r| {
            (left.process(l, ratio), right.process(r, ratio))
        });
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.mix.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::detect_pitch;
    use crate::effects::test_util::{SR, sine};

    fn pitch_of(buffer: &AudioBuffer, from: usize) -> f64 {
        let samples: Vec<f64> = buffer.left()[from..].iter().map(|&s| s as f64).collect();
        detect_pitch(&samples, SR, 50.0, 2000.0).frequency
    }

    #[test]
    fn zero_shift_is_identity() {
        let mut fx = PitchShift::new(SR);
        let input = sine(300.0, 4096, 0.5);
        let out = fx.process(&input, &ParamSnapshot::new(), &DspContext::new(SR));
        assert_eq!(out, input);
    }

    #[test]
    fn octave_up_doubles_pitch() {
        let mut fx = PitchShift::new(SR);
        let params = ParamSnapshot::new().with("semitones", 12.0);
        let out = fx.process(&sine(220.0, 16384, 0.5), &params, &DspContext::new(SR));
        let f = pitch_of(&out, 8192);
        assert!((f - 440.0).abs() < 10.0, "detected {f}");
    }

    #[test]
    fn fifth_down_lowers_pitch() {
        let mut fx = PitchShift::new(SR);
        let params = ParamSnapshot::new().with("semitones", -7.0);
        let out = fx.process(&sine(440.0, 16384, 0.5), &params, &DspContext::new(SR));
        let f = pitch_of(&out, 8192);
        let expected = 440.0 * semitones_to_ratio(-7.0);
        assert!((f - expected).abs() < 8.0, "detected {f}");
    }

    #[test]
    fn harmony_pans_voices_apart() {
        let mut fx = Harmony::new(SR);
        let params = ParamSnapshot::new().with("spread", 1.0).with("mix", 1.0);
        let out = fx.process(&sine(262.0, 8192, 0.5), &params, &DspContext::new(SR));
        assert!(out.is_finite());
        // Full spread puts voice one hard left and voice two hard right
        assert!(out.rms() > 0.05);
        assert_ne!(out.left(), out.right());
    }
}
