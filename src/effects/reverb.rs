//! Schroeder-style algorithmic reverb.
//!
//! Eight parallel damped combs per channel followed by four series
//! all-passes, with the right channel's loops slightly longer for
//! decorrelation. A pre-delay line sits in front of the tank.

use crate::dsp::util::ms_to_samples;
use crate::dsp::{AudioBuffer, CombFilter, DelayLine, Diffuser, DryWet, DspContext};
use crate::params::{ParamSnapshot, ParamSpec, mix_spec};
use crate::unit::EffectProcessor;

use super::run_frames;

const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;

const FIXED_GAIN: f64 = 0.015;
const ROOM_SCALE: f64 = 0.28;
const ROOM_OFFSET: f64 = 0.7;
const MAX_PREDELAY_MS: f64 = 200.0;

const ROOM_SIZE: ParamSpec = ParamSpec::float("roomSize", 0.0, 1.0, 0.5);
const DAMPING: ParamSpec = ParamSpec::float("damping", 0.0, 1.0, 0.5);
const PREDELAY: ParamSpec = ParamSpec::float("predelay", 0.0, MAX_PREDELAY_MS, 10.0);
const WIDTH: ParamSpec = ParamSpec::float("width", 0.0, 1.0, 1.0);
const MIX: ParamSpec = mix_spec(0.3);

pub const PARAMS: &[ParamSpec] = &[ROOM_SIZE, DAMPING, PREDELAY, WIDTH, MIX];

#[derive(Debug, Clone)]
struct Tank {
    combs: [CombFilter; 8],
    diffusers: [Diffuser; 4],
}

impl Tank {
    fn new(scale: f64, spread: usize) -> Self {
        Tank {
            combs: COMB_TUNING.map(|t| CombFilter::new((t as f64 * scale) as usize + spread)),
            diffusers: ALLPASS_TUNING.map(|t| Diffuser::new((t as f64 * scale) as usize + spread)),
        }
    }

    fn set(&mut self, feedback: f64, damp: f64) {
        for comb in self.combs.iter_mut() {
            comb.set_feedback(feedback);
            comb.set_damp(damp);
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        // Sum comb filters in parallel
        let mut out = 0.0;
        for comb in self.combs.iter_mut() {
            out += comb.process(input);
        }
        // Allpass diffusion in series
        for diffuser in self.diffusers.iter_mut() {
            out = diffuser.process(out);
        }
        out
    }

    fn clear(&mut self) {
        for comb in self.combs.iter_mut() {
            comb.clear();
        }
        for diffuser in self.diffusers.iter_mut() {
            diffuser.clear();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reverb {
    sample_rate: f64,
    predelay: DelayLine,
    left: Tank,
    right: Tank,
    mix: DryWet,
}

impl Reverb {
    pub fn new(sample_rate: f64) -> Self {
        let scale = sample_rate / 44100.0;
        Reverb {
            sample_rate,
            predelay: DelayLine::with_max_seconds(MAX_PREDELAY_MS * 0.001, sample_rate),
            left: Tank::new(scale, 0),
            right: Tank::new(scale, STEREO_SPREAD),
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for Reverb {
    fn name(&self) -> &'static str {
        "reverb"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let feedback = params.float(&ROOM_SIZE) * ROOM_SCALE + ROOM_OFFSET;
        let damp = params.float(&DAMPING);
        self.left.set(feedback, damp);
        self.right.set(feedback, damp);
        let predelay = ms_to_samples(params.float(&PREDELAY), sr).round() as usize;
        let width = params.float(&WIDTH);
        let wet1 = width / 2.0 + 0.5;
        let wet2 = (1.0 - width) / 2.0;
        self.mix.set(params.float(&MIX));

        let (line, left, right) = (&mut self.predelay, &mut self.left, &mut self.right);
        run_frames(input, output, &mut self.mix, |l, r| {
            line.write((l + r) * FIXED_GAIN);
            let send = line.read(predelay);
            let out_l = left.process(send);
            let out_r = right.process(send);
            (out_l * wet1 + out_r * wet2, out_r * wet1 + out_l * wet2)
        });
    }

    fn reset(&mut self) {
        self.predelay.clear();
        self.left.clear();
        self.right.clear();
        self.mix.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_util::{SR, impulse};

    fn wet(room: f64) -> ParamSnapshot {
        ParamSnapshot::new().with("roomSize", room).with("mix", 1.0).with("predelay", 0.0)
    }

    #[test]
    fn passthrough_when_dry() {
        let input = AudioBuffer::from_stereo(vec![0.5; 64], vec![-0.5; 64], SR);
        let out = Reverb::new(SR).process(&input, &ParamSnapshot::new().with("mix", 0.0), &DspContext::new(SR));
        assert_eq!(out, input);
    }

    #[test]
    fn produces_a_tail() {
        let out = Reverb::new(SR).process(&impulse(5000), &wet(0.5), &DspContext::new(SR));
        assert!(out.left()[1..].iter().any(|s| s.abs() > 0.001));
    }

    #[test]
    fn tail_decays() {
        let mut reverb = Reverb::new(SR);
        let ctx = DspContext::new(SR);
        let early = reverb.process(&impulse(2000), &wet(0.3), &ctx);
        assert!(early.peak() > 0.0);
        let late = reverb.process(&AudioBuffer::silence(44100, SR), &wet(0.3), &ctx);
        assert!(late.peak() < 0.1);
        let later = reverb.process(&AudioBuffer::silence(44100, SR), &wet(0.3), &ctx);
        assert!(later.peak() < late.peak());
    }

    #[test]
    fn predelay_holds_back_the_tail() {
        let params = wet(0.5).with("predelay", 50.0);
        let out = Reverb::new(SR).process(&impulse(4000), &params, &DspContext::new(SR));
        // Shortest path is predelay plus the shortest comb
        let onset = out.left().iter().position(|s| s.abs() > 1e-9).unwrap_or(usize::MAX);
        assert!(onset >= 2205 + 225, "onset {onset}");
    }
}
