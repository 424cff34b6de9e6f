//! Five-band parametric equalizer with a low-cut.

use crate::dsp::util::db_to_linear;
use crate::dsp::{AudioBuffer, BiquadFilter, DryWet, DspContext};
use crate::params::{ParamSnapshot, ParamSpec, mix_spec};
use crate::unit::EffectProcessor;

use super::run_frames;

const LOW_CUT: ParamSpec = ParamSpec::float("lowCut", 20.0, 1000.0, 20.0);
const LOW_FREQ: ParamSpec = ParamSpec::float("lowFreq", 20.0, 1000.0, 120.0);
const LOW_GAIN: ParamSpec = ParamSpec::float("lowGain", -24.0, 24.0, 0.0);
const MID1_FREQ: ParamSpec = ParamSpec::float("mid1Freq", 100.0, 8000.0, 500.0);
const MID1_GAIN: ParamSpec = ParamSpec::float("mid1Gain", -24.0, 24.0, 0.0);
const MID1_Q: ParamSpec = ParamSpec::float("mid1Q", 0.1, 10.0, 1.0);
const MID2_FREQ: ParamSpec = ParamSpec::float("mid2Freq", 500.0, 16000.0, 3000.0);
const MID2_GAIN: ParamSpec = ParamSpec::float("mid2Gain", -24.0, 24.0, 0.0);
const MID2_Q: ParamSpec = ParamSpec::float("mid2Q", 0.1, 10.0, 1.0);
const HIGH_FREQ: ParamSpec = ParamSpec::float("highFreq", 1000.0, 20000.0, 8000.0);
const HIGH_GAIN: ParamSpec = ParamSpec::float("highGain", -24.0, 24.0, 0.0);
const OUTPUT: ParamSpec = ParamSpec::float("output", -24.0, 24.0, 0.0);
const MIX: ParamSpec = mix_spec(1.0);

pub const PARAMS: &[ParamSpec] = &[
    LOW_CUT, LOW_FREQ, LOW_GAIN, MID1_FREQ, MID1_GAIN, MID1_Q, MID2_FREQ, MID2_GAIN, MID2_Q, HIGH_FREQ,
    HIGH_GAIN, OUTPUT, MIX,
];

const STAGES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    LowCut(f64),
    LowShelf(f64, f64),
    Peak(f64, f64, f64),
    HighShelf(f64, f64),
}

impl Stage {
    /// Stages at their neutral setting are skipped entirely.
    fn is_neutral(self) -> bool {
        match self {
            Stage::LowCut(freq) => freq <= LOW_CUT_OFF,
            Stage::LowShelf(_, gain) | Stage::HighShelf(_, gain) | Stage::Peak(_, gain, _) => gain == 0.0,
        }
    }

    fn apply(self, filter: &mut BiquadFilter, sample_rate: f64) {
        match self {
            Stage::LowCut(freq) => filter.set_highpass(freq, 0.707, sample_rate),
            Stage::LowShelf(freq, gain) => filter.set_low_shelf(freq, gain, sample_rate),
            Stage::Peak(freq, gain, q) => filter.set_peaking(freq, q, gain, sample_rate),
            Stage::HighShelf(freq, gain) => filter.set_high_shelf(freq, gain, sample_rate),
        }
    }
}

/// Low-cut at or below this frequency is off.
const LOW_CUT_OFF: f64 = 20.0;

#[derive(Debug, Clone)]
pub struct Equalizer {
    sample_rate: f64,
    filters: [[BiquadFilter; STAGES]; 2],
    enabled: [bool; STAGES],
    mix: DryWet,
}

impl Equalizer {
    pub fn new(sample_rate: f64) -> Self {
        Equalizer {
            sample_rate,
            filters: std::array::from_fn(|_| std::array::from_fn(|_| BiquadFilter::new())),
            enabled: [false; STAGES],
            mix: DryWet::new(),
        }
    }

    fn configure(&mut self, params: &ParamSnapshot) {
        let stages = [
            Stage::LowCut(params.float(&LOW_CUT)),
            Stage::LowShelf(params.float(&LOW_FREQ), params.float(&LOW_GAIN)),
            Stage::Peak(params.float(&MID1_FREQ), params.float(&MID1_GAIN), params.float(&MID1_Q)),
            Stage::Peak(params.float(&MID2_FREQ), params.float(&MID2_GAIN), params.float(&MID2_Q)),
            Stage::HighShelf(params.float(&HIGH_FREQ), params.float(&HIGH_GAIN)),
        ];
        for (i, stage) in stages.into_iter().enumerate() {
            let on = !stage.is_neutral();
            if on {
                for channel in self.filters.iter_mut() {
                    stage.apply(&mut channel[i], self.sample_rate);
                }
            } else if self.enabled[i] {
                for channel in self.filters.iter_mut() {
                    channel[i].clear();
                }
            }
            self.enabled[i] = on;
        }
    }
}

impl EffectProcessor for Equalizer {
    fn name(&self) -> &'static str {
        "eq"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        self.configure(params);
        let gain = db_to_linear(params.float(&OUTPUT));
        self.mix.set(params.float(&MIX));

        let (filters, enabled) = (&mut self.filters, self.enabled);
        run_frames(input, output, &mut self.mix, |l, r| {
            let mut out = [l, r];
            for (x, chain) in out.iter_mut().zip(filters.iter_mut()) {
                for (filter, on) in chain.iter_mut().zip(enabled) {
                    if on {
                        *x = filter.process(*x);
                    }
                }
                *x *= gain;
            }
            (out[0], out[1])
        });
    }

    fn reset(&mut self) {
        for filter in self.filters.iter_mut().flatten() {
            filter.clear();
        }
        self.mix.reset();
    }
}
