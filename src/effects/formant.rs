//! Formant shifter.
//!
//! Five band-passes track the energy around typical vocal formants. The
//! re-synthesis chain cuts each formant at its original centre and boosts
//! it again at the centre scaled by `2^(shift/12) · 2^(gender/3)`, with a
//! depth proportional to how much energy the band carries.

use crate::dsp::util::semitones_to_ratio;
use crate::dsp::{AudioBuffer, BiquadFilter, DryWet, DspContext, EnvelopeFollower};
use crate::params::{ParamSnapshot, ParamSpec, mix_spec};
use crate::unit::EffectProcessor;

use super::run_frames;

pub const FORMANT_CENTERS: [f64; 5] = [270.0, 730.0, 2000.0, 3000.0, 4500.0];
const BANDS: usize = FORMANT_CENTERS.len();

const SHIFT: ParamSpec = ParamSpec::float("shift", -12.0, 12.0, 0.0);
const GENDER: ParamSpec = ParamSpec::float("gender", -1.0, 1.0, 0.0);
const INTENSITY: ParamSpec = ParamSpec::float("intensity", 0.0, 1.0, 1.0);
const MIX: ParamSpec = mix_spec(1.0);

pub const PARAMS: &[ParamSpec] = &[SHIFT, GENDER, INTENSITY, MIX];

/// Samples between coefficient refreshes.
const UPDATE_INTERVAL: usize = 64;
const MAX_DEPTH_DB: f64 = 12.0;
const ANALYSIS_Q: f64 = 4.0;
const SYNTH_Q: f64 = 3.0;

#[derive(Debug, Clone)]
struct FormantBank {
    analysis: [BiquadFilter; BANDS],
    followers: [EnvelopeFollower; BANDS],
    cut: [[BiquadFilter; BANDS]; 2],
    boost: [[BiquadFilter; BANDS]; 2],
    counter: usize,
}

impl FormantBank {
    fn new(sample_rate: f64) -> Self {
        FormantBank {
            analysis: FORMANT_CENTERS.map(|f| BiquadFilter::bandpass(f, ANALYSIS_Q, sample_rate)),
            followers: std::array::from_fn(|_| EnvelopeFollower::new(0.005, 0.08, sample_rate)),
            cut: std::array::from_fn(|_| std::array::from_fn(|_| BiquadFilter::new())),
            boost: std::array::from_fn(|_| std::array::from_fn(|_| BiquadFilter::new())),
            counter: 0,
        }
    }

    fn retune(&mut self, ratio: f64, intensity: f64, sample_rate: f64) {
        let peak = self.followers.iter().map(|f| f.value()).fold(1e-9, f64::max);
        for k in 0..BANDS {
            let depth = MAX_DEPTH_DB * intensity * (self.followers[k].value() / peak);
            for ch in 0..2 {
                self.cut[ch][k].set_peaking(FORMANT_CENTERS[k], SYNTH_Q, -depth, sample_rate);
                self.boost[ch][k].set_peaking(FORMANT_CENTERS[k] * ratio, SYNTH_Q, depth, sample_rate);
            }
        }
    }

    #[inline]
    fn tick(&mut self, l: f64, r: f64, ratio: f64, intensity: f64, sample_rate: f64) -> (f64, f64) {
        let mono = 0.5 * (l + r);
        for k in 0..BANDS {
            let band = self.analysis[k].process(mono);
            self.followers[k].process(band);
        }
        if self.counter == 0 {
            self.retune(ratio, intensity, sample_rate);
        }
        self.counter = (self.counter + 1) % UPDATE_INTERVAL;

        let mut out = [l, r];
        for (ch, x) in out.iter_mut().enumerate() {
            for k in 0..BANDS {
                *x = self.boost[ch][k].process(self.cut[ch][k].process(*x));
            }
        }
        (out[0], out[1])
    }

    fn clear(&mut self) {
        for f in self.analysis.iter_mut().chain(self.cut.iter_mut().flatten()).chain(self.boost.iter_mut().flatten()) {
            f.clear();
        }
        for f in self.followers.iter_mut() {
            f.reset();
        }
        self.counter = 0;
    }
}

#[derive(Debug, Clone)]
pub struct FormantShifter {
    sample_rate: f64,
    bank: FormantBank,
    mix: DryWet,
}

impl FormantShifter {
    pub fn new(sample_rate: f64) -> Self {
        FormantShifter {
            sample_rate,
            bank: FormantBank::new(sample_rate),
            mix: DryWet::new(),
        }
    }
}

/// Combined formant scaling for a shift in semitones and a gender amount.
pub fn formant_ratio(shift: f64, gender: f64) -> f64 {
    semitones_to_ratio(shift) * 2.0_f64.powf(gender / 3.0)
}

impl EffectProcessor for FormantShifter {
    fn name(&self) -> &'static str {
        "formant-shifter"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let ratio = formant_ratio(params.float(&SHIFT), params.float(&GENDER));
        let intensity = params.float(&INTENSITY);
        self.mix.set(params.float(&MIX));

        if (ratio - 1.0).abs() < 1e-9 || intensity == 0.0 {
            // Nothing to move; keep the analysis warm for the next block
            let bank = &mut self.bank;
            run_frames(input, output, &mut self.mix, |l, r| {
                let mono = 0.5 * (l + r);
                for (filter, follower) in bank.analysis.iter_mut().zip(bank.followers.iter_mut()) {
                    follower.process(filter.process(mono));
                }
                (l, r)
            });
            return;
        }

        let bank = &mut self.bank;
        run_frames(input, output, &mut self.mix, |l, r| bank.tick(l, r, ratio, intensity, sr));
    }

    fn reset(&mut self) {
        self.bank.clear();
        self.mix.reset();
    }
}
