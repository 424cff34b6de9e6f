//! Dynamics: compressor, limiter, noise gate and de-esser.
//!
//! All four share the same shape: a level detector on the stereo peak, a
//! static gain curve in dB, and a smoothed gain applied to both channels.

use crate::dsp::util::{db_to_linear, linear_to_db, ms_to_samples, time_to_coeff};
use crate::dsp::{AudioBuffer, BiquadFilter, DelayLine, DryWet, DspContext, EnvelopeFollower};
use crate::params::{ParamSnapshot, ParamSpec, mix_spec};
use crate::unit::EffectProcessor;

use super::run_frames;

const THRESHOLD: ParamSpec = ParamSpec::float("threshold", -60.0, 0.0, -24.0);
const RATIO: ParamSpec = ParamSpec::float("ratio", 1.0, 20.0, 4.0);
const KNEE: ParamSpec = ParamSpec::float("knee", 0.0, 24.0, 6.0);
const ATTACK: ParamSpec = ParamSpec::float("attack", 0.1, 200.0, 3.0);
const RELEASE: ParamSpec = ParamSpec::float("release", 10.0, 2000.0, 250.0);
const MAKEUP: ParamSpec = ParamSpec::float("makeup", 0.0, 24.0, 0.0);
const FULL_MIX: ParamSpec = mix_spec(1.0);

pub const COMPRESSOR_PARAMS: &[ParamSpec] = &[THRESHOLD, RATIO, KNEE, ATTACK, RELEASE, MAKEUP, FULL_MIX];

/// Static compressor curve.
#[derive(Debug, Clone, Copy)]
pub struct GainCurve {
    /// Threshold in dB.
    pub threshold: f64,
    /// Compression ratio (e.g., 4.0 = 4:1 compression).
    pub ratio: f64,
    /// Knee width in dB (0 = hard knee).
    pub knee: f64,
}

impl GainCurve {
    /// Gain change in dB (zero or negative) for an input level in dB.
    #[inline]
    pub fn gain_db(&self, input_db: f64) -> f64 {
        let slope = 1.0 - 1.0 / self.ratio;
        if self.knee <= 0.0 {
            if input_db <= self.threshold {
                0.0
            } else {
                (self.threshold - input_db) * slope
            }
        } else {
            let half_knee = self.knee / 2.0;
            let knee_start = self.threshold - half_knee;
            let knee_end = self.threshold + half_knee;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (self.threshold - input_db) * slope
            } else {
                // Quadratic blend through the knee
                let knee_factor = (input_db - knee_start) / self.knee;
                -knee_factor * knee_factor * slope * half_knee
            }
        }
    }
}

/// Feed-forward peak compressor with soft knee and makeup gain.
#[derive(Debug, Clone)]
pub struct Compressor {
    sample_rate: f64,
    detector: EnvelopeFollower,
    curve: GainCurve,
    makeup: f64,
    mix: DryWet,
}

impl Compressor {
    pub fn new(sample_rate: f64) -> Self {
        Compressor {
            sample_rate,
            detector: EnvelopeFollower::new(0.003, 0.25, sample_rate),
            curve: GainCurve {
                threshold: -24.0,
                ratio: 4.0,
                knee: 6.0,
            },
            makeup: 0.0,
            mix: DryWet::new(),
        }
    }

    /// Current gain reduction in dB, positive when compressing.
    pub fn gain_reduction(&self) -> f64 {
        -self.curve.gain_db(linear_to_db(self.detector.value()))
    }
}

impl EffectProcessor for Compressor {
    fn name(&self) -> &'static str {
        "compressor"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        self.curve = GainCurve {
            threshold: params.float(&THRESHOLD),
            ratio: params.float(&RATIO),
            knee: params.float(&KNEE),
        };
        self.makeup = params.float(&MAKEUP);
        self.detector
            .set_times(params.float(&ATTACK) * 0.001, params.float(&RELEASE) * 0.001, sr);
        self.mix.set(params.float(&FULL_MIX));

        let (detector, curve, makeup) = (&mut self.detector, self.curve, self.makeup);
        run_frames(input, output, &mut self.mix, |l, r| {
            let envelope = detector.process(l.abs().max(r.abs()));
            let gain = db_to_linear(curve.gain_db(linear_to_db(envelope)) + makeup);
            (l * gain, r * gain)
        });
    }

    fn reset(&mut self) {
        self.detector.reset();
        self.mix.reset();
    }
}

const CEILING: ParamSpec = ParamSpec::float("ceiling", -24.0, 0.0, -1.0);
const LIMIT_RELEASE: ParamSpec = ParamSpec::float("release", 1.0, 1000.0, 50.0);
const LOOKAHEAD: ParamSpec = ParamSpec::float("lookahead", 0.0, 10.0, 5.0).fixed();

pub const LIMITER_PARAMS: &[ParamSpec] = &[CEILING, LIMIT_RELEASE, LOOKAHEAD, FULL_MIX];

const MAX_LOOKAHEAD_MS: f64 = 10.0;

/// Brick-wall limiter.
///
/// Audio is delayed by the lookahead; the applied gain is the minimum gain
/// required anywhere in the lookahead window, so the wet output never
/// exceeds the ceiling.
#[derive(Debug, Clone)]
pub struct Limiter {
    sample_rate: f64,
    audio_l: DelayLine,
    audio_r: DelayLine,
    required: DelayLine,
    gain: f64,
    mix: DryWet,
}

impl Limiter {
    pub fn new(sample_rate: f64) -> Self {
        let max = ms_to_samples(MAX_LOOKAHEAD_MS, sample_rate).ceil() as usize + 1;
        Limiter {
            sample_rate,
            audio_l: DelayLine::new(max),
            audio_r: DelayLine::new(max),
            required: DelayLine::new(max),
            gain: 1.0,
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for Limiter {
    fn name(&self) -> &'static str {
        "limiter"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let ceiling = db_to_linear(params.float(&CEILING));
        let release = time_to_coeff(params.float(&LIMIT_RELEASE) * 0.001, sr);
        let lookahead = (ms_to_samples(params.float(&LOOKAHEAD), sr).round() as usize).min(self.required.max_delay());
        self.mix.set(params.float(&FULL_MIX));

        let Self {
            audio_l,
            audio_r,
            required,
            gain,
            mix,
            ..
        } = self;
        run_frames(input, output, mix, |l, r| {
            let peak = l.abs().max(r.abs());
            // Stored as reduction so a cleared line means unity gain
            required.write(if peak > ceiling { 1.0 - ceiling / peak } else { 0.0 });
            audio_l.write(l);
            audio_r.write(r);

            let mut deepest = 0.0_f64;
            for i in 0..=lookahead {
                deepest = deepest.max(required.read(i));
            }
            let target = 1.0 - deepest;
            *gain = if target < *gain {
                target
            } else {
                target + release * (*gain - target)
            };

            let out_l = (audio_l.read(lookahead) * *gain).clamp(-ceiling, ceiling);
            let out_r = (audio_r.read(lookahead) * *gain).clamp(-ceiling, ceiling);
            (out_l, out_r)
        });
    }

    fn reset(&mut self) {
        self.audio_l.clear();
        self.audio_r.clear();
        self.required.clear();
        self.gain = 1.0;
        self.mix.reset();
    }
}

const GATE_THRESHOLD: ParamSpec = ParamSpec::float("threshold", -80.0, 0.0, -40.0);
const GATE_ATTACK: ParamSpec = ParamSpec::float("attack", 0.1, 50.0, 1.0);
const HOLD: ParamSpec = ParamSpec::float("hold", 0.0, 500.0, 50.0);
const GATE_RELEASE: ParamSpec = ParamSpec::float("release", 5.0, 2000.0, 100.0);
const RANGE: ParamSpec = ParamSpec::float("range", -80.0, 0.0, -80.0);

pub const GATE_PARAMS: &[ParamSpec] = &[GATE_THRESHOLD, GATE_ATTACK, HOLD, GATE_RELEASE, RANGE, FULL_MIX];

/// Noise gate with hold. `range` is the attenuation while closed.
#[derive(Debug, Clone)]
pub struct Gate {
    sample_rate: f64,
    detector: EnvelopeFollower,
    gain: f64,
    hold_left: usize,
    mix: DryWet,
}

impl Gate {
    pub fn new(sample_rate: f64) -> Self {
        Gate {
            sample_rate,
            detector: EnvelopeFollower::new(0.0005, 0.02, sample_rate),
            gain: 0.0,
            hold_left: 0,
            mix: DryWet::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.hold_left > 0
    }
}

impl EffectProcessor for Gate {
    fn name(&self) -> &'static str {
        "gate"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let threshold = db_to_linear(params.float(&GATE_THRESHOLD));
        let attack = time_to_coeff(params.float(&GATE_ATTACK) * 0.001, sr);
        let release = time_to_coeff(params.float(&GATE_RELEASE) * 0.001, sr);
        let hold = ms_to_samples(params.float(&HOLD), sr).round() as usize;
        let floor = db_to_linear(params.float(&RANGE));
        self.mix.set(params.float(&FULL_MIX));

        let Self {
            detector,
            gain,
            hold_left,
            mix,
            ..
        } = self;
        run_frames(input, output, mix, |l, r| {
            let level = detector.process(l.abs().max(r.abs()));
            if level > threshold {
                *hold_left = hold.max(1);
            } else if *hold_left > 0 {
                *hold_left -= 1;
            }
            let target = if *hold_left > 0 { 1.0 } else { floor };
            let coeff = if target > *gain { attack } else { release };
            *gain = target + coeff * (*gain - target);
            (l * *gain, r * *gain)
        });
    }

    fn reset(&mut self) {
        self.detector.reset();
        self.gain = 0.0;
        self.hold_left = 0;
        self.mix.reset();
    }
}

const FREQUENCY: ParamSpec = ParamSpec::float("frequency", 2000.0, 12000.0, 6000.0);
const ESS_THRESHOLD: ParamSpec = ParamSpec::float("threshold", -60.0, 0.0, -30.0);
const ESS_RANGE: ParamSpec = ParamSpec::float("range", 0.0, 24.0, 12.0);

pub const DE_ESSER_PARAMS: &[ParamSpec] = &[FREQUENCY, ESS_THRESHOLD, ESS_RANGE, FULL_MIX];

/// Samples between de-esser coefficient updates.
const ESS_UPDATE: usize = 32;

/// Dynamic-EQ de-esser: a peaking cut at `frequency` whose depth follows the
/// level above `frequency`, limited to `range` dB.
#[derive(Debug, Clone)]
pub struct DeEsser {
    sample_rate: f64,
    sidechain: BiquadFilter,
    detector: EnvelopeFollower,
    cut: [BiquadFilter; 2],
    counter: usize,
    mix: DryWet,
}

impl DeEsser {
    pub fn new(sample_rate: f64) -> Self {
        DeEsser {
            sample_rate,
            sidechain: BiquadFilter::new(),
            detector: EnvelopeFollower::new(0.001, 0.05, sample_rate),
            cut: [BiquadFilter::new(), BiquadFilter::new()],
            counter: 0,
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for DeEsser {
    fn name(&self) -> &'static str {
        "de-esser"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let freq = params.float(&FREQUENCY);
        self.sidechain.set_highpass(freq, 0.707, sr);
        let threshold = params.float(&ESS_THRESHOLD);
        let range = params.float(&ESS_RANGE);
        self.mix.set(params.float(&FULL_MIX));

        let Self {
            sidechain,
            detector,
            cut,
            counter,
            mix,
            ..
        } = self;
        run_frames(input, output, mix, |l, r| {
            let level = detector.process(sidechain.process(0.5 * (l + r)));
            if *counter == 0 {
                let reduction = (linear_to_db(level) - threshold).clamp(0.0, range);
                for filter in cut.iter_mut() {
                    filter.set_peaking(freq, 1.4, -reduction, sr);
                }
            }
            *counter = (*counter + 1) % ESS_UPDATE;
            (cut[0].process(l), cut[1].process(r))
        });
    }

    fn reset(&mut self) {
        self.sidechain.clear();
        self.detector.reset();
        for filter in self.cut.iter_mut() {
            filter.clear();
        }
        self.counter = 0;
        self.mix.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_util::{SR, sine};

    fn constant(level: f32, frames: usize) -> AudioBuffer {
        AudioBuffer::from_mono(&vec![level; frames], SR)
    }

    fn compressor_params(threshold: f64, ratio: f64, attack_ms: f64, release_ms: f64) -> ParamSnapshot {
        ParamSnapshot::new()
            .with("threshold", threshold)
            .with("ratio", ratio)
            .with("attack", attack_ms)
            .with("release", release_ms)
    }

    #[test]
    fn compressor_passthrough_below_threshold() {
        let mut comp = Compressor::new(SR);
        let params = compressor_params(-20.0, 4.0, 1.0, 100.0);
        // -26 dB, below the -20 dB threshold and the knee
        let out = comp.process(&constant(0.05, 1001), &params, &DspContext::new(SR));
        assert!((out.left()[1000] - 0.05).abs() < 0.01);
    }

    #[test]
    fn compressor_reduces_loud_signals() {
        let mut comp = Compressor::new(SR);
        let params = compressor_params(-12.0, 4.0, 1.0, 100.0);
        let out = comp.process(&constant(1.0, 5001), &params, &DspContext::new(SR));
        // 12 dB over at 4:1 is 9 dB of reduction
        let last = out.left()[5000];
        assert!(last < 0.5 && last > 0.1, "got {last}");
        assert!((comp.gain_reduction() - 9.0).abs() < 0.5);
    }

    #[test]
    fn compressor_attack_time() {
        let mut comp = Compressor::new(SR);
        let params = compressor_params(-20.0, 10.0, 10.0, 500.0);
        let out = comp.process(&constant(1.0, 502), &params, &DspContext::new(SR));
        assert!(out.left()[0] > out.left()[501]);
    }

    #[test]
    fn compressor_release_time() {
        let mut comp = Compressor::new(SR);
        let params = compressor_params(-20.0, 10.0, 1.0, 50.0);
        let ctx = DspContext::new(SR);
        comp.process(&constant(1.0, 1000), &params, &ctx);
        let quiet = comp.process(&constant(0.1, 5001), &params, &ctx);
        assert!(quiet.left()[5000] > quiet.left()[0]);
    }

    #[test]
    fn soft_knee_is_continuous() {
        let curve = GainCurve {
            threshold: -20.0,
            ratio: 4.0,
            knee: 6.0,
        };
        assert_eq!(curve.gain_db(-23.0), 0.0);
        let inside = curve.gain_db(-17.0 - 1e-9);
        let outside = curve.gain_db(-17.0);
        assert!((inside - outside).abs() < 1e-6);
    }

    #[test]
    fn limiter_never_exceeds_ceiling() {
        let mut lim = Limiter::new(SR);
        let params = ParamSnapshot::new().with("ceiling", -6.0).with("lookahead", 10.0);
        let ceiling = db_to_linear(-6.0) as f32;
        let out = lim.process(&sine(100.0, 8192, 1.0), &params, &DspContext::new(SR));
        assert!(out.peak() <= ceiling + 1e-6);
        // Quiet material is only delayed
        lim.reset();
        let quiet = sine(100.0, 2048, 0.1);
        let out = lim.process(&quiet, &params, &DspContext::new(SR));
        let delay = 441; // 10 ms
        assert!((out.left()[1000 + delay] - quiet.left()[1000]).abs() < 1e-6);
    }

    #[test]
    fn gate_closes_on_silence_and_opens_on_signal() {
        let mut gate = Gate::new(SR);
        let ctx = DspContext::new(SR);
        let params = ParamSnapshot::new().with("threshold", -30.0);
        let hiss = gate.process(&sine(1000.0, 4410, 0.001), &params, &ctx);
        assert!(hiss.peak() < 1e-5);
        let loud = gate.process(&sine(1000.0, 4410, 0.5), &params, &ctx);
        assert!(gate.is_open());
        assert!(loud.peak() > 0.45);
    }

    #[test]
    fn de_esser_targets_high_band() {
        let params = ParamSnapshot::new().with("threshold", -40.0);
        let ctx = DspContext::new(SR);
        let low_in = sine(400.0, 8192, 0.5);
        let high_in = sine(6000.0, 8192, 0.5);
        let low = DeEsser::new(SR).process(&low_in, &params, &ctx);
        let high = DeEsser::new(SR).process(&high_in, &params, &ctx);
        let ratio = |out: &AudioBuffer, input: &AudioBuffer| out.rms() / input.rms();
        assert!(ratio(&low, &low_in) > 0.95);
        assert!(ratio(&high, &high_in) < 0.5);
    }
}
