//! Delay family: digital, tape, ping-pong, multi-tap, filter and reverse.
//!
//! All of them write the input into a [`DelayLine`] first, read the tap(s),
//! then inject feedback into the newest sample. With that order a zero
//! delay time passes the input straight through.

use std::f64::consts::PI;

use crate::dsp::util::{balance_pan, ms_to_samples, soft_clip, tempo_division_ms};
use crate::dsp::{AudioBuffer, BiquadFilter, DelayLine, DryWet, DspContext, FilterType, Lfo, Smoother};
use crate::params::{ParamChoice, ParamSnapshot, ParamSpec, mix_spec};
use crate::unit::EffectProcessor;

use super::run_frames;

pub const TIME: ParamSpec = ParamSpec::float("time", 0.0, 2000.0, 250.0);
pub const FEEDBACK: ParamSpec = ParamSpec::float("feedback", 0.0, 0.95, 0.35);
pub const SYNC: ParamSpec = ParamSpec::toggle("sync", false);
pub const DIVISION: ParamSpec = ParamSpec::choice(
    "division",
    &["1/4", "1/8", "1/8d", "1/16", "1/4t", "1/2", "1/1", "1/4d", "1/8t"],
    0,
);
const DIVISION_BEATS: [f64; 9] = [1.0, 0.5, 0.75, 0.25, 2.0 / 3.0, 2.0, 4.0, 1.5, 1.0 / 3.0];

const MAX_SECONDS: f64 = 2.5;
const TIME_GLIDE: f64 = 0.05;

/// Delay time in milliseconds, from `time` or from the tempo when `sync`
/// is on.
pub(crate) fn delay_time_ms(params: &ParamSnapshot, time: &ParamSpec, ctx: &DspContext) -> f64 {
    if params.bool(&SYNC) {
        let beats = DIVISION_BEATS[params.choice_index(&DIVISION).min(DIVISION_BEATS.len() - 1)];
        tempo_division_ms(ctx.tempo, beats).min(2000.0)
    } else {
        params.float(time)
    }
}

const DIGITAL_MIX: ParamSpec = mix_spec(0.5);

pub const DIGITAL_PARAMS: &[ParamSpec] = &[TIME, FEEDBACK, SYNC, DIVISION, DIGITAL_MIX];

/// Clean stereo delay with feedback.
#[derive(Debug, Clone)]
pub struct DigitalDelay {
    sample_rate: f64,
    left: DelayLine,
    right: DelayLine,
    time: Smoother,
    mix: DryWet,
}

impl DigitalDelay {
    pub fn new(sample_rate: f64) -> Self {
        DigitalDelay {
            sample_rate,
            left: DelayLine::with_max_seconds(MAX_SECONDS, sample_rate),
            right: DelayLine::with_max_seconds(MAX_SECONDS, sample_rate),
            time: Smoother::new(TIME_GLIDE, sample_rate),
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for DigitalDelay {
    fn name(&self) -> &'static str {
        "digital-delay"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        self.time.set_target(ms_to_samples(delay_time_ms(params, &TIME, ctx), sr));
        self.mix.set(params.float(&DIGITAL_MIX));
        let feedback = params.float(&FEEDBACK);

        let (left, right, time) = (&mut self.left, &mut self.right, &mut self.time);
        run_frames(input, output, &mut self.mix, |l, r| {
            let d = time.next();
            left.write(l);
            right.write(r);
            let wet_l = left.read_interpolated(d);
            let wet_r = right.read_interpolated(d);
            left.add_to_newest(feedback * wet_l);
            right.add_to_newest(feedback * wet_r);
            (wet_l, wet_r)
        });
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.time.reset();
        self.mix.reset();
    }
}

const WOW: ParamSpec = ParamSpec::float("wow", 0.0, 1.0, 0.3);
const FLUTTER: ParamSpec = ParamSpec::float("flutter", 0.0, 1.0, 0.2);
const SATURATION: ParamSpec = ParamSpec::float("saturation", 0.0, 1.0, 0.3);
const TONE: ParamSpec = ParamSpec::float("tone", 500.0, 12000.0, 4000.0);
const TAPE_MIX: ParamSpec = mix_spec(0.4);

pub const TAPE_PARAMS: &[ParamSpec] = &[TIME, FEEDBACK, SYNC, DIVISION, WOW, FLUTTER, SATURATION, TONE, TAPE_MIX];

/// Tape echo: wow and flutter modulate the read head, the repeats darken
/// through a low-pass and saturate on every pass.
#[derive(Debug, Clone)]
pub struct TapeDelay {
    sample_rate: f64,
    left: DelayLine,
    right: DelayLine,
    tone_l: BiquadFilter,
    tone_r: BiquadFilter,
    wow: Lfo,
    flutter: Lfo,
    time: Smoother,
    mix: DryWet,
}

impl TapeDelay {
    pub fn new(sample_rate: f64) -> Self {
        let mut wow = Lfo::new();
        wow.set_rate(0.6, sample_rate);
        let mut flutter = Lfo::with_seed(7);
        flutter.set_rate(6.5, sample_rate);
        TapeDelay {
            sample_rate,
            left: DelayLine::with_max_seconds(MAX_SECONDS + 0.01, sample_rate),
            right: DelayLine::with_max_seconds(MAX_SECONDS + 0.01, sample_rate),
            tone_l: BiquadFilter::new(),
            tone_r: BiquadFilter::new(),
            wow,
            flutter,
            time: Smoother::new(0.2, sample_rate),
            mix: DryWet::new(),
        }
    }
}

#[inline]
fn tape_saturate(x: f64, drive: f64) -> f64 {
    (x * drive).tanh() / drive
}

impl EffectProcessor for TapeDelay {
    fn name(&self) -> &'static str {
        "tape-delay"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        self.time.set_target(ms_to_samples(delay_time_ms(params, &TIME, ctx), sr));
        self.mix.set(params.float(&TAPE_MIX));
        let feedback = params.float(&FEEDBACK);
        let wow_depth = params.float(&WOW) * 0.004 * sr;
        let flutter_depth = params.float(&FLUTTER) * 0.0005 * sr;
        let drive = 1.0 + 4.0 * params.float(&SATURATION);
        let tone = params.float(&TONE);
        self.tone_l.set_lowpass(tone, 0.707, sr);
        self.tone_r.set_lowpass(tone, 0.707, sr);

        let Self {
            left,
            right,
            tone_l,
            tone_r,
            wow,
            flutter,
            time,
            mix,
            ..
        } = self;
        run_frames(input, output, mix, |l, r| {
            let d = time.next() + wow_depth * wow.unipolar() + flutter_depth * flutter.unipolar();
            left.write(l);
            right.write(r);
            let wet_l = tape_saturate(left.read_interpolated(d), drive);
            let wet_r = tape_saturate(right.read_interpolated(d), drive);
            left.add_to_newest(feedback * tone_l.process(wet_l));
            right.add_to_newest(feedback * tone_r.process(wet_r));
            (wet_l, wet_r)
        });
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.tone_l.clear();
        self.tone_r.clear();
        self.wow.reset();
        self.flutter.reset();
        self.time.reset();
        self.mix.reset();
    }

    fn reseed(&mut self, seed: u64) {
        self.wow.reseed(seed);
        self.flutter.reseed(seed.wrapping_add(1));
    }
}

const WIDTH: ParamSpec = ParamSpec::float("width", 0.0, 1.0, 1.0);
const PING_PONG_MIX: ParamSpec = mix_spec(0.5);

pub const PING_PONG_PARAMS: &[ParamSpec] = &[TIME, FEEDBACK, SYNC, DIVISION, WIDTH, PING_PONG_MIX];

/// Repeats alternate between the left and right channel.
#[derive(Debug, Clone)]
pub struct PingPongDelay {
    sample_rate: f64,
    left: DelayLine,
    right: DelayLine,
    time: Smoother,
    mix: DryWet,
}

impl PingPongDelay {
    pub fn new(sample_rate: f64) -> Self {
        PingPongDelay {
            sample_rate,
            left: DelayLine::with_max_seconds(MAX_SECONDS, sample_rate),
            right: DelayLine::with_max_seconds(MAX_SECONDS, sample_rate),
            time: Smoother::new(TIME_GLIDE, sample_rate),
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for PingPongDelay {
    fn name(&self) -> &'static str {
        "ping-pong-delay"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        self.time.set_target(ms_to_samples(delay_time_ms(params, &TIME, ctx), sr));
        self.mix.set(params.float(&PING_PONG_MIX));
        let feedback = params.float(&FEEDBACK);
        let width = params.float(&WIDTH);
        let (near, far) = (0.5 + 0.5 * width, 0.5 - 0.5 * width);

        let (left, right, time) = (&mut self.left, &mut self.right, &mut self.time);
        run_frames(input, output, &mut self.mix, |l, r| {
            let d = time.next();
            left.write(0.5 * (l + r));
            right.write(0.0);
            let wet_l = left.read_interpolated(d);
            let wet_r = right.read_interpolated(d);
            // Each bounce crosses to the other side
            left.add_to_newest(feedback * wet_r);
            right.add_to_newest(feedback * wet_l);
            (wet_l * near + wet_r * far, wet_r * near + wet_l * far)
        });
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.time.reset();
        self.mix.reset();
    }
}

/// How multi-tap spacing grows with the tap index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapPattern {
    Linear,
    Golden,
    Fibonacci,
    Random,
}

impl ParamChoice for TapPattern {
    const OPTIONS: &'static [&'static str] = &["linear", "golden", "fibonacci", "random"];

    fn from_index(index: usize) -> Self {
        match index {
            1 => TapPattern::Golden,
            2 => TapPattern::Fibonacci,
            3 => TapPattern::Random,
            _ => TapPattern::Linear,
        }
    }
}

pub const MAX_TAPS: usize = 8;
const MULTI_TAP_SECONDS: f64 = 8.0;
const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;
const FIBONACCI: [f64; MAX_TAPS] = [1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0];

const TAPS: ParamSpec = ParamSpec::float("taps", 1.0, MAX_TAPS as f64, 4.0).fixed();
const PATTERN: ParamSpec = ParamSpec::choice("pattern", TapPattern::OPTIONS, 0);
const DECAY: ParamSpec = ParamSpec::float("decay", 0.0, 1.0, 0.7);
const SPREAD: ParamSpec = ParamSpec::float("spread", 0.0, 1.0, 0.5);
const MULTI_TAP_MIX: ParamSpec = mix_spec(0.5);

pub const MULTI_TAP_PARAMS: &[ParamSpec] =
    &[TIME, FEEDBACK, SYNC, DIVISION, TAPS, PATTERN, DECAY, SPREAD, MULTI_TAP_MIX];

#[derive(Debug, Clone, Copy, Default)]
struct Tap {
    factor: f64,
    gain_l: f64,
    gain_r: f64,
}

/// Up to eight taps off one line. Tap `i` sits at `time * factor(i)` with
/// gain `decay^i`; feedback is taken from the last tap.
#[derive(Debug, Clone)]
pub struct MultiTapDelay {
    sample_rate: f64,
    left: DelayLine,
    right: DelayLine,
    time: Smoother,
    jitter: [f64; MAX_TAPS],
    rng: fastrand::Rng,
    taps: [Tap; MAX_TAPS],
    mix: DryWet,
}

impl MultiTapDelay {
    pub fn new(sample_rate: f64) -> Self {
        let mut delay = MultiTapDelay {
            sample_rate,
            left: DelayLine::with_max_seconds(MULTI_TAP_SECONDS, sample_rate),
            right: DelayLine::with_max_seconds(MULTI_TAP_SECONDS, sample_rate),
            time: Smoother::new(TIME_GLIDE, sample_rate),
            jitter: [0.0; MAX_TAPS],
            rng: fastrand::Rng::with_seed(0x7A95),
            taps: [Tap::default(); MAX_TAPS],
            mix: DryWet::new(),
        };
        delay.roll_jitter();
        delay
    }

    fn roll_jitter(&mut self) {
        for j in self.jitter.iter_mut() {
            *j = self.rng.f64() * 0.8 - 0.4;
        }
    }

    fn tap_factor(&self, pattern: TapPattern, i: usize) -> f64 {
        match pattern {
            TapPattern::Linear => (i + 1) as f64,
            TapPattern::Golden => GOLDEN_RATIO.powi(i as i32),
            TapPattern::Fibonacci => FIBONACCI[i],
            TapPattern::Random => {
                if i == 0 {
                    1.0
                } else {
                    1.0 + i as f64 * (1.0 + self.jitter[i])
                }
            }
        }
    }
}

impl EffectProcessor for MultiTapDelay {
    fn name(&self) -> &'static str {
        "multi-tap-delay"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        self.time.set_target(ms_to_samples(delay_time_ms(params, &TIME, ctx), sr));
        self.mix.set(params.float(&MULTI_TAP_MIX));
        let feedback = params.float(&FEEDBACK);
        let count = params.count(&TAPS).clamp(1, MAX_TAPS);
        let pattern: TapPattern = params.choice(&PATTERN);
        let decay = params.float(&DECAY);
        let spread = params.float(&SPREAD);

        for i in 0..count {
            let pan = if i == 0 || count == 1 {
                0.0
            } else {
                let side = if i % 2 == 1 { -1.0 } else { 1.0 };
                side * spread * i as f64 / (count - 1) as f64
            };
            let (gain_l, gain_r) = balance_pan(pan);
            let level = decay.powi(i as i32);
            self.taps[i] = Tap {
                factor: self.tap_factor(pattern, i),
                gain_l: gain_l * level,
                gain_r: gain_r * level,
            };
        }

        let max_delay = self.left.max_delay() as f64;
        let (left, right, time, taps) = (&mut self.left, &mut self.right, &mut self.time, &self.taps[..count]);
        run_frames(input, output, &mut self.mix, |l, r| {
            let base = time.next();
            left.write(l);
            right.write(r);
            let mut wet_l = 0.0;
            let mut wet_r = 0.0;
            let mut last_l = 0.0;
            let mut last_r = 0.0;
            for tap in taps {
                let d = (base * tap.factor).min(max_delay);
                last_l = left.read_interpolated(d);
                last_r = right.read_interpolated(d);
                wet_l += tap.gain_l * last_l;
                wet_r += tap.gain_r * last_r;
            }
            left.add_to_newest(feedback * last_l);
            right.add_to_newest(feedback * last_r);
            (wet_l, wet_r)
        });
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.time.reset();
        self.mix.reset();
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = fastrand::Rng::with_seed(seed);
        self.roll_jitter();
    }
}

const FILTER_TYPE: ParamSpec = ParamSpec::choice("filterType", &["lowpass", "highpass", "bandpass"], 0);
const CUTOFF: ParamSpec = ParamSpec::float("cutoff", 20.0, 20000.0, 1200.0);
const RESONANCE: ParamSpec = ParamSpec::float("resonance", 0.1, 20.0, 2.0);
const LFO_RATE: ParamSpec = ParamSpec::float("lfoRate", 0.0, 10.0, 0.3);
const LFO_DEPTH: ParamSpec = ParamSpec::float("lfoDepth", 0.0, 1.0, 0.5);
const FILTER_MIX: ParamSpec = mix_spec(0.5);

pub const FILTER_PARAMS: &[ParamSpec] = &[
    TIME, FEEDBACK, SYNC, DIVISION, FILTER_TYPE, CUTOFF, RESONANCE, LFO_RATE, LFO_DEPTH, FILTER_MIX,
];

/// Coefficient refresh interval for the swept filter.
const FILTER_UPDATE: usize = 16;

/// Delay whose repeats pass through an LFO-swept filter.
#[derive(Debug, Clone)]
pub struct FilterDelay {
    sample_rate: f64,
    left: DelayLine,
    right: DelayLine,
    filter_l: BiquadFilter,
    filter_r: BiquadFilter,
    lfo: Lfo,
    counter: usize,
    time: Smoother,
    mix: DryWet,
}

impl FilterDelay {
    pub fn new(sample_rate: f64) -> Self {
        FilterDelay {
            sample_rate,
            left: DelayLine::with_max_seconds(MAX_SECONDS, sample_rate),
            right: DelayLine::with_max_seconds(MAX_SECONDS, sample_rate),
            filter_l: BiquadFilter::new(),
            filter_r: BiquadFilter::new(),
            lfo: Lfo::new(),
            counter: 0,
            time: Smoother::new(TIME_GLIDE, sample_rate),
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for FilterDelay {
    fn name(&self) -> &'static str {
        "filter-delay"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        self.time.set_target(ms_to_samples(delay_time_ms(params, &TIME, ctx), sr));
        self.mix.set(params.float(&FILTER_MIX));
        let feedback = params.float(&FEEDBACK);
        let filter_type = match params.choice_index(&FILTER_TYPE) {
            1 => FilterType::Highpass,
            2 => FilterType::Bandpass,
            _ => FilterType::Lowpass,
        };
        let cutoff = params.float(&CUTOFF);
        let q = params.float(&RESONANCE);
        let depth_octaves = 2.0 * params.float(&LFO_DEPTH);
        self.lfo.set_rate(params.float(&LFO_RATE), sr);

        let Self {
            left,
            right,
            filter_l,
            filter_r,
            lfo,
            counter,
            time,
            mix,
            ..
        } = self;
        run_frames(input, output, mix, |l, r| {
            let sweep = lfo.sine();
            if *counter == 0 {
                let fc = cutoff * 2.0_f64.powf(depth_octaves * sweep);
                filter_l.configure(filter_type, fc, q, 0.0, sr);
                filter_r.configure(filter_type, fc, q, 0.0, sr);
            }
            *counter = (*counter + 1) % FILTER_UPDATE;

            let d = time.next();
            left.write(l);
            right.write(r);
            let wet_l = filter_l.process(left.read_interpolated(d));
            let wet_r = filter_r.process(right.read_interpolated(d));
            // Resonance can push the loop above unity; saturate the return
            left.add_to_newest(feedback * soft_clip(wet_l));
            right.add_to_newest(feedback * soft_clip(wet_r));
            (wet_l, wet_r)
        });
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.filter_l.clear();
        self.filter_r.clear();
        self.lfo.reset();
        self.counter = 0;
        self.time.reset();
        self.mix.reset();
    }
}

const CHUNK: ParamSpec = ParamSpec::float("time", 50.0, 2000.0, 500.0);
const REVERSE_MIX: ParamSpec = mix_spec(0.5);

pub const REVERSE_PARAMS: &[ParamSpec] = &[CHUNK, FEEDBACK, SYNC, DIVISION, REVERSE_MIX];

/// Plays each chunk of `time` ms backwards during the following chunk,
/// under a half-sine window.
#[derive(Debug, Clone)]
pub struct ReverseDelay {
    sample_rate: f64,
    left: DelayLine,
    right: DelayLine,
    chunk: usize,
    pending_chunk: usize,
    position: usize,
    primed: bool,
    mix: DryWet,
}

impl ReverseDelay {
    pub fn new(sample_rate: f64) -> Self {
        let max_chunk = (2.0 * sample_rate).ceil() as usize;
        let initial = (0.5 * sample_rate) as usize;
        ReverseDelay {
            sample_rate,
            left: DelayLine::new(2 * max_chunk + 2),
            right: DelayLine::new(2 * max_chunk + 2),
            chunk: initial,
            pending_chunk: initial,
            position: 0,
            primed: false,
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for ReverseDelay {
    fn name(&self) -> &'static str {
        "reverse-delay"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let ms = delay_time_ms(params, &CHUNK, ctx).clamp(50.0, 2000.0);
        self.pending_chunk = ms_to_samples(ms, sr).round().max(1.0) as usize;
        // The first block after construction or reset starts at its own length
        if !self.primed {
            self.chunk = self.pending_chunk;
            self.primed = true;
        }
        self.mix.set(params.float(&REVERSE_MIX));
        let feedback = params.float(&FEEDBACK);

        let Self {
            left,
            right,
            chunk,
            pending_chunk,
            position,
            mix,
            ..
        } = self;
        run_frames(input, output, mix, |l, r| {
            let c = *position;
            let window = (PI * (c as f64 + 0.5) / *chunk as f64).sin();
            left.write(l);
            right.write(r);
            let wet_l = left.read(2 * c + 1) * window;
            let wet_r = right.read(2 * c + 1) * window;
            left.add_to_newest(feedback * wet_l);
            right.add_to_newest(feedback * wet_r);

            *position += 1;
            if *position >= *chunk {
                *position = 0;
                *chunk = *pending_chunk;
            }
            (wet_l, wet_r)
        });
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.position = 0;
        self.primed = false;
        self.mix.reset();
    }
}
