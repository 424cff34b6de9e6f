//! LFO-driven modulation effects: chorus, flanger, phaser and tremolo.

use crate::dsp::util::ms_to_samples;
use crate::dsp::{AllPassFilter, AudioBuffer, DelayLine, DryWet, DspContext, Lfo, LfoShape};
use crate::params::{ParamChoice, ParamSnapshot, ParamSpec, mix_spec};
use crate::unit::EffectProcessor;

use super::run_frames;

/// Phase offset between the left and right LFO at `stereo = 1`.
const STEREO_OFFSET: f64 = 0.25;

fn stereo_lfos(offset: f64) -> [Lfo; 2] {
    let left = Lfo::new();
    let mut right = Lfo::new();
    right.set_phase(offset);
    [left, right]
}

const CHORUS_RATE: ParamSpec = ParamSpec::float("rate", 0.1, 10.0, 1.5);
const CHORUS_DEPTH: ParamSpec = ParamSpec::float("depth", 0.0, 10.0, 2.0);
const CHORUS_DELAY: ParamSpec = ParamSpec::float("delay", 5.0, 30.0, 15.0);
const STEREO: ParamSpec = ParamSpec::float("stereo", 0.0, 1.0, 1.0);
const HALF_MIX: ParamSpec = mix_spec(0.5);

pub const CHORUS_PARAMS: &[ParamSpec] = &[CHORUS_RATE, CHORUS_DEPTH, CHORUS_DELAY, STEREO, HALF_MIX];

/// Stereo chorus: a short delay swept by a sine LFO, the right channel's
/// LFO running a quarter cycle ahead at full `stereo`.
#[derive(Debug, Clone)]
pub struct Chorus {
    sample_rate: f64,
    lines: [DelayLine; 2],
    lfos: [Lfo; 2],
    stereo: f64,
    mix: DryWet,
}

impl Chorus {
    pub fn new(sample_rate: f64) -> Self {
        // Max delay + max depth + margin
        let line = DelayLine::with_max_seconds(0.045, sample_rate);
        Chorus {
            sample_rate,
            lines: [line.clone(), line],
            lfos: stereo_lfos(STEREO_OFFSET),
            stereo: 1.0,
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for Chorus {
    fn name(&self) -> &'static str {
        "chorus"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let stereo = params.float(&STEREO);
        if stereo != self.stereo {
            let phase = self.lfos[0].phase();
            self.lfos[1].set_phase(phase + STEREO_OFFSET * stereo);
            self.stereo = stereo;
        }
        let rate = params.float(&CHORUS_RATE);
        for lfo in self.lfos.iter_mut() {
            lfo.set_rate(rate, sr);
        }
        let delay = ms_to_samples(params.float(&CHORUS_DELAY), sr);
        let depth = ms_to_samples(params.float(&CHORUS_DEPTH), sr);
        self.mix.set(params.float(&HALF_MIX));

        let (lines, lfos) = (&mut self.lines, &mut self.lfos);
        run_frames(input, output, &mut self.mix, |l, r| {
            let mut out = [l, r];
            for ((x, line), lfo) in out.iter_mut().zip(lines.iter_mut()).zip(lfos.iter_mut()) {
                line.write(*x);
                let d = (delay + depth * lfo.sine()).max(1.0);
                *x = line.read_interpolated(d);
            }
            (out[0], out[1])
        });
    }

    fn reset(&mut self) {
        for line in self.lines.iter_mut() {
            line.clear();
        }
        self.lfos = stereo_lfos(STEREO_OFFSET * self.stereo);
        self.mix.reset();
    }
}

const FLANGER_RATE: ParamSpec = ParamSpec::float("rate", 0.05, 5.0, 0.25);
const FLANGER_DEPTH: ParamSpec = ParamSpec::float("depth", 0.0, 1.0, 0.7);
const FLANGER_DELAY: ParamSpec = ParamSpec::float("delay", 0.1, 10.0, 1.0);
const FLANGER_FEEDBACK: ParamSpec = ParamSpec::float("feedback", -0.95, 0.95, 0.5);

pub const FLANGER_PARAMS: &[ParamSpec] =
    &[FLANGER_RATE, FLANGER_DEPTH, FLANGER_DELAY, FLANGER_FEEDBACK, STEREO, HALF_MIX];

/// Sweep range of the flanger at full depth.
const FLANGER_SWEEP_MS: f64 = 5.0;

/// Very short swept delay with signed feedback.
#[derive(Debug, Clone)]
pub struct Flanger {
    sample_rate: f64,
    lines: [DelayLine; 2],
    lfos: [Lfo; 2],
    stereo: f64,
    mix: DryWet,
}

impl Flanger {
    pub fn new(sample_rate: f64) -> Self {
        let line = DelayLine::with_max_seconds(0.016, sample_rate);
        Flanger {
            sample_rate,
            lines: [line.clone(), line],
            lfos: stereo_lfos(STEREO_OFFSET),
            stereo: 1.0,
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for Flanger {
    fn name(&self) -> &'static str {
        "flanger"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let stereo = params.float(&STEREO);
        if stereo != self.stereo {
            let phase = self.lfos[0].phase();
            self.lfos[1].set_phase(phase + STEREO_OFFSET * stereo);
            self.stereo = stereo;
        }
        let rate = params.float(&FLANGER_RATE);
        for lfo in self.lfos.iter_mut() {
            lfo.set_rate(rate, sr);
        }
        let base = ms_to_samples(params.float(&FLANGER_DELAY), sr);
        let sweep = ms_to_samples(FLANGER_SWEEP_MS * params.float(&FLANGER_DEPTH), sr);
        let feedback = params.float(&FLANGER_FEEDBACK);
        self.mix.set(params.float(&HALF_MIX));

        let (lines, lfos) = (&mut self.lines, &mut self.lfos);
        run_frames(input, output, &mut self.mix, |l, r| {
            let mut out = [l, r];
            for ((x, line), lfo) in out.iter_mut().zip(lines.iter_mut()).zip(lfos.iter_mut()) {
                line.write(*x);
                let wet = line.read_interpolated(base + sweep * lfo.unipolar());
                line.add_to_newest(feedback * wet);
                *x = wet;
            }
            (out[0], out[1])
        });
    }

    fn reset(&mut self) {
        for line in self.lines.iter_mut() {
            line.clear();
        }
        self.lfos = stereo_lfos(STEREO_OFFSET * self.stereo);
        self.mix.reset();
    }
}

pub const MAX_STAGES: usize = 12;

const STAGES: ParamSpec = ParamSpec::choice("stages", &["4", "2", "6", "8", "12"], 0);
const STAGE_COUNTS: [usize; 5] = [4, 2, 6, 8, 12];
const PHASER_RATE: ParamSpec = ParamSpec::float("rate", 0.05, 5.0, 0.5);
const PHASER_DEPTH: ParamSpec = ParamSpec::float("depth", 0.0, 1.0, 0.7);
const PHASER_FREQ: ParamSpec = ParamSpec::float("frequency", 100.0, 4000.0, 800.0);
const PHASER_FEEDBACK: ParamSpec = ParamSpec::float("feedback", 0.0, 0.95, 0.5);

pub const PHASER_PARAMS: &[ParamSpec] =
    &[STAGES, PHASER_RATE, PHASER_DEPTH, PHASER_FREQ, PHASER_FEEDBACK, STEREO, HALF_MIX];

/// Samples between all-pass retunes.
const PHASER_UPDATE: usize = 16;

#[derive(Debug, Clone, Default)]
struct PhaserChannel {
    stages: [AllPassFilter; MAX_STAGES],
    last: f64,
}

/// All-pass cascade swept around `frequency` by ±2 octaves at full depth.
#[derive(Debug, Clone)]
pub struct Phaser {
    sample_rate: f64,
    channels: [PhaserChannel; 2],
    lfos: [Lfo; 2],
    stereo: f64,
    counter: usize,
    mix: DryWet,
}

impl Phaser {
    pub fn new(sample_rate: f64) -> Self {
        Phaser {
            sample_rate,
            channels: Default::default(),
            lfos: stereo_lfos(STEREO_OFFSET),
            stereo: 1.0,
            counter: 0,
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for Phaser {
    fn name(&self) -> &'static str {
        "phaser"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let stereo = params.float(&STEREO);
        if stereo != self.stereo {
            let phase = self.lfos[0].phase();
            self.lfos[1].set_phase(phase + STEREO_OFFSET * stereo);
            self.stereo = stereo;
        }
        let rate = params.float(&PHASER_RATE);
        for lfo in self.lfos.iter_mut() {
            lfo.set_rate(rate, sr);
        }
        let count = STAGE_COUNTS[params.choice_index(&STAGES).min(STAGE_COUNTS.len() - 1)];
        let center = params.float(&PHASER_FREQ);
        let octaves = 2.0 * params.float(&PHASER_DEPTH);
        let feedback = params.float(&PHASER_FEEDBACK);
        self.mix.set(params.float(&HALF_MIX));

        let (channels, lfos, counter) = (&mut self.channels, &mut self.lfos, &mut self.counter);
        run_frames(input, output, &mut self.mix, |l, r| {
            let retune = *counter == 0;
            *counter = (*counter + 1) % PHASER_UPDATE;
            let mut out = [l, r];
            for ((x, ch), lfo) in out.iter_mut().zip(channels.iter_mut()).zip(lfos.iter_mut()) {
                let sweep = lfo.sine();
                if retune {
                    let freq = center * 2.0_f64.powf(octaves * sweep);
                    for stage in ch.stages[..count].iter_mut() {
                        stage.set_frequency(freq, sr);
                    }
                }
                let mut y = *x + feedback * ch.last;
                for stage in ch.stages[..count].iter_mut() {
                    y = stage.process(y);
                }
                ch.last = y.tanh();
                *x = y;
            }
            (out[0], out[1])
        });
    }

    fn reset(&mut self) {
        for ch in self.channels.iter_mut() {
            for stage in ch.stages.iter_mut() {
                stage.clear();
            }
            ch.last = 0.0;
        }
        self.lfos = stereo_lfos(STEREO_OFFSET * self.stereo);
        self.counter = 0;
        self.mix.reset();
    }
}

const TREMOLO_RATE: ParamSpec = ParamSpec::float("rate", 0.1, 20.0, 5.0);
const TREMOLO_DEPTH: ParamSpec = ParamSpec::float("depth", 0.0, 1.0, 0.5);
const SHAPE: ParamSpec = ParamSpec::choice("shape", LfoShape::OPTIONS, 0);
const TREMOLO_STEREO: ParamSpec = ParamSpec::float("stereo", 0.0, 1.0, 0.0);
const FULL_MIX: ParamSpec = mix_spec(1.0);

pub const TREMOLO_PARAMS: &[ParamSpec] = &[TREMOLO_RATE, TREMOLO_DEPTH, SHAPE, TREMOLO_STEREO, FULL_MIX];

/// Amplitude modulation. At full `stereo` the channels run half a cycle
/// apart (auto-pan).
#[derive(Debug, Clone)]
pub struct Tremolo {
    sample_rate: f64,
    lfos: [Lfo; 2],
    stereo: f64,
    mix: DryWet,
}

impl Tremolo {
    pub fn new(sample_rate: f64) -> Self {
        Tremolo {
            sample_rate,
            lfos: stereo_lfos(0.0),
            stereo: 0.0,
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for Tremolo {
    fn name(&self) -> &'static str {
        "tremolo"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let stereo = params.float(&TREMOLO_STEREO);
        if stereo != self.stereo {
            let phase = self.lfos[0].phase();
            self.lfos[1].set_phase(phase + 0.5 * stereo);
            self.stereo = stereo;
        }
        let rate = params.float(&TREMOLO_RATE);
        for lfo in self.lfos.iter_mut() {
            lfo.set_rate(rate, sr);
        }
        let depth = params.float(&TREMOLO_DEPTH);
        let shape: LfoShape = params.choice(&SHAPE);
        self.mix.set(params.float(&FULL_MIX));

        let lfos = &mut self.lfos;
        run_frames(input, output, &mut self.mix, |l, r| {
            let gain_l = 1.0 - depth * (0.5 + 0.5 * lfos[0].next(shape));
            let gain_r = 1.0 - depth * (0.5 + 0.5 * lfos[1].next(shape));
            (l * gain_l, r * gain_r)
        });
    }

    fn reset(&mut self) {
        self.lfos = stereo_lfos(0.5 * self.stereo);
        self.mix.reset();
    }

    fn reseed(&mut self, seed: u64) {
        self.lfos[0].reseed(seed);
        self.lfos[1].reseed(seed.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_util::{SR, noise, sine};

    #[test]
    fn tremolo_without_depth_is_transparent() {
        let input = noise(2048, 21);
        let params = ParamSnapshot::new().with("depth", 0.0);
        let out = Tremolo::new(SR).process(&input, &params, &DspContext::new(SR));
        assert_eq!(out, input);
    }

    #[test]
    fn square_tremolo_chops() {
        let input = AudioBuffer::from_mono(&vec![0.5; 44100], SR);
        let params = ParamSnapshot::new().with("depth", 1.0).with("shape", "square").with("rate", 2.0);
        let out = Tremolo::new(SR).process(&input, &params, &DspContext::new(SR));
        // First half cycle the square LFO is high: gain 0
        assert_eq!(out.left()[100], 0.0);
        // Second half cycle it is low: gain 1
        assert_eq!(out.left()[11025 + 100], 0.5);
    }

    #[test]
    fn autopan_alternates_channels() {
        let input = AudioBuffer::from_mono(&vec![0.5; 44100], SR);
        let params = ParamSnapshot::new()
            .with("depth", 1.0)
            .with("shape", "square")
            .with("rate", 2.0)
            .with("stereo", 1.0);
        let out = Tremolo::new(SR).process(&input, &params, &DspContext::new(SR));
        assert_eq!(out.left()[100], 0.0);
        assert_eq!(out.right()[100], 0.5);
    }

    #[test]
    fn chorus_and_flanger_modulate() {
        let ctx = DspContext::new(SR);
        let input = sine(440.0, 8192, 0.5);
        let params = ParamSnapshot::new().with("mix", 1.0);
        let chorus = Chorus::new(SR).process(&input, &params, &ctx);
        let flanger = Flanger::new(SR).process(&input, &params.clone().with("feedback", -0.95), &ctx);
        for out in [&chorus, &flanger] {
            assert!(out.is_finite());
            assert!(out.peak() <= 4.0);
            assert_ne!(out, &input);
        }
        assert_ne!(chorus.left(), chorus.right());
    }

    #[test]
    fn phaser_without_feedback_keeps_energy_when_fully_wet() {
        let ctx = DspContext::new(SR);
        let input = noise(16384, 3);
        let wet = Phaser::new(SR).process(&input, &ParamSnapshot::new().with("feedback", 0.0).with("mix", 1.0), &ctx);
        let ratio = wet.rms() / input.rms();
        assert!((0.85..1.15).contains(&ratio), "ratio {ratio}");
        // Blending with the dry signal carves notches
        let blend = Phaser::new(SR).process(&input, &ParamSnapshot::new().with("feedback", 0.0), &ctx);
        assert!(blend.rms() < input.rms());
    }
}
