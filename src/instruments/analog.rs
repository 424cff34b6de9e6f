//! Virtual-analog subtractive synthesizers.
//!
//! One engine, ten voicings. Each model fixes its oscillator shapes,
//! unison spread, filter topology and envelope character; the host can
//! override any of them through the parameter snapshot.
//!
//! Signal path per sample: detuned unison oscillators and a sub
//! oscillator, a ladder or state-variable low-pass swept by its own
//! envelope plus an LFO, tanh warmth, the amp envelope, and finally an
//! optional stereo chorus built from two modulated delay lines.

use crate::dsp::util::{ms_to_samples, normalize_velocity, semitones_to_ratio};
use crate::dsp::{
    Adsr, AudioBuffer, DelayLine, DspContext, LadderFilter, Lfo, Oscillator, StateVariableFilter, SvfMode, Waveform,
};
use crate::params::{ParamChoice, ParamSnapshot, ParamSpec};
use crate::unit::SynthesizerEngine;

use super::render_frames;

pub const MAX_UNISON: usize = 8;

/// Filter cutoff is recomputed at this interval.
const FILTER_UPDATE: usize = 8;
const CHORUS_CENTER_MS: f64 = 7.0;
const CHORUS_DEPTH_MS: f64 = 2.0;
const CHORUS_RATE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalogModel {
    Minimoog,
    Prophet5,
    Jupiter8,
    OberheimOb,
    Arp2600,
    Sh101,
    Juno60,
    Ms20,
    Odyssey,
    Polysix,
}

impl AnalogModel {
    pub const ALL: [AnalogModel; 10] = [
        AnalogModel::Minimoog,
        AnalogModel::Prophet5,
        AnalogModel::Jupiter8,
        AnalogModel::OberheimOb,
        AnalogModel::Arp2600,
        AnalogModel::Sh101,
        AnalogModel::Juno60,
        AnalogModel::Ms20,
        AnalogModel::Odyssey,
        AnalogModel::Polysix,
    ];

    pub fn id(self) -> &'static str {
        match self {
            AnalogModel::Minimoog => "minimoog",
            AnalogModel::Prophet5 => "prophet-5",
            AnalogModel::Jupiter8 => "jupiter-8",
            AnalogModel::OberheimOb => "oberheim-ob",
            AnalogModel::Arp2600 => "arp-2600",
            AnalogModel::Sh101 => "sh-101",
            AnalogModel::Juno60 => "juno-60",
            AnalogModel::Ms20 => "ms-20",
            AnalogModel::Odyssey => "odyssey",
            AnalogModel::Polysix => "polysix",
        }
    }

    fn preset(self) -> Preset {
        use Waveform::*;
        let base = Preset {
            osc1: Sawtooth,
            osc2: Sawtooth,
            osc2_semitones: 0.0,
            osc2_level: 0.6,
            sub_level: 0.0,
            unison: 2,
            detune: 8.0,
            ladder: true,
            cutoff: 2000.0,
            resonance: 0.3,
            env_amount: 0.5,
            filter_env: (0.005, 0.3, 0.3, 0.3),
            amp_env: (0.005, 0.2, 0.8, 0.3),
            lfo_rate: 5.0,
            lfo_depth: 0.0,
            chorus: false,
            drive: 1.5,
        };
        match self {
            AnalogModel::Minimoog => Preset {
                osc2_level: 0.8,
                sub_level: 0.4,
                unison: 1,
                cutoff: 1200.0,
                resonance: 0.4,
                env_amount: 0.6,
                drive: 2.5,
                ..base
            },
            AnalogModel::Prophet5 => Preset {
                osc2: Pulse,
                unison: 2,
                detune: 6.0,
                cutoff: 2500.0,
                amp_env: (0.01, 0.3, 0.7, 0.4),
                ..base
            },
            AnalogModel::Jupiter8 => Preset {
                unison: 4,
                detune: 12.0,
                cutoff: 3500.0,
                resonance: 0.2,
                ladder: false,
                chorus: true,
                amp_env: (0.02, 0.4, 0.8, 0.6),
                ..base
            },
            AnalogModel::OberheimOb => Preset {
                unison: 4,
                detune: 15.0,
                ladder: false,
                cutoff: 3000.0,
                resonance: 0.25,
                amp_env: (0.03, 0.5, 0.85, 0.8),
                drive: 2.0,
                ..base
            },
            AnalogModel::Arp2600 => Preset {
                osc2: Square,
                osc2_semitones: 7.0,
                osc2_level: 0.5,
                unison: 1,
                cutoff: 1800.0,
                resonance: 0.5,
                lfo_depth: 0.2,
                ..base
            },
            AnalogModel::Sh101 => Preset {
                osc1: Pulse,
                osc2_level: 0.0,
                sub_level: 0.6,
                unison: 1,
                cutoff: 900.0,
                resonance: 0.55,
                env_amount: 0.7,
                filter_env: (0.001, 0.2, 0.1, 0.2),
                ..base
            },
            AnalogModel::Juno60 => Preset {
                osc1: Pulse,
                osc2_level: 0.0,
                sub_level: 0.3,
                unison: 1,
                ladder: false,
                cutoff: 2400.0,
                chorus: true,
                amp_env: (0.01, 0.3, 0.8, 0.5),
                ..base
            },
            AnalogModel::Ms20 => Preset {
                osc2: Square,
                osc2_semitones: -12.0,
                unison: 1,
                ladder: false,
                cutoff: 1500.0,
                resonance: 0.75,
                env_amount: 0.6,
                drive: 3.0,
                ..base
            },
            AnalogModel::Odyssey => Preset {
                osc1: Square,
                osc2_semitones: 12.0,
                osc2_level: 0.4,
                unison: 1,
                cutoff: 2200.0,
                resonance: 0.45,
                lfo_rate: 6.0,
                lfo_depth: 0.15,
                ..base
            },
            AnalogModel::Polysix => Preset {
                unison: 2,
                detune: 5.0,
                sub_level: 0.3,
                cutoff: 2000.0,
                chorus: true,
                amp_env: (0.01, 0.3, 0.75, 0.4),
                ..base
            },
        }
    }
}

/// Model defaults. Envelope tuples are (attack, decay, sustain, release).
#[derive(Debug, Clone, Copy)]
struct Preset {
    osc1: Waveform,
    osc2: Waveform,
    osc2_semitones: f64,
    osc2_level: f64,
    sub_level: f64,
    unison: usize,
    detune: f64,
    ladder: bool,
    cutoff: f64,
    resonance: f64,
    env_amount: f64,
    filter_env: (f64, f64, f64, f64),
    amp_env: (f64, f64, f64, f64),
    lfo_rate: f64,
    lfo_depth: f64,
    chorus: bool,
    drive: f64,
}

const OSC1: ParamSpec = ParamSpec::choice("osc1", Waveform::OPTIONS, 2);
const OSC2: ParamSpec = ParamSpec::choice("osc2", Waveform::OPTIONS, 2);
const OSC2_SEMITONES: ParamSpec = ParamSpec::float("osc2Semitones", -24.0, 24.0, 0.0);
const OSC2_LEVEL: ParamSpec = ParamSpec::float("osc2Level", 0.0, 1.0, 0.6);
const SUB_LEVEL: ParamSpec = ParamSpec::float("subLevel", 0.0, 1.0, 0.0);
const UNISON: ParamSpec = ParamSpec::float("unison", 1.0, MAX_UNISON as f64, 2.0).fixed();
const DETUNE: ParamSpec = ParamSpec::float("detune", 0.0, 50.0, 8.0);
const FILTER: ParamSpec = ParamSpec::choice("filter", &["ladder", "svf"], 0);
const CUTOFF: ParamSpec = ParamSpec::float("cutoff", 20.0, 20000.0, 2000.0);
const RESONANCE: ParamSpec = ParamSpec::float("resonance", 0.0, 1.0, 0.3);
const ENV_AMOUNT: ParamSpec = ParamSpec::float("envAmount", -1.0, 1.0, 0.5);
const FILTER_ATTACK: ParamSpec = ParamSpec::float("filterAttack", 0.0, 10.0, 0.005);
const FILTER_DECAY: ParamSpec = ParamSpec::float("filterDecay", 0.0, 10.0, 0.3);
const FILTER_SUSTAIN: ParamSpec = ParamSpec::float("filterSustain", 0.0, 1.0, 0.3);
const FILTER_RELEASE: ParamSpec = ParamSpec::float("filterRelease", 0.0, 10.0, 0.3);
const ATTACK: ParamSpec = ParamSpec::float("attack", 0.0, 10.0, 0.005);
const DECAY: ParamSpec = ParamSpec::float("decay", 0.0, 10.0, 0.2);
const SUSTAIN: ParamSpec = ParamSpec::float("sustain", 0.0, 1.0, 0.8);
const RELEASE: ParamSpec = ParamSpec::float("release", 0.0, 10.0, 0.3);
const LFO_RATE: ParamSpec = ParamSpec::float("lfoRate", 0.01, 30.0, 5.0);
const LFO_DEPTH: ParamSpec = ParamSpec::float("lfoDepth", 0.0, 1.0, 0.0);
const CHORUS: ParamSpec = ParamSpec::toggle("chorus", false);
const DRIVE: ParamSpec = ParamSpec::float("drive", 1.0, 10.0, 1.5);
const GAIN: ParamSpec = ParamSpec::float("gain", 0.0, 1.0, 0.7);

pub const PARAMS: &[ParamSpec] = &[
    OSC1,
    OSC2,
    OSC2_SEMITONES,
    OSC2_LEVEL,
    SUB_LEVEL,
    UNISON,
    DETUNE,
    FILTER,
    CUTOFF,
    RESONANCE,
    ENV_AMOUNT,
    FILTER_ATTACK,
    FILTER_DECAY,
    FILTER_SUSTAIN,
    FILTER_RELEASE,
    ATTACK,
    DECAY,
    SUSTAIN,
    RELEASE,
    LFO_RATE,
    LFO_DEPTH,
    CHORUS,
    DRIVE,
    GAIN,
];

/// Per-note settings resolved from preset and snapshot.
#[derive(Debug, Clone, Copy)]
struct Config {
    osc1: Waveform,
    osc2: Waveform,
    osc2_level: f64,
    sub_level: f64,
    unison: usize,
    ladder: bool,
    cutoff: f64,
    resonance: f64,
    env_amount: f64,
    lfo_depth: f64,
    chorus: bool,
    drive: f64,
    level: f64,
}

#[derive(Debug, Clone)]
pub struct AnalogSynth {
    model: AnalogModel,
    sample_rate: f64,
    osc1: [Oscillator; MAX_UNISON],
    osc2: [Oscillator; MAX_UNISON],
    sub: Oscillator,
    ladder: LadderFilter,
    svf: StateVariableFilter,
    filter_env: Adsr,
    amp_env: Adsr,
    lfo: Lfo,
    chorus_lfo: Lfo,
    chorus_lines: [DelayLine; 2],
    /// Frames the chorus keeps ringing after the amp envelope goes idle.
    chorus_tail: usize,
    config: Config,
    /// Cutoff offset in octaves from note velocity.
    brightness: f64,
    counter: usize,
    rng: fastrand::Rng,
}

impl AnalogSynth {
    pub fn new(model: AnalogModel, sample_rate: f64) -> Self {
        let preset = model.preset();
        AnalogSynth {
            model,
            sample_rate,
            osc1: std::array::from_fn(|i| Oscillator::with_seed(i as u64)),
            osc2: std::array::from_fn(|i| Oscillator::with_seed(100 + i as u64)),
            sub: Oscillator::new(),
            ladder: LadderFilter::new(),
            svf: StateVariableFilter::new(),
            filter_env: Adsr::new(sample_rate),
            amp_env: Adsr::new(sample_rate),
            lfo: Lfo::new(),
            chorus_lfo: Lfo::new(),
            chorus_lines: std::array::from_fn(|_| {
                DelayLine::with_max_seconds((CHORUS_CENTER_MS + CHORUS_DEPTH_MS) * 0.002, sample_rate)
            }),
            chorus_tail: 0,
            config: Config {
                osc1: preset.osc1,
                osc2: preset.osc2,
                osc2_level: preset.osc2_level,
                sub_level: preset.sub_level,
                unison: preset.unison,
                ladder: preset.ladder,
                cutoff: preset.cutoff,
                resonance: preset.resonance,
                env_amount: preset.env_amount,
                lfo_depth: preset.lfo_depth,
                chorus: preset.chorus,
                drive: preset.drive,
                level: 0.0,
            },
            brightness: 0.0,
            counter: 0,
            rng: fastrand::Rng::with_seed(0xA7A1_0600),
        }
    }

    pub fn model(&self) -> AnalogModel {
        self.model
    }

    fn resize(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.chorus_tail = 0;
        self.filter_env.set_sample_rate(sample_rate);
        self.amp_env.set_sample_rate(sample_rate);
        self.chorus_lines = std::array::from_fn(|_| {
            DelayLine::with_max_seconds((CHORUS_CENTER_MS + CHORUS_DEPTH_MS) * 0.002, sample_rate)
        });
    }

    fn configure(&mut self, frequency: f64, velocity: f64, params: &ParamSnapshot) {
        let p = self.model.preset();
        let sr = self.sample_rate;
        let config = Config {
            osc1: params.choice_or(&OSC1, p.osc1),
            osc2: params.choice_or(&OSC2, p.osc2),
            osc2_level: params.float_or(&OSC2_LEVEL, p.osc2_level),
            sub_level: params.float_or(&SUB_LEVEL, p.sub_level),
            unison: (params.float_or(&UNISON, p.unison as f64).round() as usize).clamp(1, MAX_UNISON),
            ladder: if params.get(FILTER.id).is_some() {
                params.choice_index(&FILTER) == 0
            } else {
                p.ladder
            },
            cutoff: params.float_or(&CUTOFF, p.cutoff),
            resonance: params.float_or(&RESONANCE, p.resonance),
            env_amount: params.float_or(&ENV_AMOUNT, p.env_amount),
            lfo_depth: params.float_or(&LFO_DEPTH, p.lfo_depth),
            chorus: params.bool_or(&CHORUS, p.chorus),
            drive: params.float_or(&DRIVE, p.drive),
            level: velocity * params.float(&GAIN),
        };

        let detune = params.float_or(&DETUNE, p.detune);
        let osc2_ratio = semitones_to_ratio(params.float_or(&OSC2_SEMITONES, p.osc2_semitones));
        for i in 0..config.unison {
            let spread = if config.unison > 1 {
                i as f64 / (config.unison - 1) as f64 * 2.0 - 1.0
            } else {
                0.0
            };
            let ratio = semitones_to_ratio(spread * detune / 100.0);
            self.osc1[i].set_frequency(frequency * ratio, sr);
            self.osc2[i].set_frequency(frequency * ratio * osc2_ratio, sr);
            if config.unison > 1 {
                self.osc1[i].set_phase(self.rng.f64());
                self.osc2[i].set_phase(self.rng.f64());
            } else {
                self.osc1[i].reset();
                self.osc2[i].reset();
            }
        }
        self.sub.set_frequency(frequency * 0.5, sr);
        self.sub.reset();

        let (a, d, s, r) = p.filter_env;
        self.filter_env.set(
            params.float_or(&FILTER_ATTACK, a),
            params.float_or(&FILTER_DECAY, d),
            params.float_or(&FILTER_SUSTAIN, s),
            params.float_or(&FILTER_RELEASE, r),
        );
        let (a, d, s, r) = p.amp_env;
        self.amp_env.set(
            params.float_or(&ATTACK, a),
            params.float_or(&DECAY, d),
            params.float_or(&SUSTAIN, s),
            params.float_or(&RELEASE, r),
        );
        self.lfo.set_rate(params.float_or(&LFO_RATE, p.lfo_rate), sr);
        self.chorus_lfo.set_rate(CHORUS_RATE, sr);
        self.ladder.set_drive(1.0);
        self.brightness = velocity - 0.5;
        self.config = config;
    }

    #[inline]
    fn oscillators(&mut self) -> f64 {
        let c = self.config;
        let mut sum = 0.0;
        for (a, b) in self.osc1.iter_mut().zip(self.osc2.iter_mut()).take(c.unison) {
            sum += a.next(c.osc1);
            if c.osc2_level > 0.0 {
                sum += b.next(c.osc2) * c.osc2_level;
            }
        }
        let norm = 1.0 / ((c.unison as f64).sqrt() * (1.0 + c.osc2_level));
        sum * norm + self.sub.square() * c.sub_level * 0.5
    }

    /// Feed one sample through the stereo chorus.
    #[inline]
    fn chorus(&mut self, s: f64, center: f64, depth: f64) -> (f64, f64) {
        let m = self.chorus_lfo.sine();
        let [left, right] = &mut self.chorus_lines;
        left.write(s);
        right.write(s);
        let wl = left.read_interpolated(center + depth * m);
        let wr = right.read_interpolated(center - depth * m);
        (0.6 * s + 0.5 * wl, 0.6 * s + 0.5 * wr)
    }

    #[inline]
    fn update_filter(&mut self, fenv: f64, lfo: f64) {
        let c = self.config;
        let octaves = c.env_amount * fenv * 5.0 + c.lfo_depth * lfo * 2.0 + self.brightness;
        let cutoff = c.cutoff * 2.0_f64.powf(octaves);
        if c.ladder {
            self.ladder.set(cutoff, c.resonance, self.sample_rate);
        } else {
            self.svf.set(cutoff, c.resonance, self.sample_rate);
        }
    }
}

impl SynthesizerEngine for AnalogSynth {
    fn name(&self) -> &'static str {
        self.model.id()
    }

    fn note_on(&mut self, frequency: f64, velocity: f64, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            self.resize(sr);
        }
        self.configure(frequency, normalize_velocity(velocity), params);
        self.filter_env.trigger();
        self.amp_env.trigger();
        self.counter = 0;
    }

    fn note_off(&mut self, _ctx: &DspContext) {
        self.filter_env.release();
        self.amp_env.release();
    }

    fn render_into(&mut self, output: &mut AudioBuffer, _ctx: &DspContext) {
        let chorus_center = ms_to_samples(CHORUS_CENTER_MS, self.sample_rate);
        let chorus_depth = ms_to_samples(CHORUS_DEPTH_MS, self.sample_rate);
        let tail = (chorus_center + chorus_depth).ceil() as usize + 2;
        render_frames(output, || {
            if !self.amp_env.is_active() {
                if self.chorus_tail == 0 {
                    return (0.0, 0.0);
                }
                self.chorus_tail -= 1;
                return self.chorus(0.0, chorus_center, chorus_depth);
            }
            let fenv = self.filter_env.process();
            let lfo = self.lfo.sine();
            if self.counter % FILTER_UPDATE == 0 {
                self.update_filter(fenv, lfo);
            }
            self.counter = self.counter.wrapping_add(1);

            let raw = self.oscillators();
            let filtered = if self.config.ladder {
                self.ladder.process(raw)
            } else {
                self.svf.process(raw, SvfMode::Lowpass)
            };
            let drive = self.config.drive;
            let warm = (filtered * drive).tanh() / drive.tanh();
            let s = warm * self.amp_env.process() * self.config.level;

            if !self.config.chorus {
                return (s, s);
            }
            self.chorus_tail = tail;
            self.chorus(s, chorus_center, chorus_depth)
        });
    }

    fn is_active(&self) -> bool {
        self.amp_env.is_active() || self.chorus_tail > 0
    }

    fn reset(&mut self) {
        for osc in self.osc1.iter_mut().chain(self.osc2.iter_mut()) {
            osc.reset();
        }
        self.sub.reset();
        self.ladder.clear();
        self.svf.clear();
        self.filter_env.reset();
        self.amp_env.reset();
        self.lfo.reset();
        self.chorus_lfo.reset();
        for line in self.chorus_lines.iter_mut() {
            line.clear();
        }
        self.chorus_tail = 0;
        self.counter = 0;
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = fastrand::Rng::with_seed(seed);
        for (i, osc) in self.osc1.iter_mut().chain(self.osc2.iter_mut()).enumerate() {
            osc.reseed(seed.wrapping_add(i as u64));
        }
        self.lfo.reseed(seed);
    }
}

impl ParamChoice for AnalogModel {
    const OPTIONS: &'static [&'static str] = &[
        "minimoog",
        "prophet-5",
        "jupiter-8",
        "oberheim-ob",
        "arp-2600",
        "sh-101",
        "juno-60",
        "ms-20",
        "odyssey",
        "polysix",
    ];

    fn from_index(index: usize) -> Self {
        AnalogModel::ALL.get(index).copied().unwrap_or(AnalogModel::Minimoog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::test_util::{SR, drain, fundamental, play};

    #[test]
    fn every_model_sounds_and_stays_finite() {
        for model in AnalogModel::ALL {
            let mut synth = AnalogSynth::new(model, SR);
            let out = play(&mut synth, 220.0, &ParamSnapshot::new(), 8192);
            assert!(out.is_finite(), "{}", model.id());
            assert!(out.peak() > 0.01, "{} peak {}", model.id(), out.peak());
            assert!(out.peak() <= 1.5, "{} peak {}", model.id(), out.peak());
        }
    }

    #[test]
    fn ids_match_choice_options() {
        for (i, model) in AnalogModel::ALL.iter().enumerate() {
            assert_eq!(model.id(), AnalogModel::OPTIONS[i]);
            assert_eq!(AnalogModel::parse(model.id()), *model);
        }
    }

    #[test]
    fn single_oscillator_tracks_the_note() {
        let params = ParamSnapshot::new()
            .with("osc1", "sawtooth")
            .with("osc2Level", 0.0)
            .with("subLevel", 0.0)
            .with("unison", 1.0)
            .with("cutoff", 8000.0)
            .with("resonance", 0.0)
            .with("envAmount", 0.0);
        let mut synth = AnalogSynth::new(AnalogModel::Minimoog, SR);
        let out = play(&mut synth, 220.0, &params, 16384);
        let f = fundamental(&out, 80.0, 800.0);
        assert!((f - 220.0).abs() < 3.0, "got {f}");
    }

    #[test]
    fn filter_envelope_darkens_the_tail() {
        let params = ParamSnapshot::new()
            .with("envAmount", 1.0)
            .with("filterDecay", 0.05)
            .with("filterSustain", 0.0)
            .with("cutoff", 300.0);
        let mut synth = AnalogSynth::new(AnalogModel::Sh101, SR);
        let out = play(&mut synth, 110.0, &params, 22050);
        let early = AudioBuffer::from_mono(&out.left()[200..1200], SR);
        let late = AudioBuffer::from_mono(&out.left()[20000..21000], SR);
        // Brightness shows up as sample-to-sample motion
        let motion = |b: &AudioBuffer| b.left().windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f32>();
        assert!(motion(&early) > motion(&late));
    }

    #[test]
    fn chorus_decorrelates_channels() {
        let mut synth = AnalogSynth::new(AnalogModel::Juno60, SR);
        let out = play(&mut synth, 220.0, &ParamSnapshot::new(), 8192);
        assert!(out.left().iter().zip(out.right()).any(|(l, r)| (l - r).abs() > 1e-3));

        let mut dry = AnalogSynth::new(AnalogModel::Juno60, SR);
        let out = play(&mut dry, 220.0, &ParamSnapshot::new().with("chorus", false), 8192);
        assert_eq!(out.left(), out.right());
    }

    #[test]
    fn chorus_rings_out_after_the_envelope() {
        let params = ParamSnapshot::new().with("release", 0.01);
        let mut synth = AnalogSynth::new(AnalogModel::Juno60, SR);
        play(&mut synth, 220.0, &params, 4096);
        let ctx = DspContext::new(SR);
        synth.note_off(&ctx);
        while synth.amp_env.is_active() {
            synth.render(1, &ctx);
        }
        assert!(synth.is_active());
        let tail = synth.render(1024, &ctx);
        assert!(tail.left()[..200].iter().any(|&s| s != 0.0));
        assert!(!synth.is_active());
        assert!(tail.left()[600..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn release_goes_idle() {
        let mut synth = AnalogSynth::new(AnalogModel::Prophet5, SR);
        play(&mut synth, 440.0, &ParamSnapshot::new().with("release", 0.05), 2048);
        assert!(synth.is_active());
        assert!(drain(&mut synth, 44100).is_some());
    }

    #[test]
    fn reseeding_reproduces_unison_phases() {
        let render = |seed| {
            let mut synth = AnalogSynth::new(AnalogModel::Jupiter8, SR);
            synth.reseed(seed);
            play(&mut synth, 220.0, &ParamSnapshot::new(), 1024)
        };
        assert_eq!(render(3), render(3));
        assert_ne!(render(3), render(4));
    }
}
