//! Bowed, plucked and ensemble strings.
//!
//! Three excitation models share one engine:
//!
//! - **Section**: detuned sawtooth unison through a low-pass, for pads.
//! - **Bowed**: a two-segment waveguide (nut side and bridge side of the
//!   bow) driven by a friction curve of the relative bow/string velocity.
//! - **Plucked**: Karplus-Strong, a noise burst into a damped comb.
//!
//! All of them run a vibrato LFO and sit behind the amp envelope.

use crate::dsp::util::{normalize_velocity, semitones_to_ratio, soft_clip};
use crate::dsp::{
    Adsr, AudioBuffer, BiquadFilter, CombFilter, DelayLine, DspContext, Lfo, OnePoleFilter, Oscillator,
};
use crate::params::{ParamChoice, ParamSnapshot, ParamSpec};
use crate::unit::SynthesizerEngine;

use super::render_frames;

pub const MAX_SECTION: usize = 6;

const MIN_STRING_HZ: f64 = 20.0;
/// Bow contact point as a fraction of the string length from the bridge.
const BOW_POSITION: f64 = 0.127;
const BRIDGE_LOSS: f64 = 0.95;
const BOWED_OUTPUT_GAIN: f64 = 2.0;
const VIBRATO_UPDATE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringsModel {
    StringEnsemble,
    Violin,
    Cello,
    Contrabass,
    Pizzicato,
    Harp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Excitation {
    Section,
    Bowed,
    Plucked,
}

#[derive(Debug, Clone, Copy)]
struct Preset {
    excitation: Excitation,
    attack: f64,
    release: f64,
    vibrato_rate: f64,
    vibrato_depth: f64,
    detune: f64,
    bow_pressure: f64,
    brightness: f64,
    decay: f64,
    body: [(f64, f64, f64); 2],
}

impl StringsModel {
    pub const ALL: [StringsModel; 6] = [
        StringsModel::StringEnsemble,
        StringsModel::Violin,
        StringsModel::Cello,
        StringsModel::Contrabass,
        StringsModel::Pizzicato,
        StringsModel::Harp,
    ];

    pub fn id(self) -> &'static str {
        match self {
            StringsModel::StringEnsemble => "string-ensemble",
            StringsModel::Violin => "violin",
            StringsModel::Cello => "cello",
            StringsModel::Contrabass => "contrabass",
            StringsModel::Pizzicato => "pizzicato",
            StringsModel::Harp => "harp",
        }
    }

    fn preset(self) -> Preset {
        let bowed = Preset {
            excitation: Excitation::Bowed,
            attack: 0.08,
            release: 0.2,
            vibrato_rate: 5.5,
            vibrato_depth: 15.0,
            detune: 0.0,
            bow_pressure: 0.5,
            brightness: 0.6,
            decay: 1.0,
            body: [(500.0, 1.0, 4.0), (3000.0, 1.2, 3.0)],
        };
        match self {
            StringsModel::StringEnsemble => Preset {
                excitation: Excitation::Section,
                attack: 0.3,
                release: 0.8,
                vibrato_rate: 5.0,
                vibrato_depth: 8.0,
                detune: 12.0,
                brightness: 0.5,
                body: [(300.0, 0.8, 2.0), (2500.0, 1.0, 1.5)],
                ..bowed
            },
            StringsModel::Violin => bowed,
            StringsModel::Cello => Preset {
                attack: 0.1,
                release: 0.3,
                vibrato_rate: 5.0,
                vibrato_depth: 12.0,
                bow_pressure: 0.55,
                brightness: 0.5,
                body: [(220.0, 1.0, 4.0), (1500.0, 1.2, 2.0)],
                ..bowed
            },
            StringsModel::Contrabass => Preset {
                attack: 0.15,
                release: 0.35,
                vibrato_rate: 4.5,
                vibrato_depth: 8.0,
                bow_pressure: 0.6,
                brightness: 0.4,
                body: [(100.0, 1.0, 4.0), (800.0, 1.2, 2.0)],
                ..bowed
            },
            StringsModel::Pizzicato => Preset {
                excitation: Excitation::Plucked,
                attack: 0.0,
                release: 0.1,
                vibrato_depth: 0.0,
                brightness: 0.4,
                decay: 0.6,
                ..bowed
            },
            StringsModel::Harp => Preset {
                excitation: Excitation::Plucked,
                attack: 0.0,
                release: 0.5,
                vibrato_depth: 0.0,
                brightness: 0.8,
                decay: 3.0,
                body: [(200.0, 1.0, 2.0), (2000.0, 1.0, 2.0)],
                ..bowed
            },
        }
    }
}

impl ParamChoice for StringsModel {
    const OPTIONS: &'static [&'static str] = &["string-ensemble", "violin", "cello", "contrabass", "pizzicato", "harp"];

    fn from_index(index: usize) -> Self {
        StringsModel::ALL.get(index).copied().unwrap_or(StringsModel::StringEnsemble)
    }
}

const ATTACK: ParamSpec = ParamSpec::float("attack", 0.0, 10.0, 0.08);
const RELEASE: ParamSpec = ParamSpec::float("release", 0.0, 10.0, 0.2);
const VIBRATO_RATE: ParamSpec = ParamSpec::float("vibratoRate", 0.1, 12.0, 5.5);
const VIBRATO_DEPTH: ParamSpec = ParamSpec::float("vibratoDepth", 0.0, 100.0, 15.0);
const DETUNE: ParamSpec = ParamSpec::float("detune", 0.0, 50.0, 12.0);
const VOICES: ParamSpec = ParamSpec::float("voices", 1.0, MAX_SECTION as f64, MAX_SECTION as f64).fixed();
const BOW_PRESSURE: ParamSpec = ParamSpec::float("bowPressure", 0.0, 1.0, 0.5);
const BRIGHTNESS: ParamSpec = ParamSpec::float("brightness", 0.0, 1.0, 0.6);
const DECAY: ParamSpec = ParamSpec::float("decay", 0.05, 10.0, 1.0);
const GAIN: ParamSpec = ParamSpec::float("gain", 0.0, 1.0, 0.7);

pub const PARAMS: &[ParamSpec] = &[
    ATTACK,
    RELEASE,
    VIBRATO_RATE,
    VIBRATO_DEPTH,
    DETUNE,
    VOICES,
    BOW_PRESSURE,
    BRIGHTNESS,
    DECAY,
    GAIN,
];

/// Friction between bow hair and string as a function of their relative
/// velocity: sticks near zero, slips as the difference grows.
#[inline]
pub fn bow_friction(relative_velocity: f64, slope: f64) -> f64 {
    let x = (relative_velocity + 0.001) * slope;
    (x.abs() + 0.75).powi(-4).clamp(0.01, 0.98)
}

#[derive(Debug, Clone)]
struct Waveguide {
    neck: DelayLine,
    bridge: DelayLine,
    bridge_filter: OnePoleFilter,
    neck_len: f64,
    bridge_len: f64,
    slope: f64,
    max_velocity: f64,
}

impl Waveguide {
    fn new(sample_rate: f64) -> Self {
        let capacity = (sample_rate / MIN_STRING_HZ).ceil() as usize;
        Waveguide {
            neck: DelayLine::new(capacity),
            bridge: DelayLine::new(capacity),
            bridge_filter: OnePoleFilter::new(4000.0, sample_rate),
            neck_len: 1.0,
            bridge_len: 1.0,
            slope: 3.0,
            max_velocity: 0.1,
        }
    }

    fn tune(&mut self, frequency: f64, sample_rate: f64) {
        let max = self.neck.max_delay() as f64;
        let total = (sample_rate / frequency.max(MIN_STRING_HZ) - 4.0).clamp(4.0, max);
        self.neck_len = total * (1.0 - BOW_POSITION);
        self.bridge_len = total * BOW_POSITION;
    }

    /// One sample; `bow` is the envelope-scaled bow speed, `stretch` the
    /// vibrato length ratio.
    #[inline]
    fn tick(&mut self, bow: f64, stretch: f64) -> f64 {
        let bridge_out = self.bridge.read_interpolated(self.bridge_len * stretch - 1.0);
        let neck_out = self.neck.read_interpolated(self.neck_len * stretch - 1.0);
        let bridge_reflection = -BRIDGE_LOSS * self.bridge_filter.lowpass(bridge_out);
        let nut_reflection = -neck_out;
        let string_velocity = bridge_reflection + nut_reflection;
        let difference = bow * self.max_velocity - string_velocity;
        let injected = difference * bow_friction(difference, self.slope);
        self.neck.write(bridge_reflection + injected);
        self.bridge.write(nut_reflection + injected);
        bridge_out
    }

    fn clear(&mut self) {
        self.neck.clear();
        self.bridge.clear();
        self.bridge_filter.clear();
    }
}

#[derive(Debug, Clone)]
pub struct StringsSynth {
    model: StringsModel,
    excitation: Excitation,
    sample_rate: f64,
    section: [Oscillator; MAX_SECTION],
    section_ratios: [f64; MAX_SECTION],
    voices: usize,
    tone: [BiquadFilter; 2],
    waveguide: Waveguide,
    pluck: CombFilter,
    pluck_filter: OnePoleFilter,
    burst: usize,
    body: [BiquadFilter; 2],
    vibrato: Lfo,
    vibrato_depth: f64,
    stretch: f64,
    frequency: f64,
    env: Adsr,
    velocity: f64,
    level: f64,
    counter: usize,
    rng: fastrand::Rng,
}

impl StringsSynth {
    pub fn new(model: StringsModel, sample_rate: f64) -> Self {
        StringsSynth {
            model,
            excitation: model.preset().excitation,
            sample_rate,
            section: std::array::from_fn(|i| Oscillator::with_seed(i as u64)),
            section_ratios: [1.0; MAX_SECTION],
            voices: MAX_SECTION,
            tone: [BiquadFilter::new(), BiquadFilter::new()],
            waveguide: Waveguide::new(sample_rate),
            pluck: CombFilter::new((sample_rate / MIN_STRING_HZ).ceil() as usize),
            pluck_filter: OnePoleFilter::new(5000.0, sample_rate),
            burst: 0,
            body: [BiquadFilter::new(), BiquadFilter::new()],
            vibrato: Lfo::new(),
            vibrato_depth: 0.0,
            stretch: 1.0,
            frequency: 440.0,
            env: Adsr::new(sample_rate),
            velocity: 0.0,
            level: 0.0,
            counter: 0,
            rng: fastrand::Rng::with_seed(0x5781_4E65),
        }
    }

    pub fn model(&self) -> StringsModel {
        self.model
    }

    fn configure(&mut self, frequency: f64, params: &ParamSnapshot) {
        let p = self.model.preset();
        let sr = self.sample_rate;
        let brightness = params.float_or(&BRIGHTNESS, p.brightness);
        self.frequency = frequency;
        self.vibrato.set_rate(params.float_or(&VIBRATO_RATE, p.vibrato_rate), sr);
        self.vibrato.reset();
        self.vibrato_depth = params.float_or(&VIBRATO_DEPTH, p.vibrato_depth);
        self.stretch = 1.0;
        self.counter = 0;

        match self.excitation {
            Excitation::Section => {
                self.voices = params.count(&VOICES).clamp(1, MAX_SECTION);
                let detune = params.float_or(&DETUNE, p.detune);
                for i in 0..self.voices {
                    let spread = if self.voices > 1 {
                        i as f64 / (self.voices - 1) as f64 * 2.0 - 1.0
                    } else {
                        0.0
                    };
                    self.section_ratios[i] = semitones_to_ratio(spread * detune / 100.0);
                    self.section[i].set_frequency(frequency * self.section_ratios[i], sr);
                    self.section[i].set_phase(self.rng.f64());
                }
                let cutoff = 800.0 * 2.0_f64.powf(brightness * 4.0);
                for filter in self.tone.iter_mut() {
                    filter.set_lowpass(cutoff, 0.707, sr);
                }
            }
            Excitation::Bowed => {
                let w = &mut self.waveguide;
                w.clear();
                w.tune(frequency, sr);
                w.slope = 5.0 - 4.0 * params.float_or(&BOW_PRESSURE, p.bow_pressure);
                w.max_velocity = 0.03 + 0.2 * self.velocity;
                w.bridge_filter.set_cutoff(1000.0 * 2.0_f64.powf(brightness * 3.0), sr);
            }
            Excitation::Plucked => {
                let decay = params.float_or(&DECAY, p.decay);
                self.pluck.clear();
                self.pluck.tune(frequency, sr);
                self.pluck.set_feedback(10.0_f64.powf(-3.0 / (decay * frequency.max(MIN_STRING_HZ))));
                self.pluck.set_damp(0.6 * (1.0 - brightness));
                self.pluck_filter.set_cutoff(1000.0 + 9000.0 * brightness * self.velocity, sr);
                self.pluck_filter.clear();
                self.burst = (sr / frequency.max(MIN_STRING_HZ)).round() as usize;
            }
        }

        for (filter, (f, q, gain)) in self.body.iter_mut().zip(p.body) {
            filter.set_peaking(f, q, gain, sr);
        }
        self.env.set_sample_rate(sr);
        self.env.set(
            params.float_or(&ATTACK, p.attack),
            0.0,
            1.0,
            params.float_or(&RELEASE, p.release),
        );
    }

    fn update_vibrato(&mut self, lfo: f64) {
        let ratio = semitones_to_ratio(lfo * self.vibrato_depth / 100.0);
        match self.excitation {
            Excitation::Section => {
                for i in 0..self.voices {
                    self.section[i].set_frequency(self.frequency * self.section_ratios[i] * ratio, self.sample_rate);
                }
            }
            // Higher pitch is a shorter string
            Excitation::Bowed => self.stretch = 1.0 / ratio,
            Excitation::Plucked => {}
        }
    }

    #[inline]
    fn next_frame(&mut self) -> (f64, f64) {
        let lfo = self.vibrato.sine();
        if self.counter % VIBRATO_UPDATE == 0 && self.vibrato_depth > 0.0 {
            self.update_vibrato(lfo);
        }
        self.counter = self.counter.wrapping_add(1);
        let env = self.env.process();

        let (l, r) = match self.excitation {
            Excitation::Section => {
                let (mut l, mut r) = (0.0, 0.0);
                for (i, osc) in self.section.iter_mut().take(self.voices).enumerate() {
                    let s = osc.saw();
                    if i % 2 == 0 {
                        l += s;
                        r += 0.5 * s;
                    } else {
                        r += s;
                        l += 0.5 * s;
                    }
                }
                let norm = 1.0 / (self.voices as f64).sqrt();
                let [tl, tr] = &mut self.tone;
                (tl.process(l * norm), tr.process(r * norm))
            }
            Excitation::Bowed => {
                let s = self.waveguide.tick(env, self.stretch) * BOWED_OUTPUT_GAIN;
                (s, s)
            }
            Excitation::Plucked => {
                let input = if self.burst > 0 {
                    self.burst -= 1;
                    self.pluck_filter.lowpass(self.rng.f64() * 2.0 - 1.0) * self.velocity
                } else {
                    0.0
                };
                let s = self.pluck.process(input);
                (s, s)
            }
        };
        let [bl, br] = &mut self.body;
        let gain = env * self.level;
        if self.excitation == Excitation::Section {
            (soft_clip(bl.process(l)) * gain, soft_clip(br.process(r)) * gain)
        } else {
            // Mono models share one body
            let s = soft_clip(bl.process(l)) * gain;
            (s, s)
        }
    }
}

impl SynthesizerEngine for StringsSynth {
    fn name(&self) -> &'static str {
        self.model.id()
    }

    fn note_on(&mut self, frequency: f64, velocity: f64, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(self.model, sr);
        }
        self.velocity = normalize_velocity(velocity);
        self.level = params.float(&GAIN) * (0.3 + 0.7 * self.velocity);
        self.configure(frequency, params);
        self.env.trigger();
    }

    fn note_off(&mut self, _ctx: &DspContext) {
        self.env.release();
    }

    fn render_into(&mut self, output: &mut AudioBuffer, _ctx: &DspContext) {
        render_frames(output, || {
            if !self.env.is_active() {
                return (0.0, 0.0);
            }
            self.next_frame()
        });
    }

    fn is_active(&self) -> bool {
        self.env.is_active()
    }

    fn reset(&mut self) {
        for osc in self.section.iter_mut() {
            osc.reset();
        }
        for filter in self.tone.iter_mut().chain(self.body.iter_mut()) {
            filter.clear();
        }
        self.waveguide.clear();
        self.pluck.clear();
        self.pluck_filter.clear();
        self.burst = 0;
        self.vibrato.reset();
        self.env.reset();
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = fastrand::Rng::with_seed(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::test_util::{SR, drain, fundamental, play};

    #[test]
    fn friction_sticks_near_zero_and_slips_away_from_it() {
        assert!(bow_friction(0.0, 3.0) > 0.9);
        assert!(bow_friction(0.5, 3.0) < 0.2);
        assert!(bow_friction(-0.5, 3.0) < 0.2);
        assert!(bow_friction(10.0, 5.0) >= 0.01);
    }

    #[test]
    fn every_model_sounds() {
        for model in StringsModel::ALL {
            let mut synth = StringsSynth::new(model, SR);
            let out = play(&mut synth, 196.0, &ParamSnapshot::new(), 22050);
            assert!(out.is_finite(), "{}", model.id());
            assert!(out.peak() > 0.01, "{} peak {}", model.id(), out.peak());
            assert!(out.peak() <= 1.0, "{} peak {}", model.id(), out.peak());
        }
    }

    #[test]
    fn ensemble_attack_is_slow() {
        let mut synth = StringsSynth::new(StringsModel::StringEnsemble, SR);
        let out = play(&mut synth, 220.0, &ParamSnapshot::new(), 22050);
        let first = AudioBuffer::from_mono(&out.left()[..1000], SR).rms();
        let later = AudioBuffer::from_mono(&out.left()[15000..16000], SR).rms();
        assert!(first < later * 0.3, "first {first} later {later}");
    }

    #[test]
    fn pizzicato_rings_at_the_note_and_decays() {
        let mut synth = StringsSynth::new(StringsModel::Pizzicato, SR);
        let out = play(&mut synth, 220.0, &ParamSnapshot::new(), 44100);
        let f = fundamental(&AudioBuffer::from_mono(&out.left()[1000..9000], SR), 80.0, 1000.0);
        assert!((f - 220.0).abs() < 8.0, "got {f}");
        let early = AudioBuffer::from_mono(&out.left()[1000..5000], SR).rms();
        let late = AudioBuffer::from_mono(&out.left()[40000..44000], SR).rms();
        assert!(late < early * 0.1);
    }

    #[test]
    fn plucks_differ_by_seed_only_when_reseeded() {
        let render = |seed: Option<u64>| {
            let mut synth = StringsSynth::new(StringsModel::Harp, SR);
            if let Some(seed) = seed {
                synth.reseed(seed);
            }
            play(&mut synth, 330.0, &ParamSnapshot::new(), 2048)
        };
        assert_eq!(render(None), render(None));
        assert_ne!(render(Some(1)), render(Some(2)));
    }

    #[test]
    fn bowed_release_goes_idle() {
        let mut synth = StringsSynth::new(StringsModel::Cello, SR);
        play(&mut synth, 130.8, &ParamSnapshot::new(), 4096);
        assert!(synth.is_active());
        assert!(drain(&mut synth, 44100).is_some());
    }
}
