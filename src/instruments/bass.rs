//! Bass synthesizers: sub layering, velocity drive and LFO-swept filters.
//!
//! The wobble and growl models tie their LFO to the note, so the sweep
//! stays rhythmically related to the pitch across the keyboard.

use crate::dsp::util::{normalize_velocity, semitones_to_ratio};
use crate::dsp::{
    Adsr, AudioBuffer, DspContext, LadderFilter, Lfo, Oscillator, StateVariableFilter, Waveform,
};
use crate::params::{ParamChoice, ParamSnapshot, ParamSpec};
use crate::unit::SynthesizerEngine;

use super::render_frames;

/// LFO rates are specified for this note and scaled from it.
pub const LFO_REFERENCE_HZ: f64 = 55.0;
const MAX_LFO_HZ: f64 = 20.0;
const FILTER_UPDATE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BassModel {
    SubBass,
    AnalogBass,
    ReeseBass,
    WobbleBass,
    GrowlBass,
    AcidBass,
}

#[derive(Debug, Clone, Copy)]
struct Preset {
    osc1: Waveform,
    osc2: Waveform,
    osc2_level: f64,
    detune: f64,
    sub_level: f64,
    cutoff: f64,
    resonance: f64,
    env_amount: f64,
    filter_decay: f64,
    filter_sustain: f64,
    drive: f64,
    lfo_rate: f64,
    lfo_depth: f64,
    /// Band-pass vowel sweep instead of a low-pass.
    growl: bool,
    attack: f64,
    release: f64,
}

impl BassModel {
    pub const ALL: [BassModel; 6] = [
        BassModel::SubBass,
        BassModel::AnalogBass,
        BassModel::ReeseBass,
        BassModel::WobbleBass,
        BassModel::GrowlBass,
        BassModel::AcidBass,
    ];

    pub fn id(self) -> &'static str {
        match self {
            BassModel::SubBass => "sub-bass",
            BassModel::AnalogBass => "analog-bass",
            BassModel::ReeseBass => "reese-bass",
            BassModel::WobbleBass => "wobble-bass",
            BassModel::GrowlBass => "growl-bass",
            BassModel::AcidBass => "acid-bass",
        }
    }

    fn preset(self) -> Preset {
        let base = Preset {
            osc1: Waveform::Sawtooth,
            osc2: Waveform::Sawtooth,
            osc2_level: 0.5,
            detune: 5.0,
            sub_level: 0.4,
            cutoff: 800.0,
            resonance: 0.3,
            env_amount: 0.5,
            filter_decay: 0.3,
            filter_sustain: 0.2,
            drive: 1.5,
            lfo_rate: 0.0,
            lfo_depth: 0.0,
            growl: false,
            attack: 0.003,
            release: 0.15,
        };
        match self {
            BassModel::SubBass => Preset {
                osc1: Waveform::Sine,
                osc2_level: 0.0,
                sub_level: 0.5,
                cutoff: 400.0,
                resonance: 0.1,
                env_amount: 0.1,
                drive: 1.2,
                ..base
            },
            BassModel::AnalogBass => base,
            BassModel::ReeseBass => Preset {
                osc2_level: 1.0,
                detune: 25.0,
                sub_level: 0.3,
                cutoff: 1200.0,
                resonance: 0.2,
                env_amount: 0.2,
                drive: 2.0,
                ..base
            },
            BassModel::WobbleBass => Preset {
                osc2: Waveform::Square,
                osc2_level: 0.7,
                cutoff: 300.0,
                resonance: 0.6,
                env_amount: 0.1,
                drive: 2.0,
                lfo_rate: 2.0,
                lfo_depth: 1.0,
                ..base
            },
            BassModel::GrowlBass => Preset {
                osc2: Waveform::Square,
                osc2_level: 0.6,
                detune: 12.0,
                cutoff: 700.0,
                resonance: 0.7,
                env_amount: 0.2,
                drive: 3.0,
                lfo_rate: 4.0,
                lfo_depth: 0.8,
                growl: true,
                ..base
            },
            BassModel::AcidBass => Preset {
                osc2_level: 0.0,
                sub_level: 0.0,
                cutoff: 500.0,
                resonance: 0.85,
                env_amount: 0.9,
                filter_decay: 0.15,
                filter_sustain: 0.0,
                drive: 2.0,
                ..base
            },
        }
    }
}

impl ParamChoice for BassModel {
    const OPTIONS: &'static [&'static str] =
        &["sub-bass", "analog-bass", "reese-bass", "wobble-bass", "growl-bass", "acid-bass"];

    fn from_index(index: usize) -> Self {
        BassModel::ALL.get(index).copied().unwrap_or(BassModel::SubBass)
    }
}

const CUTOFF: ParamSpec = ParamSpec::float("cutoff", 20.0, 20000.0, 800.0);
const RESONANCE: ParamSpec = ParamSpec::float("resonance", 0.0, 1.0, 0.3);
const ENV_AMOUNT: ParamSpec = ParamSpec::float("envAmount", 0.0, 1.0, 0.5);
const FILTER_DECAY: ParamSpec = ParamSpec::float("filterDecay", 0.0, 5.0, 0.3);
const SUB_LEVEL: ParamSpec = ParamSpec::float("subLevel", 0.0, 1.0, 0.4);
const DETUNE: ParamSpec = ParamSpec::float("detune", 0.0, 100.0, 5.0);
const DRIVE: ParamSpec = ParamSpec::float("drive", 1.0, 10.0, 1.5);
const LFO_RATE: ParamSpec = ParamSpec::float("lfoRate", 0.0, 10.0, 0.0);
const LFO_DEPTH: ParamSpec = ParamSpec::float("lfoDepth", 0.0, 1.0, 0.0);
const ATTACK: ParamSpec = ParamSpec::float("attack", 0.0, 5.0, 0.003);
const RELEASE: ParamSpec = ParamSpec::float("release", 0.0, 5.0, 0.15);
const GAIN: ParamSpec = ParamSpec::float("gain", 0.0, 1.0, 0.7);

pub const PARAMS: &[ParamSpec] = &[
    CUTOFF,
    RESONANCE,
    ENV_AMOUNT,
    FILTER_DECAY,
    SUB_LEVEL,
    DETUNE,
    DRIVE,
    LFO_RATE,
    LFO_DEPTH,
    ATTACK,
    RELEASE,
    GAIN,
];

#[derive(Debug, Clone)]
pub struct BassSynth {
    model: BassModel,
    sample_rate: f64,
    preset: Preset,
    osc: [Oscillator; 2],
    sub: Oscillator,
    ladder: LadderFilter,
    growl: StateVariableFilter,
    filter_env: Adsr,
    amp_env: Adsr,
    lfo: Lfo,
    lfo_hz: f64,
    cutoff: f64,
    resonance: f64,
    env_amount: f64,
    lfo_depth: f64,
    sub_level: f64,
    osc2_level: f64,
    drive: f64,
    level: f64,
    counter: usize,
}

impl BassSynth {
    pub fn new(model: BassModel, sample_rate: f64) -> Self {
        let preset = model.preset();
        BassSynth {
            model,
            sample_rate,
            preset,
            osc: [Oscillator::with_seed(1), Oscillator::with_seed(2)],
            sub: Oscillator::new(),
            ladder: LadderFilter::new(),
            growl: StateVariableFilter::new(),
            filter_env: Adsr::new(sample_rate),
            amp_env: Adsr::new(sample_rate),
            lfo: Lfo::new(),
            lfo_hz: 0.0,
            cutoff: preset.cutoff,
            resonance: preset.resonance,
            env_amount: preset.env_amount,
            lfo_depth: preset.lfo_depth,
            sub_level: preset.sub_level,
            osc2_level: preset.osc2_level,
            drive: preset.drive,
            level: 0.0,
            counter: 0,
        }
    }

    pub fn model(&self) -> BassModel {
        self.model
    }

    /// Effective LFO rate for the current note in Hz.
    pub fn lfo_rate(&self) -> f64 {
        self.lfo_hz
    }

    #[inline]
    fn update_filter(&mut self, fenv: f64, lfo: f64) {
        let octaves = self.env_amount * fenv * 4.0 + self.lfo_depth * lfo * 2.0;
        let cutoff = self.cutoff * 2.0_f64.powf(octaves);
        if self.preset.growl {
            self.growl.set(cutoff, self.resonance, self.sample_rate);
        } else {
            self.ladder.set(cutoff, self.resonance, self.sample_rate);
        }
    }
}

impl SynthesizerEngine for BassSynth {
    fn name(&self) -> &'static str {
        self.model.id()
    }

    fn note_on(&mut self, frequency: f64, velocity: f64, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        self.sample_rate = sr;
        let p = self.preset;
        let velocity = normalize_velocity(velocity);

        let detune = semitones_to_ratio(params.float_or(&DETUNE, p.detune) / 100.0);
        self.osc[0].set_frequency(frequency, sr);
        self.osc[1].set_frequency(frequency * detune, sr);
        self.sub.set_frequency(frequency * 0.5, sr);
        for osc in self.osc.iter_mut() {
            osc.reset();
        }
        self.sub.reset();

        self.cutoff = params.float_or(&CUTOFF, p.cutoff);
        self.resonance = params.float_or(&RESONANCE, p.resonance);
        // Harder notes open the filter further
        self.env_amount = params.float_or(&ENV_AMOUNT, p.env_amount) * (0.5 + 0.5 * velocity);
        self.lfo_depth = params.float_or(&LFO_DEPTH, p.lfo_depth);
        self.sub_level = params.float_or(&SUB_LEVEL, p.sub_level);
        self.osc2_level = p.osc2_level;
        let drive = params.float_or(&DRIVE, p.drive);
        self.drive = 1.0 + (drive - 1.0) * (0.5 + velocity);
        self.level = params.float(&GAIN) * (0.4 + 0.6 * velocity);

        self.lfo_hz = (params.float_or(&LFO_RATE, p.lfo_rate) * frequency / LFO_REFERENCE_HZ).min(MAX_LFO_HZ);
        self.lfo.set_rate(self.lfo_hz, sr);
        self.lfo.reset();

        self.filter_env.set_sample_rate(sr);
        self.filter_env.set(
            0.001,
            params.float_or(&FILTER_DECAY, p.filter_decay),
            p.filter_sustain,
            p.release,
        );
        self.amp_env.set_sample_rate(sr);
        self.amp_env.set(
            params.float_or(&ATTACK, p.attack),
            0.0,
            1.0,
            params.float_or(&RELEASE, p.release),
        );
        self.filter_env.trigger();
        self.amp_env.trigger();
        self.counter = 0;
    }

    fn note_off(&mut self, _ctx: &DspContext) {
        self.filter_env.release();
        self.amp_env.release();
    }

    fn render_into(&mut self, output: &mut AudioBuffer, _ctx: &DspContext) {
        let (wave1, wave2) = (self.preset.osc1, self.preset.osc2);
        render_frames(output, || {
            if !self.amp_env.is_active() {
                return (0.0, 0.0);
            }
            let fenv = self.filter_env.process();
            let lfo = self.lfo.sine();
            if self.counter % FILTER_UPDATE == 0 {
                self.update_filter(fenv, lfo);
            }
            self.counter = self.counter.wrapping_add(1);

            let mut x = self.osc[0].next(wave1);
            if self.osc2_level > 0.0 {
                x += self.osc[1].next(wave2) * self.osc2_level;
            }
            x /= 1.0 + self.osc2_level;
            let filtered = if self.preset.growl {
                let out = self.growl.tick(x);
                out.bandpass * 1.5 + out.lowpass * 0.5
            } else {
                self.ladder.process(x)
            };
            // Sub bypasses the filter so the low end stays solid
            let body = filtered + self.sub.sine() * self.sub_level;
            let driven = (body * self.drive).tanh() / self.drive.tanh();
            let s = driven * self.amp_env.process() * self.level;
            (s, s)
        });
    }

    fn is_active(&self) -> bool {
        self.amp_env.is_active()
    }

    fn reset(&mut self) {
        for osc in self.osc.iter_mut() {
            osc.reset();
        }
        self.sub.reset();
        self.ladder.clear();
        self.growl.clear();
        self.filter_env.reset();
        self.amp_env.reset();
        self.lfo.reset();
        self.counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::test_util::{SR, drain, fundamental, play};

    #[test]
    fn every_model_sounds() {
        for model in BassModel::ALL {
            let mut synth = BassSynth::new(model, SR);
            let out = play(&mut synth, 55.0, &ParamSnapshot::new(), 22050);
            assert!(out.is_finite(), "{}", model.id());
            assert!(out.peak() > 0.05, "{} peak {}", model.id(), out.peak());
            assert!(out.peak() <= 1.0, "{} peak {}", model.id(), out.peak());
        }
    }

    #[test]
    fn sub_bass_sits_on_the_note() {
        let params = ParamSnapshot::new().with("subLevel", 0.0);
        let mut synth = BassSynth::new(BassModel::SubBass, SR);
        let out = play(&mut synth, 82.4, &params, 22050);
        let f = fundamental(&out, 40.0, 400.0);
        assert!((f - 82.4).abs() < 2.0, "got {f}");
    }

    #[test]
    fn wobble_rate_follows_the_note() {
        let ctx = DspContext::new(SR);
        let mut synth = BassSynth::new(BassModel::WobbleBass, SR);
        synth.note_on(55.0, 1.0, &ParamSnapshot::new(), &ctx);
        let low = synth.lfo_rate();
        synth.note_on(110.0, 1.0, &ParamSnapshot::new(), &ctx);
        let high = synth.lfo_rate();
        assert!((low - 2.0).abs() < 1e-12);
        assert!((high - 2.0 * low).abs() < 1e-12);
    }

    #[test]
    fn velocity_drives_harder() {
        let ctx = DspContext::new(SR);
        let params = ParamSnapshot::new().with("gain", 1.0);
        let mut soft = BassSynth::new(BassModel::ReeseBass, SR);
        soft.note_on(55.0, 0.1, &params, &ctx);
        let mut hard = BassSynth::new(BassModel::ReeseBass, SR);
        hard.note_on(55.0, 1.0, &params, &ctx);
        assert!(hard.drive > soft.drive);
        assert!(hard.render(4096, &ctx).rms() > soft.render(4096, &ctx).rms());
    }

    #[test]
    fn release_goes_idle() {
        let mut synth = BassSynth::new(BassModel::AcidBass, SR);
        play(&mut synth, 110.0, &ParamSnapshot::new(), 2048);
        assert!(drain(&mut synth, 44100).is_some());
    }
}
