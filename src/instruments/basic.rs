//! Basic voice: one oscillator shaped by an ADSR envelope.

use crate::dsp::util::{normalize_velocity, semitones_to_ratio};
use crate::dsp::{Adsr, AudioBuffer, DspContext, Oscillator, Waveform};
use crate::params::{ParamChoice, ParamSnapshot, ParamSpec};
use crate::unit::SynthesizerEngine;

use super::render_frames;

const WAVEFORM: ParamSpec = ParamSpec::choice("waveform", Waveform::OPTIONS, 3);
const DETUNE: ParamSpec = ParamSpec::float("detune", -100.0, 100.0, 0.0);
const ATTACK: ParamSpec = ParamSpec::float("attack", 0.0, 10.0, 0.01);
const DECAY: ParamSpec = ParamSpec::float("decay", 0.0, 10.0, 0.1);
const SUSTAIN: ParamSpec = ParamSpec::float("sustain", 0.0, 1.0, 0.7);
const RELEASE: ParamSpec = ParamSpec::float("release", 0.0, 10.0, 0.3);
const GAIN: ParamSpec = ParamSpec::float("gain", 0.0, 1.0, 0.8);

pub const PARAMS: &[ParamSpec] = &[WAVEFORM, DETUNE, ATTACK, DECAY, SUSTAIN, RELEASE, GAIN];

/// A single voice: one oscillator shaped by an ADSR envelope.
#[derive(Debug, Clone)]
pub struct BasicVoice {
    sample_rate: f64,
    oscillator: Oscillator,
    envelope: Adsr,
    waveform: Waveform,
    /// Velocity times output gain.
    level: f64,
}

impl BasicVoice {
    pub fn new(sample_rate: f64) -> Self {
        BasicVoice {
            sample_rate,
            oscillator: Oscillator::new(),
            envelope: Adsr::new(sample_rate),
            waveform: Waveform::Triangle,
            level: 0.0,
        }
    }
}

impl SynthesizerEngine for BasicVoice {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn note_on(&mut self, frequency: f64, velocity: f64, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            self.sample_rate = sr;
            self.envelope.set_sample_rate(sr);
        }
        self.waveform = params.choice(&WAVEFORM);
        let detune = semitones_to_ratio(params.float(&DETUNE) / 100.0);
        self.oscillator.set_frequency(frequency * detune, sr);
        self.oscillator.reset();
        self.envelope.set(
            params.float(&ATTACK),
            params.float(&DECAY),
            params.float(&SUSTAIN),
            params.float(&RELEASE),
        );
        self.envelope.trigger();
        self.level = normalize_velocity(velocity) * params.float(&GAIN);
    }

    fn note_off(&mut self, _ctx: &DspContext) {
        self.envelope.release();
    }

    fn render_into(&mut self, output: &mut AudioBuffer, _ctx: &DspContext) {
        let Self {
            oscillator,
            envelope,
            waveform,
            level,
            ..
        } = self;
        render_frames(output, || {
            if !envelope.is_active() {
                return (0.0, 0.0);
            }
            let s = oscillator.next(*waveform) * envelope.process() * *level;
            (s, s)
        });
    }

    fn is_active(&self) -> bool {
        self.envelope.is_active()
    }

    fn reset(&mut self) {
        self.oscillator.reset();
        self.envelope.reset();
    }

    fn reseed(&mut self, seed: u64) {
        self.oscillator.reseed(seed);
    }
}
