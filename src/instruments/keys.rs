//! Pianos, electric pianos and other keyboards.
//!
//! Additive: a stack of up to [`MAX_PARTIALS`] sine partials, each with its
//! own exponential decay, whose count and spectral tilt follow velocity.
//! A short filtered-noise hammer transient, a comb-filter string
//! resonator, a quieter sympathetic comb tuned a fifth up, and two peaking
//! filters for the body finish the voice.

use crate::dsp::util::{normalize_velocity, soft_clip};
use crate::dsp::{Adsr, AudioBuffer, BiquadFilter, CombFilter, DspContext, Oscillator};
use crate::params::{ParamChoice, ParamSnapshot, ParamSpec};
use crate::unit::SynthesizerEngine;

use super::render_frames;

pub const MAX_PARTIALS: usize = 16;

/// Lowest note the string combs can be tuned to.
const MIN_COMB_HZ: f64 = 20.0;
/// Hammer noise fades by this factor per millisecond.
const HAMMER_MS_DECAY: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeysModel {
    GrandPiano,
    UprightPiano,
    ElectricPiano,
    Wurlitzer,
    Harpsichord,
    Clavinet,
    Organ,
}

#[derive(Debug, Clone, Copy)]
enum Partials {
    /// Integer harmonics stretched by string stiffness `b`:
    /// `f_n = n f sqrt(1 + b n^2)`, amplitudes `n^-rolloff`.
    Harmonic { stiffness: f64, rolloff: f64 },
    /// Explicit (ratio, amplitude) pairs.
    Fixed(&'static [(f64, f64)]),
}

const EP_PARTIALS: &[(f64, f64)] = &[(1.0, 1.0), (2.0, 0.28), (3.0, 0.1), (4.0, 0.06), (7.0, 0.05), (14.0, 0.09)];
const WURLI_PARTIALS: &[(f64, f64)] = &[(1.0, 1.0), (2.0, 0.18), (3.0, 0.4), (5.0, 0.18), (7.0, 0.08), (9.0, 0.04)];
const ORGAN_PARTIALS: &[(f64, f64)] = &[
    (0.5, 0.8),
    (1.5, 0.6),
    (1.0, 1.0),
    (2.0, 0.8),
    (3.0, 0.5),
    (4.0, 0.4),
    (5.0, 0.2),
    (6.0, 0.2),
    (8.0, 0.3),
];

#[derive(Debug, Clone, Copy)]
struct Preset {
    partials: Partials,
    /// Partials sounding at zero and full velocity.
    partial_range: (usize, usize),
    /// Fundamental decay in seconds; `None` sustains like an organ.
    decay: Option<f64>,
    /// Upper partials decay this much faster per partial number.
    decay_slope: f64,
    brightness: f64,
    hammer: f64,
    resonance: f64,
    sympathetic: f64,
    body: [(f64, f64, f64); 2],
    release: f64,
}

impl KeysModel {
    pub const ALL: [KeysModel; 7] = [
        KeysModel::GrandPiano,
        KeysModel::UprightPiano,
        KeysModel::ElectricPiano,
        KeysModel::Wurlitzer,
        KeysModel::Harpsichord,
        KeysModel::Clavinet,
        KeysModel::Organ,
    ];

    pub fn id(self) -> &'static str {
        match self {
            KeysModel::GrandPiano => "grand-piano",
            KeysModel::UprightPiano => "upright-piano",
            KeysModel::ElectricPiano => "electric-piano",
            KeysModel::Wurlitzer => "wurlitzer",
            KeysModel::Harpsichord => "harpsichord",
            KeysModel::Clavinet => "clavinet",
            KeysModel::Organ => "organ",
        }
    }

    fn preset(self) -> Preset {
        match self {
            KeysModel::GrandPiano => Preset {
                partials: Partials::Harmonic {
                    stiffness: 0.0004,
                    rolloff: 1.1,
                },
                partial_range: (6, 16),
                decay: Some(6.0),
                decay_slope: 0.35,
                brightness: 0.6,
                hammer: 0.3,
                resonance: 0.25,
                sympathetic: 0.08,
                body: [(120.0, 1.0, 3.0), (2500.0, 1.5, 2.0)],
                release: 0.35,
            },
            KeysModel::UprightPiano => Preset {
                partials: Partials::Harmonic {
                    stiffness: 0.0008,
                    rolloff: 1.2,
                },
                partial_range: (5, 14),
                decay: Some(4.0),
                decay_slope: 0.45,
                brightness: 0.5,
                hammer: 0.4,
                resonance: 0.3,
                sympathetic: 0.05,
                body: [(250.0, 1.2, 4.0), (1800.0, 1.2, 2.0)],
                release: 0.25,
            },
            KeysModel::ElectricPiano => Preset {
                partials: Partials::Fixed(EP_PARTIALS),
                partial_range: (3, 6),
                decay: Some(3.0),
                decay_slope: 0.8,
                brightness: 0.5,
                hammer: 0.05,
                resonance: 0.0,
                sympathetic: 0.0,
                body: [(400.0, 0.8, 2.0), (3000.0, 1.0, -2.0)],
                release: 0.2,
            },
            KeysModel::Wurlitzer => Preset {
                partials: Partials::Fixed(WURLI_PARTIALS),
                partial_range: (3, 6),
                decay: Some(2.5),
                decay_slope: 0.5,
                brightness: 0.6,
                hammer: 0.08,
                resonance: 0.0,
                sympathetic: 0.0,
                body: [(800.0, 1.0, 3.0), (4000.0, 1.0, -3.0)],
                release: 0.15,
            },
            KeysModel::Harpsichord => Preset {
                partials: Partials::Harmonic {
                    stiffness: 0.0001,
                    rolloff: 0.6,
                },
                partial_range: (12, 16),
                decay: Some(2.5),
                decay_slope: 0.25,
                brightness: 0.9,
                hammer: 0.2,
                resonance: 0.4,
                sympathetic: 0.1,
                body: [(300.0, 1.0, 3.0), (3500.0, 2.0, 4.0)],
                release: 0.3,
            },
            KeysModel::Clavinet => Preset {
                partials: Partials::Harmonic {
                    stiffness: 0.0002,
                    rolloff: 0.8,
                },
                partial_range: (8, 14),
                decay: Some(1.2),
                decay_slope: 0.3,
                brightness: 0.8,
                hammer: 0.15,
                resonance: 0.2,
                sympathetic: 0.0,
                body: [(1500.0, 1.5, 5.0), (5000.0, 1.0, -3.0)],
                release: 0.05,
            },
            KeysModel::Organ => Preset {
                partials: Partials::Fixed(ORGAN_PARTIALS),
                partial_range: (9, 9),
                decay: None,
                decay_slope: 0.0,
                brightness: 0.5,
                hammer: 0.05,
                resonance: 0.0,
                sympathetic: 0.0,
                body: [(200.0, 0.7, 1.0), (3000.0, 1.0, 0.0)],
                release: 0.08,
            },
        }
    }
}

impl ParamChoice for KeysModel {
    const OPTIONS: &'static [&'static str] = &[
        "grand-piano",
        "upright-piano",
        "electric-piano",
        "wurlitzer",
        "harpsichord",
        "clavinet",
        "organ",
    ];

    fn from_index(index: usize) -> Self {
        KeysModel::ALL.get(index).copied().unwrap_or(KeysModel::GrandPiano)
    }
}

const BRIGHTNESS: ParamSpec = ParamSpec::float("brightness", 0.0, 1.0, 0.6);
const DECAY: ParamSpec = ParamSpec::float("decay", 0.1, 30.0, 6.0);
const RELEASE: ParamSpec = ParamSpec::float("release", 0.01, 5.0, 0.35);
const RESONANCE: ParamSpec = ParamSpec::float("resonance", 0.0, 1.0, 0.25);
const SYMPATHETIC: ParamSpec = ParamSpec::float("sympathetic", 0.0, 1.0, 0.08);
const HAMMER: ParamSpec = ParamSpec::float("hammer", 0.0, 1.0, 0.3);
const GAIN: ParamSpec = ParamSpec::float("gain", 0.0, 1.0, 0.7);

pub const PARAMS: &[ParamSpec] = &[BRIGHTNESS, DECAY, RELEASE, RESONANCE, SYMPATHETIC, HAMMER, GAIN];

#[derive(Debug, Clone)]
struct Partial {
    osc: Oscillator,
    amp: f64,
    /// Per-sample decay multiplier.
    decay: f64,
}

#[derive(Debug, Clone)]
pub struct KeysSynth {
    model: KeysModel,
    sample_rate: f64,
    partials: [Partial; MAX_PARTIALS],
    active_partials: usize,
    string: CombFilter,
    sympathetic: CombFilter,
    body: [BiquadFilter; 2],
    hammer_filter: BiquadFilter,
    env: Adsr,
    hammer_level: f64,
    hammer_decay: f64,
    resonance: f64,
    sympathetic_level: f64,
    level: f64,
    rng: fastrand::Rng,
}

impl KeysSynth {
    pub fn new(model: KeysModel, sample_rate: f64) -> Self {
        let comb_capacity = (sample_rate / MIN_COMB_HZ).ceil() as usize;
        KeysSynth {
            model,
            sample_rate,
            partials: std::array::from_fn(|_| Partial {
                osc: Oscillator::new(),
                amp: 0.0,
                decay: 1.0,
            }),
            active_partials: 0,
            string: CombFilter::new(comb_capacity),
            sympathetic: CombFilter::new(comb_capacity),
            body: [BiquadFilter::new(), BiquadFilter::new()],
            hammer_filter: BiquadFilter::new(),
            env: Adsr::new(sample_rate),
            hammer_level: 0.0,
            hammer_decay: 0.0,
            resonance: 0.0,
            sympathetic_level: 0.0,
            level: 0.0,
            rng: fastrand::Rng::with_seed(0x4B45_5953),
        }
    }

    pub fn model(&self) -> KeysModel {
        self.model
    }

    /// (ratio, amplitude) of partial `n` (0-based), before velocity tilt.
    fn partial(partials: Partials, n: usize) -> Option<(f64, f64)> {
        match partials {
            Partials::Harmonic { stiffness, rolloff } => {
                let k = (n + 1) as f64;
                Some((k * (1.0 + stiffness * k * k).sqrt(), k.powf(-rolloff)))
            }
            Partials::Fixed(table) => table.get(n).copied(),
        }
    }

    fn configure(&mut self, frequency: f64, velocity: f64, params: &ParamSnapshot) {
        let p = self.model.preset();
        let sr = self.sample_rate;
        let brightness = params.float_or(&BRIGHTNESS, p.brightness);
        let decay = p.decay.map(|d| params.float_or(&DECAY, d));

        let (lo, hi) = p.partial_range;
        let count = (lo as f64 + (hi - lo) as f64 * velocity).round() as usize;
        // Harder hits and brighter settings flatten the spectral tilt
        let tilt = (0.45 + 0.55 * velocity * (0.5 + brightness)).min(1.0);

        let mut total = 0.0;
        self.active_partials = 0;
        for (n, partial) in self.partials.iter_mut().enumerate().take(count.min(MAX_PARTIALS)) {
            let Some((ratio, amp)) = Self::partial(p.partials, n) else {
                break;
            };
            let freq = frequency * ratio;
            if freq >= sr * 0.45 {
                break;
            }
            partial.osc.set_frequency(freq, sr);
            partial.osc.reset();
            partial.amp = amp * tilt.powi(n as i32);
            partial.decay = match decay {
                Some(d) => {
                    let t60 = d / (1.0 + n as f64 * p.decay_slope);
                    (-6.9 / (t60 * sr)).exp()
                }
                None => 1.0,
            };
            total += partial.amp;
            self.active_partials = n + 1;
        }
        if total > 0.0 {
            for partial in self.partials.iter_mut().take(self.active_partials) {
                partial.amp /= total;
            }
        }

        let comb_feedback = match decay {
            Some(d) => 10.0_f64.powf(-3.0 / (d.min(4.0) * frequency.max(MIN_COMB_HZ))),
            None => 0.9,
        };
        self.string.tune(frequency, sr);
        self.string.set_feedback(comb_feedback);
        self.string.set_damp(0.4 - 0.3 * brightness);
        self.string.clear();
        self.sympathetic.tune(frequency * 1.5, sr);
        self.sympathetic.set_feedback(comb_feedback);
        self.sympathetic.set_damp(0.5);
        self.sympathetic.clear();
        self.resonance = params.float_or(&RESONANCE, p.resonance);
        self.sympathetic_level = params.float_or(&SYMPATHETIC, p.sympathetic);

        for (filter, (f, q, gain)) in self.body.iter_mut().zip(p.body) {
            filter.set_peaking(f, q, gain, sr);
        }
        self.hammer_filter
            .set_bandpass((frequency * 4.0).clamp(500.0, 6000.0), 0.8, sr);
        self.hammer_level = params.float_or(&HAMMER, p.hammer) * (0.3 + 0.7 * velocity);
        self.hammer_decay = HAMMER_MS_DECAY.powf(1000.0 / sr);

        self.env.set_sample_rate(sr);
        self.env.set(0.001, 0.0, 1.0, params.float_or(&RELEASE, p.release));
    }
}

impl SynthesizerEngine for KeysSynth {
    fn name(&self) -> &'static str {
        self.model.id()
    }

    fn note_on(&mut self, frequency: f64, velocity: f64, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(self.model, sr);
        }
        let velocity = normalize_velocity(velocity);
        self.configure(frequency, velocity, params);
        self.level = (0.2 + 0.8 * velocity) * params.float(&GAIN);
        self.env.trigger();
    }

    fn note_off(&mut self, _ctx: &DspContext) {
        self.env.release();
    }

    fn render_into(&mut self, output: &mut AudioBuffer, _ctx: &DspContext) {
        let Self {
            partials,
            active_partials,
            string,
            sympathetic,
            body,
            hammer_filter,
            env,
            hammer_level,
            hammer_decay,
            resonance,
            sympathetic_level,
            level,
            rng,
            ..
        } = self;
        render_frames(output, || {
            if !env.is_active() {
                return (0.0, 0.0);
            }
            let mut x = 0.0;
            for partial in partials.iter_mut().take(*active_partials) {
                x += partial.osc.sine() * partial.amp;
                partial.amp *= partial.decay;
            }
            if *hammer_level > 1e-6 {
                x += hammer_filter.process(rng.f64() * 2.0 - 1.0) * *hammer_level;
                *hammer_level *= *hammer_decay;
            }
            let excitation = x * 0.1;
            x += string.process(excitation) * *resonance + sympathetic.process(excitation) * *sympathetic_level;
            for filter in body.iter_mut() {
                x = filter.process(x);
            }
            let s = soft_clip(x) * env.process() * *level;
            (s, s)
        });
    }

    fn is_active(&self) -> bool {
        self.env.is_active()
    }

    fn reset(&mut self) {
        for partial in self.partials.iter_mut() {
            partial.osc.reset();
            partial.amp = 0.0;
        }
        self.active_partials = 0;
        self.string.clear();
        self.sympathetic.clear();
        for filter in self.body.iter_mut() {
            filter.clear();
        }
        self.hammer_filter.clear();
        self.hammer_level = 0.0;
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

    fn motion(buffer: &AudioBuffer) -> f32 {
        buffer.left().windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f32>() / buffer.rms().max(1e-9)
    }

    #[test]
    fn every_model_sounds() {
        for model in KeysModel::ALL {
            let mut synth = KeysSynth::new(model, SR);
            let out = play(&mut synth, 261.63, &ParamSnapshot::new(), 8192);
            assert!(out.is_finite(), "{}", model.id());
            assert!(out.peak() > 0.05, "{} peak {}", model.id(), out.peak());
            assert!(out.peak() <= 1.0, "{} peak {}", model.id(), out.peak());
        }
    }

    #[test]
    fn piano_pitch_is_the_fundamental() {
        let mut synth = KeysSynth::new(KeysModel::GrandPiano, SR);
        let out = play(&mut synth, 220.0, &ParamSnapshot::new().with("hammer", 0.0), 8192);
        let f = fundamental(&out, 80.0, 1000.0);
        assert!((f - 220.0).abs() < 3.0, "got {f}");
    }

    #[test]
    fn piano_decays_while_held() {
        let mut synth = KeysSynth::new(KeysModel::Clavinet, SR);
        let out = play(&mut synth, 220.0, &ParamSnapshot::new(), 88200);
        let early = AudioBuffer::from_mono(&out.left()[1000..5000], SR).rms();
        let late = AudioBuffer::from_mono(&out.left()[80000..84000], SR).rms();
        assert!(late < early * 0.2, "early {early} late {late}");
    }

    #[test]
    fn organ_sustains_while_held() {
        let mut synth = KeysSynth::new(KeysModel::Organ, SR);
        let out = play(&mut synth, 220.0, &ParamSnapshot::new(), 88200);
        let early = AudioBuffer::from_mono(&out.left()[4000..8000], SR).rms();
        let late = AudioBuffer::from_mono(&out.left()[80000..84000], SR).rms();
        assert!((late / early - 1.0).abs() < 0.1, "early {early} late {late}");
    }

    #[test]
    fn velocity_brightens() {
        let ctx = DspContext::new(SR);
        let params = ParamSnapshot::new().with("hammer", 0.0).with("resonance", 0.0).with("sympathetic", 0.0);
        let mut soft = KeysSynth::new(KeysModel::GrandPiano, SR);
        soft.note_on(220.0, 0.2, &params, &ctx);
        let mut hard = KeysSynth::new(KeysModel::GrandPiano, SR);
        hard.note_on(220.0, 1.0, &params, &ctx);
        assert!(hard.active_partials > soft.active_partials);
        assert!(motion(&hard.render(4096, &ctx)) > motion(&soft.render(4096, &ctx)));
    }

    #[test]
    fn release_goes_idle() {
        let mut synth = KeysSynth::new(KeysModel::UprightPiano, SR);
        play(&mut synth, 440.0, &ParamSnapshot::new(), 1024);
        assert!(drain(&mut synth, 44100).is_some());
    }
}
