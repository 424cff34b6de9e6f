//! Frequency-modulation synthesis.
//!
//! A voice is a small graph of sine operators. `matrix[source][target]` is
//! the modulation depth in radians that `source` feeds into `target`'s
//! phase; the diagonal holds each operator's self-feedback. Operators are
//! evaluated from the highest index down, so a modulator with a higher
//! index than its carrier is heard in the same sample. Links running the
//! other way read the previous sample.

use crate::dsp::util::{normalize_velocity, semitones_to_ratio};
use crate::dsp::{Adsr, AudioBuffer, DspContext, Oscillator};
use crate::params::{ParamChoice, ParamSnapshot, ParamSpec};
use crate::unit::SynthesizerEngine;

use super::render_frames;

pub const MAX_OPERATORS: usize = 6;

pub type ModMatrix = [[f64; MAX_OPERATORS]; MAX_OPERATORS];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmModel {
    Dx7,
    Fm8,
    Modular,
}

impl FmModel {
    pub const ALL: [FmModel; 3] = [FmModel::Dx7, FmModel::Fm8, FmModel::Modular];

    pub fn id(self) -> &'static str {
        match self {
            FmModel::Dx7 => "dx7",
            FmModel::Fm8 => "fm8",
            FmModel::Modular => "fm-modular",
        }
    }

    pub fn operator_count(self) -> usize {
        match self {
            FmModel::Dx7 | FmModel::Fm8 => 6,
            FmModel::Modular => 4,
        }
    }

    fn default_ratios(self) -> [f64; MAX_OPERATORS] {
        match self {
            FmModel::Dx7 => [1.0, 1.0, 1.0, 3.0, 1.0, 14.0],
            FmModel::Fm8 => [1.0, 2.0, 1.0, 0.5, 2.0, 4.0],
            FmModel::Modular => [1.0, 2.0, 3.0, 4.0, 1.0, 1.0],
        }
    }

    fn default_index(self) -> f64 {
        match self {
            FmModel::Dx7 => 2.0,
            FmModel::Fm8 => 1.5,
            FmModel::Modular => 1.0,
        }
    }
}

/// Named operator routings for the six-operator models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// 1←2, 3←4←5←6: two carriers, one long stack.
    Pairs,
    /// 1←2←3←4←5←6: a single carrier.
    Stack,
    /// 1←2, 3←4, 5←6: three carrier/modulator pairs.
    Trio,
    /// 1←(2,3,4,5,6): five modulators into one carrier.
    Branch,
    /// Every operator a carrier, 6 with feedback.
    Parallel,
}

impl ParamChoice for Algorithm {
    const OPTIONS: &'static [&'static str] = &["pairs", "stack", "trio", "branch", "parallel"];

    fn from_index(index: usize) -> Self {
        match index {
            1 => Algorithm::Stack,
            2 => Algorithm::Trio,
            3 => Algorithm::Branch,
            4 => Algorithm::Parallel,
            _ => Algorithm::Pairs,
        }
    }
}

impl Algorithm {
    /// Routing at unit depth plus the carrier output gains. Operator 6
    /// always carries the feedback loop.
    pub fn routing(self) -> (ModMatrix, [f64; MAX_OPERATORS]) {
        let mut m = [[0.0; MAX_OPERATORS]; MAX_OPERATORS];
        let mut out = [0.0; MAX_OPERATORS];
        match self {
            Algorithm::Pairs => {
                m[1][0] = 1.0;
                m[3][2] = 1.0;
                m[4][3] = 1.0;
                m[5][4] = 1.0;
                out[0] = 1.0;
                out[2] = 1.0;
            }
            Algorithm::Stack => {
                for i in 1..MAX_OPERATORS {
                    m[i][i - 1] = 1.0;
                }
                out[0] = 1.0;
            }
            Algorithm::Trio => {
                m[1][0] = 1.0;
                m[3][2] = 1.0;
                m[5][4] = 1.0;
                out[0] = 1.0;
                out[2] = 1.0;
                out[4] = 1.0;
            }
            Algorithm::Branch => {
                for row in m.iter_mut().skip(1) {
                    row[0] = 1.0;
                }
                out[0] = 1.0;
            }
            Algorithm::Parallel => {
                out = [1.0; MAX_OPERATORS];
            }
        }
        (m, out)
    }
}

const ALGORITHM: ParamSpec = ParamSpec::choice("algorithm", Algorithm::OPTIONS, 0);
const MOD_INDEX: ParamSpec = ParamSpec::float("modIndex", 0.0, 10.0, 2.0);
const FEEDBACK: ParamSpec = ParamSpec::float("feedback", 0.0, 1.0, 0.2);
const VELOCITY_SENS: ParamSpec = ParamSpec::float("velocitySens", 0.0, 1.0, 0.7);
const ATTACK: ParamSpec = ParamSpec::float("attack", 0.0, 10.0, 0.005);
const DECAY: ParamSpec = ParamSpec::float("decay", 0.0, 10.0, 0.8);
const SUSTAIN: ParamSpec = ParamSpec::float("sustain", 0.0, 1.0, 0.6);
const RELEASE: ParamSpec = ParamSpec::float("release", 0.0, 10.0, 0.4);
const MOD_DECAY: ParamSpec = ParamSpec::float("modDecay", 0.0, 10.0, 0.4);
const MOD_SUSTAIN: ParamSpec = ParamSpec::float("modSustain", 0.0, 1.0, 0.3);
const GAIN: ParamSpec = ParamSpec::float("gain", 0.0, 1.0, 0.7);

const RATIOS: [ParamSpec; MAX_OPERATORS] = [
    ParamSpec::float("ratio1", 0.0, 32.0, 1.0),
    ParamSpec::float("ratio2", 0.0, 32.0, 1.0),
    ParamSpec::float("ratio3", 0.0, 32.0, 1.0),
    ParamSpec::float("ratio4", 0.0, 32.0, 1.0),
    ParamSpec::float("ratio5", 0.0, 32.0, 1.0),
    ParamSpec::float("ratio6", 0.0, 32.0, 1.0),
];

const LEVELS: [ParamSpec; MAX_OPERATORS] = [
    ParamSpec::float("level1", 0.0, 1.0, 1.0),
    ParamSpec::float("level2", 0.0, 1.0, 1.0),
    ParamSpec::float("level3", 0.0, 1.0, 1.0),
    ParamSpec::float("level4", 0.0, 1.0, 1.0),
    ParamSpec::float("level5", 0.0, 1.0, 1.0),
    ParamSpec::float("level6", 0.0, 1.0, 1.0),
];

const DETUNE: ParamSpec = ParamSpec::float("detune", -50.0, 50.0, 0.0);

pub const PARAMS: &[ParamSpec] = &[
    ALGORITHM,
    MOD_INDEX,
    FEEDBACK,
    VELOCITY_SENS,
    ATTACK,
    DECAY,
    SUSTAIN,
    RELEASE,
    MOD_DECAY,
    MOD_SUSTAIN,
    GAIN,
    DETUNE,
    RATIOS[0],
    RATIOS[1],
    RATIOS[2],
    RATIOS[3],
    RATIOS[4],
    RATIOS[5],
    LEVELS[0],
    LEVELS[1],
    LEVELS[2],
    LEVELS[3],
    LEVELS[4],
    LEVELS[5],
];

/// Modular routing: `mod{s}{t}` is the depth operator `s` feeds into `t`
/// (1-based), `out{n}` the operator's share of the audio output.
const MODULAR_LINKS: [[ParamSpec; 4]; 4] = [
    [
        ParamSpec::float("mod11", 0.0, 10.0, 0.0),
        ParamSpec::float("mod12", 0.0, 10.0, 0.0),
        ParamSpec::float("mod13", 0.0, 10.0, 0.0),
        ParamSpec::float("mod14", 0.0, 10.0, 0.0),
    ],
    [
        ParamSpec::float("mod21", 0.0, 10.0, 1.0),
        ParamSpec::float("mod22", 0.0, 10.0, 0.0),
        ParamSpec::float("mod23", 0.0, 10.0, 0.0),
        ParamSpec::float("mod24", 0.0, 10.0, 0.0),
    ],
    [
        ParamSpec::float("mod31", 0.0, 10.0, 0.0),
        ParamSpec::float("mod32", 0.0, 10.0, 1.0),
        ParamSpec::float("mod33", 0.0, 10.0, 0.0),
        ParamSpec::float("mod34", 0.0, 10.0, 0.0),
    ],
    [
        ParamSpec::float("mod41", 0.0, 10.0, 0.0),
        ParamSpec::float("mod42", 0.0, 10.0, 0.0),
        ParamSpec::float("mod43", 0.0, 10.0, 0.0),
        ParamSpec::float("mod44", 0.0, 10.0, 0.0),
    ],
];

const MODULAR_OUTPUTS: [ParamSpec; 4] = [
    ParamSpec::float("out1", 0.0, 1.0, 1.0),
    ParamSpec::float("out2", 0.0, 1.0, 0.0),
    ParamSpec::float("out3", 0.0, 1.0, 0.0),
    ParamSpec::float("out4", 0.0, 1.0, 0.0),
];

pub const MODULAR_PARAMS: &[ParamSpec] = &[
    ATTACK,
    DECAY,
    SUSTAIN,
    RELEASE,
    MOD_DECAY,
    MOD_SUSTAIN,
    VELOCITY_SENS,
    GAIN,
    RATIOS[0],
    RATIOS[1],
    RATIOS[2],
    RATIOS[3],
    LEVELS[0],
    LEVELS[1],
    LEVELS[2],
    LEVELS[3],
    MODULAR_LINKS[0][0],
    MODULAR_LINKS[0][1],
    MODULAR_LINKS[0][2],
    MODULAR_LINKS[0][3],
    MODULAR_LINKS[1][0],
    MODULAR_LINKS[1][1],
    MODULAR_LINKS[1][2],
    MODULAR_LINKS[1][3],
    MODULAR_LINKS[2][0],
    MODULAR_LINKS[2][1],
    MODULAR_LINKS[2][2],
    MODULAR_LINKS[2][3],
    MODULAR_LINKS[3][0],
    MODULAR_LINKS[3][1],
    MODULAR_LINKS[3][2],
    MODULAR_LINKS[3][3],
    MODULAR_OUTPUTS[0],
    MODULAR_OUTPUTS[1],
    MODULAR_OUTPUTS[2],
    MODULAR_OUTPUTS[3],
];

/// One enveloped sine operator.
#[derive(Debug, Clone)]
struct Operator {
    osc: Oscillator,
    env: Adsr,
    ratio: f64,
    level: f64,
    /// Share of this operator in the audio output.
    output: f64,
    last: f64,
}

impl Operator {
    fn new(sample_rate: f64) -> Self {
        Operator {
            osc: Oscillator::new(),
            env: Adsr::new(sample_rate),
            ratio: 1.0,
            level: 1.0,
            output: 0.0,
            last: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FmSynth {
    model: FmModel,
    sample_rate: f64,
    operators: [Operator; MAX_OPERATORS],
    matrix: ModMatrix,
    /// Host-supplied routing that survives `note_on`.
    routing_override: Option<(ModMatrix, [f64; MAX_OPERATORS])>,
    outputs: [f64; MAX_OPERATORS],
    level: f64,
}

impl FmSynth {
    pub fn new(model: FmModel, sample_rate: f64) -> Self {
        FmSynth {
            model,
            sample_rate,
            operators: std::array::from_fn(|_| Operator::new(sample_rate)),
            matrix: [[0.0; MAX_OPERATORS]; MAX_OPERATORS],
            routing_override: None,
            outputs: [0.0; MAX_OPERATORS],
            level: 0.0,
        }
    }

    pub fn model(&self) -> FmModel {
        self.model
    }

    /// Replace the routing with an explicit matrix and output gains. Takes
    /// effect from the next `note_on` onwards, overriding the snapshot.
    pub fn set_routing(&mut self, matrix: ModMatrix, outputs: [f64; MAX_OPERATORS]) {
        self.routing_override = Some((matrix, outputs));
    }

    pub fn clear_routing(&mut self) {
        self.routing_override = None;
    }

    pub fn matrix(&self) -> &ModMatrix {
        &self.matrix
    }

    /// Each operator's output from the last rendered sample.
    pub fn operator_outputs(&self) -> &[f64] {
        &self.outputs[..self.model.operator_count()]
    }

    fn routing_from(&self, params: &ParamSnapshot, depth: f64) -> (ModMatrix, [f64; MAX_OPERATORS]) {
        if let Some(routing) = self.routing_override {
            return routing;
        }
        match self.model {
            FmModel::Modular => {
                let mut m = [[0.0; MAX_OPERATORS]; MAX_OPERATORS];
                let mut out = [0.0; MAX_OPERATORS];
                for (s, row) in MODULAR_LINKS.iter().enumerate() {
                    for (t, spec) in row.iter().enumerate() {
                        m[s][t] = params.float(spec);
                    }
                    out[s] = params.float(&MODULAR_OUTPUTS[s]);
                }
                (m, out)
            }
            FmModel::Dx7 | FmModel::Fm8 => {
                let algorithm: Algorithm = params.choice(&ALGORITHM);
                let (mut m, out) = algorithm.routing();
                for row in m.iter_mut() {
                    for depth_cell in row.iter_mut() {
                        *depth_cell *= depth;
                    }
                }
                m[5][5] = params.float(&FEEDBACK) * 3.0;
                (m, out)
            }
        }
    }
}

impl SynthesizerEngine for FmSynth {
    fn name(&self) -> &'static str {
        self.model.id()
    }

    fn note_on(&mut self, frequency: f64, velocity: f64, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        self.sample_rate = sr;
        let velocity = normalize_velocity(velocity);
        let sens = params.float(&VELOCITY_SENS);
        // Velocity scales modulation depth, so harder notes are brighter
        let brightness = 1.0 - sens + sens * velocity;
        let depth = params.float_or(&MOD_INDEX, self.model.default_index()) * brightness;

        let (mut matrix, outputs) = self.routing_from(params, depth);
        if self.model == FmModel::Modular || self.routing_override.is_some() {
            for row in matrix.iter_mut() {
                for cell in row.iter_mut() {
                    *cell *= brightness;
                }
            }
        }
        self.matrix = matrix;

        let ratios = self.model.default_ratios();
        let detune = semitones_to_ratio(params.float(&DETUNE) / 100.0);
        let count = self.model.operator_count();
        let carrier_env = (
            params.float(&ATTACK),
            params.float(&DECAY),
            params.float(&SUSTAIN),
            params.float(&RELEASE),
        );
        let mod_env = (
            params.float(&ATTACK),
            params.float(&MOD_DECAY),
            params.float(&MOD_SUSTAIN),
            params.float(&RELEASE),
        );
        for (i, op) in self.operators.iter_mut().enumerate() {
            op.env.set_sample_rate(sr);
            op.osc.reset();
            op.last = 0.0;
            if i >= count {
                op.output = 0.0;
                op.env.reset();
                continue;
            }
            op.ratio = params.float_or(&RATIOS[i], ratios[i]);
            op.level = params.float(&LEVELS[i]);
            op.output = outputs[i];
            // Odd operators get a touch of detune so stacks beat slowly
            let spread = if i % 2 == 1 { detune } else { 1.0 };
            op.osc.set_frequency(frequency * op.ratio * spread, sr);
            let (a, d, s, r) = if op.output > 0.0 { carrier_env } else { mod_env };
            op.env.set(a, d, s, r);
            op.env.trigger();
        }
        self.outputs = [0.0; MAX_OPERATORS];
        self.level = velocity * params.float(&GAIN);
    }

    fn note_off(&mut self, _ctx: &DspContext) {
        for op in self.operators.iter_mut() {
            op.env.release();
        }
    }

    fn render_into(&mut self, output: &mut AudioBuffer, _ctx: &DspContext) {
        let count = self.model.operator_count();
        let carrier_gain: f64 = self.operators[..count].iter().map(|op| op.output).sum::<f64>().max(1.0);
        let Self {
            operators,
            matrix,
            outputs,
            level,
            ..
        } = self;
        render_frames(output, || {
            let mut mix = 0.0;
            for t in (0..count).rev() {
                let mut phase = 0.0;
                for s in 0..count {
                    let depth = matrix[s][t];
                    if depth != 0.0 {
                        // s > t was computed this sample, s <= t holds last sample's value
                        phase += depth * operators[s].last;
                    }
                }
                let op = &mut operators[t];
                let value = op.osc.sine_pm(phase) * op.env.process() * op.level;
                op.last = value;
                outputs[t] = value;
                mix += value * op.output;
            }
            let s = mix / carrier_gain * *level;
            (s, s)
        });
    }

    fn is_active(&self) -> bool {
        self.operators[..self.model.operator_count()]
            .iter()
            .any(|op| op.output > 0.0 && op.env.is_active())
    }

    fn reset(&mut self) {
        for op in self.operators.iter_mut() {
            op.osc.reset();
            op.env.reset();
            op.last = 0.0;
        }
        self.outputs = [0.0; MAX_OPERATORS];
    }
}
