//! Host-side unit registry.
//!
//! Maps string ids to factories so a host can create effects and
//! instruments by name, inspect their parameter schemas and validate
//! snapshots before handing them to the render path. The registry is an
//! explicit value owned by the host.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::Serialize;

use crate::dsp::{AudioBuffer, DspContext};
use crate::effects::{
    self, Autotune, Chorus, Compressor, DeEsser, DigitalDelay, Distortion, Equalizer, FilterDelay, Flanger,
    FormantShifter, Gate, GranularDelay, Harmony, Limiter, MultiTapDelay, Phaser, PingPongDelay, PitchShift,
    ReverseDelay, Reverb, TapeDelay, Tremolo, Vocoder,
};
use crate::error::{DspError, Result};
use crate::instruments::{
    self, AnalogModel, AnalogSynth, BasicVoice, BassModel, BassSynth, FmModel, FmSynth, KeysModel, KeysSynth,
    SamplerMode, SamplerVoice, StringsModel, StringsSynth,
};
use crate::params::{ParamIssue, ParamSnapshot, ParamSpec, validate};
use crate::unit::{EffectProcessor, SynthesizerEngine};

pub type EffectFactory = Box<dyn Fn(f64) -> Box<dyn EffectProcessor> + Send + Sync>;
pub type InstrumentFactory = Box<dyn Fn(f64) -> Box<dyn SynthesizerEngine> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Effect,
    Instrument,
}

impl UnitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Effect => "effect",
            UnitKind::Instrument => "instrument",
        }
    }
}

/// What a host needs to know about a unit without creating one.
#[derive(Debug, Clone, Serialize)]
pub struct UnitDescriptor {
    pub id: String,
    pub kind: UnitKind,
    pub params: &'static [ParamSpec],
}

enum Factory {
    Effect(EffectFactory),
    Instrument(InstrumentFactory),
}

struct Entry {
    descriptor: UnitDescriptor,
    factory: Factory,
}

/// Id-to-factory table for every unit a host can create.
#[derive(Default)]
pub struct UnitRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitRegistry").field("units", &self.ids()).finish()
    }
}

impl UnitRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in effect and instrument.
    pub fn with_builtin_units() -> Self {
        let mut registry = Self::new();
        registry.register_builtin_effects();
        registry.register_builtin_instruments();
        tracing::debug!(units = registry.len(), "registered built-in units");
        registry
    }

    fn register_builtin_effects(&mut self) {
        use effects::{autotune, delay, distortion, dynamics, eq, formant, granular_delay, harmony, modulation};

        self.register_effect("digital-delay", delay::DIGITAL_PARAMS, |sr| Box::new(DigitalDelay::new(sr)));
        self.register_effect("tape-delay", delay::TAPE_PARAMS, |sr| Box::new(TapeDelay::new(sr)));
        self.register_effect("ping-pong-delay", delay::PING_PONG_PARAMS, |sr| {
            Box::new(PingPongDelay::new(sr))
        });
        self.register_effect("multi-tap-delay", delay::MULTI_TAP_PARAMS, |sr| {
            Box::new(MultiTapDelay::new(sr))
        });
        self.register_effect("filter-delay", delay::FILTER_PARAMS, |sr| Box::new(FilterDelay::new(sr)));
        self.register_effect("reverse-delay", delay::REVERSE_PARAMS, |sr| Box::new(ReverseDelay::new(sr)));
        self.register_effect("granular-delay", granular_delay::PARAMS, |sr| {
            Box::new(GranularDelay::new(sr))
        });
        self.register_effect("autotune", autotune::PARAMS, |sr| Box::new(Autotune::new(sr)));
        self.register_effect("harmony", harmony::HARMONY_PARAMS, |sr| Box::new(Harmony::new(sr)));
        self.register_effect("pitch-shift", harmony::PITCH_SHIFT_PARAMS, |sr| Box::new(PitchShift::new(sr)));
        self.register_effect("formant-shifter", formant::PARAMS, |sr| Box::new(FormantShifter::new(sr)));
        self.register_effect("vocoder", effects::vocoder::PARAMS, |sr| Box::new(Vocoder::new(sr)));
        self.register_effect("de-esser", dynamics::DE_ESSER_PARAMS, |sr| Box::new(DeEsser::new(sr)));
        self.register_effect("compressor", dynamics::COMPRESSOR_PARAMS, |sr| Box::new(Compressor::new(sr)));
        self.register_effect("limiter", dynamics::LIMITER_PARAMS, |sr| Box::new(Limiter::new(sr)));
        self.register_effect("gate", dynamics::GATE_PARAMS, |sr| Box::new(Gate::new(sr)));
        self.register_effect("eq", eq::PARAMS, |sr| Box::new(Equalizer::new(sr)));
        self.register_effect("distortion", distortion::PARAMS, |sr| Box::new(Distortion::new(sr)));
        self.register_effect("phaser", modulation::PHASER_PARAMS, |sr| Box::new(Phaser::new(sr)));
        self.register_effect("flanger", modulation::FLANGER_PARAMS, |sr| Box::new(Flanger::new(sr)));
        self.register_effect("chorus", modulation::CHORUS_PARAMS, |sr| Box::new(Chorus::new(sr)));
        self.register_effect("tremolo", modulation::TREMOLO_PARAMS, |sr| Box::new(Tremolo::new(sr)));
        self.register_effect("reverb", effects::reverb::PARAMS, |sr| Box::new(Reverb::new(sr)));
    }

    fn register_builtin_instruments(&mut self) {
        use instruments::{analog, basic, bass, fm, keys, strings};

        self.register_instrument("basic", basic::PARAMS, |sr| Box::new(BasicVoice::new(sr)));
        for model in AnalogModel::ALL {
            self.register_instrument(model.id(), analog::PARAMS, move |sr| Box::new(AnalogSynth::new(model, sr)));
        }
        for model in FmModel::ALL {
            let params = match model {
                FmModel::Modular => fm::MODULAR_PARAMS,
                _ => fm::PARAMS,
            };
            self.register_instrument(model.id(), params, move |sr| Box::new(FmSynth::new(model, sr)));
        }
        for model in KeysModel::ALL {
            self.register_instrument(model.id(), keys::PARAMS, move |sr| Box::new(KeysSynth::new(model, sr)));
        }
        for model in StringsModel::ALL {
            self.register_instrument(model.id(), strings::PARAMS, move |sr| {
                Box::new(StringsSynth::new(model, sr))
            });
        }
        for model in BassModel::ALL {
            self.register_instrument(model.id(), bass::PARAMS, move |sr| Box::new(BassSynth::new(model, sr)));
        }
        for mode in SamplerMode::ALL {
            self.register_instrument(mode.id(), mode.params(), move |sr| Box::new(SamplerVoice::new(mode, sr)));
        }
    }

    fn insert(&mut self, descriptor: UnitDescriptor, factory: Factory) {
        let id = descriptor.id.clone();
        let entry = Entry { descriptor, factory };
        match self.index.get(&id) {
            Some(&slot) => {
                tracing::debug!(%id, "replacing registered unit");
                self.entries[slot] = entry;
            }
            None => {
                self.index.insert(id, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Register an effect factory. An existing unit with the same id is
    /// replaced.
    pub fn register_effect(
        &mut self,
        id: impl Into<String>,
        params: &'static [ParamSpec],
        factory: impl Fn(f64) -> Box<dyn EffectProcessor> + Send + Sync + 'static,
    ) {
        let descriptor = UnitDescriptor {
            id: id.into(),
            kind: UnitKind::Effect,
            params,
        };
        self.insert(descriptor, Factory::Effect(Box::new(factory)));
    }

    /// Register an instrument factory. An existing unit with the same id is
    /// replaced.
    pub fn register_instrument(
        &mut self,
        id: impl Into<String>,
        params: &'static [ParamSpec],
        factory: impl Fn(f64) -> Box<dyn SynthesizerEngine> + Send + Sync + 'static,
    ) {
        let descriptor = UnitDescriptor {
            id: id.into(),
            kind: UnitKind::Instrument,
            params,
        };
        self.insert(descriptor, Factory::Instrument(Box::new(factory)));
    }

    fn entry(&self, id: &str) -> Result<&Entry> {
        self.index
            .get(id)
            .map(|&slot| &self.entries[slot])
            .ok_or_else(|| DspError::UnknownUnit(id.to_string()))
    }

    pub fn create_effect(&self, id: &str, sample_rate: f64) -> Result<Box<dyn EffectProcessor>> {
        match &self.entry(id)?.factory {
            Factory::Effect(factory) => {
                tracing::debug!(id, sample_rate, "creating effect");
                Ok(factory(sample_rate))
            }
            Factory::Instrument(_) => Err(DspError::WrongUnitKind {
                id: id.to_string(),
                expected: UnitKind::Effect.as_str(),
            }),
        }
    }

    pub fn create_instrument(&self, id: &str, sample_rate: f64) -> Result<Box<dyn SynthesizerEngine>> {
        match &self.entry(id)?.factory {
            Factory::Instrument(factory) => {
                tracing::debug!(id, sample_rate, "creating instrument");
                Ok(factory(sample_rate))
            }
            Factory::Effect(_) => Err(DspError::WrongUnitKind {
                id: id.to_string(),
                expected: UnitKind::Instrument.as_str(),
            }),
        }
    }

    pub fn descriptor(&self, id: &str) -> Option<&UnitDescriptor> {
        self.entry(id).ok().map(|e| &e.descriptor)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &UnitDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.descriptor.id.as_str()).collect()
    }

    pub fn ids_of(&self, kind: UnitKind) -> Vec<&str> {
        self.descriptors()
            .filter(|d| d.kind == kind)
            .map(|d| d.id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check a snapshot against the unit's schema. Issues are advisory:
    /// units clamp and default on their own.
    pub fn validate(&self, id: &str, snapshot: &ParamSnapshot) -> Result<Vec<ParamIssue>> {
        let descriptor = &self.entry(id)?.descriptor;
        let issues = validate(snapshot, descriptor.params);
        for issue in &issues {
            tracing::debug!(unit = id, ?issue, "parameter issue");
        }
        Ok(issues)
    }
}

/// Run an effect, substituting the unmodified input if it panics or emits
/// a non-finite sample. A panicking effect is reset before returning.
pub fn process_guarded(
    effect: &mut dyn EffectProcessor,
    input: &AudioBuffer,
    params: &ParamSnapshot,
    ctx: &DspContext,
) -> AudioBuffer {
    let name = effect.name();
    let result = catch_unwind(AssertUnwindSafe(|| effect.process(input, params, ctx)));
    match result {
        Ok(output) if output.is_finite() => output,
        Ok(_) => {
            tracing::warn!(unit = name, "non-finite output, passing input through");
            input.clone()
        }
        Err(_) => {
            tracing::warn!(unit = name, "effect panicked, passing input through");
            effect.reset();
            input.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_util::{SR, sine};

    const EFFECT_IDS: [&str; 23] = [
        "digital-delay",
        "tape-delay",
        "ping-pong-delay",
        "multi-tap-delay",
        "filter-delay",
        "reverse-delay",
        "granular-delay",
        "autotune",
        "harmony",
        "pitch-shift",
        "formant-shifter",
        "vocoder",
        "de-esser",
        "compressor",
        "limiter",
        "gate",
        "eq",
        "distortion",
        "phaser",
        "flanger",
        "chorus",
        "tremolo",
        "reverb",
    ];

    #[test]
    fn builtin_effects_are_all_present() {
        let registry = UnitRegistry::with_builtin_units();
        assert_eq!(registry.ids_of(UnitKind::Effect), EFFECT_IDS.to_vec());
        for id in EFFECT_IDS {
            let effect = registry.create_effect(id, SR).unwrap();
            assert_eq!(effect.name(), id);
        }
    }

    #[test]
    fn builtin_instruments_report_their_ids() {
        let registry = UnitRegistry::with_builtin_units();
        let ids = registry.ids_of(UnitKind::Instrument);
        assert_eq!(ids.len(), 1 + 10 + 3 + 7 + 6 + 6 + 3);
        for id in ids {
            let voice = registry.create_instrument(id, SR).unwrap();
            assert_eq!(voice.name(), id);
            assert!(!voice.is_active());
        }
    }

    #[test]
    fn every_builtin_renders_finite_audio() {
        let registry = UnitRegistry::with_builtin_units();
        let ctx = DspContext::new(SR);
        let input = sine(330.0, 2048, 0.5);
        let params = ParamSnapshot::new();
        for id in registry.ids_of(UnitKind::Effect) {
            let mut effect = registry.create_effect(id, SR).unwrap();
            assert!(effect.process(&input, &params, &ctx).is_finite(), "{id}");
        }
        for id in registry.ids_of(UnitKind::Instrument) {
            let mut voice = registry.create_instrument(id, SR).unwrap();
            voice.note_on(220.0, 100.0, &params, &ctx);
            assert!(voice.render(2048, &ctx).is_finite(), "{id}");
        }
    }

    #[test]
    fn lookup_errors() {
        let registry = UnitRegistry::with_builtin_units();
        assert!(matches!(registry.create_effect("nope", SR), Err(DspError::UnknownUnit(_))));
        assert!(matches!(
            registry.create_effect("organ", SR),
            Err(DspError::WrongUnitKind { expected: "effect", .. })
        ));
        assert!(matches!(
            registry.create_instrument("reverb", SR),
            Err(DspError::WrongUnitKind { expected: "instrument", .. })
        ));
        assert!(registry.descriptor("nope").is_none());
    }

    #[test]
    fn validate_reports_schema_issues() {
        let registry = UnitRegistry::with_builtin_units();
        let snapshot = ParamSnapshot::new()
            .with("time", 5000.0)
            .with("feedback", 0.5)
            .with("bogus", 1.0);
        let issues = registry.validate("digital-delay", &snapshot).unwrap();
        assert_eq!(issues.len(), 2);
        assert!(issues.contains(&ParamIssue::UnknownKey("bogus".into())));
        assert!(issues.iter().any(|i| matches!(i, ParamIssue::OutOfRange { id: "time", .. })));
        assert!(registry.validate("missing", &snapshot).is_err());
    }

    #[test]
    fn registering_an_existing_id_replaces_it() {
        let mut registry = UnitRegistry::with_builtin_units();
        let before = registry.len();
        registry.register_effect("reverb", &[], |sr| Box::new(Tremolo::new(sr)));
        assert_eq!(registry.len(), before);
        assert_eq!(registry.create_effect("reverb", SR).unwrap().name(), "tremolo");
        assert!(registry.descriptor("reverb").unwrap().params.is_empty());
    }

    struct Exploding;

    impl EffectProcessor for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn process_into(&mut self, _: &AudioBuffer, _: &mut AudioBuffer, _: &ParamSnapshot, _: &DspContext) {
            panic!("boom");
        }

        fn reset(&mut self) {}
    }

    struct Poisoned;

    impl EffectProcessor for Poisoned {
        fn name(&self) -> &'static str {
            "poisoned"
        }

        fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, _: &ParamSnapshot, _: &DspContext) {
            output.copy_from(input);
            output.set_frame(0, f32::NAN, 0.0);
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn guarded_processing_falls_back_to_input() {
        let ctx = DspContext::new(SR);
        let input = sine(440.0, 256, 0.5);
        let params = ParamSnapshot::new();

        let out = process_guarded(&mut Exploding, &input, &params, &ctx);
        assert_eq!(out.left(), input.left());

        let out = process_guarded(&mut Poisoned, &input, &params, &ctx);
        assert_eq!(out.left(), input.left());
    }
}
