//! Parameter snapshots and the static schema units read them through.
//!
//! The host hands every `process`/`note_on` call a [`ParamSnapshot`]: a flat
//! map from parameter id to a float, bool, or enumerated string. Units never
//! look at the raw map directly; each one declares its parameters as
//! [`ParamSpec`] constants and builds a typed config struct through them,
//! which is where clamping, defaulting and unknown-choice fallback happen.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single parameter value as sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Float(f64),
    Choice(String),
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v as f64)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Float(v as f64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Choice(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Choice(v)
    }
}

/// Parameters for one block or one note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSnapshot {
    values: HashMap<String, ParamValue>,
}

impl ParamSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, id: &str, value: impl Into<ParamValue>) -> Self {
        self.set(id, value);
        self
    }

    pub fn set(&mut self, id: &str, value: impl Into<ParamValue>) {
        self.values.insert(id.to_string(), value.into());
    }

    pub fn get(&self, id: &str) -> Option<&ParamValue> {
        self.values.get(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Parse from a JSON object.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::new());
        }
        Ok(serde_json::from_str(json)?)
    }

    /// Read a float parameter, clamped to the schema range. Missing,
    /// non-numeric or non-finite values give the schema default.
    pub fn float(&self, spec: &ParamSpec) -> f64 {
        let (min, max, default) = match spec.kind {
            ParamKind::Float { min, max, default } => (min, max, default),
            ParamKind::Bool { default } => (0.0, 1.0, if default { 1.0 } else { 0.0 }),
            ParamKind::Choice { default, .. } => return default as f64,
        };
        let raw = match self.values.get(spec.id) {
            Some(ParamValue::Float(v)) if v.is_finite() => *v,
            Some(ParamValue::Bool(b)) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Some(ParamValue::Choice(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(default),
            _ => default,
        };
        raw.clamp(min, max)
    }

    /// Like [`float`](Self::float) but with a caller-supplied default,
    /// for units whose defaults depend on a model preset.
    pub fn float_or(&self, spec: &ParamSpec, default: f64) -> f64 {
        if self.values.contains_key(spec.id) {
            self.float(spec)
        } else {
            match spec.kind {
                ParamKind::Float { min, max, .. } => default.clamp(min, max),
                _ => default,
            }
        }
    }

    pub fn bool_or(&self, spec: &ParamSpec, default: bool) -> bool {
        if self.values.contains_key(spec.id) { self.bool(spec) } else { default }
    }

    pub fn choice_or<T: ParamChoice>(&self, spec: &ParamSpec, default: T) -> T {
        if self.values.contains_key(spec.id) { self.choice(spec) } else { default }
    }

    /// Float parameter narrowed to `f32`.
    pub fn float32(&self, spec: &ParamSpec) -> f32 {
        self.float(spec) as f32
    }

    /// Read a float parameter and round it to an integer count.
    pub fn count(&self, spec: &ParamSpec) -> usize {
        self.float(spec).round().max(0.0) as usize
    }

    pub fn bool(&self, spec: &ParamSpec) -> bool {
        let default = match spec.kind {
            ParamKind::Bool { default } => default,
            ParamKind::Float { default, .. } => default != 0.0,
            ParamKind::Choice { .. } => false,
        };
        match self.values.get(spec.id) {
            Some(ParamValue::Bool(b)) => *b,
            Some(ParamValue::Float(v)) => *v != 0.0,
            Some(ParamValue::Choice(s)) => matches!(s.as_str(), "true" | "on" | "yes" | "1"),
            None => default,
        }
    }

    /// Index of the selected option. Missing → spec default; an
    /// unrecognized string → the first defined option.
    pub fn choice_index(&self, spec: &ParamSpec) -> usize {
        let (options, default) = match spec.kind {
            ParamKind::Choice { options, default } => (options, default),
            _ => return 0,
        };
        match self.values.get(spec.id) {
            None => default,
            Some(ParamValue::Choice(s)) => options
                .iter()
                .position(|o| o.eq_ignore_ascii_case(s))
                .unwrap_or(0),
            Some(ParamValue::Float(v)) if v.is_finite() && *v >= 0.0 => {
                let i = v.round() as usize;
                if i < options.len() { i } else { 0 }
            }
            Some(_) => 0,
        }
    }

    pub fn choice<T: ParamChoice>(&self, spec: &ParamSpec) -> T {
        T::from_index(self.choice_index(spec))
    }
}

/// An enumerated parameter type. Index 0 is the fallback mode.
pub trait ParamChoice: Sized + Copy {
    const OPTIONS: &'static [&'static str];

    fn from_index(index: usize) -> Self;

    fn parse(name: &str) -> Self {
        Self::from_index(
            Self::OPTIONS
                .iter()
                .position(|o| o.eq_ignore_ascii_case(name))
                .unwrap_or(0),
        )
    }
}

/// Kind, range and default of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamKind {
    Float { min: f64, max: f64, default: f64 },
    Bool { default: bool },
    Choice {
        options: &'static [&'static str],
        default: usize,
    },
}

/// One entry of a unit's parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    pub id: &'static str,
    #[serde(flatten)]
    pub kind: ParamKind,
    pub automatable: bool,
}

impl ParamSpec {
    pub const fn float(id: &'static str, min: f64, max: f64, default: f64) -> Self {
        ParamSpec {
            id,
            kind: ParamKind::Float { min, max, default },
            automatable: true,
        }
    }

    pub const fn toggle(id: &'static str, default: bool) -> Self {
        ParamSpec {
            id,
            kind: ParamKind::Bool { default },
            automatable: false,
        }
    }

    pub const fn choice(id: &'static str, options: &'static [&'static str], default: usize) -> Self {
        ParamSpec {
            id,
            kind: ParamKind::Choice { options, default },
            automatable: false,
        }
    }

    /// Mark a float as not automatable (structural parameters such as
    /// band or tap counts).
    pub const fn fixed(mut self) -> Self {
        self.automatable = false;
        self
    }
}

/// The shared dry/wet spec with a per-unit default.
pub const fn mix_spec(default: f64) -> ParamSpec {
    ParamSpec::float("mix", 0.0, 1.0, default)
}

/// A problem found while checking a snapshot against a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamIssue {
    UnknownKey(String),
    WrongType { id: &'static str },
    OutOfRange { id: &'static str, value: f64 },
    UnknownChoice { id: &'static str, value: String },
}

/// Check a snapshot against a schema. Nothing here is fatal: units ignore
/// unknown keys and clamp values anyway, the host just gets told.
pub fn validate(snapshot: &ParamSnapshot, specs: &[ParamSpec]) -> Vec<ParamIssue> {
    let mut issues = Vec::new();
    for key in snapshot.keys() {
        if !specs.iter().any(|s| s.id == key) {
            issues.push(ParamIssue::UnknownKey(key.to_string()));
        }
    }
    for spec in specs {
        let Some(value) = snapshot.get(spec.id) else {
            continue;
        };
        match (spec.kind, value) {
            (ParamKind::Float { min, max, .. }, ParamValue::Float(v)) => {
                if !v.is_finite() || *v < min || *v > max {
                    issues.push(ParamIssue::OutOfRange { id: spec.id, value: *v });
                }
            }
            (ParamKind::Float { .. }, ParamValue::Bool(_)) => {}
            (ParamKind::Bool { .. }, ParamValue::Bool(_) | ParamValue::Float(_)) => {}
            (ParamKind::Choice { options, .. }, ParamValue::Choice(s)) => {
                if !options.iter().any(|o| o.eq_ignore_ascii_case(s)) {
                    issues.push(ParamIssue::UnknownChoice {
                        id: spec.id,
                        value: s.clone(),
                    });
                }
            }
            _ => issues.push(ParamIssue::WrongType { id: spec.id }),
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIME: ParamSpec = ParamSpec::float("time", 0.0, 2000.0, 250.0);
    const SYNC: ParamSpec = ParamSpec::toggle("sync", false);
    const MODE: ParamSpec = ParamSpec::choice("mode", &["linear", "golden", "fibonacci"], 1);

    #[test]
    fn float_defaults_and_clamps() {
        let p = ParamSnapshot::new();
        assert_eq!(p.float(&TIME), 250.0);
        let p = ParamSnapshot::new().with("time", 5000.0);
        assert_eq!(p.float(&TIME), 2000.0);
        let p = ParamSnapshot::new().with("time", f64::NAN);
        assert_eq!(p.float(&TIME), 250.0);
    }

    #[test]
    fn choice_missing_uses_default_unknown_uses_first() {
        assert_eq!(ParamSnapshot::new().choice_index(&MODE), 1);
        let p = ParamSnapshot::new().with("mode", "zigzag");
        assert_eq!(p.choice_index(&MODE), 0);
        let p = ParamSnapshot::new().with("mode", "Fibonacci");
        assert_eq!(p.choice_index(&MODE), 2);
    }

    #[test]
    fn preset_defaults_only_apply_when_missing() {
        let p = ParamSnapshot::new();
        assert_eq!(p.float_or(&TIME, 800.0), 800.0);
        assert_eq!(p.float_or(&TIME, 9000.0), 2000.0);
        let p = p.with("time", 10.0);
        assert_eq!(p.float_or(&TIME, 800.0), 10.0);
    }

    #[test]
    fn bool_accepts_numbers() {
        assert!(!ParamSnapshot::new().bool(&SYNC));
        assert!(ParamSnapshot::new().with("sync", 1.0).bool(&SYNC));
        assert!(ParamSnapshot::new().with("sync", true).bool(&SYNC));
    }

    #[test]
    fn deserializes_mixed_json() {
        let p = ParamSnapshot::from_json(r#"{"time": 120, "sync": true, "mode": "linear"}"#).unwrap();
        assert_eq!(p.float(&TIME), 120.0);
        assert!(p.bool(&SYNC));
        assert_eq!(p.choice_index(&MODE), 0);
    }

    #[test]
    fn validate_reports_but_does_not_fail() {
        let p = ParamSnapshot::new()
            .with("time", -4.0)
            .with("mode", "zigzag")
            .with("bogus", 1.0);
        let issues = validate(&p, &[TIME, SYNC, MODE]);
        assert_eq!(issues.len(), 3);
        assert!(issues.contains(&ParamIssue::UnknownKey("bogus".into())));
    }
}
