pub mod dsp;
pub mod effects;
pub mod error;
pub mod instruments;
pub mod params;
pub mod registry;
pub mod renderer;
pub mod unit;

pub use crate::dsp::{AudioBuffer, DspContext};
pub use crate::error::{DspError, Result};
pub use crate::params::{ParamSnapshot, ParamSpec};
pub use crate::registry::{UnitDescriptor, UnitKind, UnitRegistry, process_guarded};
pub use crate::renderer::{NoteEvent, encode_wav, render_events};
pub use crate::unit::{EffectProcessor, SynthesizerEngine};

use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// `undefined` and `null` read as the type's default.
fn from_js<T: DeserializeOwned + Default>(value: JsValue) -> std::result::Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(js_error)
}

fn render(
    id: &str,
    events: JsValue,
    params: JsValue,
    sample_rate: f64,
    total_frames: usize,
) -> std::result::Result<AudioBuffer, JsValue> {
    let events: Vec<NoteEvent> = from_js(events)?;
    let params: ParamSnapshot = from_js(params)?;
    let registry = UnitRegistry::with_builtin_units();
    render_events(&registry, id, &params, &events, &DspContext::new(sample_rate), total_frames).map_err(js_error)
}

/// WASM-exposed: return the tonelab-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: describe every built-in unit (id, kind, parameter schema).
#[wasm_bindgen]
pub fn unit_ids() -> std::result::Result<JsValue, JsValue> {
    let registry = UnitRegistry::with_builtin_units();
    let descriptors: Vec<&UnitDescriptor> = registry.descriptors().collect();
    serde_wasm_bindgen::to_value(&descriptors).map_err(js_error)
}

/// WASM-exposed: run one block of interleaved stereo samples through a
/// fresh instance of effect `id`. Misbehaving effects pass the input through.
#[wasm_bindgen]
pub fn process_effect(
    id: &str,
    input: &[f32],
    sample_rate: f64,
    params: JsValue,
) -> std::result::Result<Vec<f32>, JsValue> {
    let params: ParamSnapshot = from_js(params)?;
    let registry = UnitRegistry::with_builtin_units();
    let ctx = DspContext::new(sample_rate);
    let mut effect = registry.create_effect(id, ctx.effective_sample_rate()).map_err(js_error)?;
    let input = AudioBuffer::from_interleaved(input, ctx.effective_sample_rate());
    Ok(process_guarded(effect.as_mut(), &input, &params, &ctx).to_interleaved())
}

/// WASM-exposed: render note events through instrument `id` to interleaved
/// stereo f32 samples.
#[wasm_bindgen]
pub fn render_instrument(
    id: &str,
    events: JsValue,
    params: JsValue,
    sample_rate: f64,
    total_frames: usize,
) -> std::result::Result<Vec<f32>, JsValue> {
    Ok(render(id, events, params, sample_rate, total_frames)?.to_interleaved())
}

/// WASM-exposed: render note events through instrument `id` to WAV bytes.
#[wasm_bindgen]
pub fn render_instrument_wav(
    id: &str,
    events: JsValue,
    params: JsValue,
    sample_rate: f64,
    total_frames: usize,
) -> std::result::Result<Vec<u8>, JsValue> {
    Ok(encode_wav(&render(id, events, params, sample_rate, total_frames)?))
}
