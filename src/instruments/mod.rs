//! Instrument voices.
//!
//! Every family implements [`SynthesizerEngine`](crate::unit::SynthesizerEngine)
//! for a single note. Model variants within a family (the ten analog
//! synths, the seven keyboards, ...) share one engine and differ only in the
//! preset their constructor loads; parameters from the host override the
//! preset value when present.

pub mod analog;
pub mod basic;
pub mod bass;
pub mod fm;
pub mod keys;
pub mod sampler;
pub mod strings;

pub use analog::{AnalogModel, AnalogSynth};
pub use basic::BasicVoice;
pub use bass::{BassModel, BassSynth};
pub use fm::{FmModel, FmSynth};
pub use keys::{KeysModel, KeysSynth};
pub use sampler::{SampleBuffer, SamplerMode, SamplerVoice};
pub use strings::{StringsModel, StringsSynth};

use crate::dsp::AudioBuffer;
use crate::dsp::util::sanitize;

/// Fill every frame of `output` from a stereo kernel, guarding each sample.
pub(crate) fn render_frames(output: &mut AudioBuffer, mut kernel: impl FnMut() -> (f64, f64)) {
    let (left, right) = output.channels_mut();
    for (l, r) in left.iter_mut().zip(right.iter_mut()) {
        let (a, b) = kernel();
        *l = sanitize(a) as f32;
        *r = sanitize(b) as f32;
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::dsp::{AudioBuffer, DspContext, detect_pitch};
    use crate::params::ParamSnapshot;
    use crate::unit::SynthesizerEngine;

    pub const SR: f64 = 44100.0;

    /// Trigger a note and render `frames` of it.
    pub fn play(engine: &mut dyn SynthesizerEngine, freq: f64, params: &ParamSnapshot, frames: usize) -> AudioBuffer {
        let ctx = DspContext::new(SR);
        engine.note_on(freq, 0.8, params, &ctx);
        engine.render(frames, &ctx)
    }

    /// Release and keep rendering in blocks until the voice goes idle.
    /// Returns the number of frames it took, or `None` past `limit`.
    pub fn drain(engine: &mut dyn SynthesizerEngine, limit: usize) -> Option<usize> {
        let ctx = DspContext::new(SR);
        engine.note_off(&ctx);
        let mut rendered = 0;
        while engine.is_active() {
            if rendered >= limit {
                return None;
            }
            engine.render(512, &ctx);
            rendered += 512;
        }
        Some(rendered)
    }

    /// YIN estimate of the left channel's fundamental.
    pub fn fundamental(buffer: &AudioBuffer, min: f64, max: f64) -> f64 {
        let samples: Vec<f64> = buffer.left().iter().map(|&s| s as f64).collect();
        detect_pitch(&samples, SR, min, max).frequency
    }
}
