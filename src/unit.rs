//! The two unit contracts every effect and instrument implements.

use crate::dsp::{AudioBuffer, DspContext};
use crate::params::ParamSnapshot;

/// A streaming effect: one block in, one block out, state carried across
/// calls.
///
/// Implementations must not allocate in `process_into` once the output
/// buffer has reached the block size, and must never emit non-finite
/// samples. The `mix` parameter is applied last, per sample.
pub trait EffectProcessor: Send {
    /// Registry id of the unit.
    fn name(&self) -> &'static str;

    /// Process `input` into `output`, which is resized to match.
    fn process_into(
        &mut self,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
        params: &ParamSnapshot,
        ctx: &DspContext,
    );

    /// Convenience wrapper returning a fresh buffer.
    fn process(&mut self, input: &AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) -> AudioBuffer {
        let mut output = AudioBuffer::silence(input.frames(), ctx.effective_sample_rate());
        self.process_into(input, &mut output, params, ctx);
        output
    }

    /// Clear all audible history (transport stop or seek).
    fn reset(&mut self);

    /// Restart any random source from `seed`.
    fn reseed(&mut self, _seed: u64) {}
}

/// A single note-driven voice.
///
/// `idle → sounding` on `note_on`, `sounding → releasing` on `note_off`,
/// back to idle once every envelope that governs the output has finished.
pub trait SynthesizerEngine: Send {
    fn name(&self) -> &'static str;

    /// Configure from `params` and (re)trigger. Velocities above 1 are
    /// read as MIDI velocities.
    fn note_on(&mut self, frequency: f64, velocity: f64, params: &ParamSnapshot, ctx: &DspContext);

    fn note_off(&mut self, ctx: &DspContext);

    /// Render exactly `output.frames()` frames.
    fn render_into(&mut self, output: &mut AudioBuffer, ctx: &DspContext);

    /// Render `num_samples` frames into a fresh buffer.
    fn render(&mut self, num_samples: usize, ctx: &DspContext) -> AudioBuffer {
        let mut output = AudioBuffer::silence(num_samples, ctx.effective_sample_rate());
        self.render_into(&mut output, ctx);
        output
    }

    fn is_active(&self) -> bool;

    /// Hard-clear all state and go idle.
    fn reset(&mut self);

    fn reseed(&mut self, _seed: u64) {}
}
