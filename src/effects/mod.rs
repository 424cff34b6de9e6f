//! Effect units.
//!
//! Each unit reads a typed config from the parameter snapshot once per
//! block, runs its per-frame kernel, and blends the result against the dry
//! input through a [`DryWet`] blend as the very last step.

pub mod autotune;
pub mod delay;
pub mod distortion;
pub mod dynamics;
pub mod eq;
pub mod formant;
pub mod granular_delay;
pub mod harmony;
pub mod modulation;
pub mod reverb;
pub mod vocoder;

pub use autotune::Autotune;
pub use delay::{DigitalDelay, FilterDelay, MultiTapDelay, PingPongDelay, ReverseDelay, TapeDelay};
pub use distortion::Distortion;
pub use dynamics::{Compressor, DeEsser, Gate, Limiter};
pub use eq::Equalizer;
pub use formant::FormantShifter;
pub use granular_delay::GranularDelay;
pub use harmony::{Harmony, PitchShift};
pub use modulation::{Chorus, Flanger, Phaser, Tremolo};
pub use reverb::Reverb;
pub use vocoder::Vocoder;

use crate::dsp::{AudioBuffer, DryWet};

/// Run a stereo kernel over every frame of `input`, blending into `output`.
pub(crate) fn run_frames(
    input: &AudioBuffer,
    output: &mut AudioBuffer,
    mix: &mut DryWet,
    mut kernel: impl FnMut(f64, f64) -> (f64, f64),
) {
    output.resize(input.frames());
    output.set_sample_rate(input.sample_rate());
    for i in 0..input.frames() {
        let (l, r) = input.frame(i);
        let wet = kernel(l as f64, r as f64);
        let (out_l, out_r) = mix.blend((l, r), wet);
        output.set_frame(i, out_l, out_r);
    }
}
