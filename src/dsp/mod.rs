//! DSP primitives and building blocks.
//!
//! Everything here is a small stateful processor with no knowledge of
//! parameters or hosts. Effects and instruments are assembled from these.

pub mod buffer;
pub mod comb;
pub mod delay_line;
pub mod drywet;
pub mod envelope;
pub mod filter;
pub mod follower;
pub mod lfo;
pub mod mixer;
pub mod oscillator;
pub mod pitch;
pub mod pitch_shift;
pub mod smoother;
pub mod svf;
pub mod util;

pub use buffer::{AudioBuffer, DspContext};
pub use comb::{CombFilter, Diffuser};
pub use delay_line::DelayLine;
pub use drywet::DryWet;
pub use envelope::{Adsr, AdsrStage};
pub use filter::{AllPassFilter, BiquadFilter, FilterType, OnePoleFilter};
pub use follower::{EnvelopeFollower, FollowerMode};
pub use lfo::{Lfo, LfoShape};
pub use mixer::Mixer;
pub use oscillator::{Oscillator, Waveform};
pub use pitch::{AutocorrelationDetector, PitchEstimate, Scale, detect_pitch, quantize_to_scale};
pub use pitch_shift::PitchShifter;
pub use smoother::Smoother;
pub use svf::{LadderFilter, StateVariableFilter, SvfMode};
