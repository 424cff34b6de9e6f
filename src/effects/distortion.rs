//! Waveshaping distortion with a post tone filter and DC blocker.

use crate::dsp::util::db_to_linear;
use crate::dsp::{AudioBuffer, BiquadFilter, DryWet, DspContext, OnePoleFilter};
use crate::params::{ParamChoice, ParamSnapshot, ParamSpec, mix_spec};
use crate::unit::EffectProcessor;

use super::run_frames;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistortionMode {
    Soft,
    Hard,
    Tube,
    Fuzz,
    Bitcrush,
    Foldback,
}

impl ParamChoice for DistortionMode {
    const OPTIONS: &'static [&'static str] = &["soft", "hard", "tube", "fuzz", "bitcrush", "foldback"];

    fn from_index(index: usize) -> Self {
        match index {
            1 => DistortionMode::Hard,
            2 => DistortionMode::Tube,
            3 => DistortionMode::Fuzz,
            4 => DistortionMode::Bitcrush,
            5 => DistortionMode::Foldback,
            _ => DistortionMode::Soft,
        }
    }
}

const MODE: ParamSpec = ParamSpec::choice("mode", DistortionMode::OPTIONS, 0);
const DRIVE: ParamSpec = ParamSpec::float("drive", 0.0, 48.0, 12.0);
const TONE: ParamSpec = ParamSpec::float("tone", 200.0, 12000.0, 6000.0);
const OUTPUT: ParamSpec = ParamSpec::float("output", -24.0, 12.0, 0.0);
const BITS: ParamSpec = ParamSpec::float("bits", 1.0, 16.0, 8.0);
const DOWNSAMPLE: ParamSpec = ParamSpec::float("downsample", 1.0, 32.0, 1.0);
const MIX: ParamSpec = mix_spec(1.0);

pub const PARAMS: &[ParamSpec] = &[MODE, DRIVE, TONE, OUTPUT, BITS, DOWNSAMPLE, MIX];

/// Asymmetry of the tube curve's negative half.
const TUBE_BIAS: f64 = 1.2;

/// Reflect anything beyond ±1 back into range.
#[inline]
pub fn fold(x: f64) -> f64 {
    1.0 - ((x + 1.0).rem_euclid(4.0) - 2.0).abs()
}

/// Round to `bits` of signed resolution.
#[inline]
pub fn crush(x: f64, bits: f64) -> f64 {
    let steps = 2.0_f64.powf(bits - 1.0);
    (x.clamp(-1.0, 1.0) * steps).round() / steps
}

/// Static transfer curve for `mode` at linear input gain `drive`.
#[inline]
pub fn shape(mode: DistortionMode, x: f64, drive: f64, bits: f64) -> f64 {
    let x = x * drive;
    match mode {
        DistortionMode::Soft => x.tanh(),
        DistortionMode::Hard => x.clamp(-1.0, 1.0),
        DistortionMode::Tube => {
            if x >= 0.0 {
                1.0 - (-x).exp()
            } else {
                -(1.0 - (TUBE_BIAS * x).exp()) / TUBE_BIAS
            }
        }
        DistortionMode::Fuzz => x.signum() * (1.0 - (-3.0 * x.abs()).exp()),
        DistortionMode::Bitcrush => crush(x, bits),
        DistortionMode::Foldback => fold(x),
    }
}

#[derive(Debug, Clone)]
struct Channel {
    tone: BiquadFilter,
    dc: OnePoleFilter,
    held: f64,
}

#[derive(Debug, Clone)]
pub struct Distortion {
    sample_rate: f64,
    channels: [Channel; 2],
    hold_count: usize,
    mix: DryWet,
}

impl Distortion {
    pub fn new(sample_rate: f64) -> Self {
        let channel = Channel {
            tone: BiquadFilter::new(),
            dc: OnePoleFilter::new(20.0, sample_rate),
            held: 0.0,
        };
        Distortion {
            sample_rate,
            channels: [channel.clone(), channel],
            hold_count: 0,
            mix: DryWet::new(),
        }
    }
}

impl EffectProcessor for Distortion {
    fn name(&self) -> &'static str {
        "distortion"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let mode: DistortionMode = params.choice(&MODE);
        let drive = db_to_linear(params.float(&DRIVE));
        let level = db_to_linear(params.float(&OUTPUT));
        let bits = params.float(&BITS).round();
        let downsample = if mode == DistortionMode::Bitcrush {
            params.count(&DOWNSAMPLE).max(1)
        } else {
            1
        };
        let tone = params.float(&TONE);
        for channel in self.channels.iter_mut() {
            channel.tone.set_lowpass(tone, 0.707, sr);
        }
        self.mix.set(params.float(&MIX));

        let (channels, hold_count) = (&mut self.channels, &mut self.hold_count);
        run_frames(input, output, &mut self.mix, |l, r| {
            let refresh = *hold_count == 0;
            *hold_count = (*hold_count + 1) % downsample;
            let mut out = [l, r];
            for (x, ch) in out.iter_mut().zip(channels.iter_mut()) {
                if refresh {
                    ch.held = shape(mode, *x, drive, bits);
                }
                let y = ch.dc.highpass(ch.tone.process(ch.held));
                *x = y * level;
            }
            (out[0], out[1])
        });
    }

    fn reset(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.tone.clear();
            channel.dc.clear();
            channel.held = 0.0;
        }
        self.hold_count = 0;
        self.mix.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_util::{SR, noise, sine};

    #[test]
    fn fold_reflects_at_unity() {
        assert!((fold(0.5) - 0.5).abs() < 1e-12);
        assert!((fold(-0.5) + 0.5).abs() < 1e-12);
        assert!((fold(1.5) - 0.5).abs() < 1e-12);
        assert!((fold(3.0) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn crush_quantizes() {
        assert_eq!(crush(0.3, 1.0), 0.0);
        assert_eq!(crush(0.6, 1.0), 1.0);
        assert_eq!(crush(0.3, 3.0), 0.25);
    }

    #[test]
    fn curves_are_bounded() {
        for mode in [
            DistortionMode::Soft,
            DistortionMode::Hard,
            DistortionMode::Tube,
            DistortionMode::Fuzz,
            DistortionMode::Bitcrush,
            DistortionMode::Foldback,
        ] {
            for i in -100..=100 {
                let y = shape(mode, i as f64 * 0.1, 10.0, 8.0);
                assert!(y.abs() <= 1.0 + 1e-12, "{mode:?} {y}");
            }
        }
    }

    #[test]
    fn every_mode_stays_finite_and_centred() {
        let ctx = DspContext::new(SR);
        let input = sine(110.0, 44100, 0.8);
        for name in DistortionMode::OPTIONS {
            let params = ParamSnapshot::new().with("mode", *name).with("drive", 30.0).with("downsample", 4.0);
            let out = Distortion::new(SR).process(&input, &params, &ctx);
            assert!(out.is_finite(), "{name}");
            let tail = &out.left()[22050..];
            let mean: f32 = tail.iter().sum::<f32>() / tail.len() as f32;
            assert!(mean.abs() < 0.05, "{name} mean {mean}");
        }
    }

    #[test]
    fn drive_adds_harmonics() {
        let ctx = DspContext::new(SR);
        let input = noise(4096, 8);
        let clean = Distortion::new(SR).process(&input, &ParamSnapshot::new().with("drive", 0.0).with("mode", "hard"), &ctx);
        let dirty = Distortion::new(SR).process(&input, &ParamSnapshot::new().with("drive", 40.0).with("mode", "hard"), &ctx);
        assert!(dirty.rms() > clean.rms());
    }
}
