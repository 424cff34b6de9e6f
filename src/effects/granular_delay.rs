//! Granular delay: short windowed grains read back from a delay line.
//!
//! Grains are spawned at a fixed cadence derived from `density`, each with
//! its own start offset, playback speed, pan and age. A grain reads the line
//! at a distance that drifts by `1 - speed` per sample, so pitch follows
//! `speed` while the grain stays anchored near `time` in the past.

use std::f64::consts::PI;

use crate::dsp::util::{balance_pan, ms_to_samples, semitones_to_ratio};
use crate::dsp::{AudioBuffer, DelayLine, DryWet, DspContext};
use crate::params::{ParamSnapshot, ParamSpec, mix_spec};
use crate::unit::EffectProcessor;

use super::run_frames;

/// Grain pool size; a spawn with every slot busy is dropped.
pub const MAX_GRAINS: usize = 32;

const TIME: ParamSpec = ParamSpec::float("time", 0.0, 2000.0, 250.0);
const GRAIN_SIZE: ParamSpec = ParamSpec::float("grainSize", 10.0, 500.0, 80.0);
const DENSITY: ParamSpec = ParamSpec::float("density", 1.0, 50.0, 10.0);
const PITCH: ParamSpec = ParamSpec::float("pitch", -12.0, 12.0, 0.0);
const JITTER: ParamSpec = ParamSpec::float("jitter", 0.0, 1.0, 0.3);
const SPREAD: ParamSpec = ParamSpec::float("spread", 0.0, 1.0, 0.5);
const FEEDBACK: ParamSpec = ParamSpec::float("feedback", 0.0, 0.9, 0.3);
const MIX: ParamSpec = mix_spec(0.5);

pub const PARAMS: &[ParamSpec] = &[TIME, GRAIN_SIZE, DENSITY, PITCH, JITTER, SPREAD, FEEDBACK, MIX];

const MAX_SECONDS: f64 = 4.0;

#[derive(Debug, Clone, Copy, Default)]
struct Grain {
    active: bool,
    /// Read distance behind the write head, in samples.
    position: f64,
    speed: f64,
    gain_l: f64,
    gain_r: f64,
    age: f64,
    length: f64,
}

#[derive(Debug, Clone, Copy)]
struct GranularConfig {
    delay: f64,
    length: f64,
    interval: f64,
    speed: f64,
    jitter: f64,
    spread: f64,
    feedback: f64,
    norm: f64,
}

impl GranularConfig {
    fn from_params(params: &ParamSnapshot, sample_rate: f64) -> Self {
        let length = ms_to_samples(params.float(&GRAIN_SIZE), sample_rate).max(16.0);
        let density = params.float(&DENSITY);
        let overlap = (density * length / sample_rate).max(1.0);
        GranularConfig {
            delay: ms_to_samples(params.float(&TIME), sample_rate),
            length,
            interval: sample_rate / density,
            speed: semitones_to_ratio(params.float(&PITCH)),
            jitter: params.float(&JITTER),
            spread: params.float(&SPREAD),
            feedback: params.float(&FEEDBACK),
            norm: 1.0 / overlap.sqrt(),
        }
    }
}

#[derive(Debug, Clone)]
struct GrainCloud {
    grains: [Grain; MAX_GRAINS],
    until_next: f64,
    max_distance: f64,
    rng: fastrand::Rng,
}

impl GrainCloud {
    fn spawn(&mut self, cfg: &GranularConfig) {
        let Some(slot) = self.grains.iter_mut().find(|g| !g.active) else {
            return;
        };
        let offset = cfg.jitter * self.rng.f64() * cfg.length;
        // Pitch-up grains eat into the distance; start far enough back
        let travel = ((cfg.speed - 1.0) * cfg.length).max(0.0) + 1.0;
        let position = (cfg.delay + offset).max(travel);
        let pan = cfg.spread * (self.rng.f64() * 2.0 - 1.0);
        let (gain_l, gain_r) = balance_pan(pan);
        *slot = Grain {
            active: true,
            position: position.min(self.max_distance),
            speed: cfg.speed,
            gain_l,
            gain_r,
            age: 0.0,
            length: cfg.length,
        };
    }

    #[inline]
    fn tick(&mut self, left: &DelayLine, right: &DelayLine, cfg: &GranularConfig) -> (f64, f64) {
        self.until_next -= 1.0;
        if self.until_next <= 0.0 {
            self.spawn(cfg);
            self.until_next += cfg.interval;
        }

        let mut out_l = 0.0;
        let mut out_r = 0.0;
        for grain in self.grains.iter_mut().filter(|g| g.active) {
            let window = (PI * (grain.age + 0.5) / grain.length).sin();
            out_l += left.read_interpolated(grain.position) * window * grain.gain_l;
            out_r += right.read_interpolated(grain.position) * window * grain.gain_r;

            grain.position = (grain.position + 1.0 - grain.speed).clamp(0.0, self.max_distance);
            grain.age += 1.0;
            if grain.age >= grain.length {
                grain.active = false;
            }
        }
        (out_l * cfg.norm, out_r * cfg.norm)
    }

    fn active(&self) -> usize {
        self.grains.iter().filter(|g| g.active).count()
    }

    fn clear(&mut self) {
        self.grains = [Grain::default(); MAX_GRAINS];
        self.until_next = 0.0;
    }
}

#[derive(Debug, Clone)]
pub struct GranularDelay {
    sample_rate: f64,
    left: DelayLine,
    right: DelayLine,
    cloud: GrainCloud,
    mix: DryWet,
}

impl GranularDelay {
    pub fn new(sample_rate: f64) -> Self {
        let left = DelayLine::with_max_seconds(MAX_SECONDS, sample_rate);
        let max_distance = left.max_delay() as f64;
        GranularDelay {
            sample_rate,
            right: left.clone(),
            left,
            cloud: GrainCloud {
                grains: [Grain::default(); MAX_GRAINS],
                until_next: 0.0,
                max_distance,
                rng: fastrand::Rng::with_seed(0x6EA1),
            },
            mix: DryWet::new(),
        }
    }

    /// Grains currently sounding.
    pub fn active_grains(&self) -> usize {
        self.cloud.active()
    }
}

impl EffectProcessor for GranularDelay {
    fn name(&self) -> &'static str {
        "granular-delay"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let cfg = GranularConfig::from_params(params, sr);
        self.mix.set(params.float(&MIX));

        let (left, right, cloud) = (&mut self.left, &mut self.right, &mut self.cloud);
        run_frames(input, output, &mut self.mix, |l, r| {
            left.write(l);
            right.write(r);
            let (wet_l, wet_r) = cloud.tick(left, right, &cfg);
            left.add_to_newest(cfg.feedback * wet_l);
            right.add_to_newest(cfg.feedback * wet_r);
            (wet_l, wet_r)
        });
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.cloud.clear();
        self.mix.reset();
    }

    fn reseed(&mut self, seed: u64) {
        self.cloud.rng = fastrand::Rng::with_seed(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_util::{SR, noise, sine};

    #[test]
    fn nothing_arrives_before_delay_time() {
        let mut fx = GranularDelay::new(SR);
        let params = ParamSnapshot::new()
            .with("time", 100.0)
            .with("jitter", 0.0)
            .with("feedback", 0.0)
            .with("mix", 1.0);
        let out = fx.process(&sine(330.0, 22050, 0.8), &params, &DspContext::new(SR));
        assert!(out.left()[..4400].iter().all(|s| s.abs() < 1e-9));
        let tail = AudioBuffer::from_mono(&out.left()[8000..], SR);
        assert!(tail.rms() > 0.05);
    }

    #[test]
    fn pool_never_exceeds_capacity() {
        let mut fx = GranularDelay::new(SR);
        let params = ParamSnapshot::new().with("density", 50.0).with("grainSize", 500.0);
        let ctx = DspContext::new(SR);
        let input = noise(4096, 4);
        for _ in 0..8 {
            let out = fx.process(&input, &params, &ctx);
            assert!(out.is_finite());
            assert!(fx.active_grains() <= MAX_GRAINS);
        }
        assert!(fx.active_grains() > 20);
    }

    #[test]
    fn same_seed_same_output() {
        let params = ParamSnapshot::new()
            .with("time", 20.0)
            .with("jitter", 1.0)
            .with("spread", 1.0)
            .with("pitch", 5.0);
        let ctx = DspContext::new(SR);
        let input = noise(8192, 2);
        let mut a = GranularDelay::new(SR);
        let mut b = GranularDelay::new(SR);
        assert_eq!(a.process(&input, &params, &ctx), b.process(&input, &params, &ctx));

        let mut c = GranularDelay::new(SR);
        c.reseed(99);
        let mut d = GranularDelay::new(SR);
        assert_ne!(c.process(&input, &params, &ctx), d.process(&input, &params, &ctx));
    }
}
