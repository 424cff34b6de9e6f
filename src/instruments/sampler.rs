//! Sample-based synthesis.
//!
//! Plays a mono sample buffer back through a rate-scaled read cursor with
//! linear interpolation. Three modes:
//!
//! - **Classic**: pitch follows playback speed, with optional loop points
//!   and a crossfade across the loop seam.
//! - **Granular**: a cloud of short windowed grains read around a slowly
//!   moving playhead, each at the note's pitch.
//! - **Stretch**: two grains at half-length offset, so the playhead speed
//!   (duration) and the grain read rate (pitch) are independent.

use std::f64::consts::PI;
use std::sync::Arc;

use crate::dsp::util::{equal_power_pan, ms_to_samples, normalize_velocity};
use crate::dsp::{Adsr, AudioBuffer, DspContext};
use crate::params::{ParamChoice, ParamSnapshot, ParamSpec};
use crate::unit::SynthesizerEngine;

use super::render_frames;

pub const MAX_GRAINS: usize = 16;

/// Root of the built-in synthetic samples (C4).
const SYNTH_ROOT_HZ: f64 = 261.63;
const SYNTH_SECONDS: f64 = 2.0;

/// A single sample buffer loaded into memory.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    /// Mono f64 samples.
    pub data: Vec<f64>,
    /// Native sample rate of the audio.
    pub sample_rate: u32,
    /// Pitch the sample plays at when read at its native rate.
    pub root_frequency: f64,
}

impl SampleBuffer {
    pub fn new(data: Vec<f64>, sample_rate: u32, root_frequency: f64) -> Self {
        SampleBuffer {
            data,
            sample_rate,
            root_frequency,
        }
    }

    /// Create from 16-bit signed PCM data.
    pub fn from_i16(pcm: &[i16], sample_rate: u32, root_frequency: f64) -> Self {
        let data = pcm.iter().map(|&s| s as f64 / 32768.0).collect();
        Self::new(data, sample_rate, root_frequency)
    }

    /// Create from f32 samples.
    pub fn from_f32(samples: &[f32], sample_rate: u32, root_frequency: f64) -> Self {
        let data = samples.iter().map(|&s| s as f64).collect();
        Self::new(data, sample_rate, root_frequency)
    }

    /// Built-in sample used until the host loads one.
    pub fn synthetic(source: SyntheticSource, sample_rate: u32) -> Self {
        let sr = sample_rate as f64;
        let frames = (SYNTH_SECONDS * sr) as usize;
        let data = (0..frames)
            .map(|i| {
                let t = i as f64 / sr;
                match source {
                    // Plucked harmonic tone, upper partials fading first
                    SyntheticSource::Tone => (1..=8)
                        .map(|n| {
                            let n = n as f64;
                            (2.0 * PI * SYNTH_ROOT_HZ * n * t).sin() / n * (-t * (1.5 + n)).exp()
                        })
                        .sum::<f64>()
                        * 0.6,
                    // Steady, loopable: odd/even partials with slow beating
                    SyntheticSource::Pad => (1..=6)
                        .map(|n| {
                            let n = n as f64;
                            let beat = 1.0 + 0.002 * n;
                            (2.0 * PI * SYNTH_ROOT_HZ * n * t).sin() / n
                                + 0.5 * (2.0 * PI * SYNTH_ROOT_HZ * n * beat * t).sin() / n
                        })
                        .sum::<f64>()
                        * 0.3,
                }
            })
            .collect();
        Self::new(data, sample_rate, SYNTH_ROOT_HZ)
    }

    /// Decode a WAV file held in memory, mixing all channels to mono. The
    /// root is estimated from the first second of audio.
    #[cfg(feature = "wav")]
    pub fn from_wav_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let mut reader = hound::WavReader::new(std::io::Cursor::new(bytes))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;
        let interleaved: Vec<f64> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(f64::from))
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.max(1) - 1)) as f64;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f64 * scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };
        let data: Vec<f64> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f64>() / channels as f64)
            .collect();
        if data.is_empty() {
            return Err(crate::DspError::Sample("WAV file has no audio".into()));
        }
        let head = &data[..data.len().min(spec.sample_rate as usize)];
        let estimate = crate::dsp::detect_pitch(head, spec.sample_rate as f64, 30.0, 2000.0);
        let root = if estimate.confidence < 0.5 || estimate.frequency <= 0.0 {
            SYNTH_ROOT_HZ
        } else {
            estimate.frequency
        };
        tracing::debug!(
            frames = data.len(),
            sample_rate = spec.sample_rate,
            channels,
            root,
            "decoded sample"
        );
        Ok(Self::new(data, spec.sample_rate, root))
    }

    /// Load a WAV file from disk. Host side only.
    #[cfg(feature = "wav")]
    pub fn load_wav(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| crate::DspError::Sample(e.to_string()))?;
        Self::from_wav_bytes(&bytes)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.data.len() as f64 / self.sample_rate as f64
        }
    }

    /// Read a sample with linear interpolation at a fractional position.
    pub fn read_interpolated(&self, position: f64) -> f64 {
        if self.data.is_empty() || !(position >= 0.0) {
            return 0.0;
        }

        let idx = position as usize;
        if idx >= self.data.len() - 1 {
            return if idx < self.data.len() { self.data[idx] } else { 0.0 };
        }

        let frac = position - idx as f64;
        self.data[idx] * (1.0 - frac) + self.data[idx + 1] * frac
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticSource {
    Tone,
    Pad,
}

impl ParamChoice for SyntheticSource {
    const OPTIONS: &'static [&'static str] = &["tone", "pad"];

    fn from_index(index: usize) -> Self {
        match index {
            1 => SyntheticSource::Pad,
            _ => SyntheticSource::Tone,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerMode {
    Classic,
    Granular,
    Stretch,
}

impl SamplerMode {
    pub const ALL: [SamplerMode; 3] = [SamplerMode::Classic, SamplerMode::Granular, SamplerMode::Stretch];

    /// Parameter schema for this mode.
    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            SamplerMode::Classic => PARAMS,
            SamplerMode::Granular => GRANULAR_PARAMS,
            SamplerMode::Stretch => STRETCH_PARAMS,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            SamplerMode::Classic => "sampler",
            SamplerMode::Granular => "granular-sampler",
            SamplerMode::Stretch => "stretch-sampler",
        }
    }

    fn default_loop(self) -> bool {
        !matches!(self, SamplerMode::Classic)
    }
}

const SOURCE: ParamSpec = ParamSpec::choice("source", SyntheticSource::OPTIONS, 0);
const LOOP: ParamSpec = ParamSpec::toggle("loop", false);
const LOOP_START: ParamSpec = ParamSpec::float("loopStart", 0.0, 1.0, 0.1);
const LOOP_END: ParamSpec = ParamSpec::float("loopEnd", 0.0, 1.0, 0.9);
const CROSSFADE: ParamSpec = ParamSpec::float("crossfade", 0.0, 200.0, 20.0);
const ATTACK: ParamSpec = ParamSpec::float("attack", 0.0, 5.0, 0.005);
const DECAY: ParamSpec = ParamSpec::float("decay", 0.0, 5.0, 0.1);
const SUSTAIN: ParamSpec = ParamSpec::float("sustain", 0.0, 1.0, 1.0);
const RELEASE: ParamSpec = ParamSpec::float("release", 0.0, 5.0, 0.1);
const GRAIN_SIZE: ParamSpec = ParamSpec::float("grainSize", 10.0, 500.0, 80.0);
const DENSITY: ParamSpec = ParamSpec::float("density", 1.0, 200.0, 30.0);
const JITTER: ParamSpec = ParamSpec::float("jitter", 0.0, 1.0, 0.2);
const SPREAD: ParamSpec = ParamSpec::float("spread", 0.0, 1.0, 0.5);
const SPEED: ParamSpec = ParamSpec::float("speed", 0.0, 4.0, 1.0);
const STRETCH: ParamSpec = ParamSpec::float("stretch", 0.25, 8.0, 1.0);
const GAIN: ParamSpec = ParamSpec::float("gain", 0.0, 1.0, 0.8);

pub const PARAMS: &[ParamSpec] = &[
    SOURCE, LOOP, LOOP_START, LOOP_END, CROSSFADE, ATTACK, DECAY, SUSTAIN, RELEASE, GAIN,
];

pub const GRANULAR_PARAMS: &[ParamSpec] = &[
    SOURCE, LOOP, LOOP_START, LOOP_END, ATTACK, DECAY, SUSTAIN, RELEASE, GRAIN_SIZE, DENSITY, JITTER, SPREAD,
    SPEED, GAIN,
];

pub const STRETCH_PARAMS: &[ParamSpec] = &[
    SOURCE, LOOP, LOOP_START, LOOP_END, ATTACK, DECAY, SUSTAIN, RELEASE, GRAIN_SIZE, STRETCH, GAIN,
];

#[derive(Debug, Clone, Copy, Default)]
struct Grain {
    active: bool,
    position: f64,
    rate: f64,
    age: usize,
    length: usize,
    left: f64,
    right: f64,
}

/// Region the cursor or playhead wraps within.
#[derive(Debug, Clone, Copy)]
struct Region {
    looping: bool,
    start: f64,
    end: f64,
    crossfade: f64,
}

impl Region {
    fn len(&self) -> f64 {
        self.end - self.start
    }
}

/// A playing sampler voice.
#[derive(Debug, Clone)]
pub struct SamplerVoice {
    mode: SamplerMode,
    sample_rate: f64,
    buffer: Arc<SampleBuffer>,
    /// The host loaded this sample; `source` no longer applies.
    custom_sample: bool,
    source: SyntheticSource,
    region: Region,
    /// Read cursor (classic) or playhead (granular/stretch), in source frames.
    position: f64,
    /// Source frames per output frame at the note's pitch.
    rate: f64,
    /// Playhead advance per output frame for granular/stretch.
    playhead_rate: f64,
    released: bool,
    finished: bool,
    envelope: Adsr,
    grains: [Grain; MAX_GRAINS],
    grain_length: usize,
    spawn_interval: f64,
    spawn_timer: f64,
    jitter: f64,
    spread: f64,
    grain_gain: f64,
    level: f64,
    rng: fastrand::Rng,
}

impl SamplerVoice {
    pub fn new(mode: SamplerMode, sample_rate: f64) -> Self {
        let buffer = SampleBuffer::synthetic(SyntheticSource::Tone, sample_rate.round() as u32);
        Self::with_buffer(mode, sample_rate, Arc::new(buffer), false)
    }

    /// A voice reading a host-supplied sample.
    pub fn with_sample(mode: SamplerMode, sample_rate: f64, buffer: Arc<SampleBuffer>) -> Self {
        Self::with_buffer(mode, sample_rate, buffer, true)
    }

    fn with_buffer(mode: SamplerMode, sample_rate: f64, buffer: Arc<SampleBuffer>, custom_sample: bool) -> Self {
        SamplerVoice {
            mode,
            sample_rate,
            buffer,
            custom_sample,
            source: SyntheticSource::Tone,
            region: Region {
                looping: false,
                start: 0.0,
                end: 0.0,
                crossfade: 0.0,
            },
            position: 0.0,
            rate: 1.0,
            playhead_rate: 1.0,
            released: false,
            finished: true,
            envelope: Adsr::new(sample_rate),
            grains: [Grain::default(); MAX_GRAINS],
            grain_length: 1,
            spawn_interval: 1.0,
            spawn_timer: 0.0,
            jitter: 0.0,
            spread: 0.0,
            grain_gain: 1.0,
            level: 0.0,
            rng: fastrand::Rng::with_seed(0x5A3B_1E00),
        }
    }

    pub fn mode(&self) -> SamplerMode {
        self.mode
    }

    pub fn set_sample(&mut self, buffer: Arc<SampleBuffer>) {
        self.buffer = buffer;
        self.custom_sample = true;
        self.reset();
    }

    pub fn sample(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn active_grains(&self) -> usize {
        self.grains.iter().filter(|g| g.active).count()
    }

    fn configure(&mut self, frequency: f64, params: &ParamSnapshot) {
        let source: SyntheticSource = params.choice(&SOURCE);
        if !self.custom_sample && source != self.source {
            self.buffer = Arc::new(SampleBuffer::synthetic(source, self.sample_rate.round() as u32));
            self.source = source;
        }
        let sr = self.sample_rate;
        let len = self.buffer.len() as f64;
        let sr_ratio = self.buffer.sample_rate as f64 / sr;
        let root = if self.buffer.root_frequency > 0.0 {
            self.buffer.root_frequency
        } else {
            SYNTH_ROOT_HZ
        };
        self.rate = frequency.max(0.0) / root * sr_ratio;

        let looping = params.bool_or(&LOOP, self.mode.default_loop());
        let a = params.float(&LOOP_START) * len;
        let b = params.float(&LOOP_END) * len;
        let (start, end) = if b - a >= 2.0 { (a, b) } else { (0.0, len) };
        let max_fade = start.min((end - start) * 0.5);
        self.region = Region {
            looping,
            start,
            end,
            crossfade: (ms_to_samples(params.float(&CROSSFADE), sr) * sr_ratio).min(max_fade),
        };

        self.grain_length = ms_to_samples(params.float(&GRAIN_SIZE), sr).round().max(2.0) as usize;
        match self.mode {
            SamplerMode::Classic => {
                self.position = 0.0;
            }
            SamplerMode::Granular => {
                self.position = if looping { start } else { 0.0 };
                self.playhead_rate = params.float(&SPEED) * sr_ratio;
                let density = params.float(&DENSITY);
                self.spawn_interval = sr / density;
                self.spawn_timer = 0.0;
                self.jitter = params.float(&JITTER);
                self.spread = params.float(&SPREAD);
                let overlap = density * self.grain_length as f64 / sr;
                self.grain_gain = 1.0 / overlap.max(1.0).sqrt();
            }
            SamplerMode::Stretch => {
                self.position = if looping { start } else { 0.0 };
                self.playhead_rate = sr_ratio / params.float(&STRETCH);
                let half = self.grain_length / 2;
                for (i, grain) in self.grains.iter_mut().enumerate() {
                    *grain = Grain::default();
                    if i < 2 {
                        // Second grain starts half a grain in, so windows sum to one
                        grain.active = true;
                        grain.position = self.position;
                        grain.rate = self.rate;
                        grain.length = self.grain_length;
                        grain.age = i * half;
                        grain.left = 1.0;
                        grain.right = 1.0;
                    }
                }
            }
        }
        if self.mode != SamplerMode::Stretch {
            self.grains = [Grain::default(); MAX_GRAINS];
        }
    }

    /// Wrap or finish after the cursor moved. Returns false when playback
    /// ran off the end.
    fn wrap(&mut self) -> bool {
        let region = self.region;
        if region.looping && !self.released {
            if self.position >= region.end {
                self.position = region.start + (self.position - region.end) % region.len();
            }
            true
        } else {
            self.position < self.buffer.len() as f64
        }
    }

    #[inline]
    fn classic(&mut self) -> (f64, f64) {
        let region = self.region;
        let mut s = self.buffer.read_interpolated(self.position);
        if region.looping && !self.released && region.crossfade > 0.0 {
            let fade_start = region.end - region.crossfade;
            if self.position >= fade_start {
                // Blend toward the audio just before loop start
                let t = ((self.position - fade_start) / region.crossfade).min(1.0);
                let other = self.buffer.read_interpolated(self.position - region.len());
                s = s * (1.0 - t) + other * t;
            }
        }
        self.position += self.rate;
        if !self.wrap() {
            self.finished = true;
        }
        (s, s)
    }

    #[inline]
    fn granular(&mut self) -> (f64, f64) {
        self.spawn_timer -= 1.0;
        if self.spawn_timer <= 0.0 {
            self.spawn_timer += self.spawn_interval;
            let offset = (self.rng.f64() * 2.0 - 1.0) * self.jitter * self.grain_length as f64;
            let pan = (self.rng.f64() * 2.0 - 1.0) * self.spread;
            let (left, right) = equal_power_pan(pan);
            if let Some(grain) = self.grains.iter_mut().find(|g| !g.active) {
                *grain = Grain {
                    active: true,
                    position: (self.position + offset).max(0.0),
                    rate: self.rate,
                    age: 0,
                    length: self.grain_length,
                    left,
                    right,
                };
            }
        }

        let (mut l, mut r) = (0.0, 0.0);
        for grain in self.grains.iter_mut().filter(|g| g.active) {
            // Half-sine window
            let w = (PI * grain.age as f64 / grain.length as f64).sin();
            let s = self.buffer.read_interpolated(grain.position) * w;
            l += s * grain.left;
            r += s * grain.right;
            grain.position += grain.rate;
            grain.age += 1;
            if grain.age >= grain.length {
                grain.active = false;
            }
        }
        self.position += self.playhead_rate;
        if !self.wrap() {
            self.finished = true;
        }
        (l * self.grain_gain, r * self.grain_gain)
    }

    #[inline]
    fn stretch(&mut self) -> (f64, f64) {
        let mut out = 0.0;
        for grain in self.grains.iter_mut().take(2) {
            if grain.age >= grain.length {
                // Restart at the playhead
                grain.age = 0;
                grain.position = self.position;
            }
            // sin^2 windows at half-length offset sum to one
            let w = (PI * grain.age as f64 / grain.length as f64).sin().powi(2);
            out += self.buffer.read_interpolated(grain.position) * w;
            grain.position += grain.rate;
            grain.age += 1;
        }
        self.position += self.playhead_rate;
        if !self.wrap() {
            self.finished = true;
        }
        (out, out)
    }
}

impl SynthesizerEngine for SamplerVoice {
    fn name(&self) -> &'static str {
        self.mode.id()
    }

    fn note_on(&mut self, frequency: f64, velocity: f64, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            self.sample_rate = sr;
            self.envelope.set_sample_rate(sr);
        }
        self.released = false;
        self.configure(frequency, params);
        self.finished = self.buffer.is_empty();
        self.envelope.set(
            params.float(&ATTACK),
            params.float(&DECAY),
            params.float(&SUSTAIN),
            params.float(&RELEASE),
        );
        self.envelope.trigger();
        self.level = normalize_velocity(velocity) * params.float(&GAIN);
    }

    /// Trigger note release. Loops stop wrapping and play out.
    fn note_off(&mut self, _ctx: &DspContext) {
        self.released = true;
        self.envelope.release();
    }

    fn render_into(&mut self, output: &mut AudioBuffer, _ctx: &DspContext) {
        render_frames(output, || {
            if self.finished || !self.envelope.is_active() {
                return (0.0, 0.0);
            }
            let (l, r) = match self.mode {
                SamplerMode::Classic => self.classic(),
                SamplerMode::Granular => self.granular(),
                SamplerMode::Stretch => self.stretch(),
            };
            let env = self.envelope.process() * self.level;
            (l * env, r * env)
        });
    }

    fn is_active(&self) -> bool {
        !self.finished && self.envelope.is_active()
    }

    fn reset(&mut self) {
        self.position = 0.0;
        self.released = false;
        self.finished = true;
        self.grains = [Grain::default(); MAX_GRAINS];
        self.envelope.reset();
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = fastrand::Rng::with_seed(seed);
    }
}
