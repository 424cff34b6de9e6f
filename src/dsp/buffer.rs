//! Audio buffers and the render context handed in by the host.

use serde::{Deserialize, Serialize};

/// A block of stereo audio.
///
/// Samples are `f32` in a nominal [-1, 1] range. Both channels always have
/// the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    left: Vec<f32>,
    right: Vec<f32>,
    sample_rate: f64,
}

impl AudioBuffer {
    /// A silent buffer of `frames` stereo frames.
    pub fn silence(frames: usize, sample_rate: f64) -> Self {
        AudioBuffer {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
            sample_rate,
        }
    }

    /// Duplicate a mono signal onto both channels.
    pub fn from_mono(samples: &[f32], sample_rate: f64) -> Self {
        AudioBuffer {
            left: samples.to_vec(),
            right: samples.to_vec(),
            sample_rate,
        }
    }

    /// Build from two channels. The longer channel is truncated.
    pub fn from_stereo(mut left: Vec<f32>, mut right: Vec<f32>, sample_rate: f64) -> Self {
        let frames = left.len().min(right.len());
        left.truncate(frames);
        right.truncate(frames);
        AudioBuffer {
            left,
            right,
            sample_rate,
        }
    }

    /// Build from interleaved L/R samples. A trailing odd sample is dropped.
    pub fn from_interleaved(samples: &[f32], sample_rate: f64) -> Self {
        let frames = samples.len() / 2;
        let mut buffer = Self::silence(frames, sample_rate);
        for i in 0..frames {
            buffer.left[i] = samples[2 * i];
            buffer.right[i] = samples[2 * i + 1];
        }
        buffer
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate > 0.0 {
            self.frames() as f64 / self.sample_rate
        } else {
            0.0
        }
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    pub fn left_mut(&mut self) -> &mut [f32] {
        &mut self.left
    }

    pub fn right_mut(&mut self) -> &mut [f32] {
        &mut self.right
    }

    /// Both channels mutably at once.
    pub fn channels_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.left, &mut self.right)
    }

    /// Channel by index (0 = left, anything else = right).
    pub fn channel(&self, index: usize) -> &[f32] {
        if index == 0 { &self.left } else { &self.right }
    }

    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        (self.left[index], self.right[index])
    }

    #[inline]
    pub fn set_frame(&mut self, index: usize, left: f32, right: f32) {
        self.left[index] = left;
        self.right[index] = right;
    }

    /// Resize to `frames`, zero-filling new frames. Never shrinks capacity,
    /// so a buffer reused at a steady block size does not reallocate.
    pub fn resize(&mut self, frames: usize) {
        self.left.resize(frames, 0.0);
        self.right.resize(frames, 0.0);
    }

    pub fn fill_silence(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
    }

    /// Copy another buffer's samples and rate into this one.
    pub fn copy_from(&mut self, other: &AudioBuffer) {
        self.left.clear();
        self.left.extend_from_slice(&other.left);
        self.right.clear();
        self.right.extend_from_slice(&other.right);
        self.sample_rate = other.sample_rate;
    }

    /// Add `other` into this buffer, scaled by `gain`, starting at `offset`.
    pub fn mix_from(&mut self, other: &AudioBuffer, offset: usize, gain: f32) {
        if offset >= self.frames() {
            return;
        }
        let n = other.frames().min(self.frames() - offset);
        for i in 0..n {
            self.left[offset + i] += other.left[i] * gain;
            self.right[offset + i] += other.right[i] * gain;
        }
    }

    /// Largest absolute sample over both channels.
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(self.right.iter())
            .fold(0.0f32, |acc, &s| acc.max(s.abs()))
    }

    /// RMS over both channels.
    pub fn rms(&self) -> f32 {
        let n = self.left.len() + self.right.len();
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .left
            .iter()
            .chain(self.right.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        (sum / n as f64).sqrt() as f32
    }

    pub fn is_finite(&self) -> bool {
        self.left.iter().chain(self.right.iter()).all(|s| s.is_finite())
    }

    /// Interleaved L/R copy.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frames() * 2);
        for i in 0..self.frames() {
            out.push(self.left[i]);
            out.push(self.right[i]);
        }
        out
    }
}

/// Render-time environment supplied by the host on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DspContext {
    /// Samples per second.
    pub sample_rate: f64,
    /// Tempo in beats per minute.
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    /// Transport position in seconds, if the host tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
}

fn default_tempo() -> f64 {
    120.0
}

impl DspContext {
    pub fn new(sample_rate: f64) -> Self {
        DspContext {
            sample_rate,
            tempo: default_tempo(),
            current_time: None,
        }
    }

    pub fn with_tempo(mut self, tempo: f64) -> Self {
        self.tempo = tempo;
        self
    }

    pub fn with_time(mut self, seconds: f64) -> Self {
        self.current_time = Some(seconds);
        self
    }

    /// The sample rate, or 44.1 kHz if the host sent something unusable.
    pub fn effective_sample_rate(&self) -> f64 {
        if self.sample_rate.is_finite() && self.sample_rate >= 1000.0 {
            self.sample_rate
        } else {
            44100.0
        }
    }

    pub fn nyquist(&self) -> f64 {
        self.effective_sample_rate() * 0.5
    }

    /// Samples per quarter-note beat at the current tempo.
    pub fn samples_per_beat(&self) -> f64 {
        let tempo = if self.tempo.is_finite() && self.tempo > 0.0 {
            self.tempo
        } else {
            default_tempo()
        };
        self.effective_sample_rate() * 60.0 / tempo
    }

    pub fn ms_to_samples(&self, ms: f64) -> f64 {
        super::util::ms_to_samples(ms, self.effective_sample_rate())
    }
}

impl Default for DspContext {
    fn default() -> Self {
        DspContext::new(44100.0)
    }
}
