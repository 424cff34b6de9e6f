//! Mixer: sums voice outputs with a master gain and a tanh safety stage.

use super::buffer::AudioBuffer;
use super::util::soft_clip;

/// A stereo summing bus. Accumulates in `f64` and only narrows on output.
#[derive(Debug, Clone)]
pub struct Mixer {
    pub master_gain: f64,
    left: Vec<f64>,
    right: Vec<f64>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Mixer {
            master_gain: 0.8,
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    /// Prepare `frames` of silence.
    pub fn clear(&mut self, frames: usize) {
        self.left.clear();
        self.left.resize(frames, 0.0);
        self.right.clear();
        self.right.resize(frames, 0.0);
    }

    /// Add one stereo frame at `index`; out-of-range indices are ignored.
    pub fn add(&mut self, index: usize, left: f64, right: f64) {
        if index < self.left.len() {
            self.left[index] += left;
            self.right[index] += right;
        }
    }

    /// Add a whole buffer starting at `offset`.
    pub fn add_buffer(&mut self, buffer: &AudioBuffer, offset: usize) {
        let n = buffer.frames().min(self.len().saturating_sub(offset));
        for i in 0..n {
            let (l, r) = buffer.frame(i);
            self.left[offset + i] += l as f64;
            self.right[offset + i] += r as f64;
        }
    }

    /// Write the mixed bus into `out` with master gain and soft clipping.
    pub fn output_into(&self, out: &mut AudioBuffer) {
        out.resize(self.len());
        for i in 0..self.len() {
            let l = soft_clip(self.left[i] * self.master_gain);
            let r = soft_clip(self.right[i] * self.master_gain);
            out.set_frame(i, l as f32, r as f32);
        }
    }

    pub fn output(&self, sample_rate: f64) -> AudioBuffer {
        let mut out = AudioBuffer::silence(self.len(), sample_rate);
        self.output_into(&mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}
