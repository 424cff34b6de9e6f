//! Fixed-capacity circular delay line.
//!
//! Tap distances are measured from the most recently written sample:
//! `read(0)` returns what the last `write` stored, `read(1)` the sample
//! before it. An effect that writes its input before reading therefore
//! passes it straight through at zero delay.

#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f64>,
    write_pos: usize,
}

impl DelayLine {
    /// A line able to look back `max_delay` samples.
    pub fn new(max_delay: usize) -> Self {
        DelayLine {
            buffer: vec![0.0; max_delay + 2],
            write_pos: 0,
        }
    }

    pub fn with_max_seconds(seconds: f64, sample_rate: f64) -> Self {
        Self::new((seconds.max(0.0) * sample_rate).ceil() as usize)
    }

    /// Longest integer tap distance.
    pub fn max_delay(&self) -> usize {
        self.buffer.len() - 2
    }

    #[inline]
    pub fn write(&mut self, x: f64) {
        self.buffer[self.write_pos] = if x.is_finite() { x } else { 0.0 };
        self.write_pos += 1;
        if self.write_pos == self.buffer.len() {
            self.write_pos = 0;
        }
    }

    /// Add to the most recently written sample (feedback injection after
    /// the taps for this sample have been read).
    #[inline]
    pub fn add_to_newest(&mut self, x: f64) {
        let newest = self.index_back(0);
        let v = self.buffer[newest] + x;
        self.buffer[newest] = if v.is_finite() { v } else { 0.0 };
    }

    #[inline]
    fn index_back(&self, samples_back: usize) -> usize {
        let len = self.buffer.len();
        (self.write_pos + len - 1 - samples_back % len) % len
    }

    /// Integer tap, clamped to the capacity.
    #[inline]
    pub fn read(&self, samples_back: usize) -> f64 {
        self.buffer[self.index_back(samples_back.min(self.max_delay()))]
    }

    /// Linearly interpolated fractional tap. At an integer distance this is
    /// exactly `read(d)`.
    #[inline]
    pub fn read_interpolated(&self, samples_back: f64) -> f64 {
        let d = if samples_back.is_finite() {
            samples_back.clamp(0.0, self.max_delay() as f64)
        } else {
            0.0
        };
        let whole = d.floor();
        let frac = d - whole;
        let i = whole as usize;
        let s0 = self.read(i);
        if frac == 0.0 {
            return s0;
        }
        let s1 = self.read(i + 1);
        s0 + frac * (s1 - s0)
    }

    /// Zero the buffer and rewind the write pointer.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_zero_is_newest() {
        let mut d = DelayLine::new(8);
        d.write(1.0);
        d.write(2.0);
        assert_eq!(d.read(0), 2.0);
        assert_eq!(d.read(1), 1.0);
        assert_eq!(d.read(2), 0.0);
    }

    #[test]
    fn interpolated_matches_integer_taps() {
        let mut d = DelayLine::new(64);
        for i in 0..200 {
            d.write((i as f64 * 0.37).sin());
        }
        for k in 0..64 {
            assert_eq!(d.read_interpolated(k as f64), d.read(k));
        }
        let mid = d.read_interpolated(3.5);
        assert!((mid - 0.5 * (d.read(3) + d.read(4))).abs() < 1e-12);
    }

    #[test]
    fn clear_zeroes_everything() {
        let mut d = DelayLine::new(16);
        for _ in 0..40 {
            d.write(0.7);
        }
        d.clear();
        for k in 0..=16 {
            assert_eq!(d.read(k), 0.0);
        }
    }

    #[test]
    fn wraps_around_capacity() {
        let mut d = DelayLine::new(4);
        for i in 0..23 {
            d.write(i as f64);
        }
        assert_eq!(d.read(0), 22.0);
        assert_eq!(d.read(4), 18.0);
        // Beyond capacity clamps to the oldest tap
        assert_eq!(d.read(100), 18.0);
    }

    #[test]
    fn feedback_injection_hits_newest() {
        let mut d = DelayLine::new(4);
        d.write(1.0);
        d.add_to_newest(0.5);
        assert_eq!(d.read(0), 1.5);
    }
}
