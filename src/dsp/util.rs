//! Numeric helpers shared by every unit.

use std::f64::consts::FRAC_PI_4;

/// Level used for silence when converting to decibels.
pub const MIN_DB: f64 = -120.0;

/// Convert decibels to linear amplitude.
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, floored at [`MIN_DB`].
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        MIN_DB
    } else {
        (20.0 * linear.log10()).max(MIN_DB)
    }
}

#[inline]
pub fn ms_to_samples(ms: f64, sample_rate: f64) -> f64 {
    (ms * 0.001 * sample_rate).max(0.0)
}

/// Clamp that also maps NaN to `min`.
#[inline]
pub fn clamp(x: f64, min: f64, max: f64) -> f64 {
    if x.is_nan() { min } else { x.clamp(min, max) }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
#[inline]
pub fn soft_clip(x: f64) -> f64 {
    x.tanh()
}

#[inline]
pub fn hard_clip(x: f64, limit: f64) -> f64 {
    x.clamp(-limit, limit)
}

/// Last-resort output guard: non-finite samples become silence and
/// anything beyond ±4 is hard-clipped.
#[inline]
pub fn sanitize(x: f64) -> f64 {
    if x.is_finite() { x.clamp(-4.0, 4.0) } else { 0.0 }
}

/// MIDI note number (fractional allowed) to frequency at A4 = 440 Hz.
#[inline]
pub fn midi_to_freq(midi: f64) -> f64 {
    440.0 * 2.0_f64.powf((midi - 69.0) / 12.0)
}

/// Frequency to fractional MIDI note number at A4 = 440 Hz.
#[inline]
pub fn freq_to_midi(freq: f64) -> f64 {
    69.0 + 12.0 * (freq / 440.0).log2()
}

#[inline]
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}

/// Equal-power pan. `pan` in [-1, 1], returns (left, right) gains.
#[inline]
pub fn equal_power_pan(pan: f64) -> (f64, f64) {
    let angle = (clamp(pan, -1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Balance pan: centre leaves both channels at unity.
#[inline]
pub fn balance_pan(pan: f64) -> (f64, f64) {
    let pan = clamp(pan, -1.0, 1.0);
    ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0))
}

/// Note-division length in milliseconds at `tempo` BPM.
///
/// `beats` is the division expressed in quarter notes (1.0 = 1/4,
/// 0.5 = 1/8, 0.75 = dotted 1/8).
#[inline]
pub fn tempo_division_ms(tempo: f64, beats: f64) -> f64 {
    let tempo = if tempo > 0.0 { tempo } else { 120.0 };
    60_000.0 / tempo * beats
}

/// One-pole smoothing coefficient for a time constant in seconds.
#[inline]
pub fn time_to_coeff(seconds: f64, sample_rate: f64) -> f64 {
    if seconds <= 0.0 || sample_rate <= 0.0 {
        0.0
    } else {
        (-1.0 / (seconds * sample_rate)).exp()
    }
}

/// Normalize a host velocity: values above 1 are MIDI velocities.
#[inline]
pub fn normalize_velocity(velocity: f64) -> f64 {
    if !velocity.is_finite() {
        return 0.0;
    }
    let v = if velocity > 1.0 { velocity / 127.0 } else { velocity };
    v.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn db_round_trip() {
        assert_abs_diff_eq!(db_to_linear(0.0), 1.0);
        assert_abs_diff_eq!(db_to_linear(-6.0206), 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(linear_to_db(0.5), -6.0206, epsilon = 1e-3);
        assert_eq!(linear_to_db(0.0), MIN_DB);
    }

    #[test]
    fn midi_frequency_inverse() {
        assert_abs_diff_eq!(midi_to_freq(69.0), 440.0);
        assert_abs_diff_eq!(freq_to_midi(880.0), 81.0, epsilon = 1e-12);
        assert_abs_diff_eq!(midi_to_freq(freq_to_midi(261.6256)), 261.6256, epsilon = 1e-9);
    }

    #[test]
    fn sanitize_blocks_non_finite() {
        assert_eq!(sanitize(f64::NAN), 0.0);
        assert_eq!(sanitize(f64::INFINITY), 0.0);
        assert_eq!(sanitize(10.0), 4.0);
        assert_eq!(sanitize(0.25), 0.25);
    }

    #[test]
    fn pan_laws() {
        let (l, r) = equal_power_pan(0.0);
        assert_abs_diff_eq!(l, r, epsilon = 1e-12);
        assert_abs_diff_eq!(l * l + r * r, 1.0, epsilon = 1e-12);
        assert_eq!(balance_pan(0.0), (1.0, 1.0));
        assert_eq!(balance_pan(1.0), (0.0, 1.0));
    }

    #[test]
    fn velocity_accepts_midi_scale() {
        assert_abs_diff_eq!(normalize_velocity(127.0), 1.0);
        assert_abs_diff_eq!(normalize_velocity(0.5), 0.5);
        assert_eq!(normalize_velocity(-3.0), 0.0);
    }

    #[test]
    fn tempo_division() {
        assert_abs_diff_eq!(tempo_division_ms(120.0, 1.0), 500.0);
        assert_abs_diff_eq!(tempo_division_ms(120.0, 0.75), 375.0);
    }
}
