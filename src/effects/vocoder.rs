//! Channel vocoder.
//!
//! The input (modulator) is split into log-spaced bands between 100 Hz and
//! 8 kHz, each followed by an envelope follower. A carrier runs through an
//! identical filter bank and each carrier band is rescaled so its envelope
//! matches the modulator's. The bands are summed and soft-clipped.

use crate::dsp::{AudioBuffer, BiquadFilter, DryWet, DspContext, EnvelopeFollower, Oscillator, Waveform};
use crate::params::{ParamSnapshot, ParamSpec, mix_spec};
use crate::unit::EffectProcessor;

use super::run_frames;

pub const MAX_BANDS: usize = 32;
const LOW_HZ: f64 = 100.0;
const HIGH_HZ: f64 = 8000.0;
/// Upper bound on per-band gain so a silent carrier band cannot explode.
const MAX_BAND_GAIN: f64 = 16.0;

const BANDS: ParamSpec = ParamSpec::float("bands", 1.0, MAX_BANDS as f64, 16.0).fixed();
const CARRIER_TYPE: ParamSpec = ParamSpec::choice("carrierType", &["sawtooth", "square", "pulse", "noise"], 0);
const CARRIER_FREQ: ParamSpec = ParamSpec::float("carrierFreq", 20.0, 2000.0, 110.0);
const VOICE_MIX: ParamSpec = ParamSpec::float("voiceMix", 0.0, 1.0, 0.0);
const ATTACK: ParamSpec = ParamSpec::float("attack", 0.5, 100.0, 5.0);
const RELEASE: ParamSpec = ParamSpec::float("release", 5.0, 500.0, 50.0);
const MIX: ParamSpec = mix_spec(1.0);

pub const PARAMS: &[ParamSpec] = &[BANDS, CARRIER_TYPE, CARRIER_FREQ, VOICE_MIX, ATTACK, RELEASE, MIX];

/// Centre frequency and Q of band `index` out of `bands`.
///
/// Centres are geometric midpoints of equal log-width slices of
/// 100 Hz..8 kHz; Q is chosen so neighbouring bands cross at their edges.
pub fn band_layout(index: usize, bands: usize) -> (f64, f64) {
    let bands = bands.clamp(1, MAX_BANDS);
    let step = (HIGH_HZ / LOW_HZ).powf(1.0 / bands as f64);
    let center = LOW_HZ * step.powf(index as f64 + 0.5);
    let q = step.sqrt() / (step - 1.0);
    (center, q.clamp(0.1, 40.0))
}

#[derive(Debug, Clone)]
struct Band {
    analysis: BiquadFilter,
    modulator: EnvelopeFollower,
    synth: [BiquadFilter; 2],
    carrier: [EnvelopeFollower; 2],
}

impl Band {
    fn new(sample_rate: f64) -> Self {
        let follower = EnvelopeFollower::new(0.005, 0.05, sample_rate);
        Band {
            analysis: BiquadFilter::new(),
            modulator: follower.clone(),
            synth: [BiquadFilter::new(), BiquadFilter::new()],
            carrier: [follower.clone(), follower],
        }
    }

    fn clear(&mut self) {
        self.analysis.clear();
        self.modulator.reset();
        for ch in 0..2 {
            self.synth[ch].clear();
            self.carrier[ch].reset();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vocoder {
    sample_rate: f64,
    bands: Vec<Band>,
    active: usize,
    osc: Oscillator,
    mix: DryWet,
}

impl Vocoder {
    pub fn new(sample_rate: f64) -> Self {
        Vocoder {
            sample_rate,
            bands: (0..MAX_BANDS).map(|_| Band::new(sample_rate)).collect(),
            active: 0,
            osc: Oscillator::with_seed(0x70C0),
            mix: DryWet::new(),
        }
    }

    fn configure(&mut self, count: usize, attack: f64, release: f64) {
        let sr = self.sample_rate;
        if count != self.active {
            for (i, band) in self.bands.iter_mut().take(count).enumerate() {
                let (center, q) = band_layout(i, count);
                band.analysis.set_bandpass(center, q, sr);
                for filter in band.synth.iter_mut() {
                    filter.set_bandpass(center, q, sr);
                }
                band.clear();
            }
            self.active = count;
        }
        for band in self.bands.iter_mut().take(count) {
            band.modulator.set_times(attack, release, sr);
            for follower in band.carrier.iter_mut() {
                follower.set_times(attack, release, sr);
            }
        }
    }
}

impl EffectProcessor for Vocoder {
    fn name(&self) -> &'static str {
        "vocoder"
    }

    fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot, ctx: &DspContext) {
        let sr = ctx.effective_sample_rate();
        if sr != self.sample_rate {
            *self = Self::new(sr);
        }
        let count = params.count(&BANDS).clamp(1, MAX_BANDS);
        self.configure(count, params.float(&ATTACK) * 0.001, params.float(&RELEASE) * 0.001);
        let waveform = match params.choice_index(&CARRIER_TYPE) {
            1 => Waveform::Square,
            2 => Waveform::Pulse,
            3 => Waveform::Noise,
            _ => Waveform::Sawtooth,
        };
        self.osc.set_frequency(params.float(&CARRIER_FREQ), sr);
        let voice_mix = params.float(&VOICE_MIX);
        self.mix.set(params.float(&MIX));

        let (bands, osc) = (&mut self.bands[..count], &mut self.osc);
        run_frames(input, output, &mut self.mix, |l, r| {
            let modulator = 0.5 * (l + r);
            let tone = if voice_mix < 1.0 { osc.next(waveform) } else { 0.0 };
            let carrier = [
                voice_mix * l + (1.0 - voice_mix) * tone,
                voice_mix * r + (1.0 - voice_mix) * tone,
            ];
            let mut out = [0.0; 2];
            for band in bands.iter_mut() {
                let target = band.modulator.process(band.analysis.process(modulator));
                for ch in 0..2 {
                    let y = band.synth[ch].process(carrier[ch]);
                    let level = band.carrier[ch].process(y);
                    let gain = (target / (level + 1e-9)).min(MAX_BAND_GAIN);
                    out[ch] += y * gain;
                }
            }
            (out[0].tanh(), out[1].tanh())
        });
    }

    fn reset(&mut self) {
        for band in self.bands.iter_mut() {
            band.clear();
        }
        self.osc.reset();
        self.mix.reset();
    }

    fn reseed(&mut self, seed: u64) {
        self.osc.reseed(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_util::{SR, sine};

    #[test]
    fn bands_cover_the_range() {
        let (first, _) = band_layout(0, 16);
        let (last, _) = band_layout(15, 16);
        assert!(first > LOW_HZ && first < 130.0);
        assert!(last < HIGH_HZ && last > 6000.0);
        let (single, _) = band_layout(0, 1);
        assert!((single - (LOW_HZ * HIGH_HZ).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn follows_modulator_level() {
        let mut fx = Vocoder::new(SR);
        let ctx = DspContext::new(SR);
        let params = ParamSnapshot::new();
        let loud = fx.process(&sine(500.0, 8192, 0.8), &params, &ctx);
        fx.reset();
        let quiet = fx.process(&AudioBuffer::silence(8192, SR), &params, &ctx);
        assert!(loud.rms() > 0.05);
        assert!(quiet.rms() < 1e-4);
    }

    #[test]
    fn noise_carrier_is_reproducible() {
        let params = ParamSnapshot::new().with("carrierType", "noise");
        let ctx = DspContext::new(SR);
        let input = sine(300.0, 4096, 0.5);
        let a = Vocoder::new(SR).process(&input, &params, &ctx);
        let b = Vocoder::new(SR).process(&input, &params, &ctx);
        assert_eq!(a, b);
    }
}
