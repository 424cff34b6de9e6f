use std::f64::consts::TAU;

use approx::assert_abs_diff_eq;
use tonelab_core::dsp::{
    Adsr, AudioBuffer, BiquadFilter, DelayLine, DspContext, LadderFilter, OnePoleFilter, Scale, StateVariableFilter,
    SvfMode, quantize_to_scale,
};
use tonelab_core::effects::vocoder::band_layout;
use tonelab_core::instruments::{FmModel, FmSynth};
use tonelab_core::renderer::{NoteEvent, render_events};
use tonelab_core::{ParamSnapshot, SynthesizerEngine, UnitKind, UnitRegistry};

const SR: f64 = 44100.0;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn noise(frames: usize, seed: u64) -> AudioBuffer {
    let mut rng = fastrand::Rng::with_seed(seed);
    let left: Vec<f32> = (0..frames).map(|_| rng.f32() * 2.0 - 1.0).collect();
    let right: Vec<f32> = (0..frames).map(|_| rng.f32() * 2.0 - 1.0).collect();
    AudioBuffer::from_stereo(left, right, SR)
}

fn sine(freq: f64, frames: usize, amp: f64) -> AudioBuffer {
    let samples: Vec<f32> = (0..frames)
        .map(|i| (amp * (TAU * freq * i as f64 / SR).sin()) as f32)
        .collect();
    AudioBuffer::from_mono(&samples, SR)
}

/// Feed an impulse and return the largest magnitude over the last 100 of
/// `frames` samples.
fn impulse_tail(frames: usize, mut filter: impl FnMut(f64) -> f64) -> f64 {
    (0..frames)
        .map(|i| filter(if i == 0 { 1.0 } else { 0.0 }))
        .skip(frames - 100)
        .fold(0.0, |m, y: f64| m.max(y.abs()))
}

#[test]
fn filter_impulse_responses_decay() {
    for freq in [100.0, 1000.0, 5000.0, 15000.0] {
        for q in [0.5, 0.707, 4.0, 10.0] {
            let biquads = [
                BiquadFilter::lowpass(freq, q, SR),
                BiquadFilter::highpass(freq, q, SR),
                BiquadFilter::bandpass(freq, q, SR),
                BiquadFilter::peaking(freq, q, 12.0, SR),
                BiquadFilter::peaking(freq, q, -12.0, SR),
            ];
            for mut f in biquads {
                assert!(impulse_tail(SR as usize, |x| f.process(x)) < 1e-6, "biquad {freq} Hz q {q}");
            }
        }
        for res in [0.0, 0.5, 0.9] {
            for mode in [SvfMode::Lowpass, SvfMode::Bandpass, SvfMode::Highpass, SvfMode::Notch] {
                let mut svf = StateVariableFilter::new();
                svf.set(freq, res, SR);
                assert!(impulse_tail(SR as usize, |x| svf.process(x, mode)) < 1e-6, "svf {freq} Hz res {res}");
            }
        }
        for res in [0.0, 0.3, 0.6] {
            let mut ladder = LadderFilter::new();
            ladder.set(freq, res, SR);
            assert!(impulse_tail(SR as usize, |x| ladder.process(x)) < 1e-6, "ladder {freq} Hz res {res}");
        }
        let mut one_pole = OnePoleFilter::new(freq, SR);
        assert!(impulse_tail(SR as usize, |x| one_pole.lowpass(x)) < 1e-6);
    }
}

#[test]
fn delay_line_clears_and_interpolates_exactly() {
    let mut line = DelayLine::new(64);
    for i in 0..200 {
        line.write((i as f64 * 0.37).sin());
    }
    for d in 0..=64 {
        assert_eq!(line.read_interpolated(d as f64), line.read(d));
    }
    line.clear();
    for d in 0..=64 {
        assert_eq!(line.read(d), 0.0);
        assert_eq!(line.read_interpolated(d as f64 + 0.5), 0.0);
    }
}

#[test]
fn adsr_reaches_sustain_and_finishes_release() {
    let mut env = Adsr::new(SR);
    env.set(0.01, 0.02, 0.35, 0.05);
    env.trigger();
    for _ in 0..(0.03 * SR) as usize + 10 {
        env.process();
    }
    assert_eq!(env.process(), 0.35);
    env.release();
    for _ in 0..(0.05 * SR) as usize + 1 {
        env.process();
    }
    assert!(!env.is_active());
}

#[test]
fn scale_quantizer_properties() {
    for &degree in Scale::Minor.degrees() {
        let note = 57.0 + degree as f64;
        assert_eq!(quantize_to_scale(note, Scale::Minor, 9), note);
    }
    // F# sits between F and G in C major: tie goes to F, listed first
    assert_eq!(quantize_to_scale(66.0, Scale::Major, 0), 65.0);
    assert_eq!(quantize_to_scale(66.3, Scale::Major, 0), 67.0);
}

#[test]
fn fm_without_modulation_is_pure_sines() {
    let ctx = DspContext::new(SR);
    let mut params = ParamSnapshot::new()
        .with("attack", 0.0)
        .with("decay", 0.0)
        .with("sustain", 1.0)
        .with("modDecay", 0.0)
        .with("modSustain", 1.0);
    for s in 1..=4 {
        for t in 1..=4 {
            params.set(&format!("mod{s}{t}"), 0.0);
        }
        params.set(&format!("ratio{s}"), s as f64);
    }
    let mut synth = FmSynth::new(FmModel::Modular, SR);
    synth.note_on(150.0, 1.0, &params, &ctx);
    for n in 0..512 {
        synth.render(1, &ctx);
        let t = n as f64 / SR;
        for (i, &out) in synth.operator_outputs().iter().enumerate() {
            let expected = (TAU * 150.0 * (i + 1) as f64 * t).sin();
            assert_abs_diff_eq!(out, expected, epsilon = 1e-9);
        }
    }
}

#[test]
fn mix_zero_is_dry_for_every_effect() {
    init_logging();
    let registry = UnitRegistry::with_builtin_units();
    let ctx = DspContext::new(SR);
    let input = noise(2048, 21);
    let params = ParamSnapshot::new().with("mix", 0.0);
    for id in registry.ids_of(UnitKind::Effect) {
        let mut effect = registry.create_effect(id, SR).unwrap();
        for _ in 0..2 {
            assert_eq!(effect.process(&input, &params, &ctx), input, "{id}");
        }
    }
}

#[test]
fn mix_changes_between_blocks_take_effect_at_once() {
    init_logging();
    let registry = UnitRegistry::with_builtin_units();
    let ctx = DspContext::new(SR);
    let first = noise(2048, 31);
    let second = noise(2048, 32);
    let half = ParamSnapshot::new().with("mix", 0.5);
    let dry = ParamSnapshot::new().with("mix", 0.0);
    let wet = ParamSnapshot::new().with("mix", 1.0);
    for id in registry.ids_of(UnitKind::Effect) {
        let mut effect = registry.create_effect(id, SR).unwrap();
        effect.process(&first, &half, &ctx);
        assert_eq!(effect.process(&second, &dry, &ctx), second, "{id} bypass after mix 0.5");

        let mut changed = registry.create_effect(id, SR).unwrap();
        let mut reference = registry.create_effect(id, SR).unwrap();
        changed.process(&first, &half, &ctx);
        reference.process(&first, &wet, &ctx);
        assert_eq!(
            changed.process(&second, &wet, &ctx),
            reference.process(&second, &wet, &ctx),
            "{id} fully wet after mix 0.5"
        );
    }
}

#[test]
fn mix_one_is_fully_wet() {
    let registry = UnitRegistry::with_builtin_units();
    let ctx = DspContext::new(SR);
    let mut delay = registry.create_effect("digital-delay", SR).unwrap();
    let params = ParamSnapshot::new().with("time", 10.0).with("feedback", 0.0).with("mix", 1.0);
    let out = delay.process(&noise(1024, 5), &params, &ctx);
    // Nothing of the dry signal before the first echo
    assert!(out.left()[..441].iter().all(|&s| s == 0.0));
    assert!(out.left()[441..].iter().any(|&s| s != 0.0));
}

#[test]
fn one_second_of_a_440_hz_voice_is_44100_frames() {
    let registry = UnitRegistry::with_builtin_units();
    let ctx = DspContext::new(SR);
    let mut voice = registry.create_instrument("basic", SR).unwrap();
    voice.note_on(440.0, 0.8, &ParamSnapshot::new().with("waveform", "sine"), &ctx);
    let out = voice.render(SR as usize, &ctx);
    assert_eq!(out.frames(), 44100);
    assert!(out.is_finite());

    let events = [NoteEvent::new(440.0, 0.8, 1000.0, 0.0)];
    let rendered = render_events(&registry, "basic", &ParamSnapshot::new(), &events, &ctx, 44100).unwrap();
    assert_eq!(rendered.frames(), 44100);
}

#[test]
fn zero_time_delay_without_feedback_passes_through() {
    let registry = UnitRegistry::with_builtin_units();
    let ctx = DspContext::new(SR);
    let input = noise(4096, 8);
    let params = ParamSnapshot::new().with("time", 0.0).with("feedback", 0.0).with("mix", 1.0);
    let mut delay = registry.create_effect("digital-delay", SR).unwrap();
    let out = delay.process(&input, &params, &ctx);
    for (a, b) in input.left().iter().zip(out.left()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }
}

#[test]
fn single_band_vocoder_with_full_voice_is_a_bandpass() {
    let registry = UnitRegistry::with_builtin_units();
    let ctx = DspContext::new(SR);
    let input = sine(700.0, 8192, 0.05);
    let params = ParamSnapshot::new().with("bands", 1.0).with("voiceMix", 1.0).with("mix", 1.0);
    let mut vocoder = registry.create_effect("vocoder", SR).unwrap();
    let out = vocoder.process(&input, &params, &ctx);

    let (center, q) = band_layout(0, 1);
    let mut reference = BiquadFilter::bandpass(center, q, SR);
    for (i, (&x, &y)) in input.left().iter().zip(out.left()).enumerate() {
        let expected = reference.process(x as f64);
        if i >= 2048 {
            assert_abs_diff_eq!(y as f64, expected, epsilon = 1e-3);
        }
    }
}

#[test]
fn single_tap_multi_tap_matches_digital_delay() {
    let registry = UnitRegistry::with_builtin_units();
    let ctx = DspContext::new(SR);
    let input = noise(4096, 13);
    let params = ParamSnapshot::new()
        .with("time", 120.0)
        .with("feedback", 0.45)
        .with("mix", 0.5)
        .with("taps", 1.0);
    let mut digital = registry.create_effect("digital-delay", SR).unwrap();
    let mut multi = registry.create_effect("multi-tap-delay", SR).unwrap();
    for _ in 0..4 {
        assert_eq!(digital.process(&input, &params, &ctx), multi.process(&input, &params, &ctx));
    }
}

#[test]
fn instruments_go_idle_after_release() {
    let registry = UnitRegistry::with_builtin_units();
    let ctx = DspContext::new(SR);
    let params = ParamSnapshot::new().with("release", 0.1);
    for id in registry.ids_of(UnitKind::Instrument) {
        let mut voice = registry.create_instrument(id, SR).unwrap();
        voice.note_on(220.0, 0.8, &params, &ctx);
        voice.render(4096, &ctx);
        voice.note_off(&ctx);
        let mut frames = 0;
        while voice.is_active() && frames < 20 * SR as usize {
            voice.render(1024, &ctx);
            frames += 1024;
        }
        assert!(!voice.is_active(), "{id} still sounding");
        let silent = voice.render(256, &ctx);
        assert!(silent.peak() < 1e-3, "{id}");
    }
}

#[test]
fn velocity_scale_is_normalized() {
    let registry = UnitRegistry::with_builtin_units();
    let ctx = DspContext::new(SR);
    let params = ParamSnapshot::new().with("waveform", "sine");
    let mut a = registry.create_instrument("basic", SR).unwrap();
    let mut b = registry.create_instrument("basic", SR).unwrap();
    a.note_on(330.0, 1.0, &params, &ctx);
    b.note_on(330.0, 127.0, &params, &ctx);
    assert_eq!(a.render(2048, &ctx), b.render(2048, &ctx));
}
