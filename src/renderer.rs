//! Offline renderer: plays a list of note events through an instrument and
//! mixes the voices into one stereo buffer, plus a 16-bit WAV encoder.

use serde::{Deserialize, Serialize};

use crate::dsp::{AudioBuffer, DspContext, Mixer};
use crate::error::{DspError, Result};
use crate::params::ParamSnapshot;
use crate::registry::UnitRegistry;
use crate::unit::SynthesizerEngine;

/// Frames rendered per voice call.
const BLOCK_SIZE: usize = 512;

/// One note to play.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    /// Pitch in Hz.
    pub frequency: f64,
    /// 0..1, or a MIDI velocity when above 1.
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    /// Time from note-on to note-off.
    pub duration_ms: f64,
    /// Note-on time in seconds from the start of the render.
    #[serde(default)]
    pub start_time: f64,
}

fn default_velocity() -> f64 {
    1.0
}

impl NoteEvent {
    pub fn new(frequency: f64, velocity: f64, duration_ms: f64, start_time: f64) -> Self {
        NoteEvent {
            frequency,
            velocity,
            duration_ms,
            start_time,
        }
    }

    fn check(&self, index: usize) -> Result<()> {
        let invalid = |reason: &str| {
            Err(DspError::InvalidNote {
                index,
                reason: reason.to_string(),
            })
        };
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return invalid("frequency must be a positive number");
        }
        if !self.velocity.is_finite() || self.velocity < 0.0 {
            return invalid("velocity must be non-negative");
        }
        if !self.duration_ms.is_finite() || self.duration_ms < 0.0 {
            return invalid("durationMs must be non-negative");
        }
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return invalid("startTime must be non-negative");
        }
        Ok(())
    }
}

/// Parse a JSON array of note events.
pub fn parse_events(json: &str) -> Result<Vec<NoteEvent>> {
    let events: Vec<NoteEvent> = serde_json::from_str(json)?;
    for (index, event) in events.iter().enumerate() {
        event.check(index)?;
    }
    Ok(events)
}

/// Scheduled voice for one event.
struct ScheduledVoice {
    voice: Box<dyn SynthesizerEngine>,
    event: NoteEvent,
    /// Frame at which the note starts.
    start_frame: usize,
    /// Frame at which the note is released.
    release_frame: usize,
    started: bool,
    released: bool,
}

impl ScheduledVoice {
    fn finished(&self) -> bool {
        self.released && !self.voice.is_active()
    }

    /// Render this voice's share of the block `[block_start, block_end)`
    /// into the mixer.
    fn render_block(
        &mut self,
        block_start: usize,
        block_end: usize,
        params: &ParamSnapshot,
        ctx: &DspContext,
        scratch: &mut AudioBuffer,
        mixer: &mut Mixer,
    ) {
        let mut cursor = block_start.max(self.start_frame);
        while cursor < block_end && !self.finished() {
            if !self.started {
                self.voice.note_on(self.event.frequency, self.event.velocity, params, ctx);
                self.started = true;
            }
            if !self.released && cursor >= self.release_frame {
                self.voice.note_off(ctx);
                self.released = true;
                continue;
            }
            let stop = if self.released {
                block_end
            } else {
                block_end.min(self.release_frame)
            };
            scratch.resize(stop - cursor);
            self.voice.render_into(scratch, ctx);
            mixer.add_buffer(scratch, cursor);
            cursor = stop;
        }
    }
}

/// Render `events` through fresh voices of instrument `id`, one voice per
/// event, into a buffer of `total_frames`. Voices still ringing at the end
/// are cut off.
pub fn render_events(
    registry: &UnitRegistry,
    id: &str,
    params: &ParamSnapshot,
    events: &[NoteEvent],
    ctx: &DspContext,
    total_frames: usize,
) -> Result<AudioBuffer> {
    let sr = ctx.effective_sample_rate();
    let mut voices = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        event.check(index)?;
        let mut voice = registry.create_instrument(id, sr)?;
        // Float to usize casts saturate; notes past the end never start
        let start_frame = (event.start_time * sr).round() as usize;
        if start_frame >= total_frames {
            continue;
        }
        // Each note gets its own random stream so chords don't phase-lock
        voice.reseed(index as u64 + 1);
        let release_frame = start_frame.saturating_add((event.duration_ms * 0.001 * sr).round() as usize);
        voices.push(ScheduledVoice {
            voice,
            event: *event,
            start_frame,
            release_frame,
            started: false,
            released: false,
        });
    }
    tracing::debug!(unit = id, notes = voices.len(), total_frames, "rendering events");

    let mut mixer = Mixer::new();
    mixer.clear(total_frames);
    let mut scratch = AudioBuffer::silence(BLOCK_SIZE, sr);
    let mut block_start = 0;
    while block_start < total_frames {
        let block_end = (block_start + BLOCK_SIZE).min(total_frames);
        let block_ctx = ctx.with_time(block_start as f64 / sr);
        for scheduled in voices.iter_mut().filter(|v| v.start_frame < block_end) {
            scheduled.render_block(block_start, block_end, params, &block_ctx, &mut scratch, &mut mixer);
        }
        block_start = block_end;
    }

    let ringing = voices.iter().filter(|v| v.started && !v.finished()).count();
    tracing::debug!(unit = id, ringing, "render finished");
    Ok(mixer.output(sr))
}

/// Encode a buffer as a 16-bit stereo PCM WAV file.
pub fn encode_wav(buffer: &AudioBuffer) -> Vec<u8> {
    let pcm: Vec<i16> = buffer
        .to_interleaved()
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect();
    encode_pcm(&pcm, buffer.sample_rate().round() as u32, 2)
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
fn encode_pcm(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44100.0;

    fn registry() -> UnitRegistry {
        UnitRegistry::with_builtin_units()
    }

    #[test]
    fn wav_header_valid() {
        let wav = encode_wav(&AudioBuffer::silence(100, SR));

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 44100);

        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 2);
    }

    #[test]
    fn wav_size_correct() {
        let wav = encode_wav(&AudioBuffer::silence(22050, SR));

        // 22050 frames * 2 channels * 2 bytes
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 88200);
        assert_eq!(wav.len(), 44 + 88200);
    }

    #[test]
    fn wav_samples_are_clamped() {
        let buffer = AudioBuffer::from_stereo(vec![2.0], vec![-2.0], SR);
        let wav = encode_wav(&buffer);
        assert_eq!(i16::from_le_bytes([wav[44], wav[45]]), 32767);
        assert_eq!(i16::from_le_bytes([wav[46], wav[47]]), -32767);
    }

    #[test]
    fn renders_requested_length() {
        let ctx = DspContext::new(SR);
        let events = [NoteEvent::new(440.0, 0.8, 500.0, 0.0)];
        let out = render_events(&registry(), "basic", &ParamSnapshot::new(), &events, &ctx, 44100).unwrap();
        assert_eq!(out.frames(), 44100);
        assert!(out.peak() > 0.1);
        assert!(out.is_finite());
    }

    #[test]
    fn notes_start_at_their_start_time() {
        let ctx = DspContext::new(SR);
        let events = [NoteEvent::new(440.0, 0.8, 200.0, 0.5)];
        let out = render_events(&registry(), "basic", &ParamSnapshot::new(), &events, &ctx, 44100).unwrap();
        assert!(out.left()[..22050].iter().all(|&s| s == 0.0));
        assert!(out.left()[22050..].iter().any(|&s| s.abs() > 0.01));
    }

    #[test]
    fn notes_release_after_their_duration() {
        let ctx = DspContext::new(SR);
        let params = ParamSnapshot::new().with("release", 0.05);
        let events = [NoteEvent::new(440.0, 0.8, 100.0, 0.0)];
        let out = render_events(&registry(), "basic", &params, &events, &ctx, 44100).unwrap();
        // 100 ms hold plus 50 ms release, then silence
        assert!(out.left()[2000..4000].iter().any(|&s| s.abs() > 0.01));
        assert!(out.left()[8000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn far_future_and_endless_notes_are_clipped_to_the_buffer() {
        let ctx = DspContext::new(SR);
        let params = ParamSnapshot::new();
        let late = [NoteEvent::new(440.0, 0.8, 100.0, 1e300)];
        let out = render_events(&registry(), "basic", &params, &late, &ctx, 1024).unwrap();
        assert_eq!(out.frames(), 1024);
        assert_eq!(out.peak(), 0.0);

        let endless = [NoteEvent::new(440.0, 0.8, 1e300, 0.01)];
        let out = render_events(&registry(), "basic", &params, &endless, &ctx, 2048).unwrap();
        assert_eq!(out.frames(), 2048);
        assert!(out.left()[1000..].iter().any(|&s| s.abs() > 0.01));
    }

    #[test]
    fn overlapping_notes_are_mixed() {
        let ctx = DspContext::new(SR);
        let one = [NoteEvent::new(220.0, 0.5, 500.0, 0.0)];
        let two = [NoteEvent::new(220.0, 0.5, 500.0, 0.0), NoteEvent::new(330.0, 0.5, 500.0, 0.0)];
        let params = ParamSnapshot::new();
        let a = render_events(&registry(), "basic", &params, &one, &ctx, 8192).unwrap();
        let b = render_events(&registry(), "basic", &params, &two, &ctx, 8192).unwrap();
        assert!(b.rms() > a.rms());
    }

    #[test]
    fn invalid_events_are_rejected() {
        let ctx = DspContext::new(SR);
        let events = [NoteEvent::new(440.0, 0.8, 100.0, 0.0), NoteEvent::new(-1.0, 0.8, 100.0, 0.0)];
        let err = render_events(&registry(), "basic", &ParamSnapshot::new(), &events, &ctx, 1024).unwrap_err();
        assert!(matches!(err, DspError::InvalidNote { index: 1, .. }));

        let err = render_events(&registry(), "reverb", &ParamSnapshot::new(), &events[..1], &ctx, 1024).unwrap_err();
        assert!(matches!(err, DspError::WrongUnitKind { .. }));
    }

    #[test]
    fn events_parse_from_camel_case_json() {
        let events = parse_events(r#"[{"frequency": 261.63, "durationMs": 250, "startTime": 0.5}]"#).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].velocity, 1.0);
        assert_eq!(events[0].duration_ms, 250.0);
        assert_eq!(events[0].start_time, 0.5);

        assert!(parse_events(r#"[{"frequency": 0, "durationMs": 250}]"#).is_err());
        assert!(parse_events("not json").is_err());
    }

    #[test]
    fn renders_are_reproducible() {
        let ctx = DspContext::new(SR);
        let events = [NoteEvent::new(110.0, 0.9, 300.0, 0.0), NoteEvent::new(165.0, 0.9, 300.0, 0.1)];
        let params = ParamSnapshot::new();
        let a = render_events(&registry(), "jupiter-8", &params, &events, &ctx, 22050).unwrap();
        let b = render_events(&registry(), "jupiter-8", &params, &events, &ctx, 22050).unwrap();
        assert_eq!(a.left(), b.left());
    }
}
