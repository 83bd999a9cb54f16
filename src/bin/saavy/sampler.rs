//! Sampler - plays dispatched samples in the audio callback
//!
//! The dispatcher thread turns each `Dispatch` into a `Voice` and sends it to
//! the audio thread over an rtrb ring buffer. The callback drains new voices
//! at the top of every block and mixes the active ones. Finished voices go
//! back over a second ring so their sample buffers are released on the
//! dispatcher thread, never in the callback.

use std::f64::consts::PI;
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use saavy_cycles::effects::Param;
use saavy_cycles::engine::{AudioBackend, Dispatch};
use saavy_cycles::samples::SampleBuffer;
use saavy_cycles::sequencing::notes::MIDDLE_C;
use saavy_cycles::sequencing::Payload;

/// Voices beyond this steal the oldest one
const MAX_VOICES: usize = 64;

pub enum VoiceCommand {
    Play(Voice),
    Silence,
}

/// One sample being played back
pub struct Voice {
    buffer: Arc<SampleBuffer>,
    /// Fractional read position in frames
    position: f64,
    /// Frames advanced per output frame
    rate: f64,
    gain: f32,
    /// One-pole lowpass coefficient, `None` when unfiltered
    lowpass: Option<f32>,
    lowpass_state: f32,
    /// Waveshaper drive, 0 = clean
    drive: f32,
}

impl Voice {
    /// Build a voice for `dispatch` at output rate `sample_rate`.
    /// `None` when there is nothing to play.
    pub fn from_dispatch(dispatch: &Dispatch, sample_rate: f32) -> Option<Self> {
        let buffer = dispatch.sample.clone()?;
        let params = &dispatch.params;

        // Notes played on a sample instrument are transposed relative to C4
        let pitch = match dispatch.event.payload {
            Payload::Note { pitch, .. } => 2f64.powf((pitch - MIDDLE_C) / 12.0),
            Payload::Sample { .. } => 1.0,
        };
        let rate = buffer.sample_rate() as f64 / sample_rate as f64
            * params.value(Param::Speed)
            * pitch;

        let lowpass = params.get(Param::Cutoff).map(|cutoff| {
            let cutoff = cutoff.min(sample_rate as f64 * 0.45);
            (1.0 - (-2.0 * PI * cutoff / sample_rate as f64).exp()) as f32
        });

        let shape = params.value(Param::Shape) as f32;
        let drive = 2.0 * shape / (1.0 - shape);

        // Negative speed plays backwards from the end
        let position = if rate < 0.0 {
            buffer.frame_count().saturating_sub(1) as f64
        } else {
            0.0
        };

        Some(Self {
            buffer,
            position,
            rate,
            gain: params.value(Param::Gain) as f32,
            lowpass,
            lowpass_state: 0.0,
            drive,
        })
    }

    fn is_done(&self) -> bool {
        self.position < 0.0 || self.position >= self.buffer.frame_count() as f64
    }

    fn next_sample(&mut self) -> f32 {
        let index = self.position as usize;
        let frac = (self.position - index as f64) as f32;
        let a = self.buffer.frame_mono(index);
        let b = self.buffer.frame_mono(index + 1);
        self.position += self.rate;

        let mut x = a + (b - a) * frac;
        if let Some(coef) = self.lowpass {
            self.lowpass_state += coef * (x - self.lowpass_state);
            x = self.lowpass_state;
        }
        if self.drive > 0.0 {
            x = x * (1.0 + self.drive) / (1.0 + self.drive * x.abs());
        }
        x * self.gain
    }
}

/// Audio-thread half: owns the active voices
pub struct Sampler {
    commands: Consumer<VoiceCommand>,
    retired: Producer<Voice>,
    voices: Vec<Voice>,
}

impl Sampler {
    /// Hand a voice back to the dispatcher thread for dropping
    fn retire(&mut self, voice: Voice) {
        // Sized so it cannot fill up; if it ever did the voice drops here
        let _ = self.retired.push(voice);
    }

    /// Mix one block into interleaved `out`, the same signal on every channel
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        while let Ok(command) = self.commands.pop() {
            match command {
                VoiceCommand::Play(voice) => {
                    if self.voices.len() >= MAX_VOICES {
                        let oldest = self.voices.remove(0);
                        self.retire(oldest);
                    }
                    self.voices.push(voice);
                }
                VoiceCommand::Silence => {
                    while let Some(voice) = self.voices.pop() {
                        self.retire(voice);
                    }
                }
            }
        }

        for frame in out.chunks_mut(channels.max(1)) {
            let mut mix = 0.0f32;
            for voice in self.voices.iter_mut() {
                if !voice.is_done() {
                    mix += voice.next_sample();
                }
            }
            frame.fill(mix.clamp(-1.0, 1.0));
        }

        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].is_done() {
                let voice = self.voices.remove(i);
                self.retire(voice);
            } else {
                i += 1;
            }
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }
}

/// Dispatcher-thread half: an `AudioBackend` feeding the sampler
pub struct SamplerBackend {
    commands: Producer<VoiceCommand>,
    retired: Consumer<Voice>,
    sample_rate: f32,
}

impl SamplerBackend {
    /// Drop voices the sampler has finished with. Returns how many.
    pub fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        while self.retired.pop().is_ok() {
            count += 1;
        }
        count
    }
}

impl AudioBackend for SamplerBackend {
    fn dispatch(&mut self, dispatch: &Dispatch) {
        self.collect_retired();
        let Some(voice) = Voice::from_dispatch(dispatch, self.sample_rate) else {
            log::debug!("nothing to play for {}", dispatch);
            return;
        };
        if self.commands.push(VoiceCommand::Play(voice)).is_err() {
            log::warn!("voice queue full, dropped {}", dispatch);
        }
    }

    fn silence(&mut self) {
        self.collect_retired();
        if self.commands.push(VoiceCommand::Silence).is_err() {
            log::warn!("voice queue full, could not silence");
        }
    }
}

/// A connected backend/sampler pair for output rate `sample_rate`
pub fn sampler(sample_rate: f32, capacity: usize) -> (SamplerBackend, Sampler) {
    let capacity = capacity.max(1);
    let (producer, consumer) = RingBuffer::new(capacity);
    // Every voice alive is queued, playing or retired, so this never fills
    let (retired_tx, retired_rx) = RingBuffer::new(capacity + MAX_VOICES);
    (
        SamplerBackend {
            commands: producer,
            retired: retired_rx,
            sample_rate,
        },
        Sampler {
            commands: consumer,
            retired: retired_tx,
            voices: Vec::with_capacity(MAX_VOICES),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use saavy_cycles::effects::{Effect, ResolvedParams};
    use saavy_cycles::sequencing::{Event, Rational};
    use std::time::Instant;

    fn dispatch_with(buffer: Arc<SampleBuffer>, payload: Payload, effects: &[Effect]) -> Dispatch {
        let mut event = Event::new(Rational::ZERO, Rational::ONE, payload);
        for effect in effects {
            event = effect.apply(event);
        }
        let params = ResolvedParams::evaluate(&event.params, event.onset, event.section).unwrap();
        Dispatch::new(event, Some(buffer), params, Instant::now())
    }

    fn dispatch(payload: Payload, effects: &[Effect]) -> Dispatch {
        let buffer = SampleBuffer::new(vec![0.5; 100], 1, 100);
        dispatch_with(Arc::new(buffer), payload, effects)
    }

    #[test]
    fn test_voice_plays_to_the_end() {
        let (mut backend, mut sampler) = sampler(100.0, 8);
        backend.dispatch(&dispatch(Payload::sample("bd"), &[Effect::gain(0.5)]));

        let mut out = vec![0.0; 200];
        sampler.render(&mut out[..120], 2);
        assert!((out[0] - 0.25).abs() < 1e-6);
        assert_eq!(out[0], out[1]);
        assert_eq!(sampler.active_voices(), 1);

        sampler.render(&mut out[120..], 2);
        assert_eq!(sampler.active_voices(), 0);
    }

    #[test]
    fn test_note_transposes_relative_to_middle_c() {
        let octave_up = Payload::Note {
            pitch: MIDDLE_C + 12.0,
            instrument: Some("superhex".into()),
        };
        let voice = Voice::from_dispatch(&dispatch(octave_up, &[Effect::speed(1.5)]), 100.0).unwrap();
        assert!((voice.rate - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_silence_clears_voices() {
        let (mut backend, mut sampler) = sampler(100.0, 8);
        backend.dispatch(&dispatch(Payload::sample("bd"), &[]));
        backend.silence();

        let mut out = vec![1.0; 8];
        sampler.render(&mut out, 1);
        assert_eq!(sampler.active_voices(), 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_finished_voices_are_released_by_the_backend() {
        let buffer = Arc::new(SampleBuffer::new(vec![0.5; 10], 1, 100));
        let (mut backend, mut sampler) = sampler(100.0, 8);
        backend.dispatch(&dispatch_with(Arc::clone(&buffer), Payload::sample("bd"), &[]));

        let mut out = vec![0.0; 32];
        sampler.render(&mut out, 1);
        assert_eq!(sampler.active_voices(), 0);
        // Still held by the retired voice, not dropped in the callback
        assert_eq!(Arc::strong_count(&buffer), 2);

        assert_eq!(backend.collect_retired(), 1);
        assert_eq!(Arc::strong_count(&buffer), 1);
    }
}
