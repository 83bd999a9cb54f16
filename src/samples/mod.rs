//! Sample registry: symbolic names bound to audio URIs, fetched lazily.
//!
//! A score declares `name -> uri` pairs up front. Nothing is downloaded until
//! the scheduler first asks for a name; from then on the decoded buffer is
//! shared by every event that plays it.

pub mod decode;
pub mod fetch;
mod registry;

pub use fetch::{DefaultFetcher, Fetcher};
pub use registry::SampleRegistry;

/// Decoded audio, interleaved `f32`
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Mono value of frame `index`, averaging channels. Zero past the end.
    pub fn frame_mono(&self, index: usize) -> f32 {
        let ch = self.channels as usize;
        let start = index * ch;
        match self.samples.get(start..start + ch) {
            Some(frame) => frame.iter().sum::<f32>() / ch as f32,
            None => 0.0,
        }
    }
}
