pub mod composition; // Layers, stacked sections and timelines
pub mod config;
pub mod effects; // Effect chains and time-varying params
pub mod engine; // Clock, scheduler and playback threads
pub mod error;
pub mod samples; // Lazily fetched sample buffers
pub mod score; // Score file loading
pub mod sequencing; // Cycle time and pattern mini-notation

pub use composition::{Layer, Section, Timeline};
pub use config::EngineConfig;
pub use engine::{AudioBackend, Dispatch, Player, Scheduler, Transport};
pub use samples::{SampleBuffer, SampleRegistry};
pub use score::Score;
pub use sequencing::{Event, Pattern, Rational, TimeSpan};
