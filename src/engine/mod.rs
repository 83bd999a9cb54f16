//! Playback engine: clock, scheduler and the threads that drive a backend.
//!
//! The pieces can be used on their own (a `Scheduler` advanced by hand against
//! a `Transport` is how offline rendering and the tests work) or through
//! `Player`, which runs them on dedicated threads.

pub mod dispatch;
pub mod message;
pub mod player;
pub mod scheduler;
pub mod transport;

pub use dispatch::{AudioBackend, Dispatch, DispatchQueue, LogBackend, RecordingBackend};
pub use message::TransportMessage;
pub use player::{PlaybackStats, Player};
pub use scheduler::{Scheduler, TickReport};
pub use transport::{Transport, TransportState, DEFAULT_CPS};
