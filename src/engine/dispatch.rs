//! Dispatch path - what the scheduler hands to the audio backend
//!
//! The scheduling thread pushes `Dispatch`es into a bounded `ArrayQueue`; the
//! dispatcher thread pops them, waits for their wall-clock time and calls the
//! backend. When the queue is full the oldest entry is overwritten, so a
//! stalled backend loses old events instead of blocking the clock.
//!
//! Every dispatch carries the queue generation it was pushed under. Stopping
//! or rewinding bumps the generation, and anything older is discarded on the
//! way out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossbeam::queue::ArrayQueue;

use crate::effects::ResolvedParams;
use crate::error::ScheduleError;
use crate::samples::SampleBuffer;
use crate::sequencing::Event;

/// An event bound to its sample and evaluated params, ready to play
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub event: Event,
    /// Buffer to play; `None` for notes without a sample instrument
    pub sample: Option<Arc<SampleBuffer>>,
    pub params: ResolvedParams,
    /// When the event should sound
    pub at: Instant,
    generation: u64,
}

impl Dispatch {
    pub fn new(
        event: Event,
        sample: Option<Arc<SampleBuffer>>,
        params: ResolvedParams,
        at: Instant,
    ) -> Self {
        Self {
            event,
            sample,
            params,
            at,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} +{} {}",
            self.event.onset, self.event.duration, self.event.payload
        )?;
        if !self.params.is_empty() {
            write!(f, " [{}]", self.params)?;
        }
        Ok(())
    }
}

/// Receives dispatches on the dispatcher thread
pub trait AudioBackend: Send {
    /// Start playing one event
    fn dispatch(&mut self, dispatch: &Dispatch);

    /// Cut everything that is currently sounding
    fn silence(&mut self);
}

/// Bounded drop-oldest queue between the scheduling and dispatcher threads
pub struct DispatchQueue {
    queue: ArrayQueue<Dispatch>,
    generation: AtomicU64,
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            generation: AtomicU64::new(0),
        }
    }

    /// Queue a dispatch under the current generation.
    ///
    /// On overflow the oldest entry is dropped and reported.
    pub fn push(&self, mut dispatch: Dispatch) -> Result<(), ScheduleError> {
        dispatch.generation = self.generation();
        match self.queue.force_push(dispatch) {
            None => Ok(()),
            Some(dropped) => {
                let err = ScheduleError::QueueOverflow {
                    dropped: dropped.to_string(),
                };
                log::warn!("{}", err);
                Err(err)
            }
        }
    }

    /// Next dispatch of the current generation, skipping stale ones
    pub fn pop(&self) -> Option<Dispatch> {
        let current = self.generation();
        while let Some(dispatch) = self.queue.pop() {
            if dispatch.generation == current {
                return Some(dispatch);
            }
            log::debug!("discarding stale dispatch {}", dispatch);
        }
        None
    }

    /// Invalidate everything queued so far. Returns how many were discarded.
    pub fn cancel(&self) -> usize {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut discarded = 0;
        while self.queue.pop().is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            log::debug!("cancelled {} queued dispatches", discarded);
        }
        discarded
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether `dispatch` was queued before the last cancel
    pub fn is_stale(&self, dispatch: &Dispatch) -> bool {
        dispatch.generation != self.generation()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

/// Logs every dispatch instead of playing it (`--dry-run`)
#[derive(Debug, Default)]
pub struct LogBackend {
    count: usize,
}

impl LogBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl AudioBackend for LogBackend {
    fn dispatch(&mut self, dispatch: &Dispatch) {
        self.count += 1;
        log::info!("{}", dispatch);
    }

    fn silence(&mut self) {
        log::info!("silence");
    }
}

/// Keeps every dispatch in memory, for tests and offline inspection.
///
/// Clones share the same recording, so one handle can be given to the
/// player while another is inspected.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Mutex<Recording>>,
}

#[derive(Debug, Default)]
struct Recording {
    dispatches: Vec<Dispatch>,
    silences: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.lock().dispatches.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().dispatches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn silences(&self) -> usize {
        self.lock().silences
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AudioBackend for RecordingBackend {
    fn dispatch(&mut self, dispatch: &Dispatch) {
        self.lock().dispatches.push(dispatch.clone());
    }

    fn silence(&mut self) {
        self.lock().silences += 1;
    }
}
