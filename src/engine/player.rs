//! Player - owns the scheduling and dispatcher threads
//!
//! ```text
//! control (rtrb) ──> scheduling thread ──> DispatchQueue ──> dispatcher thread ──> AudioBackend
//!                    wakes every quantum   (drop-oldest)     waits for `at`
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rtrb::Producer;

use super::dispatch::{AudioBackend, DispatchQueue};
use super::message::{control_channel, MessageReceiver, TransportMessage};
use super::scheduler::Scheduler;
use super::transport::Transport;
use crate::composition::Timeline;
use crate::config::EngineConfig;
use crate::error::{PlayerError, ScheduleError};
use crate::samples::SampleRegistry;

/// Counters shared by both threads
#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    played: AtomicUsize,
    dropped: AtomicUsize,
    pending: AtomicUsize,
    overflowed: AtomicUsize,
    late: AtomicUsize,
    overruns: AtomicUsize,
}

/// Snapshot of what a playback run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Dispatches pushed by the scheduler
    pub queued: usize,
    /// Dispatches that reached the backend
    pub played: usize,
    /// Events dropped before queueing (missing sample, bad param)
    pub dropped: usize,
    /// Events skipped while their sample was still loading
    pub pending: usize,
    /// Dispatches lost to queue overflow
    pub overflowed: usize,
    /// Dispatches that reached the dispatcher more than one quantum late
    pub late: usize,
    /// Scheduling passes, backend calls or dispatches that missed a quantum
    pub overruns: usize,
}

impl Counters {
    fn snapshot(&self) -> PlaybackStats {
        PlaybackStats {
            queued: self.queued.load(Ordering::Relaxed),
            played: self.played.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            late: self.late.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

/// Flags shared by the player and its threads
#[derive(Debug, Default)]
struct Shared {
    running: AtomicBool,
    /// Scheduling thread has exited
    scheduler_done: AtomicBool,
    /// Dispatcher drained everything a finished timeline queued
    finished: AtomicBool,
    counters: Counters,
}

pub struct Player {
    timeline: Arc<Timeline>,
    registry: Arc<SampleRegistry>,
    cps: f64,
    config: EngineConfig,
    queue: Arc<DispatchQueue>,
    shared: Arc<Shared>,
    control: Option<Producer<TransportMessage>>,
    threads: Vec<(&'static str, JoinHandle<()>)>,
}

impl Player {
    pub fn new(
        timeline: Arc<Timeline>,
        registry: Arc<SampleRegistry>,
        cps: f64,
        config: EngineConfig,
    ) -> Self {
        let queue = Arc::new(DispatchQueue::new(config.queue_capacity_clamped()));
        Self {
            timeline,
            registry,
            cps,
            config,
            queue,
            shared: Arc::new(Shared::default()),
            control: None,
            threads: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// A non-looping timeline has played to the end
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PlaybackStats {
        self.shared.counters.snapshot()
    }

    /// Spawn the scheduling and dispatcher threads and start the clock.
    pub fn start<B: AudioBackend + 'static>(&mut self, backend: B) -> Result<(), PlayerError> {
        if self.is_running() || !self.threads.is_empty() {
            return Err(PlayerError::AlreadyRunning);
        }

        self.shared = Arc::new(Shared::default());
        self.shared.running.store(true, Ordering::Release);
        self.queue.cancel();

        let (producer, consumer) = control_channel(self.config.control_capacity_clamped());
        self.control = Some(producer);

        // Fetches run on the rayon pool; the scheduler skips what is not loaded yet
        self.registry.preload_in_background();

        let scheduler = Scheduler::new(
            Arc::clone(&self.timeline),
            Arc::clone(&self.registry),
            Arc::clone(&self.queue),
            self.config.clone(),
        );
        let transport = Transport::new(self.cps);

        let dispatcher = {
            let queue = Arc::clone(&self.queue);
            let shared = Arc::clone(&self.shared);
            let quantum = self.config.quantum_duration();
            thread::Builder::new()
                .name("saavy-dispatch".into())
                .spawn(move || run_dispatcher(backend, queue, shared, quantum))
                .map_err(|source| self.spawn_failed("dispatcher", source))?
        };
        self.threads.push(("dispatcher", dispatcher));

        let scheduling = {
            let queue = Arc::clone(&self.queue);
            let shared = Arc::clone(&self.shared);
            let quantum = self.config.quantum_duration();
            thread::Builder::new()
                .name("saavy-scheduler".into())
                .spawn(move || run_scheduler(scheduler, transport, consumer, queue, shared, quantum))
                .map_err(|source| self.spawn_failed("scheduling", source))?
        };
        self.threads.push(("scheduling", scheduling));

        log::info!(
            "playing {} cycles at {} cps (quantum {:?}, looping {})",
            self.timeline.length(),
            self.cps,
            self.config.quantum_duration(),
            self.config.looping
        );
        Ok(())
    }

    fn spawn_failed(&self, thread: &'static str, source: std::io::Error) -> PlayerError {
        self.shared.running.store(false, Ordering::Release);
        PlayerError::Spawn { thread, source }
    }

    /// Restart from cycle 0, discarding anything already queued.
    pub fn rewind(&mut self) -> Result<(), PlayerError> {
        self.send(TransportMessage::Rewind)
    }

    fn send(&mut self, message: TransportMessage) -> Result<(), PlayerError> {
        let control = self.control.as_mut().ok_or(PlayerError::NotRunning)?;
        control
            .push(message)
            .map_err(|_| PlayerError::ControlQueueFull)
    }

    /// Stop both threads, silence the backend and discard queued dispatches.
    ///
    /// Returns within about one quantum plus whatever the backend's current
    /// call takes.
    pub fn stop(&mut self) -> Result<PlaybackStats, PlayerError> {
        if self.threads.is_empty() {
            return Ok(self.stats());
        }

        if self.send(TransportMessage::Stop).is_err() {
            log::debug!("control queue full, stopping through the running flag");
        }
        self.shared.running.store(false, Ordering::Release);
        self.queue.cancel();

        let mut result = Ok(());
        for (name, handle) in self.threads.drain(..) {
            if handle.join().is_err() {
                log::error!("{} thread panicked", name);
                result = Err(PlayerError::Panicked(name));
            }
        }
        self.control = None;

        let stats = self.stats();
        log::info!(
            "stopped: {} played, {} dropped, {} pending, {} overflowed, {} late, {} overruns",
            stats.played,
            stats.dropped,
            stats.pending,
            stats.overflowed,
            stats.late,
            stats.overruns
        );
        result.map(|_| stats)
    }

    /// Block until a non-looping timeline finishes or `timeout` passes.
    /// Returns whether playback finished.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let step = self.config.quantum_duration();
        while Instant::now() < deadline {
            if self.is_finished() {
                return true;
            }
            thread::sleep(step);
        }
        self.is_finished()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            let _ = self.stop();
        }
    }
}

fn report_overrun(shared: &Shared, what: &'static str, elapsed: Duration, quantum: Duration) {
    shared.counters.overruns.fetch_add(1, Ordering::Relaxed);
    let err = ScheduleError::Overrun {
        what,
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        quantum_ms: quantum.as_secs_f64() * 1000.0,
    };
    log::warn!("{}", err);
}

fn run_scheduler(
    mut scheduler: Scheduler,
    mut transport: Transport,
    mut control: impl MessageReceiver,
    queue: Arc<DispatchQueue>,
    shared: Arc<Shared>,
    quantum: Duration,
) {
    transport.start(Instant::now());

    'run: loop {
        let tick_start = Instant::now();

        while let Some(message) = control.pop() {
            match message {
                TransportMessage::Stop => break 'run,
                TransportMessage::Rewind => {
                    queue.cancel();
                    scheduler.rewind();
                    transport.rewind(Instant::now());
                }
            }
        }
        if !shared.running.load(Ordering::Acquire) {
            break;
        }

        let report = scheduler.advance(&transport, Instant::now());
        let counters = &shared.counters;
        counters.queued.fetch_add(report.dispatched, Ordering::Relaxed);
        counters.dropped.fetch_add(report.dropped, Ordering::Relaxed);
        counters.pending.fetch_add(report.pending, Ordering::Relaxed);
        counters.overflowed.fetch_add(report.overflowed, Ordering::Relaxed);
        if report.finished {
            break;
        }

        let elapsed = tick_start.elapsed();
        if elapsed > quantum {
            report_overrun(&shared, "scheduling pass", elapsed, quantum);
        }
        thread::sleep(quantum.saturating_sub(elapsed));
    }

    transport.stop(Instant::now());
    shared.scheduler_done.store(true, Ordering::Release);
}

/// Sleep until `at`, waking every quantum to notice a stop or rewind.
/// Returns false if the wait was interrupted.
fn wait_until(
    at: Instant,
    generation: u64,
    queue: &DispatchQueue,
    shared: &Shared,
    quantum: Duration,
) -> bool {
    loop {
        if !shared.running.load(Ordering::Acquire) || queue.generation() != generation {
            return false;
        }
        let now = Instant::now();
        if now >= at {
            return true;
        }
        thread::sleep((at - now).min(quantum));
    }
}

fn run_dispatcher<B: AudioBackend>(
    mut backend: B,
    queue: Arc<DispatchQueue>,
    shared: Arc<Shared>,
    quantum: Duration,
) {
    let mut seen_generation = queue.generation();

    loop {
        let generation = queue.generation();
        if generation != seen_generation {
            backend.silence();
            seen_generation = generation;
        }

        match queue.pop() {
            Some(dispatch) => {
                if !wait_until(dispatch.at, dispatch.generation(), &queue, &shared, quantum) {
                    continue;
                }
                let start = Instant::now();
                let lateness = start.saturating_duration_since(dispatch.at);
                if lateness > quantum {
                    shared.counters.late.fetch_add(1, Ordering::Relaxed);
                    report_overrun(&shared, "late dispatch", lateness, quantum);
                    log::debug!("dropped late {}", dispatch);
                    continue;
                }
                backend.dispatch(&dispatch);
                shared.counters.played.fetch_add(1, Ordering::Relaxed);

                let elapsed = start.elapsed();
                if elapsed > quantum {
                    report_overrun(&shared, "backend dispatch", elapsed, quantum);
                }
            }
            None => {
                if !shared.running.load(Ordering::Acquire) {
                    break;
                }
                if shared.scheduler_done.load(Ordering::Acquire) {
                    shared.finished.store(true, Ordering::Release);
                    break;
                }
                thread::sleep(quantum / 4);
            }
        }
    }

    backend.silence();
}
