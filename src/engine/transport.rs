//! Transport - maps wall-clock time onto the cycle axis

use std::fmt;
use std::time::{Duration, Instant};

use crate::sequencing::Rational;

/// Tempo used when a score gives none (or an unusable one)
pub const DEFAULT_CPS: f64 = 0.5;

/// Denominator used when turning elapsed seconds into a cycle position
const CLOCK_RESOLUTION: i64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Running,
}

/// Playback clock
///
/// While running, the cycle position is `origin + elapsed_seconds * cps`,
/// measured from the `Instant` playback was (re)started. Stopping freezes
/// the position; starting again resumes from it.
#[derive(Debug, Clone)]
pub struct Transport {
    /// Cycles per second, fixed for the transport's lifetime
    cps: f64,
    state: TransportState,
    /// Wall-clock instant that corresponds to `origin`
    anchor: Option<Instant>,
    origin: Rational,
}

impl Transport {
    /// A stopped transport at cycle 0.
    ///
    /// A non-finite or non-positive `cps` falls back to [`DEFAULT_CPS`].
    pub fn new(cps: f64) -> Self {
        let cps = if cps.is_finite() && cps > 0.0 {
            cps
        } else {
            log::warn!("invalid tempo {} cps, using {}", cps, DEFAULT_CPS);
            DEFAULT_CPS
        };
        Self {
            cps,
            state: TransportState::Stopped,
            anchor: None,
            origin: Rational::ZERO,
        }
    }

    pub fn cps(&self) -> f64 {
        self.cps
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TransportState::Running
    }

    /// Start (or resume) at `now`
    pub fn start(&mut self, now: Instant) {
        if self.is_running() {
            return;
        }
        self.anchor = Some(now);
        self.state = TransportState::Running;
        log::info!("transport started at cycle {} ({} cps)", self.origin, self.cps);
    }

    /// Freeze the position reached at `now`
    pub fn stop(&mut self, now: Instant) {
        if !self.is_running() {
            return;
        }
        self.origin = self.position(now);
        self.anchor = None;
        self.state = TransportState::Stopped;
        log::info!("transport stopped at cycle {}", self.origin);
    }

    /// Jump back to cycle 0, keeping the running state
    pub fn rewind(&mut self, now: Instant) {
        self.origin = Rational::ZERO;
        if self.is_running() {
            self.anchor = Some(now);
        }
        log::info!("transport rewound");
    }

    /// Cycle position at `now`
    pub fn position(&self, now: Instant) -> Rational {
        match (self.state, self.anchor) {
            (TransportState::Running, Some(anchor)) => {
                let elapsed = now.saturating_duration_since(anchor).as_secs_f64();
                self.origin + Rational::approximate(elapsed * self.cps, CLOCK_RESOLUTION)
            }
            _ => self.origin,
        }
    }

    /// Wall-clock length of `cycles`
    pub fn duration_of(&self, cycles: Rational) -> Duration {
        Duration::from_secs_f64((cycles.to_f64() / self.cps).max(0.0))
    }

    /// Wall-clock instant at which cycle position `at` sounds.
    ///
    /// `None` while stopped. Positions before the anchor map to the anchor.
    pub fn instant_of(&self, at: Rational) -> Option<Instant> {
        let anchor = self.anchor?;
        Some(anchor + self.duration_of(at - self.origin))
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            TransportState::Stopped => "stopped",
            TransportState::Running => "running",
        };
        write!(f, "{} @ {} cps", state, self.cps)
    }
}
