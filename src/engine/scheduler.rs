//! Scheduler - turns elapsed time into queued dispatches
//!
//! Each call to `advance` covers the window between the last queried position
//! and `now + lookahead`, so every onset is queried exactly once no matter how
//! irregularly the scheduling thread wakes up. Events are bound to their
//! sample and evaluated params here, off the dispatcher thread.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use super::dispatch::{Dispatch, DispatchQueue};
use super::transport::Transport;
use crate::config::EngineConfig;
use crate::composition::Timeline;
use crate::effects::ResolvedParams;
use crate::sequencing::{Event, Rational, TimeSpan};
use crate::samples::SampleRegistry;

/// Why an event was not queued
enum Skip {
    /// Its sample is still being fetched in the background
    Pending,
    /// Unresolvable sample or malformed param
    Dropped,
}

/// What one `advance` did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Cycle window that was queried, if any
    pub window: Option<TimeSpan>,
    /// Events pushed to the dispatch queue
    pub dispatched: usize,
    /// Events dropped for an unresolvable sample or a malformed param
    pub dropped: usize,
    /// Events skipped because their sample was still loading
    pub pending: usize,
    /// Older dispatches overwritten because the queue was full
    pub overflowed: usize,
    /// Set once a non-looping timeline has been fully queued
    pub finished: bool,
}

pub struct Scheduler {
    timeline: Arc<Timeline>,
    registry: Arc<SampleRegistry>,
    queue: Arc<DispatchQueue>,
    config: EngineConfig,
    /// Everything before this position has been queued
    cursor: Rational,
    /// Sample names already reported at warn level
    warned: HashSet<String>,
    /// Sample names already reported as loading
    waiting: HashSet<String>,
    finished: bool,
}

impl Scheduler {
    pub fn new(
        timeline: Arc<Timeline>,
        registry: Arc<SampleRegistry>,
        queue: Arc<DispatchQueue>,
        config: EngineConfig,
    ) -> Self {
        Self {
            timeline,
            registry,
            queue,
            config,
            cursor: Rational::ZERO,
            warned: HashSet::new(),
            waiting: HashSet::new(),
            finished: false,
        }
    }

    /// Position up to which events have been queued
    pub fn cursor(&self) -> Rational {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Start over from cycle 0
    pub fn rewind(&mut self) {
        self.cursor = Rational::ZERO;
        self.finished = false;
    }

    /// Queue every event with onset in `[cursor, position(now + lookahead))`.
    pub fn advance(&mut self, transport: &Transport, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        if !transport.is_running() || self.finished {
            report.finished = self.finished;
            return report;
        }

        let length = self.timeline.length();
        let mut horizon = transport.position(now + self.config.lookahead_duration());
        if !self.config.looping {
            horizon = horizon.min(length);
        }

        if !self.config.looping && self.cursor >= length {
            log::info!("reached the end of the timeline at cycle {}", length);
            self.finished = true;
            report.finished = true;
            return report;
        }

        let window = TimeSpan::new(self.cursor, horizon);
        if window.is_empty() {
            return report;
        }
        report.window = Some(window);

        let events = if self.config.looping {
            self.timeline.query_looped(window)
        } else {
            self.timeline.query(window)
        };

        for event in events {
            match self.prepare(transport, event) {
                Ok(dispatch) => {
                    log::debug!("queue {}", dispatch);
                    report.dispatched += 1;
                    if self.queue.push(dispatch).is_err() {
                        report.overflowed += 1;
                    }
                }
                Err(Skip::Pending) => report.pending += 1,
                Err(Skip::Dropped) => report.dropped += 1,
            }
        }

        self.cursor = horizon;
        report
    }

    /// Bind an event to its sample and params.
    ///
    /// Never fetches: a sample that is not loaded yet is requested in the
    /// background and the event is skipped.
    fn prepare(&mut self, transport: &Transport, event: Event) -> Result<Dispatch, Skip> {
        let sample = match event.payload.sample_name() {
            Some(name) => match self.registry.lookup(name) {
                Ok(Some(buffer)) => Some(buffer),
                Ok(None) => {
                    self.registry.load_in_background(name);
                    if self.waiting.insert(name.to_string()) {
                        log::info!("sample '{}' is still loading, skipping its events", name);
                    }
                    return Err(Skip::Pending);
                }
                Err(err) => {
                    // First failure per name is loud, repeats are not
                    if self.warned.insert(name.to_string()) {
                        log::warn!("dropping events for '{}': {}", name, err);
                    } else {
                        log::debug!("dropped {}: {}", event, err);
                    }
                    return Err(Skip::Dropped);
                }
            },
            None => None,
        };

        let params = match ResolvedParams::evaluate(&event.params, event.onset, event.section) {
            Ok(params) => params,
            Err(err) => {
                log::warn!("dropping {}: {}", event, err);
                return Err(Skip::Dropped);
            }
        };

        let at = transport.instant_of(event.onset).ok_or(Skip::Dropped)?;
        Ok(Dispatch::new(event, sample, params, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{Layer, Section};
    use crate::samples::decode::tests::wav_bytes;
    use crate::samples::Fetcher;
    use crate::sequencing::Payload;
    use std::time::Duration;

    struct WavFetcher;

    impl Fetcher for WavFetcher {
        fn fetch(&self, uri: &str) -> Result<Vec<u8>, String> {
            if uri.contains("404") {
                Err("404 Not Found".into())
            } else {
                Ok(wav_bytes(16, 8_000))
            }
        }
    }

    fn lazy_registry() -> Arc<SampleRegistry> {
        let registry = SampleRegistry::with_fetcher(WavFetcher);
        registry.register("bd", "bd.wav");
        registry.register("sn", "sn.wav");
        registry.register("broken", "https://example.org/404.wav");
        Arc::new(registry)
    }

    fn registry() -> Arc<SampleRegistry> {
        let registry = lazy_registry();
        registry.preload();
        registry
    }

    fn scheduler(timeline: Timeline, config: EngineConfig) -> (Scheduler, Arc<DispatchQueue>) {
        let queue = Arc::new(DispatchQueue::new(64));
        let scheduler = Scheduler::new(
            Arc::new(timeline),
            registry(),
            Arc::clone(&queue),
            config.lookahead(Duration::ZERO),
        );
        (scheduler, queue)
    }

    fn drain(queue: &DispatchQueue) -> Vec<Dispatch> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn test_windows_cover_each_onset_once() {
        let timeline = Timeline::from(Section::from(Layer::sound("bd*4").unwrap()));
        let (mut scheduler, queue) = scheduler(timeline, EngineConfig::new());

        let t0 = Instant::now();
        let mut transport = Transport::new(1.0);
        transport.start(t0);

        let first = scheduler.advance(&transport, t0 + Duration::from_millis(250));
        assert_eq!(first.window, Some(TimeSpan::new(Rational::ZERO, Rational::new(1, 4))));
        assert_eq!(first.dispatched, 1);

        let second = scheduler.advance(&transport, t0 + Duration::from_secs(1));
        assert_eq!(second.dispatched, 3);

        let onsets: Vec<_> = drain(&queue).iter().map(|d| d.event.onset).collect();
        assert_eq!(
            onsets,
            vec![
                Rational::ZERO,
                Rational::new(1, 4),
                Rational::new(1, 2),
                Rational::new(3, 4)
            ]
        );
    }

    #[test]
    fn test_stopped_transport_queues_nothing() {
        let timeline = Timeline::from(Section::from(Layer::sound("bd*4").unwrap()));
        let (mut scheduler, queue) = scheduler(timeline, EngineConfig::new());
        let transport = Transport::new(1.0);

        let report = scheduler.advance(&transport, Instant::now());
        assert_eq!(report, TickReport::default());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_looping_wraps_to_cycle_zero() {
        let timeline = Timeline::cat([
            Section::from(Layer::sound("bd").unwrap()),
            Section::from(Layer::sound("sn").unwrap()),
        ]);
        let (mut scheduler, queue) = scheduler(timeline, EngineConfig::new());

        let t0 = Instant::now();
        let mut transport = Transport::new(1.0);
        transport.start(t0);
        scheduler.advance(&transport, t0 + Duration::from_secs(4));

        let names: Vec<_> = drain(&queue)
            .iter()
            .map(|d| d.event.payload.to_string())
            .collect();
        assert_eq!(names, vec!["bd", "sn", "bd", "sn"]);
    }

    #[test]
    fn test_no_loop_finishes() {
        let timeline = Timeline::from(Section::from(Layer::sound("bd sn").unwrap()));
        let (mut scheduler, queue) = scheduler(timeline, EngineConfig::new().looping(false));

        let t0 = Instant::now();
        let mut transport = Transport::new(1.0);
        transport.start(t0);

        let report = scheduler.advance(&transport, t0 + Duration::from_secs(5));
        assert_eq!(report.dispatched, 2);
        assert!(!report.finished);
        assert_eq!(scheduler.cursor(), Rational::ONE);

        let report = scheduler.advance(&transport, t0 + Duration::from_secs(6));
        assert!(report.finished);
        assert!(scheduler.is_finished());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_unresolvable_sample_is_dropped() {
        let timeline = Timeline::from(Section::stack(vec![
            Layer::sound("broken*2").unwrap(),
            Layer::sound("nope").unwrap(),
            Layer::sound("bd").unwrap(),
        ]));
        let (mut scheduler, queue) = scheduler(timeline, EngineConfig::new());

        let t0 = Instant::now();
        let mut transport = Transport::new(1.0);
        transport.start(t0);
        let report = scheduler.advance(&transport, t0 + Duration::from_secs(1));

        assert_eq!(report.dispatched, 1);
        assert_eq!(report.dropped, 3);
        assert_eq!(drain(&queue)[0].event.payload, Payload::sample("bd"));
    }

    #[test]
    fn test_unloaded_sample_is_skipped_and_loaded_in_background() {
        let registry = lazy_registry();
        let queue = Arc::new(DispatchQueue::new(64));
        let timeline = Timeline::from(Section::from(Layer::sound("bd").unwrap()));
        let mut scheduler = Scheduler::new(
            Arc::new(timeline),
            Arc::clone(&registry),
            Arc::clone(&queue),
            EngineConfig::new().lookahead(Duration::ZERO),
        );

        let t0 = Instant::now();
        let mut transport = Transport::new(1.0);
        transport.start(t0);

        let report = scheduler.advance(&transport, t0 + Duration::from_millis(500));
        assert_eq!(report.pending, 1);
        assert_eq!(report.dispatched, 0);
        assert!(queue.is_empty());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !registry.is_loaded("bd") && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(registry.is_loaded("bd"));
        assert!(!registry.is_loaded("sn"));

        let report = scheduler.advance(&transport, t0 + Duration::from_millis(1500));
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.pending, 0);
    }

    #[test]
    fn test_malformed_param_is_dropped() {
        let timeline = Timeline::from(Section::from(Layer::sound("bd sn").unwrap().lpf(-5.0)));
        let (mut scheduler, _queue) = scheduler(timeline, EngineConfig::new());

        let t0 = Instant::now();
        let mut transport = Transport::new(1.0);
        transport.start(t0);
        let report = scheduler.advance(&transport, t0 + Duration::from_secs(1));

        assert_eq!(report.dispatched, 0);
        assert_eq!(report.dropped, 2);
    }

    #[test]
    fn test_dispatch_carries_params_and_time() {
        let timeline = Timeline::from(Section::from(
            Layer::sound("~ sn").unwrap().gain(1.2).gain(0.5).room(0.3),
        ));
        let (mut scheduler, queue) = scheduler(timeline, EngineConfig::new());

        let t0 = Instant::now();
        let mut transport = Transport::new(2.0);
        transport.start(t0);
        scheduler.advance(&transport, t0 + Duration::from_secs(1));

        let dispatch = queue.pop().unwrap();
        assert!(dispatch.sample.is_some());
        assert!((dispatch.params.value(crate::effects::Param::Gain) - 0.6).abs() < 1e-12);
        assert_eq!(dispatch.at.duration_since(t0), Duration::from_millis(250));
    }
}
