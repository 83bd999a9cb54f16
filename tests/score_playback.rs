use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use hound::{SampleFormat, WavSpec, WavWriter};

use saavy_cycles::effects::Param;
use saavy_cycles::engine::{Dispatch, DispatchQueue, Player, RecordingBackend, Scheduler, Transport};
use saavy_cycles::samples::{Fetcher, SampleRegistry};
use saavy_cycles::sequencing::Payload;
use saavy_cycles::{EngineConfig, Rational, Score, TimeSpan};

const DEMO: &str = include_str!("../scores/pata_negra.score");

/// Serves a short WAV for every URI without touching the network
struct OfflineFetcher {
    calls: Arc<AtomicUsize>,
}

impl Fetcher for OfflineFetcher {
    fn fetch(&self, _uri: &str) -> Result<Vec<u8>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).map_err(|e| e.to_string())?;
            for i in 0..64 {
                writer.write_sample(i as i16).map_err(|e| e.to_string())?;
            }
            writer.finalize().map_err(|e| e.to_string())?;
        }
        Ok(cursor.into_inner())
    }
}

fn demo() -> Score {
    Score::parse(DEMO).unwrap()
}

fn offline_registry(score: &Score, calls: &Arc<AtomicUsize>) -> SampleRegistry {
    let registry = SampleRegistry::with_fetcher(OfflineFetcher {
        calls: Arc::clone(calls),
    });
    score.register_samples(&registry);
    // The drum kit comes from the user's sample map, not the score
    for name in ["bd", "hh", "sn"] {
        registry.register(name, format!("kit/{}.wav", name));
    }
    registry
}

#[test]
fn demo_score_builds_eleven_cycles() {
    let score = demo();

    assert_relative_eq!(score.cps(), 128.0 / 60.0);
    assert_eq!(score.timeline().length(), Rational::from_integer(11));

    let names: Vec<_> = score.samples().iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["cunao", "risa", "esoesasi"]);

    let sections: Vec<_> = score
        .timeline()
        .sections()
        .map(|(_, s)| s.name().unwrap_or("-").to_string())
        .collect();
    assert_eq!(
        sections,
        vec![
            "intro",
            "intro",
            "estribillo",
            "estribillo",
            "breakdown",
            "subida",
            "drop",
            "drop",
            "drop",
            "drop",
            "-"
        ]
    );
}

#[test]
fn demo_score_event_counts() {
    let score = demo();
    let timeline = score.timeline();

    let per_cycle: Vec<usize> = (0..11)
        .map(|c| timeline.query(TimeSpan::cycles(c, c + 1)).len())
        .collect();
    assert_eq!(per_cycle, vec![13, 13, 32, 32, 5, 25, 32, 32, 32, 32, 1]);
    assert_eq!(timeline.query(TimeSpan::cycles(0, 11)).len(), 249);
}

#[test]
fn subida_snare_gain_ramps_across_the_section() {
    let score = demo();
    let gains: Vec<f64> = score
        .timeline()
        .query(TimeSpan::cycles(5, 6))
        .into_iter()
        .filter(|e| e.payload == Payload::sample("sn"))
        .map(|e| e.params[&Param::Gain].value_at(e.onset, e.section))
        .collect();

    assert_eq!(gains.len(), 16);
    assert_relative_eq!(gains[0], 0.2, epsilon = 1e-9);
    assert_relative_eq!(gains[15], 0.2 + 15.0 / 16.0, epsilon = 1e-9);
    assert!(gains.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn breakdown_cutoff_follows_slow_sine() {
    let score = demo();
    let notes: Vec<_> = score
        .timeline()
        .query(TimeSpan::cycles(4, 5))
        .into_iter()
        .filter(|e| matches!(e.payload, Payload::Note { .. }))
        .collect();

    assert_eq!(notes.len(), 4);
    let cutoff = notes[0].params[&Param::Cutoff].value_at(notes[0].onset, notes[0].section);
    // Cycle 4 is the start of a 4-cycle sine period
    assert_relative_eq!(cutoff, 1200.0, epsilon = 1e-9);
}

#[test]
fn scheduler_plays_demo_once_offline() {
    let score = demo();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = offline_registry(&score, &calls);
    registry.preload();

    let queue = Arc::new(DispatchQueue::new(512));
    let config = EngineConfig::new().lookahead(Duration::ZERO).looping(false);
    let mut scheduler = Scheduler::new(
        Arc::new(score.timeline().clone()),
        Arc::new(registry),
        Arc::clone(&queue),
        config,
    );

    let t0 = Instant::now();
    let mut transport = Transport::new(score.cps());
    transport.start(t0);

    let end = t0 + transport.duration_of(Rational::from_integer(12));
    let report = scheduler.advance(&transport, end);

    // Note layers play on "saw"/"superhex", which nothing registers
    assert_eq!(report.dispatched, 177);
    assert_eq!(report.dropped, 72);
    assert_eq!(report.pending, 0);
    assert_eq!(report.overflowed, 0);
    assert!(scheduler.advance(&transport, end).finished);

    // Six registered samples, each fetched once
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    let dispatches: Vec<Dispatch> = std::iter::from_fn(|| queue.pop()).collect();
    assert_eq!(dispatches.len(), 177);
    assert!(dispatches.iter().all(|d| d.sample.is_some()));
    assert!(dispatches
        .windows(2)
        .all(|w| w[0].event.onset <= w[1].event.onset && w[0].at <= w[1].at));

    let last = dispatches.last().unwrap();
    assert_eq!(last.event.payload, Payload::sample("esoesasi"));
    assert_relative_eq!(last.params.value(Param::Gain), 1.2);
    assert_relative_eq!(last.params.value(Param::Room), 0.5);
}

#[test]
fn player_runs_demo_to_completion() {
    let score = demo();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(offline_registry(&score, &calls));
    registry.preload();

    // Eleven cycles in about half a second
    let config = EngineConfig::new()
        .quantum(Duration::from_millis(10))
        .lookahead(Duration::from_millis(50))
        .looping(false);
    let mut player = Player::new(Arc::new(score.into_timeline()), registry, 22.0, config);
    let recorder = RecordingBackend::new();
    player.start(recorder.clone()).unwrap();

    assert!(player.wait_finished(Duration::from_secs(10)));
    let stats = player.stop().unwrap();

    assert_eq!(recorder.len(), 177);
    assert_eq!(stats.played, 177);
    assert_eq!(stats.dropped, 72);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.late, 0);
    assert_eq!(stats.overflowed, 0);
    assert!(recorder.silences() >= 1);
}
