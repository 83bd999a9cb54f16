//! Saavy - score player builder and runner

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use saavy_cycles::engine::{LogBackend, Player};
use saavy_cycles::samples::{DefaultFetcher, SampleRegistry};
use saavy_cycles::{EngineConfig, Score};

use super::sampler::sampler;

/// Voice commands that can be in flight to the audio thread
const VOICE_QUEUE: usize = 256;

/// Plays a score through the default output device
pub struct Saavy {
    score_path: PathBuf,
    cps: Option<f64>,
    config: EngineConfig,
    dry_run: bool,
    cycles: Option<f64>,
}

impl Saavy {
    pub fn new(score_path: impl Into<PathBuf>) -> Self {
        Self {
            score_path: score_path.into(),
            cps: None,
            config: EngineConfig::new(),
            dry_run: false,
            cycles: None,
        }
    }

    /// Override the score's tempo
    pub fn cps(mut self, cps: Option<f64>) -> Self {
        self.cps = cps;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Log dispatches instead of opening an audio device
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Stop after this many cycles
    pub fn cycles(mut self, cycles: Option<f64>) -> Self {
        self.cycles = cycles;
        self
    }

    /// Load the score, fetch its samples and play it (takes over the thread)
    pub fn run(self) -> EyreResult<()> {
        let score = Score::load(&self.score_path)
            .wrap_err_with(|| format!("failed to load {}", self.score_path.display()))?;
        let cps = self.cps.unwrap_or_else(|| score.cps());
        let registry = Arc::new(load_samples(&score, &self.score_path));

        println!("=== Saavy ===");
        println!("Score: {}", self.score_path.display());
        println!("Tempo: {:.3} cps", cps);
        println!("Length: {} cycles", score.timeline().length());
        println!();

        let mut player = Player::new(
            Arc::new(score.into_timeline()),
            registry,
            cps,
            self.config.clone(),
        );

        if self.dry_run {
            player.start(LogBackend::new())?;
            return self.wait(player, cps);
        }

        // Set up audio
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| eyre!("no default output device available"))?;
        let config = device
            .default_output_config()
            .wrap_err("failed to fetch default output config")?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;
        println!("Sample rate: {} Hz", sample_rate);
        println!("Channels: {}", channels);
        println!();

        let (backend, mut sampler) = sampler(sample_rate, VOICE_QUEUE);
        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _| sampler.render(data, channels),
            |err| log::error!("audio stream error: {}", err),
            None,
        )?;
        stream.play()?;

        player.start(backend)?;
        self.wait(player, cps)
    }

    fn wait(&self, mut player: Player, cps: f64) -> EyreResult<()> {
        match self.cycles {
            Some(cycles) => {
                println!("Playing {} cycles...", cycles);
                std::thread::sleep(Duration::from_secs_f64((cycles / cps).max(0.0)));
            }
            None if !player.config().looping => {
                println!("Playing once...");
                while !player.wait_finished(Duration::from_secs(1)) {}
            }
            None => {
                println!("Playing... Press Ctrl+C to stop");
                loop {
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }

        let stats = player.stop()?;
        println!(
            "Played {} events ({} dropped, {} still loading, {} overflowed, {} late, {} overruns)",
            stats.played, stats.dropped, stats.pending, stats.overflowed, stats.late, stats.overruns
        );
        Ok(())
    }
}

/// Register the score's samples, relative paths against the score's directory,
/// and fetch them all up front.
pub fn load_samples(score: &Score, score_path: &Path) -> SampleRegistry {
    let mut fetcher = DefaultFetcher::new();
    if let Some(dir) = score_path.parent() {
        fetcher = fetcher.with_base_dir(dir);
    }
    let registry = SampleRegistry::with_fetcher(fetcher);
    score.register_samples(&registry);

    for (name, result) in registry.preload() {
        match result {
            Ok(buffer) => println!(
                "  Sample: {} ({:.2} s)",
                name,
                buffer.duration_seconds()
            ),
            Err(err) => println!("  Sample: {} unavailable ({})", name, err),
        }
    }
    registry
}
