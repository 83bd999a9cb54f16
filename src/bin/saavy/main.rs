//! saavy - play cycle-based pattern scores
//!
//! Run with: cargo run -- play scores/pata_negra.score

mod app;
mod sampler;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use env_logger::Env;

use app::Saavy;
use saavy_cycles::effects::ResolvedParams;
use saavy_cycles::sequencing::parser::parse_decimal;
use saavy_cycles::{EngineConfig, Rational, Score, TimeSpan};

/// Cycle-based pattern sequencer
#[derive(Parser, Debug)]
#[command(name = "saavy")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a score
    Play {
        /// Score file
        score: PathBuf,

        /// Tempo in cycles per second, overriding the score's setcps
        #[arg(long)]
        cps: Option<f64>,

        /// Play the timeline once instead of looping
        #[arg(long)]
        no_loop: bool,

        /// Log dispatches instead of opening an audio device
        #[arg(long)]
        dry_run: bool,

        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<f64>,

        /// Scheduler wake interval in milliseconds
        #[arg(long, default_value_t = 10.0)]
        quantum_ms: f64,

        /// How far ahead events are queued, in milliseconds
        #[arg(long, default_value_t = 50.0)]
        lookahead_ms: f64,
    },

    /// Parse a score and print its structure
    Check {
        /// Score file
        score: PathBuf,
    },

    /// Print the flattened events of a score
    Events {
        /// Score file
        score: PathBuf,

        /// First cycle (decimals allowed)
        #[arg(long, default_value = "0", value_parser = parse_cycle)]
        from: Rational,

        /// End cycle, defaults to the end of the timeline
        #[arg(long, value_parser = parse_cycle)]
        to: Option<Rational>,
    },
}

fn parse_cycle(text: &str) -> Result<Rational, String> {
    parse_decimal(text).ok_or_else(|| format!("'{}' is not a cycle position", text))
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Play {
            score,
            cps,
            no_loop,
            dry_run,
            cycles,
            quantum_ms,
            lookahead_ms,
        } => {
            let config = EngineConfig::new()
                .quantum(Duration::from_secs_f64(quantum_ms.max(0.0) / 1000.0))
                .lookahead(Duration::from_secs_f64(lookahead_ms.max(0.0) / 1000.0))
                .looping(!no_loop);

            Saavy::new(score)
                .cps(cps)
                .config(config)
                .dry_run(dry_run)
                .cycles(cycles)
                .run()
        }
        Commands::Check { score } => check(score),
        Commands::Events { score, from, to } => events(score, from, to),
    }
}

fn check(path: PathBuf) -> EyreResult<()> {
    let score = Score::load(&path).wrap_err_with(|| format!("failed to load {}", path.display()))?;

    println!("Tempo: {:.3} cps", score.cps());
    for (name, uri) in score.samples() {
        println!("Sample: {} -> {}", name, uri);
    }
    println!("{}", score.timeline());
    Ok(())
}

fn events(path: PathBuf, from: Rational, to: Option<Rational>) -> EyreResult<()> {
    let score = Score::load(&path).wrap_err_with(|| format!("failed to load {}", path.display()))?;
    let to = to.unwrap_or_else(|| score.timeline().length());
    if to <= from {
        return Err(eyre!("empty range {}..{}", from, to));
    }

    for event in score.timeline().query_looped(TimeSpan::new(from, to)) {
        match ResolvedParams::evaluate(&event.params, event.onset, event.section) {
            Ok(params) => println!(
                "{:>8} +{:<6} {:<16} {}",
                event.onset.to_string(),
                event.duration.to_string(),
                event.payload.to_string(),
                params
            ),
            Err(err) => println!("{:>8} {} (dropped: {})", event.onset.to_string(), event.payload, err),
        }
    }
    Ok(())
}
