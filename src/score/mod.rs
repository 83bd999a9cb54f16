//! Score files: the content that drives the engine.
//!
//! A score declares its samples, sets the tempo and builds a timeline out of
//! `s(...)`/`note(...)` layers, `stack(...)` sections and `cat(...)`:
//!
//! ```
//! use saavy_cycles::score::Score;
//!
//! let score = Score::parse(r#"
//!     samples({ cunao: 'https://example.org/cunao.wav' });
//!     setcps(128/60)
//!     const intro = stack(s("bd*4").gain(1.2), s("cunao").gain(0.6));
//!     cat(intro, intro)
//! "#).unwrap();
//!
//! assert_eq!(score.timeline().sections().count(), 2);
//! ```
//!
//! The last bare expression that evaluates to something playable is the
//! timeline. Every error carries the line and column it was found at.

mod eval;
pub mod lexer;
pub mod parser;

use std::fs;
use std::path::Path;

use crate::composition::Timeline;
use crate::engine::DEFAULT_CPS;
use crate::error::ScoreError;
use crate::samples::SampleRegistry;

pub use lexer::Pos;
pub use parser::{parse_program, Program};

/// A loaded score
#[derive(Debug, Clone)]
pub struct Score {
    /// `name -> uri` in declaration order
    samples: Vec<(String, String)>,
    cps: Option<f64>,
    timeline: Timeline,
}

impl Score {
    /// Parse and evaluate score source
    pub fn parse(source: &str) -> Result<Self, ScoreError> {
        let program = parse_program(source)?;
        eval::evaluate(&program)
    }

    /// Read and parse a score file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScoreError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|e| ScoreError::Io(format!("{}: {}", path.display(), e)))?;
        let score = Self::parse(&source)?;
        log::info!(
            "loaded {} ({} samples, {} cycles)",
            path.display(),
            score.samples.len(),
            score.timeline.length()
        );
        Ok(score)
    }

    pub fn samples(&self) -> &[(String, String)] {
        &self.samples
    }

    /// Tempo set by the score, if any
    pub fn declared_cps(&self) -> Option<f64> {
        self.cps
    }

    /// Tempo to play at
    pub fn cps(&self) -> f64 {
        self.cps.unwrap_or(DEFAULT_CPS)
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn into_timeline(self) -> Timeline {
        self.timeline
    }

    /// Register every declared sample
    pub fn register_samples(&self, registry: &SampleRegistry) {
        for (name, uri) in &self.samples {
            registry.register(name.as_str(), uri.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_cps() {
        let score = Score::parse("s(\"bd\")").unwrap();
        assert_eq!(score.declared_cps(), None);
        assert_eq!(score.cps(), DEFAULT_CPS);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "samples({{ kick: 'kick.wav' }})\nsetcps(1)\ns(\"kick*2\")").unwrap();

        let score = Score::load(file.path()).unwrap();
        assert_eq!(score.samples(), &[("kick".to_string(), "kick.wav".to_string())]);

        let registry = SampleRegistry::new();
        score.register_samples(&registry);
        assert!(registry.is_registered("kick"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Score::load("/definitely/not/here.score"),
            Err(ScoreError::Io(_))
        ));
    }
}
