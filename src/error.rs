//! Error types for every stage of loading and playing a score.
//!
//! Parse-time errors (`PatternError`, `ScoreError`) abort loading. Runtime
//! errors (`SampleError`, `ParamError`, `ScheduleError`) only ever cost the
//! affected event: the scheduler logs them and keeps playing.

use std::ops::Range;

use thiserror::Error;

/// Malformed mini-notation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("syntax error at {}..{}: {message}", span.start, span.end)]
    Syntax { message: String, span: Range<usize> },
}

impl PatternError {
    pub fn syntax(message: impl Into<String>, span: Range<usize>) -> Self {
        PatternError::Syntax {
            message: message.into(),
            span,
        }
    }

    /// Byte range of the offending token
    pub fn span(&self) -> Range<usize> {
        match self {
            PatternError::Syntax { span, .. } => span.clone(),
        }
    }
}

/// Sample resolution failures
///
/// Cloneable because the registry caches failed resolutions too.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("sample '{0}' is not registered")]
    NotFound(String),

    #[error("failed to fetch sample '{name}' from {uri}: {reason}")]
    Fetch {
        name: String,
        uri: String,
        reason: String,
    },

    #[error("failed to decode sample '{name}': {reason}")]
    Decode { name: String, reason: String },
}

/// A parameter evaluated to something the backend cannot use
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("malformed {param} value {value}: {reason}")]
    Malformed {
        param: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// Backpressure and timing problems on the dispatch path
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("schedule overrun: {what} took {elapsed_ms:.2} ms (quantum {quantum_ms:.2} ms)")]
    Overrun {
        what: &'static str,
        elapsed_ms: f64,
        quantum_ms: f64,
    },

    #[error("dispatch queue full, dropped oldest event ({dropped})")]
    QueueOverflow { dropped: String },
}

/// Failures while loading a score file
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("{line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{line}:{column}: in pattern \"{pattern}\": {source}")]
    Pattern {
        line: usize,
        column: usize,
        pattern: String,
        #[source]
        source: PatternError,
    },

    #[error("{line}:{column}: {message}")]
    Type {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{line}:{column}: unknown name '{name}'")]
    Unknown {
        line: usize,
        column: usize,
        name: String,
    },

    #[error("score has no timeline expression")]
    NoTimeline,

    #[error("failed to read score: {0}")]
    Io(String),
}

/// Failures starting or stopping playback
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("player is already running")]
    AlreadyRunning,

    #[error("player is not running")]
    NotRunning,

    #[error("control queue is full")]
    ControlQueueFull,

    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} thread panicked")]
    Panicked(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_error_message_has_span() {
        let err = PatternError::syntax("unclosed group, missing ']'", 3..4);
        assert_eq!(err.to_string(), "syntax error at 3..4: unclosed group, missing ']'");
        assert_eq!(err.span(), 3..4);
    }

    #[test]
    fn test_sample_error_messages() {
        assert_eq!(
            SampleError::NotFound("saw".into()).to_string(),
            "sample 'saw' is not registered"
        );
    }
}
