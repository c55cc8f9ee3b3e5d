//! Engine errors
//!
//! Only usage mistakes and hand-off problems surface as Rust errors. Test-time
//! failures are recorded on nodes as [`crate::models::Failure`] values.

use thiserror::Error;

use crate::hooks::HookKind;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Attempted to register a `{hook}` hook on '{suite}' after the suite started")]
    HookAfterStart { suite: String, hook: HookKind },

    #[error("Hooks can only be registered on suites, '{0}' is a test")]
    NotASuite(String),

    #[error("Invalid {option} pattern: {source}")]
    InvalidPattern {
        option: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown reporter: {0}")]
    UnknownReporter(String),

    #[error("Result hand-off failed: {0}")]
    Handoff(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
