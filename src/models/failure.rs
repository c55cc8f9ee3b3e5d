//! Failure models
//!
//! Runtime failures are recorded on nodes rather than propagated, so they are
//! plain values here. Configuration mistakes live in [`crate::EngineError`].

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Kind of failure captured against a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Raised by test logic: an `Err` return, a panic, or a failed assertion
    Assertion,
    /// Escaped outside a direct invocation
    Uncaught,
    /// No completion within the time limit
    Timeout,
    /// A completion handle invoked more than once
    DoubleCompletion,
    /// A test file failed to load
    Load,
}

impl FailureKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            FailureKind::Assertion => "AssertionError",
            FailureKind::Uncaught => "UncaughtError",
            FailureKind::Timeout => "TimeoutError",
            FailureKind::DoubleCompletion => "DoubleCompletionError",
            FailureKind::Load => "LoadError",
        }
    }
}

/// A failure in displayable message form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    /// `file:line:column` for located load errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Assertion, message)
    }

    pub fn uncaught(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Uncaught, message)
    }

    pub fn timeout(limit_ms: u64) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("Timeout of {limit_ms}ms exceeded."),
        )
    }

    pub fn double_completion() -> Self {
        Self::new(
            FailureKind::DoubleCompletion,
            "Called `done` multiple times.",
        )
    }

    pub fn load(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Load, message)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Normalize a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panicked with a non-string payload".to_string()
        };
        Self::assertion(message)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.prefix(), self.message)?;
        if let Some(location) = &self.location {
            write!(f, "\n    at script ({location})")?;
        }
        Ok(())
    }
}

/// One result reported by the assertion collaborator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionRecord {
    pub passed: bool,
    pub message: String,
}

/// Conversion of a hook or body return value into an outcome
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<(), Failure>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<(), Failure> {
        Ok(())
    }
}

impl<E: Into<Failure>> IntoOutcome for Result<(), E> {
    fn into_outcome(self) -> Result<(), Failure> {
        self.map_err(Into::into)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Failure::assertion(message)
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Failure::assertion(message)
    }
}

impl From<std::io::Error> for Failure {
    fn from(error: std::io::Error) -> Self {
        Failure::assertion(error.to_string())
    }
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        Failure::assertion(format!("{error:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_prefix() {
        let failure = Failure::timeout(250);
        assert_eq!(failure.to_string(), "TimeoutError: Timeout of 250ms exceeded.");
    }

    #[test]
    fn test_display_with_location() {
        let failure = Failure::load("unexpected token").with_location("spec/a.yaml:3:7");
        assert_eq!(
            failure.to_string(),
            "LoadError: unexpected token\n    at script (spec/a.yaml:3:7)"
        );
    }

    #[test]
    fn test_from_panic_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(Failure::from_panic(boxed).message, "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(Failure::from_panic(boxed).message, "owned boom");

        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(Failure::from_panic(boxed).kind, FailureKind::Assertion);
    }

    #[test]
    fn test_into_outcome() {
        assert!(().into_outcome().is_ok());
        let err: Result<(), String> = Err("nope".to_string());
        assert_eq!(err.into_outcome().unwrap_err().message, "nope");

        let timeout: Result<(), Failure> = Err(Failure::timeout(5));
        let failure = timeout.into_outcome().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.message, "Timeout of 5ms exceeded.");
    }
}
