//! Test file loading
//!
//! The run root's declaration loads every assigned file through a
//! [`Loader`]. A file that fails to load, by error or panic, is replaced by a
//! failing `File: <path>` suite so the remaining files still run.

mod manifest;
mod registry;

pub use manifest::{Manifest, ManifestLoader, SuiteSpec, TestSpec};
pub use registry::Registry;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::executor::{catch_quietly, Declaration, Declare};
use crate::models::Failure;

/// A file that could not be loaded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct LoadError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Convert to the failure recorded on the synthesized suite. The location
    /// is attached only when a syntax diagnostics collaborator is configured.
    pub fn into_failure(self, path: &str, locate: bool) -> Failure {
        let failure = Failure::load(self.message);
        match (locate, self.line) {
            (true, Some(line)) => {
                failure.with_location(format!("{path}:{line}:{}", self.column.unwrap_or(1)))
            }
            _ => failure,
        }
    }
}

/// Declares the contents of one test file
pub trait Loader {
    /// `file` is the name as assigned to this worker, `path` is it joined
    /// onto the base directory.
    fn load(&self, file: &str, path: &Path, declare: &mut Declare<'_>) -> Result<(), LoadError>;
}

/// Declaration of the run root: load each file in order.
pub(crate) fn root_declaration(
    loader: Box<dyn Loader>,
    files: Vec<String>,
    dir: PathBuf,
    locate: bool,
) -> Declaration {
    Box::new(move |declare: &mut Declare<'_>| {
        for file in &files {
            let path = dir.join(file);
            declare.set_file(Some(file.clone()));
            debug!("Loading {}", path.display());

            let loaded = catch_quietly(|| loader.load(file, &path, declare));
            let error = match loaded {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => error,
                Err(payload) => LoadError::new(Failure::from_panic(payload).message),
            };

            let path = path.display().to_string();
            warn!("Failed to load {}: {}", path, error);
            declare.fail_file(&path, error.into_failure(&path, locate));
        }
        declare.set_file(None);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureKind;

    #[test]
    fn test_into_failure_location_requires_parser() {
        let error = LoadError::new("mapping values are not allowed").at(3, 7);
        let located = error.clone().into_failure("./a.yaml", true);
        assert_eq!(located.kind, FailureKind::Load);
        assert_eq!(located.location.as_deref(), Some("./a.yaml:3:7"));

        let plain = error.into_failure("./a.yaml", false);
        assert!(plain.location.is_none());
    }

    #[test]
    fn test_into_failure_without_line() {
        let failure = LoadError::new("missing").into_failure("./b.yaml", true);
        assert!(failure.location.is_none());
        assert_eq!(failure.to_string(), "LoadError: missing");
    }
}
