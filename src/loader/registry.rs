//! In-process file registry
//!
//! Maps file names to declaration closures, for embedding the engine and for
//! driving it from tests.

use std::collections::HashMap;
use std::path::Path;

use super::{LoadError, Loader};
use crate::executor::Declare;
use crate::models::{Failure, IntoOutcome};

type FileDeclaration = Box<dyn Fn(&mut Declare<'_>) -> Result<(), Failure>>;

#[derive(Default)]
pub struct Registry {
    files: HashMap<String, FileDeclaration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the top-level declarations of `name`.
    pub fn file<F, R>(mut self, name: impl Into<String>, declare: F) -> Self
    where
        F: Fn(&mut Declare<'_>) -> R + 'static,
        R: IntoOutcome,
    {
        self.files.insert(
            name.into(),
            Box::new(move |d: &mut Declare<'_>| declare(d).into_outcome()),
        );
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Loader for Registry {
    fn load(&self, file: &str, _path: &Path, declare: &mut Declare<'_>) -> Result<(), LoadError> {
        let declare_file = self
            .files
            .get(file)
            .ok_or_else(|| LoadError::new(format!("Cannot find test file '{file}'")))?;
        declare_file(declare).map_err(|failure| LoadError::new(failure.message))
    }
}
