//! Configuration module
//!
//! Run options as read from a config file and the environment, and their
//! compiled form consumed by the engine.

pub mod env;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::filter::Filter;

/// Config file locations, in order of precedence
const CONFIG_LOCATIONS: &[&str] = &[
    "./testwalk.yaml",
    "./testwalk.yml",
    "./.testwalk.yaml",
    "./testwalk.json",
    "~/.config/testwalk/config.yaml",
];

/// Where progress output goes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamTarget {
    #[default]
    Stdout,
    Stderr,
}

impl StreamTarget {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stdout" => Some(StreamTarget::Stdout),
            "stderr" => Some(StreamTarget::Stderr),
            _ => None,
        }
    }

    pub fn writer(self) -> Box<dyn Write> {
        match self {
            StreamTarget::Stdout => Box::new(io::stdout()),
            StreamTarget::Stderr => Box::new(io::stderr()),
        }
    }
}

/// Run configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunConfig {
    /// Report only nodes whose title or file matches
    pub grep: Option<String>,
    /// Never create nodes whose title matches
    pub ignore: Option<String>,
    pub reporter: String,
    pub stream: StreamTarget,
    pub hide_progress: bool,
    /// Syntax diagnostics collaborator; enables located load errors
    pub parser: Option<String>,
    pub continue_asserts: bool,
    pub bail: bool,
    /// Default time limit in milliseconds; 0 disables timers
    pub timeout: u64,
    pub files: Vec<String>,
    pub dir: PathBuf,
    pub id: usize,
    pub multi_process: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            grep: None,
            ignore: None,
            reporter: "dot".to_string(),
            stream: StreamTarget::Stdout,
            hide_progress: false,
            parser: None,
            continue_asserts: false,
            bail: false,
            timeout: 1000,
            files: Vec::new(),
            dir: PathBuf::from("."),
            id: 0,
            multi_process: false,
        }
    }
}

impl RunConfig {
    /// Load configuration from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Find a config file in the standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load from the first standard location, or fall back to defaults
    pub fn load_default() -> Result<Self> {
        match Self::find() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate patterns and produce engine options.
    pub fn compile(&self) -> std::result::Result<Options, EngineError> {
        Ok(Options {
            filter: Filter::compile(self.grep.as_deref(), self.ignore.as_deref())?,
            reporter: self.reporter.clone(),
            stream: self.stream,
            hide_progress: self.hide_progress,
            parser: self.parser.clone(),
            continue_asserts: self.continue_asserts,
            bail: self.bail,
            timeout: self.timeout,
            files: self.files.clone(),
            dir: self.dir.clone(),
            id: self.id,
            multi_process: self.multi_process,
        })
    }
}

/// Compiled run options
#[derive(Clone, Debug)]
pub struct Options {
    pub filter: Filter,
    pub reporter: String,
    pub stream: StreamTarget,
    pub hide_progress: bool,
    pub parser: Option<String>,
    pub continue_asserts: bool,
    pub bail: bool,
    pub timeout: u64,
    pub files: Vec<String>,
    pub dir: PathBuf,
    pub id: usize,
    pub multi_process: bool,
}

impl Default for Options {
    fn default() -> Self {
        let config = RunConfig::default();
        Self {
            filter: Filter::default(),
            reporter: config.reporter,
            stream: config.stream,
            hide_progress: config.hide_progress,
            parser: config.parser,
            continue_asserts: config.continue_asserts,
            bail: config.bail,
            timeout: config.timeout,
            files: config.files,
            dir: config.dir,
            id: config.id,
            multi_process: config.multi_process,
        }
    }
}

impl Options {
    /// Keep stdout for the result hand-off by moving progress to stderr.
    /// Returns `true` when the stream was changed.
    pub fn reserve_stdout(&mut self) -> bool {
        if self.hide_progress || self.stream != StreamTarget::Stdout {
            return false;
        }
        self.stream = StreamTarget::Stderr;
        true
    }
}

/// Expand `~` to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.reporter, "dot");
        assert_eq!(config.timeout, 1000);
        assert_eq!(config.dir, PathBuf::from("."));
        assert_eq!(config.stream, StreamTarget::Stdout);
    }

    #[test]
    fn test_load_yaml_with_camel_case_keys() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "grep: push\nhideProgress: true\ncontinueAsserts: true\ntimeout: 250\nfiles: [a.yaml, b.yaml]"
        )
        .unwrap();

        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.grep.as_deref(), Some("push"));
        assert!(config.hide_progress);
        assert!(config.continue_asserts);
        assert_eq!(config.timeout, 250);
        assert_eq!(config.files, ["a.yaml", "b.yaml"]);
        assert_eq!(config.reporter, "dot");
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let config = RunConfig {
            bail: true,
            id: 4,
            multi_process: true,
            ..RunConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = RunConfig::load(&path).unwrap();
        assert!(loaded.bail);
        assert!(loaded.multi_process);
        assert_eq!(loaded.id, 4);
    }

    #[test]
    fn test_compile_rejects_invalid_ignore() {
        let config = RunConfig {
            ignore: Some("[".to_string()),
            ..RunConfig::default()
        };
        assert!(matches!(
            config.compile(),
            Err(EngineError::InvalidPattern { option: "ignore", .. })
        ));
    }

    #[test]
    fn test_reserve_stdout_moves_progress_to_stderr() {
        let mut options = RunConfig::default().compile().unwrap();
        assert!(options.reserve_stdout());
        assert_eq!(options.stream, StreamTarget::Stderr);
        assert!(!options.reserve_stdout());

        let mut hidden = Options {
            hide_progress: true,
            ..Options::default()
        };
        assert!(!hidden.reserve_stdout());
        assert_eq!(hidden.stream, StreamTarget::Stdout);
    }

    #[test]
    fn test_stream_target_from_str() {
        assert_eq!(StreamTarget::from_str("STDERR"), Some(StreamTarget::Stderr));
        assert_eq!(StreamTarget::from_str("file"), None);
    }
}
