//! Environment variable configuration
//!
//! `TESTWALK_*` variables override the config file and are in turn
//! overridden by command-line flags.

use std::env;
use std::path::PathBuf;

use super::{RunConfig, StreamTarget};

/// Environment variable prefix
const ENV_PREFIX: &str = "TESTWALK";

/// Overrides read from the environment
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// TESTWALK_GREP
    pub grep: Option<String>,
    /// TESTWALK_IGNORE
    pub ignore: Option<String>,
    /// TESTWALK_REPORTER
    pub reporter: Option<String>,
    /// TESTWALK_STREAM
    pub stream: Option<StreamTarget>,
    /// TESTWALK_TIMEOUT
    pub timeout: Option<u64>,
    /// TESTWALK_BAIL
    pub bail: Option<bool>,
    /// TESTWALK_HIDE_PROGRESS
    pub hide_progress: Option<bool>,
    /// TESTWALK_CONTINUE_ASSERTS
    pub continue_asserts: Option<bool>,
    /// TESTWALK_DIR
    pub dir: Option<String>,
    /// TESTWALK_ID
    pub id: Option<usize>,
    /// TESTWALK_MULTI_PROCESS
    pub multi_process: Option<bool>,
    /// TESTWALK_LOG
    pub log: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            grep: get_env("GREP"),
            ignore: get_env("IGNORE"),
            reporter: get_env("REPORTER"),
            stream: get_env("STREAM").and_then(|s| StreamTarget::from_str(&s)),
            timeout: get_env_parse("TIMEOUT"),
            bail: get_env_bool("BAIL"),
            hide_progress: get_env_bool("HIDE_PROGRESS"),
            continue_asserts: get_env_bool("CONTINUE_ASSERTS"),
            dir: get_env("DIR"),
            id: get_env_parse("ID"),
            multi_process: get_env_bool("MULTI_PROCESS"),
            log: get_env("LOG"),
        }
    }

    pub fn has_any(&self) -> bool {
        self.grep.is_some()
            || self.ignore.is_some()
            || self.reporter.is_some()
            || self.stream.is_some()
            || self.timeout.is_some()
            || self.bail.is_some()
            || self.hide_progress.is_some()
            || self.continue_asserts.is_some()
            || self.dir.is_some()
            || self.id.is_some()
            || self.multi_process.is_some()
    }

    /// Layer the set variables over `config`.
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(grep) = &self.grep {
            config.grep = Some(grep.clone());
        }
        if let Some(ignore) = &self.ignore {
            config.ignore = Some(ignore.clone());
        }
        if let Some(reporter) = &self.reporter {
            config.reporter = reporter.clone();
        }
        if let Some(stream) = self.stream {
            config.stream = stream;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(bail) = self.bail {
            config.bail = bail;
        }
        if let Some(hide) = self.hide_progress {
            config.hide_progress = hide;
        }
        if let Some(continue_asserts) = self.continue_asserts {
            config.continue_asserts = continue_asserts;
        }
        if let Some(dir) = &self.dir {
            config.dir = PathBuf::from(dir);
        }
        if let Some(id) = self.id {
            config.id = id;
        }
        if let Some(multi_process) = self.multi_process {
            config.multi_process = multi_process;
        }
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables in tests
#[derive(Default)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `TESTWALK_<name>`
    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    pub fn grep(self, pattern: impl Into<String>) -> Self {
        self.var("GREP", pattern)
    }

    pub fn timeout(self, timeout: u64) -> Self {
        self.var("TIMEOUT", timeout.to_string())
    }

    pub fn bail(self, bail: bool) -> Self {
        self.var("BAIL", bail.to_string())
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Help text listing the recognised variables
pub fn env_help() -> String {
    [
        ("GREP", "Report only nodes whose title or file matches"),
        ("IGNORE", "Never create nodes whose title matches"),
        ("REPORTER", "Reporter name (dot, silent)"),
        ("STREAM", "Progress stream (stdout, stderr)"),
        ("TIMEOUT", "Default time limit in milliseconds"),
        ("BAIL", "Stop after the first failure (true/false)"),
        ("HIDE_PROGRESS", "Suppress progress marks (true/false)"),
        ("CONTINUE_ASSERTS", "Record every assertion result (true/false)"),
        ("DIR", "Base directory of test files"),
        ("ID", "Worker identifier"),
        ("MULTI_PROCESS", "Exit after hand-off (true/false)"),
        ("LOG", "Log level (trace, debug, info, warn, error)"),
    ]
    .iter()
    .map(|(name, help)| format!("  {ENV_PREFIX}_{name:<18}{help}\n"))
    .collect()
}
