//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{RunConfig, StreamTarget};

/// Suite/test tree execution worker
#[derive(Parser, Debug)]
#[command(name = "testwalk")]
#[command(author = "hephaex@gmail.com")]
#[command(version)]
#[command(about = "Walk suite/test manifests and hand results to a collecting process")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run test manifests
    Run(RunArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Config file (YAML or JSON); defaults to the standard locations
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Report only nodes whose title or file matches this pattern
    #[arg(short, long)]
    pub grep: Option<String>,

    /// Never create nodes whose title matches this pattern
    #[arg(short, long)]
    pub ignore: Option<String>,

    /// Stop after the first failure
    #[arg(short, long)]
    pub bail: bool,

    /// Default time limit in milliseconds (0 disables)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Reporter name (dot, silent)
    #[arg(short, long)]
    pub reporter: Option<String>,

    /// Progress stream (stdout, stderr)
    #[arg(long)]
    pub stream: Option<String>,

    /// Suppress progress marks
    #[arg(long)]
    pub hide_progress: bool,

    /// Record every assertion result instead of stopping at the first failure
    #[arg(long)]
    pub continue_asserts: bool,

    /// Base directory of the test files
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Worker identifier
    #[arg(long)]
    pub id: Option<usize>,

    /// Exit the process after a successful hand-off
    #[arg(long)]
    pub multi_process: bool,

    /// Syntax diagnostics for load errors (adds file:line:column)
    #[arg(long)]
    pub parser: Option<String>,

    /// Test files, relative to --dir
    pub files: Vec<String>,
}

impl RunArgs {
    /// Layer the given flags over `config`.
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(grep) = &self.grep {
            config.grep = Some(grep.clone());
        }
        if let Some(ignore) = &self.ignore {
            config.ignore = Some(ignore.clone());
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(reporter) = &self.reporter {
            config.reporter = reporter.clone();
        }
        if let Some(stream) = self.stream.as_deref().and_then(StreamTarget::from_str) {
            config.stream = stream;
        }
        if let Some(dir) = &self.dir {
            config.dir = dir.clone();
        }
        if let Some(id) = self.id {
            config.id = id;
        }
        if let Some(parser) = &self.parser {
            config.parser = Some(parser.clone());
        }
        config.bail |= self.bail;
        config.hide_progress |= self.hide_progress;
        config.continue_asserts |= self.continue_asserts;
        config.multi_process |= self.multi_process;
        if !self.files.is_empty() {
            config.files = self.files.clone();
        }
    }
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Config file to read instead of the standard locations
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print as JSON instead of YAML
    #[arg(long)]
    pub json: bool,

    /// List the recognised environment variables
    #[arg(long)]
    pub env_help: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let args = Args::parse_from([
            "testwalk", "run", "--grep", "push", "--bail", "--timeout", "250", "--dir", "specs",
            "a.yaml", "b.yaml",
        ]);
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.grep.as_deref(), Some("push"));
        assert!(run.bail);
        assert_eq!(run.files, ["a.yaml", "b.yaml"]);

        let mut config = RunConfig::default();
        run.apply(&mut config);
        assert_eq!(config.timeout, 250);
        assert_eq!(config.dir, PathBuf::from("specs"));
        assert!(config.bail);
    }

    #[test]
    fn test_flags_do_not_clear_config_values() {
        let mut config = RunConfig {
            bail: true,
            files: vec!["from-config.yaml".to_string()],
            ..RunConfig::default()
        };
        RunArgs::default().apply(&mut config);
        assert!(config.bail);
        assert_eq!(config.files, ["from-config.yaml"]);
    }

    #[test]
    fn test_global_log_level() {
        let args = Args::parse_from(["testwalk", "config", "--log-level", "debug"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }
}
