//! YAML test manifests
//!
//! A manifest declares suites and tests whose hooks and bodies are shell
//! commands. Foreground commands block the walk; `background: true` tests
//! run their command on a spawned task and complete through their handle.
//!
//! ```yaml
//! suites:
//!   - name: Array
//!     before_each: ["rm -f /tmp/state"]
//!     tests:
//!       - name: .push
//!         run: "echo 1 > /tmp/state"
//!       - name: .pop
//!         run: "sleep 1"
//!         background: true
//!         timeout: 3000
//!       - name: .splice
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, ExitStatus};
use tracing::debug;

use super::{LoadError, Loader};
use crate::executor::{Callback, Declare, Done, IntoCallback};
use crate::hooks::HookKind;
use crate::models::Failure;

/// Top level of a manifest file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub suites: Vec<SuiteSpec>,
    pub tests: Vec<TestSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteSpec {
    pub name: String,
    #[serde(default)]
    pub only: bool,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default, alias = "setup")]
    pub before: Vec<String>,
    #[serde(default, alias = "teardown")]
    pub after: Vec<String>,
    #[serde(default, alias = "beforeEach")]
    pub before_each: Vec<String>,
    #[serde(default, alias = "afterEach")]
    pub after_each: Vec<String>,
    #[serde(default)]
    pub tests: Vec<TestSpec>,
    #[serde(default)]
    pub suites: Vec<SuiteSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,
    #[serde(default)]
    pub only: bool,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Shell command; a test without one is a stub
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub background: bool,
}

/// Loads manifests from disk and runs their commands through a shell
#[derive(Clone, Debug)]
pub struct ManifestLoader {
    shell: String,
}

impl Default for ManifestLoader {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl ManifestLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Parse a manifest, keeping the YAML error position.
    pub fn parse(content: &str) -> Result<Manifest, LoadError> {
        serde_yaml::from_str(content).map_err(|e| {
            let error = LoadError::new(e.to_string());
            match e.location() {
                Some(location) => error.at(location.line(), location.column()),
                None => error,
            }
        })
    }
}

impl Loader for ManifestLoader {
    fn load(&self, _file: &str, path: &Path, declare: &mut Declare<'_>) -> Result<(), LoadError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LoadError::new(format!("Failed to read {}: {e}", path.display())))?;
        let manifest = Self::parse(&content)?;
        debug!(
            "{}: {} suite(s), {} test(s)",
            path.display(),
            manifest.suites.len(),
            manifest.tests.len()
        );

        for test in manifest.tests {
            declare_test(declare, &self.shell, test);
        }
        for suite in manifest.suites {
            declare_suite(declare, &self.shell, suite);
        }
        Ok(())
    }
}

fn declare_suite(declare: &mut Declare<'_>, shell: &str, spec: SuiteSpec) {
    let SuiteSpec {
        name,
        only,
        skip,
        timeout,
        before,
        after,
        before_each,
        after_each,
        tests,
        suites,
    } = spec;
    let shell = shell.to_string();

    // Nested contents are declared when the suite itself reaches WAIT.
    let body = move |d: &mut Declare<'_>| -> Result<(), Failure> {
        let hooks = [
            (HookKind::Before, before),
            (HookKind::After, after),
            (HookKind::BeforeEach, before_each),
            (HookKind::AfterEach, after_each),
        ];
        for (kind, commands) in hooks {
            for command in commands {
                d.hook(kind, foreground(&shell, command))
                    .map_err(|e| Failure::load(e.to_string()))?;
            }
        }
        for test in tests {
            declare_test(d, &shell, test);
        }
        for suite in suites {
            declare_suite(d, &shell, suite);
        }
        Ok(())
    };

    let declared = if skip {
        declare.describe_skip(&name, body)
    } else if only {
        declare.describe_only(&name, body)
    } else {
        declare.describe(&name, body)
    };
    if let Some(limit_ms) = timeout {
        declared.timeout(limit_ms);
    }
}

fn declare_test(declare: &mut Declare<'_>, shell: &str, spec: TestSpec) {
    let Some(command) = spec.run else {
        declare.todo(&spec.name);
        return;
    };
    let body = if spec.background {
        background(shell, command)
    } else {
        foreground(shell, command)
    };

    let declared = if spec.skip {
        declare.test_skip(&spec.name, body)
    } else if spec.only {
        declare.test_only(&spec.name, body)
    } else {
        declare.test(&spec.name, body)
    };
    if let Some(limit_ms) = spec.timeout {
        declared.timeout(limit_ms);
    }
}

fn foreground(shell: &str, command: String) -> Callback {
    let shell = shell.to_string();
    (move || -> Result<(), Failure> {
        debug!("Running `{}`", command);
        let output = Command::new(&shell)
            .arg("-c")
            .arg(&command)
            .output()
            .map_err(|e| Failure::assertion(format!("Failed to spawn `{command}`: {e}")))?;
        check_status(&command, output.status, &output.stderr)
    })
    .into_callback()
}

fn background(shell: &str, command: String) -> Callback {
    let shell = shell.to_string();
    (move |done: Done| {
        let shell = shell.clone();
        let command = command.clone();
        debug!("Spawning `{}`", command);
        tokio::spawn(async move {
            let output = tokio::process::Command::new(&shell)
                .arg("-c")
                .arg(&command)
                .output()
                .await;
            match output {
                Ok(output) => match check_status(&command, output.status, &output.stderr) {
                    Ok(()) => done.done(),
                    Err(failure) => done.fail(failure.message),
                },
                Err(e) => done.fail(format!("Failed to spawn `{command}`: {e}")),
            }
        });
    })
    .into_callback()
}

fn check_status(command: &str, status: ExitStatus, stderr: &[u8]) -> Result<(), Failure> {
    if status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    let message = if stderr.is_empty() {
        format!("`{command}` exited with {status}")
    } else {
        format!("`{command}` exited with {status}: {stderr}")
    };
    Err(Failure::assertion(message))
}
