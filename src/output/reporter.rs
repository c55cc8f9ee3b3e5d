//! Reporter collaborators
//!
//! A reporter receives progress callbacks while the walk runs and formats
//! the pruned tree into the payload's `output` when it finishes.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::config::Options;
use crate::error::EngineError;
use crate::models::{NodeStatus, RunPayload};

const DOT_WIDTH: usize = 60;

pub trait Reporter {
    fn init(&mut self, _options: &Options, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    fn stub(&mut self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    fn skip(&mut self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    fn fail(&mut self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    fn pass(&mut self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    /// Close the progress output once the walk is over.
    fn end(&mut self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    /// Format the finished (pruned) tree, typically into `payload.output`.
    fn finish_tree(&mut self, _payload: &mut RunPayload) {}
}

/// Select a built-in reporter by name.
pub fn reporter_by_name(name: &str) -> Result<Box<dyn Reporter>, EngineError> {
    match name.to_lowercase().as_str() {
        "dot" | "dots" => Ok(Box::new(DotReporter::default())),
        "silent" | "none" => Ok(Box::new(SilentReporter)),
        _ => Err(EngineError::UnknownReporter(name.to_string())),
    }
}

/// One mark per outcome, then a failure list
#[derive(Default)]
pub struct DotReporter {
    column: usize,
}

impl DotReporter {
    fn mark(&mut self, out: &mut dyn Write, mark: &str) -> io::Result<()> {
        if self.column > 0 && self.column % DOT_WIDTH == 0 {
            write!(out, "\n  ")?;
        }
        self.column += 1;
        write!(out, "{mark}")?;
        out.flush()
    }
}

impl Reporter for DotReporter {
    fn init(&mut self, _options: &Options, out: &mut dyn Write) -> io::Result<()> {
        self.column = 0;
        write!(out, "\n  ")
    }

    fn stub(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.mark(out, "~")
    }

    fn skip(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.mark(out, "-")
    }

    fn fail(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.mark(out, "F")
    }

    fn pass(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.mark(out, ".")
    }

    fn end(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.column = 0;
        writeln!(out)?;
        out.flush()
    }

    fn finish_tree(&mut self, payload: &mut RunPayload) {
        let mut output = String::new();
        output.push_str(&format!(
            "\n\n  {} passing, {} failing, {} skipped, {} stubbed\n",
            payload.passed, payload.failed, payload.skipped, payload.stubbed
        ));

        let failures = payload
            .tree
            .walk()
            .filter(|node| node.status == NodeStatus::Failed);
        for (i, node) in failures.enumerate() {
            let title = if node.title.is_empty() {
                "(run root)"
            } else {
                node.title.as_str()
            };
            output.push_str(&format!("\n  {}) {}\n", i + 1, title));
            if let Some(error) = &node.error {
                for line in error.to_string().lines() {
                    output.push_str(&format!("     {line}\n"));
                }
            }
        }
        payload.output = output;
    }
}

/// Writes nothing and leaves `output` empty
pub struct SilentReporter;

impl Reporter for SilentReporter {}

/// Cloneable in-memory writer, handy for capturing progress output
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "buffer lock poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Failure, ReportNode};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn payload(tree: ReportNode) -> RunPayload {
        RunPayload {
            id: 0,
            started_at: Utc::now(),
            times: BTreeMap::new(),
            output: String::new(),
            passed: 1,
            failed: 1,
            skipped: 0,
            stubbed: 0,
            has_only: false,
            tree,
        }
    }

    fn node(title: &str, status: NodeStatus) -> ReportNode {
        ReportNode {
            name: title.to_string(),
            title: title.to_string(),
            suite: false,
            status,
            only: false,
            skip: false,
            has_only: false,
            file: None,
            error: None,
            results: Vec::new(),
            elapsed_ms: 0,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_reporter_by_name() {
        assert!(reporter_by_name("dot").is_ok());
        assert!(reporter_by_name("SILENT").is_ok());
        assert!(matches!(
            reporter_by_name("fancy"),
            Err(EngineError::UnknownReporter(name)) if name == "fancy"
        ));
    }

    #[test]
    fn test_dot_marks() {
        let mut reporter = DotReporter::default();
        let mut out: Vec<u8> = Vec::new();
        reporter.init(&Options::default(), &mut out).unwrap();
        reporter.pass(&mut out).unwrap();
        reporter.fail(&mut out).unwrap();
        reporter.skip(&mut out).unwrap();
        reporter.stub(&mut out).unwrap();
        reporter.end(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\n  .F-~\n");
    }

    #[test]
    fn test_dot_finish_lists_failures() {
        let mut failing = node("Array push", NodeStatus::Failed);
        failing.error = Some(Failure::assertion("expected 1 to equal 2"));
        let mut root = node("", NodeStatus::Passed);
        root.children = vec![node("Array pop", NodeStatus::Passed), failing];

        let mut payload = payload(root);
        DotReporter::default().finish_tree(&mut payload);
        assert!(payload.output.contains("1 passing, 1 failing"));
        assert!(payload.output.contains("1) Array push"));
        assert!(payload.output.contains("AssertionError: expected 1 to equal 2"));
    }

    #[test]
    fn test_shared_buffer_collects_writes() {
        let buffer = SharedBuffer::default();
        let mut writer = buffer.clone();
        write!(writer, "abc").unwrap();
        assert_eq!(buffer.contents(), "abc");
    }
}
