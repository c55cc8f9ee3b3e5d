//! Result emitter
//!
//! Aggregates counts from the pruned tree and hands the payload to the
//! collecting process through a [`Collector`].

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::{self, Write};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::error::EngineError;
use crate::models::{NodeStatus, ReportNode, RunPayload};

/// The hand-off channel to the collecting process
pub trait Collector {
    fn send(&mut self, payload: &RunPayload) -> Result<(), EngineError>;
}

/// Writes the payload as one JSON line
pub struct LineCollector<W> {
    writer: W,
}

impl<W: Write> LineCollector<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> Collector for LineCollector<W> {
    fn send(&mut self, payload: &RunPayload) -> Result<(), EngineError> {
        let line =
            serde_json::to_string(payload).map_err(|e| EngineError::Handoff(e.to_string()))?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes the payload as one JSON line on stdout, as worker processes do
///
/// Progress marks must not share stdout with it; see
/// [`crate::config::Options::reserve_stdout`].
pub struct StdoutCollector;

impl Collector for StdoutCollector {
    fn send(&mut self, payload: &RunPayload) -> Result<(), EngineError> {
        LineCollector::new(io::stdout().lock()).send(payload)
    }
}

/// Sends the payload to an in-process receiver
pub struct ChannelCollector {
    tx: UnboundedSender<RunPayload>,
}

impl ChannelCollector {
    pub fn new(tx: UnboundedSender<RunPayload>) -> Self {
        Self { tx }
    }
}

impl Collector for ChannelCollector {
    fn send(&mut self, payload: &RunPayload) -> Result<(), EngineError> {
        self.tx
            .send(payload.clone())
            .map_err(|_| EngineError::Handoff("collector channel is closed".to_string()))
    }
}

/// No collecting process attached
pub struct NoCollector;

impl Collector for NoCollector {
    fn send(&mut self, _payload: &RunPayload) -> Result<(), EngineError> {
        Err(EngineError::Handoff(
            "no collecting process is attached".to_string(),
        ))
    }
}

impl Collector for Vec<RunPayload> {
    fn send(&mut self, payload: &RunPayload) -> Result<(), EngineError> {
        self.push(payload.clone());
        Ok(())
    }
}

/// Outcome of the final hand-off
#[derive(Debug)]
pub struct Published {
    pub payload: RunPayload,
    pub delivered: bool,
    /// The worker process should terminate now
    pub exit: bool,
}

/// Build the aggregate from the pruned tree.
pub fn summarize(
    id: usize,
    started_at: DateTime<Utc>,
    times: BTreeMap<String, u64>,
    tree: ReportNode,
) -> RunPayload {
    let (mut passed, mut failed, mut skipped, mut stubbed) = (0, 0, 0, 0);
    for node in tree.walk() {
        match node.status {
            NodeStatus::Failed => failed += 1,
            _ if node.suite => {}
            NodeStatus::Skipped => skipped += 1,
            NodeStatus::Stubbed => stubbed += 1,
            NodeStatus::Passed => passed += 1,
            NodeStatus::NotRun => {}
        }
    }

    RunPayload {
        id,
        started_at,
        times,
        output: String::new(),
        passed,
        failed,
        skipped,
        stubbed,
        has_only: tree.has_only,
        tree,
    }
}

/// Hand `payload` to `collector`, writing a diagnostic to `out` on failure.
pub fn hand_off(
    payload: RunPayload,
    collector: &mut dyn Collector,
    out: &mut dyn Write,
    multi_process: bool,
) -> Published {
    match collector.send(&payload) {
        Ok(()) => {
            info!("Handed off results of worker {}", payload.id);
            Published {
                payload,
                delivered: true,
                exit: multi_process,
            }
        }
        Err(e) => {
            error!("Failed to hand off results: {}", e);
            if let Err(write_err) = writeln!(out, "Failed to hand off results: {e}") {
                debug!("Could not write hand-off diagnostic: {}", write_err);
            }
            Published {
                payload,
                delivered: false,
                exit: false,
            }
        }
    }
}
