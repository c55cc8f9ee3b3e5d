//! Per-file timing
//!
//! A file's clock starts when its first top-level node enters WAIT and its
//! elapsed time is updated each time one of its top-level nodes reaches END.

use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct FileTimes {
    started: HashMap<String, Instant>,
    elapsed: BTreeMap<String, u64>,
}

impl FileTimes {
    /// Start the file's clock unless it is already running.
    pub fn start(&mut self, file: &str, now: Instant) {
        self.started.entry(file.to_string()).or_insert(now);
    }

    /// Record elapsed milliseconds since the file's first start.
    pub fn finish(&mut self, file: &str, now: Instant) {
        if let Some(started) = self.started.get(file) {
            let ms = now.duration_since(*started).as_millis() as u64;
            self.elapsed.insert(file.to_string(), ms);
        }
    }

    pub fn times(&self) -> &BTreeMap<String, u64> {
        &self.elapsed
    }
}
