//! Reported tree and hand-off payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::failure::{AssertionRecord, Failure};
use super::node::{Node, Phase};

/// Final state of a node as reported
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Passed,
    Failed,
    Skipped,
    Stubbed,
    /// Never reached, e.g. after a bail
    NotRun,
}

impl NodeStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            NodeStatus::Passed => "✓",
            NodeStatus::Failed => "✗",
            NodeStatus::Skipped => "○",
            NodeStatus::Stubbed => "~",
            NodeStatus::NotRun => " ",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Passed => write!(f, "PASS"),
            NodeStatus::Failed => write!(f, "FAIL"),
            NodeStatus::Skipped => write!(f, "SKIP"),
            NodeStatus::Stubbed => write!(f, "STUB"),
            NodeStatus::NotRun => write!(f, "NOT RUN"),
        }
    }
}

/// A node of the reported (possibly pruned) tree
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportNode {
    pub name: String,
    pub title: String,
    pub suite: bool,
    pub status: NodeStatus,
    pub only: bool,
    pub skip: bool,
    pub has_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<AssertionRecord>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ReportNode>,
}

impl ReportNode {
    pub fn from_node(node: &Node, children: Vec<ReportNode>) -> Self {
        let suite = node.is_suite();
        let status = if node.error.is_some() {
            NodeStatus::Failed
        } else if !suite && node.skip {
            NodeStatus::Skipped
        } else if node.is_stub() {
            NodeStatus::Stubbed
        } else if node.phase == Phase::End {
            NodeStatus::Passed
        } else {
            NodeStatus::NotRun
        };

        Self {
            name: node.name.clone(),
            title: node.title.clone(),
            suite,
            status,
            only: node.only,
            skip: node.skip,
            has_only: node.has_only,
            file: node.file.clone(),
            error: node.error.clone(),
            results: node.results.clone(),
            elapsed_ms: node.elapsed_ms,
            children,
        }
    }

    /// Depth-first iterator over this node and its descendants.
    pub fn walk(&self) -> impl Iterator<Item = &ReportNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// Aggregate handed to the collecting process
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPayload {
    pub id: usize,
    pub started_at: DateTime<Utc>,
    /// Elapsed milliseconds per file
    pub times: BTreeMap<String, u64>,
    pub output: String,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub stubbed: usize,
    pub has_only: bool,
    pub tree: ReportNode,
}

impl RunPayload {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.stubbed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for RunPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Worker {} | Pass: {} | Fail: {} | Skip: {} | Stub: {}",
            self.id, self.passed, self.failed, self.skipped, self.stubbed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, status: NodeStatus) -> ReportNode {
        ReportNode {
            name: name.to_string(),
            title: name.to_string(),
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
    fn test_walk_is_depth_first_in_order() {
        let mut inner = leaf("inner", NodeStatus::Passed);
        inner.children = vec![leaf("c", NodeStatus::Passed)];
        let mut root = leaf("", NodeStatus::Passed);
        root.children = vec![leaf("a", NodeStatus::Passed), inner, leaf("d", NodeStatus::Failed)];

        let names: Vec<_> = root.walk().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["", "a", "inner", "c", "d"]);
    }

    #[test]
    fn test_payload_serializes_camel_case() {
        let payload = RunPayload {
            id: 2,
            started_at: Utc::now(),
            times: BTreeMap::from([("a.yaml".to_string(), 12)]),
            output: String::new(),
            passed: 1,
            failed: 0,
            skipped: 0,
            stubbed: 0,
            has_only: true,
            tree: leaf("", NodeStatus::Passed),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["hasOnly"], true);
        assert_eq!(json["times"]["a.yaml"], 12);
        assert_eq!(json["tree"]["elapsedMs"], 0);
        assert_eq!(payload.total(), 1);
    }
}
