//! Grep and ignore filtering
//!
//! `ignore` works at declaration time: a matching node is never created.
//! `grep` only marks nodes; everything still runs, and [`prune`] drops
//! non-matching branches from the reported tree afterwards.

use regex::Regex;

use crate::error::EngineError;
use crate::models::{NodeId, ReportNode, Tree};

#[derive(Clone, Debug, Default)]
pub struct Filter {
    grep: Option<Regex>,
    ignore: Option<Regex>,
}

impl Filter {
    pub fn new(grep: Option<Regex>, ignore: Option<Regex>) -> Self {
        Self { grep, ignore }
    }

    /// Compile optional pattern sources.
    pub fn compile(grep: Option<&str>, ignore: Option<&str>) -> Result<Self, EngineError> {
        let compile = |option: &'static str, source: Option<&str>| {
            source
                .map(Regex::new)
                .transpose()
                .map_err(|source| EngineError::InvalidPattern { option, source })
        };
        Ok(Self {
            grep: compile("grep", grep)?,
            ignore: compile("ignore", ignore)?,
        })
    }

    pub fn is_grepping(&self) -> bool {
        self.grep.is_some()
    }

    /// Whether a node with `title` may be created at all.
    pub fn admits(&self, title: &str) -> bool {
        self.ignore.as_ref().map_or(true, |re| !re.is_match(title))
    }

    /// Grep match against the composed title or the owning file.
    pub fn matches(&self, title: &str, file: Option<&str>) -> bool {
        match &self.grep {
            None => true,
            Some(re) => re.is_match(title) || file.is_some_and(|f| re.is_match(f)),
        }
    }

    /// Whether a failed file load at `path` should be reported.
    pub fn matches_path(&self, path: &str) -> bool {
        self.grep.as_ref().map_or(true, |re| re.is_match(path))
    }
}

/// Build the reported tree, dropping children that neither match nor lead
/// to a match. A matching node keeps its whole subtree.
pub fn prune(tree: &Tree, grepping: bool) -> ReportNode {
    fn visit(tree: &Tree, id: NodeId, pruning: bool) -> ReportNode {
        let node = &tree[id];
        let children = node
            .children()
            .iter()
            .filter_map(|&child_id| {
                let child = &tree[child_id];
                if !pruning || child.is_match {
                    Some(visit(tree, child_id, false))
                } else if child.has_matches {
                    Some(visit(tree, child_id, true))
                } else {
                    None
                }
            })
            .collect();
        ReportNode::from_node(node, children)
    }

    visit(tree, tree.root(), grepping)
}
