//! Suite and test nodes
//!
//! Nodes live in an arena owned by [`Tree`]. Ownership flows parent to
//! children through `NodeId` lists; `parent` is a plain index used only for
//! walking back up and composing titles.

use std::fmt;
use std::ops::{Index, IndexMut};
use tokio::time::Instant;

use super::failure::{AssertionRecord, Failure};
use crate::executor::{Callback, Declaration};
use crate::hooks::SuiteHooks;

/// Index of a node within its [`Tree`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle phase of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Wait,
    Before,
    Run,
    Children,
    After,
    End,
}

impl Phase {
    /// The following phase; `End` is terminal.
    pub fn next(self) -> Self {
        match self {
            Phase::Wait => Phase::Before,
            Phase::Before => Phase::Run,
            Phase::Run => Phase::Children,
            Phase::Children => Phase::After,
            Phase::After | Phase::End => Phase::End,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Wait => "WAIT",
            Phase::Before => "BEFORE",
            Phase::Run => "RUN",
            Phase::Children => "CHILDREN",
            Phase::After => "AFTER",
            Phase::End => "END",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Suite-specific state
pub struct Suite {
    pub children: Vec<NodeId>,
    /// Taken and run once, at the suite's WAIT phase
    pub declaration: Option<Declaration>,
    pub hooks: SuiteHooks,
}

/// Test-specific state
pub struct Test {
    /// `None` marks a stub
    pub body: Option<Callback>,
}

pub enum NodeKind {
    Suite(Suite),
    Test(Test),
}

/// A suite or a test
pub struct Node {
    pub name: String,
    pub title: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub phase: Phase,
    /// Cursor shared by child iteration and hook iteration
    pub index: usize,
    /// Milliseconds; 0 disables the timer
    pub time_limit: u64,
    pub only: bool,
    pub skip: bool,
    pub has_only: bool,
    pub error: Option<Failure>,
    pub results: Vec<AssertionRecord>,
    pub started: Option<Instant>,
    pub elapsed_ms: u64,
    pub file: Option<String>,
    pub is_match: bool,
    pub has_matches: bool,
}

impl Node {
    fn new(name: impl Into<String>, kind: NodeKind, time_limit: u64) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
            parent: None,
            kind,
            phase: Phase::Wait,
            index: 0,
            time_limit,
            only: false,
            skip: false,
            has_only: false,
            error: None,
            results: Vec::new(),
            started: None,
            elapsed_ms: 0,
            file: None,
            is_match: false,
            has_matches: false,
        }
    }

    pub fn is_suite(&self) -> bool {
        matches!(self.kind, NodeKind::Suite(_))
    }

    pub fn suite(&self) -> Option<&Suite> {
        match &self.kind {
            NodeKind::Suite(suite) => Some(suite),
            NodeKind::Test(_) => None,
        }
    }

    pub fn suite_mut(&mut self) -> Option<&mut Suite> {
        match &mut self.kind {
            NodeKind::Suite(suite) => Some(suite),
            NodeKind::Test(_) => None,
        }
    }

    /// A test declared without a body
    pub fn is_stub(&self) -> bool {
        matches!(&self.kind, NodeKind::Test(test) if test.body.is_none())
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Suite(suite) => &suite.children,
            NodeKind::Test(_) => &[],
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("title", &self.title)
            .field("suite", &self.is_suite())
            .field("phase", &self.phase)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Compose a node title from its parent's title.
///
/// Names starting with `.` attach without a separator, so `"Array" + ".push"`
/// reads `"Array.push"`.
pub fn compose_title(parent_title: &str, name: &str) -> String {
    if parent_title.is_empty() {
        name.to_string()
    } else if name.starts_with('.') {
        format!("{parent_title}{name}")
    } else {
        format!("{parent_title} {name}")
    }
}

/// Arena of nodes rooted at an unnamed suite
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Create a tree holding only the run root.
    pub fn new(root_declaration: Declaration, time_limit: u64) -> Self {
        let root = Node::new(
            "",
            NodeKind::Suite(Suite {
                children: Vec::new(),
                declaration: Some(root_declaration),
                hooks: SuiteHooks::default(),
            }),
            time_limit,
        );
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Append a child to `parent`, inheriting time limit, `only` and `skip`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        kind: NodeKind,
        only: bool,
        skip: bool,
    ) -> NodeId {
        let name = name.into();
        let id = NodeId(self.nodes.len());
        let parent_node = &self[parent];

        let mut node = Node::new(name, kind, parent_node.time_limit);
        node.title = compose_title(&parent_node.title, &node.name);
        node.parent = Some(parent);
        node.only = (parent_node.only && !skip) || only;
        node.skip = parent_node.skip || skip;
        self.nodes.push(node);

        if let Some(suite) = self[parent].suite_mut() {
            suite.children.push(id);
        }
        if only {
            self.bubble(Some(parent), |n| n.has_only = true);
        }
        id
    }

    /// Apply `f` to `from` and every ancestor above it.
    pub fn bubble(&mut self, from: Option<NodeId>, mut f: impl FnMut(&mut Node)) {
        let mut cursor = from;
        while let Some(id) = cursor {
            let node = &mut self[id];
            f(node);
            cursor = node.parent;
        }
    }
}

impl Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for Tree {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite_kind() -> NodeKind {
        NodeKind::Suite(Suite {
            children: Vec::new(),
            declaration: None,
            hooks: SuiteHooks::default(),
        })
    }

    fn test_kind() -> NodeKind {
        NodeKind::Test(Test { body: None })
    }

    fn empty_tree() -> Tree {
        Tree::new(Box::new(|_| Ok(())), 2000)
    }

    #[test]
    fn test_compose_title() {
        assert_eq!(compose_title("", "Array"), "Array");
        assert_eq!(compose_title("Array", "push"), "Array push");
        assert_eq!(compose_title("Array", ".push"), "Array.push");
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::Wait < Phase::Before);
        assert!(Phase::After < Phase::End);
        assert_eq!(Phase::Children.next(), Phase::After);
        assert_eq!(Phase::End.next(), Phase::End);
    }

    #[test]
    fn test_children_preserve_declaration_order() {
        let mut tree = empty_tree();
        let root = tree.root();
        let a = tree.add_child(root, "a", test_kind(), false, false);
        let b = tree.add_child(root, "b", test_kind(), false, false);
        let c = tree.add_child(root, "c", test_kind(), false, false);
        assert_eq!(tree[root].children(), &[a, b, c]);
        assert_eq!(tree[b].parent, Some(root));
        assert_eq!(tree[b].time_limit, 2000);
    }

    #[test]
    fn test_skip_and_only_inherit() {
        let mut tree = empty_tree();
        let root = tree.root();
        let skipped = tree.add_child(root, "outer", suite_kind(), false, true);
        let inner = tree.add_child(skipped, "inner", test_kind(), false, false);
        assert!(tree[inner].skip);

        let focused = tree.add_child(root, "focus", suite_kind(), true, false);
        let child = tree.add_child(focused, "child", test_kind(), false, false);
        let opted_out = tree.add_child(focused, "opted out", test_kind(), false, true);
        assert!(tree[child].only);
        assert!(!tree[opted_out].only);
    }

    #[test]
    fn test_only_bubbles_has_only_to_root() {
        let mut tree = empty_tree();
        let root = tree.root();
        let outer = tree.add_child(root, "outer", suite_kind(), false, false);
        let inner = tree.add_child(outer, "inner", suite_kind(), false, false);
        let sibling = tree.add_child(root, "sibling", suite_kind(), false, false);
        tree.add_child(inner, "focused", test_kind(), true, false);

        assert!(tree[inner].has_only);
        assert!(tree[outer].has_only);
        assert!(tree[root].has_only);
        assert!(!tree[sibling].has_only);
    }

    #[test]
    fn test_stub_detection() {
        let mut tree = empty_tree();
        let root = tree.root();
        let stub = tree.add_child(root, "later", test_kind(), false, false);
        assert!(tree[stub].is_stub());
        assert!(!tree[root].is_stub());
    }
}
