//! Failure tracking
//!
//! First failure wins on every node. With bail enabled, the first recorded
//! failure anywhere truncates the walk once the failing node has finished.

use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::invoker::Signal;
use crate::models::{AssertionRecord, Failure, NodeId, Tree};

pub(crate) struct Tracker {
    bail_enabled: bool,
    bailed: bool,
}

impl Tracker {
    pub fn new(bail_enabled: bool) -> Self {
        Self {
            bail_enabled,
            bailed: false,
        }
    }

    /// Returns `true` when `failure` became the node's error.
    pub fn fail(&mut self, tree: &mut Tree, node: NodeId, failure: Failure) -> bool {
        let target = &mut tree[node];
        if target.error.is_some() {
            debug!("Dropping later failure on '{}': {}", target.title, failure);
            return false;
        }
        debug!("Failing '{}': {}", target.title, failure);
        target.error = Some(failure);
        self.bailed |= self.bail_enabled;
        true
    }

    /// Append an assertion result; a failed one also fails the node.
    pub fn record(&mut self, tree: &mut Tree, node: NodeId, record: AssertionRecord) -> bool {
        let failure = (!record.passed).then(|| Failure::assertion(record.message.clone()));
        tree[node].results.push(record);
        match failure {
            Some(failure) => self.fail(tree, node, failure),
            None => false,
        }
    }

    pub fn bailed(&self) -> bool {
        self.bailed
    }
}

/// Sender side shared by the handles given out to test code
#[derive(Clone)]
pub(crate) struct Signals {
    pub tx: UnboundedSender<Signal>,
    pub continue_asserts: bool,
}

impl Signals {
    pub fn asserter(&self) -> Asserter {
        Asserter {
            tx: self.tx.clone(),
            continue_asserts: self.continue_asserts,
        }
    }

    pub fn uncaught(&self) -> Uncaught {
        Uncaught {
            tx: self.tx.clone(),
        }
    }
}

/// Raises errors that escaped every direct invocation, e.g. from spawned tasks
///
/// The error is attributed to whichever node is active when it arrives, and
/// a pending completion wait is released.
#[derive(Clone)]
pub struct Uncaught {
    tx: UnboundedSender<Signal>,
}

impl Uncaught {
    pub fn raise(&self, error: impl fmt::Display) {
        let _ = self.tx.send(Signal::Uncaught(Failure::uncaught(error.to_string())));
    }
}

impl fmt::Debug for Uncaught {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uncaught").finish_non_exhaustive()
    }
}

/// Assertion channel for test code
///
/// In continue-asserts mode every check is recorded on the active node and
/// never short-circuits. Otherwise a failed check returns `Err` so the body
/// can stop with `?`.
#[derive(Clone)]
pub struct Asserter {
    tx: UnboundedSender<Signal>,
    continue_asserts: bool,
}

impl Asserter {
    pub fn check(&self, condition: bool, message: impl Into<String>) -> Result<(), Failure> {
        let message = message.into();
        if self.continue_asserts {
            let _ = self.tx.send(Signal::Assertion(AssertionRecord {
                passed: condition,
                message,
            }));
            return Ok(());
        }
        if condition {
            Ok(())
        } else {
            Err(Failure::assertion(message))
        }
    }

    pub fn equal<T: PartialEq + fmt::Debug>(&self, actual: T, expected: T) -> Result<(), Failure> {
        let message = format!("expected {actual:?} to equal {expected:?}");
        self.check(actual == expected, message)
    }

    pub fn pass(&self, message: impl Into<String>) -> Result<(), Failure> {
        self.check(true, message)
    }

    pub fn fail(&self, message: impl Into<String>) -> Result<(), Failure> {
        self.check(false, message)
    }

    pub fn continues(&self) -> bool {
        self.continue_asserts
    }
}

impl fmt::Debug for Asserter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asserter")
            .field("continue_asserts", &self.continue_asserts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureKind, NodeKind, Test};
    use tokio::sync::mpsc;

    fn tree_with_test() -> (Tree, NodeId) {
        let mut tree = Tree::new(Box::new(|_| Ok(())), 1000);
        let root = tree.root();
        let id = tree.add_child(root, "t", NodeKind::Test(Test { body: None }), false, false);
        (tree, id)
    }

    #[test]
    fn test_first_failure_wins() {
        let (mut tree, id) = tree_with_test();
        let mut tracker = Tracker::new(false);
        assert!(tracker.fail(&mut tree, id, Failure::assertion("first")));
        assert!(!tracker.fail(&mut tree, id, Failure::timeout(10)));
        assert_eq!(tree[id].error.as_ref().unwrap().message, "first");
        assert!(!tracker.bailed());
    }

    #[test]
    fn test_bail_set_on_first_failure() {
        let (mut tree, id) = tree_with_test();
        let mut tracker = Tracker::new(true);
        assert!(!tracker.bailed());
        tracker.fail(&mut tree, id, Failure::uncaught("escaped"));
        assert!(tracker.bailed());
    }

    #[test]
    fn test_record_accumulates_results() {
        let (mut tree, id) = tree_with_test();
        let mut tracker = Tracker::new(false);
        let pass = AssertionRecord { passed: true, message: "a".into() };
        let miss = AssertionRecord { passed: false, message: "b".into() };
        let miss_again = AssertionRecord { passed: false, message: "c".into() };
        assert!(!tracker.record(&mut tree, id, pass));
        assert!(tracker.record(&mut tree, id, miss));
        assert!(!tracker.record(&mut tree, id, miss_again));

        assert_eq!(tree[id].results.len(), 3);
        let error = tree[id].error.as_ref().unwrap();
        assert_eq!(error.kind, FailureKind::Assertion);
        assert_eq!(error.message, "b");
    }

    #[test]
    fn test_asserter_modes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let strict = Signals { tx: tx.clone(), continue_asserts: false }.asserter();
        assert!(strict.check(true, "ok").is_ok());
        assert!(strict.equal(1, 2).is_err());
        assert!(rx.try_recv().is_err());

        let lenient = Signals { tx, continue_asserts: true }.asserter();
        assert!(lenient.fail("keeps going").is_ok());
        assert!(matches!(
            rx.try_recv(),
            Ok(Signal::Assertion(AssertionRecord { passed: false, .. }))
        ));
    }
}
