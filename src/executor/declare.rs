//! Declaration API
//!
//! Suites declare their contents through a [`Declare`] handle when the
//! scheduler reaches their WAIT phase. The handle is the explicit form of the
//! `describe`/`it`/`before`... surface test files use: it knows which suite is
//! being declared, which file owns it, and which filter applies.

use tracing::debug;

use super::invoker::IntoCallback;
use super::tracker::{Asserter, Signals, Uncaught};
use crate::error::EngineError;
use crate::filter::Filter;
use crate::hooks::{self, HookKind, SuiteHooks};
use crate::models::{compose_title, Failure, IntoOutcome, NodeId, NodeKind, Suite, Test, Tree};

/// A suite's declaration function, run once at its WAIT phase
pub type Declaration = Box<dyn FnOnce(&mut Declare<'_>) -> Result<(), Failure>>;

/// Handle for declaring children and hooks of one suite
pub struct Declare<'a> {
    tree: &'a mut Tree,
    suite: NodeId,
    filter: &'a Filter,
    signals: &'a Signals,
    file: Option<String>,
}

/// A freshly declared node; inert when the ignore pattern suppressed it
pub struct Declared<'d> {
    tree: &'d mut Tree,
    id: Option<NodeId>,
}

impl Declared<'_> {
    pub fn id(&self) -> Option<NodeId> {
        self.id
    }

    pub fn is_ignored(&self) -> bool {
        self.id.is_none()
    }

    /// Override the node's time limit in milliseconds.
    pub fn timeout(self, limit_ms: u64) -> Self {
        if let Some(id) = self.id {
            self.tree[id].time_limit = limit_ms;
        }
        self
    }
}

fn suite_kind(declaration: Declaration) -> NodeKind {
    NodeKind::Suite(Suite {
        children: Vec::new(),
        declaration: Some(declaration),
        hooks: SuiteHooks::default(),
    })
}

fn wrap<F, R>(f: F) -> Declaration
where
    F: FnOnce(&mut Declare<'_>) -> R + 'static,
    R: IntoOutcome,
{
    Box::new(move |declare: &mut Declare<'_>| f(declare).into_outcome())
}

impl<'a> Declare<'a> {
    pub(crate) fn new(
        tree: &'a mut Tree,
        suite: NodeId,
        filter: &'a Filter,
        signals: &'a Signals,
        file: Option<String>,
    ) -> Self {
        Self {
            tree,
            suite,
            filter,
            signals,
            file,
        }
    }

    /// The suite being declared
    pub fn suite(&self) -> NodeId {
        self.suite
    }

    pub fn title(&self) -> &str {
        &self.tree[self.suite].title
    }

    /// The file that owns this suite, if any
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub(crate) fn set_file(&mut self, file: Option<String>) {
        self.file = file;
    }

    /// Set this suite's time limit; children declared afterwards inherit it.
    pub fn timeout(&mut self, limit_ms: u64) {
        self.tree[self.suite].time_limit = limit_ms;
    }

    pub fn asserter(&self) -> Asserter {
        self.signals.asserter()
    }

    pub fn uncaught(&self) -> Uncaught {
        self.signals.uncaught()
    }

    pub fn describe<F, R>(&mut self, name: &str, f: F) -> Declared<'_>
    where
        F: FnOnce(&mut Declare<'_>) -> R + 'static,
        R: IntoOutcome,
    {
        self.declare_suite(name, wrap(f), false, false)
    }

    pub fn describe_only<F, R>(&mut self, name: &str, f: F) -> Declared<'_>
    where
        F: FnOnce(&mut Declare<'_>) -> R + 'static,
        R: IntoOutcome,
    {
        self.declare_suite(name, wrap(f), true, false)
    }

    pub fn describe_skip<F, R>(&mut self, name: &str, f: F) -> Declared<'_>
    where
        F: FnOnce(&mut Declare<'_>) -> R + 'static,
        R: IntoOutcome,
    {
        self.declare_suite(name, wrap(f), false, true)
    }

    pub fn test<M>(&mut self, name: &str, body: impl IntoCallback<M>) -> Declared<'_> {
        self.declare_test(name, Some(body.into_callback()), false, false)
    }

    pub fn test_only<M>(&mut self, name: &str, body: impl IntoCallback<M>) -> Declared<'_> {
        self.declare_test(name, Some(body.into_callback()), true, false)
    }

    pub fn test_skip<M>(&mut self, name: &str, body: impl IntoCallback<M>) -> Declared<'_> {
        self.declare_test(name, Some(body.into_callback()), false, true)
    }

    /// Declare a stub: a test with no body yet.
    pub fn todo(&mut self, name: &str) -> Declared<'_> {
        self.declare_test(name, None, false, false)
    }

    pub fn before<M>(&mut self, callback: impl IntoCallback<M>) -> Result<(), EngineError> {
        self.hook(HookKind::Before, callback)
    }

    pub fn setup<M>(&mut self, callback: impl IntoCallback<M>) -> Result<(), EngineError> {
        self.before(callback)
    }

    pub fn after<M>(&mut self, callback: impl IntoCallback<M>) -> Result<(), EngineError> {
        self.hook(HookKind::After, callback)
    }

    pub fn teardown<M>(&mut self, callback: impl IntoCallback<M>) -> Result<(), EngineError> {
        self.after(callback)
    }

    pub fn before_each<M>(&mut self, callback: impl IntoCallback<M>) -> Result<(), EngineError> {
        self.hook(HookKind::BeforeEach, callback)
    }

    pub fn after_each<M>(&mut self, callback: impl IntoCallback<M>) -> Result<(), EngineError> {
        self.hook(HookKind::AfterEach, callback)
    }

    pub fn hook<M>(
        &mut self,
        kind: HookKind,
        callback: impl IntoCallback<M>,
    ) -> Result<(), EngineError> {
        hooks::register(self.tree, self.suite, kind, callback.into_callback())
    }

    /// Register a hook on another suite, e.g. an ancestor captured earlier.
    /// Fails if that suite has already started running.
    pub fn hook_on<M>(
        &mut self,
        target: NodeId,
        kind: HookKind,
        callback: impl IntoCallback<M>,
    ) -> Result<(), EngineError> {
        hooks::register(self.tree, target, kind, callback.into_callback())
    }

    pub(crate) fn declare_suite(
        &mut self,
        name: &str,
        declaration: Declaration,
        only: bool,
        skip: bool,
    ) -> Declared<'_> {
        let id = self.add(name, suite_kind(declaration), only, skip);
        Declared {
            tree: self.tree,
            id,
        }
    }

    fn declare_test(
        &mut self,
        name: &str,
        body: Option<super::Callback>,
        only: bool,
        skip: bool,
    ) -> Declared<'_> {
        let id = self.add(name, NodeKind::Test(Test { body }), only, skip);
        Declared {
            tree: self.tree,
            id,
        }
    }

    /// Stand in a failing `File: <path>` suite for a file that did not load.
    pub(crate) fn fail_file(&mut self, path: &str, failure: Failure) {
        if !self.filter.matches_path(path) {
            return;
        }
        let declaration: Declaration = Box::new(move |_: &mut Declare<'_>| Err(failure));
        let Some(id) = self.add(&format!("File: {path}"), suite_kind(declaration), false, false)
        else {
            return;
        };
        if self.filter.is_grepping() {
            self.tree[id].is_match = true;
            self.tree.bubble(Some(self.suite), |n| n.has_matches = true);
        }
    }

    fn add(&mut self, name: &str, kind: NodeKind, only: bool, skip: bool) -> Option<NodeId> {
        let title = compose_title(&self.tree[self.suite].title, name);
        if !self.filter.admits(&title) {
            debug!("Ignoring '{}'", title);
            return None;
        }

        let id = self.tree.add_child(self.suite, name, kind, only, skip);
        if self.suite == self.tree.root() {
            self.tree[id].file = self.file.clone();
        }
        if self.filter.is_grepping() && self.filter.matches(&title, self.file.as_deref()) {
            self.tree[id].is_match = true;
            self.tree.bubble(Some(self.suite), |n| n.has_matches = true);
        }
        Some(id)
    }
}
