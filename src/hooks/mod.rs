//! Hook registry
//!
//! Each suite stores its own `before`/`after`/`beforeEach`/`afterEach`
//! callbacks until it enters RUN. At that point the suite is sealed and its
//! `beforeEach`/`afterEach` callbacks move onto the [`ActiveHooks`] stacks,
//! where they stay until the suite's children are exhausted.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::EngineError;
use crate::executor::Callback;
use crate::models::{NodeId, Tree};

/// Which hook a callback is registered as
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookKind {
    Before,
    After,
    BeforeEach,
    AfterEach,
}

impl HookKind {
    pub fn name(&self) -> &'static str {
        match self {
            HookKind::Before => "before",
            HookKind::After => "after",
            HookKind::BeforeEach => "beforeEach",
            HookKind::AfterEach => "afterEach",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hooks registered on one suite
#[derive(Default)]
pub struct SuiteHooks {
    before: Vec<Callback>,
    after: Vec<Callback>,
    before_each: Vec<Callback>,
    after_each: Vec<Callback>,
    sealed: bool,
    pushed_before_each: usize,
    pushed_after_each: usize,
}

impl SuiteHooks {
    fn list(&self, kind: HookKind) -> &Vec<Callback> {
        match kind {
            HookKind::Before => &self.before,
            HookKind::After => &self.after,
            HookKind::BeforeEach => &self.before_each,
            HookKind::AfterEach => &self.after_each,
        }
    }

    fn list_mut(&mut self, kind: HookKind) -> &mut Vec<Callback> {
        match kind {
            HookKind::Before => &mut self.before,
            HookKind::After => &mut self.after,
            HookKind::BeforeEach => &mut self.before_each,
            HookKind::AfterEach => &mut self.after_each,
        }
    }

    /// Returns `false` once the suite is sealed.
    pub fn add(&mut self, kind: HookKind, callback: Callback) -> bool {
        if self.sealed {
            return false;
        }
        self.list_mut(kind).push(callback);
        true
    }

    pub fn count(&self, kind: HookKind) -> usize {
        self.list(kind).len()
    }

    pub fn get_mut(&mut self, kind: HookKind, index: usize) -> Option<&mut Callback> {
        self.list_mut(kind).get_mut(index)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

/// Register a hook on a suite that has not yet started running.
pub fn register(
    tree: &mut Tree,
    suite: NodeId,
    kind: HookKind,
    callback: Callback,
) -> Result<(), EngineError> {
    let node = &mut tree[suite];
    let title = node.title.clone();
    let Some(target) = node.suite_mut() else {
        return Err(EngineError::NotASuite(title));
    };
    if !target.hooks.add(kind, callback) {
        return Err(EngineError::HookAfterStart { suite: title, hook: kind });
    }
    debug!("Registered {} hook on '{}'", kind, title);
    Ok(())
}

/// The `beforeEach`/`afterEach` chains contributed by every running ancestor
#[derive(Default)]
pub struct ActiveHooks {
    before_each: Vec<Callback>,
    after_each: Vec<Callback>,
}

impl ActiveHooks {
    fn stack_mut(&mut self, kind: HookKind) -> Option<&mut Vec<Callback>> {
        match kind {
            HookKind::BeforeEach => Some(&mut self.before_each),
            HookKind::AfterEach => Some(&mut self.after_each),
            HookKind::Before | HookKind::After => None,
        }
    }

    /// Seal `hooks` and move its per-test callbacks onto the stacks.
    pub fn push(&mut self, hooks: &mut SuiteHooks) {
        hooks.sealed = true;
        hooks.pushed_before_each = hooks.before_each.len();
        hooks.pushed_after_each = hooks.after_each.len();
        self.before_each.append(&mut hooks.before_each);
        self.after_each.append(&mut hooks.after_each);
    }

    /// Remove exactly what [`ActiveHooks::push`] added for `hooks`.
    pub fn pop(&mut self, hooks: &SuiteHooks) {
        let keep = self.before_each.len() - hooks.pushed_before_each;
        self.before_each.truncate(keep);
        let keep = self.after_each.len() - hooks.pushed_after_each;
        self.after_each.truncate(keep);
    }

    pub fn len(&self, kind: HookKind) -> usize {
        match kind {
            HookKind::BeforeEach => self.before_each.len(),
            HookKind::AfterEach => self.after_each.len(),
            HookKind::Before | HookKind::After => 0,
        }
    }

    pub fn get_mut(&mut self, kind: HookKind, index: usize) -> Option<&mut Callback> {
        self.stack_mut(kind).and_then(|stack| stack.get_mut(index))
    }

    pub fn is_empty(&self) -> bool {
        self.before_each.is_empty() && self.after_each.is_empty()
    }
}
