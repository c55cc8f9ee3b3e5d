//! Phase-based tree walker
//!
//! [`Engine`] holds a cursor into the tree and drives the current node through
//! WAIT, BEFORE, RUN, CHILDREN, AFTER and END without recursing. Whenever a
//! phase needs a hook or body run, the function is dispatched through the
//! invoker; a completion-based function suspends the walk until its handle
//! fires or the timer expires, after which the loop resumes at the same
//! cursor.

use chrono::{DateTime, Utc};
use std::io::Write;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::declare::{Declaration, Declare};
use super::invoker::{guard, Invocation, Invoker, IntoCallback, Signal, Timer, Wait};
use super::tracker::{Signals, Tracker};
use crate::config::Options;
use crate::error::EngineError;
use crate::filter::{self, Filter};
use crate::hooks::{self, ActiveHooks, HookKind};
use crate::loader::{self, Loader};
use crate::models::{Failure, NodeId, NodeKind, Phase, Test, Tree};
use crate::output::{emitter, reporter_by_name, Collector, Published, Reporter};
use crate::utils::timer::FileTimes;

/// What the current phase asks the loop to do next
enum Transition {
    /// Phase bookkeeping already done; loop again
    Continue,
    /// Move to the next phase and reset the cursor
    Advance,
    Dispatch(Pending),
}

/// The function a phase wants invoked
enum Pending {
    Declaration(Declaration),
    /// `before`/`after` of the current suite, by index
    Hook(HookKind, usize),
    /// Active `beforeEach`/`afterEach` chain entry, by index
    Each(HookKind, usize),
    Body,
}

enum Event {
    Signal(Option<Signal>),
    Expired,
}

#[derive(Clone, Copy)]
enum Progress {
    Pass,
    Fail,
    Skip,
    Stub,
}

/// One engine instance walks one worker's files
pub struct Engine {
    tree: Tree,
    active: ActiveHooks,
    invoker: Invoker,
    tracker: Tracker,
    timer: Timer,
    files: FileTimes,
    filter: Filter,
    signals: Signals,
    rx: UnboundedReceiver<Signal>,
    current: Option<NodeId>,
    reporter: Box<dyn Reporter>,
    out: Box<dyn Write>,
    show_progress: bool,
    started_at: DateTime<Utc>,
    options: Options,
}

impl Engine {
    /// Build an engine whose root suite loads `options.files` through `loader`.
    pub fn new(options: Options, loader: impl Loader + 'static) -> Result<Self, EngineError> {
        let reporter = reporter_by_name(&options.reporter)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let signals = Signals {
            tx: tx.clone(),
            continue_asserts: options.continue_asserts,
        };
        let declaration = loader::root_declaration(
            Box::new(loader),
            options.files.clone(),
            options.dir.clone(),
            options.parser.is_some(),
        );
        let tree = Tree::new(declaration, options.timeout);
        let root = tree.root();

        Ok(Self {
            tree,
            active: ActiveHooks::default(),
            invoker: Invoker::new(tx),
            tracker: Tracker::new(options.bail),
            timer: Timer::default(),
            files: FileTimes::default(),
            filter: options.filter.clone(),
            signals,
            rx,
            current: Some(root),
            reporter,
            out: options.stream.writer(),
            show_progress: !options.hide_progress,
            started_at: Utc::now(),
            options,
        })
    }

    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Redirect progress marks and hand-off diagnostics.
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Register a hook programmatically, e.g. a run-wide `beforeEach` on the root.
    pub fn hook<M>(
        &mut self,
        node: NodeId,
        kind: HookKind,
        callback: impl IntoCallback<M>,
    ) -> Result<(), EngineError> {
        hooks::register(&mut self.tree, node, kind, callback.into_callback())
    }

    /// Walk the whole tree, then prune, summarise and hand off the result.
    pub async fn run(mut self, collector: &mut dyn Collector) -> Published {
        info!(
            "Worker {} running {} file(s)",
            self.options.id,
            self.options.files.len()
        );
        if self.show_progress {
            if let Err(e) = self.reporter.init(&self.options, &mut *self.out) {
                debug!("Reporter init failed: {}", e);
            }
        }

        while let Some(wait) = self.advance() {
            self.suspend(wait).await;
        }
        self.finish(collector)
    }

    /// Run phases until the walk ends or a completion-based call suspends it.
    fn advance(&mut self) -> Option<Wait> {
        while let Some(id) = self.current {
            let transition = match self.tree[id].phase {
                Phase::Wait => self.enter(id),
                Phase::Before => self.hook_phase(id, HookKind::Before, HookKind::BeforeEach),
                Phase::Run => self.run_node(id),
                Phase::Children => self.visit_children(id),
                Phase::After => self.hook_phase(id, HookKind::After, HookKind::AfterEach),
                Phase::End => self.end(id),
            };

            match transition {
                Transition::Continue => {}
                Transition::Advance => {
                    let node = &mut self.tree[id];
                    node.phase = node.phase.next();
                    node.index = 0;
                    debug!("{}: '{}'", node.phase, node.title);
                }
                Transition::Dispatch(pending) => {
                    if let Some(wait) = self.dispatch(id, pending) {
                        return Some(wait);
                    }
                }
            }
        }
        None
    }

    fn enter(&mut self, id: NodeId) -> Transition {
        let now = Instant::now();
        let node = &mut self.tree[id];
        debug!("WAIT: '{}'", node.title);
        node.started = Some(now);
        node.phase = Phase::Before;
        node.index = 0;
        if let Some(file) = &node.file {
            self.files.start(file, now);
        }

        match node.suite_mut().and_then(|suite| suite.declaration.take()) {
            Some(declaration) => Transition::Dispatch(Pending::Declaration(declaration)),
            None => Transition::Continue,
        }
    }

    /// BEFORE and AFTER: suites run their own once-hooks, tests run the
    /// active per-test chain in push order.
    fn hook_phase(&mut self, id: NodeId, once: HookKind, each: HookKind) -> Transition {
        let node = &mut self.tree[id];
        let index = node.index;
        let (pending, available) = match node.suite() {
            Some(suite) => (Pending::Hook(once, index), suite.hooks.count(once)),
            None => (Pending::Each(each, index), self.active.len(each)),
        };

        if index < available {
            node.index += 1;
            Transition::Dispatch(pending)
        } else {
            Transition::Advance
        }
    }

    fn run_node(&mut self, id: NodeId) -> Transition {
        let node = &mut self.tree[id];
        debug!("RUN: '{}'", node.title);
        node.index = 0;
        match &mut node.kind {
            NodeKind::Suite(suite) => {
                self.active.push(&mut suite.hooks);
                node.phase = Phase::Children;
                Transition::Continue
            }
            NodeKind::Test(test) => {
                let has_body = test.body.is_some();
                node.phase = Phase::After;
                if has_body {
                    Transition::Dispatch(Pending::Body)
                } else {
                    Transition::Continue
                }
            }
        }
    }

    fn visit_children(&mut self, id: NodeId) -> Transition {
        let node = &mut self.tree[id];
        let index = node.index;
        node.index += 1;

        let Some(child) = node.children().get(index).copied() else {
            if let Some(suite) = self.tree[id].suite() {
                self.active.pop(&suite.hooks);
            }
            let node = &mut self.tree[id];
            node.phase = Phase::After;
            node.index = 0;
            debug!("AFTER: '{}'", node.title);
            return Transition::Continue;
        };

        let child_node = &self.tree[child];
        if child_node.skip && !child_node.is_suite() {
            debug!("SKIP: '{}'", child_node.title);
            self.progress(Progress::Skip);
        } else if child_node.is_stub() {
            debug!("STUB: '{}'", child_node.title);
            self.progress(Progress::Stub);
        } else {
            self.current = Some(child);
        }
        Transition::Continue
    }

    fn end(&mut self, id: NodeId) -> Transition {
        let now = Instant::now();
        let node = &mut self.tree[id];
        node.elapsed_ms = node
            .started
            .map_or(0, |started| now.duration_since(started).as_millis() as u64);
        if let Some(file) = &node.file {
            self.files.finish(file, now);
        }
        node.phase = Phase::End;
        debug!("END: '{}' in {}ms", node.title, node.elapsed_ms);

        let passed = !node.is_suite() && node.error.is_none();
        let parent = node.parent;
        if passed {
            self.progress(Progress::Pass);
        }

        self.current = if self.tracker.bailed() {
            info!("Bailing out after '{}'", self.tree[id].title);
            None
        } else {
            parent
        };
        Transition::Continue
    }

    /// Invoke the pending function; returns the wait if it suspended.
    fn dispatch(&mut self, id: NodeId, pending: Pending) -> Option<Wait> {
        let limit_ms = self.tree[id].time_limit;
        let invocation = match pending {
            Pending::Declaration(declaration) => {
                let file = self.owning_file(id);
                let mut declare = Declare::new(&mut self.tree, id, &self.filter, &self.signals, file);
                Invocation::Returned(guard(|| declaration(&mut declare)))
            }
            Pending::Hook(kind, index) => {
                match self.tree[id]
                    .suite_mut()
                    .and_then(|suite| suite.hooks.get_mut(kind, index))
                {
                    Some(callback) => self.invoker.invoke(callback, id, limit_ms),
                    None => Invocation::Returned(Ok(())),
                }
            }
            Pending::Each(kind, index) => match self.active.get_mut(kind, index) {
                Some(callback) => self.invoker.invoke(callback, id, limit_ms),
                None => Invocation::Returned(Ok(())),
            },
            Pending::Body => match &mut self.tree[id].kind {
                NodeKind::Test(Test {
                    body: Some(callback),
                }) => self.invoker.invoke(callback, id, limit_ms),
                _ => Invocation::Returned(Ok(())),
            },
        };

        match invocation {
            Invocation::Returned(Ok(())) => {}
            Invocation::Returned(Err(failure)) => self.fail(id, failure),
            Invocation::Suspended(wait) => return Some(wait),
        }
        self.drain_signals();
        None
    }

    /// Wait for the handle of `wait` to fire, the timer to expire, or an
    /// uncaught error to force progress.
    async fn suspend(&mut self, wait: Wait) {
        debug!(
            "Awaiting completion {} of '{}' (limit {}ms)",
            wait.token, self.tree[wait.node].title, wait.limit_ms
        );
        self.timer.arm(wait.limit_ms);

        loop {
            let event = tokio::select! {
                biased;
                signal = self.rx.recv() => Event::Signal(signal),
                () = self.timer.expired() => Event::Expired,
            };

            match event {
                Event::Signal(Some(signal)) => {
                    if self.handle_signal(signal, Some(&wait)) {
                        break;
                    }
                }
                Event::Signal(None) => break,
                Event::Expired => {
                    warn!(
                        "'{}' timed out after {}ms",
                        self.tree[wait.node].title, wait.limit_ms
                    );
                    wait.disarm();
                    self.fail(wait.node, Failure::timeout(wait.limit_ms));
                    break;
                }
            }
        }

        self.timer.cancel();
        self.drain_signals();
    }

    /// Apply one signal; returns `true` when it releases `waiting`.
    fn handle_signal(&mut self, signal: Signal, waiting: Option<&Wait>) -> bool {
        match signal {
            Signal::Complete { token, node, error } => {
                if let Some(failure) = error {
                    self.fail(node, failure);
                }
                match waiting {
                    Some(wait) if wait.token == token => true,
                    _ => {
                        warn!("Ignoring stale completion {} for '{}'", token, self.tree[node].title);
                        false
                    }
                }
            }
            Signal::DoubleCompletion { token, node } => {
                warn!(
                    "Completion {} of '{}' invoked more than once",
                    token, self.tree[node].title
                );
                self.fail(node, Failure::double_completion());
                false
            }
            Signal::Uncaught(failure) => {
                let target = self.active_node();
                warn!("Uncaught error in '{}': {}", self.tree[target].title, failure);
                self.fail(target, failure);
                match waiting {
                    Some(wait) => {
                        wait.disarm();
                        true
                    }
                    None => false,
                }
            }
            Signal::Assertion(record) => {
                let target = self.active_node();
                if self.tracker.record(&mut self.tree, target, record) {
                    self.progress(Progress::Fail);
                }
                false
            }
        }
    }

    fn drain_signals(&mut self) {
        while let Ok(signal) = self.rx.try_recv() {
            self.handle_signal(signal, None);
        }
    }

    fn fail(&mut self, node: NodeId, failure: Failure) {
        // A node past END already has its progress mark.
        let finished = self.tree[node].phase == Phase::End;
        if self.tracker.fail(&mut self.tree, node, failure) && !finished {
            self.progress(Progress::Fail);
        }
    }

    fn active_node(&self) -> NodeId {
        self.current.unwrap_or_else(|| self.tree.root())
    }

    /// The file of the nearest ancestor (or self) that records one.
    fn owning_file(&self, id: NodeId) -> Option<String> {
        let mut cursor = Some(id);
        while let Some(id) = cursor {
            let node = &self.tree[id];
            if node.file.is_some() {
                return node.file.clone();
            }
            cursor = node.parent;
        }
        None
    }

    fn progress(&mut self, mark: Progress) {
        if !self.show_progress {
            return;
        }
        let out = &mut *self.out;
        let result = match mark {
            Progress::Pass => self.reporter.pass(out),
            Progress::Fail => self.reporter.fail(out),
            Progress::Skip => self.reporter.skip(out),
            Progress::Stub => self.reporter.stub(out),
        };
        if let Err(e) = result {
            debug!("Progress write failed: {}", e);
        }
    }

    fn finish(mut self, collector: &mut dyn Collector) -> Published {
        self.timer.cancel();
        self.drain_signals();

        let tree = filter::prune(&self.tree, self.filter.is_grepping());
        let mut payload = emitter::summarize(
            self.options.id,
            self.started_at,
            self.files.times().clone(),
            tree,
        );
        if self.show_progress {
            if let Err(e) = self.reporter.end(&mut *self.out) {
                debug!("Reporter end failed: {}", e);
            }
        }
        self.reporter.finish_tree(&mut payload);
        info!("{}", payload);

        emitter::hand_off(payload, collector, &mut *self.out, self.options.multi_process)
    }
}
