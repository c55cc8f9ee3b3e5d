//! Hook and body invocation
//!
//! A callback is either immediate (`|| ...`) or completion-based
//! (`|done: Done| ...`). The choice is made by the closure's declared arity when
//! it is converted with [`IntoCallback`]. Immediate callbacks run to completion
//! inside a panic guard. Completion-based callbacks receive a [`Done`] handle and
//! the scheduler suspends until the handle fires or the [`Timer`] expires.

use std::cell::Cell;
use std::fmt;
use std::future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Sleep;
use tracing::debug;

use crate::models::{AssertionRecord, Failure, IntoOutcome, NodeId};

type ImmediateFn = Box<dyn FnMut() -> Result<(), Failure>>;
type CompletionFn = Box<dyn FnMut(Done) -> Result<(), Failure>>;

/// A hook or test body
pub enum Callback {
    Immediate(ImmediateFn),
    Completion(CompletionFn),
}

impl Callback {
    pub fn is_completion(&self) -> bool {
        matches!(self, Callback::Completion(_))
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Immediate(_) => f.write_str("Callback::Immediate"),
            Callback::Completion(_) => f.write_str("Callback::Completion"),
        }
    }
}

/// Marker for closures taking no arguments
pub struct Immediate;

/// Marker for closures taking a [`Done`] handle
pub struct Completion;

/// Conversion into a [`Callback`], dispatched on closure arity
pub trait IntoCallback<Marker> {
    fn into_callback(self) -> Callback;
}

impl<F, R> IntoCallback<(Immediate, R)> for F
where
    F: FnMut() -> R + 'static,
    R: IntoOutcome,
{
    fn into_callback(mut self) -> Callback {
        Callback::Immediate(Box::new(move || self().into_outcome()))
    }
}

impl<F, R> IntoCallback<(Completion, R)> for F
where
    F: FnMut(Done) -> R + 'static,
    R: IntoOutcome,
{
    fn into_callback(mut self) -> Callback {
        Callback::Completion(Box::new(move |done| self(done).into_outcome()))
    }
}

impl IntoCallback<()> for Callback {
    fn into_callback(self) -> Callback {
        self
    }
}

/// Messages sent back to the scheduler from handles
#[derive(Debug)]
pub(crate) enum Signal {
    Complete {
        token: u64,
        node: NodeId,
        error: Option<Failure>,
    },
    DoubleCompletion {
        token: u64,
        node: NodeId,
    },
    Uncaught(Failure),
    Assertion(AssertionRecord),
}

/// Completion handle passed to completion-based callbacks
///
/// Only the first call to [`Done::done`] or [`Done::fail`] resumes the
/// scheduler; any later call is reported as a double completion.
#[derive(Clone)]
pub struct Done {
    token: u64,
    node: NodeId,
    fired: Arc<AtomicBool>,
    tx: UnboundedSender<Signal>,
}

impl Done {
    pub fn done(&self) {
        self.finish(None);
    }

    /// Record `error` against the owning node, then complete.
    pub fn fail(&self, error: impl fmt::Display) {
        self.finish(Some(Failure::assertion(error.to_string())));
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    fn finish(&self, error: Option<Failure>) {
        let signal = if self.fired.swap(true, Ordering::SeqCst) {
            Signal::DoubleCompletion {
                token: self.token,
                node: self.node,
            }
        } else {
            Signal::Complete {
                token: self.token,
                node: self.node,
                error,
            }
        };
        // The receiver is gone once the run has finished.
        let _ = self.tx.send(signal);
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("token", &self.token)
            .field("node", &self.node)
            .field("fired", &self.fired.load(Ordering::SeqCst))
            .finish()
    }
}

/// A completion-based invocation the scheduler is suspended on
#[derive(Debug)]
pub(crate) struct Wait {
    pub token: u64,
    pub node: NodeId,
    pub limit_ms: u64,
    fired: Arc<AtomicBool>,
}

impl Wait {
    /// Stop honouring the handle; later calls count as double completions.
    pub fn disarm(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }
}

pub(crate) enum Invocation {
    Returned(Result<(), Failure>),
    Suspended(Wait),
}

thread_local! {
    static CATCHING: Cell<bool> = const { Cell::new(false) };
}

static QUIET_HOOK: Once = Once::new();

/// Panics raised inside [`catch_quietly`] are logged at debug level instead
/// of printed; any other panic goes to the previously installed hook.
fn install_quiet_hook() {
    QUIET_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CATCHING.with(Cell::get) {
                debug!("Captured panic: {}", info);
            } else {
                previous(info);
            }
        }));
    });
}

/// `catch_unwind` without the panic banner on stderr.
pub(crate) fn catch_quietly<T>(f: impl FnOnce() -> T) -> std::thread::Result<T> {
    install_quiet_hook();
    let outer = CATCHING.with(|catching| catching.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CATCHING.with(|catching| catching.set(outer));
    result
}

/// Run `f`, turning an escaping panic into a failure.
pub(crate) fn guard(f: impl FnOnce() -> Result<(), Failure>) -> Result<(), Failure> {
    match catch_quietly(f) {
        Ok(outcome) => outcome,
        Err(payload) => Err(Failure::from_panic(payload)),
    }
}

pub(crate) struct Invoker {
    tx: UnboundedSender<Signal>,
    next_token: u64,
}

impl Invoker {
    pub fn new(tx: UnboundedSender<Signal>) -> Self {
        Self { tx, next_token: 0 }
    }

    pub fn invoke(&mut self, callback: &mut Callback, node: NodeId, limit_ms: u64) -> Invocation {
        match callback {
            Callback::Immediate(f) => Invocation::Returned(guard(f)),
            Callback::Completion(f) => {
                self.next_token += 1;
                let done = Done {
                    token: self.next_token,
                    node,
                    fired: Arc::new(AtomicBool::new(false)),
                    tx: self.tx.clone(),
                };
                let wait = Wait {
                    token: done.token,
                    node,
                    limit_ms,
                    fired: done.fired.clone(),
                };
                match guard(move || f(done)) {
                    Ok(()) => Invocation::Suspended(wait),
                    Err(failure) => {
                        wait.disarm();
                        Invocation::Returned(Err(failure))
                    }
                }
            }
        }
    }
}

/// The one timeout timer owned by the scheduler
#[derive(Default)]
pub(crate) struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    /// Arm for `limit_ms`, replacing any previous deadline. Zero leaves it idle.
    pub fn arm(&mut self, limit_ms: u64) {
        self.sleep = (limit_ms > 0)
            .then(|| Box::pin(tokio::time::sleep(Duration::from_millis(limit_ms))));
    }

    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Resolves when the armed deadline passes; never resolves while idle.
    pub async fn expired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().await,
            None => future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn invoker() -> (Invoker, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Invoker::new(tx), rx)
    }

    #[test]
    fn test_arity_selects_mode() {
        assert!(!(|| {}).into_callback().is_completion());
        assert!((|_done: Done| {}).into_callback().is_completion());
        let fallible = || -> Result<(), String> { Ok(()) };
        assert!(!fallible.into_callback().is_completion());
    }

    #[test]
    fn test_immediate_panic_is_captured() {
        let (mut invoker, _rx) = invoker();
        let mut callback = (|| -> Result<(), String> { panic!("exploded") }).into_callback();
        match invoker.invoke(&mut callback, NodeId(3), 100) {
            Invocation::Returned(Err(failure)) => assert_eq!(failure.message, "exploded"),
            _ => panic!("expected a captured failure"),
        }
    }

    #[test]
    fn test_catch_quietly_scopes_the_quiet_hook() {
        let caught = catch_quietly(|| -> u8 { panic!("captured") });
        assert!(caught.is_err());
        assert!(!CATCHING.with(Cell::get));

        let nested = catch_quietly(|| {
            let inner = catch_quietly(|| -> u8 { panic!("inner") });
            (inner.is_err(), CATCHING.with(Cell::get))
        });
        assert_eq!(nested.unwrap(), (true, true));
        assert!(!CATCHING.with(Cell::get));
        assert_eq!(catch_quietly(|| 7).unwrap(), 7);
    }

    #[test]
    fn test_immediate_error_is_captured() {
        let (mut invoker, _rx) = invoker();
        let mut callback = (|| Err::<(), _>("bad value")).into_callback();
        match invoker.invoke(&mut callback, NodeId(1), 100) {
            Invocation::Returned(Err(failure)) => assert_eq!(failure.message, "bad value"),
            _ => panic!("expected a captured failure"),
        }
    }

    #[test]
    fn test_done_twice_reports_double_completion() {
        let (mut invoker, mut rx) = invoker();
        let mut callback = (|done: Done| {
            done.done();
            done.done();
        })
        .into_callback();
        let Invocation::Suspended(wait) = invoker.invoke(&mut callback, NodeId(2), 100) else {
            panic!("expected suspension");
        };
        assert!(matches!(
            rx.try_recv(),
            Ok(Signal::Complete { token, error: None, .. }) if token == wait.token
        ));
        assert!(matches!(rx.try_recv(), Ok(Signal::DoubleCompletion { .. })));
    }

    #[test]
    fn test_completion_throwing_early_stays_armed() {
        let (mut invoker, mut rx) = invoker();
        let stash: std::rc::Rc<std::cell::RefCell<Option<Done>>> = Default::default();
        let held = stash.clone();
        let mut callback = (move |done: Done| -> Result<(), String> {
            *held.borrow_mut() = Some(done);
            panic!("before done")
        })
        .into_callback();

        assert!(matches!(
            invoker.invoke(&mut callback, NodeId(4), 100),
            Invocation::Returned(Err(_))
        ));

        stash.borrow().as_ref().unwrap().done();
        assert!(matches!(rx.try_recv(), Ok(Signal::DoubleCompletion { .. })));
    }

    #[test]
    fn test_tokens_are_unique_per_invocation() {
        let (mut invoker, _rx) = invoker();
        let mut callback = (|_done: Done| {}).into_callback();
        let Invocation::Suspended(first) = invoker.invoke(&mut callback, NodeId(1), 0) else {
            panic!("expected suspension");
        };
        let Invocation::Suspended(second) = invoker.invoke(&mut callback, NodeId(1), 0) else {
            panic!("expected suspension");
        };
        assert_ne!(first.token, second.token);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_expires_and_cancels() {
        let mut timer = Timer::default();
        timer.arm(50);
        assert!(timer.is_armed());
        let start = tokio::time::Instant::now();
        timer.expired().await;
        assert!(start.elapsed() >= Duration::from_millis(50));

        timer.arm(0);
        assert!(!timer.is_armed());
        timer.arm(10);
        timer.cancel();
        assert!(!timer.is_armed());
    }
}
