//! Test execution engine
//!
//! Declaration, invocation, failure tracking and the phase scheduler.

mod declare;
mod invoker;
mod scheduler;
mod tracker;


pub use declare::{Declaration, Declare, Declared};
pub use invoker::{Callback, Completion, Done, Immediate, IntoCallback};
pub(crate) use invoker::catch_quietly;
pub use scheduler::Engine;
pub use tracker::{Asserter, Uncaught};
