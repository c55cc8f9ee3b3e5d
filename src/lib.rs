//! testwalk - resumable suite/test tree execution
//!
//! Walks a tree of declared suites and tests through the WAIT, BEFORE, RUN,
//! CHILDREN, AFTER and END phases without recursion. Hooks nest correctly,
//! bodies may finish immediately or through a completion handle, time limits
//! are enforced with a single timer, and every failure is captured on its
//! node so the run always finishes with a result payload.
//!
//! ## Usage
//!
//! ```no_run
//! use testwalk::{Engine, Options, Registry};
//!
//! # async fn demo() -> Result<(), testwalk::EngineError> {
//! let registry = Registry::new().file("array.rs", |d| {
//!     d.describe("Array", |d| {
//!         d.test(".push", || assert_eq!(vec![1].len(), 1));
//!         d.todo(".splice");
//!     });
//! });
//! let options = Options {
//!     files: vec!["array.rs".to_string()],
//!     ..Options::default()
//! };
//! let mut results: Vec<testwalk::RunPayload> = Vec::new();
//! Engine::new(options, registry)?.run(&mut results).await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod hooks;
pub mod loader;
pub mod models;
pub mod output;
pub mod utils;

pub use config::{Options, RunConfig};
pub use error::{EngineError, Result};
pub use executor::{Asserter, Declare, Declared, Done, Engine, IntoCallback, Uncaught};
pub use hooks::HookKind;
pub use loader::{LoadError, Loader, ManifestLoader, Registry};
pub use models::{Failure, FailureKind, NodeId, NodeStatus, ReportNode, RunPayload};
pub use output::{Collector, Published, Reporter};
