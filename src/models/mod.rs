//! Data models for the execution engine
//!
//! This module contains the node tree, failure values and the reported
//! payload structures used throughout the engine.

mod failure;
mod node;
mod payload;

pub use failure::{AssertionRecord, Failure, FailureKind, IntoOutcome};
pub use node::{compose_title, Node, NodeId, NodeKind, Phase, Suite, Test, Tree};
pub use payload::{NodeStatus, ReportNode, RunPayload};
