//! Output module
//!
//! Reporter collaborators and the result hand-off.

pub mod emitter;
mod reporter;

pub use emitter::{
    ChannelCollector, Collector, LineCollector, NoCollector, Published, StdoutCollector,
};
pub use reporter::{reporter_by_name, DotReporter, Reporter, SharedBuffer, SilentReporter};
