//! Progress and diagnostic reporting
//!
//! The orchestrator, the retry executor and the step bodies notify a
//! [`ReportingSink`] of group boundaries, notices, warnings and errors.
//! Sinks never influence control flow.

pub mod actions;

pub use actions::ActionsSink;

use tracing::{error, info, warn};

/// Receiver of progress notifications
pub trait ReportingSink: Send + Sync {
    /// A named progress group begins
    fn start_group(&self, name: &str);

    /// The progress group `name` ends
    fn end_group(&self, name: &str);

    /// Informational note worth surfacing
    fn notice(&self, message: &str);

    fn warning(&self, message: &str);

    fn error(&self, message: &str);
}

/// Plain log sink for interactive runs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportingSink for LogSink {
    fn start_group(&self, name: &str) {
        info!("{}", name);
    }

    fn end_group(&self, _name: &str) {}

    fn notice(&self, message: &str) {
        info!("{}", message);
    }

    fn warning(&self, message: &str) {
        warn!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }
}
