//! stagebuild - staged, resumable build orchestrator for a browser source tree

pub mod cli;
pub mod core;
pub mod execution;
pub mod reporting;
pub mod tools;

// Re-export commonly used types
pub use core::{BuildError, BuildLayout, ExecutionContext, PipelineConfig, Step, StepGate};
pub use execution::{BuildSteps, Orchestrator, ProcessRunner, RetryExecutor, RunReport, StepBody};
pub use reporting::{ActionsSink, LogSink, ReportingSink};
pub use tools::{ProfileFetcher, SourceTools};
