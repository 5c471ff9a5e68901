//! Pipeline execution engine

pub mod engine;
pub mod process_group;
pub mod retry;
pub mod runner;
pub mod steps;
pub mod toolchain;

pub use engine::{EventHandler, ExecutionEvent, Orchestrator, RunReport};
pub use retry::{RetryError, RetryExecutor, RetryPolicy};
pub use runner::{CancellationPolicy, CommandRunner, Invocation, ProcessRunner};
pub use steps::{BuildSteps, StepBody};
pub use toolchain::{ScriptLocator, ShellDialect, Toolchain, ToolchainLocator, VsWhereLocator};
