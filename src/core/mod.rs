//! Core domain models
//!
//! Steps, configuration, the execution context threaded through step bodies,
//! run state, the resumability gate and the error taxonomy.

pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod state;
pub mod step;

pub use config::{Arch, BuildLayout, ExtractorPath, Extractors, PipelineConfig, StepSelection};
pub use context::{ExecutionContext, WorkingDir};
pub use error::BuildError;
pub use gate::{GateDecision, StepGate};
pub use state::*;
pub use step::Step;
