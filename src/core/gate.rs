//! Step gate - decides whether a step runs

use crate::core::{
    config::{PipelineConfig, StepSelection},
    state::SkipReason,
    Step,
};
use std::path::PathBuf;
use tracing::debug;

/// Outcome of evaluating a step's gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Run the step body
    Run,
    /// Another step was selected for this invocation
    NotSelected,
    /// The completion marker exists and `force` is not set
    AlreadyComplete { marker: PathBuf },
}

impl GateDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, GateDecision::Run)
    }

    /// Skip reason recorded in the step state, if the step is skipped
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            GateDecision::Run => None,
            GateDecision::NotSelected => Some(SkipReason::NotSelected),
            GateDecision::AlreadyComplete { marker } => Some(SkipReason::AlreadyComplete {
                marker: marker.clone(),
            }),
        }
    }
}

/// Resumability gate
///
/// Local runs execute every step unconditionally. CI runs execute only the
/// selected step, and skip it when its completion marker exists unless
/// `force` is set. Markers are plain filesystem facts, so two orchestrators
/// sharing one source tree would race; one runner per tree is assumed.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepGate;

impl StepGate {
    /// Steps the orchestrator considers, in order
    pub fn plan(config: &PipelineConfig) -> Vec<Step> {
        match config.selection {
            StepSelection::All => Step::ALL.to_vec(),
            StepSelection::Only(step) => vec![step],
        }
    }

    /// Decide whether `step` runs under `config`
    pub fn should_run(step: Step, config: &PipelineConfig) -> GateDecision {
        if !config.ci {
            return GateDecision::Run;
        }

        if let StepSelection::Only(selected) = config.selection {
            if selected != step {
                return GateDecision::NotSelected;
            }
        }

        if config.force {
            debug!("Force set, ignoring completion marker of {}", step);
            return GateDecision::Run;
        }

        match step.completion_marker(&config.layout) {
            Some(marker) if marker.exists() => {
                debug!("Completion marker {} exists", marker.display());
                GateDecision::AlreadyComplete { marker }
            }
            _ => GateDecision::Run,
        }
    }
}
