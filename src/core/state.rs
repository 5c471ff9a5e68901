//! Execution state models

use crate::core::Step;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Pipeline completed successfully
    Completed,
    /// Pipeline failed
    Failed,
    /// A step was cancelled by its deadline
    Cancelled,
}

/// Why a step did not run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// A different step was selected for this CI invocation
    NotSelected,
    /// The step's completion marker already exists
    AlreadyComplete { marker: PathBuf },
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not been reached
    Pending,
    /// Step body is running
    Running { started_at: DateTime<Utc> },
    /// Step body finished successfully
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step was skipped by its gate
    Skipped { reason: SkipReason },
    /// Step body failed; the run stopped here
    Failed {
        error: String,
        exit_code: i32,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }
}

/// Record of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Per-step state, in step order
    pub steps: Vec<(Step, StepState)>,
}

impl PipelineState {
    /// Create a new pipeline state with every step pending
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            steps: Step::ALL.iter().map(|s| (*s, StepState::Pending)).collect(),
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self) {
        self.finish(ExecutionStatus::Completed);
    }

    /// Mark pipeline as failed
    pub fn fail(&mut self) {
        self.finish(ExecutionStatus::Failed);
    }

    /// Mark pipeline as cancelled
    pub fn cancel(&mut self) {
        self.finish(ExecutionStatus::Cancelled);
    }

    fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// State of a step
    pub fn step(&self, step: Step) -> &StepState {
        &self.steps[step.index()].1
    }

    /// Replace the state of a step
    pub fn set_step(&mut self, step: Step, state: StepState) {
        self.steps[step.index()].1 = state;
    }

    /// Steps whose body ran to completion, in order
    pub fn completed_steps(&self) -> Vec<Step> {
        self.steps
            .iter()
            .filter(|(_, state)| matches!(state, StepState::Completed { .. }))
            .map(|(step, _)| *step)
            .collect()
    }

    /// Fraction of steps in a terminal state (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        let terminal = self.steps.iter().filter(|(_, s)| s.is_terminal()).count();
        terminal as f64 / self.steps.len() as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
