//! Pipeline orchestrator - drives the steps of a run in order

use crate::core::{
    error::EXIT_SUCCESS, BuildError, ExecutionContext, ExecutionStatus, PipelineConfig,
    PipelineState, SkipReason, Step, StepGate, StepState,
};
use crate::execution::steps::StepBody;
use crate::reporting::ReportingSink;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        steps: Vec<Step>,
    },
    StepStarted {
        step: Step,
    },
    StepSkipped {
        step: Step,
        reason: SkipReason,
    },
    StepCompleted {
        step: Step,
    },
    StepFailed {
        step: Step,
        error: String,
        exit_code: i32,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
        exit_code: i32,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: PipelineState,

    /// Process exit code for the run
    pub exit_code: i32,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == EXIT_SUCCESS
    }
}

/// Runs the planned steps strictly one after another
///
/// Each step is gated, then run inside a progress group. The first failure
/// stops the run; later steps stay pending.
pub struct Orchestrator<B> {
    config: PipelineConfig,
    body: B,
    sink: Arc<dyn ReportingSink>,
    event_handlers: Vec<EventHandler>,
}

impl<B: StepBody> Orchestrator<B> {
    pub fn new(config: PipelineConfig, body: B, sink: Arc<dyn ReportingSink>) -> Self {
        Self {
            config,
            body,
            sink,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(&event);
        }
    }

    /// Run the pipeline in a fresh context rooted at the layout's root
    pub async fn run_pipeline(&self) -> RunReport {
        let layout = &self.config.layout;
        let mut ctx = ExecutionContext::from_process(&layout.root, &layout.source_tree);
        self.run_with_context(&mut ctx).await
    }

    /// Run the pipeline in the given context
    pub async fn run_with_context(&self, ctx: &mut ExecutionContext) -> RunReport {
        let mut state = PipelineState::new();
        let plan = StepGate::plan(&self.config);

        info!(
            "Starting build {} ({} step(s) planned)",
            state.execution_id,
            plan.len()
        );
        state.start();
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id: state.execution_id,
            steps: plan.clone(),
        });

        let mut failure: Option<BuildError> = None;
        for step in plan {
            // Align first so a lone late step resolves against the source tree
            ctx.align_for(step);

            let decision = StepGate::should_run(step, &self.config);
            if let Some(reason) = decision.skip_reason() {
                debug!("Skipping {}: {:?}", step, reason);
                if let SkipReason::AlreadyComplete { marker } = &reason {
                    info!("{} already complete ({} exists)", step, marker.display());
                }
                state.set_step(step, StepState::Skipped { reason: reason.clone() });
                self.emit_event(ExecutionEvent::StepSkipped { step, reason });
                continue;
            }

            let started_at = Utc::now();
            state.set_step(step, StepState::Running { started_at });
            self.emit_event(ExecutionEvent::StepStarted { step });

            self.sink.start_group(step.title());
            let result = self.body.run(step, ctx).await;
            self.sink.end_group(step.title());

            match result {
                Ok(()) => {
                    state.set_step(
                        step,
                        StepState::Completed {
                            started_at,
                            completed_at: Utc::now(),
                        },
                    );
                    self.emit_event(ExecutionEvent::StepCompleted { step });
                }
                Err(err) => {
                    let message = format!("Step {} failed: {}", step, err);
                    self.sink.error(&message);
                    state.set_step(
                        step,
                        StepState::Failed {
                            error: err.to_string(),
                            exit_code: err.exit_code(),
                            started_at,
                            failed_at: Utc::now(),
                        },
                    );
                    self.emit_event(ExecutionEvent::StepFailed {
                        step,
                        error: err.to_string(),
                        exit_code: err.exit_code(),
                    });
                    failure = Some(err);
                    break;
                }
            }
        }

        let exit_code = match &failure {
            None => {
                state.complete();
                EXIT_SUCCESS
            }
            Some(err @ BuildError::Cancelled { .. }) => {
                state.cancel();
                err.exit_code()
            }
            Some(err) => {
                state.fail();
                err.exit_code()
            }
        };

        if failure.is_some() {
            error!("Build {} stopped with exit code {}", state.execution_id, exit_code);
        } else {
            info!("Build {} finished", state.execution_id);
        }
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id: state.execution_id,
            status: state.status,
            exit_code,
        });

        RunReport { state, exit_code }
    }
}
