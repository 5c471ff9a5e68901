//! CLI output formatting

use crate::core::{ExecutionStatus, SkipReason, StepState};
use crate::execution::{ExecutionEvent, RunReport};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Failed { exit_code, .. } => {
            style(format!("FAILED ({})", exit_code)).red().to_string()
        }
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            steps,
        } => format!(
            "{} Starting build {} ({} step(s))",
            ROCKET,
            style(&execution_id.to_string()[..8]).dim(),
            steps.len()
        ),
        ExecutionEvent::StepStarted { step } => {
            format!(
                "{} [{}/{}] {}",
                SPINNER,
                step.index() + 1,
                crate::core::Step::ALL.len(),
                style(step.title()).cyan()
            )
        }
        ExecutionEvent::StepSkipped { step, reason } => {
            let why = match reason {
                SkipReason::NotSelected => "not selected".to_string(),
                SkipReason::AlreadyComplete { marker } => {
                    format!("already complete, {} exists", marker.display())
                }
            };
            format!("{} {} ({})", SKIP, style(step).dim(), style(why).dim())
        }
        ExecutionEvent::StepCompleted { step } => format!("{} {}", CHECK, style(step).green()),
        ExecutionEvent::StepFailed { step, error, .. } => {
            format!("{} {}: {}", CROSS, style(step).red(), style(error).dim())
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
            exit_code,
        } => format!(
            "{} Build ({}) {} - exit code {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status),
            exit_code
        ),
    }
}

/// Per-step summary of a finished run
pub fn format_run_summary(report: &RunReport) -> String {
    let icon = if report.succeeded() { CHECK } else { CROSS };
    let mut lines = vec![format!(
        "{} {} ({:.0}% of steps settled)",
        icon,
        format_status(report.state.status),
        report.state.progress() * 100.0
    )];
    for (step, state) in &report.state.steps {
        lines.push(format!("   {:<24} {}", step.name(), format_step_state(state)));
    }
    lines.join("\n")
}
