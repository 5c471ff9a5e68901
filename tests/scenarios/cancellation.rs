//! Test: Cancellation - deadline expiry is distinguished from tool failure

use crate::helpers::*;
use stagebuild::core::{
    error::{EXIT_CANCELLED, EXIT_TOOL_FAILED},
    BuildError, ExecutionStatus, Step, StepState,
};

/// Test that a cancelled build exits 124, not 123
#[tokio::test]
async fn test_cancelled_build_exit_code() {
    let checkout = Checkout::new();
    let harness = Harness::new(
        MockTools::new(),
        RecordingRunner::new().then(Err(BuildError::Cancelled {
            command: "third_party/ninja/ninja.exe".to_string(),
            timeout_secs: 12_600,
        })),
    );

    let report = harness
        .run(&checkout, checkout.config().with_ci_step(Step::Build))
        .await;

    assert_eq!(report.exit_code, EXIT_CANCELLED);
    assert_ne!(report.exit_code, EXIT_TOOL_FAILED);
    assert_eq!(report.state.status, ExecutionStatus::Cancelled);
    assert!(matches!(
        report.state.step(Step::Build),
        StepState::Failed { exit_code: 124, .. }
    ));

    // The group is closed and the error reported even though the step was cut short
    let events = harness.sink.events();
    assert_eq!(events.first().unwrap(), &format!("group:{}", Step::Build.title()));
    assert_eq!(events[1], format!("endgroup:{}", Step::Build.title()));
    assert!(events[2].starts_with("error:"));
    assert!(events[2].contains("deadline"));
}
