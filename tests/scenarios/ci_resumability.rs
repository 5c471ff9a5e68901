//! Test: CI resumability - one step per invocation, completion markers

use crate::helpers::*;
use stagebuild::core::{error::EXIT_SUCCESS, SkipReason, Step, StepState};
use std::time::Duration;

/// Test that an existing marker skips the step without calling any collaborator
#[tokio::test]
async fn test_marker_skips_step() {
    let checkout = Checkout::new();
    checkout.touch(&checkout.layout.source_tree.join("BUILD.gn"));
    let harness = Harness::default();

    let config = checkout.config().with_ci_step(Step::SetupEnvironment);
    let report = harness.run(&checkout, config).await;

    assert_eq!(report.exit_code, EXIT_SUCCESS);
    assert!(harness.tools.calls().is_empty());
    assert!(harness.runner.invocations().is_empty());
    assert!(harness.sink.events().is_empty());
    assert!(matches!(
        report.state.step(Step::SetupEnvironment),
        StepState::Skipped {
            reason: SkipReason::AlreadyComplete { .. }
        }
    ));
}

/// Test that force reruns a step whose marker exists
#[tokio::test]
async fn test_force_reruns_completed_step() {
    let checkout = Checkout::new();
    checkout.touch(&checkout.layout.gn_binary_path());
    let harness = Harness::default();

    let config = checkout
        .config()
        .with_ci_step(Step::BootstrapGn)
        .with_force(true);
    let report = harness.run(&checkout, config).await;

    assert_eq!(report.exit_code, EXIT_SUCCESS);
    assert_eq!(harness.runner.programs(), vec!["python", "out/Default/gn.exe"]);
}

/// Test that a marker-less step always runs when selected
#[tokio::test]
async fn test_build_step_without_marker_runs() {
    let checkout = Checkout::new();
    let harness = Harness::default();

    let config = checkout.config().with_ci_step(Step::Build);
    let report = harness.run(&checkout, config).await;

    assert_eq!(report.exit_code, EXIT_SUCCESS);
    let invocations = harness.runner.invocations();
    assert_eq!(invocations.len(), 1);

    // A lone CI build step still starts in the source tree, under the CI deadline
    assert_eq!(invocations[0].working_dir, checkout.layout.source_tree);
    assert_eq!(invocations[0].timeout, Some(Duration::from_secs(12_600)));

    // Nothing else was considered
    for step in [Step::SetupEnvironment, Step::CreateArgsGn, Step::Package] {
        assert!(matches!(report.state.step(step), StepState::Pending));
    }
}

/// Test that args.gn is not regenerated once present
#[tokio::test]
async fn test_existing_args_gn_is_kept() {
    let checkout = Checkout::new();
    let args_gn = checkout.layout.args_gn_path();
    checkout.touch(&args_gn);
    std::fs::write(&args_gn, "hand_edited=true").unwrap();
    let harness = Harness::default();

    let config = checkout.config().with_ci_step(Step::CreateArgsGn);
    harness.run(&checkout, config).await;

    assert_eq!(std::fs::read_to_string(&args_gn).unwrap(), "hand_edited=true");
}
