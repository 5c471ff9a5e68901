//! Test: Local runs - every step in order, stop at the first failure

use crate::helpers::*;
use stagebuild::core::{
    error::{EXIT_SUCCESS, EXIT_TOOL_FAILED},
    BuildError, ExecutionStatus, Step, StepState,
};

/// Test that a local run executes all six steps in declared order
#[tokio::test]
async fn test_local_run_executes_every_step() {
    let checkout = Checkout::new();
    checkout.pgo_name("win64", "chrome-win64-main.profdata");
    let harness = Harness::default();

    let report = harness.run(&checkout, checkout.config()).await;

    assert_eq!(report.exit_code, EXIT_SUCCESS);
    assert_eq!(report.state.status, ExecutionStatus::Completed);
    assert_eq!(report.state.completed_steps(), Step::ALL.to_vec());

    let series = &checkout.layout.patch_series;
    assert_eq!(
        harness.tools.calls(),
        vec![
            "retrieve".to_string(),
            "verify".to_string(),
            "unpack".to_string(),
            "prune".to_string(),
            format!("patch:{}", series[0].display()),
            format!("patch:{}", series[1].display()),
            "substitute_domains".to_string(),
            "package:64bit".to_string(),
        ]
    );
    assert_eq!(
        harness.runner.programs(),
        vec!["python", "out/Default/gn.exe", "third_party/ninja/ninja.exe"]
    );
    assert_eq!(harness.profiles.fetches(), 1);

    // Build commands run in the source tree, without a deadline outside CI
    for invocation in harness.runner.invocations() {
        assert_eq!(invocation.working_dir, checkout.layout.source_tree);
        assert_eq!(invocation.timeout, None);
    }
}

/// Test that each step runs inside its own progress group
#[tokio::test]
async fn test_every_step_is_grouped() {
    let checkout = Checkout::new();
    checkout.pgo_name("win64", "chrome-win64-main.profdata");
    let harness = Harness::default();

    harness.run(&checkout, checkout.config()).await;

    let groups: Vec<String> = harness
        .sink
        .events()
        .into_iter()
        .filter(|e| e.starts_with("group:") || e.starts_with("endgroup:"))
        .collect();
    let expected: Vec<String> = Step::ALL
        .iter()
        .flat_map(|s| [format!("group:{}", s.title()), format!("endgroup:{}", s.title())])
        .collect();
    assert_eq!(groups, expected);
}

/// Test that a failing tool stops the run and maps to the tool-failure code
#[tokio::test]
async fn test_failure_prevents_later_steps() {
    let checkout = Checkout::new();
    checkout.pgo_name("win64", "chrome-win64-main.profdata");
    let harness = Harness::new(
        MockTools::new(),
        RecordingRunner::new().then(Err(BuildError::ProcessFailed {
            command: "python".to_string(),
            exit_code: Some(1),
        })),
    );

    let report = harness.run(&checkout, checkout.config()).await;

    assert_eq!(report.exit_code, EXIT_TOOL_FAILED);
    assert_eq!(report.state.status, ExecutionStatus::Failed);
    assert!(matches!(report.state.step(Step::BootstrapGn), StepState::Failed { .. }));
    assert!(matches!(report.state.step(Step::Build), StepState::Pending));
    assert!(matches!(report.state.step(Step::Package), StepState::Pending));

    // gn gen never ran, nor did packaging
    assert_eq!(harness.runner.programs(), vec!["python"]);
    assert_eq!(harness.tools.count("package:64bit"), 0);

    let errors = harness.sink.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("bootstrap-gn"));
    assert!(harness
        .sink
        .events()
        .contains(&format!("endgroup:{}", Step::BootstrapGn.title())));
}

/// Test that an existing PGO profile is refreshed, not downloaded again
#[tokio::test]
async fn test_existing_pgo_profile_emits_notice() {
    let checkout = Checkout::new();
    checkout.pgo_name("win64", "chrome-win64-main.profdata");
    checkout.touch(
        &checkout
            .layout
            .source_tree
            .join("chrome/build/pgo_profiles/chrome-win64-main.profdata"),
    );
    let harness = Harness::default();

    let report = harness.run(&checkout, checkout.config()).await;

    assert_eq!(report.exit_code, EXIT_SUCCESS);
    assert_eq!(harness.profiles.fetches(), 0);
    assert!(harness
        .sink
        .events()
        .iter()
        .any(|e| e.starts_with("notice:") && e.contains("chrome-win64-main.profdata")));
}
