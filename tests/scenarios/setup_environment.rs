//! Test: Source setup - downloads, verification, pruning and patching

use crate::helpers::*;
use stagebuild::core::{
    error::{EXIT_FAILURE, EXIT_SUCCESS},
    PipelineConfig, Step,
};

fn setup_only(checkout: &Checkout) -> PipelineConfig {
    checkout.config().with_ci_step(Step::SetupEnvironment)
}

/// Test that a checksum mismatch is reported before anything is extracted
#[tokio::test]
async fn test_integrity_mismatch_stops_before_unpack() {
    let checkout = Checkout::new();
    let harness = Harness::new(
        MockTools::new().with_integrity_mismatch("chromium-130.0.tar.xz"),
        RecordingRunner::new(),
    );

    let report = harness.run(&checkout, setup_only(&checkout)).await;

    assert_eq!(report.exit_code, EXIT_FAILURE);
    assert_eq!(harness.tools.calls(), vec!["retrieve", "verify"]);
    assert_eq!(harness.tools.count("unpack"), 0);

    let errors = harness.sink.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("File checksum does not match"));
    assert!(errors[0].contains("chromium-130.0.tar.xz"));
}

/// Test that transient download failures are retried until they succeed
#[tokio::test]
async fn test_download_retried_after_network_errors() {
    let checkout = Checkout::new();
    let harness = Harness::new(MockTools::new().failing_retrieve(3), RecordingRunner::new());

    let report = harness.run(&checkout, setup_only(&checkout)).await;

    assert_eq!(report.exit_code, EXIT_SUCCESS);
    assert_eq!(harness.tools.count("retrieve"), 4);
    assert_eq!(harness.sink.warnings().len(), 3);
    assert!(harness.sink.warnings()[0].contains("attempt 1/5"));

    // A single group covers all attempts
    let groups = harness
        .sink
        .events()
        .iter()
        .filter(|e| e.starts_with("group:"))
        .count();
    assert_eq!(groups, 1);
}

/// Test that persistent download failures end the run after the attempt limit
#[tokio::test]
async fn test_download_retries_exhausted() {
    let checkout = Checkout::new();
    let harness = Harness::new(MockTools::new().failing_retrieve(10), RecordingRunner::new());

    let report = harness.run(&checkout, setup_only(&checkout)).await;

    assert_eq!(report.exit_code, EXIT_FAILURE);
    assert_eq!(harness.tools.count("retrieve"), 5);
    assert_eq!(harness.tools.count("verify"), 0);
    assert!(harness.sink.errors()[0].contains("after 5 attempts"));
}

/// Test that binaries which cannot be pruned are fatal
#[tokio::test]
async fn test_unremovable_files_are_fatal() {
    let checkout = Checkout::new();
    let harness = Harness::new(
        MockTools::new().with_unremovable(&["third_party/blob.dll"]),
        RecordingRunner::new(),
    );

    let report = harness.run(&checkout, setup_only(&checkout)).await;

    assert_eq!(report.exit_code, EXIT_FAILURE);
    assert!(harness.tools.calls().iter().all(|c| !c.starts_with("patch:")));
    assert!(harness.sink.errors()[0].contains("third_party/blob.dll"));
}

/// Test that domain substitution can be skipped
#[tokio::test]
async fn test_skip_domain_substitution() {
    let checkout = Checkout::new();
    let harness = Harness::default();
    let mut config = setup_only(&checkout);
    config.skip_domain_substitution = true;

    let report = harness.run(&checkout, config).await;

    assert_eq!(report.exit_code, EXIT_SUCCESS);
    assert_eq!(harness.tools.count("substitute_domains"), 0);
    assert_eq!(harness.tools.count("prune"), 1);
    assert!(checkout.layout.download_cache.is_dir());
}
