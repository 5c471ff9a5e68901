//! Test: GN configuration output

use crate::helpers::*;
use stagebuild::core::{error::EXIT_SUCCESS, Arch, Step};

/// Test that a 32-bit CI run writes args.gn with x86 substituted in the platform flags
#[tokio::test]
async fn test_x86_args_gn() {
    let checkout = Checkout::new();
    let harness = Harness::default();

    let config = checkout
        .config()
        .with_ci_step(Step::CreateArgsGn)
        .with_arch(Arch::X86);
    let report = harness.run(&checkout, config).await;

    assert_eq!(report.exit_code, EXIT_SUCCESS);
    let args_gn = std::fs::read_to_string(checkout.layout.args_gn_path()).unwrap();
    assert_eq!(
        args_gn,
        "is_official_build=true\nenable_nacl=false\ntarget_cpu=\"x86\"\nv8_target_cpu=\"x86\""
    );
}

/// Test that the 64-bit configuration is written unchanged
#[tokio::test]
async fn test_x64_args_gn() {
    let checkout = Checkout::new();
    let harness = Harness::default();

    let config = checkout.config().with_ci_step(Step::CreateArgsGn);
    harness.run(&checkout, config).await;

    let args_gn = std::fs::read_to_string(checkout.layout.args_gn_path()).unwrap();
    assert!(args_gn.ends_with("target_cpu=\"x64\"\nv8_target_cpu=\"x64\""));
}
