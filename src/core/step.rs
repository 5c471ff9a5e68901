//! Pipeline step model

use crate::core::config::BuildLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A pipeline step, in declared execution order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Download, verify, unpack, prune, patch and domain-substitute the sources
    SetupEnvironment,
    /// Fetch the PGO profile referenced by the source tree
    DownloadPgoProfiles,
    /// Write the GN build configuration file
    CreateArgsGn,
    /// Build the GN binary and generate build files
    BootstrapGn,
    /// Run the build engine
    Build,
    /// Package the build outputs
    Package,
}

impl Step {
    /// Every step, in execution order
    pub const ALL: [Step; 6] = [
        Step::SetupEnvironment,
        Step::DownloadPgoProfiles,
        Step::CreateArgsGn,
        Step::BootstrapGn,
        Step::Build,
        Step::Package,
    ];

    /// Position of this step in the pipeline (0-based)
    pub fn index(self) -> usize {
        match self {
            Step::SetupEnvironment => 0,
            Step::DownloadPgoProfiles => 1,
            Step::CreateArgsGn => 2,
            Step::BootstrapGn => 3,
            Step::Build => 4,
            Step::Package => 5,
        }
    }

    /// Command-line name of the step
    pub fn name(self) -> &'static str {
        match self {
            Step::SetupEnvironment => "setup-environment",
            Step::DownloadPgoProfiles => "download-pgo-profiles",
            Step::CreateArgsGn => "create-args-gn",
            Step::BootstrapGn => "bootstrap-gn",
            Step::Build => "build",
            Step::Package => "package",
        }
    }

    /// Progress group title shown while the step runs
    pub fn title(self) -> &'static str {
        match self {
            Step::SetupEnvironment => "Setting up build environment",
            Step::DownloadPgoProfiles => "Retrieving PGO profiles",
            Step::CreateArgsGn => "Output args.gn",
            Step::BootstrapGn => "Run gn bootstrap",
            Step::Build => "Run ninja",
            Step::Package => "Package result",
        }
    }

    /// Whether the step resolves paths against the source tree rather than the root
    pub fn runs_in_source_tree(self) -> bool {
        matches!(self, Step::BootstrapGn | Step::Build)
    }

    /// Filesystem fact proving this step already ran, if the step has one
    ///
    /// The PGO, build and package steps have no marker: the build engine is
    /// incremental on its own, and the PGO body does its own per-file check.
    pub fn completion_marker(self, layout: &BuildLayout) -> Option<PathBuf> {
        match self {
            Step::SetupEnvironment => Some(layout.source_tree.join("BUILD.gn")),
            Step::CreateArgsGn => Some(layout.args_gn_path()),
            Step::BootstrapGn => Some(layout.gn_binary_path()),
            Step::DownloadPgoProfiles | Step::Build | Step::Package => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .iter()
            .copied()
            .find(|step| step.name() == s)
            .ok_or_else(|| format!("Unknown step: {}", s))
    }
}
